// Path: crates/node/src/keys.rs
//! Loading and generating this replica's two keys: the consensus signing
//! key (a raw Ed25519 seed, verified against `pop_types`) and the libp2p
//! network identity (its own Ed25519 key, persisted protobuf-encoded per
//! the teacher's identity-file convention).

use std::path::Path;

use libp2p::identity;
use pop_crypto::sign::{Ed25519KeyPair, SerializableKey, SigningKeyPair};

/// Loads the 32-byte consensus signing seed from `path`, generating and
/// persisting a fresh one if none exists.
pub fn load_or_generate_consensus_key(path: &Path) -> anyhow::Result<Ed25519KeyPair> {
    if path.exists() {
        let seed = std::fs::read(path)?;
        if seed.len() != 32 {
            anyhow::bail!("consensus identity at {path:?} is not a 32-byte seed");
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&seed);
        Ok(Ed25519KeyPair::from_seed(&arr)?)
    } else {
        let kp = Ed25519KeyPair::generate()?;
        std::fs::write(path, kp.private_key().to_bytes())?;
        Ok(kp)
    }
}

/// Loads this node's libp2p identity from `path`, generating and persisting
/// a fresh one if none exists.
pub fn load_or_generate_network_key(path: &Path) -> anyhow::Result<identity::Keypair> {
    if path.exists() {
        let raw = std::fs::read(path)?;
        Ok(identity::Keypair::from_protobuf_encoding(&raw)?)
    } else {
        let kp = identity::Keypair::generate_ed25519();
        std::fs::write(path, kp.to_protobuf_encoding()?)?;
        Ok(kp)
    }
}
