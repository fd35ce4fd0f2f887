// Path: crates/types/src/app/mod.rs
//! Core application-level data structures: proofs, blocks, state, and
//! consensus messages (§3).

mod block;
mod consensus;
mod evidence;
mod proof;
mod state;

pub use block::*;
pub use consensus::*;
pub use evidence::*;
pub use proof::*;
pub use state::*;

use crate::error::CryptoError;

/// A 32-byte SHA-256 digest, used throughout §3 for ids, hashes, and roots.
pub type Hash32 = [u8; 32];

/// A raw 32-byte Ed25519 public key.
pub type PublicKey = [u8; 32];

/// A raw 64-byte Ed25519 signature.
pub type SignatureBytes = [u8; 64];

/// Domain separation tags for every value this core signs or content-addresses.
///
/// Mirrors the teacher's `SigDomain` pattern: every preimage is prefixed
/// with a single byte identifying its purpose, so a signature or hash
/// computed for one purpose can never be replayed as valid for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SigDomain {
    /// Domain for `Proof::id = H(payload || submitter_pk)`.
    ProofId = 0,
    /// Domain for the submitter's signature over a proof.
    ProofSubmission = 1,
    /// Domain for `ProofBlock::hash`.
    ProofBlockHash = 2,
    /// Domain for the proposer's signature over a `ProofBlock`.
    ProofBlockSig = 3,
    /// Domain for a `Prepare` message signature.
    PrepareSig = 4,
    /// Domain for a `Commit` message signature.
    CommitSig = 5,
    /// Domain for a `ViewChange` message signature.
    ViewChangeSig = 6,
    /// Domain for a `NewView` message signature.
    NewViewSig = 7,
    /// Domain for a Byzantine evidence bundle's deterministic id.
    EvidenceId = 8,
    /// Domain for a governance signature authorising a non-zero conserved
    /// resource delta (a mint or burn) against an otherwise-enforced domain.
    MintBurnAuthorization = 9,
}

/// Computes `H(domain || bytes)`, the standard domain-separated digest used
/// for every hash and signing preimage in §3.
pub fn domain_hash(domain: SigDomain, bytes: &[u8]) -> Result<Hash32, CryptoError> {
    let mut preimage = Vec::with_capacity(bytes.len() + 1);
    preimage.push(domain as u8);
    preimage.extend_from_slice(bytes);
    sha256(&preimage)
}

/// Raw SHA-256 over `bytes`, with no domain separation. Used for the
/// Merkle trie's internal `H(left||right)` and leaf `H(0x00||key||value)`
/// hashing, which already encode their own framing.
pub fn sha256<T: AsRef<[u8]>>(bytes: T) -> Result<Hash32, CryptoError> {
    use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
    use dcrypt::algorithms::hash::HashFunction as _;
    use dcrypt::algorithms::ByteSerializable;
    let digest = DcryptSha256::digest(bytes.as_ref())
        .map_err(|e| CryptoError::Primitive(e.to_string()))?;
    let out = digest.to_bytes();
    let len = out.len();
    out.try_into()
        .map_err(|_| CryptoError::InvalidHashLength { expected: 32, got: len })
}
