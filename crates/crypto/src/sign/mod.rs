// Path: crates/crypto/src/sign/mod.rs
//! Signing trait definitions and the Ed25519 implementation.
//!
//! These traits originally lived in the teacher's standalone `api` crate;
//! since this workspace has no crate playing that role, they are defined
//! here, scoped to the single signature scheme §6 requires (Ed25519).

mod eddsa;

pub use eddsa::{Ed25519KeyPair, Ed25519PrivateKey, Ed25519PublicKey, Ed25519Signature};

use pop_types::error::CryptoError;

/// A key or signature that can round-trip to and from raw bytes.
pub trait SerializableKey: Sized {
    /// Serializes to raw bytes.
    fn to_bytes(&self) -> Vec<u8>;
    /// Deserializes from raw bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError>;
}

/// Marker trait for a signature type.
pub trait Signature: SerializableKey {}

/// A private key capable of signing a message.
pub trait SigningKey: SerializableKey {
    /// The signature type this key produces.
    type Signature: Signature;

    /// Signs `message` and returns the resulting signature.
    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError>;
}

/// A public key capable of verifying a signature.
pub trait VerifyingKey: SerializableKey {
    /// The signature type this key verifies.
    type Signature: Signature;

    /// Verifies `signature` over `message`, returning `Ok(())` on success.
    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError>;
}

/// A full key pair: a private key and its corresponding public key.
pub trait SigningKeyPair {
    /// The public key type.
    type PublicKey: VerifyingKey<Signature = Self::Signature>;
    /// The private key type.
    type PrivateKey: SigningKey<Signature = Self::Signature>;
    /// The signature type produced by this pair.
    type Signature: Signature;

    /// Returns the pair's public key.
    fn public_key(&self) -> Self::PublicKey;
    /// Returns the pair's private key.
    fn private_key(&self) -> Self::PrivateKey;
    /// Signs `message` with the pair's private key.
    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError>;
}
