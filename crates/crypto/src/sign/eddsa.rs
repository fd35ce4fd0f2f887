// Path: crates/crypto/src/sign/eddsa.rs
//! Ed25519 signing via `dcrypt`.

use dcrypt::api::Signature as DcryptSignatureTrait;
use dcrypt::sign::eddsa;
use rand::rngs::OsRng;

use super::{SerializableKey, Signature, SigningKey, SigningKeyPair, VerifyingKey};
use pop_types::error::CryptoError;

/// An Ed25519 key pair.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    public_key: eddsa::Ed25519PublicKey,
    secret_key: eddsa::Ed25519SecretKey,
}

/// An Ed25519 signature.
#[derive(Clone)]
pub struct Ed25519Signature(eddsa::Ed25519Signature);

/// An Ed25519 public key.
#[derive(Clone)]
pub struct Ed25519PublicKey(eddsa::Ed25519PublicKey);

/// An Ed25519 private key.
#[derive(Clone)]
pub struct Ed25519PrivateKey(eddsa::Ed25519SecretKey);

impl Ed25519KeyPair {
    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = OsRng;
        let (public_key, secret_key) = eddsa::Ed25519::keypair(&mut rng)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(Self { public_key, secret_key })
    }

    /// Reconstructs a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret_key = eddsa::Ed25519SecretKey::from_seed(seed)
            .map_err(|e| CryptoError::InvalidKey(format!("{e:?}")))?;
        let public_key = secret_key
            .public_key()
            .map_err(|e| CryptoError::InvalidKey(format!("{e:?}")))?;
        Ok(Self { public_key, secret_key })
    }

    /// Returns the raw 32-byte public key, matching `pop_types::app::PublicKey`.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(Ed25519PublicKey(self.public_key.clone()).to_bytes().as_slice());
        out
    }
}

impl SigningKeyPair for Ed25519KeyPair {
    type PublicKey = Ed25519PublicKey;
    type PrivateKey = Ed25519PrivateKey;
    type Signature = Ed25519Signature;

    fn public_key(&self) -> Self::PublicKey {
        Ed25519PublicKey(self.public_key.clone())
    }

    fn private_key(&self) -> Self::PrivateKey {
        Ed25519PrivateKey(self.secret_key.clone())
    }

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature = eddsa::Ed25519::sign(message, &self.secret_key)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(Ed25519Signature(signature))
    }
}

impl VerifyingKey for Ed25519PublicKey {
    type Signature = Ed25519Signature;

    fn verify(&self, message: &[u8], signature: &Self::Signature) -> Result<(), CryptoError> {
        eddsa::Ed25519::verify(message, &signature.0, &self.0)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl SerializableKey for Ed25519PublicKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        eddsa::Ed25519PublicKey::from_bytes(bytes)
            .map(Ed25519PublicKey)
            .map_err(|e| CryptoError::InvalidKey(format!("{e:?}")))
    }
}

impl SigningKey for Ed25519PrivateKey {
    type Signature = Ed25519Signature;

    fn sign(&self, message: &[u8]) -> Result<Self::Signature, CryptoError> {
        let signature = eddsa::Ed25519::sign(message, &self.0)
            .map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(Ed25519Signature(signature))
    }
}

impl SerializableKey for Ed25519PrivateKey {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.seed().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey("expected a 32-byte seed".to_string()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(bytes);
        eddsa::Ed25519SecretKey::from_seed(&seed)
            .map(Ed25519PrivateKey)
            .map_err(|e| CryptoError::InvalidKey(format!("{e:?}")))
    }
}

impl SerializableKey for Ed25519Signature {
    fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        eddsa::Ed25519Signature::from_bytes(bytes)
            .map(Ed25519Signature)
            .map_err(|e| CryptoError::InvalidSignature(format!("{e:?}")))
    }
}

impl Signature for Ed25519Signature {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = Ed25519KeyPair::generate().unwrap();
        let msg = b"pre-prepare(h=1,v=0)";
        let sig = kp.sign(msg).unwrap();
        assert!(kp.public_key().verify(msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = Ed25519KeyPair::generate().unwrap();
        let sig = kp.sign(b"original").unwrap();
        assert!(kp.public_key().verify(b"tampered", &sig).is_err());
    }

    #[test]
    fn from_seed_is_deterministic() {
        let seed = [7u8; 32];
        let a = Ed25519KeyPair::from_seed(&seed).unwrap();
        let b = Ed25519KeyPair::from_seed(&seed).unwrap();
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
    }
}
