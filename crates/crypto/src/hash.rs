// Path: crates/crypto/src/hash.rs
//! Cryptographic hash functions using `dcrypt`.

use dcrypt::algorithms::hash::sha2::Sha256 as DcryptSha256;
use dcrypt::algorithms::hash::HashFunction as DcryptHashFunction;
use dcrypt::algorithms::ByteSerializable;

use pop_types::error::CryptoError;

/// A hash function that can digest an arbitrary byte string.
pub trait HashFunction {
    /// Hashes `message` and returns the digest.
    fn hash(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// The digest size in bytes.
    fn digest_size(&self) -> usize;

    /// The algorithm's name, for logging.
    fn name(&self) -> &str;
}

/// SHA-256, the only hash function the consensus core's data model uses
/// (§3: "Every hash is 32-byte SHA-256 over the canonical encoding").
#[derive(Default, Clone)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn hash(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = DcryptSha256::digest(message).map_err(|e| CryptoError::Primitive(e.to_string()))?;
        Ok(digest.to_bytes())
    }

    fn digest_size(&self) -> usize {
        32
    }

    fn name(&self) -> &str {
        "SHA-256"
    }
}

/// Convenience wrapper returning a fixed-size 32-byte digest.
pub fn sha256<T: AsRef<[u8]>>(data: T) -> Result<[u8; 32], CryptoError> {
    let hasher = Sha256Hash;
    let digest = hasher.hash(data.as_ref())?;
    let len = digest.len();
    digest
        .try_into()
        .map_err(|_| CryptoError::InvalidHashLength { expected: 32, got: len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_32_bytes() {
        let d = sha256(b"hello world").unwrap();
        assert_eq!(d.len(), 32);
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(sha256(b"abc").unwrap(), sha256(b"abc").unwrap());
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(sha256(b"abc").unwrap(), sha256(b"abd").unwrap());
    }
}
