// Path: crates/types/src/codec.rs

//! Defines the canonical, deterministic binary codec for all consensus-critical data.
//!
//! This module wraps `parity-scale-codec` (SCALE), chosen for its compact
//! and byte-for-byte deterministic encoding. Centralizing the codec here
//! ensures every component hashes and signs the exact same byte
//! representation of a given value — a prerequisite for I3 (state
//! determinism) and P4 (cross-implementation determinism).

use parity_scale_codec::{Decode, DecodeAll, Encode};

/// Encodes a value into its canonical byte representation.
///
/// Used for every value that is hashed, signed, or persisted in
/// consensus-critical state.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation.
///
/// Fails fast (rather than accepting a prefix match) so that malformed or
/// truncated consensus messages are rejected outright, per §7: "a malformed
/// or undecodable consensus message is discarded; it never advances state."
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, crate::error::CodecError> {
    T::decode_all(&mut &*b).map_err(|e| crate::error::CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parity_scale_codec::{Decode, Encode};

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Sample {
        id: u32,
        tags: Vec<u8>,
    }

    #[test]
    fn roundtrip_is_identity() {
        let original = Sample {
            id: 7,
            tags: vec![1, 2, 3],
        };
        let encoded = to_bytes_canonical(&original);
        let decoded: Sample = from_bytes_canonical(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn truncated_input_fails_decode() {
        let original = Sample {
            id: 9,
            tags: vec![1, 2, 3, 4, 5],
        };
        let mut encoded = to_bytes_canonical(&original);
        encoded.pop();
        assert!(from_bytes_canonical::<Sample>(&encoded).is_err());
    }

    #[test]
    fn same_value_encodes_identically_every_time() {
        let v = Sample {
            id: 42,
            tags: vec![9, 9, 9],
        };
        assert_eq!(to_bytes_canonical(&v), to_bytes_canonical(&v));
    }
}
