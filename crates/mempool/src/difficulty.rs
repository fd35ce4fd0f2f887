// Path: crates/mempool/src/difficulty.rs
//! The pluggable difficulty function (§4.1, §9 Open Question 2).
//!
//! `d(proof)` must be a pure, deterministic function of proof structure
//! returning a value in `1..=64` so every honest verifier computes the
//! identical weight. The formula itself is explicitly left open by the
//! contract; isolating it behind [`DifficultyFn`] means swapping the
//! concrete weighting scheme never touches admission or batching code.

use pop_types::app::Proof;

/// Computes a proof's difficulty weight.
pub trait DifficultyFn: Send + Sync {
    /// Returns a value in `1..=64`.
    fn difficulty(&self, proof: &Proof) -> u32;
}

/// A concrete, deterministic difficulty function: a structural fingerprint
/// of `proof.payload` combining a length class with a byte-sum residue,
/// folded into `1..=64`.
///
/// Two proofs with identical payload length and byte sum always receive
/// the same difficulty; no two fields of the proof beyond `payload` are
/// consulted, so re-signing or re-timestamping a proof never changes it.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralFingerprintDifficulty;

impl DifficultyFn for StructuralFingerprintDifficulty {
    fn difficulty(&self, proof: &Proof) -> u32 {
        let len_class = (proof.payload.len() as u64 % 64) as u32;
        let byte_sum: u64 = proof.payload.iter().map(|&b| b as u64).sum();
        let residue = (byte_sum % 64) as u32;
        1 + ((len_class + residue) % 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_types::app::{PublicKey, VerificationResult};

    fn proof(payload: Vec<u8>) -> Proof {
        let submitter_pk: PublicKey = [9u8; 32];
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        Proof { id, payload, submitter_pk, submitter_sig: [0u8; 64], submitted_at_ns: 0 }
    }

    #[test]
    fn difficulty_is_in_range() {
        let f = StructuralFingerprintDifficulty;
        for payload in [vec![1u8], vec![0u8; 500], (0..255u16).map(|b| b as u8).collect()] {
            let d = f.difficulty(&proof(payload));
            assert!(VerificationResult::DIFFICULTY_RANGE.contains(&d));
        }
    }

    #[test]
    fn difficulty_is_deterministic() {
        let f = StructuralFingerprintDifficulty;
        let p = proof(b"repeatable payload".to_vec());
        assert_eq!(f.difficulty(&p), f.difficulty(&p));
    }

    #[test]
    fn difficulty_is_sensitive_to_payload_content() {
        let f = StructuralFingerprintDifficulty;
        let a = f.difficulty(&proof(vec![1u8; 10]));
        let b = f.difficulty(&proof(vec![2u8; 250]));
        assert_ne!(a, b);
    }
}
