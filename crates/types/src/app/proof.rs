// Path: crates/types/src/app/proof.rs
//! `Proof` and `VerificationResult` — §3.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{domain_hash, Hash32, PublicKey, SigDomain, SignatureBytes};
use crate::error::CryptoError;

/// An opaque, submitter-signed payload that the external logical engine can
/// classify as valid/invalid deterministically. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Proof {
    /// `H(ProofId || payload || submitter_pk)`. Content-addressed identity.
    pub id: Hash32,
    /// The opaque payload the logical engine verifies.
    pub payload: Vec<u8>,
    /// The submitter's Ed25519 public key.
    pub submitter_pk: PublicKey,
    /// The submitter's signature over `id`.
    #[serde(with = "serde_big_array::BigArray")]
    pub submitter_sig: SignatureBytes,
    /// Wall-clock nanoseconds at submission, as claimed by the submitter.
    pub submitted_at_ns: u64,
}

impl Proof {
    /// Computes the content-addressed `id` for a `(payload, submitter_pk)` pair.
    pub fn compute_id(payload: &[u8], submitter_pk: &PublicKey) -> Result<Hash32, CryptoError> {
        let mut preimage = Vec::with_capacity(payload.len() + 32);
        preimage.extend_from_slice(payload);
        preimage.extend_from_slice(submitter_pk);
        domain_hash(SigDomain::ProofId, &preimage)
    }

    /// The canonical preimage the submitter's signature is computed over.
    pub fn signing_preimage(&self) -> Hash32 {
        // `id` already binds payload + submitter_pk; signing id (rather than
        // payload directly) keeps every signature a fixed 32 bytes.
        self.id
    }

    /// Basic structural well-formedness, independent of signature or
    /// logical verification: non-empty payload, and `id` matches its
    /// claimed derivation.
    pub fn is_well_formed(&self) -> bool {
        if self.payload.is_empty() {
            return false;
        }
        matches!(Self::compute_id(&self.payload, &self.submitter_pk), Ok(id) if id == self.id)
    }
}

/// Outcome of running the external logical engine's `verify(payload)` over
/// a [`Proof`]. Produced by §4.1; pure and deterministic for honest verifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct VerificationResult {
    /// The proof this result pertains to.
    pub proof_id: Hash32,
    /// Whether the logical engine accepted the proof.
    pub valid: bool,
    /// Deterministic difficulty weight in `1..=64`, per §4.1.
    pub difficulty: u32,
    /// Wall-clock nanoseconds the logical engine spent verifying.
    pub verify_time_ns: u64,
    /// The public key of the replica that produced this result.
    pub verifier_pk: PublicKey,
    /// `0` on success; a non-zero code identifies the logical-engine failure class.
    pub error_code: u16,
}

impl VerificationResult {
    /// Valid range for [`VerificationResult::difficulty`], per §3.
    pub const DIFFICULTY_RANGE: std::ops::RangeInclusive<u32> = 1..=64;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(byte: u8) -> PublicKey {
        [byte; 32]
    }

    #[test]
    fn well_formed_requires_matching_id() {
        let payload = b"hello".to_vec();
        let submitter_pk = pk(1);
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        let good = Proof {
            id,
            payload: payload.clone(),
            submitter_pk,
            submitter_sig: [0u8; 64],
            submitted_at_ns: 1,
        };
        assert!(good.is_well_formed());

        let mut bad = good.clone();
        bad.id = [0xAA; 32];
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn empty_payload_is_not_well_formed() {
        let submitter_pk = pk(2);
        let id = Proof::compute_id(&[], &submitter_pk).unwrap();
        let p = Proof {
            id,
            payload: vec![],
            submitter_pk,
            submitter_sig: [0u8; 64],
            submitted_at_ns: 1,
        };
        assert!(!p.is_well_formed());
    }

    #[test]
    fn id_is_deterministic_over_same_inputs() {
        let payload = b"abc".to_vec();
        let submitter_pk = pk(3);
        let id1 = Proof::compute_id(&payload, &submitter_pk).unwrap();
        let id2 = Proof::compute_id(&payload, &submitter_pk).unwrap();
        assert_eq!(id1, id2);
    }
}
