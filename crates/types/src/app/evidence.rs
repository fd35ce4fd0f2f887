// Path: crates/types/src/app/evidence.rs
//! Byzantine offence evidence (§4.4): fact-based, replay-protected reports
//! the classifier turns into slashes.
//!
//! Mirrors the fact/proof split used throughout this core's signing
//! preimages: `evidence_id` hashes only the canonical, deterministic facts
//! of the offence, never the raw supporting proof, so an offence can only
//! ever be penalised once regardless of which valid proof bundle is
//! submitted for it.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{domain_hash, Hash32, PublicKey, SigDomain};
use crate::codec::to_bytes_canonical;
use crate::error::CryptoError;

/// The class of Byzantine misbehaviour an [`Evidence`] bundle claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum OffenseKind {
    /// A replica signed two distinct votes for the same `(h, v)`.
    Equivocation,
    /// A leader's proposal had a mismatched post-root or an invalid proof.
    InvalidProposal,
    /// A leader's proposal violated conservation in some domain.
    ConservationViolation,
}

/// The canonical, minimal facts that uniquely identify an offence,
/// independent of whatever raw messages prove it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum OffenseFacts {
    /// Two conflicting votes of the same kind at `(height, view)`.
    Equivocation {
        /// The height at which the conflict occurred.
        height: u64,
        /// The view at which the conflict occurred.
        view: u64,
        /// The first block hash signed.
        first_hash: Hash32,
        /// The second, conflicting block hash signed.
        second_hash: Hash32,
    },
    /// A proposal whose post-root mismatched or carried an invalid proof.
    InvalidProposal {
        /// The height of the offending proposal.
        height: u64,
        /// The view of the offending proposal.
        view: u64,
        /// The hash of the offending block.
        block_hash: Hash32,
    },
    /// A proposal whose transition failed conservation.
    ConservationViolation {
        /// The height of the offending proposal.
        height: u64,
        /// The view of the offending proposal.
        view: u64,
        /// The hash of the offending block.
        block_hash: Hash32,
    },
}

/// A submitted report of Byzantine misbehaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Evidence {
    /// The public key of the offending replica.
    pub offender: PublicKey,
    /// The offence class.
    pub kind: OffenseKind,
    /// The canonical facts, hashed for `evidence_id`.
    pub facts: OffenseFacts,
    /// Opaque supporting proof (e.g. the conflicting signed messages'
    /// canonical encoding). Excluded from `evidence_id` by design.
    pub proof: Vec<u8>,
}

/// Derives the deterministic, replay-protected id of `evidence`, hashing
/// only `(offender, kind, facts)` — never `proof` — under the `EvidenceId`
/// domain.
pub fn evidence_id(evidence: &Evidence) -> Result<Hash32, CryptoError> {
    let bytes = to_bytes_canonical(&(&evidence.offender, &evidence.kind, &evidence.facts));
    domain_hash(SigDomain::EvidenceId, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(second_hash: Hash32) -> Evidence {
        Evidence {
            offender: [7u8; 32],
            kind: OffenseKind::Equivocation,
            facts: OffenseFacts::Equivocation { height: 3, view: 0, first_hash: [1u8; 32], second_hash },
            proof: vec![9, 9, 9],
        }
    }

    #[test]
    fn id_ignores_proof_bytes() {
        let mut a = sample([2u8; 32]);
        let b_id = evidence_id(&a).unwrap();
        a.proof = vec![0; 64];
        assert_eq!(evidence_id(&a).unwrap(), b_id);
    }

    #[test]
    fn id_changes_with_facts() {
        let a = sample([2u8; 32]);
        let b = sample([3u8; 32]);
        assert_ne!(evidence_id(&a).unwrap(), evidence_id(&b).unwrap());
    }
}
