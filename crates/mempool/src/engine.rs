// Path: crates/mempool/src/engine.rs
//! The external logical engine's capability-only interface (§4.1):
//! `verify(payload) -> (valid, difficulty, error)`, pure, deterministic,
//! and bounded by a `verify_budget`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pop_types::app::Proof;

use crate::difficulty::DifficultyFn;

/// The result of running the logical engine over a single proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The proof was accepted, carrying its difficulty weight.
    Valid {
        /// The computed difficulty, `1..=64`.
        difficulty: u32,
    },
    /// The proof was structurally or logically rejected.
    Invalid {
        /// Human-readable rejection reason.
        reason: String,
    },
    /// Verification exceeded `verify_budget`. Not admitted; not slashable.
    Timeout,
}

/// A pure, deterministic, time-bounded proof verifier.
///
/// `verify` must never perform I/O and must return within `budget` on
/// honest input; an implementation that cannot guarantee this should
/// self-police with a wall-clock check, as [`StructuralEngine`] does.
pub trait LogicalEngine: Send + Sync {
    /// Verifies `proof`'s payload, bounded by `budget`.
    fn verify(&self, proof: &Proof, budget: Duration) -> EngineOutcome;
}

/// The mempool's default logical engine: payload well-formedness plus a
/// pluggable [`DifficultyFn`]. Stands in for the "external logical engine"
/// §4.1 treats as a capability the mempool calls through, not owns.
pub struct StructuralEngine {
    difficulty_fn: Arc<dyn DifficultyFn>,
}

impl StructuralEngine {
    /// Builds an engine delegating difficulty scoring to `difficulty_fn`.
    pub fn new(difficulty_fn: Arc<dyn DifficultyFn>) -> Self {
        Self { difficulty_fn }
    }
}

impl LogicalEngine for StructuralEngine {
    fn verify(&self, proof: &Proof, budget: Duration) -> EngineOutcome {
        let started = Instant::now();
        if !proof.is_well_formed() {
            return EngineOutcome::Invalid { reason: "proof failed structural well-formedness".into() };
        }
        if started.elapsed() > budget {
            return EngineOutcome::Timeout;
        }
        EngineOutcome::Valid { difficulty: self.difficulty_fn.difficulty(proof) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::StructuralFingerprintDifficulty;
    use pop_types::app::PublicKey;

    fn proof(payload: Vec<u8>) -> Proof {
        let submitter_pk: PublicKey = [4u8; 32];
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        Proof { id, payload, submitter_pk, submitter_sig: [0u8; 64], submitted_at_ns: 0 }
    }

    #[test]
    fn well_formed_payload_is_valid() {
        let engine = StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty));
        let outcome = engine.verify(&proof(b"payload".to_vec()), Duration::from_secs(1));
        assert!(matches!(outcome, EngineOutcome::Valid { .. }));
    }

    #[test]
    fn empty_payload_is_invalid() {
        let submitter_pk: PublicKey = [5u8; 32];
        let id = Proof::compute_id(&[], &submitter_pk).unwrap();
        let p = Proof { id, payload: vec![], submitter_pk, submitter_sig: [0u8; 64], submitted_at_ns: 0 };
        let engine = StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty));
        let outcome = engine.verify(&p, Duration::from_secs(1));
        assert!(matches!(outcome, EngineOutcome::Invalid { .. }));
    }

    #[test]
    fn zero_budget_times_out() {
        let engine = StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty));
        let outcome = engine.verify(&proof(b"payload".to_vec()), Duration::from_nanos(0));
        assert_eq!(outcome, EngineOutcome::Timeout);
    }
}
