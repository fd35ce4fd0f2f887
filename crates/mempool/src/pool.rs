// Path: crates/mempool/src/pool.rs
//! The sharded proof mempool: admission pipeline, verified-proof index, and
//! greedy batch selection (§4.1).

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use parking_lot::Mutex;

use pop_crypto::sign::{Ed25519PublicKey, Ed25519Signature, SerializableKey, VerifyingKey};
use pop_types::app::{Hash32, Proof, ProofBlock, PublicKey, VerificationResult};
use pop_types::error::AdmissionError;

use crate::engine::{EngineOutcome, LogicalEngine};
use crate::rate_limit::TokenBucket;

const SHARD_COUNT: usize = 64;

fn shard_of(hasher: &RandomState, id: &Hash32) -> usize {
    use std::hash::{BuildHasher, Hasher};
    let mut h = hasher.build_hasher();
    h.write(id);
    (h.finish() as usize) % SHARD_COUNT
}

/// A proof tracked by the mempool, at whichever admission stage it reached.
#[derive(Debug, Clone)]
enum Entry {
    Verified { proof: Proof, result: VerificationResult },
}

/// The outcome of [`Mempool::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// The proof passed the full pipeline and is eligible for batching.
    Admitted {
        /// The difficulty the logical engine assigned.
        difficulty: u32,
    },
    /// The proof was rejected at some pipeline stage.
    Rejected(AdmissionError),
}

/// Configuration for a [`Mempool`] instance.
#[derive(Debug, Clone)]
pub struct MempoolLimits {
    /// Time/memory budget handed to the logical engine per proof.
    pub verify_budget: Duration,
    /// Per-submitter token-bucket capacity.
    pub rate_limit_capacity: f64,
    /// Per-submitter token-bucket refill rate, tokens/second.
    pub rate_limit_refill_per_sec: f64,
    /// Proofs below this difficulty are rejected at admission.
    pub min_difficulty: u32,
}

impl Default for MempoolLimits {
    fn default() -> Self {
        Self {
            verify_budget: Duration::from_millis(100),
            rate_limit_capacity: 32.0,
            rate_limit_refill_per_sec: 8.0,
            min_difficulty: 1,
        }
    }
}

/// A sharded, lock-striped proof mempool.
///
/// Storage and the per-submitter rate limiter are sharded by `id`/submitter
/// key hash across [`SHARD_COUNT`] stripes, so concurrent submitters rarely
/// contend on the same lock. A single [`BTreeSet`]-backed index tracks every
/// verified proof's `(Reverse(difficulty), submitted_at_ns, id)` ordering so
/// [`Mempool::select_batch`] reads batches out in the §4.1 greedy order
/// directly, without re-sorting on every call.
pub struct Mempool {
    hasher: RandomState,
    shards: Vec<Mutex<HashMap<Hash32, Entry>>>,
    rate_limiters: Vec<Mutex<HashMap<PublicKey, TokenBucket>>>,
    verified_index: Mutex<BTreeSet<(Reverse<u32>, u64, Hash32)>>,
    engine: Arc<dyn LogicalEngine>,
    limits: MempoolLimits,
}

impl Mempool {
    /// Builds an empty mempool delegating logical verification to `engine`.
    pub fn new(engine: Arc<dyn LogicalEngine>, limits: MempoolLimits) -> Self {
        Self {
            hasher: RandomState::new(),
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            rate_limiters: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            verified_index: Mutex::new(BTreeSet::new()),
            engine,
            limits,
        }
    }

    fn submitter_shard(&self, pk: &PublicKey) -> usize {
        use std::hash::{BuildHasher, Hasher};
        let mut h = self.hasher.build_hasher();
        h.write(pk);
        (h.finish() as usize) % SHARD_COUNT
    }

    fn check_rate_limit(&self, submitter_pk: &PublicKey, now: Instant) -> bool {
        let shard = &mut self.rate_limiters[self.submitter_shard(submitter_pk)].lock();
        let bucket = shard
            .entry(*submitter_pk)
            .or_insert_with(|| TokenBucket::new(self.limits.rate_limit_capacity, self.limits.rate_limit_refill_per_sec, now));
        bucket.try_consume(now)
    }

    fn verify_signature(proof: &Proof) -> bool {
        let Ok(pk) = Ed25519PublicKey::from_bytes(&proof.submitter_pk) else { return false };
        let Ok(sig) = Ed25519Signature::from_bytes(&proof.submitter_sig) else { return false };
        pk.verify(&proof.signing_preimage(), &sig).is_ok()
    }

    /// Runs `proof` through the full admission pipeline: well-formedness,
    /// signature, duplicate check, rate limit, logical verification, and
    /// the minimum-difficulty floor, in that order (§4.1).
    pub fn submit(&self, proof: Proof, now: Instant) -> AdmissionOutcome {
        if !proof.is_well_formed() {
            return AdmissionOutcome::Rejected(AdmissionError::Malformed);
        }
        if !Self::verify_signature(&proof) {
            return AdmissionOutcome::Rejected(AdmissionError::InvalidSignature);
        }

        let shard_idx = shard_of(&self.hasher, &proof.id);
        {
            let shard = self.shards[shard_idx].lock();
            if shard.contains_key(&proof.id) {
                return AdmissionOutcome::Rejected(AdmissionError::Duplicate);
            }
        }

        if !self.check_rate_limit(&proof.submitter_pk, now) {
            return AdmissionOutcome::Rejected(AdmissionError::RateLimited);
        }

        let outcome = self.engine.verify(&proof, self.limits.verify_budget);
        let difficulty = match outcome {
            EngineOutcome::Valid { difficulty } => difficulty,
            EngineOutcome::Invalid { reason } => {
                return AdmissionOutcome::Rejected(AdmissionError::FailedVerification(reason));
            }
            EngineOutcome::Timeout => return AdmissionOutcome::Rejected(AdmissionError::Timeout),
        };
        if difficulty < self.limits.min_difficulty {
            return AdmissionOutcome::Rejected(AdmissionError::BelowMinDifficulty { got: difficulty, min: self.limits.min_difficulty });
        }

        let result = VerificationResult {
            proof_id: proof.id,
            valid: true,
            difficulty,
            verify_time_ns: 0,
            verifier_pk: proof.submitter_pk,
            error_code: 0,
        };

        let mut shard = self.shards[shard_idx].lock();
        if shard.contains_key(&proof.id) {
            return AdmissionOutcome::Rejected(AdmissionError::Duplicate);
        }
        self.verified_index.lock().insert((Reverse(difficulty), proof.submitted_at_ns, proof.id));
        let proof_id = proof.id;
        shard.insert(proof.id, Entry::Verified { proof, result });
        tracing::debug!(proof_id = ?proof_id, difficulty, "admitted proof");
        AdmissionOutcome::Admitted { difficulty }
    }

    /// Greedily selects verified proofs in `(difficulty desc, submitted_at_ns
    /// asc, id asc)` order, stopping at `max_count` proofs or `max_bytes` of
    /// canonical-encoded payload, whichever binds first.
    pub fn select_batch(&self, max_count: usize, max_bytes: usize) -> Vec<Proof> {
        let index = self.verified_index.lock();
        let mut batch = Vec::new();
        let mut bytes_used = 0usize;
        for &(_, _, id) in index.iter() {
            if batch.len() >= max_count {
                break;
            }
            let shard = self.shards[shard_of(&self.hasher, &id)].lock();
            let Some(Entry::Verified { proof, .. }) = shard.get(&id) else { continue };
            let size = pop_types::codec::to_bytes_canonical(proof).len();
            if size > max_bytes {
                // No batch, however empty, may ever exceed max_bytes for a
                // single proof; skip it and keep considering smaller ones.
                continue;
            }
            if bytes_used + size > max_bytes {
                break;
            }
            bytes_used += size;
            batch.push(proof.clone());
        }
        batch
    }

    /// Removes every proof in `block` from the mempool, regardless of
    /// whether it was admitted through this instance. Idempotent.
    pub fn on_committed(&self, block: &ProofBlock) {
        for proof in &block.proofs {
            let shard_idx = shard_of(&self.hasher, &proof.id);
            let removed = self.shards[shard_idx].lock().remove(&proof.id);
            if let Some(Entry::Verified { result, .. }) = removed {
                self.verified_index.lock().remove(&(Reverse(result.difficulty), proof.submitted_at_ns, proof.id));
            }
        }
    }

    /// Number of proofs currently held in the verified tier.
    pub fn len(&self) -> usize {
        self.verified_index.lock().len()
    }

    /// True iff no proofs are held in the verified tier.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::{DifficultyFn, StructuralFingerprintDifficulty};
    use crate::engine::StructuralEngine;
    use pop_crypto::sign::{Ed25519KeyPair, SerializableKey, SigningKeyPair};

    fn mempool() -> Mempool {
        let engine = Arc::new(StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty)));
        Mempool::new(engine, MempoolLimits::default())
    }

    fn signed_proof(kp: &Ed25519KeyPair, payload: Vec<u8>, submitted_at_ns: u64) -> Proof {
        let mut submitter_pk = [0u8; 32];
        submitter_pk.copy_from_slice(&kp.public_key().to_bytes());
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        let sig = kp.sign(&id).unwrap();
        let mut submitter_sig = [0u8; 64];
        submitter_sig.copy_from_slice(&sig.to_bytes());
        Proof { id, payload, submitter_pk, submitter_sig, submitted_at_ns }
    }

    #[test]
    fn well_formed_signed_proof_is_admitted() {
        let pool = mempool();
        let kp = Ed25519KeyPair::generate().unwrap();
        let proof = signed_proof(&kp, b"payload-one".to_vec(), 1);
        let outcome = pool.submit(proof, Instant::now());
        assert!(matches!(outcome, AdmissionOutcome::Admitted { .. }));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let pool = mempool();
        let kp = Ed25519KeyPair::generate().unwrap();
        let mut proof = signed_proof(&kp, b"payload-two".to_vec(), 1);
        proof.submitter_sig[0] ^= 0xFF;
        let outcome = pool.submit(proof, Instant::now());
        assert_eq!(outcome, AdmissionOutcome::Rejected(AdmissionError::InvalidSignature));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let pool = mempool();
        let kp = Ed25519KeyPair::generate().unwrap();
        let proof = signed_proof(&kp, b"payload-three".to_vec(), 1);
        let now = Instant::now();
        assert!(matches!(pool.submit(proof.clone(), now), AdmissionOutcome::Admitted { .. }));
        assert_eq!(pool.submit(proof, now), AdmissionOutcome::Rejected(AdmissionError::Duplicate));
    }

    #[test]
    fn rate_limit_exhausts_after_capacity() {
        let mut limits = MempoolLimits::default();
        limits.rate_limit_capacity = 1.0;
        limits.rate_limit_refill_per_sec = 0.0;
        let engine = Arc::new(StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty)));
        let pool = Mempool::new(engine, limits);
        let kp = Ed25519KeyPair::generate().unwrap();
        let now = Instant::now();
        let first = signed_proof(&kp, b"first".to_vec(), 1);
        let second = signed_proof(&kp, b"second".to_vec(), 2);
        assert!(matches!(pool.submit(first, now), AdmissionOutcome::Admitted { .. }));
        assert_eq!(pool.submit(second, now), AdmissionOutcome::Rejected(AdmissionError::RateLimited));
    }

    #[test]
    fn select_batch_orders_by_difficulty_then_time_then_id() {
        let pool = mempool();
        let now = Instant::now();
        for i in 0..6u64 {
            let kp = Ed25519KeyPair::generate().unwrap();
            let proof = signed_proof(&kp, vec![i as u8; (i as usize + 1) * 7], i);
            pool.submit(proof, now);
        }
        let batch = pool.select_batch(100, usize::MAX);
        assert_eq!(batch.len(), 6);
        for window in batch.windows(2) {
            let da = StructuralFingerprintDifficulty.difficulty(&window[0]);
            let db = StructuralFingerprintDifficulty.difficulty(&window[1]);
            assert!(da > db || (da == db && window[0].submitted_at_ns <= window[1].submitted_at_ns));
        }
    }

    #[test]
    fn select_batch_respects_max_count() {
        let pool = mempool();
        let now = Instant::now();
        for i in 0..4u64 {
            let kp = Ed25519KeyPair::generate().unwrap();
            pool.submit(signed_proof(&kp, vec![i as u8; 3], i), now);
        }
        assert_eq!(pool.select_batch(2, usize::MAX).len(), 2);
    }

    #[test]
    fn an_oversized_candidate_never_bypasses_max_bytes_even_when_first() {
        let pool = mempool();
        let now = Instant::now();
        // Submitted first and highest-difficulty (largest payload sorts
        // first under the structural fingerprint difficulty), so it is the
        // first candidate `select_batch` considers.
        let big_kp = Ed25519KeyPair::generate().unwrap();
        let big = signed_proof(&big_kp, vec![0u8; 1000], 0);
        pool.submit(big, now);

        let small_kp = Ed25519KeyPair::generate().unwrap();
        let small = signed_proof(&small_kp, vec![1u8; 10], 1);
        pool.submit(small, now);

        let batch = pool.select_batch(10, 200);
        assert_eq!(batch.len(), 1, "the oversized proof must be skipped, not force-admitted");
        assert_eq!(batch[0].payload.len(), 10);
    }

    #[test]
    fn on_committed_purges_regardless_of_outcome() {
        let pool = mempool();
        let kp = Ed25519KeyPair::generate().unwrap();
        let proof = signed_proof(&kp, b"to-be-committed".to_vec(), 1);
        pool.submit(proof.clone(), Instant::now());
        assert_eq!(pool.len(), 1);

        let block = ProofBlock {
            height: 1,
            view: 0,
            prev_block_hash: [0u8; 32],
            timestamp_ns: 0,
            proofs: vec![proof],
            expected_post_root: pop_types::app::StateRoot::empty(),
            proposer_pk: [0u8; 32],
            proposer_sig: [0u8; 64],
        };
        pool.on_committed(&block);
        assert!(pool.is_empty());

        // idempotent: committing again over an already-purged proof is a no-op.
        pool.on_committed(&block);
        assert!(pool.is_empty());
    }
}
