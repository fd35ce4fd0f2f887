// Path: crates/rewards/src/ledger.rs
//! Reward accounting (§4.4): on commit, verifiers who contributed a valid
//! `Prepare` earn score proportional to the difficulty of the proofs in
//! that block, and the proposer earns a flat leader bonus.

use std::collections::BTreeMap;

use pop_mempool::DifficultyFn;
use pop_types::app::{ProofBlock, PublicKey};
use pop_types::config::RewardsConfig;
use tracing::info;

/// Computes the per-replica score delta a committed block produces:
/// `reward_alpha * total_difficulty` for every replica in `preparers`, plus
/// `reward_beta` for `block.proposer_pk`. `total_difficulty` is the sum of
/// `difficulty_fn` over every proof in `block`, recomputed rather than
/// persisted since the function is pure and deterministic (§4.1).
pub fn compute_rewards(
    block: &ProofBlock,
    preparers: &[PublicKey],
    difficulty_fn: &dyn DifficultyFn,
    config: &RewardsConfig,
) -> Vec<(PublicKey, u64)> {
    let total_difficulty: u64 = block.proofs.iter().map(|p| difficulty_fn.difficulty(p) as u64).sum();
    let mut deltas: BTreeMap<PublicKey, u64> = BTreeMap::new();
    for pk in preparers {
        *deltas.entry(*pk).or_default() += config.reward_alpha.saturating_mul(total_difficulty);
    }
    *deltas.entry(block.proposer_pk).or_default() += config.reward_beta;
    deltas.into_iter().collect()
}

/// Accumulates per-replica score across commits and slashes. Held by
/// `pop-node`; this crate only computes deltas, never persists them —
/// persistence follows the `scores/{pk}` layout under `pop-storage`.
#[derive(Debug, Default)]
pub struct RewardLedger {
    scores: BTreeMap<PublicKey, u64>,
}

impl RewardLedger {
    /// Builds an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a batch of reward deltas.
    pub fn credit(&mut self, deltas: &[(PublicKey, u64)]) {
        for (pk, amount) in deltas {
            *self.scores.entry(*pk).or_default() += amount;
        }
    }

    /// Reduces `pk`'s score by `amount`, floored at zero.
    pub fn slash(&mut self, pk: PublicKey, amount: u64) {
        let entry = self.scores.entry(pk).or_default();
        *entry = entry.saturating_sub(amount);
        info!(replica = ?pk, amount, new_score = *entry, "slash applied");
    }

    /// The current score of `pk`, `0` if never credited.
    pub fn score_of(&self, pk: &PublicKey) -> u64 {
        self.scores.get(pk).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_mempool::StructuralFingerprintDifficulty;
    use pop_types::app::{Proof, StateRoot};

    fn proof(payload: Vec<u8>) -> Proof {
        let submitter_pk: PublicKey = [3u8; 32];
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        Proof { id, payload, submitter_pk, submitter_sig: [0u8; 64], submitted_at_ns: 0 }
    }

    fn block(proofs: Vec<Proof>, proposer_pk: PublicKey) -> ProofBlock {
        ProofBlock {
            height: 1,
            view: 0,
            prev_block_hash: [0u8; 32],
            timestamp_ns: 0,
            proofs,
            expected_post_root: StateRoot::empty(),
            proposer_pk,
            proposer_sig: [0u8; 64],
        }
    }

    #[test]
    fn preparers_and_proposer_both_earn() {
        let proposer = [1u8; 32];
        let preparer = [2u8; 32];
        let b = block(vec![proof(b"hello".to_vec())], proposer);
        let config = RewardsConfig::default();
        let deltas = compute_rewards(&b, &[preparer, proposer], &StructuralFingerprintDifficulty, &config);
        let map: BTreeMap<_, _> = deltas.into_iter().collect();
        assert!(map[&preparer] > 0);
        assert!(map[&proposer] > map[&preparer]); // proposer gets both prepare credit and the flat bonus
    }

    #[test]
    fn slash_floors_at_zero() {
        let mut ledger = RewardLedger::new();
        let pk = [9u8; 32];
        ledger.credit(&[(pk, 10)]);
        ledger.slash(pk, 1000);
        assert_eq!(ledger.score_of(&pk), 0);
    }
}
