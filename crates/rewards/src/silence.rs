// Path: crates/rewards/src/silence.rs
//! Silence tracking (§4.4 class 4): `k_silence` consecutive missed leader
//! turns triggers a soft, non-slashable selection-weight reduction. Unlike
//! equivocation/invalid-proposal/conservation offences, this never produces
//! [`pop_types::app::Evidence`] — it is derived locally by every honest
//! replica from the same committed chain, so there is nothing to gossip or
//! verify.

use std::collections::BTreeMap;

use pop_types::app::PublicKey;

/// Tracks each replica's consecutive missed leader turns and the resulting
/// soft penalty weight.
#[derive(Debug, Default)]
pub struct SilenceTracker {
    consecutive_misses: BTreeMap<PublicKey, u32>,
    k_silence: u32,
}

impl SilenceTracker {
    /// Builds a tracker that penalizes after `k_silence` consecutive misses.
    pub fn new(k_silence: u32) -> Self {
        Self { consecutive_misses: BTreeMap::new(), k_silence }
    }

    /// Records that `leader` was expected to propose and did (a fresh
    /// `PrePrepare` was observed for its turn), resetting its streak.
    pub fn record_proposed(&mut self, leader: PublicKey) {
        self.consecutive_misses.remove(&leader);
    }

    /// Records that `leader`'s turn elapsed with no proposal (a view
    /// change fired against it). Returns `true` the instant the streak
    /// crosses `k_silence`, i.e. the instant the soft penalty newly applies.
    pub fn record_missed(&mut self, leader: PublicKey) -> bool {
        let count = self.consecutive_misses.entry(leader).or_default();
        *count = count.saturating_add(1);
        *count == self.k_silence
    }

    /// `true` if `leader` currently carries the soft penalty.
    pub fn is_penalized(&self, leader: &PublicKey) -> bool {
        self.consecutive_misses.get(leader).is_some_and(|c| *c >= self.k_silence)
    }

    /// The selection-weight multiplier for `leader`: `1` normally, halved
    /// once penalized. Kept as a simple, deterministic scheme since §4.4
    /// only requires the penalty to exist, not a specific decay curve.
    pub fn weight_multiplier(&self, leader: &PublicKey) -> u32 {
        if self.is_penalized(leader) {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_applies_exactly_at_threshold() {
        let mut t = SilenceTracker::new(3);
        let pk = [1u8; 32];
        assert!(!t.record_missed(pk));
        assert!(!t.record_missed(pk));
        assert!(t.record_missed(pk));
        assert!(t.is_penalized(&pk));
    }

    #[test]
    fn proposing_resets_the_streak() {
        let mut t = SilenceTracker::new(2);
        let pk = [1u8; 32];
        t.record_missed(pk);
        t.record_proposed(pk);
        assert!(!t.record_missed(pk));
        assert!(!t.is_penalized(&pk));
    }

    #[test]
    fn weight_halves_once_penalized() {
        let mut t = SilenceTracker::new(1);
        let pk = [1u8; 32];
        assert_eq!(t.weight_multiplier(&pk), 2);
        t.record_missed(pk);
        assert_eq!(t.weight_multiplier(&pk), 1);
    }
}
