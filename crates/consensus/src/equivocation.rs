// Path: crates/consensus/src/equivocation.rs
//! Equivocation detection (§3 I6, §4.3.6): a replica signing two distinct
//! votes for the same `(h, v)` phase is cryptographic proof of a Byzantine
//! offence, independent of any quorum.

use pop_types::app::{ConsensusMessage, Evidence, OffenseFacts, OffenseKind, PublicKey};
use pop_types::codec::to_bytes_canonical;
use pop_types::error::ConsensusError;

/// Self-verifying proof that `replica_pk` signed two conflicting votes for
/// the same `(height, view)` phase. Handed to the Byzantine classifier,
/// which turns it into persisted, slashable evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivocationEvidence {
    /// The offending replica.
    pub replica_pk: PublicKey,
    /// The height at which the conflict occurred.
    pub height: u64,
    /// The view at which the conflict occurred.
    pub view: u64,
    /// The first message observed.
    pub first: ConsensusMessage,
    /// The second, conflicting message observed.
    pub second: ConsensusMessage,
}

impl EquivocationEvidence {
    /// Converts locally observed messages into a gossip-ready, canonically
    /// fact-hashed [`Evidence`] bundle any replica can independently verify.
    pub fn into_evidence(self) -> Result<Evidence, ConsensusError> {
        let first_hash = prior_block_hash(&self.first).ok_or(ConsensusError::InvalidSignature("equivocation evidence"))?;
        let second_hash = prior_block_hash(&self.second).ok_or(ConsensusError::InvalidSignature("equivocation evidence"))?;
        Ok(Evidence {
            offender: self.replica_pk,
            kind: OffenseKind::Equivocation,
            facts: OffenseFacts::Equivocation { height: self.height, view: self.view, first_hash, second_hash },
            proof: to_bytes_canonical(&(self.first, self.second)),
        })
    }
}

/// Tracks, per `(height, view)`, the single block hash each replica has
/// voted for in one phase (Prepare or Commit kept in separate trackers).
/// A second, different hash from the same replica is equivocation.
#[derive(Debug, Default)]
pub struct VoteTracker {
    seen: std::collections::HashMap<(u64, u64, PublicKey), ConsensusMessage>,
}

impl VoteTracker {
    /// Builds an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `msg` from `replica_pk` voting for `block_hash` at `(h, v)`.
    /// Returns `Some(evidence)` if this conflicts with a prior vote from
    /// the same replica at the same `(h, v)`.
    pub fn record(
        &mut self,
        h: u64,
        v: u64,
        replica_pk: PublicKey,
        block_hash: [u8; 32],
        msg: ConsensusMessage,
    ) -> Option<EquivocationEvidence> {
        let key = (h, v, replica_pk);
        match self.seen.get(&key) {
            Some(prior) if prior_block_hash(prior) != Some(block_hash) => Some(EquivocationEvidence {
                replica_pk,
                height: h,
                view: v,
                first: prior.clone(),
                second: msg,
            }),
            Some(_) => None,
            None => {
                self.seen.insert(key, msg);
                None
            }
        }
    }

    /// Drops all tallies for heights `<= height`, once they can never be
    /// revisited (the committed tip has advanced past them).
    pub fn prune_up_to(&mut self, height: u64) {
        self.seen.retain(|(h, _, _), _| *h > height);
    }
}

fn prior_block_hash(msg: &ConsensusMessage) -> Option<[u8; 32]> {
    match msg {
        ConsensusMessage::Prepare { block_hash, .. } | ConsensusMessage::Commit { block_hash, .. } => {
            Some(*block_hash)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(h: u64, v: u64, block_hash: [u8; 32], pk: PublicKey) -> ConsensusMessage {
        ConsensusMessage::Prepare { h, v, block_hash, replica_pk: pk, sig: [0u8; 64] }
    }

    #[test]
    fn consistent_votes_produce_no_evidence() {
        let mut tracker = VoteTracker::new();
        let pk = [1u8; 32];
        assert!(tracker.record(1, 0, pk, [9u8; 32], prepare(1, 0, [9u8; 32], pk)).is_none());
        assert!(tracker.record(1, 0, pk, [9u8; 32], prepare(1, 0, [9u8; 32], pk)).is_none());
    }

    #[test]
    fn conflicting_votes_produce_evidence() {
        let mut tracker = VoteTracker::new();
        let pk = [1u8; 32];
        assert!(tracker.record(1, 0, pk, [9u8; 32], prepare(1, 0, [9u8; 32], pk)).is_none());
        let evidence = tracker.record(1, 0, pk, [8u8; 32], prepare(1, 0, [8u8; 32], pk));
        assert!(evidence.is_some());
        assert_eq!(evidence.unwrap().replica_pk, pk);
    }

    #[test]
    fn different_replicas_never_conflict() {
        let mut tracker = VoteTracker::new();
        assert!(tracker.record(1, 0, [1u8; 32], [9u8; 32], prepare(1, 0, [9u8; 32], [1u8; 32])).is_none());
        assert!(tracker.record(1, 0, [2u8; 32], [8u8; 32], prepare(1, 0, [8u8; 32], [2u8; 32])).is_none());
    }

    #[test]
    fn prune_drops_old_heights_only() {
        let mut tracker = VoteTracker::new();
        tracker.record(1, 0, [1u8; 32], [9u8; 32], prepare(1, 0, [9u8; 32], [1u8; 32]));
        tracker.record(2, 0, [1u8; 32], [9u8; 32], prepare(2, 0, [9u8; 32], [1u8; 32]));
        tracker.prune_up_to(1);
        assert_eq!(tracker.seen.len(), 1);
        assert!(tracker.seen.contains_key(&(2, 0, [1u8; 32])));
    }
}
