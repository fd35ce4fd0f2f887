// Path: crates/types/src/config/mod.rs
//! The replica configuration surface enumerated in §6.

use serde::{Deserialize, Serialize};

use crate::app::PublicKey;
use crate::error::ConfigError;

/// The committee for the current epoch and the derived fault tolerance `f`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeConfig {
    /// The ordered set of replica public keys for the current epoch.
    pub committee: Vec<PublicKey>,
}

impl CommitteeConfig {
    /// `f`, derived as `(n - 1) / 3` where `n = committee.len()`.
    pub fn f(&self) -> usize {
        (self.committee.len().saturating_sub(1)) / 3
    }

    /// Quorum size `2f + 1`.
    pub fn quorum(&self) -> usize {
        2 * self.f() + 1
    }

    /// Deterministic leader for `(h, v)`: `committee[(h + v) mod n]` (§4.3.2).
    pub fn leader(&self, h: u64, v: u64) -> Option<PublicKey> {
        self.leader_at(h, v, 0)
    }

    /// The `offset`-th candidate in `(h, v)`'s deterministic rotation order,
    /// i.e. `committee[(h + v + offset) mod n]`. `leader(h, v) ==
    /// leader_at(h, v, 0)`; a caller skipping over a penalized leader walks
    /// increasing `offset` values to find the next candidate.
    pub fn leader_at(&self, h: u64, v: u64, offset: u64) -> Option<PublicKey> {
        if self.committee.is_empty() {
            return None;
        }
        let n = self.committee.len() as u64;
        let idx = (h.wrapping_add(v).wrapping_add(offset)) % n;
        self.committee.get(idx as usize).copied()
    }

    /// Validates `n = 3f + 1` holds exactly for the configured committee.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.committee.len();
        if n == 0 || n != 3 * self.f() + 1 {
            return Err(ConfigError::InvalidCommitteeSize { n });
        }
        Ok(())
    }
}

/// Mempool admission and batching policy (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Maximum proofs a block may contain.
    #[serde(default = "default_max_proofs_per_block")]
    pub max_proofs_per_block: usize,
    /// Maximum encoded block size in bytes.
    #[serde(default = "default_max_block_bytes")]
    pub max_block_bytes: usize,
    /// Minimum admissible difficulty, or `None` for no floor.
    #[serde(default)]
    pub min_difficulty: Option<u32>,
    /// Token-bucket rate, in proofs per second, per submitter.
    #[serde(default = "default_rate_limit")]
    pub mempool_rate_limit_per_submitter: f64,
    /// Token-bucket burst capacity per submitter.
    #[serde(default = "default_burst")]
    pub mempool_burst_per_submitter: u32,
    /// Allowed clock skew (nanoseconds) for proposed block timestamps.
    #[serde(default = "default_clock_skew_ns")]
    pub clock_skew_ns: u64,
}

fn default_max_proofs_per_block() -> usize {
    256
}
fn default_max_block_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_rate_limit() -> f64 {
    50.0
}
fn default_burst() -> u32 {
    100
}
fn default_clock_skew_ns() -> u64 {
    5_000_000_000
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_proofs_per_block: default_max_proofs_per_block(),
            max_block_bytes: default_max_block_bytes(),
            min_difficulty: None,
            mempool_rate_limit_per_submitter: default_rate_limit(),
            mempool_burst_per_submitter: default_burst(),
            clock_skew_ns: default_clock_skew_ns(),
        }
    }
}

/// BFT engine timing policy (§4.3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Base phase timeout in milliseconds before any view-change backoff.
    #[serde(default = "default_timeout_base_ms")]
    pub timeout_base_ms: u64,
    /// Minimum clamp for `T_p`.
    #[serde(default = "default_t_min_ms")]
    pub t_min_ms: u64,
    /// Maximum clamp for `T_p`.
    #[serde(default = "default_t_max_ms")]
    pub t_max_ms: u64,
    /// Window size for the EWMA over successful phase durations.
    #[serde(default = "default_ewma_window")]
    pub ewma_window: usize,
    /// Bound on the consensus task's inbox before lower-priority messages
    /// are dropped (§5).
    #[serde(default = "default_max_inbox")]
    pub max_inbox: usize,
    /// Snapshot retention depth for the state store (§4.2).
    #[serde(default = "default_retain_depth")]
    pub retain_depth: u64,
}

fn default_timeout_base_ms() -> u64 {
    500
}
fn default_t_min_ms() -> u64 {
    250
}
fn default_t_max_ms() -> u64 {
    16_000
}
fn default_ewma_window() -> usize {
    16
}
fn default_max_inbox() -> usize {
    4096
}
fn default_retain_depth() -> u64 {
    128
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            timeout_base_ms: default_timeout_base_ms(),
            t_min_ms: default_t_min_ms(),
            t_max_ms: default_t_max_ms(),
            ewma_window: default_ewma_window(),
            max_inbox: default_max_inbox(),
            retain_depth: default_retain_depth(),
        }
    }
}

/// Gossip fanout/TTL policy (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Number of peers each message is forwarded to per round.
    #[serde(default = "default_gossip_fanout")]
    pub gossip_fanout: usize,
    /// Number of hops before a gossiped message is dropped.
    #[serde(default = "default_gossip_ttl")]
    pub gossip_ttl: u32,
}

fn default_gossip_fanout() -> usize {
    6
}
fn default_gossip_ttl() -> u32 {
    6
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            gossip_fanout: default_gossip_fanout(),
            gossip_ttl: default_gossip_ttl(),
        }
    }
}

/// Reward weighting and slash amounts (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Per-unit-difficulty reward weight for verifiers.
    #[serde(default = "default_reward_alpha")]
    pub reward_alpha: u64,
    /// Flat bonus for the successful proposer.
    #[serde(default = "default_reward_beta")]
    pub reward_beta: u64,
    /// Slash amount for equivocation.
    #[serde(default = "default_slash_eq")]
    pub slash_eq: u64,
    /// Slash amount for an invalid proposal.
    #[serde(default = "default_slash_inv")]
    pub slash_inv: u64,
    /// Slash amount for a conservation violation.
    #[serde(default = "default_slash_cons")]
    pub slash_cons: u64,
    /// Consecutive missed leader turns before the soft silence penalty applies.
    #[serde(default = "default_k_silence")]
    pub k_silence: u32,
}

fn default_reward_alpha() -> u64 {
    1
}
fn default_reward_beta() -> u64 {
    10
}
fn default_slash_eq() -> u64 {
    1000
}
fn default_slash_inv() -> u64 {
    500
}
fn default_slash_cons() -> u64 {
    750
}
fn default_k_silence() -> u32 {
    3
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            reward_alpha: default_reward_alpha(),
            reward_beta: default_reward_beta(),
            slash_eq: default_slash_eq(),
            slash_inv: default_slash_inv(),
            slash_cons: default_slash_cons(),
            k_silence: default_k_silence(),
        }
    }
}

/// State store conservation policy (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// `StateKey::domain` values the conservation checker enforces. Empty
    /// by default: an embedding application must opt in to conservation by
    /// naming its resource-bearing domains here.
    #[serde(default)]
    pub conserved_domains: Vec<u8>,
    /// The governance key authorised to sign mint/burn overrides against a
    /// conserved domain. `None` disables the override entirely, so every
    /// conserved domain's delta must net to zero with no exception.
    #[serde(default)]
    pub mint_burn_authority: Option<PublicKey>,
}

/// The complete, enumerated configuration surface for a single replica (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// This replica's own public key (must be a member of `committee`).
    pub self_pk: PublicKey,
    /// The committee for the current epoch.
    pub committee: CommitteeConfig,
    /// Mempool admission/batching policy.
    #[serde(default)]
    pub mempool: MempoolConfig,
    /// Consensus timing/resource policy.
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Gossip fanout/TTL policy.
    #[serde(default)]
    pub gossip: GossipConfig,
    /// Reward/slash policy.
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// State store conservation policy.
    #[serde(default)]
    pub state: StateConfig,
}

impl ReplicaConfig {
    /// Validates cross-field invariants not expressible via `serde` defaults
    /// alone: committee shape, and that `self_pk` is a committee member.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.committee.validate()?;
        if !self.committee.committee.contains(&self.self_pk) {
            return Err(ConfigError::InvalidValue {
                field: "self_pk",
                reason: "self_pk is not a member of the configured committee".to_string(),
            });
        }
        if self.consensus.t_min_ms > self.consensus.t_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "consensus.t_min_ms",
                reason: "t_min_ms must not exceed t_max_ms".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee(n: usize) -> CommitteeConfig {
        CommitteeConfig {
            committee: (0..n).map(|i| [i as u8; 32]).collect(),
        }
    }

    #[test]
    fn f_and_quorum_for_n4() {
        let c = committee(4);
        assert_eq!(c.f(), 1);
        assert_eq!(c.quorum(), 3);
    }

    #[test]
    fn leader_rotates_with_height_and_view() {
        let c = committee(4);
        assert_eq!(c.leader(1, 0), Some([1u8; 32]));
        assert_eq!(c.leader(1, 1), Some([2u8; 32]));
        assert_eq!(c.leader(4, 0), Some([0u8; 32]));
    }

    #[test]
    fn validate_rejects_non_3f_plus_1_sizes() {
        assert!(committee(4).validate().is_ok());
        assert!(committee(5).validate().is_err());
    }

    #[test]
    fn replica_config_requires_self_pk_in_committee() {
        let cfg = ReplicaConfig {
            self_pk: [99u8; 32],
            committee: committee(4),
            mempool: MempoolConfig::default(),
            consensus: ConsensusConfig::default(),
            gossip: GossipConfig::default(),
            rewards: RewardsConfig::default(),
            state: StateConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }
}
