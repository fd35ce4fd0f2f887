// Path: crates/telemetry/src/sinks.rs
//! Abstract traits decoupling the core's metric instrumentation from the
//! Prometheus backend, one trait per subsystem (§10.2).

use once_cell::sync::OnceCell;

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured mempool metrics sink, or a no-op if uninitialized.
pub fn mempool_metrics() -> &'static dyn MempoolMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured proof verifier metrics sink.
pub fn verifier_metrics() -> &'static dyn VerifierMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured consensus metrics sink.
pub fn consensus_metrics() -> &'static dyn ConsensusMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured rewards/classifier metrics sink.
pub fn rewards_metrics() -> &'static dyn RewardsMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured networking metrics sink.
pub fn network_metrics() -> &'static dyn NetworkMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// A sink for mempool admission and backpressure metrics (§4.2, §5).
pub trait MempoolMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the current number of proofs held in the mempool.
    fn set_mempool_size(&self, size: f64);
    /// Increments a counter for a `submit()` outcome, labeled by reason
    /// (`"accepted"`, `"rejected_signature"`, `"rejected_duplicate"`,
    /// `"rejected_quota"`, `"rejected_timeout"`).
    fn inc_admission_outcome(&self, outcome: &str);
    /// Sets the gauge for a backpressure-relevant inbox's current occupancy,
    /// labeled by queue name.
    fn set_inbox_occupancy(&self, queue: &str, occupancy: f64);
}
impl MempoolMetricsSink for NopSink {
    fn set_mempool_size(&self, _size: f64) {}
    fn inc_admission_outcome(&self, _outcome: &str) {}
    fn set_inbox_occupancy(&self, _queue: &str, _occupancy: f64) {}
}

/// A sink for proof verifier metrics (§4.2.2).
pub trait VerifierMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the wall-clock duration of a single proof verification.
    fn observe_verification_latency(&self, duration_secs: f64);
}
impl VerifierMetricsSink for NopSink {
    fn observe_verification_latency(&self, _duration_secs: f64) {}
}

/// A sink for consensus engine metrics (§4.3).
pub trait ConsensusMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the duration of one consensus phase, labeled by phase name
    /// (`"pre_prepare"`, `"prepare"`, `"commit"`), feeding the §4.3.5 EWMA.
    fn observe_phase_duration(&self, phase: &str, duration_secs: f64);
    /// Increments the counter of view changes this replica has initiated.
    fn inc_view_changes(&self);
    /// Sets the gauge for the highest height this replica has committed.
    fn set_commit_height(&self, height: u64);
}
impl ConsensusMetricsSink for NopSink {
    fn observe_phase_duration(&self, _phase: &str, _duration_secs: f64) {}
    fn inc_view_changes(&self) {}
    fn set_commit_height(&self, _height: u64) {}
}

/// A sink for Byzantine-classifier and reward-ledger metrics (§4.4).
pub trait RewardsMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter of evidence bundles emitted, labeled by offense kind.
    fn inc_evidence_emitted(&self, kind: &str);
    /// Increments the counter of slashes the ledger has applied.
    fn inc_slashes_applied(&self);
}
impl RewardsMetricsSink for NopSink {
    fn inc_evidence_emitted(&self, _kind: &str) {}
    fn inc_slashes_applied(&self) {}
}

/// A sink for networking-layer metrics (§4.5).
pub trait NetworkMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter of gossip messages received, labeled by topic.
    fn inc_gossip_messages_received(&self, topic: &str);
    /// Sets the gauge for the current number of connected peers.
    fn set_connected_peers(&self, count: f64);
}
impl NetworkMetricsSink for NopSink {
    fn inc_gossip_messages_received(&self, _topic: &str) {}
    fn set_connected_peers(&self, _count: f64) {}
}

/// A unified sink implementing every domain-specific trait, the single
/// surface a concrete backend (Prometheus) needs to implement.
pub trait MetricsSink:
    MempoolMetricsSink + VerifierMetricsSink + ConsensusMetricsSink + RewardsMetricsSink + NetworkMetricsSink
{
}

impl<T> MetricsSink for T where
    T: MempoolMetricsSink + VerifierMetricsSink + ConsensusMetricsSink + RewardsMetricsSink + NetworkMetricsSink
{
}
