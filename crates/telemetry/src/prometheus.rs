// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
};

static MEMPOOL_SIZE: OnceCell<Gauge> = OnceCell::new();
static MEMPOOL_ADMISSION_OUTCOMES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static MEMPOOL_INBOX_OCCUPANCY: OnceCell<prometheus::GaugeVec> = OnceCell::new();
static VERIFIER_LATENCY_SECONDS: OnceCell<prometheus::Histogram> = OnceCell::new();
static CONSENSUS_PHASE_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static CONSENSUS_VIEW_CHANGES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_COMMIT_HEIGHT: OnceCell<Gauge> = OnceCell::new();
static REWARDS_EVIDENCE_EMITTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static REWARDS_SLASHES_APPLIED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static NETWORK_GOSSIP_MESSAGES_RECEIVED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static NETWORK_CONNECTED_PEERS: OnceCell<Gauge> = OnceCell::new();

/// The production [`MetricsSink`] backed by the global Prometheus registry.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric.get().expect("prometheus sink not initialized; call telemetry::prometheus::install() first")
    };
}

impl MempoolMetricsSink for PrometheusSink {
    fn set_mempool_size(&self, size: f64) {
        get_metric!(MEMPOOL_SIZE).set(size);
    }
    fn inc_admission_outcome(&self, outcome: &str) {
        get_metric!(MEMPOOL_ADMISSION_OUTCOMES_TOTAL).with_label_values(&[outcome]).inc();
    }
    fn set_inbox_occupancy(&self, queue: &str, occupancy: f64) {
        get_metric!(MEMPOOL_INBOX_OCCUPANCY).with_label_values(&[queue]).set(occupancy);
    }
}

impl VerifierMetricsSink for PrometheusSink {
    fn observe_verification_latency(&self, duration_secs: f64) {
        get_metric!(VERIFIER_LATENCY_SECONDS).observe(duration_secs);
    }
}

impl ConsensusMetricsSink for PrometheusSink {
    fn observe_phase_duration(&self, phase: &str, duration_secs: f64) {
        get_metric!(CONSENSUS_PHASE_DURATION_SECONDS).with_label_values(&[phase]).observe(duration_secs);
    }
    fn inc_view_changes(&self) {
        get_metric!(CONSENSUS_VIEW_CHANGES_TOTAL).inc();
    }
    fn set_commit_height(&self, height: u64) {
        get_metric!(CONSENSUS_COMMIT_HEIGHT).set(height as f64);
    }
}

impl RewardsMetricsSink for PrometheusSink {
    fn inc_evidence_emitted(&self, kind: &str) {
        get_metric!(REWARDS_EVIDENCE_EMITTED_TOTAL).with_label_values(&[kind]).inc();
    }
    fn inc_slashes_applied(&self) {
        get_metric!(REWARDS_SLASHES_APPLIED_TOTAL).inc();
    }
}

impl NetworkMetricsSink for PrometheusSink {
    fn inc_gossip_messages_received(&self, topic: &str) {
        get_metric!(NETWORK_GOSSIP_MESSAGES_RECEIVED_TOTAL).with_label_values(&[topic]).inc();
    }
    fn set_connected_peers(&self, count: f64) {
        get_metric!(NETWORK_CONNECTED_PEERS).set(count);
    }
}

/// Registers all Prometheus collectors and returns a static reference to the
/// sink. Must be called exactly once at process startup, before any metric
/// is recorded.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    MEMPOOL_SIZE
        .set(register_gauge!("pop_mempool_size", "Current number of proofs held in the mempool.")?)
        .expect("static already initialized");
    MEMPOOL_ADMISSION_OUTCOMES_TOTAL
        .set(register_int_counter_vec!(
            "pop_mempool_admission_outcomes_total",
            "Total submit() outcomes, by reason.",
            &["outcome"]
        )?)
        .expect("static already initialized");
    MEMPOOL_INBOX_OCCUPANCY
        .set(prometheus::register_gauge_vec!(
            "pop_mempool_inbox_occupancy",
            "Current occupancy of a backpressure-relevant inbox, by queue.",
            &["queue"]
        )?)
        .expect("static already initialized");
    VERIFIER_LATENCY_SECONDS
        .set(prometheus::register_histogram!(
            "pop_verifier_latency_seconds",
            "Latency of a single proof verification.",
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    CONSENSUS_PHASE_DURATION_SECONDS
        .set(register_histogram_vec!(
            "pop_consensus_phase_duration_seconds",
            "Latency of a single consensus phase, by phase.",
            &["phase"],
            exponential_buckets(0.002, 2.0, 15)?
        )?)
        .expect("static already initialized");
    CONSENSUS_VIEW_CHANGES_TOTAL
        .set(register_int_counter!("pop_consensus_view_changes_total", "Total view changes this replica has initiated.")?)
        .expect("static already initialized");
    CONSENSUS_COMMIT_HEIGHT
        .set(register_gauge!("pop_consensus_commit_height", "Highest height this replica has committed.")?)
        .expect("static already initialized");
    REWARDS_EVIDENCE_EMITTED_TOTAL
        .set(register_int_counter_vec!(
            "pop_rewards_evidence_emitted_total",
            "Total evidence bundles emitted, by offense kind.",
            &["kind"]
        )?)
        .expect("static already initialized");
    REWARDS_SLASHES_APPLIED_TOTAL
        .set(register_int_counter!("pop_rewards_slashes_applied_total", "Total slashes applied by the reward ledger.")?)
        .expect("static already initialized");
    NETWORK_GOSSIP_MESSAGES_RECEIVED_TOTAL
        .set(register_int_counter_vec!(
            "pop_network_gossip_messages_received_total",
            "Total gossip messages received, by topic.",
            &["topic"]
        )?)
        .expect("static already initialized");
    NETWORK_CONNECTED_PEERS
        .set(register_gauge!("pop_network_connected_peers", "Current number of connected peers.")?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
