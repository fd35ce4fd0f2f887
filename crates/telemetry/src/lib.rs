// Path: crates/telemetry/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — telemetry
//!
//! Structured logging initialization, a Prometheus metrics registry, and
//! the `/metrics`+`/healthz` HTTP surface (§10.1, §10.2, §10.6).

/// The `/metrics` and `/healthz` HTTP server.
pub mod http;
/// Global structured logging initialization.
pub mod init;
/// The concrete Prometheus-backed metrics sinks.
pub mod prometheus;
/// Abstract per-subsystem metrics sink traits.
pub mod sinks;
/// A RAII phase timer.
pub mod time;

pub use sinks::{consensus_metrics, mempool_metrics, network_metrics, rewards_metrics, verifier_metrics};
pub use time::PhaseTimer;
