// Path: crates/consensus/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — consensus
//!
//! The §4.3 PBFT-derived BFT engine: one [`Engine`] per replica, driving
//! pre-prepare/prepare/commit voting, adaptive view-change timeouts, and
//! equivocation detection over a fixed committee.
//!
//! The engine performs no I/O. A host process (`pop-node`) feeds it
//! [`pop_types::app::ConsensusMessage`]s and timer ticks and is responsible
//! for signing, broadcasting, and persisting whatever it returns.

/// The per-replica state machine.
pub mod engine;
/// Self-verifying equivocation detection across Prepare/Commit votes.
pub mod equivocation;
/// Externally observable replica health.
pub mod status;
/// Adaptive, EWMA-smoothed per-phase timeouts.
pub mod timeout;

pub use engine::{invalid_proposal_evidence, writes_for_block, Engine, PROOF_LEDGER_DOMAIN};
pub use equivocation::{EquivocationEvidence, VoteTracker};
pub use status::ReplicaStatus;
pub use timeout::AdaptiveTimeout;
