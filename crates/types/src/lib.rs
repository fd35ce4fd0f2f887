// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — types
//!
//! Foundational crate for the Proof-of-Proof consensus core, containing the
//! data model (§3), the canonical deterministic codec, the shared error
//! taxonomy, and the configuration surface (§6). As the base crate,
//! `pop-types` has minimal dependencies and is a dependency of every other
//! crate in the workspace.

/// The maximum number of proofs a single `ProofBlock` may contain by default.
pub const DEFAULT_MAX_PROOFS_PER_BLOCK: usize = 256;

/// A crate-wide `Result` alias defaulting to [`error::CoreError`].
pub type Result<T, E = crate::error::CoreError> = std::result::Result<T, E>;

/// Core data structures: `Proof`, `ProofBlock`, `StateKey`/`StateValue`,
/// `StateTransition`, and `ConsensusMessage`.
pub mod app;
/// The canonical, deterministic binary codec used for hashing and signing.
pub mod codec;
/// The configuration surface enumerated in §6.
pub mod config;
/// The shared error taxonomy, partitioned by recoverability per §7.
pub mod error;
/// Constants for well-known persisted-state key prefixes (§6).
pub mod keys;
