// Path: crates/state/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — state
//!
//! The §4.2 Merkle state store: a radix-based binary Merkle trie keyed by
//! `H(key)`, plus the conservation checker and height-versioned snapshots.
//!
//! Unlike the teacher's Jellyfish Merkle Tree (whose `commit_version` hashes
//! only the block height, never real content), every root produced here is
//! a genuine fold of `H(left || right)` internal-node hashes down to
//! `H(0x00 || key || value)` leaves — see [`trie`] for the algorithm.

/// The radix-trie Merkle structure: `apply`, `root`, inclusion proofs.
pub mod trie;
/// The versioned store wrapping the trie with height history and the
/// conservation checker.
pub mod store;

pub use store::{ApplyOutcome, StateStore};
pub use trie::{InclusionProof, Trie};
