// Path: crates/crypto/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — crypto
//!
//! SHA-256 hashing and Ed25519 signing, backed by `dcrypt`. Every hash and
//! signature in the core flows through this crate so there is exactly one
//! place the primitives are wired up.

/// SHA-256 hashing, mirroring the teacher's `HashFunction` trait pattern.
pub mod hash;
/// Ed25519 key generation, signing, and verification.
pub mod sign;

pub use pop_types::error::CryptoError;
