// Path: crates/node/src/lib.rs
//! The replica process: binds the PoP consensus core to libp2p transport,
//! a redb-backed store, and the telemetry HTTP surface.

pub mod config;
pub mod keys;
pub mod replica;

pub use config::NodeConfig;
