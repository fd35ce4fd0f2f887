// Path: crates/storage/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — storage
//!
//! The §6 persisted-state layout over `redb`: one table per top-level
//! prefix (`blocks`, `certs`, `state_nodes`, `roots`, `evidence`,
//! `epoch_config`), matching the table-per-prefix split the teacher's
//! epoch-sharded store uses, simplified to this core's single-writer
//! consensus task (§5) and dropping epoch-GC bookkeeping this
//! specification has no counterpart for.

mod store;

pub use store::RedbStore;
