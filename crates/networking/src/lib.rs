// Path: crates/networking/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # PoP consensus core — networking
//!
//! The §4.5 network façade: an abstract [`Transport`] trait the consensus
//! core drives without caring whether messages move over libp2p or an
//! in-memory simulation harness, gossip duplicate suppression, a libp2p
//! gossipsub/request-response implementation, and the state-sync segment
//! verification logic.

/// Duplicate-message suppression for flooded gossip.
pub mod dedup;
/// The production libp2p transport.
pub mod libp2p;
/// State-sync request/response types and segment verification.
pub mod sync;
/// The abstract transport trait and gossip message/topic types.
pub mod transport;

pub use dedup::Deduplicator;
pub use sync::{apply_segment, SyncRequest, SyncResponse};
pub use transport::{NetworkMessage, PeerId, SyncRequestEnvelope, Topic, Transport};

pub use self::libp2p::Libp2pTransport;
