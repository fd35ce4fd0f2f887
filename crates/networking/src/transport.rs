// Path: crates/networking/src/transport.rs
//! The abstract transport (§4.5): the core is indifferent to whether
//! messages move over libp2p or an in-memory simulation harness, as long
//! as the implementation honors this contract.

use async_trait::async_trait;
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use pop_types::app::{ConsensusMessage, Evidence, Proof};
use pop_types::error::TransportError;

use crate::sync::{SyncRequest, SyncResponse};

/// The libp2p peer identity, reused as the canonical peer type across both
/// the production transport and the deterministic simulation harness.
pub type PeerId = libp2p::PeerId;

/// The three message kinds gossiped over the network (§4.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum NetworkMessage {
    /// A newly submitted proof, flooded to the mempool of every replica.
    Proof(Proof),
    /// A signed consensus vote or proposal.
    Consensus(ConsensusMessage),
    /// A Byzantine offence report, independently re-verifiable by any replica.
    Evidence(Evidence),
}

impl NetworkMessage {
    /// The topic a message is gossiped under.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Proof(_) => Topic::Proofs,
            Self::Consensus(_) => Topic::Consensus,
            Self::Evidence(_) => Topic::Evidence,
        }
    }
}

/// The fixed set of gossip topics this core uses. Unlike the teacher's
/// mirrored block topics (an A-DMFT-specific redundancy scheme), each kind
/// of message here has exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Newly submitted proofs.
    Proofs,
    /// Consensus votes and proposals.
    Consensus,
    /// Byzantine evidence reports.
    Evidence,
}

impl Topic {
    /// The gossipsub topic string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proofs => "pop/proofs/1",
            Self::Consensus => "pop/consensus/1",
            Self::Evidence => "pop/evidence/1",
        }
    }
}

/// An inbound sync request, paired with the peer it must be answered to —
/// the generic counterpart of the production transport's `ResponseChannel`,
/// which `pop-node` never needs to see directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequestEnvelope {
    /// The peer that sent the request.
    pub peer: PeerId,
    /// The requested height range.
    pub request: SyncRequest,
}

/// The abstract transport (§4.5): `{broadcast, send, subscribe, peers}`,
/// plus the point-to-point sync request/response protocol lagging replicas
/// use to pull committed history. Implemented by the production libp2p
/// transport and, in `pop-test-utils`, by an in-memory harness that injects
/// latency, loss, partitions, and Byzantine peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Floods `msg` to every peer subscribed to its topic.
    async fn broadcast(&self, msg: NetworkMessage) -> Result<(), TransportError>;

    /// Sends `msg` directly to one peer, bypassing gossip.
    async fn send(&self, peer: PeerId, msg: NetworkMessage) -> Result<(), TransportError>;

    /// Subscribes to `topic`, returning a channel of inbound messages.
    fn subscribe(&self, topic: Topic) -> tokio::sync::mpsc::Receiver<NetworkMessage>;

    /// The set of peers currently known to be reachable.
    fn peers(&self) -> std::collections::HashSet<PeerId>;

    /// Requests `(from_h, to_h)` from `peer`. The answer arrives on the
    /// channel returned by [`Self::subscribe_sync_responses`], not as this
    /// call's return value. Transports that don't implement sync reject
    /// every call.
    async fn request_sync(&self, _peer: PeerId, _request: SyncRequest) -> Result<(), TransportError> {
        Err(TransportError::Send("sync unsupported on this transport".into()))
    }

    /// Answers a request previously delivered on
    /// [`Self::subscribe_sync_requests`].
    async fn respond_sync(&self, _peer: PeerId, _response: SyncResponse) -> Result<(), TransportError> {
        Err(TransportError::Send("sync unsupported on this transport".into()))
    }

    /// Subscribes to inbound sync requests from other peers. Called once per
    /// replica lifetime, mirroring [`Self::subscribe`]. The default never
    /// yields anything, for transports that don't implement sync.
    fn subscribe_sync_requests(&self) -> tokio::sync::mpsc::Receiver<SyncRequestEnvelope> {
        tokio::sync::mpsc::channel(1).1
    }

    /// Subscribes to the responses this node's own [`Self::request_sync`]
    /// calls receive, correlated by the `PeerId` that answered.
    fn subscribe_sync_responses(&self) -> tokio::sync::mpsc::Receiver<(PeerId, SyncResponse)> {
        tokio::sync::mpsc::channel(1).1
    }
}
