// Path: crates/networking/src/libp2p/mod.rs
//! A libp2p-backed [`Transport`]: gossipsub for flooded messages, a
//! request-response protocol for state sync. Adapted from the teacher's
//! `Libp2pSync` swarm-task/command-channel shape, trimmed to this core's
//! three gossip topics and one sync protocol (the teacher's agentic-prompt
//! and mirror-channel machinery has no counterpart here).

pub mod codec;

use std::collections::{HashMap, HashSet};
use std::iter;
use std::sync::Arc;

use futures::StreamExt;
use libp2p::{
    gossipsub, identity, noise,
    request_response::{self, ResponseChannel},
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, Swarm, SwarmBuilder, Transport as _,
};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::time::Duration;

use pop_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pop_types::error::TransportError;

use crate::dedup::Deduplicator;
use crate::sync::{SyncRequest, SyncResponse};
use crate::transport::{NetworkMessage, SyncRequestEnvelope, Topic, Transport as PopTransport};

use self::codec::SyncCodec;

/// The combined gossipsub + request-response behaviour driving the swarm.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "SwarmBehaviourEvent")]
pub struct SwarmBehaviour {
    gossipsub: gossipsub::Behaviour,
    request_response: request_response::Behaviour<SyncCodec>,
}

/// Events emitted by [`SwarmBehaviour`].
#[derive(Debug)]
pub enum SwarmBehaviourEvent {
    /// A gossipsub event.
    Gossipsub(gossipsub::Event),
    /// A request-response event.
    RequestResponse(request_response::Event<SyncRequest, SyncResponse>),
}

impl From<gossipsub::Event> for SwarmBehaviourEvent {
    fn from(event: gossipsub::Event) -> Self {
        Self::Gossipsub(event)
    }
}

impl From<request_response::Event<SyncRequest, SyncResponse>> for SwarmBehaviourEvent {
    fn from(event: request_response::Event<SyncRequest, SyncResponse>) -> Self {
        Self::RequestResponse(event)
    }
}

/// Commands sent from [`Libp2pTransport`]'s handle into the swarm task.
#[derive(Debug)]
enum SwarmCommand {
    Listen(Multiaddr),
    Dial(Multiaddr),
    Broadcast(Topic, Vec<u8>),
    SendSyncRequest(PeerId, SyncRequest),
    SendSyncResponse(ResponseChannel<SyncResponse>, SyncResponse),
}

/// A sync request a peer sent us, with the channel to answer it on. Kept
/// internal: the request-response crate's reply handle has no meaning
/// outside this module, so it never crosses the generic [`PopTransport`]
/// boundary — `pop-node` sees only a [`SyncRequestEnvelope`] and answers by
/// peer id, and this transport looks the pending channel back up.
struct InboundSyncRequest {
    peer: PeerId,
    request: SyncRequest,
    channel: ResponseChannel<SyncResponse>,
}

/// The production [`Transport`](PopTransport) implementation.
pub struct Libp2pTransport {
    command_tx: mpsc::Sender<SwarmCommand>,
    subscribers: Arc<Mutex<Vec<(Topic, mpsc::Sender<NetworkMessage>)>>>,
    pending_responses: Arc<Mutex<HashMap<PeerId, ResponseChannel<SyncResponse>>>>,
    sync_requests_rx: Mutex<Option<mpsc::Receiver<SyncRequestEnvelope>>>,
    sync_responses_rx: Mutex<Option<mpsc::Receiver<(PeerId, SyncResponse)>>>,
    known_peers: Arc<Mutex<HashSet<PeerId>>>,
    local_peer_id: PeerId,
}

impl Libp2pTransport {
    /// Builds a transport bound to `listen_addr`, optionally dialing
    /// `dial_addrs` on startup.
    pub fn new(local_key: identity::Keypair, listen_addr: Multiaddr, dial_addrs: &[Multiaddr]) -> anyhow::Result<Arc<Self>> {
        let local_peer_id = local_key.public().to_peer_id();
        let (command_tx, command_rx) = mpsc::channel(256);
        let (raw_requests_tx, raw_requests_rx) = mpsc::channel::<InboundSyncRequest>(64);
        let (sync_responses_tx, sync_responses_rx) = mpsc::channel(64);
        let known_peers = Arc::new(Mutex::new(HashSet::new()));
        let subscribers: Arc<Mutex<Vec<(Topic, mpsc::Sender<NetworkMessage>)>>> = Arc::new(Mutex::new(Vec::new()));
        let pending_responses: Arc<Mutex<HashMap<PeerId, ResponseChannel<SyncResponse>>>> = Arc::new(Mutex::new(HashMap::new()));

        let (sync_requests_tx, sync_requests_rx) = mpsc::channel::<SyncRequestEnvelope>(64);
        let pending_for_loop = Arc::clone(&pending_responses);
        tokio::spawn(async move {
            let mut raw_requests_rx = raw_requests_rx;
            while let Some(InboundSyncRequest { peer, request, channel }) = raw_requests_rx.recv().await {
                pending_for_loop.lock().unwrap_or_else(|e| e.into_inner()).insert(peer, channel);
                if sync_requests_tx.send(SyncRequestEnvelope { peer, request }).await.is_err() {
                    break;
                }
            }
        });

        let swarm = build_swarm(local_key)?;
        tokio::spawn(run_swarm_loop(swarm, command_rx, Arc::clone(&subscribers), raw_requests_tx, sync_responses_tx, Arc::clone(&known_peers)));

        let command_tx_for_startup = command_tx.clone();
        let listen = listen_addr.clone();
        let dials = dial_addrs.to_vec();
        tokio::spawn(async move {
            command_tx_for_startup.send(SwarmCommand::Listen(listen)).await.ok();
            for addr in dials {
                command_tx_for_startup.send(SwarmCommand::Dial(addr)).await.ok();
            }
        });

        Ok(Arc::new(Self {
            command_tx,
            subscribers,
            pending_responses,
            sync_requests_rx: Mutex::new(Some(sync_requests_rx)),
            sync_responses_rx: Mutex::new(Some(sync_responses_rx)),
            known_peers,
            local_peer_id,
        }))
    }

    /// This node's libp2p peer id.
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }
}

#[async_trait::async_trait]
impl PopTransport for Libp2pTransport {
    async fn broadcast(&self, msg: NetworkMessage) -> Result<(), TransportError> {
        let topic = msg.topic();
        let bytes = to_bytes_canonical(&msg);
        self.command_tx.send(SwarmCommand::Broadcast(topic, bytes)).await.map_err(|e| TransportError::Broadcast(e.to_string()))
    }

    async fn send(&self, _peer: PeerId, _msg: NetworkMessage) -> Result<(), TransportError> {
        // This core's only point-to-point protocol is sync request/response,
        // exposed via `request_sync`/`respond_sync`; flooded message kinds
        // always go out over `broadcast`.
        Err(TransportError::Send("direct send unsupported; use broadcast or request_sync".into()))
    }

    fn subscribe(&self, topic: Topic) -> mpsc::Receiver<NetworkMessage> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).push((topic, tx));
        rx
    }

    fn peers(&self) -> HashSet<PeerId> {
        self.known_peers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn request_sync(&self, peer: PeerId, request: SyncRequest) -> Result<(), TransportError> {
        self.command_tx.send(SwarmCommand::SendSyncRequest(peer, request)).await.map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn respond_sync(&self, peer: PeerId, response: SyncResponse) -> Result<(), TransportError> {
        let channel = self.pending_responses.lock().unwrap_or_else(|e| e.into_inner()).remove(&peer);
        let Some(channel) = channel else {
            return Err(TransportError::Send(format!("no pending sync request from {peer}")));
        };
        self.command_tx.send(SwarmCommand::SendSyncResponse(channel, response)).await.map_err(|e| TransportError::Send(e.to_string()))
    }

    fn subscribe_sync_requests(&self) -> mpsc::Receiver<SyncRequestEnvelope> {
        self.sync_requests_rx.lock().unwrap_or_else(|e| e.into_inner()).take().unwrap_or_else(|| mpsc::channel(1).1)
    }

    fn subscribe_sync_responses(&self) -> mpsc::Receiver<(PeerId, SyncResponse)> {
        self.sync_responses_rx.lock().unwrap_or_else(|e| e.into_inner()).take().unwrap_or_else(|| mpsc::channel(1).1)
    }
}

fn build_swarm(local_key: identity::Keypair) -> anyhow::Result<Swarm<SwarmBehaviour>> {
    let swarm = SwarmBuilder::with_existing_identity(local_key)
        .with_tokio()
        .with_other_transport(|key| {
            let noise_config = noise::Config::new(key)?;
            let transport = tcp::tokio::Transport::new(tcp::Config::default())
                .upgrade(libp2p::core::upgrade::Version::V1Lazy)
                .authenticate(noise_config)
                .multiplex(yamux::Config::default())
                .timeout(Duration::from_secs(20))
                .boxed();
            Ok(transport)
        })?
        .with_behaviour(|key| {
            let gossipsub = gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Signed(key.clone()), gossipsub::Config::default())?;
            let cfg = request_response::Config::default().with_request_timeout(Duration::from_secs(30));
            let request_response = request_response::Behaviour::new(iter::once(("/pop/sync/1", request_response::ProtocolSupport::Full)), cfg);
            Ok(SwarmBehaviour { gossipsub, request_response })
        })?
        .build();
    Ok(swarm)
}

async fn run_swarm_loop(
    mut swarm: Swarm<SwarmBehaviour>,
    mut command_rx: mpsc::Receiver<SwarmCommand>,
    subscribers: Arc<Mutex<Vec<(Topic, mpsc::Sender<NetworkMessage>)>>>,
    sync_requests_tx: mpsc::Sender<InboundSyncRequest>,
    sync_responses_tx: mpsc::Sender<(PeerId, SyncResponse)>,
    known_peers: Arc<Mutex<HashSet<PeerId>>>,
) {
    let topics = [Topic::Proofs, Topic::Consensus, Topic::Evidence];
    let gossip_topics: Vec<gossipsub::IdentTopic> = topics.iter().map(|t| gossipsub::IdentTopic::new(t.as_str())).collect();
    for topic in &gossip_topics {
        if let Err(e) = swarm.behaviour_mut().gossipsub.subscribe(topic) {
            tracing::warn!(error = %e, %topic, "failed to subscribe to gossipsub topic");
        }
    }
    let mut dedup = Deduplicator::new(Duration::from_secs(30));

    loop {
        tokio::select! {
            event = swarm.select_next_some() => match event {
                SwarmEvent::NewListenAddr { address, .. } => {
                    tracing::info!(target: "pop_networking", %address, "listening");
                }
                SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                    known_peers.lock().unwrap_or_else(|e| e.into_inner()).insert(peer_id);
                }
                SwarmEvent::ConnectionClosed { peer_id, .. } => {
                    known_peers.lock().unwrap_or_else(|e| e.into_inner()).remove(&peer_id);
                }
                SwarmEvent::Behaviour(SwarmBehaviourEvent::Gossipsub(gossipsub::Event::Message { message, .. })) => {
                    let Ok(msg) = from_bytes_canonical::<NetworkMessage>(&message.data) else {
                        tracing::warn!(target: "pop_networking", "failed to decode gossiped message");
                        continue;
                    };
                    let Ok(hash) = Deduplicator::message_hash(&msg) else { continue };
                    if !dedup.observe(hash) {
                        continue;
                    }
                    let topic = msg.topic();
                    let mut subs = subscribers.lock().unwrap_or_else(|e| e.into_inner());
                    subs.retain(|(t, tx)| *t != topic || !tx.is_closed());
                    for (t, tx) in subs.iter() {
                        if *t == topic {
                            tx.try_send(msg.clone()).ok();
                        }
                    }
                }
                SwarmEvent::Behaviour(SwarmBehaviourEvent::RequestResponse(request_response::Event::Message { peer, message })) => match message {
                    request_response::Message::Request { request, channel, .. } => {
                        sync_requests_tx.try_send(InboundSyncRequest { peer, request, channel }).ok();
                    }
                    request_response::Message::Response { response, .. } => {
                        sync_responses_tx.try_send((peer, response)).ok();
                    }
                },
                SwarmEvent::Behaviour(SwarmBehaviourEvent::RequestResponse(request_response::Event::OutboundFailure { peer, error, .. })) => {
                    tracing::warn!(target: "pop_networking", %peer, ?error, "sync request failed");
                }
                _ => {}
            },
            command = command_rx.recv() => match command {
                Some(SwarmCommand::Listen(addr)) => { swarm.listen_on(addr).ok(); }
                Some(SwarmCommand::Dial(addr)) => { swarm.dial(addr).ok(); }
                Some(SwarmCommand::Broadcast(topic, bytes)) => {
                    let ident = gossipsub::IdentTopic::new(topic.as_str());
                    if let Err(e) = swarm.behaviour_mut().gossipsub.publish(ident, bytes) {
                        tracing::warn!(target: "pop_networking", error = %e, "gossip publish failed");
                    }
                }
                Some(SwarmCommand::SendSyncRequest(peer, request)) => {
                    swarm.behaviour_mut().request_response.send_request(&peer, request);
                }
                Some(SwarmCommand::SendSyncResponse(channel, response)) => {
                    swarm.behaviour_mut().request_response.send_response(channel, response).ok();
                }
                None => return,
            }
        }
    }
}
