// Path: crates/test_utils/src/sim_transport.rs
//! An in-memory [`Transport`] implementing the §4.5 contract over a shared,
//! deterministically-scripted network: fixed latency, seeded packet loss,
//! symmetric partitions, and Byzantine-silence injection. Unlike the
//! production libp2p transport, every [`SimTransport`] handle sharing a
//! [`SimNetwork`] lives in one process, so a scenario test can wire up a
//! whole committee without touching a socket.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pop_networking::{NetworkMessage, PeerId, SyncRequest, SyncRequestEnvelope, SyncResponse, Topic, Transport};
use pop_types::error::TransportError;

use crate::randomness::TestRng;

/// The fault-injection policy a [`SimNetwork`] applies to every delivery
/// attempt. Cloned into the network at construction; mutated afterwards
/// through [`SimNetwork`]'s partition/silence setters.
#[derive(Debug, Clone)]
pub struct NetworkScript {
    /// Probability, in `[0, 1]`, that an otherwise-deliverable message is
    /// dropped in transit.
    pub loss_probability: f64,
    /// Fixed one-way delivery delay applied to every message that is not
    /// dropped.
    pub latency: Duration,
}

impl Default for NetworkScript {
    fn default() -> Self {
        Self { loss_probability: 0.0, latency: Duration::ZERO }
    }
}

struct SimNetworkInner {
    /// Per-peer, per-topic inbound channel, registered by `subscribe`.
    inboxes: HashMap<PeerId, HashMap<Topic, mpsc::Sender<NetworkMessage>>>,
    /// Per-peer inbound sync-request channel, registered by
    /// `subscribe_sync_requests`.
    sync_request_inboxes: HashMap<PeerId, mpsc::Sender<SyncRequestEnvelope>>,
    /// Per-peer inbound sync-response channel, registered by
    /// `subscribe_sync_responses`.
    sync_response_inboxes: HashMap<PeerId, mpsc::Sender<(PeerId, SyncResponse)>>,
    script: NetworkScript,
    partitioned: HashSet<(PeerId, PeerId)>,
    silenced: HashSet<PeerId>,
    rng: TestRng,
}

/// The shared network hub backing every [`SimTransport`] handed out by
/// [`SimNetwork::new_transport`]. Owns the fault-injection state so a test
/// can partition or silence a peer mid-scenario from outside the replica
/// under test.
pub struct SimNetwork {
    inner: Mutex<SimNetworkInner>,
}

impl SimNetwork {
    /// Builds a network applying `script` to every delivery, with loss
    /// rolls drawn from a `seed`-derived [`TestRng`] for reproducibility.
    pub fn new(script: NetworkScript, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SimNetworkInner {
                inboxes: HashMap::new(),
                sync_request_inboxes: HashMap::new(),
                sync_response_inboxes: HashMap::new(),
                script,
                partitioned: HashSet::new(),
                silenced: HashSet::new(),
                rng: TestRng::new(seed),
            }),
        })
    }

    /// Registers a fresh peer identity and returns its transport handle.
    pub fn new_transport(self: &Arc<Self>) -> (PeerId, Arc<SimTransport>) {
        let peer_id = PeerId::random();
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).inboxes.entry(peer_id).or_default();
        (peer_id, Arc::new(SimTransport { peer_id, network: self.clone() }))
    }

    /// Cuts (or restores) the link between `a` and `b`; messages in either
    /// direction between a partitioned pair are dropped.
    pub fn set_partitioned(&self, a: PeerId, b: PeerId, partitioned: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if partitioned {
            inner.partitioned.insert(pair(a, b));
        } else {
            inner.partitioned.remove(&pair(a, b));
        }
    }

    /// Marks `peer` as Byzantine-silent: every message it originates is
    /// dropped before delivery, modeling a leader or replica that has gone
    /// dark without requiring the peer's own task to stop running.
    pub fn set_silenced(&self, peer: PeerId, silenced: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if silenced {
            inner.silenced.insert(peer);
        } else {
            inner.silenced.remove(&peer);
        }
    }

    fn should_drop(&self, from: PeerId, to: PeerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.silenced.contains(&from) {
            return true;
        }
        if inner.partitioned.contains(&pair(from, to)) {
            return true;
        }
        inner.rng.next_f64() < inner.script.loss_probability
    }

    fn latency(&self) -> Duration {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).script.latency
    }

    fn deliver(&self, from: PeerId, to: PeerId, msg: NetworkMessage, tx: mpsc::Sender<NetworkMessage>) {
        self.deliver_payload(from, to, msg, tx);
    }

    /// Same fault-injection and latency policy as [`Self::deliver`], generic
    /// over the sync request/response payloads that ride a separate,
    /// per-peer inbox rather than the gossip topic inboxes.
    fn deliver_payload<T: Send + 'static>(&self, from: PeerId, to: PeerId, payload: T, tx: mpsc::Sender<T>) {
        if self.should_drop(from, to) {
            return;
        }
        let latency = self.latency();
        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            tx.send(payload).await.ok();
        });
    }
}

fn pair(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a.to_bytes() <= b.to_bytes() {
        (a, b)
    } else {
        (b, a)
    }
}

/// One participant's handle onto a [`SimNetwork`]. Implements the same
/// [`Transport`] trait the production libp2p transport does, so a replica
/// under test cannot tell the two apart.
pub struct SimTransport {
    peer_id: PeerId,
    network: Arc<SimNetwork>,
}

impl SimTransport {
    /// This handle's peer identity, as registered with its [`SimNetwork`].
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn broadcast(&self, msg: NetworkMessage) -> Result<(), TransportError> {
        let topic = msg.topic();
        let targets: Vec<(PeerId, mpsc::Sender<NetworkMessage>)> = {
            let inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .inboxes
                .iter()
                .filter(|(peer, _)| **peer != self.peer_id)
                .filter_map(|(peer, topics)| topics.get(&topic).map(|tx| (*peer, tx.clone())))
                .collect()
        };
        for (peer, tx) in targets {
            self.network.deliver(self.peer_id, peer, msg.clone(), tx);
        }
        Ok(())
    }

    async fn send(&self, peer: PeerId, msg: NetworkMessage) -> Result<(), TransportError> {
        let topic = msg.topic();
        let tx = {
            let inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.inboxes.get(&peer).and_then(|topics| topics.get(&topic).cloned())
        };
        let Some(tx) = tx else {
            return Err(TransportError::Send(format!("unknown peer {peer}")));
        };
        self.network.deliver(self.peer_id, peer, msg, tx);
        Ok(())
    }

    fn subscribe(&self, topic: Topic) -> mpsc::Receiver<NetworkMessage> {
        let (tx, rx) = mpsc::channel(256);
        let mut inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.inboxes.entry(self.peer_id).or_default().insert(topic, tx);
        rx
    }

    fn peers(&self) -> HashSet<PeerId> {
        let inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.inboxes.keys().filter(|peer| **peer != self.peer_id).copied().collect()
    }

    async fn request_sync(&self, peer: PeerId, request: SyncRequest) -> Result<(), TransportError> {
        let tx = {
            let inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sync_request_inboxes.get(&peer).cloned()
        };
        let Some(tx) = tx else {
            return Err(TransportError::Send(format!("unknown sync peer {peer}")));
        };
        self.network.deliver_payload(self.peer_id, peer, SyncRequestEnvelope { peer: self.peer_id, request }, tx);
        Ok(())
    }

    async fn respond_sync(&self, peer: PeerId, response: SyncResponse) -> Result<(), TransportError> {
        let tx = {
            let inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sync_response_inboxes.get(&peer).cloned()
        };
        let Some(tx) = tx else {
            return Err(TransportError::Send(format!("unknown sync peer {peer}")));
        };
        self.network.deliver_payload(self.peer_id, peer, (self.peer_id, response), tx);
        Ok(())
    }

    fn subscribe_sync_requests(&self) -> mpsc::Receiver<SyncRequestEnvelope> {
        let (tx, rx) = mpsc::channel(64);
        let mut inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sync_request_inboxes.insert(self.peer_id, tx);
        rx
    }

    fn subscribe_sync_responses(&self) -> mpsc::Receiver<(PeerId, SyncResponse)> {
        let (tx, rx) = mpsc::channel(64);
        let mut inner = self.network.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sync_response_inboxes.insert(self.peer_id, tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_types::app::{Evidence, OffenseFacts, OffenseKind};

    fn sample() -> NetworkMessage {
        NetworkMessage::Evidence(Evidence {
            offender: [1u8; 32],
            kind: OffenseKind::Equivocation,
            facts: OffenseFacts::Equivocation { height: 1, view: 0, first_hash: [2u8; 32], second_hash: [3u8; 32] },
            proof: vec![],
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_other_subscriber() {
        let net = SimNetwork::new(NetworkScript::default(), 1);
        let (_, a) = net.new_transport();
        let (_, b) = net.new_transport();
        let mut b_rx = b.subscribe(Topic::Evidence);

        a.broadcast(sample()).await.unwrap();
        let got = b_rx.recv().await.unwrap();
        assert_eq!(got, sample());
    }

    #[tokio::test]
    async fn a_partitioned_pair_never_delivers() {
        let net = SimNetwork::new(NetworkScript::default(), 1);
        let (a_id, a) = net.new_transport();
        let (b_id, b) = net.new_transport();
        let mut b_rx = b.subscribe(Topic::Evidence);
        net.set_partitioned(a_id, b_id, true);

        a.broadcast(sample()).await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(50), b_rx.recv()).await;
        assert!(timed_out.is_err());
    }

    #[tokio::test]
    async fn a_silenced_peer_cannot_be_heard() {
        let net = SimNetwork::new(NetworkScript::default(), 1);
        let (a_id, a) = net.new_transport();
        let (_, b) = net.new_transport();
        let mut b_rx = b.subscribe(Topic::Evidence);
        net.set_silenced(a_id, true);

        a.broadcast(sample()).await.unwrap();
        let timed_out = tokio::time::timeout(Duration::from_millis(50), b_rx.recv()).await;
        assert!(timed_out.is_err());
    }
}
