// Path: crates/node/src/replica.rs
//! The §5 task architecture wiring one replica's [`Engine`] to a transport,
//! a persisted store, and the reward/classifier subsystems: a single
//! consensus task owning all vote/height/view state, a bounded verifier
//! worker pool feeding the mempool, and network bridging tasks honoring
//! the `max_inbox` backpressure bound.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use pop_consensus::{invalid_proposal_evidence, Engine, ReplicaStatus};
use pop_crypto::sign::Ed25519KeyPair;
use pop_mempool::{AdmissionOutcome, DifficultyFn, Mempool};
use pop_networking::{apply_segment, NetworkMessage, PeerId, SyncRequest, SyncRequestEnvelope, SyncResponse, Topic, Transport};
use pop_rewards::{compute_rewards, Classifier, RewardLedger};
use pop_state::StateStore;
use pop_storage::RedbStore;
use pop_types::app::{evidence_id, ConsensusMessage, Evidence, Hash32, OffenseKind, ProofBlock};
use pop_types::codec::to_bytes_canonical;
use pop_types::config::ReplicaConfig;
use pop_types::error::{AdmissionError, ConsensusError};

/// Concurrent proof verifications this replica runs at once (§5's verifier
/// worker pool).
const VERIFIER_POOL_SIZE: usize = 8;

/// How often the consensus task checks for an elapsed phase timer or a
/// chance to propose.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// How far behind the highest height observed in gossip this replica must
/// fall before it declares itself lagging and requests a sync segment.
const LAG_THRESHOLD: u64 = 2;

/// Heights requested per sync round; bounded so one response never demands
/// an unbounded amount of peer bandwidth or local re-verification.
const SYNC_BATCH_HEIGHTS: u64 = 128;

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

/// Spawns the verifier pool and consensus task for one replica, returning
/// the status channel `pop-node`'s telemetry server exposes and a handle to
/// the consensus task.
pub fn spawn(
    config: ReplicaConfig,
    keypair: Ed25519KeyPair,
    mempool: Arc<Mempool>,
    store: StateStore,
    storage: Arc<RedbStore>,
    transport: Arc<dyn Transport>,
    difficulty_fn: Arc<dyn DifficultyFn>,
) -> anyhow::Result<(watch::Receiver<ReplicaStatus>, JoinHandle<()>)> {
    let engine = Engine::new(config.clone(), keypair, Arc::clone(&mempool))?;
    let (status_tx, status_rx) = watch::channel(ReplicaStatus::Healthy);

    let proofs_rx = transport.subscribe(Topic::Proofs);
    tokio::spawn(run_verifier_pool(Arc::clone(&mempool), proofs_rx));

    let consensus_rx = transport.subscribe(Topic::Consensus);
    let evidence_rx = transport.subscribe(Topic::Evidence);
    let sync_requests_rx = transport.subscribe_sync_requests();
    let sync_responses_rx = transport.subscribe_sync_responses();
    // Sized to 2x max_inbox: the priority-drop scheme never refuses a
    // current-view message below that ceiling (§5).
    let (local_tx, local_rx) = mpsc::channel::<ConsensusMessage>(config.consensus.max_inbox * 2);

    let replica = Replica {
        engine,
        store,
        storage,
        transport,
        difficulty_fn,
        classifier: Classifier::new(),
        ledger: RewardLedger::new(),
        proposed_blocks: HashMap::new(),
        status_tx,
        local_tx,
        phase_started_at: Instant::now(),
        last_hv: (0, 0),
        observed_height: 0,
        overloaded: false,
        lagging_since: None,
        sync_inflight: false,
        config,
    };
    let handle = tokio::spawn(replica.run(local_rx, consensus_rx, evidence_rx, sync_requests_rx, sync_responses_rx));
    Ok((status_rx, handle))
}

/// Pulls submitted proofs off `Topic::Proofs` and runs each through
/// [`Mempool::submit`], bounded to [`VERIFIER_POOL_SIZE`] concurrent
/// verifications — the pool §5 places logically beside, not inside, the
/// consensus task.
async fn run_verifier_pool(mempool: Arc<Mempool>, mut proofs_rx: mpsc::Receiver<NetworkMessage>) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(VERIFIER_POOL_SIZE));
    while let Some(msg) = proofs_rx.recv().await {
        let NetworkMessage::Proof(proof) = msg else { continue };
        let mempool = Arc::clone(&mempool);
        let semaphore = Arc::clone(&semaphore);
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else { return };
            let started = Instant::now();
            let outcome = mempool.submit(proof, Instant::now());
            pop_telemetry::verifier_metrics().observe_verification_latency(started.elapsed().as_secs_f64());
            let label = match &outcome {
                AdmissionOutcome::Admitted { .. } => "accepted",
                AdmissionOutcome::Rejected(AdmissionError::InvalidSignature) => "rejected_signature",
                AdmissionOutcome::Rejected(AdmissionError::Duplicate) => "rejected_duplicate",
                AdmissionOutcome::Rejected(AdmissionError::RateLimited) => "rejected_quota",
                AdmissionOutcome::Rejected(AdmissionError::Timeout) => "rejected_timeout",
                AdmissionOutcome::Rejected(_) => "rejected_other",
            };
            pop_telemetry::mempool_metrics().inc_admission_outcome(label);
            pop_telemetry::mempool_metrics().set_mempool_size(mempool.len() as f64);
        });
    }
}

/// The single writer of this replica's consensus state: one [`Engine`], its
/// [`StateStore`], and the reward/classifier bookkeeping that rides along
/// every commit and offence report.
struct Replica {
    engine: Engine,
    store: StateStore,
    storage: Arc<RedbStore>,
    transport: Arc<dyn Transport>,
    config: ReplicaConfig,
    difficulty_fn: Arc<dyn DifficultyFn>,
    classifier: Classifier,
    ledger: RewardLedger,
    /// Blocks this replica has seen proposed but not yet committed, keyed
    /// by hash, so a later `Commit` quorum can recover the block to persist
    /// and reward — `Engine::on_commit` returns only the certificate.
    proposed_blocks: HashMap<Hash32, ProofBlock>,
    status_tx: watch::Sender<ReplicaStatus>,
    /// Every message this replica itself produces is fed back through this
    /// channel so its own vote counts toward its own tallies, exactly as a
    /// peer's vote would.
    local_tx: mpsc::Sender<ConsensusMessage>,
    phase_started_at: Instant,
    last_hv: (u64, u64),
    /// Highest height this replica has observed mentioned in gossiped
    /// consensus messages, regardless of whether it was ever committed
    /// locally.
    observed_height: u64,
    /// Set once the consensus inbox hits its 2x `max_inbox` ceiling; cleared
    /// once occupancy drops back below `max_inbox`.
    overloaded: bool,
    /// `Some((h_local, h_observed))` while this replica considers itself
    /// behind the observed chain tip and is pulling a sync segment.
    lagging_since: Option<(u64, u64)>,
    /// Whether a sync request is outstanding, so [`Self::maybe_request_sync`]
    /// doesn't pile up duplicate requests while waiting on a response.
    sync_inflight: bool,
}

impl Replica {
    fn is_leader_now(&self) -> bool {
        self.engine.is_leader_now()
    }

    async fn run(
        mut self,
        mut local_rx: mpsc::Receiver<ConsensusMessage>,
        mut consensus_net_rx: mpsc::Receiver<NetworkMessage>,
        mut evidence_net_rx: mpsc::Receiver<NetworkMessage>,
        mut sync_requests_rx: mpsc::Receiver<SyncRequestEnvelope>,
        mut sync_responses_rx: mpsc::Receiver<(PeerId, SyncResponse)>,
    ) {
        self.last_hv = (self.engine.height(), self.engine.view());
        let mut ticker = interval(TICK_INTERVAL);
        loop {
            if self.status_tx.borrow().is_fatal() {
                return;
            }
            tokio::select! {
                Some(msg) = local_rx.recv() => {
                    self.handle_local(msg).await;
                }
                Some(net_msg) = consensus_net_rx.recv() => {
                    if let NetworkMessage::Consensus(cm) = net_msg {
                        pop_telemetry::network_metrics().inc_gossip_messages_received(Topic::Consensus.as_str());
                        if let Some((h, _)) = cm.height_view() {
                            self.observed_height = self.observed_height.max(h);
                        }
                        self.try_forward_consensus(cm).await;
                    }
                }
                Some(net_msg) = evidence_net_rx.recv() => {
                    if let NetworkMessage::Evidence(evidence) = net_msg {
                        pop_telemetry::network_metrics().inc_gossip_messages_received(Topic::Evidence.as_str());
                        self.report_offense(evidence).await;
                    }
                }
                Some(req) = sync_requests_rx.recv() => {
                    self.handle_sync_request(req).await;
                }
                Some((peer, response)) = sync_responses_rx.recv() => {
                    self.handle_sync_response(peer, response).await;
                }
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        let current_hv = (self.engine.height(), self.engine.view());
        if current_hv != self.last_hv {
            self.last_hv = current_hv;
            self.phase_started_at = Instant::now();
        }
        pop_telemetry::network_metrics().set_connected_peers(self.transport.peers().len() as f64);

        let max_inbox = self.config.consensus.max_inbox as u64;
        let occupancy = (max_inbox * 2).saturating_sub(self.local_tx.capacity() as u64);
        if self.overloaded && occupancy < max_inbox {
            self.overloaded = false;
        }

        self.maybe_request_sync().await;

        if self.lagging_since.is_some() {
            self.publish_status().await;
            return;
        }

        if self.phase_started_at.elapsed() > self.engine.current_timeout() {
            self.handle_timeout().await;
            self.phase_started_at = Instant::now();
        } else if self.is_leader_now() {
            self.handle_propose().await;
        }
        self.publish_status().await;
    }

    /// Forwards a gossiped consensus message into the local inbox under the
    /// §5 priority-drop scheme: votes (`Prepare`/`Commit`/`ViewChange`/
    /// `NewView`) are dropped once occupancy reaches `max_inbox`, while a
    /// `PrePrepare` for the current `(h, v)` is never dropped below 2x
    /// `max_inbox`. Crossing that ceiling marks this replica overloaded and
    /// forces a view change to shed the backlog.
    async fn try_forward_consensus(&mut self, cm: ConsensusMessage) {
        let max_inbox = self.config.consensus.max_inbox as u64;
        let occupancy = (max_inbox * 2).saturating_sub(self.local_tx.capacity() as u64);
        let high_priority = matches!(
            &cm,
            ConsensusMessage::PrePrepare { h, v, .. } if *h == self.engine.height() && *v == self.engine.view()
        );

        if !high_priority && occupancy >= max_inbox {
            pop_telemetry::network_metrics().inc_gossip_messages_received("dropped_vote_backpressure");
            return;
        }

        match self.local_tx.try_send(cm) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("consensus inbox saturated at 2x max_inbox; forcing a view change");
                self.overloaded = true;
                self.publish_status().await;
                if let Ok(view_change) = self.engine.on_timeout() {
                    self.emit(view_change).await;
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("local consensus channel closed"),
        }
    }

    /// Publishes this replica's externally observable status, layering the
    /// transport-level overload/lag signals the engine cannot see itself
    /// over its own health/view-change/fatal states.
    async fn publish_status(&mut self) {
        let status = if self.overloaded {
            ReplicaStatus::Overloaded
        } else if let Some((h_local, h_observed)) = self.lagging_since {
            ReplicaStatus::Lagging { h_local, h_observed }
        } else {
            self.engine.status().clone()
        };
        let _ = self.status_tx.send(status);
    }

    /// Declares this replica lagging once the observed chain tip runs
    /// [`LAG_THRESHOLD`] heights ahead of its own commits, and pulls the
    /// next segment from a known peer.
    async fn maybe_request_sync(&mut self) {
        let h_local = self.store.height();
        if self.observed_height <= h_local.saturating_add(LAG_THRESHOLD) {
            self.lagging_since = None;
            return;
        }
        self.lagging_since = Some((h_local, self.observed_height));
        if self.sync_inflight {
            return;
        }
        let Some(&peer) = self.transport.peers().iter().next() else {
            return;
        };
        let to_h = self.observed_height.min(h_local + SYNC_BATCH_HEIGHTS);
        let request = SyncRequest { from_h: h_local + 1, to_h };
        match self.transport.request_sync(peer, request).await {
            Ok(()) => self.sync_inflight = true,
            Err(e) => warn!(error = %e, "failed to issue sync request"),
        }
    }

    /// Answers a peer's sync request from this replica's own persisted
    /// history, returning as much of the requested range as is on hand.
    async fn handle_sync_request(&mut self, req: SyncRequestEnvelope) {
        let mut segment = Vec::new();
        for h in req.request.from_h..=req.request.to_h {
            let (Ok(Some(block)), Ok(Some(cert))) = (self.storage.get_block(h), self.storage.get_cert(h)) else {
                break;
            };
            segment.push((block, cert));
        }
        if let Err(e) = self.transport.respond_sync(req.peer, SyncResponse { segment }).await {
            warn!(error = %e, peer = ?req.peer, "failed to answer sync request");
        }
    }

    /// Verifies and applies a sync segment, persisting every height it
    /// advances exactly as a normal commit would.
    async fn handle_sync_response(&mut self, peer: PeerId, response: SyncResponse) {
        self.sync_inflight = false;
        let expected_from = self.store.height() + 1;
        let applied = match apply_segment(&mut self.store, &response.segment, &self.config.committee) {
            Ok(applied) => applied,
            Err(e) => {
                warn!(error = %e, ?peer, "sync segment rejected");
                return;
            }
        };
        for (i, (block, cert)) in response.segment.iter().take(applied as usize).enumerate() {
            let height = expected_from + i as u64;
            if let Err(e) = self.storage.put_block(height, block) {
                error!(error = %e, "failed to persist synced block");
            }
            if let Err(e) = self.storage.put_cert(height, cert) {
                error!(error = %e, "failed to persist synced certificate");
            }
            if let Some(root) = self.store.root_at(height) {
                if let Err(e) = self.storage.put_root(height, &root) {
                    error!(error = %e, "failed to persist synced root");
                }
            }
        }
        if applied > 0 {
            let tip_hash = response.segment[applied as usize - 1].0.hash().unwrap_or([0u8; 32]);
            self.engine.fast_forward(self.store.height() + 1, tip_hash);
            info!(applied, new_height = self.store.height(), ?peer, "applied sync segment");
        }
        self.publish_status().await;
    }

    /// Broadcasts `msg` to the committee and feeds it back to this
    /// replica's own engine.
    async fn emit(&mut self, msg: ConsensusMessage) {
        if let Err(e) = self.transport.broadcast(NetworkMessage::Consensus(msg.clone())).await {
            warn!(error = %e, "failed to broadcast consensus message");
        }
        if self.local_tx.send(msg).await.is_err() {
            warn!("local consensus channel closed");
        }
    }

    async fn handle_propose(&mut self) {
        match self.engine.propose(&self.store, now_ns()) {
            Ok(Some(pre_prepare)) => {
                if let ConsensusMessage::PrePrepare { ref block, .. } = pre_prepare {
                    if let Ok(hash) = block.hash() {
                        self.proposed_blocks.insert(hash, block.clone());
                    }
                } else {
                    unreachable!("propose only ever returns PrePrepare")
                }
                self.emit(pre_prepare).await;
            }
            Ok(None) => {}
            Err(e) => self.handle_engine_error(e, None).await,
        }
    }

    async fn handle_timeout(&mut self) {
        match self.engine.on_timeout() {
            Ok(view_change) => {
                pop_telemetry::consensus_metrics().inc_view_changes();
                self.emit(view_change).await;
            }
            Err(e) => self.handle_engine_error(e, None).await,
        }
    }

    async fn handle_local(&mut self, msg: ConsensusMessage) {
        match msg.clone() {
            ConsensusMessage::PrePrepare { block, .. } => {
                if let Ok(hash) = block.hash() {
                    self.proposed_blocks.insert(hash, block.clone());
                }
                match self.engine.on_pre_prepare(&msg, &self.store, now_ns()) {
                    Ok(Some(prepare)) => self.emit(prepare).await,
                    Ok(None) => {}
                    Err(e) => self.handle_engine_error(e, Some(&block)).await,
                }
            }
            ConsensusMessage::Prepare { .. } => match self.engine.on_prepare(&msg) {
                Ok(Some(commit)) => self.emit(commit).await,
                Ok(None) => {}
                Err(e) => self.handle_engine_error(e, None).await,
            },
            ConsensusMessage::Commit { .. } => match self.engine.on_commit(&msg, &mut self.store) {
                Ok(Some((cert, transition))) => self.on_committed(cert, transition).await,
                Ok(None) => {}
                Err(e) => self.handle_engine_error(e, None).await,
            },
            ConsensusMessage::ViewChange { .. } => match self.engine.on_view_change(&msg) {
                Ok(Some(new_view_msg)) => self.emit(new_view_msg).await,
                Ok(None) => {}
                Err(e) => self.handle_engine_error(e, None).await,
            },
            ConsensusMessage::NewView { fresh_block_or_resume, new_view, .. } => {
                match self.engine.on_new_view(&msg) {
                    Ok(()) => self.on_new_view_adopted(new_view, fresh_block_or_resume).await,
                    Err(e) => self.handle_engine_error(e, None).await,
                }
            }
        }
        self.drain_equivocations().await;
    }

    /// After adopting a new view: either re-submit the resumed block for
    /// this replica's own `Prepare` vote, or, if this replica now leads and
    /// nothing was resumed, propose a fresh batch.
    async fn on_new_view_adopted(&mut self, new_view: u64, resumed: Option<ProofBlock>) {
        match resumed {
            Some(block) => {
                let Ok(hash) = block.hash() else { return };
                self.proposed_blocks.insert(hash, block.clone());
                let proposer_sig = block.proposer_sig;
                let resubmit = ConsensusMessage::PrePrepare { h: self.engine.height(), v: new_view, block, proposer_sig };
                match self.engine.on_pre_prepare(&resubmit, &self.store, now_ns()) {
                    Ok(Some(prepare)) => self.emit(prepare).await,
                    Ok(None) => {}
                    Err(e) => self.handle_engine_error(e, None).await,
                }
            }
            None if self.is_leader_now() => self.handle_propose().await,
            None => {}
        }
    }

    async fn on_committed(&mut self, cert: pop_types::app::QuorumCert, transition: pop_types::app::StateTransition) {
        let Some(block) = self.proposed_blocks.remove(&cert.block_hash) else {
            warn!(height = cert.height, "committed a block this replica never tracked; skipping persistence and rewards");
            return;
        };
        if let Err(e) = self.storage.put_block(cert.height, &block) {
            error!(error = %e, "failed to persist committed block");
        }
        if let Err(e) = self.storage.put_cert(cert.height, &cert) {
            error!(error = %e, "failed to persist commit certificate");
        }
        if let Err(e) = self.storage.put_root(cert.height, &transition.post_root) {
            error!(error = %e, "failed to persist committed root");
        }

        let preparers: Vec<_> = cert.commit_sigs.iter().map(|(pk, _)| *pk).collect();
        let deltas = compute_rewards(&block, &preparers, self.difficulty_fn.as_ref(), &self.config.rewards);
        self.ledger.credit(&deltas);

        pop_telemetry::consensus_metrics().set_commit_height(cert.height);
        info!(height = cert.height, proofs = block.proofs.len(), "block committed");
    }

    /// Turns each buffered equivocation into gossip-ready evidence and
    /// reports it, exactly like an inbound `Evidence` message.
    async fn drain_equivocations(&mut self) {
        for ev in self.engine.take_equivocations() {
            match ev.into_evidence() {
                Ok(evidence) => self.report_offense(evidence).await,
                Err(e) => warn!(error = %e, "failed to build equivocation evidence"),
            }
        }
    }

    async fn report_offense(&mut self, evidence: Evidence) {
        match self.classifier.classify(&evidence, &self.config.rewards) {
            Ok(offense) => {
                self.ledger.slash(offense.offender, offense.slash_amount);
                if let Ok(id) = evidence_id(&evidence) {
                    let bytes = to_bytes_canonical(&evidence);
                    if let Err(e) = self.storage.put_evidence(&id, &bytes) {
                        error!(error = %e, "failed to persist evidence");
                    }
                }
                let kind_label = match offense.kind {
                    OffenseKind::Equivocation => "equivocation",
                    OffenseKind::InvalidProposal => "invalid_proposal",
                    OffenseKind::ConservationViolation => "conservation_violation",
                };
                pop_telemetry::rewards_metrics().inc_evidence_emitted(kind_label);
                pop_telemetry::rewards_metrics().inc_slashes_applied();
                if let Err(e) = self.transport.broadcast(NetworkMessage::Evidence(evidence)).await {
                    warn!(error = %e, "failed to broadcast evidence");
                }
            }
            Err(e) => warn!(error = %e, "offense report rejected by classifier"),
        }
    }

    /// Fatal errors halt the replica (§7); non-fatal proposal/conservation
    /// failures produce slashable evidence against the offending block's
    /// proposer, when a block is in hand; everything else is logged and
    /// dropped.
    async fn handle_engine_error(&mut self, e: ConsensusError, offending_block: Option<&ProofBlock>) {
        if e.is_fatal() {
            let reason = e.to_string();
            error!(reason = %reason, "fatal consensus error; halting replica");
            let _ = self.status_tx.send(ReplicaStatus::Fatal { reason });
            return;
        }
        let kind = match &e {
            ConsensusError::PostRootMismatch { .. } => Some(OffenseKind::InvalidProposal),
            ConsensusError::ConservationFailed(_) => Some(OffenseKind::ConservationViolation),
            _ => None,
        };
        match (kind, offending_block) {
            (Some(kind), Some(block)) => match invalid_proposal_evidence(block, kind) {
                Ok(evidence) => self.report_offense(evidence).await,
                Err(err) => warn!(error = %err, "failed to build invalid-proposal evidence"),
            },
            _ => warn!(error = %e, "consensus message rejected"),
        }
    }
}
