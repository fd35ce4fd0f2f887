// Path: crates/consensus/src/engine.rs
//! The per-replica PBFT state machine (§4.3): normal-case voting, quorum
//! tallies, equivocation detection, and view-change bootstrapping.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use pop_crypto::sign::{Ed25519KeyPair, Ed25519PublicKey, SerializableKey, SigningKeyPair, VerifyingKey};
use pop_mempool::Mempool;
use pop_rewards::SilenceTracker;
use pop_state::StateStore;
use pop_types::app::{
    ConsensusMessage, Evidence, Hash32, OffenseFacts, OffenseKind, PreparedEvidence, ProofBlock,
    PublicKey, QuorumCert, StateKey, StateTransition, StateValue,
};
use pop_types::codec::to_bytes_canonical;
use pop_types::config::ReplicaConfig;
use pop_types::error::ConsensusError;

use crate::equivocation::{EquivocationEvidence, VoteTracker};
use crate::status::ReplicaStatus;
use crate::timeout::AdaptiveTimeout;

use tracing::{info, warn};

/// The domain under which committed proofs are recorded in state, keyed by
/// `proof.id`. Non-conserved: admitting a proof is not itself a resource
/// transfer, so this domain carries no conservation obligation. An
/// application embedding this core is free to additionally interpret
/// `proof.payload` into its own conserved-domain writes; that mapping is
/// outside this engine's contract.
pub const PROOF_LEDGER_DOMAIN: u8 = 0;

/// Derives the state writes a candidate block produces: one non-conserved
/// ledger entry per proof, keyed by `proof.id`.
pub fn writes_for_block(block: &ProofBlock) -> Vec<(StateKey, Option<StateValue>)> {
    block
        .proofs
        .iter()
        .map(|p| (StateKey::new(PROOF_LEDGER_DOMAIN, p.id.to_vec()), Some(StateValue::unweighted(p.payload.clone()))))
        .collect()
}

/// Builds the gossip-ready evidence bundle for a `block` this replica
/// rejected as `kind`, for a caller to hand to the Byzantine classifier.
/// Callers pick `kind` from which check in [`Engine::on_pre_prepare`]
/// failed: a state-root mismatch over otherwise well-formed writes is
/// [`OffenseKind::InvalidProposal`]; a `store.simulate` failure (the writes
/// themselves don't conserve) is [`OffenseKind::ConservationViolation`].
pub fn invalid_proposal_evidence(block: &ProofBlock, kind: OffenseKind) -> Result<Evidence, ConsensusError> {
    let hash = block.hash().map_err(|_| ConsensusError::InvalidProofInBlock)?;
    let facts = match kind {
        OffenseKind::InvalidProposal => OffenseFacts::InvalidProposal { height: block.height, view: block.view, block_hash: hash },
        OffenseKind::ConservationViolation => OffenseFacts::ConservationViolation { height: block.height, view: block.view, block_hash: hash },
        OffenseKind::Equivocation => return Err(ConsensusError::InvalidSignature("wrong offense kind for a block rejection")),
    };
    Ok(Evidence { offender: block.proposer_pk, kind, facts, proof: to_bytes_canonical(block) })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Proposed,
    Prepared,
}

/// A single replica's drive through the PBFT state machine for one
/// committee. Owns no I/O; callers (`pop-node`) feed it messages and
/// timer ticks, and dispatch whatever `ConsensusMessage`s it returns.
pub struct Engine {
    config: ReplicaConfig,
    keypair: Ed25519KeyPair,
    mempool: std::sync::Arc<Mempool>,
    height: u64,
    view: u64,
    phase: Phase,
    last_block_hash: Hash32,
    locked: Option<(Hash32, ProofBlock)>,
    prepare_tally: BTreeMap<(u64, u64, Hash32), BTreeMap<PublicKey, [u8; 64]>>,
    commit_tally: BTreeMap<(u64, u64, Hash32), BTreeMap<PublicKey, [u8; 64]>>,
    prepare_votes: VoteTracker,
    commit_votes: VoteTracker,
    view_change_votes: BTreeMap<u64, BTreeMap<PublicKey, ConsensusMessage>>,
    committed_proof_ids: HashSet<Hash32>,
    timeout: AdaptiveTimeout,
    status: ReplicaStatus,
    phase_started_at: Instant,
    equivocations: Vec<EquivocationEvidence>,
    silence: SilenceTracker,
}

impl Engine {
    /// Builds a fresh engine for height 1, view 0, validating `config`.
    pub fn new(config: ReplicaConfig, keypair: Ed25519KeyPair, mempool: std::sync::Arc<Mempool>) -> Result<Self, ConsensusError> {
        config.validate().map_err(|e| ConsensusError::CommitteeIntegrity(e.to_string()))?;
        let timeout = AdaptiveTimeout::new(config.consensus.timeout_base_ms, config.consensus.t_min_ms, config.consensus.t_max_ms);
        let silence = SilenceTracker::new(config.rewards.k_silence);
        Ok(Self {
            config,
            keypair,
            mempool,
            height: 1,
            view: 0,
            phase: Phase::Idle,
            last_block_hash: [0u8; 32],
            locked: None,
            prepare_tally: BTreeMap::new(),
            commit_tally: BTreeMap::new(),
            prepare_votes: VoteTracker::new(),
            commit_votes: VoteTracker::new(),
            view_change_votes: BTreeMap::new(),
            committed_proof_ids: HashSet::new(),
            timeout,
            status: ReplicaStatus::Healthy,
            phase_started_at: Instant::now(),
            equivocations: Vec::new(),
            silence,
        })
    }

    /// Current height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Current view.
    pub fn view(&self) -> u64 {
        self.view
    }

    /// Current observable status.
    pub fn status(&self) -> &ReplicaStatus {
        &self.status
    }

    /// The current timeout for `(height, view)`'s active phase.
    pub fn current_timeout(&self) -> std::time::Duration {
        self.timeout.current()
    }

    fn self_pk(&self) -> PublicKey {
        let mut pk = [0u8; 32];
        pk.copy_from_slice(&self.keypair.public_key().to_bytes());
        pk
    }

    fn is_leader(&self) -> bool {
        self.effective_leader(self.height, self.view) == Some(self.self_pk())
    }

    /// True if this replica is the currently-weighted leader for the active
    /// `(height, view)`.
    pub fn is_leader_now(&self) -> bool {
        self.is_leader()
    }

    /// The currently-weighted leader for the active `(height, view)`.
    pub fn current_leader(&self) -> Option<PublicKey> {
        self.effective_leader(self.height, self.view)
    }

    /// Advances straight to `new_height` (view 0) after a state-sync segment
    /// applied outside normal-case voting, discarding every in-flight vote
    /// and lock for the heights it skipped past.
    pub fn fast_forward(&mut self, new_height: u64, tip_block_hash: Hash32) {
        if new_height < self.height {
            return;
        }
        self.height = new_height;
        self.view = 0;
        self.phase = Phase::Idle;
        self.locked = None;
        self.last_block_hash = tip_block_hash;
        self.prepare_tally.retain(|(ph, _, _), _| *ph >= new_height);
        self.commit_tally.retain(|(ph, _, _), _| *ph >= new_height);
        self.prepare_votes.prune_up_to(new_height.saturating_sub(1));
        self.commit_votes.prune_up_to(new_height.saturating_sub(1));
        self.status = ReplicaStatus::Healthy;
        self.phase_started_at = Instant::now();
        info!(new_height, "fast-forwarded past a sync segment");
    }

    /// The leader for `(h, v)` after applying the §4.4 silence penalty: the
    /// committee's deterministic rotation order, skipping any candidate
    /// currently carrying the soft penalty. Always returns a candidate —
    /// the last offset in the rotation is accepted unconditionally so a
    /// committee where every member is penalized never goes leaderless.
    fn effective_leader(&self, h: u64, v: u64) -> Option<PublicKey> {
        let n = self.config.committee.committee.len() as u64;
        for offset in 0..n {
            let candidate = self.config.committee.leader_at(h, v, offset)?;
            if offset == n.saturating_sub(1) || self.silence.weight_multiplier(&candidate) > 1 {
                return Some(candidate);
            }
        }
        None
    }

    fn sign(&self, preimage: &Hash32) -> Result<[u8; 64], ConsensusError> {
        let sig = self.keypair.sign(preimage).map_err(|e| ConsensusError::SignerUnavailable(e.to_string()))?;
        let bytes = sig.to_bytes();
        let mut out = [0u8; 64];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    fn verify_signer(replica_pk: &PublicKey, preimage: &Hash32, sig: &[u8; 64]) -> bool {
        let Ok(pk) = Ed25519PublicKey::from_bytes(replica_pk) else { return false };
        let Ok(signature) = pop_crypto::sign::Ed25519Signature::from_bytes(sig) else { return false };
        pk.verify(preimage, &signature).is_ok()
    }

    /// If this replica leads `(height, view)` and is idle, proposes a fresh
    /// batch, simulating its effect on `store` to compute `expected_post_root`.
    pub fn propose(&mut self, store: &StateStore, timestamp_ns: u64) -> Result<Option<ConsensusMessage>, ConsensusError> {
        if !self.is_leader() || self.phase != Phase::Idle {
            return Ok(None);
        }
        let proofs = self.mempool.select_batch(self.config.mempool.max_proofs_per_block, self.config.mempool.max_block_bytes);
        let mut block = ProofBlock {
            height: self.height,
            view: self.view,
            prev_block_hash: self.last_block_hash,
            timestamp_ns,
            proofs,
            expected_post_root: store.root(),
            proposer_pk: self.self_pk(),
            proposer_sig: [0u8; 64],
        };
        let provisional_hash = block.hash().map_err(|e| ConsensusError::CommitteeIntegrity(e.to_string()))?;
        let writes = writes_for_block(&block);
        let transition = store.simulate(provisional_hash, &writes).map_err(ConsensusError::ConservationFailed)?;
        block.expected_post_root = transition.post_root;

        let hash = block.hash().map_err(|e| ConsensusError::CommitteeIntegrity(e.to_string()))?;
        let proposer_sig = self.sign(&hash)?;
        block.proposer_sig = proposer_sig;

        self.phase = Phase::Proposed;
        self.phase_started_at = Instant::now();
        Ok(Some(ConsensusMessage::PrePrepare { h: self.height, v: self.view, block, proposer_sig }))
    }

    /// Validates an incoming `PrePrepare` and, on success, emits this
    /// replica's `Prepare` vote (§4.3.3 step 2).
    pub fn on_pre_prepare(&mut self, msg: &ConsensusMessage, store: &StateStore, now_ns: u64) -> Result<Option<ConsensusMessage>, ConsensusError> {
        let ConsensusMessage::PrePrepare { h, v, block, .. } = msg else {
            return Err(ConsensusError::InvalidSignature("expected PrePrepare"));
        };
        if *h != self.height || *v != self.view {
            return Err(ConsensusError::StaleView { h: *h, v: *v, cur_h: self.height, cur_v: self.view });
        }
        if self.effective_leader(*h, *v) != Some(block.proposer_pk) {
            return Err(ConsensusError::NotLeader { h: *h, v: *v });
        }
        if block.prev_block_hash != self.last_block_hash {
            return Err(ConsensusError::PrevHashMismatch);
        }
        let skew = self.config.mempool.clock_skew_ns as i128;
        if (block.timestamp_ns as i128 - now_ns as i128).abs() > skew {
            return Err(ConsensusError::ClockSkewExceeded);
        }
        if block.proofs.iter().any(|p| self.committed_proof_ids.contains(&p.id) || !p.is_well_formed()) {
            return Err(ConsensusError::InvalidProofInBlock);
        }

        let hash = block.hash().map_err(|_| ConsensusError::InvalidProofInBlock)?;
        if !Self::verify_signer(&block.proposer_pk, &hash, &block.proposer_sig) {
            return Err(ConsensusError::InvalidSignature("PrePrepare"));
        }

        let writes = writes_for_block(block);
        let transition = store.simulate(hash, &writes).map_err(ConsensusError::ConservationFailed)?;
        if transition.post_root != block.expected_post_root {
            return Err(ConsensusError::PostRootMismatch { simulated: transition.post_root.to_hex(), expected: block.expected_post_root.to_hex() });
        }

        let prepare_sig = self.sign(&ConsensusMessage::Prepare { h: *h, v: *v, block_hash: hash, replica_pk: self.self_pk(), sig: [0u8; 64] }.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("Prepare"))?)?;
        self.phase = Phase::Proposed;
        self.locked.get_or_insert((hash, block.clone()));
        Ok(Some(ConsensusMessage::Prepare { h: *h, v: *v, block_hash: hash, replica_pk: self.self_pk(), sig: prepare_sig }))
    }

    fn tally_vote(
        tally: &mut BTreeMap<(u64, u64, Hash32), BTreeMap<PublicKey, [u8; 64]>>,
        h: u64,
        v: u64,
        block_hash: Hash32,
        replica_pk: PublicKey,
        sig: [u8; 64],
    ) -> usize {
        let entry = tally.entry((h, v, block_hash)).or_default();
        entry.insert(replica_pk, sig);
        entry.len()
    }

    /// Folds in a `Prepare` vote. Returns `Err` only for malformed/stale
    /// input; a detected equivocation is buffered and surfaced later via
    /// [`Engine::take_equivocations`] rather than interrupting the vote.
    pub fn on_prepare(&mut self, msg: &ConsensusMessage) -> Result<Option<ConsensusMessage>, ConsensusError> {
        let ConsensusMessage::Prepare { h, v, block_hash, replica_pk, sig } = msg else {
            return Err(ConsensusError::InvalidSignature("expected Prepare"));
        };
        if *h != self.height || *v != self.view {
            return Err(ConsensusError::StaleView { h: *h, v: *v, cur_h: self.height, cur_v: self.view });
        }
        let preimage = msg.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("Prepare"))?;
        if !Self::verify_signer(replica_pk, &preimage, sig) {
            return Err(ConsensusError::InvalidSignature("Prepare"));
        }
        if let Some(evidence) = self.prepare_votes.record(*h, *v, *replica_pk, *block_hash, msg.clone()) {
            warn!(height = *h, view = *v, replica = ?replica_pk, "equivocating Prepare detected");
            self.equivocations.push(evidence);
        }

        let count = Self::tally_vote(&mut self.prepare_tally, *h, *v, *block_hash, *replica_pk, *sig);
        let quorum = self.config.committee.quorum();
        if count < quorum || self.phase == Phase::Prepared {
            return Ok(None);
        }
        self.phase = Phase::Prepared;
        let commit_preimage = ConsensusMessage::Commit { h: *h, v: *v, block_hash: *block_hash, replica_pk: self.self_pk(), sig: [0u8; 64] }
            .signing_preimage()
            .map_err(|_| ConsensusError::InvalidSignature("Commit"))?;
        let commit_sig = self.sign(&commit_preimage)?;
        Ok(Some(ConsensusMessage::Commit { h: *h, v: *v, block_hash: *block_hash, replica_pk: self.self_pk(), sig: commit_sig }))
    }

    /// Folds in a `Commit` vote, finalizing the block once `>= 2f+1` are
    /// collected: applies the transition, advances height, resets view.
    pub fn on_commit(&mut self, msg: &ConsensusMessage, store: &mut StateStore) -> Result<Option<(QuorumCert, StateTransition)>, ConsensusError> {
        let ConsensusMessage::Commit { h, v, block_hash, replica_pk, sig } = msg else {
            return Err(ConsensusError::InvalidSignature("expected Commit"));
        };
        if *h != self.height || *v != self.view {
            return Err(ConsensusError::StaleView { h: *h, v: *v, cur_h: self.height, cur_v: self.view });
        }
        let preimage = msg.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("Commit"))?;
        if !Self::verify_signer(replica_pk, &preimage, sig) {
            return Err(ConsensusError::InvalidSignature("Commit"));
        }
        if let Some(evidence) = self.commit_votes.record(*h, *v, *replica_pk, *block_hash, msg.clone()) {
            warn!(height = *h, view = *v, replica = ?replica_pk, "equivocating Commit detected");
            self.equivocations.push(evidence);
        }

        let count = Self::tally_vote(&mut self.commit_tally, *h, *v, *block_hash, *replica_pk, *sig);
        let quorum = self.config.committee.quorum();
        if count < quorum {
            return Ok(None);
        }
        let Some((locked_hash, block)) = self.locked.clone() else { return Ok(None) };
        if locked_hash != *block_hash {
            return Ok(None);
        }

        let writes = writes_for_block(&block);
        let transition = store.simulate(locked_hash, &writes).map_err(ConsensusError::ConservationFailed)?;
        store.commit(transition.clone()).map_err(ConsensusError::ConservationFailed)?;
        self.mempool.on_committed(&block);
        self.silence.record_proposed(block.proposer_pk);
        for p in &block.proofs {
            self.committed_proof_ids.insert(p.id);
        }

        let commit_sigs: Vec<(PublicKey, [u8; 64])> = self
            .commit_tally
            .get(&(*h, *v, *block_hash))
            .map(|m| m.iter().map(|(pk, sig)| (*pk, *sig)).collect())
            .unwrap_or_default();
        let cert = QuorumCert { height: *h, view: *v, block_hash: *block_hash, commit_sigs };

        self.timeout.on_success(self.phase_started_at.elapsed());
        self.prepare_votes.prune_up_to(*h);
        self.commit_votes.prune_up_to(*h);
        self.prepare_tally.retain(|(ph, _, _), _| *ph > *h);
        self.commit_tally.retain(|(ph, _, _), _| *ph > *h);
        self.height = h.wrapping_add(1);
        self.view = 0;
        self.last_block_hash = locked_hash;
        self.phase = Phase::Idle;
        self.locked = None;
        self.status = ReplicaStatus::Healthy;
        self.phase_started_at = Instant::now();

        info!(height = *h, view = *v, ?locked_hash, "block committed");
        Ok(Some((cert, transition)))
    }

    /// Called when the active phase's timer fires: escalates the adaptive
    /// timeout and produces this replica's `ViewChange` vote.
    pub fn on_timeout(&mut self) -> Result<ConsensusMessage, ConsensusError> {
        self.timeout.on_timeout();
        let new_view = self.view.wrapping_add(1);
        warn!(height = self.height, from = self.view, to = new_view, "phase timed out, requesting view change");
        if let Some(missed_leader) = self.effective_leader(self.height, self.view) {
            if self.silence.record_missed(missed_leader) {
                warn!(replica = ?missed_leader, "leader crossed the silence penalty threshold");
            }
        }
        self.status = ReplicaStatus::ViewChanging { h: self.height, from: self.view, to: new_view };
        let prepared_set = self.locked.as_ref().map(|(hash, _)| PreparedEvidence {
            view: self.view,
            block_hash: *hash,
            prepare_sigs: self
                .prepare_tally
                .get(&(self.height, self.view, *hash))
                .map(|m| m.iter().map(|(pk, sig)| (*pk, *sig)).collect())
                .unwrap_or_default(),
        });
        let mut msg = ConsensusMessage::ViewChange { new_view, last_stable_h: self.height.saturating_sub(1), prepared_set, replica_pk: self.self_pk(), sig: [0u8; 64] };
        let preimage = msg.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("ViewChange"))?;
        let sig = self.sign(&preimage)?;
        if let ConsensusMessage::ViewChange { sig: s, .. } = &mut msg {
            *s = sig;
        }
        Ok(msg)
    }

    /// Folds in a peer's `ViewChange` vote. Returns `Some(NewView)` once
    /// this replica collects `>= 2f+1` votes and is the new view's leader.
    pub fn on_view_change(&mut self, msg: &ConsensusMessage) -> Result<Option<ConsensusMessage>, ConsensusError> {
        let ConsensusMessage::ViewChange { new_view, replica_pk, sig, .. } = msg else {
            return Err(ConsensusError::InvalidSignature("expected ViewChange"));
        };
        let preimage = msg.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("ViewChange"))?;
        if !Self::verify_signer(replica_pk, &preimage, sig) {
            return Err(ConsensusError::InvalidSignature("ViewChange"));
        }
        let self_pk = self.self_pk();
        let is_effective_leader = self.effective_leader(self.height, *new_view) == Some(self_pk);
        let votes = self.view_change_votes.entry(*new_view).or_default();
        votes.insert(*replica_pk, msg.clone());
        let count = votes.len();
        let quorum = self.config.committee.quorum();
        if count < quorum {
            return Ok(None);
        }
        if !is_effective_leader {
            return Ok(None);
        }

        let highest_prepared = votes
            .values()
            .filter_map(|m| match m {
                ConsensusMessage::ViewChange { prepared_set: Some(p), .. } => Some(p.clone()),
                _ => None,
            })
            .max_by_key(|p| p.view);
        let fresh_block_or_resume = highest_prepared.and_then(|_| self.locked.as_ref().map(|(_, b)| b.clone()));

        let view_change_proof: Vec<ConsensusMessage> = votes.values().cloned().collect();
        let mut new_view_msg = ConsensusMessage::NewView { new_view: *new_view, view_change_proof, fresh_block_or_resume, sig: [0u8; 64] };
        let preimage = new_view_msg.signing_preimage().map_err(|_| ConsensusError::InvalidSignature("NewView"))?;
        let sig = self.sign(&preimage)?;
        if let ConsensusMessage::NewView { sig: s, .. } = &mut new_view_msg {
            *s = sig;
        }
        self.view = *new_view;
        self.phase = Phase::Idle;
        self.status = ReplicaStatus::Healthy;
        Ok(Some(new_view_msg))
    }

    /// Installs a `NewView`: adopts its view, carrying forward a resumed
    /// block's lock if present, else returning to idle to await a fresh
    /// proposal from the new leader.
    pub fn on_new_view(&mut self, msg: &ConsensusMessage) -> Result<(), ConsensusError> {
        let ConsensusMessage::NewView { new_view, fresh_block_or_resume, .. } = msg else {
            return Err(ConsensusError::InvalidSignature("expected NewView"));
        };
        self.view = *new_view;
        self.phase = Phase::Idle;
        self.locked = None;
        if let Some(block) = fresh_block_or_resume {
            let hash = block.hash().map_err(|_| ConsensusError::InvalidProofInBlock)?;
            self.locked = Some((hash, block.clone()));
            self.phase = Phase::Proposed;
        }
        self.status = ReplicaStatus::Healthy;
        Ok(())
    }

    /// True if a commit certificate was already applied for `proof_id` this
    /// replica's lifetime, i.e. the proof must never be re-admitted.
    pub fn is_committed_proof(&self, proof_id: &Hash32) -> bool {
        self.committed_proof_ids.contains(proof_id)
    }

    /// Drains detected equivocation evidence accumulated by `on_prepare`
    /// and `on_commit` since the last call, for a caller to forward to the
    /// Byzantine classifier.
    pub fn take_equivocations(&mut self) -> Vec<EquivocationEvidence> {
        std::mem::take(&mut self.equivocations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_mempool::{Mempool, MempoolLimits, StructuralEngine, StructuralFingerprintDifficulty};
    use pop_types::app::{Proof, PublicKey as Pk};
    use pop_types::config::{CommitteeConfig, ConsensusConfig, GossipConfig, MempoolConfig, RewardsConfig};
    use std::sync::Arc;

    fn keypair(seed: u8) -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed(&[seed; 32]).unwrap()
    }

    fn pk_bytes(kp: &Ed25519KeyPair) -> Pk {
        let mut out = [0u8; 32];
        out.copy_from_slice(&kp.public_key().to_bytes());
        out
    }

    fn committee_of(seeds: &[u8]) -> (Vec<Ed25519KeyPair>, CommitteeConfig) {
        let kps: Vec<_> = seeds.iter().map(|s| keypair(*s)).collect();
        let committee = kps.iter().map(pk_bytes).collect();
        (kps, CommitteeConfig { committee })
    }

    fn config_for(self_pk: Pk, committee: CommitteeConfig) -> ReplicaConfig {
        ReplicaConfig {
            self_pk,
            committee,
            mempool: MempoolConfig::default(),
            consensus: ConsensusConfig::default(),
            gossip: GossipConfig::default(),
            rewards: RewardsConfig::default(),
            state: pop_types::config::StateConfig::default(),
        }
    }

    fn fresh_mempool() -> Arc<Mempool> {
        let engine = Arc::new(StructuralEngine::new(Arc::new(StructuralFingerprintDifficulty)));
        Arc::new(Mempool::new(engine, MempoolLimits::default()))
    }

    fn submit_proof(mempool: &Mempool, submitter: &Ed25519KeyPair, payload: Vec<u8>) {
        let submitter_pk = pk_bytes(submitter);
        let id = Proof::compute_id(&payload, &submitter_pk).unwrap();
        let sig = submitter.sign(&id).unwrap();
        let mut submitter_sig = [0u8; 64];
        submitter_sig.copy_from_slice(&sig.to_bytes());
        let proof = Proof { id, payload, submitter_pk, submitter_sig, submitted_at_ns: 0 };
        pop_mempool::Mempool::submit(mempool, proof, std::time::Instant::now());
    }

    #[test]
    fn leader_matches_committee_rotation() {
        let (kps, committee) = committee_of(&[1, 2, 3, 4]);
        let cfg = config_for(pk_bytes(&kps[1]), committee);
        let engine = Engine::new(cfg, keypair(2), fresh_mempool()).unwrap();
        assert!(engine.is_leader());
    }

    #[test]
    fn full_round_commits_and_advances_height() {
        let (kps, committee) = committee_of(&[1, 2, 3, 4]);
        let mempool = fresh_mempool();
        let submitter = keypair(9);
        submit_proof(&mempool, &submitter, b"hello".to_vec());

        let leader_idx = 1usize; // leader(1,0) = committee[1]
        let mut engines: Vec<Engine> = kps
            .iter()
            .map(|kp| Engine::new(config_for(pk_bytes(kp), committee.clone()), kp.clone(), Arc::clone(&mempool)).unwrap())
            .collect();

        let store = StateStore::default();
        let pre_prepare = engines[leader_idx].propose(&store, 1_000).unwrap().unwrap();

        let mut prepares = Vec::new();
        for engine in engines.iter_mut() {
            if let Some(p) = engine.on_pre_prepare(&pre_prepare, &store, 1_000).unwrap() {
                prepares.push(p);
            }
        }
        assert_eq!(prepares.len(), 4);

        let mut commits = Vec::new();
        for engine in engines.iter_mut() {
            for prepare in &prepares {
                if let Some(c) = engine.on_prepare(prepare).unwrap() {
                    commits.push(c);
                    break;
                }
            }
        }
        assert_eq!(commits.len(), 4);

        let mut store = store;
        let mut finalized = 0;
        for engine in engines.iter_mut() {
            for commit in &commits {
                if let Some((cert, _transition)) = engine.on_commit(commit, &mut store).unwrap() {
                    assert!(cert.has_quorum(committee.quorum()));
                    finalized += 1;
                    break;
                }
            }
        }
        assert_eq!(finalized, 4);
        for engine in &engines {
            assert_eq!(engine.height(), 2);
            assert_eq!(engine.view(), 0);
        }
    }

    #[test]
    fn stale_message_is_rejected() {
        let (kps, committee) = committee_of(&[1, 2, 3, 4]);
        let mut engine = Engine::new(config_for(pk_bytes(&kps[0]), committee), kps[0].clone(), fresh_mempool()).unwrap();
        let stale = ConsensusMessage::Prepare { h: 99, v: 0, block_hash: [0u8; 32], replica_pk: pk_bytes(&kps[1]), sig: [0u8; 64] };
        assert!(matches!(engine.on_prepare(&stale), Err(ConsensusError::StaleView { .. })));
    }

    #[test]
    fn view_change_quorum_elects_new_leader() {
        let (kps, committee) = committee_of(&[1, 2, 3, 4]);
        // leader(1, 1) = committee[(1+1) % 4] = committee[2]
        let mut leader_engine = Engine::new(config_for(pk_bytes(&kps[2]), committee.clone()), kps[2].clone(), fresh_mempool()).unwrap();

        let mut new_view_msg = None;
        for kp in &kps {
            let vc = ConsensusMessage::ViewChange { new_view: 1, last_stable_h: 0, prepared_set: None, replica_pk: pk_bytes(kp), sig: [0u8; 64] };
            let preimage = vc.signing_preimage().unwrap();
            let sig = kp.sign(&preimage).unwrap();
            let mut signed = vc;
            if let ConsensusMessage::ViewChange { sig: s, .. } = &mut signed {
                let mut out = [0u8; 64];
                out.copy_from_slice(&sig.to_bytes());
                *s = out;
            }
            if let Some(nv) = leader_engine.on_view_change(&signed).unwrap() {
                new_view_msg = Some(nv);
            }
        }
        assert!(new_view_msg.is_some());
        assert_eq!(leader_engine.view(), 1);
    }
}
