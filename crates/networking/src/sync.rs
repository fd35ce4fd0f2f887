// Path: crates/networking/src/sync.rs
//! State sync (§4.5): a lagging replica requests a `(from_h, to_h)` range
//! of commit certificates and blocks from `>= f+1` peers and accepts the
//! segment iff every certificate verifies and every transition reproduces
//! its advertised post-root. This path never bypasses proof verification —
//! each block is re-simulated through `pop_consensus::writes_for_block`
//! exactly as it would be during normal-case consensus.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use pop_consensus::writes_for_block;
use pop_crypto::sign::{Ed25519PublicKey, Ed25519Signature, SerializableKey, VerifyingKey};
use pop_state::StateStore;
use pop_types::app::{ProofBlock, PublicKey, QuorumCert};
use pop_types::config::CommitteeConfig;
use pop_types::error::ConsensusError;

/// A request for a contiguous range of committed heights, `from_h..=to_h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SyncRequest {
    /// First height requested, inclusive.
    pub from_h: u64,
    /// Last height requested, inclusive.
    pub to_h: u64,
}

/// A response carrying one block and its commit certificate per requested
/// height, in ascending height order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SyncResponse {
    /// The `(block, certificate)` pairs covering the requested range, or as
    /// much of it as the responder has.
    pub segment: Vec<(ProofBlock, QuorumCert)>,
}

/// Verifies a commit certificate against its block and a committee.
fn verify_cert(block: &ProofBlock, cert: &QuorumCert, committee: &CommitteeConfig) -> Result<(), ConsensusError> {
    let hash = block.hash().map_err(|_| ConsensusError::InvalidProofInBlock)?;
    if hash != cert.block_hash || block.height != cert.height || block.view != cert.view {
        return Err(ConsensusError::InvalidSignature("sync certificate does not match its block"));
    }
    if !cert.has_quorum(committee.quorum()) {
        return Err(ConsensusError::QuorumNotReached { got: cert.commit_sigs.len(), needed: committee.quorum() });
    }
    let preimage = cert.commit_preimage().map_err(|_| ConsensusError::InvalidSignature("commit certificate"))?;
    let committee_set: std::collections::HashSet<PublicKey> = committee.committee.iter().copied().collect();
    for (pk, sig) in &cert.commit_sigs {
        if !committee_set.contains(pk) {
            return Err(ConsensusError::InvalidSignature("commit signer outside committee"));
        }
        let Ok(verifying_key) = Ed25519PublicKey::from_bytes(pk) else {
            return Err(ConsensusError::InvalidSignature("malformed commit signer key"));
        };
        let Ok(signature) = Ed25519Signature::from_bytes(sig) else {
            return Err(ConsensusError::InvalidSignature("malformed commit signature"));
        };
        if verifying_key.verify(&preimage, &signature).is_err() {
            return Err(ConsensusError::InvalidSignature("commit signature"));
        }
    }
    Ok(())
}

/// Applies a verified sync segment to `store` in order, stopping at the
/// first height that fails certificate or post-root verification and
/// returning how many heights were actually applied. A partial result is
/// still useful: the caller can request the remainder from another peer.
pub fn apply_segment(store: &mut StateStore, segment: &[(ProofBlock, QuorumCert)], committee: &CommitteeConfig) -> Result<u64, ConsensusError> {
    let mut applied = 0u64;
    for (block, cert) in segment {
        if block.height != store.height() + 1 {
            break;
        }
        if verify_cert(block, cert, committee).is_err() {
            break;
        }
        let writes = writes_for_block(block);
        let transition = match store.simulate(cert.block_hash, &writes) {
            Ok(t) => t,
            Err(_) => break,
        };
        if transition.post_root != block.expected_post_root {
            break;
        }
        match store.commit(transition) {
            Ok(_) => applied += 1,
            Err(_) => break,
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_crypto::sign::{Ed25519KeyPair, SigningKeyPair};
    use pop_types::app::StateRoot;

    fn keypair(seed: u8) -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed(&[seed; 32]).unwrap()
    }

    fn pk_bytes(kp: &Ed25519KeyPair) -> PublicKey {
        let mut out = [0u8; 32];
        out.copy_from_slice(&kp.public_key().to_bytes());
        out
    }

    fn committed_block(proposer: &Ed25519KeyPair, height: u64, store: &StateStore) -> (ProofBlock, [u8; 32]) {
        let mut block = ProofBlock {
            height,
            view: 0,
            prev_block_hash: [0u8; 32],
            timestamp_ns: 0,
            proofs: vec![],
            expected_post_root: store.root(),
            proposer_pk: pk_bytes(proposer),
            proposer_sig: [0u8; 64],
        };
        let writes = writes_for_block(&block);
        let hash = block.hash().unwrap();
        let transition = store.simulate(hash, &writes).unwrap();
        block.expected_post_root = transition.post_root;
        let hash = block.hash().unwrap();
        (block, hash)
    }

    fn sign_cert(block: &ProofBlock, hash: [u8; 32], signers: &[&Ed25519KeyPair]) -> QuorumCert {
        let mut cert = QuorumCert { height: block.height, view: block.view, block_hash: hash, commit_sigs: vec![] };
        let preimage = cert.commit_preimage().unwrap();
        for kp in signers {
            let sig = kp.sign(&preimage).unwrap();
            let mut out = [0u8; 64];
            out.copy_from_slice(&sig.to_bytes());
            cert.commit_sigs.push((pk_bytes(kp), out));
        }
        cert
    }

    #[test]
    fn a_fully_verified_segment_advances_the_store() {
        let kps: Vec<_> = (1..=4u8).map(keypair).collect();
        let committee = CommitteeConfig { committee: kps.iter().map(pk_bytes).collect() };
        let store = StateStore::default();
        let (block, hash) = committed_block(&kps[0], 1, &store);
        let cert = sign_cert(&block, hash, &[&kps[0], &kps[1], &kps[2]]);

        let mut store = store;
        let applied = apply_segment(&mut store, &[(block, cert)], &committee).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(store.height(), 1);
    }

    #[test]
    fn a_certificate_without_quorum_is_rejected() {
        let kps: Vec<_> = (1..=4u8).map(keypair).collect();
        let committee = CommitteeConfig { committee: kps.iter().map(pk_bytes).collect() };
        let store = StateStore::default();
        let (block, hash) = committed_block(&kps[0], 1, &store);
        let cert = sign_cert(&block, hash, &[&kps[0]]);

        let mut store = store;
        let applied = apply_segment(&mut store, &[(block, cert)], &committee).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(store.height(), 0);
    }

    #[test]
    fn a_tampered_post_root_is_rejected() {
        let kps: Vec<_> = (1..=4u8).map(keypair).collect();
        let committee = CommitteeConfig { committee: kps.iter().map(pk_bytes).collect() };
        let store = StateStore::default();
        let (mut block, _) = committed_block(&kps[0], 1, &store);
        block.expected_post_root = StateRoot([9u8; 32]);
        let hash = block.hash().unwrap();
        let cert = sign_cert(&block, hash, &[&kps[0], &kps[1], &kps[2]]);

        let mut store = store;
        let applied = apply_segment(&mut store, &[(block, cert)], &committee).unwrap();
        assert_eq!(applied, 0);
    }
}
