// Path: crates/types/src/app/consensus.rs
//! `ConsensusMessage` variants — §3, §4.3.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{domain_hash, Hash32, ProofBlock, PublicKey, SigDomain, SignatureBytes};
use crate::error::CryptoError;

/// `serde` support for `Vec<(PublicKey, SignatureBytes)>`: `serde` only
/// derives array impls up to 32 elements, so the 64-byte `SignatureBytes`
/// half of the pair needs an explicit (de)serialize path.
mod sig_pair_vec {
    use super::{PublicKey, SignatureBytes};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(v: &[(PublicKey, SignatureBytes)], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let as_vecs: Vec<(PublicKey, Vec<u8>)> =
            v.iter().map(|(pk, sig)| (*pk, sig.to_vec())).collect();
        as_vecs.serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec<(PublicKey, SignatureBytes)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Vec<(PublicKey, Vec<u8>)> = Vec::deserialize(d)?;
        raw.into_iter()
            .map(|(pk, sig)| {
                let sig: SignatureBytes = sig
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("invalid signature length"))?;
                Ok((pk, sig))
            })
            .collect()
    }
}

/// The highest-prepared evidence a replica carries into a view change: the
/// block (if any) it locked on at its highest prepared `(h, v)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct PreparedEvidence {
    /// The view in which the replica last prepared a block.
    pub view: u64,
    /// The hash of the block it prepared, if any.
    pub block_hash: Hash32,
    /// The `>= 2f+1` Prepare signatures justifying the lock.
    #[serde(with = "sig_pair_vec")]
    pub prepare_sigs: Vec<(PublicKey, SignatureBytes)>,
}

/// The five message kinds exchanged by the BFT engine (§3, §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ConsensusMessage {
    /// Proposes a block for `(h, v)`. Only `leader(h, v)` may emit a valid one.
    PrePrepare {
        /// Height.
        h: u64,
        /// View.
        v: u64,
        /// The proposed block.
        block: ProofBlock,
        /// The proposer's signature over the message.
        #[serde(with = "serde_big_array::BigArray")]
        proposer_sig: SignatureBytes,
    },
    /// Votes that a replica accepts `block_hash` for `(h, v)`.
    Prepare {
        /// Height.
        h: u64,
        /// View.
        v: u64,
        /// The hash of the block being prepared.
        block_hash: Hash32,
        /// The voting replica's public key.
        replica_pk: PublicKey,
        /// The replica's signature.
        #[serde(with = "serde_big_array::BigArray")]
        sig: SignatureBytes,
    },
    /// Votes that a replica has locked on `block_hash` for `(h, v)`.
    Commit {
        /// Height.
        h: u64,
        /// View.
        v: u64,
        /// The hash of the block being committed.
        block_hash: Hash32,
        /// The voting replica's public key.
        replica_pk: PublicKey,
        /// The replica's signature.
        #[serde(with = "serde_big_array::BigArray")]
        sig: SignatureBytes,
    },
    /// Requests a view change to `new_view`, carrying the sender's
    /// highest-prepared evidence (if any) for the stalled height.
    ViewChange {
        /// The view being requested.
        new_view: u64,
        /// The last height this replica considers stable (committed).
        last_stable_h: u64,
        /// The sender's highest-prepared evidence, if it prepared anything.
        prepared_set: Option<PreparedEvidence>,
        /// The sender's public key.
        replica_pk: PublicKey,
        /// The sender's signature.
        #[serde(with = "serde_big_array::BigArray")]
        sig: SignatureBytes,
    },
    /// Installs `new_view`, either resuming the highest-prepared block
    /// found in the collected `ViewChange`s or proposing a fresh batch.
    NewView {
        /// The view being installed.
        new_view: u64,
        /// The `>= 2f+1` `ViewChange` messages justifying the transition.
        view_change_proof: Vec<ConsensusMessage>,
        /// The block being resumed, or `None` if a fresh batch must be proposed.
        fresh_block_or_resume: Option<ProofBlock>,
        /// The new leader's signature.
        #[serde(with = "serde_big_array::BigArray")]
        sig: SignatureBytes,
    },
}

impl ConsensusMessage {
    /// The `(height, view)` this message pertains to, where applicable.
    /// `ViewChange`/`NewView` key on `new_view` alone (no fixed height).
    pub fn height_view(&self) -> Option<(u64, u64)> {
        match self {
            Self::PrePrepare { h, v, .. } | Self::Prepare { h, v, .. } | Self::Commit { h, v, .. } => {
                Some((*h, *v))
            }
            Self::ViewChange { .. } | Self::NewView { .. } => None,
        }
    }

    /// The public key of the message's signer.
    pub fn signer(&self) -> PublicKey {
        match self {
            Self::PrePrepare { block, .. } => block.proposer_pk,
            Self::Prepare { replica_pk, .. }
            | Self::Commit { replica_pk, .. }
            | Self::ViewChange { replica_pk, .. } => *replica_pk,
            Self::NewView { .. } => [0u8; 32], // signer recovered from view_change_proof by the caller
        }
    }

    /// The domain-separated preimage this message's signature covers.
    pub fn signing_preimage(&self) -> Result<Hash32, CryptoError> {
        let domain = match self {
            Self::PrePrepare { .. } => SigDomain::ProofBlockSig,
            Self::Prepare { .. } => SigDomain::PrepareSig,
            Self::Commit { .. } => SigDomain::CommitSig,
            Self::ViewChange { .. } => SigDomain::ViewChangeSig,
            Self::NewView { .. } => SigDomain::NewViewSig,
        };
        let mut unsigned = self.clone();
        strip_signature(&mut unsigned);
        let encoded = crate::codec::to_bytes_canonical(&unsigned);
        domain_hash(domain, &encoded)
    }
}

/// A commit certificate: the `>= 2f+1` `Commit` signatures that finalized a
/// block at `(height, view)`. Persisted at `certs/{height}` (§6) so a
/// syncing replica can adopt a height without replaying the full vote
/// exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct QuorumCert {
    /// The finalized height.
    pub height: u64,
    /// The view the block was committed in.
    pub view: u64,
    /// The hash of the committed block.
    pub block_hash: Hash32,
    /// The distinct `(replica_pk, sig)` pairs making up the quorum.
    #[serde(with = "sig_pair_vec")]
    pub commit_sigs: Vec<(PublicKey, SignatureBytes)>,
}

impl QuorumCert {
    /// The domain-separated preimage each `commit_sigs` entry signs: the
    /// same preimage a lone `Commit` message would sign for this block.
    pub fn commit_preimage(&self) -> Result<Hash32, CryptoError> {
        ConsensusMessage::Commit {
            h: self.height,
            v: self.view,
            block_hash: self.block_hash,
            replica_pk: [0u8; 32],
            sig: [0u8; 64],
        }
        .signing_preimage()
    }

    /// `true` if `commit_sigs` names at least `needed` distinct signers.
    pub fn has_quorum(&self, needed: usize) -> bool {
        let mut signers: Vec<PublicKey> = self.commit_sigs.iter().map(|(pk, _)| *pk).collect();
        signers.sort_unstable();
        signers.dedup();
        signers.len() >= needed
    }
}

fn strip_signature(msg: &mut ConsensusMessage) {
    match msg {
        ConsensusMessage::PrePrepare { proposer_sig, .. } => *proposer_sig = [0u8; 64],
        ConsensusMessage::Prepare { sig, .. }
        | ConsensusMessage::Commit { sig, .. }
        | ConsensusMessage::ViewChange { sig, .. }
        | ConsensusMessage::NewView { sig, .. } => *sig = [0u8; 64],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_view_present_for_vote_messages() {
        let m = ConsensusMessage::Prepare {
            h: 5,
            v: 1,
            block_hash: [0u8; 32],
            replica_pk: [1u8; 32],
            sig: [0u8; 64],
        };
        assert_eq!(m.height_view(), Some((5, 1)));
    }

    #[test]
    fn quorum_cert_counts_distinct_signers_only() {
        let cert = QuorumCert {
            height: 3,
            view: 0,
            block_hash: [7u8; 32],
            commit_sigs: vec![
                ([1u8; 32], [0u8; 64]),
                ([1u8; 32], [1u8; 64]), // duplicate signer, different bytes
                ([2u8; 32], [0u8; 64]),
            ],
        };
        assert!(!cert.has_quorum(3));
        assert!(cert.has_quorum(2));
    }

    #[test]
    fn signing_preimage_ignores_signature_bytes() {
        let mut a = ConsensusMessage::Commit {
            h: 1,
            v: 0,
            block_hash: [2u8; 32],
            replica_pk: [3u8; 32],
            sig: [0u8; 64],
        };
        let mut b = a.clone();
        if let ConsensusMessage::Commit { sig, .. } = &mut b {
            *sig = [9u8; 64];
        }
        assert_eq!(a.signing_preimage().unwrap(), b.signing_preimage().unwrap());
        if let ConsensusMessage::Commit { h, .. } = &mut a {
            *h = 2;
        }
        assert_ne!(a.signing_preimage().unwrap(), b.signing_preimage().unwrap());
    }
}
