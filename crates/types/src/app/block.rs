// Path: crates/types/src/app/block.rs
//! `ProofBlock` — §3.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{domain_hash, Hash32, Proof, PublicKey, SigDomain, SignatureBytes, StateRoot};
use crate::error::CryptoError;

/// The proposable unit of the core: an ordered batch of proofs plus the
/// post-state root their proposer claims applying them will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct ProofBlock {
    /// The block's height.
    pub height: u64,
    /// The view in which this block was proposed.
    pub view: u64,
    /// Hash of the previous committed block (the genesis block uses all-zero).
    pub prev_block_hash: Hash32,
    /// Proposer-claimed wall-clock nanoseconds.
    pub timestamp_ns: u64,
    /// The ordered batch of proofs, per §4.1's batching order.
    pub proofs: Vec<Proof>,
    /// The root the proposer claims results from applying `proofs`.
    pub expected_post_root: StateRoot,
    /// The proposer's Ed25519 public key.
    pub proposer_pk: PublicKey,
    /// The proposer's signature over [`ProofBlock::hash`].
    #[serde(with = "serde_big_array::BigArray")]
    pub proposer_sig: SignatureBytes,
}

impl ProofBlock {
    /// Default cap on proofs per block (§3).
    pub const DEFAULT_MAX_PROOFS_PER_BLOCK: usize = 256;

    /// `hash = H(encode(block without sig))` — the proposer signs this hash,
    /// so the signature itself must be excluded from the preimage.
    pub fn hash(&self) -> Result<Hash32, CryptoError> {
        let mut unsigned = self.clone();
        unsigned.proposer_sig = [0u8; 64];
        let encoded = crate::codec::to_bytes_canonical(&unsigned);
        domain_hash(SigDomain::ProofBlockHash, &encoded)
    }

    /// The preimage the proposer's signature is computed over: the
    /// block-hash domain tag applied to the block hash itself.
    pub fn signing_preimage(&self) -> Result<Hash32, CryptoError> {
        let h = self.hash()?;
        domain_hash(SigDomain::ProofBlockSig, &h)
    }

    /// Total encoded byte size of the block, for the `max_block_bytes` policy.
    pub fn encoded_len(&self) -> usize {
        crate::codec::to_bytes_canonical(self).len()
    }

    /// `true` iff the height/view pair, proof count, and byte-size all
    /// respect the supplied policy bounds.
    pub fn within_policy(&self, max_proofs: usize, max_bytes: usize) -> bool {
        self.proofs.len() <= max_proofs && self.encoded_len() <= max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> ProofBlock {
        ProofBlock {
            height: 1,
            view: 0,
            prev_block_hash: [0u8; 32],
            timestamp_ns: 1000,
            proofs: vec![],
            expected_post_root: StateRoot::empty(),
            proposer_pk: [1u8; 32],
            proposer_sig: [0u8; 64],
        }
    }

    #[test]
    fn hash_is_independent_of_signature() {
        let mut a = sample_block();
        let mut b = sample_block();
        b.proposer_sig = [0xFFu8; 64];
        a.proposer_sig = [0u8; 64];
        assert_eq!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = sample_block();
        let mut b = sample_block();
        b.height = 2;
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn within_policy_respects_bounds() {
        let b = sample_block();
        assert!(b.within_policy(256, 1 << 20));
        assert!(!b.within_policy(256, 1));
    }
}
