// Path: crates/types/src/app/state.rs
//! `StateKey`, `StateValue`, `StateRoot`, and `StateTransition` — §3, §4.2.

use std::collections::BTreeMap;

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

use super::{domain_hash, Hash32, SigDomain};

/// A typed key into the state map: a `domain` tag plus an opaque id.
///
/// Domains partition the key space; a domain may or may not be conserved
/// (§4.2's conservation checker only sums weights for conserved domains).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct StateKey {
    /// The domain this key belongs to.
    pub domain: u8,
    /// The opaque, domain-scoped identifier.
    pub id: Vec<u8>,
}

impl StateKey {
    /// Constructs a new state key.
    pub fn new(domain: u8, id: impl Into<Vec<u8>>) -> Self {
        Self { domain, id: id.into() }
    }

    /// The canonical encoding used as the trie's `H(key)` preimage.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        crate::codec::to_bytes_canonical(self)
    }
}

/// The value stored at a [`StateKey`]: opaque application bytes plus a
/// signed resource weight used by the conservation checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct StateValue {
    /// Opaque, domain-defined payload.
    pub data: Vec<u8>,
    /// Signed scalar contributing to `resource_delta_per_domain`. `0` for
    /// non-conserved keys.
    pub resource_weight: i128,
}

impl StateValue {
    /// Constructs a value with no resource weight (a non-conserved entry).
    pub fn unweighted(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), resource_weight: 0 }
    }

    /// Constructs a value carrying a resource weight.
    pub fn weighted(data: impl Into<Vec<u8>>, resource_weight: i128) -> Self {
        Self { data: data.into(), resource_weight }
    }
}

/// A 32-byte Merkle commitment over the sorted state key space (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct StateRoot(pub Hash32);

impl StateRoot {
    /// A zero-valued sentinel for "no commitment yet" (e.g. a genesis
    /// block's claimed pre-root before any store has been opened). This is
    /// distinct from `pop_state::trie::empty_root()`, the actual root of a
    /// freshly constructed Merkle trie with zero entries; callers that need
    /// the latter must go through `pop-state`, which owns the hashing.
    pub fn empty() -> Self {
        Self([0u8; 32])
    }

    /// Hex-encodes the root for logging and error messages.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

impl std::fmt::Display for StateRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// A single written state entry: its key, the value before the write (if
/// any), and the value after (if any — `None` means deletion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct StateWrite {
    /// The key written.
    pub key: StateKey,
    /// The value before this transition, if the key pre-existed.
    pub old_value: Option<StateValue>,
    /// The value after this transition, or `None` if the key was deleted.
    pub new_value: Option<StateValue>,
}

/// The effect of committing a [`super::ProofBlock`]: the root movement, the
/// writes that produced it, and the net resource delta per conserved domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct StateTransition {
    /// Hash of the block whose application produced this transition.
    pub block_hash: Hash32,
    /// The root before applying `writes`.
    pub pre_root: StateRoot,
    /// The root after applying `writes`.
    pub post_root: StateRoot,
    /// The ordered set of writes, in trie-application order.
    pub writes: Vec<StateWrite>,
    /// Net `Σ(new.resource_weight - old.resource_weight)` per domain touched.
    pub resource_delta_per_domain: BTreeMap<u8, i128>,
}

/// Reserved domain for signed mint/burn authorizations (§4.2): a write here
/// keyed by `[conserved_domain]`, whose value holds a 64-byte Ed25519
/// signature over [`mint_burn_preimage`], authorises that conserved
/// domain's non-zero delta for this transition. Never itself subject to
/// conservation, and never otherwise written by this engine.
pub const MINT_BURN_AUTH_DOMAIN: u8 = 255;

impl StateTransition {
    /// True iff every conserved domain's delta is zero, or the transition
    /// carries a signed mint/burn authorization for that domain. Signature
    /// verification against the configured authority key is the caller's
    /// responsibility (`pop-state`, which owns the crypto dependency); this
    /// method only reports whether an authorization is present to check.
    pub fn is_conservation_valid(&self, conserved_domains: &[u8]) -> bool {
        conserved_domains
            .iter()
            .all(|d| self.resource_delta_per_domain.get(d).copied().unwrap_or(0) == 0 || self.mint_burn_signature(*d).is_some())
    }

    /// The mint/burn authorization signature carried for `domain`, if any.
    pub fn mint_burn_signature(&self, domain: u8) -> Option<[u8; 64]> {
        self.writes.iter().find_map(|w| {
            if w.key.domain != MINT_BURN_AUTH_DOMAIN || w.key.id != [domain] {
                return None;
            }
            let bytes = w.new_value.as_ref()?.data.as_slice();
            bytes.try_into().ok()
        })
    }
}

/// The preimage a mint/burn authority signs to authorise `delta` on
/// `domain` within the transition that produces `block_hash`.
pub fn mint_burn_preimage(block_hash: Hash32, domain: u8, delta: i128) -> Result<Hash32, CryptoError> {
    let mut bytes = Vec::with_capacity(32 + 1 + 16);
    bytes.extend_from_slice(&block_hash);
    bytes.push(domain);
    bytes.extend_from_slice(&delta.to_be_bytes());
    domain_hash(SigDomain::MintBurnAuthorization, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conservation_valid_when_all_conserved_deltas_zero() {
        let mut deltas = BTreeMap::new();
        deltas.insert(1u8, 0i128);
        deltas.insert(2u8, 50i128); // domain 2 is not conserved
        let t = StateTransition {
            block_hash: [0u8; 32],
            pre_root: StateRoot::empty(),
            post_root: StateRoot::empty(),
            writes: vec![],
            resource_delta_per_domain: deltas,
        };
        assert!(t.is_conservation_valid(&[1]));
        assert!(!t.is_conservation_valid(&[1, 2]));
    }

    #[test]
    fn missing_domain_delta_counts_as_zero() {
        let t = StateTransition {
            block_hash: [0u8; 32],
            pre_root: StateRoot::empty(),
            post_root: StateRoot::empty(),
            writes: vec![],
            resource_delta_per_domain: BTreeMap::new(),
        };
        assert!(t.is_conservation_valid(&[7]));
    }
}
