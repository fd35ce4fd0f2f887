// Path: crates/state/src/store.rs
//! The versioned store: height history over [`Trie`], snapshot/rollback,
//! and the conservation checker (§4.2, §8's conservation property).

use std::collections::BTreeMap;

use tracing::{debug, warn};

use pop_crypto::sign::{Ed25519PublicKey, Ed25519Signature, SerializableKey, VerifyingKey};
use pop_types::app::{mint_burn_preimage, Hash32, PublicKey, StateKey, StateRoot, StateTransition, StateValue, StateWrite};
use pop_types::error::StateError;

use crate::trie::{empty_root, Trie};

/// The result of applying one block's writes to the store: the produced
/// [`StateTransition`] and whether it passed the conservation check.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The full transition record, suitable for persistence and replay.
    pub transition: StateTransition,
}

/// A height-versioned Merkle state store.
///
/// Every applied height's root is retained in `history` so the store can
/// answer "what was the root at height `h`" and can `rollback` to any
/// retained height without re-deriving it. Because [`Trie`] nodes are
/// content-addressed and immutable, rollback is a pure root-pointer swap —
/// no data is physically deleted until a future GC pass prunes
/// unreferenced nodes.
pub struct StateStore {
    current: Trie,
    height: u64,
    history: BTreeMap<u64, Hash32>,
    conserved_domains: Vec<u8>,
    mint_burn_authority: Option<PublicKey>,
}

impl StateStore {
    /// Creates a fresh store at height 0 with the canonical empty root.
    ///
    /// `conserved_domains` lists the `StateKey::domain` values the
    /// conservation checker enforces. `mint_burn_authority`, if set, is the
    /// governance key whose signature over [`mint_burn_preimage`] overrides
    /// the check for a single transition's delta on a conserved domain; a
    /// transition claiming the override without a valid signature from this
    /// key is rejected exactly as an unauthorised violation would be.
    pub fn new(conserved_domains: Vec<u8>, mint_burn_authority: Option<PublicKey>) -> Self {
        let current = Trie::new();
        let mut history = BTreeMap::new();
        history.insert(0, current.root());
        Self { current, height: 0, history, conserved_domains, mint_burn_authority }
    }

    /// Checks whether `transition` carries a valid mint/burn authorization
    /// signature for `domain`'s `delta`, per the configured authority key.
    fn has_mint_burn_authorization(&self, transition: &StateTransition, domain: u8, delta: i128) -> bool {
        let Some(authority) = self.mint_burn_authority else { return false };
        let Some(sig_bytes) = transition.mint_burn_signature(domain) else { return false };
        let Ok(preimage) = mint_burn_preimage(transition.block_hash, domain, delta) else { return false };
        let Ok(pk) = Ed25519PublicKey::from_bytes(&authority) else { return false };
        let Ok(sig) = Ed25519Signature::from_bytes(&sig_bytes) else { return false };
        pk.verify(&preimage, &sig).is_ok()
    }

    /// The first conserved-domain delta this transition cannot account for:
    /// either zero, or backed by a verified mint/burn authorization.
    fn first_unauthorized_violation(&self, transition: &StateTransition) -> Option<(u8, i128)> {
        self.conserved_domains.iter().find_map(|&domain| {
            let delta = transition.resource_delta_per_domain.get(&domain).copied().unwrap_or(0);
            if delta == 0 || self.has_mint_burn_authorization(transition, domain, delta) {
                None
            } else {
                Some((domain, delta))
            }
        })
    }

    /// The current height.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// The current root.
    pub fn root(&self) -> StateRoot {
        StateRoot(self.current.root())
    }

    /// The root committed at a given height, if still retained.
    pub fn root_at(&self, height: u64) -> Option<StateRoot> {
        self.history.get(&height).copied().map(StateRoot)
    }

    /// Reads the current value of `key`, if present.
    pub fn get(&self, key: &StateKey) -> Result<Option<StateValue>, StateError> {
        self.current.get(key)
    }

    /// Simulates applying `writes` without committing, returning the
    /// [`StateTransition`] that would result. Used by a proposing leader to
    /// compute `expected_post_root` before broadcasting a block, and by
    /// every other replica to verify it (§4.3.3).
    pub fn simulate(
        &self,
        block_hash: Hash32,
        writes: &[(StateKey, Option<StateValue>)],
    ) -> Result<StateTransition, StateError> {
        let pre_root = self.root();
        let (next, effects) = self.current.apply(writes)?;
        let mut state_writes = Vec::with_capacity(effects.len());
        let mut resource_delta_per_domain: BTreeMap<u8, i128> = BTreeMap::new();
        for (key, old_value, new_value) in effects {
            let old_weight = old_value.as_ref().map(|v| v.resource_weight).unwrap_or(0);
            let new_weight = new_value.as_ref().map(|v| v.resource_weight).unwrap_or(0);
            *resource_delta_per_domain.entry(key.domain).or_insert(0) += new_weight - old_weight;
            state_writes.push(StateWrite { key, old_value, new_value });
        }
        Ok(StateTransition {
            block_hash,
            pre_root,
            post_root: StateRoot(next.root()),
            writes: state_writes,
            resource_delta_per_domain,
        })
    }

    /// Commits a transition previously produced by [`Self::simulate`] (or an
    /// equivalent one received from a peer and re-simulated locally),
    /// advancing the store to `height + 1`.
    ///
    /// Rejects the transition if it fails the conservation check, or if its
    /// `pre_root` no longer matches the store's current root.
    pub fn commit(
        &mut self,
        transition: StateTransition,
    ) -> Result<ApplyOutcome, StateError> {
        if transition.pre_root != self.root() {
            return Err(StateError::Corrupt(
                "commit attempted against a stale pre_root".into(),
            ));
        }
        if let Some((domain, delta)) = self.first_unauthorized_violation(&transition) {
            warn!(target: "pop_state", domain, delta, "conservation violation on commit");
            return Err(StateError::ConservationViolation { domain, delta });
        }

        let writes: Vec<(StateKey, Option<StateValue>)> = transition
            .writes
            .iter()
            .map(|w| (w.key.clone(), w.new_value.clone()))
            .collect();
        let (next, _) = self.current.apply(&writes)?;
        if next.root() != transition.post_root.0 {
            return Err(StateError::Corrupt(
                "recomputed root does not match the transition's claimed post_root".into(),
            ));
        }

        self.current = next;
        self.height += 1;
        self.history.insert(self.height, self.current.root());
        debug!(target: "pop_state", height = self.height, root = %self.root(), "committed state transition");
        Ok(ApplyOutcome { transition })
    }

    /// Rolls the store back to a previously committed height, discarding
    /// any retained history above it. Used on view-change recovery when a
    /// block turns out not to have reached a commit quorum.
    pub fn rollback(&mut self, height: u64) -> Result<(), StateError> {
        let root = self
            .history
            .get(&height)
            .copied()
            .ok_or(StateError::UnknownSnapshot(height))?;
        self.current = self.current.at_root(root);
        self.height = height;
        self.history.retain(|&h, _| h <= height);
        Ok(())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(domain: u8, id: &str) -> StateKey {
        StateKey::new(domain, id.as_bytes().to_vec())
    }

    fn val(data: &str, weight: i128) -> StateValue {
        StateValue::weighted(data.as_bytes().to_vec(), weight)
    }

    #[test]
    fn fresh_store_is_at_height_zero_with_the_empty_root() {
        let store = StateStore::new(vec![], None);
        assert_eq!(store.height(), 0);
        assert_eq!(store.root(), StateRoot(empty_root()));
    }

    #[test]
    fn commit_advances_height_and_root() {
        let mut store = StateStore::new(vec![], None);
        let writes = vec![(key(1, "a"), Some(val("v", 0)))];
        let transition = store.simulate([1u8; 32], &writes).unwrap();
        let outcome = store.commit(transition).unwrap();
        assert_eq!(store.height(), 1);
        assert_eq!(store.root(), outcome.transition.post_root);
        assert_eq!(store.get(&key(1, "a")).unwrap(), Some(val("v", 0)));
    }

    #[test]
    fn commit_rejects_a_conservation_violation() {
        let mut store = StateStore::new(vec![9], None);
        let writes = vec![(key(9, "a"), Some(val("v", 100)))];
        let transition = store.simulate([1u8; 32], &writes).unwrap();
        let err = store.commit(transition).unwrap_err();
        assert!(matches!(err, StateError::ConservationViolation { domain: 9, delta: 100 }));
        assert_eq!(store.height(), 0);
    }

    #[test]
    fn a_validly_signed_mint_authorization_overrides_the_violation() {
        use pop_crypto::sign::{Ed25519KeyPair, SigningKeyPair};
        use pop_types::app::{mint_burn_preimage, MINT_BURN_AUTH_DOMAIN};

        let authority = Ed25519KeyPair::generate().unwrap();
        let mut authority_pk = [0u8; 32];
        authority_pk.copy_from_slice(&authority.public_key().to_bytes());

        let mut store = StateStore::new(vec![9], Some(authority_pk));
        let writes = vec![(key(9, "a"), Some(val("v", 100)))];
        let block_hash = [1u8; 32];
        let mut transition = store.simulate(block_hash, &writes).unwrap();

        let preimage = mint_burn_preimage(block_hash, 9, 100).unwrap();
        let sig = authority.sign(&preimage).unwrap();
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(&sig.to_bytes());
        transition.writes.push(StateWrite {
            key: StateKey::new(MINT_BURN_AUTH_DOMAIN, vec![9]),
            old_value: None,
            new_value: Some(StateValue::unweighted(sig_bytes.to_vec())),
        });

        store.commit(transition).unwrap();
        assert_eq!(store.height(), 1);
    }

    #[test]
    fn an_unsigned_mint_claim_is_still_rejected() {
        use pop_types::app::MINT_BURN_AUTH_DOMAIN;

        let mut store = StateStore::new(vec![9], Some([7u8; 32]));
        let writes = vec![(key(9, "a"), Some(val("v", 100)))];
        let block_hash = [1u8; 32];
        let mut transition = store.simulate(block_hash, &writes).unwrap();
        transition.writes.push(StateWrite {
            key: StateKey::new(MINT_BURN_AUTH_DOMAIN, vec![9]),
            old_value: None,
            new_value: Some(StateValue::unweighted(vec![0u8; 64])),
        });

        let err = store.commit(transition).unwrap_err();
        assert!(matches!(err, StateError::ConservationViolation { domain: 9, delta: 100 }));
    }

    #[test]
    fn conserved_transfer_between_two_keys_nets_to_zero() {
        let mut store = StateStore::new(vec![9], None);
        let writes = vec![(key(9, "alice"), Some(val("init", 100)))];
        let t1 = store.simulate([1u8; 32], &writes).unwrap();
        store.commit(t1).unwrap();

        let transfer = vec![
            (key(9, "alice"), Some(val("post-transfer", 60))),
            (key(9, "bob"), Some(val("post-transfer", 40))),
        ];
        let t2 = store.simulate([2u8; 32], &transfer).unwrap();
        assert!(t2.is_conservation_valid(&[9]));
        store.commit(t2).unwrap();
        assert_eq!(store.height(), 2);
    }

    #[test]
    fn rollback_restores_an_earlier_root_and_value() {
        let mut store = StateStore::new(vec![], None);
        let t1 = store.simulate([1u8; 32], &[(key(1, "a"), Some(val("v1", 0)))]).unwrap();
        store.commit(t1).unwrap();
        let root_at_1 = store.root();

        let t2 = store.simulate([2u8; 32], &[(key(1, "a"), Some(val("v2", 0)))]).unwrap();
        store.commit(t2).unwrap();
        assert_eq!(store.get(&key(1, "a")).unwrap(), Some(val("v2", 0)));

        store.rollback(1).unwrap();
        assert_eq!(store.height(), 1);
        assert_eq!(store.root(), root_at_1);
        assert_eq!(store.get(&key(1, "a")).unwrap(), Some(val("v1", 0)));
    }

    #[test]
    fn rollback_to_unknown_height_fails() {
        let mut store = StateStore::new(vec![], None);
        assert!(matches!(store.rollback(5), Err(StateError::UnknownSnapshot(5))));
    }

    #[test]
    fn commit_rejects_a_stale_pre_root() {
        let mut store = StateStore::new(vec![], None);
        let t1 = store.simulate([1u8; 32], &[(key(1, "a"), Some(val("v1", 0)))]).unwrap();
        // Commit something else first so t1's pre_root is now stale.
        let t0 = store.simulate([0u8; 32], &[(key(1, "z"), Some(val("z", 0)))]).unwrap();
        store.commit(t0).unwrap();
        assert!(matches!(store.commit(t1), Err(StateError::Corrupt(_))));
    }
}
