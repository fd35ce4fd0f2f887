// Path: crates/state/src/trie.rs
//! The radix-based binary Merkle trie described in §4.2.
//!
//! Keys are positioned by `H(key)` (256 bits, MSB first). Internal nodes
//! hash as `H(left || right)`; leaves hash as `H(0x00 || key || value)`.
//! Empty subtrees collapse to a fixed per-depth constant so that an
//! all-empty tree costs `O(1)` storage rather than `O(2^256)`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use pop_crypto::hash::sha256;
use pop_types::app::{Hash32, StateKey, StateValue};
use pop_types::error::StateError;

/// Number of bits in a SHA-256 digest, and thus the trie's fixed depth.
const DEPTH: usize = 256;

/// `EMPTY[d]` is the hash of an empty subtree whose root is `d` levels
/// above the leaf layer: `EMPTY[0]` is the "no leaf here" marker, and
/// `EMPTY[d] = H(EMPTY[d-1] || EMPTY[d-1])`.
static EMPTY: Lazy<[Hash32; DEPTH + 1]> = Lazy::new(|| {
    let mut table = [[0u8; 32]; DEPTH + 1];
    // EMPTY[0] is the canonical zero digest, used as the absent-leaf marker.
    for d in 1..=DEPTH {
        let prev = table[d - 1];
        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(&prev);
        preimage.extend_from_slice(&prev);
        table[d] = sha256(&preimage).expect("sha256 of 64 bytes cannot fail");
    }
    table
});

/// The hash of a fully empty tree (§4.2's `StateRoot` for a fresh store).
pub fn empty_root() -> Hash32 {
    EMPTY[DEPTH]
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { key: StateKey, value: StateValue },
    Internal { left: Hash32, right: Hash32 },
}

fn leaf_hash(key: &StateKey, value: &StateValue) -> Result<Hash32, StateError> {
    let mut preimage = vec![0x00u8];
    preimage.extend_from_slice(&key.canonical_bytes());
    preimage.extend_from_slice(&pop_types::codec::to_bytes_canonical(value));
    sha256(&preimage).map_err(|e| StateError::Backend(e.to_string()))
}

fn internal_hash(left: &Hash32, right: &Hash32) -> Result<Hash32, StateError> {
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(left);
    preimage.extend_from_slice(right);
    sha256(&preimage).map_err(|e| StateError::Backend(e.to_string()))
}

fn key_path(key: &StateKey) -> Result<Hash32, StateError> {
    sha256(&key.canonical_bytes()).map_err(|e| StateError::Backend(e.to_string()))
}

/// `true` if the bit at position `i` (0 = most significant bit of byte 0)
/// of `path` is set.
fn bit(path: &Hash32, i: usize) -> bool {
    let byte = path[i / 8];
    let shift = 7 - (i % 8);
    (byte >> shift) & 1 == 1
}

/// A content-addressed, shareable node store plus a current root pointer.
///
/// Cloning a `Trie` is cheap: the node map is reference-counted and shared
/// across every version ever produced by [`Trie::apply`], so forking a
/// version for simulation (§4.3.3's "leader simulates `apply`") never
/// copies the tree.
#[derive(Clone)]
pub struct Trie {
    nodes: Arc<RwLock<HashMap<Hash32, Node>>>,
    root: Hash32,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    /// Creates a fresh, empty trie.
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            root: empty_root(),
        }
    }

    /// Reconstructs a trie view at a previously observed root, sharing the
    /// same node store. Used by `rollback` and by historical reads.
    pub fn at_root(&self, root: Hash32) -> Self {
        Self { nodes: self.nodes.clone(), root }
    }

    /// The current root hash.
    pub fn root(&self) -> Hash32 {
        self.root
    }

    /// Looks up `key`, returning its value if present.
    pub fn get(&self, key: &StateKey) -> Result<Option<StateValue>, StateError> {
        let path = key_path(key)?;
        let nodes = self.nodes.read().expect("trie node store lock poisoned");
        let mut current = self.root;
        for depth in 0..DEPTH {
            if current == EMPTY[DEPTH - depth] {
                return Ok(None);
            }
            let node = nodes
                .get(&current)
                .ok_or_else(|| StateError::Corrupt("missing internal node referenced by root".into()))?;
            match node {
                Node::Internal { left, right } => {
                    current = if bit(&path, depth) { *right } else { *left };
                }
                Node::Leaf { .. } => {
                    return Err(StateError::Corrupt("leaf encountered above the leaf depth".into()));
                }
            }
        }
        if current == EMPTY[0] {
            return Ok(None);
        }
        match nodes.get(&current) {
            Some(Node::Leaf { key: k, value }) if k == key => Ok(Some(value.clone())),
            Some(Node::Leaf { .. }) => Err(StateError::Corrupt("leaf key mismatch".into())),
            _ => Err(StateError::Corrupt("expected leaf node".into())),
        }
    }

    /// Applies a batch of writes, returning the resulting trie (sharing the
    /// node store) and the value each touched key held beforehand.
    ///
    /// Pure and order-independent in its result: applying the same set of
    /// `(key, value)` writes in any order yields the same `post_root`,
    /// since the final value at each key is determined solely by the last
    /// write to that key in program order, and the algorithm below folds
    /// writes one key at a time against the evolving tree.
    pub fn apply(
        &self,
        writes: &[(StateKey, Option<StateValue>)],
    ) -> Result<(Trie, Vec<(StateKey, Option<StateValue>, Option<StateValue>)>), StateError> {
        let mut root = self.root;
        let mut effects = Vec::with_capacity(writes.len());
        for (key, new_value) in writes {
            let path = key_path(key)?;
            let mut nodes = self.nodes.write().expect("trie node store lock poisoned");
            let mut old_value = None;
            root = insert(&mut nodes, root, 0, &path, key, new_value.as_ref(), &mut old_value)?;
            effects.push((key.clone(), old_value, new_value.clone()));
        }
        Ok((self.at_root(root), effects))
    }

    /// Builds an inclusion (or non-inclusion) proof for `key` against the
    /// current root.
    pub fn prove_inclusion(&self, key: &StateKey) -> Result<InclusionProof, StateError> {
        let path = key_path(key)?;
        let nodes = self.nodes.read().expect("trie node store lock poisoned");
        let mut siblings = Vec::with_capacity(DEPTH);
        let mut current = self.root;
        for depth in 0..DEPTH {
            if current == EMPTY[DEPTH - depth] {
                siblings.push(EMPTY[DEPTH - depth - 1]);
                current = EMPTY[DEPTH - depth - 1];
                continue;
            }
            let node = nodes
                .get(&current)
                .ok_or_else(|| StateError::Corrupt("missing internal node referenced by root".into()))?;
            match node {
                Node::Internal { left, right } => {
                    if bit(&path, depth) {
                        siblings.push(*left);
                        current = *right;
                    } else {
                        siblings.push(*right);
                        current = *left;
                    }
                }
                Node::Leaf { .. } => {
                    return Err(StateError::Corrupt("leaf encountered above the leaf depth".into()));
                }
            }
        }
        Ok(InclusionProof { siblings })
    }

    /// Verifies an inclusion or non-inclusion proof against `root`, the
    /// `key`, and the claimed `value` (`None` asserts absence).
    pub fn verify_inclusion(
        root: &Hash32,
        key: &StateKey,
        value: Option<&StateValue>,
        proof: &InclusionProof,
    ) -> bool {
        if proof.siblings.len() != DEPTH {
            return false;
        }
        let path = match key_path(key) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let mut current = match value {
            Some(v) => match leaf_hash(key, v) {
                Ok(h) => h,
                Err(_) => return false,
            },
            None => EMPTY[0],
        };
        for depth in (0..DEPTH).rev() {
            let sibling = proof.siblings[depth];
            current = if bit(&path, depth) {
                match internal_hash(&sibling, &current) {
                    Ok(h) => h,
                    Err(_) => return false,
                }
            } else {
                match internal_hash(&current, &sibling) {
                    Ok(h) => h,
                    Err(_) => return false,
                }
            };
        }
        &current == root
    }
}

#[allow(clippy::too_many_arguments)]
fn insert(
    nodes: &mut HashMap<Hash32, Node>,
    node_hash: Hash32,
    depth: usize,
    path: &Hash32,
    key: &StateKey,
    new_value: Option<&StateValue>,
    old_value_out: &mut Option<StateValue>,
) -> Result<Hash32, StateError> {
    if depth == DEPTH {
        if node_hash != EMPTY[0] {
            match nodes.get(&node_hash) {
                Some(Node::Leaf { key: k, value }) if k == key => {
                    *old_value_out = Some(value.clone());
                }
                Some(Node::Leaf { .. }) => {
                    return Err(StateError::Corrupt("hash-path collision on distinct keys".into()));
                }
                _ => return Err(StateError::Corrupt("expected leaf node at full depth".into())),
            }
        }
        return match new_value {
            Some(v) => {
                let h = leaf_hash(key, v)?;
                nodes.insert(h, Node::Leaf { key: key.clone(), value: v.clone() });
                Ok(h)
            }
            None => Ok(EMPTY[0]),
        };
    }

    let remaining = DEPTH - depth;
    let (mut left, mut right) = if node_hash == EMPTY[remaining] {
        (EMPTY[remaining - 1], EMPTY[remaining - 1])
    } else {
        match nodes.get(&node_hash) {
            Some(Node::Internal { left, right }) => (*left, *right),
            _ => return Err(StateError::Corrupt("expected internal node".into())),
        }
    };

    if bit(path, depth) {
        right = insert(nodes, right, depth + 1, path, key, new_value, old_value_out)?;
    } else {
        left = insert(nodes, left, depth + 1, path, key, new_value, old_value_out)?;
    }

    if left == EMPTY[remaining - 1] && right == EMPTY[remaining - 1] {
        return Ok(EMPTY[remaining]);
    }
    let h = internal_hash(&left, &right)?;
    nodes.insert(h, Node::Internal { left, right });
    Ok(h)
}

/// A Merkle inclusion/non-inclusion proof: one sibling hash per trie depth.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InclusionProof {
    /// Sibling hash at each depth, indexed `0..256` from root to leaf.
    pub siblings: Vec<Hash32>,
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
    fn empty_trie_has_the_canonical_empty_root() {
        let t = Trie::new();
        assert_eq!(t.root(), empty_root());
    }

    #[test]
    fn get_on_empty_trie_is_none() {
        let t = Trie::new();
        assert_eq!(t.get(&key(1, "a")).unwrap(), None);
    }

    #[test]
    fn apply_then_get_round_trips() {
        let t = Trie::new();
        let k = key(1, "alice");
        let v = val("balance:10", 10);
        let (t2, _) = t.apply(&[(k.clone(), Some(v.clone()))]).unwrap();
        assert_eq!(t2.get(&k).unwrap(), Some(v));
    }

    #[test]
    fn apply_is_deterministic_regardless_of_insertion_order() {
        let t = Trie::new();
        let writes_a = vec![
            (key(1, "a"), Some(val("1", 1))),
            (key(1, "b"), Some(val("2", 2))),
        ];
        let writes_b = vec![
            (key(1, "b"), Some(val("2", 2))),
            (key(1, "a"), Some(val("1", 1))),
        ];
        let (ta, _) = t.apply(&writes_a).unwrap();
        let (tb, _) = t.apply(&writes_b).unwrap();
        assert_eq!(ta.root(), tb.root());
    }

    #[test]
    fn deletion_returns_key_to_empty_root_when_it_was_the_only_entry() {
        let t = Trie::new();
        let k = key(2, "only");
        let (t2, _) = t.apply(&[(k.clone(), Some(val("v", 0)))]).unwrap();
        assert_ne!(t2.root(), empty_root());
        let (t3, _) = t2.apply(&[(k, None)]).unwrap();
        assert_eq!(t3.root(), empty_root());
    }

    #[test]
    fn inclusion_proof_verifies_for_present_key() {
        let t = Trie::new();
        let k = key(3, "x");
        let v = val("y", 5);
        let (t2, _) = t.apply(&[(k.clone(), Some(v.clone()))]).unwrap();
        let proof = t2.prove_inclusion(&k).unwrap();
        assert!(Trie::verify_inclusion(&t2.root(), &k, Some(&v), &proof));
        assert!(!Trie::verify_inclusion(&t2.root(), &k, None, &proof));
    }

    #[test]
    fn non_inclusion_proof_verifies_for_absent_key() {
        let t = Trie::new();
        let k = key(4, "absent");
        let proof = t.prove_inclusion(&k).unwrap();
        assert!(Trie::verify_inclusion(&t.root(), &k, None, &proof));
    }

    #[test]
    fn unrelated_key_does_not_disturb_an_existing_proof() {
        let t = Trie::new();
        let k1 = key(5, "one");
        let k2 = key(5, "two");
        let (t2, _) = t.apply(&[(k1.clone(), Some(val("1", 1)))]).unwrap();
        let (t3, _) = t2.apply(&[(k2, Some(val("2", 2)))]).unwrap();
        let proof = t3.prove_inclusion(&k1).unwrap();
        assert!(Trie::verify_inclusion(&t3.root(), &k1, Some(&val("1", 1)), &proof));
    }
}
