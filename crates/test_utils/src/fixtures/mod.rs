// Path: crates/test_utils/src/fixtures/mod.rs
//! Deterministic fixtures: a test-controlled clock and committee/proof/
//! keypair generators with fixed seeds, for reproducible scenario tests
//! (§10.4).

use std::sync::{Arc, Mutex};

use pop_crypto::sign::{Ed25519KeyPair, SerializableKey, SigningKeyPair};
use pop_types::app::{Proof, PublicKey};
use pop_types::config::CommitteeConfig;

use crate::randomness::TestRng;

/// A shared, manually-advanced wall clock, standing in for `SystemTime::now`
/// wherever a component under test reads the current time. Two handles
/// cloned from the same [`DeterministicClock::new`] call observe the same
/// value; advancing one advances every handle.
#[derive(Clone)]
pub struct DeterministicClock {
    now_ns: Arc<Mutex<u64>>,
}

impl DeterministicClock {
    /// Builds a clock starting at `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self { now_ns: Arc::new(Mutex::new(start_ns)) }
    }

    /// The current simulated time, in nanoseconds.
    pub fn now_ns(&self) -> u64 {
        *self.now_ns.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Advances the clock by `delta_ns` and returns the new time.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        let mut now = self.now_ns.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta_ns;
        *now
    }
}

impl Default for DeterministicClock {
    fn default() -> Self {
        Self::new(0)
    }
}

fn pk_bytes(kp: &Ed25519KeyPair) -> PublicKey {
    let mut out = [0u8; 32];
    out.copy_from_slice(&kp.public_key().to_bytes());
    out
}

/// Deterministically derives a 32-byte Ed25519 seed from `seed`, the same
/// left-padding scheme [`TestRng`] uses.
pub fn make_keypair(seed: u64) -> Ed25519KeyPair {
    let mut seed_array = [0u8; 32];
    seed_array[..8].copy_from_slice(&seed.to_le_bytes());
    #[allow(clippy::expect_used)]
    Ed25519KeyPair::from_seed(&seed_array).expect("fixed-seed key derivation cannot fail")
}

/// Builds an `n`-member committee with keys derived from seeds `1..=n`, and
/// returns the keypairs alongside the derived [`CommitteeConfig`] in the
/// same order, so a caller can sign as any member by index.
pub fn make_committee(n: usize) -> (CommitteeConfig, Vec<Ed25519KeyPair>) {
    let kps: Vec<Ed25519KeyPair> = (1..=n as u64).map(make_keypair).collect();
    let committee = CommitteeConfig { committee: kps.iter().map(pk_bytes).collect() };
    (committee, kps)
}

/// Builds a well-formed, correctly signed [`Proof`] submitted by `submitter`
/// with `payload`, stamped with `submitted_at_ns`.
#[allow(clippy::expect_used)]
pub fn make_proof(submitter: &Ed25519KeyPair, payload: Vec<u8>, submitted_at_ns: u64) -> Proof {
    let submitter_pk = pk_bytes(submitter);
    let id = Proof::compute_id(&payload, &submitter_pk).expect("hashing cannot fail");
    let sig = submitter.sign(&id).expect("signing cannot fail");
    let mut submitter_sig = [0u8; 64];
    submitter_sig.copy_from_slice(&sig.to_bytes());
    Proof { id, payload, submitter_pk, submitter_sig, submitted_at_ns }
}

/// Builds `count` well-formed proofs from distinct submitters (seeded
/// `1000.. `, disjoint from committee seeds), each with a small
/// deterministic payload and evenly spaced timestamps starting at `clock`.
pub fn make_proof_batch(count: usize, clock: &DeterministicClock) -> Vec<Proof> {
    let mut rng = TestRng::new(99);
    (0..count)
        .map(|i| {
            let submitter = make_keypair(1000 + i as u64);
            let mut payload = vec![0u8; 16];
            rng.fill_bytes(&mut payload);
            make_proof(&submitter, payload, clock.advance(1))
        })
        .collect()
}
