// Path: crates/networking/src/dedup.rs
//! Gossip duplicate suppression (§4.5): "Flood with duplicate suppression
//! keyed by message hash; TTL and fanout configurable."

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pop_types::app::Hash32;
use pop_types::codec::to_bytes_canonical;
use pop_types::error::CryptoError;

use crate::transport::NetworkMessage;

/// Tracks recently seen message hashes so a flooded message is processed
/// (and re-forwarded) at most once per `ttl` window per replica.
pub struct Deduplicator {
    seen: HashMap<Hash32, Instant>,
    ttl: Duration,
}

impl Deduplicator {
    /// Builds a deduplicator that forgets a hash once `ttl` has elapsed.
    pub fn new(ttl: Duration) -> Self {
        Self { seen: HashMap::new(), ttl }
    }

    /// Hashes `msg`'s canonical encoding under the gossip message-id scheme.
    pub fn message_hash(msg: &NetworkMessage) -> Result<Hash32, CryptoError> {
        pop_crypto::hash::sha256(to_bytes_canonical(msg))
    }

    /// Returns `true` and records `hash` the first time it is seen within
    /// the current `ttl` window; returns `false` for a repeat.
    pub fn observe(&mut self, hash: Hash32) -> bool {
        self.evict_expired();
        if self.seen.contains_key(&hash) {
            return false;
        }
        self.seen.insert(hash, Instant::now());
        true
    }

    fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| seen_at.elapsed() < ttl);
    }
}
