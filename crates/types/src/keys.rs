// Path: crates/types/src/keys.rs
//! Constants for well-known persisted-state key prefixes (§6's "Persisted
//! state layout").
//!
//! These provide a single source of truth so `pop-storage` and its callers
//! never hand-construct a prefix ad hoc.

/// Prefix for serialized `ProofBlock`s, keyed by height: `blocks/{height}`.
pub const BLOCKS_PREFIX: &str = "blocks/";
/// Prefix for serialized commit certificates, keyed by height: `certs/{height}`.
pub const CERTS_PREFIX: &str = "certs/";
/// Prefix for Merkle store nodes, content-addressed by hash: `state/{height}/...`.
pub const STATE_NODES_PREFIX: &str = "state/";
/// Prefix for 32-byte state roots, keyed by height: `roots/{height}`.
pub const ROOTS_PREFIX: &str = "roots/";
/// Prefix for Byzantine evidence, keyed by evidence id: `evidence/{id}`.
pub const EVIDENCE_PREFIX: &str = "evidence/";
/// Prefix for per-epoch committee/config snapshots: `config/epoch/{epoch}`.
pub const EPOCH_CONFIG_PREFIX: &str = "config/epoch/";

/// Builds the storage key for the block at `height`.
pub fn block_key(height: u64) -> String {
    format!("{BLOCKS_PREFIX}{height}")
}

/// Builds the storage key for the commit certificate at `height`.
pub fn cert_key(height: u64) -> String {
    format!("{CERTS_PREFIX}{height}")
}

/// Builds the storage key for the state root at `height`.
pub fn root_key(height: u64) -> String {
    format!("{ROOTS_PREFIX}{height}")
}

/// Builds the storage key for a piece of Byzantine evidence.
pub fn evidence_key(evidence_id: &[u8; 32]) -> String {
    format!("{EVIDENCE_PREFIX}{}", hex_encode(evidence_id))
}

/// Builds the storage key for the committee/config snapshot at `epoch`.
pub fn epoch_config_key(epoch: u64) -> String {
    format!("{EPOCH_CONFIG_PREFIX}{epoch}")
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed_as_documented() {
        assert_eq!(block_key(7), "blocks/7");
        assert_eq!(cert_key(7), "certs/7");
        assert_eq!(root_key(7), "roots/7");
        assert_eq!(epoch_config_key(3), "config/epoch/3");
        assert!(evidence_key(&[0u8; 32]).starts_with("evidence/"));
    }
}
