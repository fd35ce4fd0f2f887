// Path: crates/storage/src/store.rs
//! `RedbStore`: the §6 persisted-state layout over a single `redb::Database`.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use pop_types::app::{Hash32, ProofBlock, QuorumCert, StateRoot};
use pop_types::codec::{from_bytes_canonical, to_bytes_canonical};
use pop_types::config::ReplicaConfig;
use pop_types::error::StorageError;

const BLOCKS: TableDefinition<u64, &[u8]> = TableDefinition::new("blocks");
const CERTS: TableDefinition<u64, &[u8]> = TableDefinition::new("certs");
const STATE_NODES: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("state_nodes");
const ROOTS: TableDefinition<u64, &[u8; 32]> = TableDefinition::new("roots");
const EVIDENCE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("evidence");
const EPOCH_CONFIG: TableDefinition<u64, &[u8]> = TableDefinition::new("epoch_config");

/// A `redb`-backed implementation of the §6 persisted-state layout.
///
/// Every write is a single `redb` transaction, committed synchronously:
/// §5 gives the consensus task sole write ownership of the store, so there
/// is no concurrent-writer contention to amortize with a background
/// flush thread the way the teacher's epoch-sharded store does.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Opens (creating if absent) a store at `path`, ensuring every table
    /// exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let w = db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(BLOCKS).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(CERTS).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(STATE_NODES).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(ROOTS).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(EVIDENCE).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.open_table(EPOCH_CONFIG).map_err(|e| StorageError::Backend(e.to_string()))?;
            w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(Self { db })
    }

    /// Persists `block` at `blocks/{height}`.
    pub fn put_block(&self, height: u64, block: &ProofBlock) -> Result<(), StorageError> {
        let bytes = to_bytes_canonical(block);
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(BLOCKS).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(height, bytes.as_slice()).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        debug!(target: "pop_storage", height, "persisted block");
        Ok(())
    }

    /// Reads the block at `height`, if present.
    pub fn get_block(&self, height: u64) -> Result<Option<ProofBlock>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(BLOCKS).map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = match t.get(height).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(v) => Ok(Some(from_bytes_canonical(v.value())?)),
            None => Ok(None),
        };
        result
    }

    /// Persists `cert` at `certs/{height}`.
    pub fn put_cert(&self, height: u64, cert: &QuorumCert) -> Result<(), StorageError> {
        let bytes = to_bytes_canonical(cert);
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(CERTS).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(height, bytes.as_slice()).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads the commit certificate at `height`, if present.
    pub fn get_cert(&self, height: u64) -> Result<Option<QuorumCert>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(CERTS).map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = match t.get(height).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(v) => Ok(Some(from_bytes_canonical(v.value())?)),
            None => Ok(None),
        };
        result
    }

    /// Persists a content-addressed Merkle node's raw bytes under `state/`.
    pub fn put_state_node(&self, hash: &Hash32, bytes: &[u8]) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(STATE_NODES).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(hash, bytes).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads a content-addressed Merkle node's raw bytes, if present.
    pub fn get_state_node(&self, hash: &Hash32) -> Result<Option<Vec<u8>>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(STATE_NODES).map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = Ok(t.get(hash).map_err(|e| StorageError::Backend(e.to_string()))?.map(|v| v.value().to_vec()));
        result
    }

    /// Persists the 32-byte root committed at `height`.
    pub fn put_root(&self, height: u64, root: &StateRoot) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(ROOTS).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(height, &root.0).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads the root committed at `height`, if present.
    pub fn get_root(&self, height: u64) -> Result<Option<StateRoot>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(ROOTS).map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = Ok(t.get(height).map_err(|e| StorageError::Backend(e.to_string()))?.map(|v| StateRoot(*v.value())));
        result
    }

    /// Persists a Byzantine evidence bundle's raw encoded bytes, keyed by
    /// its deterministic evidence id.
    pub fn put_evidence(&self, id: &Hash32, bytes: &[u8]) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(EVIDENCE).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(id, bytes).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads an evidence bundle's raw encoded bytes by id, if present.
    pub fn get_evidence(&self, id: &Hash32) -> Result<Option<Vec<u8>>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(EVIDENCE).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(t.get(id).map_err(|e| StorageError::Backend(e.to_string()))?.map(|v| v.value().to_vec()))
    }

    /// Persists the committee/config snapshot for `epoch`.
    pub fn put_epoch_config(&self, epoch: u64, config: &ReplicaConfig) -> Result<(), StorageError> {
        let bytes = serde_json_like_encode(config)?;
        let w = self.db.begin_write().map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w.open_table(EPOCH_CONFIG).map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(epoch, bytes.as_slice()).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads the committee/config snapshot for `epoch`, if present.
    pub fn get_epoch_config(&self, epoch: u64) -> Result<Option<ReplicaConfig>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(EPOCH_CONFIG).map_err(|e| StorageError::Backend(e.to_string()))?;
        match t.get(epoch).map_err(|e| StorageError::Backend(e.to_string()))? {
            Some(v) => Ok(Some(serde_json_like_decode(v.value())?)),
            None => Ok(None),
        }
    }

    /// The highest height with both a block and a root persisted, or
    /// `None` for a fresh store.
    pub fn head(&self) -> Result<Option<u64>, StorageError> {
        let r = self.db.begin_read().map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r.open_table(ROOTS).map_err(|e| StorageError::Backend(e.to_string()))?;
        let last = t.iter().map_err(|e| StorageError::Backend(e.to_string()))?.last();
        match last {
            Some(entry) => {
                let (k, _) = entry.map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(k.value()))
            }
            None => Ok(None),
        }
    }
}

/// `ReplicaConfig` carries `PublicKey = [u8; 32]` arrays that SCALE encodes
/// fine, but the config surface is human-edited JSON elsewhere (§10.5), so
/// the epoch snapshot is stored the same way for a single consistent format.
fn serde_json_like_encode(config: &ReplicaConfig) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(config).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn serde_json_like_decode(bytes: &[u8]) -> Result<ReplicaConfig, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pop_types::app::{Hash32 as H, PublicKey};
    use pop_types::config::CommitteeConfig;

    fn block(height: u64) -> ProofBlock {
        ProofBlock {
            height,
            view: 0,
            prev_block_hash: [0u8; 32],
            timestamp_ns: 0,
            proofs: vec![],
            expected_post_root: StateRoot::empty(),
            proposer_pk: [1u8; 32],
            proposer_sig: [0u8; 64],
        }
    }

    fn committee() -> ReplicaConfig {
        let pk: PublicKey = [1u8; 32];
        ReplicaConfig {
            self_pk: pk,
            committee: CommitteeConfig { committee: vec![pk, [2u8; 32], [3u8; 32], [4u8; 32]] },
            mempool: Default::default(),
            consensus: Default::default(),
            gossip: Default::default(),
            rewards: Default::default(),
        }
    }

    #[test]
    fn block_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        let b = block(1);
        store.put_block(1, &b).unwrap();
        assert_eq!(store.get_block(1).unwrap(), Some(b));
        assert_eq!(store.get_block(2).unwrap(), None);
    }

    #[test]
    fn cert_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        let cert = QuorumCert { height: 2, view: 0, block_hash: [9u8; 32], commit_sigs: vec![] };
        store.put_cert(2, &cert).unwrap();
        assert_eq!(store.get_cert(2).unwrap(), Some(cert));
    }

    #[test]
    fn state_node_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        let h: H = [5u8; 32];
        store.put_state_node(&h, b"leaf bytes").unwrap();
        assert_eq!(store.get_state_node(&h).unwrap(), Some(b"leaf bytes".to_vec()));
    }

    #[test]
    fn root_round_trips_and_head_tracks_the_highest_height() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        assert_eq!(store.head().unwrap(), None);
        store.put_root(1, &StateRoot::empty()).unwrap();
        store.put_root(2, &StateRoot::empty()).unwrap();
        assert_eq!(store.head().unwrap(), Some(2));
    }

    #[test]
    fn evidence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        let id: H = [3u8; 32];
        store.put_evidence(&id, b"evidence bytes").unwrap();
        assert_eq!(store.get_evidence(&id).unwrap(), Some(b"evidence bytes".to_vec()));
    }

    #[test]
    fn epoch_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("db.redb")).unwrap();
        let cfg = committee();
        store.put_epoch_config(7, &cfg).unwrap();
        let read_back = store.get_epoch_config(7).unwrap().unwrap();
        assert_eq!(read_back.committee.committee, cfg.committee.committee);
    }
}
