// Path: crates/node/src/config.rs
//! On-disk node configuration: the replica's consensus surface (§6) plus
//! the process-level knobs (network addresses, data directory) that have
//! no counterpart inside the consensus core itself.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use pop_types::config::ReplicaConfig;
use serde::{Deserialize, Serialize};

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/4001".to_string()
}

fn default_telemetry_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

/// The full configuration for a `pop-node` process: §6's [`ReplicaConfig`]
/// flattened alongside the transport and storage knobs the binary owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(flatten)]
    pub replica: ReplicaConfig,

    /// Directory holding the redb store, consensus key seed, and libp2p
    /// identity file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Multiaddr this node listens for libp2p connections on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Multiaddrs of peers to dial on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// Address the Prometheus/healthz HTTP surface binds to.
    #[serde(default = "default_telemetry_addr")]
    pub telemetry_addr: SocketAddr,
}

impl NodeConfig {
    /// Loads and validates a [`NodeConfig`] from a TOML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {path:?}: {e}"))?;
        let config: NodeConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config {path:?}: {e}"))?;
        config
            .replica
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid replica config: {e}"))?;
        Ok(config)
    }

    pub fn consensus_key_path(&self) -> PathBuf {
        self.data_dir.join("consensus.key")
    }

    pub fn network_key_path(&self) -> PathBuf {
        self.data_dir.join("identity.key")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("state.redb")
    }
}
