// Path: crates/node/src/bin/pop-node.rs
//! `pop-node` entrypoint: loads configuration and keys, opens the
//! persisted store, stands up the libp2p transport, and spawns the
//! consensus replica and telemetry server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use libp2p::Multiaddr;
use tracing::info;

use pop_mempool::{Mempool, MempoolLimits, StructuralEngine, StructuralFingerprintDifficulty};
use pop_networking::Libp2pTransport;
use pop_node::{config::NodeConfig, keys, replica};
use pop_state::StateStore;
use pop_storage::RedbStore;

#[derive(Parser, Debug)]
#[command(name = "pop-node", about = "A Proof-of-Proof consensus replica")]
struct Cli {
    /// Path to this replica's TOML configuration file.
    #[arg(long, default_value = "pop-node.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pop_telemetry::init::init_tracing()?;
    let sink = pop_telemetry::prometheus::install()?;
    let _ = pop_telemetry::sinks::SINK.set(sink);

    let cli = Cli::parse();
    let config = NodeConfig::load(&cli.config)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let consensus_key = keys::load_or_generate_consensus_key(&config.consensus_key_path())?;
    let network_key = keys::load_or_generate_network_key(&config.network_key_path())?;

    let storage = Arc::new(RedbStore::open(config.store_path())?);
    let store = StateStore::new(config.replica.state.conserved_domains.clone(), config.replica.state.mint_burn_authority);

    let listen_addr: Multiaddr = config.listen_addr.parse()?;
    let dial_addrs: Vec<Multiaddr> =
        config.bootstrap_peers.iter().map(|s| s.parse()).collect::<Result<_, _>>()?;
    let transport = Libp2pTransport::new(network_key, listen_addr, &dial_addrs)?;

    let mempool_cfg = &config.replica.mempool;
    let limits = MempoolLimits {
        verify_budget: Duration::from_millis(100),
        rate_limit_capacity: mempool_cfg.mempool_burst_per_submitter as f64,
        rate_limit_refill_per_sec: mempool_cfg.mempool_rate_limit_per_submitter,
        min_difficulty: mempool_cfg.min_difficulty.unwrap_or(1),
    };
    let difficulty_fn = Arc::new(StructuralFingerprintDifficulty);
    let logical_engine = Arc::new(StructuralEngine::new(difficulty_fn.clone()));
    let mempool = Arc::new(Mempool::new(logical_engine, limits));

    let (status_rx, consensus_handle) = replica::spawn(
        config.replica.clone(),
        consensus_key,
        mempool,
        store,
        storage,
        transport,
        difficulty_fn,
    )?;

    info!(addr = %config.telemetry_addr, "telemetry server starting");
    let telemetry_handle = tokio::spawn(pop_telemetry::http::run_server(config.telemetry_addr, status_rx));

    tokio::select! {
        res = consensus_handle => {
            if let Err(e) = res {
                tracing::error!(error = %e, "consensus task exited with a panic");
            }
        }
        res = telemetry_handle => {
            if let Err(e) = res {
                tracing::error!(error = %e, "telemetry task exited with a panic");
            }
        }
    }
    Ok(())
}
