// Path: crates/node/tests/config_and_keys.rs
//! Round-trips `NodeConfig` through TOML and exercises the
//! load-or-generate key helpers against a scratch data directory.

use pop_node::config::NodeConfig;
use pop_node::keys;
use pop_test_utils::fixtures::make_committee;
use pop_types::config::ReplicaConfig;

fn sample_config() -> NodeConfig {
    let (committee, _kps) = make_committee(4);
    let replica = ReplicaConfig {
        self_pk: committee.committee[0],
        committee,
        mempool: Default::default(),
        consensus: Default::default(),
        gossip: Default::default(),
        rewards: Default::default(),
        state: Default::default(),
    };
    NodeConfig {
        replica,
        data_dir: "./data".into(),
        listen_addr: "/ip4/0.0.0.0/tcp/4001".to_string(),
        bootstrap_peers: vec!["/ip4/127.0.0.1/tcp/4002".to_string()],
        telemetry_addr: "0.0.0.0:9090".parse().unwrap(),
    }
}

#[test]
fn config_round_trips_through_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pop-node.toml");
    let original = sample_config();
    let toml_text = toml::to_string(&original).unwrap();
    std::fs::write(&path, toml_text).unwrap();

    let loaded = NodeConfig::load(&path).unwrap();
    assert_eq!(loaded.replica.self_pk, original.replica.self_pk);
    assert_eq!(loaded.replica.committee.committee, original.replica.committee.committee);
    assert_eq!(loaded.listen_addr, original.listen_addr);
    assert_eq!(loaded.bootstrap_peers, original.bootstrap_peers);
    assert_eq!(loaded.telemetry_addr, original.telemetry_addr);
}

#[test]
fn config_rejects_a_self_pk_outside_the_committee() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pop-node.toml");
    let mut bad = sample_config();
    bad.replica.self_pk = [0xffu8; 32];
    std::fs::write(&path, toml::to_string(&bad).unwrap()).unwrap();

    assert!(NodeConfig::load(&path).is_err());
}

#[test]
fn consensus_key_is_generated_once_and_then_reloaded_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("consensus.key");
    assert!(!path.exists());

    let first = keys::load_or_generate_consensus_key(&path).unwrap();
    assert!(path.exists());
    let second = keys::load_or_generate_consensus_key(&path).unwrap();

    use pop_crypto::sign::{SerializableKey, SigningKeyPair};
    assert_eq!(first.public_key().to_bytes(), second.public_key().to_bytes());
}

#[test]
fn network_key_is_generated_once_and_then_reloaded_identically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.key");
    assert!(!path.exists());

    let first = keys::load_or_generate_network_key(&path).unwrap();
    assert!(path.exists());
    let second = keys::load_or_generate_network_key(&path).unwrap();

    assert_eq!(first.public(), second.public());
}
