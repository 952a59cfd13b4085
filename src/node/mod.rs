//! Node lifecycle
//!
//! Wires configuration, key material, chain engine, overlay, consensus
//! and RPC together, runs until a termination signal arrives, then tears
//! everything down.

use crate::config::NodeConfig;
use crate::consensus::Engine;
use crate::core::Chain;
use crate::error::{ChainError, Result};
use crate::network::{msg_type, Discovery, Network};
use crate::rpc::RpcServer;
use crate::utils::{NodeKeyPair, Shutdown};
use log::{info, warn};
use serde_json::json;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const NODE_KEY_FILE: &str = "node.key";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run a node to completion. Returns once a termination signal has been
/// handled; startup failures propagate to the caller.
pub fn run(config: NodeConfig) -> Result<()> {
    fs::create_dir_all(&config.data_dir).map_err(|e| {
        ChainError::Config(format!(
            "Failed to create data directory {}: {e}",
            config.data_dir.display()
        ))
    })?;

    let key_pair = load_or_generate_key(&config)?;
    let node_address = key_pair.address();
    let node_id = node_address.to_string();

    let chain = Chain::open(config.chain.clone(), &config.data_dir.join("blockchain"))?;

    let shutdown = Shutdown::new();
    install_signal_handler(&shutdown)?;

    let network = Arc::new(Network::new(
        node_id.clone(),
        config.p2p_port,
        shutdown.clone(),
    ));

    let engine = Engine::new(
        chain.clone(),
        Arc::clone(&network),
        node_address,
        config.is_validator,
        shutdown.clone(),
    );

    Arc::clone(&network).start()?;

    let discovery = if config.enable_discovery {
        let discovery = Discovery::new(
            Arc::clone(&network),
            config.seed_addrs.clone(),
            config.dns_seeds.clone(),
            config.p2p_port,
            config.is_bootstrap,
            shutdown.clone(),
        );
        Arc::clone(&discovery).start();
        Some(discovery)
    } else {
        None
    };

    connect_boot_nodes(&network, &config.boot_nodes);

    Arc::clone(&engine).start();

    let rpc = RpcServer::new(
        chain.clone(),
        Arc::clone(&engine),
        Arc::clone(&network),
        config.rpc_port,
        shutdown.clone(),
    );
    Arc::clone(&rpc).start()?;

    if let Some(discovery) = &discovery {
        info!("P2P discovery enabled: {:?}", discovery.stats());
    }

    info!("Node started successfully");
    info!("Node ID: {node_id}");
    info!("Address: {node_address}");
    info!("P2P Port: {}", config.p2p_port);
    info!("RPC Port: {}", config.rpc_port);

    // Park until the signal handler trips the shutdown token
    while shutdown.sleep(Duration::from_secs(1)) {}

    info!("Shutting down node...");
    // Every loop already observed the token; drain in-flight RPC requests
    // within the grace period, then flush the chain.
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while rpc.active_connections() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    if let Err(e) = chain.flush() {
        warn!("Failed to flush chain state on shutdown: {e}");
    }
    info!("Node stopped");
    Ok(())
}

fn install_signal_handler(shutdown: &Shutdown) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| ChainError::Config(format!("Failed to install signal handler: {e}")))?;
    let shutdown = shutdown.clone();
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {signal}, shutting down");
            shutdown.trigger();
        }
    });
    Ok(())
}

/// Key precedence: explicit config value, then the persisted key file,
/// else generate and persist a fresh pair with owner-only permissions.
fn load_or_generate_key(config: &NodeConfig) -> Result<NodeKeyPair> {
    if let Some(hex) = &config.private_key {
        return NodeKeyPair::from_hex(hex);
    }

    let key_path = config.data_dir.join(NODE_KEY_FILE);
    if key_path.exists() {
        let hex = fs::read_to_string(&key_path).map_err(|e| {
            ChainError::Config(format!("Failed to read {}: {e}", key_path.display()))
        })?;
        return NodeKeyPair::from_hex(&hex);
    }

    let key_pair = NodeKeyPair::generate()?;
    write_key_file(&key_path, &key_pair.to_hex())?;
    info!("Generated node key at {}", key_path.display());
    Ok(key_pair)
}

fn write_key_file(path: &Path, hex: &str) -> Result<()> {
    fs::write(path, hex)
        .map_err(|e| ChainError::Io(format!("Failed to write {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            ChainError::Io(format!(
                "Failed to restrict permissions on {}: {e}",
                path.display()
            ))
        })?;
    }

    Ok(())
}

/// Contact legacy boot nodes once at startup, best-effort. Accepts plain
/// `host:port` endpoints and `/ip4/<ip>/tcp/<port>` multiaddress strings.
fn connect_boot_nodes(network: &Network, boot_nodes: &[String]) {
    for boot_node in boot_nodes {
        let Some(addr) = parse_boot_node(boot_node) else {
            warn!("Skipping malformed boot node address: {boot_node}");
            continue;
        };
        match network.send_to_addr(&addr, msg_type::GETADDR, json!(null)) {
            Ok(()) => info!("Contacted boot node {addr}"),
            Err(e) => warn!("Failed to contact boot node {addr}: {e}"),
        }
    }
}

fn parse_boot_node(raw: &str) -> Option<String> {
    if let Some(rest) = raw.strip_prefix('/') {
        // /ip4/<ip>/tcp/<port>[/...]
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() >= 4 && (parts[0] == "ip4" || parts[0] == "ip6") && parts[2] == "tcp" {
            return Some(format!("{}:{}", parts[1], parts[3]));
        }
        return None;
    }
    if raw.contains(':') {
        return Some(raw.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_boot_node_forms() {
        assert_eq!(
            parse_boot_node("127.0.0.1:9001"),
            Some("127.0.0.1:9001".to_string())
        );
        assert_eq!(
            parse_boot_node("/ip4/10.0.0.5/tcp/9002"),
            Some("10.0.0.5:9002".to_string())
        );
        assert_eq!(
            parse_boot_node("/ip4/10.0.0.5/tcp/9002/p2p/QmPeer"),
            Some("10.0.0.5:9002".to_string())
        );
        assert_eq!(parse_boot_node("no-port"), None);
        assert_eq!(parse_boot_node("/dns4/example.com/tcp/9002"), None);
    }

    #[test]
    fn test_key_generation_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };

        let generated = load_or_generate_key(&config).unwrap();
        assert!(dir.path().join(NODE_KEY_FILE).exists());

        let reloaded = load_or_generate_key(&config).unwrap();
        assert_eq!(generated.address(), reloaded.address());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };
        load_or_generate_key(&config).unwrap();

        let metadata = fs::metadata(dir.path().join(NODE_KEY_FILE)).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_explicit_private_key_wins() {
        let dir = tempdir().unwrap();
        let key_pair = NodeKeyPair::generate().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            private_key: Some(key_pair.to_hex()),
            ..NodeConfig::default()
        };

        let loaded = load_or_generate_key(&config).unwrap();
        assert_eq!(loaded.address(), key_pair.address());
        // No key file is written when the key comes from config
        assert!(!dir.path().join(NODE_KEY_FILE).exists());
    }
}
