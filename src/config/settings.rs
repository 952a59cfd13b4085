use crate::core::types::Account;
use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_P2P_PORT: u16 = 9000;
pub const DEFAULT_RPC_PORT: u16 = 8545;

const DEFAULT_CHAIN_ID: i64 = 1;
const DEFAULT_BLOCK_TIME_SECS: u64 = 10;
const DEFAULT_MAX_BLOCK_SIZE: usize = 1024 * 1024;
const DEFAULT_MAX_TX_PER_BLOCK: usize = 1000;
const DEFAULT_INITIAL_REWARD: i64 = 1000;
const DEFAULT_REWARD_DECAY: f64 = 0.99;

/// Chain parameters shared by every node of a devnet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: i64,
    pub block_time_secs: u64,
    pub max_block_size: usize,
    pub max_tx_per_block: usize,
    pub initial_reward: i64,
    /// Parsed and surfaced but deliberately not applied: the patch reward
    /// stays flat and the resulting supply growth is a documented devnet
    /// property
    pub reward_decay: f64,
    /// Pinned genesis timestamp. Nodes of one devnet must agree on it or
    /// their genesis hashes diverge; unset means first-start wall clock.
    pub genesis_time: Option<i64>,
    pub genesis_accounts: Vec<Account>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            chain_id: DEFAULT_CHAIN_ID,
            block_time_secs: DEFAULT_BLOCK_TIME_SECS,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            max_tx_per_block: DEFAULT_MAX_TX_PER_BLOCK,
            initial_reward: DEFAULT_INITIAL_REWARD,
            reward_decay: DEFAULT_REWARD_DECAY,
            genesis_time: None,
            genesis_accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct P2pSection {
    port: Option<u16>,
    seed_addrs: Option<Vec<String>>,
    dns_seeds: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RpcSection {
    port: Option<u16>,
}

/// Per-node configuration loaded from YAML. The flat field names are the
/// primary shape; nested `p2p:` and `rpc:` sections are accepted as well
/// and take precedence over their flat counterparts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub p2p_port: u16,
    pub rpc_port: u16,
    /// Hex-encoded key material; generated and persisted to
    /// `<data_dir>/node.key` when absent
    pub private_key: Option<String>,
    /// Legacy boot node endpoints, tried once at startup
    pub boot_nodes: Vec<String>,
    pub is_validator: bool,
    pub is_bootstrap: bool,
    pub enable_discovery: bool,
    /// Seed addresses feeding the known-address table. The loopback
    /// defaults only make sense for a local devnet.
    pub seed_addrs: Vec<String>,
    /// DNS hostnames resolved at startup, each IP paired with the default
    /// P2P port
    pub dns_seeds: Vec<String>,
    pub chain: ChainConfig,
    pub(crate) p2p: Option<P2pSection>,
    pub(crate) rpc: Option<RpcSection>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: PathBuf::from("./data"),
            p2p_port: DEFAULT_P2P_PORT,
            rpc_port: DEFAULT_RPC_PORT,
            private_key: None,
            boot_nodes: Vec::new(),
            is_validator: true,
            is_bootstrap: false,
            enable_discovery: true,
            seed_addrs: default_seed_addrs(),
            dns_seeds: default_dns_seeds(),
            chain: ChainConfig::default(),
            p2p: None,
            rpc: None,
        }
    }
}

fn default_seed_addrs() -> Vec<String> {
    vec![
        "127.0.0.1:9001".to_string(),
        "127.0.0.1:9002".to_string(),
        "127.0.0.1:9003".to_string(),
    ]
}

fn default_dns_seeds() -> Vec<String> {
    vec![
        "seed.agentchain.io".to_string(),
        "nodes.agentchain.io".to_string(),
        "bootstrap.agentchain.io".to_string(),
        "peers.agentchain.io".to_string(),
    ]
}

impl NodeConfig {
    /// Load from a YAML file, or fall back to defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    ChainError::Config(format!("Failed to read {}: {e}", path.display()))
                })?;
                serde_yaml::from_str::<NodeConfig>(&raw)?
            }
            None => NodeConfig::default(),
        };
        config.normalize();
        Ok(config)
    }

    /// Fold nested sections and environment overrides into the flat fields
    fn normalize(&mut self) {
        if let Some(p2p) = self.p2p.take() {
            if let Some(port) = p2p.port {
                self.p2p_port = port;
            }
            if let Some(seeds) = p2p.seed_addrs {
                self.seed_addrs = seeds;
            }
            if let Some(seeds) = p2p.dns_seeds {
                self.dns_seeds = seeds;
            }
        }
        if let Some(rpc) = self.rpc.take() {
            if let Some(port) = rpc.port {
                self.rpc_port = port;
            }
        }
        if let Ok(chain_id) = env::var("CHAIN_ID") {
            if let Ok(parsed) = chain_id.parse::<i64>() {
                self.chain.chain_id = parsed;
            }
        }
        if let Ok(genesis_time) = env::var("GENESIS_TIME") {
            if let Ok(parsed) = genesis_time.parse::<i64>() {
                self.chain.genesis_time = Some(parsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Address;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load_yaml(yaml: &str) -> NodeConfig {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        NodeConfig::load(Some(file.path())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::load(None).unwrap();
        assert_eq!(config.p2p_port, DEFAULT_P2P_PORT);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert!(config.is_validator);
        assert!(!config.is_bootstrap);
        assert!(config.enable_discovery);
        assert_eq!(config.chain.block_time_secs, 10);
        assert_eq!(config.chain.max_block_size, 1024 * 1024);
        assert_eq!(config.chain.max_tx_per_block, 1000);
        assert_eq!(config.chain.initial_reward, 1000);
    }

    #[test]
    fn test_flat_shape() {
        let config = load_yaml(
            r#"
data_dir: /tmp/node1
p2p_port: 9101
rpc_port: 8645
is_validator: false
boot_nodes:
  - "127.0.0.1:9001"
"#,
        );
        assert_eq!(config.data_dir, PathBuf::from("/tmp/node1"));
        assert_eq!(config.p2p_port, 9101);
        assert_eq!(config.rpc_port, 8645);
        assert!(!config.is_validator);
        assert_eq!(config.boot_nodes, vec!["127.0.0.1:9001".to_string()]);
    }

    #[test]
    fn test_nested_sections_take_precedence() {
        let config = load_yaml(
            r#"
p2p_port: 9101
p2p:
  port: 9201
rpc:
  port: 8745
"#,
        );
        assert_eq!(config.p2p_port, 9201);
        assert_eq!(config.rpc_port, 8745);
    }

    #[test]
    fn test_genesis_accounts() {
        let config = load_yaml(
            r#"
chain:
  initial_reward: 500
  genesis_accounts:
    - address: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
      balance: 1000
"#,
        );
        assert_eq!(config.chain.initial_reward, 500);
        assert_eq!(config.chain.genesis_accounts.len(), 1);
        let account = &config.chain.genesis_accounts[0];
        assert_eq!(
            account.address,
            Address::parse("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap()
        );
        assert_eq!(account.balance, 1000);
        assert_eq!(account.nonce, 0);
    }

    #[test]
    fn test_malformed_yaml_is_a_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"p2p_port: [not a port").unwrap();
        assert!(matches!(
            NodeConfig::load(Some(file.path())),
            Err(ChainError::Config(_))
        ));
    }
}
