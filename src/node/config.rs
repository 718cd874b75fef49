//! Node configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::types::Address;

/// Full node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain identity
    pub chain: ChainConfig,

    /// Block production
    pub mining: MiningConfig,

    /// GHOSTDAG parameters
    pub ghostdag: GhostdagConfig,

    /// Mempool bounds
    pub mempool: MempoolConfig,

    /// RPC / WebSocket endpoints
    pub rpc: RpcConfig,

    /// Pre-funded development accounts
    pub accounts: DevAccountsConfig,

    /// Named network profiles selectable by `default_network`
    pub networks: HashMap<String, NetworkProfile>,

    /// Which profile this node runs
    pub default_network: String,
}

/// Chain-specific configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,

    /// Network name
    pub network_name: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            network_name: "braid-local".to_string(),
        }
    }
}

/// Block production configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Blocks produced per round
    pub parallelism: usize,

    /// Milliseconds between rounds
    pub block_time_ms: u64,

    /// Maximum parents referenced per block
    pub max_parents: usize,

    /// Block producer identity
    pub miner_address: Address,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            parallelism: 3,
            block_time_ms: 2000,
            max_parents: 3,
            miner_address: Address::ZERO,
        }
    }
}

/// GHOSTDAG coloring configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostdagConfig {
    /// Anticone-size bound for blue admission
    pub k: u64,

    /// Healthy blue-fraction floor reported in stats; must lie in [0, 1]
    pub blue_threshold: f64,
}

impl Default for GhostdagConfig {
    fn default() -> Self {
        Self {
            k: 18,
            blue_threshold: 0.5,
        }
    }
}

/// Mempool configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum held transactions; lowest gas price is evicted when full
    pub max_size: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

/// RPC server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC HTTP address
    pub listen_addr: SocketAddr,

    /// WebSocket stream address
    pub ws_addr: SocketAddr,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8545".parse().expect("static address"),
            ws_addr: "0.0.0.0:8546".parse().expect("static address"),
        }
    }
}

/// Pre-funded development accounts, derived deterministically from a seed.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DevAccountsConfig {
    /// Number of accounts to derive
    pub count: usize,

    /// Ether balance granted to each, as a decimal string
    pub balance_ether: String,

    /// Derivation seed
    pub seed: u64,
}

impl Default for DevAccountsConfig {
    fn default() -> Self {
        Self {
            count: 10,
            balance_ether: "10000".to_string(),
            seed: 0xB1A1D,
        }
    }
}

/// A named network profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub rpc_port: u16,
    pub ws_port: u16,
}

/// Configuration violations. All fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("parallelism must be >= 1")]
    InvalidParallelism,

    #[error("max_parents must be >= 1")]
    InvalidMaxParents,

    #[error("block_time_ms must be >= 1")]
    InvalidBlockTime,

    #[error("ghostdag k must be >= 1")]
    InvalidK,

    #[error("blue_threshold must lie in [0, 1], got {0}")]
    InvalidBlueThreshold(f64),

    #[error("mempool max_size must be >= 1")]
    InvalidMempoolSize,

    #[error("default network {0:?} not present in network map")]
    UnknownDefaultNetwork(String),

    #[error("invalid ether amount {0:?}")]
    InvalidBalance(String),

    #[error("failed to read config: {0}")]
    Read(String),

    #[error("failed to write config: {0}")]
    Write(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

impl NodeConfig {
    /// Check every startup invariant. Violations are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mining.parallelism < 1 {
            return Err(ConfigError::InvalidParallelism);
        }
        if self.mining.max_parents < 1 {
            return Err(ConfigError::InvalidMaxParents);
        }
        if self.mining.block_time_ms < 1 {
            return Err(ConfigError::InvalidBlockTime);
        }
        if self.ghostdag.k < 1 {
            return Err(ConfigError::InvalidK);
        }
        let threshold = self.ghostdag.blue_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(ConfigError::InvalidBlueThreshold(threshold));
        }
        if self.mempool.max_size < 1 {
            return Err(ConfigError::InvalidMempoolSize);
        }
        if !self.networks.is_empty() && !self.networks.contains_key(&self.default_network) {
            return Err(ConfigError::UnknownDefaultNetwork(
                self.default_network.clone(),
            ));
        }
        crate::types::units::parse_ether(&self.accounts.balance_ether)
            .map_err(|_| ConfigError::InvalidBalance(self.accounts.balance_ether.clone()))?;
        Ok(())
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Write(e.to_string()))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut networks = HashMap::new();
        networks.insert(
            "local".to_string(),
            NetworkProfile {
                chain_id: 1337,
                rpc_port: 8545,
                ws_port: 8546,
            },
        );
        Self {
            chain: ChainConfig::default(),
            mining: MiningConfig::default(),
            ghostdag: GhostdagConfig::default(),
            mempool: MempoolConfig::default(),
            rpc: RpcConfig::default(),
            accounts: DevAccountsConfig::default(),
            networks,
            default_network: "local".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain.chain_id, 1337);
        assert_eq!(config.mining.parallelism, 3);
        assert_eq!(config.ghostdag.k, 18);
        assert_eq!(config.mempool.max_size, 1000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.mining.parallelism = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidParallelism));

        let mut config = NodeConfig::default();
        config.mining.max_parents = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxParents));

        let mut config = NodeConfig::default();
        config.ghostdag.k = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidK));

        let mut config = NodeConfig::default();
        config.ghostdag.blue_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBlueThreshold(_))
        ));

        let mut config = NodeConfig::default();
        config.default_network = "testnet".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownDefaultNetwork(_))
        ));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let recovered: NodeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.chain.chain_id, recovered.chain.chain_id);
        assert_eq!(config.mining.block_time_ms, recovered.mining.block_time_ms);
        assert_eq!(config.rpc.listen_addr, recovered.rpc.listen_addr);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = NodeConfig::default();
        config.chain.chain_id = 4242;
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.chain.chain_id, 4242);

        assert!(NodeConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let loaded: NodeConfig =
            serde_json::from_str(r#"{"chain": {"chain_id": 99}}"#).unwrap();
        assert_eq!(loaded.chain.chain_id, 99);
        assert_eq!(loaded.mining.parallelism, 3);
    }
}
