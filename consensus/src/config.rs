//! Configuration for the consensus node

use serde::{Deserialize, Serialize};

/// Consensus node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID
    pub node_id: String,

    /// This node's validator address as CometBFT reports it in block
    /// headers (uppercase hex)
    pub validator_address: String,

    /// Chain configuration
    pub chain: ChainConfig,

    /// CometBFT configuration
    pub cometbft: CometBftConfig,

    /// System transaction relay configuration
    pub relay: RelayConfig,
}

/// Chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: String,

    /// Chain name
    pub name: String,

    /// Genesis validator account ids
    pub genesis_validators: Vec<String>,
}

/// CometBFT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CometBftConfig {
    /// ABCI listen address
    pub abci_addr: String,

    /// CometBFT RPC endpoint used for transaction submission
    pub rpc_endpoint: String,
}

/// System transaction relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Initial retry backoff (ms)
    pub initial_backoff_ms: u64,

    /// Retry backoff cap (ms)
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            validator_address: "".to_string(),
            chain: ChainConfig {
                chain_id: "halcyon-1".to_string(),
                name: "main".to_string(),
                genesis_validators: vec![],
            },
            cometbft: CometBftConfig {
                abci_addr: "127.0.0.1:26658".to_string(),
                rpc_endpoint: "http://127.0.0.1:26657".to_string(),
            },
            relay: RelayConfig {
                initial_backoff_ms: 200,
                max_backoff_ms: 5000,
            },
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(node_id) = std::env::var("CONSENSUS_NODE_ID") {
            config.node_id = node_id;
        }

        if let Ok(address) = std::env::var("CONSENSUS_VALIDATOR_ADDRESS") {
            config.validator_address = address;
        }

        if let Ok(chain_id) = std::env::var("CONSENSUS_CHAIN_ID") {
            config.chain.chain_id = chain_id;
        }

        if let Ok(abci_addr) = std::env::var("CONSENSUS_ABCI_ADDR") {
            config.cometbft.abci_addr = abci_addr;
        }

        if let Ok(rpc_endpoint) = std::env::var("CONSENSUS_RPC_ENDPOINT") {
            config.cometbft.rpc_endpoint = rpc_endpoint;
        }

        if let Ok(validators) = std::env::var("CONSENSUS_GENESIS_VALIDATORS") {
            config.chain.genesis_validators =
                validators.split(',').map(|s| s.trim().to_string()).collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain.chain_id, "halcyon-1");
        assert_eq!(config.relay.initial_backoff_ms, 200);
        assert!(config.relay.max_backoff_ms > config.relay.initial_backoff_ms);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let encoded = toml::to_string(&config).unwrap();
        let decoded: Config = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.node_id, config.node_id);
        assert_eq!(decoded.cometbft.abci_addr, config.cometbft.abci_addr);
    }
}
