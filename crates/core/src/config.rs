//! Coordinator configuration.
//!
//! Loaded from a JSON file by the daemon; every field has a serde default
//! so a minimal config only needs the chain endpoint and contract
//! addresses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default retention window in blocks (~1 hour on a 5-second chain).
pub const DEFAULT_EPOCH: u64 = 720;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Chain JSON-RPC endpoint
    pub chain_endpoint: String,

    /// Project registry contract address (0x-hex)
    pub project_contract: String,

    /// Prover registry contract address (0x-hex)
    pub prover_contract: String,

    /// Block-number helper contract address (0x-hex)
    pub block_number_contract: String,

    /// Multicall contract address (0x-hex)
    pub multicall_contract: String,

    /// Retention window for the contract history ring, in blocks
    #[serde(default = "default_epoch")]
    pub epoch: u64,

    /// Chain scan interval in milliseconds
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Dispatcher task poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Session lifetime in seconds; absent means sessions never expire
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,

    /// HTTP ingress listen address
    #[serde(default = "default_api_listen")]
    pub api_listen: String,

    /// Credential issuer/verifier service endpoint
    #[serde(default)]
    pub credential_endpoint: String,

    /// Known clients and their project permissions
    #[serde(default)]
    pub clients: Vec<ClientEntry>,

    /// Pub/sub fabric settings
    #[serde(default)]
    pub pubsub: PubsubSettings,
}

/// A known client and the projects it may submit to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEntry {
    #[serde(rename = "clientDID")]
    pub client_did: String,
    #[serde(default)]
    pub projects: Vec<u64>,
}

/// Pub/sub fabric settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubsubSettings {
    /// libp2p listen multiaddr
    #[serde(default = "default_pubsub_listen")]
    pub listen: String,

    /// Bootstrap peer multiaddrs
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

fn default_epoch() -> u64 {
    DEFAULT_EPOCH
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_api_listen() -> String {
    "0.0.0.0:9000".to_string()
}

fn default_pubsub_listen() -> String {
    "/ip4/0.0.0.0/tcp/8000".to_string()
}

impl Default for PubsubSettings {
    fn default() -> Self {
        Self {
            listen: default_pubsub_listen(),
            bootstrap: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scan_interval_ms)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_ttl(&self) -> Option<std::time::Duration> {
        self.session_ttl_secs.map(std::time::Duration::from_secs)
    }
}
