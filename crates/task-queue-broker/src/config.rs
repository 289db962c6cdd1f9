use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub listen_addr: SocketAddr,
    /// `host:port` or `host:port/db_index`, as accepted by `task-queue-store`.
    pub store_addr: String,
    pub log_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            store_addr: "127.0.0.1:6379".to_string(),
            log_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
