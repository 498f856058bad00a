//! Node configuration (`config.yaml`), loaded once at startup alongside
//! the genesis file.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    pub network_id: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    pub validator_keyfile: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:30303".to_string()
}

fn default_api_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            data_dir: "/data".to_string(),
            network_id: 1337,
            listen_addr: default_listen_addr(),
            api_addr: default_api_addr(),
            validator_keyfile: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load node config: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError(e.to_string()))?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError(e.to_string()))
    }

    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let config = NodeConfig::default();
        let yaml = serde_yaml::to_string(&config).map_err(|e| ConfigError(e.to_string()))?;
        fs::write(path, yaml).map_err(|e| ConfigError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_yaml() {
        let config = NodeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: NodeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network_id, config.network_id);
        assert_eq!(parsed.api_addr, config.api_addr);
    }
}
