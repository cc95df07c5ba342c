// Configuration module

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ADDRESS, DEFAULT_CACHE_SLOTS, DEFAULT_PORT, DEFAULT_THREADS};
use crate::error::ProxyError;

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_cache_slots() -> usize {
    DEFAULT_CACHE_SLOTS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the listener to
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads driving the runtime
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            threads: default_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of cache slots. Each URL hashes to exactly one slot.
    #[serde(default = "default_cache_slots")]
    pub slots: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            slots: default_cache_slots(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Request log path; stdout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ProxyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&text)
            .map_err(|e| ProxyError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.cache.slots == 0 {
            return Err(ProxyError::Config(
                "cache.slots must be at least 1".to_string(),
            ));
        }
        if self.server.threads == 0 {
            return Err(ProxyError::Config(
                "server.threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The socket address string the listener binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }
}
