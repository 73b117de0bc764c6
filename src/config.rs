//! Configuration for the bridge task CLI

use std::env;
use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway endpoint attested queries are POSTed to.
    pub gateway_endpoint: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum gateway request attempts.
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_endpoint: "http://localhost:8000/graphql".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Load configuration from file (if present) and environment.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| BridgeError::Validation(format!("cannot read {}: {}", path, e)))?;
            toml::from_str(&contents)
                .map_err(|e| BridgeError::Validation(format!("cannot parse {}: {}", path, e)))?
        } else {
            Config::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = env::var("GATEWAY_ENDPOINT") {
            self.gateway_endpoint = endpoint;
        }
        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.request_timeout_secs = secs;
            }
        }
        if let Ok(retries) = env::var("MAX_RETRIES") {
            if let Ok(count) = retries.parse() {
                self.max_retries = count;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.gateway_endpoint.is_empty() {
            return Err(BridgeError::Validation(
                "gateway endpoint is required".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(BridgeError::Validation(
                "at least one gateway attempt is required".to_string(),
            ));
        }
        Ok(())
    }
}
