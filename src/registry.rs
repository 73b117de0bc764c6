//! Bridge identity registry

use std::collections::HashMap;

use tracing::info;

use crate::error::{BridgeError, Result};
use crate::query::check_splice;
use crate::types::{BridgeConfig, BridgeId};

/// Immutable store of registered bridge configurations, keyed by the content
/// hash of their fields.
#[derive(Debug, Default)]
pub struct BridgeRegistry {
    bridges: HashMap<BridgeId, BridgeConfig>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self {
            bridges: HashMap::new(),
        }
    }

    /// Register `config` and return its identity hash.
    ///
    /// The configuration is validated up front; a duplicate registration is
    /// rejected so the proposal and data-stream history tied to an existing
    /// ID can never be reset.
    pub fn create_bridge(&mut self, config: BridgeConfig) -> Result<BridgeId> {
        check_splice(&config.query_template, &config.splice)?;
        if config.resolution_threshold_slashable > 100 || config.resolution_threshold_external > 100
        {
            return Err(BridgeError::Validation(
                "resolution thresholds are percentages and must not exceed 100".to_string(),
            ));
        }

        let bridge_id = config.bridge_id();
        if self.bridges.contains_key(&bridge_id) {
            return Err(BridgeError::State(format!(
                "bridge {} is already registered",
                bridge_id
            )));
        }

        info!("Registered bridge {}", bridge_id);
        self.bridges.insert(bridge_id, config);
        Ok(bridge_id)
    }

    /// Look up the immutable configuration for `bridge_id`.
    pub fn get_bridge(&self, bridge_id: BridgeId) -> Result<&BridgeConfig> {
        self.bridges
            .get(&bridge_id)
            .ok_or_else(|| BridgeError::Validation(format!("unknown bridge {}", bridge_id)))
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}
