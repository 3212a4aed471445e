//! Layer-wide configuration.

use crate::cache::CacheConfig;
use crate::confirm::GateConfig;
use crate::container::ContainerConfig;
use crate::optimistic::OptimisticConfig;
use serde::{Deserialize, Serialize};

/// Configuration of every sync-layer component, as one document.
///
/// Missing sections and fields take their defaults, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncLayerConfig {
    /// Defaults for entity containers.
    pub container: ContainerConfig,
    pub optimistic: OptimisticConfig,
    pub cache: CacheConfig,
    pub gate: GateConfig,
}

impl SyncLayerConfig {
    /// Loads configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
