//! Sync configuration.
//!
//! Loaded once at startup from a YAML file and handed to the coordinator.
//! Every field has a default so a minimal config is just a list of pairs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reelsync_core::{Feature, PairId, ProviderName};
use reelsync_store::TtlPolicy;

use crate::error::{io_err, EngineError};

/// Direction of a configured pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    #[default]
    #[serde(rename = "one-way")]
    OneWay,
    #[serde(rename = "two-way")]
    TwoWay,
}

/// Per-feature switches on a pair. `remove` gates deletion propagation;
/// additions alone are always safe to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub remove: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable: true,
            remove: false,
        }
    }
}

/// One configured provider pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairConfig {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub features: std::collections::BTreeMap<Feature, FeatureFlags>,
}

impl PairConfig {
    pub fn source_name(&self) -> ProviderName {
        ProviderName::new(&self.source)
    }

    pub fn target_name(&self) -> ProviderName {
        ProviderName::new(&self.target)
    }

    pub fn pair_id(&self) -> PairId {
        PairId::of(&self.source_name(), &self.target_name())
    }

    /// Enabled (feature, flags) units in stable feature order.
    pub fn enabled_features(&self) -> Vec<(Feature, FeatureFlags)> {
        Feature::ALL
            .into_iter()
            .filter_map(|f| {
                let flags = self.features.get(&f).copied()?;
                flags.enable.then_some((f, flags))
            })
            .collect()
    }
}

/// Root configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    /// Tombstone TTL overrides; anything unset falls to the hard defaults.
    #[serde(default)]
    pub tombstones: TtlPolicy,
    #[serde(default = "default_true")]
    pub enrichment: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            tombstones: TtlPolicy::default(),
            enrichment: true,
        }
    }
}

impl SyncConfig {
    /// Load from an explicit YAML path (tests point this at a `TempDir`).
    pub fn load_at(path: &Path) -> Result<SyncConfig, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| EngineError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_true() -> bool {
    true
}
