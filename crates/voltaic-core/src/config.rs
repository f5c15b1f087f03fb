//! Runtime configuration for networks and storage tiers.
//!
//! Configuration is plain data owned by whoever builds the registry. It can
//! be loaded from RON, TOML, or JSON; the format is picked from the file
//! extension.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::fixed::Energy;
use crate::node::StorageTier;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file has an extension we don't support.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A deserialization error occurred.
    #[error("parse error in {source_name}: {detail}")]
    Parse { source_name: String, detail: String },

    /// The values parsed but violate a constraint.
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported configuration formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Ron,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect the format of a file based on its extension.
    pub fn detect(path: &Path) -> Result<ConfigFormat, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ron") => Ok(ConfigFormat::Ron),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: ConfigFormat,
    source_name: &str,
) -> Result<T, ConfigError> {
    let parse_err = |detail: String| ConfigError::Parse {
        source_name: source_name.to_string(),
        detail,
    };
    match format {
        ConfigFormat::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

// ===========================================================================
// Settings
// ===========================================================================

/// Settings that apply to every network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Transfer-rate cap given to freshly created networks.
    pub default_transfer_rate_cap: Energy,
    /// Default per-tick rate for machine nodes.
    pub machine_transfer_rate: Energy,
    /// Default per-tick rate for cable nodes.
    pub cable_transfer_rate: Energy,
    /// When set, removals inside inactive networks postpone the split until
    /// the network is active again.
    pub defer_inactive_splits: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            default_transfer_rate_cap: 1000,
            machine_transfer_rate: 100,
            cable_transfer_rate: 200,
            defer_inactive_splits: true,
        }
    }
}

/// Capacity and rate for one storage tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub capacity: Energy,
    pub transfer_rate: Energy,
}

/// Per-tier storage presets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub basic: TierSpec,
    pub advanced: TierSpec,
    pub elite: TierSpec,
    pub ultimate: TierSpec,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            basic: TierSpec {
                capacity: 10_000,
                transfer_rate: 100,
            },
            advanced: TierSpec {
                capacity: 50_000,
                transfer_rate: 500,
            },
            elite: TierSpec {
                capacity: 250_000,
                transfer_rate: 2_500,
            },
            ultimate: TierSpec {
                capacity: 1_000_000,
                transfer_rate: 10_000,
            },
        }
    }
}

impl StorageSettings {
    pub fn tier(&self, tier: StorageTier) -> TierSpec {
        match tier {
            StorageTier::Basic => self.basic,
            StorageTier::Advanced => self.advanced,
            StorageTier::Elite => self.elite,
            StorageTier::Ultimate => self.ultimate,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub network: NetworkSettings,
    pub storage: StorageSettings,
}

impl EnergyConfig {
    /// Read and validate a config file. Format comes from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::detect(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: EnergyConfig = deserialize_str(&content, format, &path.display().to_string())?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded energy config");
        Ok(config)
    }

    /// Parse and validate a config from a string.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let config: EnergyConfig = deserialize_str(content, format, "<string>")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every network inert.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.default_transfer_rate_cap == 0 {
            return Err(ConfigError::Invalid(
                "network.default_transfer_rate_cap must be positive".into(),
            ));
        }
        for tier in StorageTier::all() {
            let spec = self.storage.tier(tier);
            if spec.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "storage tier {tier:?} has zero capacity"
                )));
            }
            if spec.transfer_rate == 0 {
                return Err(ConfigError::Invalid(format!(
                    "storage tier {tier:?} has zero transfer rate"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_presets() {
        let config = EnergyConfig::default();
        assert_eq!(config.network.default_transfer_rate_cap, 1000);
        assert_eq!(config.network.machine_transfer_rate, 100);
        assert_eq!(config.network.cable_transfer_rate, 200);
        assert!(config.network.defer_inactive_splits);
        assert_eq!(config.storage.tier(StorageTier::Basic).capacity, 10_000);
        assert_eq!(config.storage.tier(StorageTier::Ultimate).transfer_rate, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(ConfigFormat::detect(Path::new("a.ron")).unwrap(), ConfigFormat::Ron);
        assert_eq!(ConfigFormat::detect(Path::new("a.toml")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::detect(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(matches!(
            ConfigFormat::detect(Path::new("a.yaml")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn parse_partial_toml_keeps_defaults() {
        let toml = r#"
            [network]
            default_transfer_rate_cap = 250
            defer_inactive_splits = false
        "#;
        let config = EnergyConfig::parse(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.network.default_transfer_rate_cap, 250);
        assert!(!config.network.defer_inactive_splits);
        assert_eq!(config.network.cable_transfer_rate, 200);
        assert_eq!(config.storage, StorageSettings::default());
    }

    #[test]
    fn parse_ron() {
        let ron = "(network: (default_transfer_rate_cap: 64), storage: (basic: (capacity: 5, transfer_rate: 1)))";
        let config = EnergyConfig::parse(ron, ConfigFormat::Ron).unwrap();
        assert_eq!(config.network.default_transfer_rate_cap, 64);
        assert_eq!(config.storage.basic, TierSpec { capacity: 5, transfer_rate: 1 });
        assert_eq!(config.storage.elite, StorageSettings::default().elite);
    }

    #[test]
    fn parse_json() {
        let json = r#"{ "network": { "machine_transfer_rate": 42 } }"#;
        let config = EnergyConfig::parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.network.machine_transfer_rate, 42);
    }

    #[test]
    fn zero_cap_is_invalid() {
        let json = r#"{ "network": { "default_transfer_rate_cap": 0 } }"#;
        assert!(matches!(
            EnergyConfig::parse(json, ConfigFormat::Json),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_input_is_parse_error() {
        assert!(matches!(
            EnergyConfig::parse("{ not json", ConfigFormat::Json),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join(format!("voltaic-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("energy.toml");
        std::fs::write(&path, "[network]\ncable_transfer_rate = 999\n").unwrap();

        let config = EnergyConfig::load(&path).unwrap();
        assert_eq!(config.network.cable_transfer_rate, 999);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("voltaic-does-not-exist.ron");
        assert!(matches!(EnergyConfig::load(&path), Err(ConfigError::Io(_))));
    }
}
