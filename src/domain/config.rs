//! Configuration models.
//!
//! Contains the tunables of the data type manager and the behaviour of the
//! simulated collaborators driven by `syncctl simulate`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::data_type::{DataType, TypeSet};
use super::error::ErrorKind;

/// Configuration for the data type manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Seconds a band may spend associating before stragglers are failed.
    #[serde(default = "default_association_timeout")]
    pub association_timeout_secs: u64,

    /// Types configured in the first band together with the control types.
    #[serde(default = "default_priority_types")]
    pub priority_types: Vec<DataType>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            association_timeout_secs: default_association_timeout(),
            priority_types: default_priority_types(),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub const fn association_timeout(&self) -> Duration {
        Duration::from_secs(self.association_timeout_secs)
    }

    #[must_use]
    pub fn priority_type_set(&self) -> TypeSet {
        self.priority_types.iter().copied().collect()
    }
}

const fn default_association_timeout() -> u64 {
    600 // 10 minutes
}

fn default_priority_types() -> Vec<DataType> {
    vec![DataType::PriorityPreferences]
}

/// How a simulated type behaves when associated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedAssociation {
    #[default]
    Ok,
    FirstRun,
    Fail,
    NeedsCrypto,
    Unrecoverable,
    /// Never reports back; only the association timeout ends it.
    Hang,
}

/// Behaviour of one simulated data type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedTypeConfig {
    pub data_type: DataType,

    #[serde(default = "default_load_latency")]
    pub load_latency_ms: u64,

    #[serde(default = "default_association_latency")]
    pub association_latency_ms: u64,

    #[serde(default = "default_ready")]
    pub ready_for_start: bool,

    /// Kind of error the model load fails with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<ErrorKind>,

    #[serde(default)]
    pub association: SimulatedAssociation,

    #[serde(default)]
    pub local_items: u64,

    #[serde(default)]
    pub remote_items: u64,
}

impl SimulatedTypeConfig {
    /// Well-behaved defaults for `data_type`.
    #[must_use]
    pub const fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            load_latency_ms: default_load_latency(),
            association_latency_ms: default_association_latency(),
            ready_for_start: default_ready(),
            load_error: None,
            association: SimulatedAssociation::Ok,
            local_items: 0,
            remote_items: 0,
        }
    }
}

const fn default_load_latency() -> u64 {
    10
}

const fn default_association_latency() -> u64 {
    20
}

const fn default_ready() -> bool {
    true
}

/// Behaviour of the simulated sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay before the configurer reports a band as downloaded.
    #[serde(default = "default_download_latency")]
    pub download_latency_ms: u64,

    /// Types whose download always fails.
    #[serde(default)]
    pub download_failures: Vec<DataType>,

    #[serde(default)]
    pub passphrase_required: bool,

    #[serde(default)]
    pub encrypted_types: Vec<DataType>,

    /// Per-type overrides; unlisted types behave like [`SimulatedTypeConfig::new`].
    #[serde(default)]
    pub types: Vec<SimulatedTypeConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            download_latency_ms: default_download_latency(),
            download_failures: Vec::new(),
            passphrase_required: false,
            encrypted_types: vec![DataType::Passwords],
            types: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Behaviour configured for `data_type`, falling back to defaults.
    #[must_use]
    pub fn type_config(&self, data_type: DataType) -> SimulatedTypeConfig {
        self.types
            .iter()
            .find(|t| t.data_type == data_type)
            .cloned()
            .unwrap_or_else(|| SimulatedTypeConfig::new(data_type))
    }
}

const fn default_download_latency() -> u64 {
    50
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sync-configurator")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.manager.association_timeout_secs, 600);
        assert_eq!(
            config.manager.priority_type_set(),
            TypeSet::of(&[DataType::PriorityPreferences])
        );
        assert_eq!(config.simulation.download_latency_ms, 50);
    }

    #[test]
    fn test_type_config_fallback() {
        let mut simulation = SimulationConfig::default();
        simulation.types.push(SimulatedTypeConfig {
            association: SimulatedAssociation::Fail,
            ..SimulatedTypeConfig::new(DataType::Bookmarks)
        });

        assert_eq!(
            simulation.type_config(DataType::Bookmarks).association,
            SimulatedAssociation::Fail
        );
        let prefs = simulation.type_config(DataType::Preferences);
        assert_eq!(prefs.association, SimulatedAssociation::Ok);
        assert!(prefs.ready_for_start);
    }

    #[test]
    fn test_parse_type_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            [manager]
            association_timeout_secs = 5
            priority_types = ["PREFERENCES"]

            [[simulation.types]]
            data_type = "BOOKMARKS"
            association = "hang"
            load_error = "DATA_TYPE"
            "#,
        )
        .unwrap();

        assert_eq!(config.manager.association_timeout(), Duration::from_secs(5));
        let bookmarks = config.simulation.type_config(DataType::Bookmarks);
        assert_eq!(bookmarks.association, SimulatedAssociation::Hang);
        assert_eq!(bookmarks.load_error, Some(ErrorKind::DataType));
        assert_eq!(bookmarks.load_latency_ms, 10);
    }
}
