//! Value types exchanged during a configure cycle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data_type::{DataType, TypeSet};
use super::error::SyncError;
use super::status_table::DataTypeStatusTable;

/// Why a configuration was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigureReason {
    #[default]
    Unknown,
    /// The set of desired types changed (user choice or preference change).
    Reconfiguration,
    /// Types are purged and re-added because the server asked for a migration.
    Migration,
    /// First configuration of a new client (initial setup).
    NewClient,
    /// A single type was newly enabled.
    NewlyEnabledDataType,
    /// Encryption state changed.
    Crypto,
    /// Triggered internally, e.g. re-enabling a type after an error.
    Programmatic,
    /// Backup or rollback: everything goes in one band.
    BackupRollback,
}

impl fmt::Display for ConfigureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Reconfiguration => "reconfiguration",
            Self::Migration => "migration",
            Self::NewClient => "new client",
            Self::NewlyEnabledDataType => "newly enabled data type",
            Self::Crypto => "crypto",
            Self::Programmatic => "programmatic",
            Self::BackupRollback => "backup/rollback",
        };
        f.write_str(name)
    }
}

impl FromStr for ConfigureReason {
    type Err = String;

    /// Accepts `new_client`, `new-client` and the display form `new client`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' ', '/'], "_").as_str() {
            "unknown" => Ok(Self::Unknown),
            "reconfiguration" => Ok(Self::Reconfiguration),
            "migration" => Ok(Self::Migration),
            "new_client" => Ok(Self::NewClient),
            "newly_enabled_data_type" => Ok(Self::NewlyEnabledDataType),
            "crypto" => Ok(Self::Crypto),
            "programmatic" => Ok(Self::Programmatic),
            "backup_rollback" => Ok(Self::BackupRollback),
            _ => Err(format!("Unknown configure reason: {s}")),
        }
    }
}

/// Overall outcome of one configure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigureStatus {
    /// No result yet.
    #[default]
    Unknown,
    Ok,
    /// Everything configured, and no associated type had remote data before.
    OkFirstRun,
    /// Superseded by a newer request or stopped.
    Aborted,
    /// A type hit an unrecoverable error; the manager stopped.
    UnrecoverableError,
}

impl ConfigureStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Ok => "OK",
            Self::OkFirstRun => "OK_FIRST_RUN",
            Self::Aborted => "ABORTED",
            Self::UnrecoverableError => "UNRECOVERABLE_ERROR",
        }
    }

    /// `Ok` or `OkFirstRun`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::OkFirstRun)
    }
}

impl fmt::Display for ConfigureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one configure call, delivered to observers once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigureResult {
    pub status: ConfigureStatus,
    /// Types the caller asked for.
    pub requested_types: TypeSet,
    /// Snapshot of the status table when the call finished.
    pub data_type_status_table: DataTypeStatusTable,
}

impl ConfigureResult {
    #[must_use]
    pub const fn new(
        status: ConfigureStatus,
        requested_types: TypeSet,
        data_type_status_table: DataTypeStatusTable,
    ) -> Self {
        Self {
            status,
            requested_types,
            data_type_status_table,
        }
    }
}

/// Per-type state sent to the configurer with every download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigState {
    /// Being downloaded in this request.
    ConfigureActive,
    /// Enabled, but handled by another band.
    ConfigureInactive,
    /// Being purged for migration; local data should be dropped.
    ConfigureClean,
    /// Registered but not desired.
    Disabled,
    /// Failed with a data-type or unrecoverable error.
    Fatal,
    /// Waiting for a passphrase.
    Crypto,
    /// Preconditions not met.
    Unready,
}

/// Config state of every registered or requested type.
pub type ConfigStateMap = BTreeMap<DataType, ConfigState>;

/// Types in `map` whose state is `state`.
#[must_use]
pub fn types_in_state(map: &ConfigStateMap, state: ConfigState) -> TypeSet {
    map.iter()
        .filter(|(_, s)| **s == state)
        .map(|(t, _)| *t)
        .collect()
}

/// Item counts reported by one side of an association merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMergeResult {
    pub items_before: u64,
    pub items_after: u64,
    pub items_added: u64,
    pub items_deleted: u64,
    pub items_modified: u64,
}

/// Outcome reported by a controller once association finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationOutcome {
    Ok,
    /// Associated, and there was no remote data for the type yet.
    OkFirstRun,
    AssociationFailed,
    NeedsCrypto,
    UnrecoverableError,
}

impl AssociationOutcome {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::OkFirstRun)
    }
}

impl fmt::Display for AssociationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::OkFirstRun => "OK_FIRST_RUN",
            Self::AssociationFailed => "ASSOCIATION_FAILED",
            Self::NeedsCrypto => "NEEDS_CRYPTO",
            Self::UnrecoverableError => "UNRECOVERABLE_ERROR",
        };
        f.write_str(name)
    }
}

/// Everything a controller reports when `start_associating` completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationResult {
    pub outcome: AssociationOutcome,
    /// Detail for failed outcomes.
    pub error: Option<SyncError>,
    pub local_merge_result: SyncMergeResult,
    pub syncer_merge_result: SyncMergeResult,
}

impl AssociationResult {
    /// A successful association.
    #[must_use]
    pub const fn success(
        first_run: bool,
        local_merge_result: SyncMergeResult,
        syncer_merge_result: SyncMergeResult,
    ) -> Self {
        Self {
            outcome: if first_run {
                AssociationOutcome::OkFirstRun
            } else {
                AssociationOutcome::Ok
            },
            error: None,
            local_merge_result,
            syncer_merge_result,
        }
    }

    /// A failed association; the outcome follows the error's kind.
    #[must_use]
    pub fn failure(error: SyncError) -> Self {
        use super::error::ErrorKind;

        let outcome = match error.kind() {
            ErrorKind::Crypto => AssociationOutcome::NeedsCrypto,
            ErrorKind::Unrecoverable => AssociationOutcome::UnrecoverableError,
            ErrorKind::DataType | ErrorKind::Unready | ErrorKind::Persistence => {
                AssociationOutcome::AssociationFailed
            }
        };
        Self {
            outcome,
            error: Some(error),
            local_merge_result: SyncMergeResult::default(),
            syncer_merge_result: SyncMergeResult::default(),
        }
    }

    /// A bare outcome with no merge statistics.
    #[must_use]
    pub fn from_outcome(outcome: AssociationOutcome) -> Self {
        Self {
            outcome,
            error: None,
            local_merge_result: SyncMergeResult::default(),
            syncer_merge_result: SyncMergeResult::default(),
        }
    }
}

/// Which band a type was configured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandPriority {
    High,
    Regular,
}

/// Timing and merge statistics for one type in one configure call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataTypeConfigurationStats {
    pub data_type: DataType,
    pub priority: BandPriority,
    /// When the type finished associating.
    pub configured_at: DateTime<Utc>,
    /// From the configure call until this type's band download was requested.
    pub download_wait_time: Duration,
    /// From the band download request until the configurer reported ready.
    pub download_time: Duration,
    /// From association start until this type reported back.
    pub association_time: Duration,
    /// High-priority types that finished configuring before this one.
    pub high_priority_types_configured_before: TypeSet,
    /// Same-band types that finished associating before this one.
    pub same_priority_types_configured_before: TypeSet,
    pub local_merge_result: SyncMergeResult,
    pub syncer_merge_result: SyncMergeResult,
}
