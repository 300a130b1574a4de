//! Output formatting for configure results.
//!
//! Supports a colored table view and JSON.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use super::controller::ControllerState;
use super::observer::DataTypeDebugInfoListener;
use super::service::ManagerSnapshot;
use crate::domain::{
    ConfigureReason, ConfigureResult, ConfigureStatus, DataType, DataTypeConfigurationStats,
    TypeSet,
};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables.
    #[default]
    Table,
    /// JSON format for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// One download request seen by the configurer.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub reason: ConfigureReason,
    pub active: TypeSet,
}

/// Everything `syncctl simulate` prints about one configure call.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigureReport {
    pub result: ConfigureResult,
    pub snapshot: ManagerSnapshot,
    pub stats: Vec<DataTypeConfigurationStats>,
    pub downloads: Vec<DownloadRecord>,
}

/// Debug listener keeping the statistics of the latest successful call.
#[derive(Debug, Default)]
pub struct StatsCollector {
    latest: Mutex<Vec<DataTypeConfigurationStats>>,
}

impl StatsCollector {
    /// Statistics delivered since the last take.
    #[must_use]
    pub fn take(&self) -> Vec<DataTypeConfigurationStats> {
        std::mem::take(&mut *self.latest.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DataTypeDebugInfoListener for StatsCollector {
    fn on_data_type_configure_complete(&self, stats: &[DataTypeConfigurationStats]) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = stats.to_vec();
    }
}

/// Formats a report as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_report_json(report: &ConfigureReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Formats a report as a status line followed by tables.
pub fn format_report_table(report: &ConfigureReport) -> String {
    let mut out = format!(
        "{} {}  (requested: {})\n",
        "Configure result:".bold(),
        status_label(report.result.status),
        report.result.requested_types
    );
    out.push_str(&format!(
        "{} {}\n\n",
        "Manager state:".bold(),
        report.snapshot.state
    ));

    let mut types = Table::new();
    types.load_preset(UTF8_FULL);
    types.set_header(vec!["Type", "Controller", "Active", "Error"]);
    let table = &report.snapshot.status_table;
    for (data_type, state) in &report.snapshot.controllers {
        let error = table.error_for(*data_type).map_or_else(
            || "-".to_string(),
            |e| format!("{}: {}", e.kind(), e.message()),
        );
        let active = if report.snapshot.active_types.contains(*data_type) {
            "yes"
        } else {
            "no"
        };
        types.add_row(vec![
            data_type.to_string(),
            state_label(*state).to_string(),
            active.to_string(),
            error,
        ]);
    }
    out.push_str(&types.to_string());
    out.push('\n');

    if !report.stats.is_empty() {
        let mut stats = Table::new();
        stats.load_preset(UTF8_FULL);
        stats.set_header(vec![
            "Type", "Band", "Wait", "Download", "Association", "Local +", "Remote +",
        ]);
        for entry in &report.stats {
            stats.add_row(vec![
                entry.data_type.to_string(),
                format!("{:?}", entry.priority).to_lowercase(),
                format_duration(entry.download_wait_time),
                format_duration(entry.download_time),
                format_duration(entry.association_time),
                entry.local_merge_result.items_added.to_string(),
                entry.syncer_merge_result.items_added.to_string(),
            ]);
        }
        out.push('\n');
        out.push_str(&stats.to_string());
        out.push('\n');
    }

    out.push_str(&format!(
        "\n{} {}",
        "Downloads:".bold(),
        report.downloads.len().to_string().cyan()
    ));
    for (index, download) in report.downloads.iter().enumerate() {
        out.push_str(&format!(
            "\n  {index}. [{}] {}",
            download.reason, download.active
        ));
    }
    out
}

/// Lists every data type with its control/priority role.
pub fn format_types_table(priority_types: &TypeSet) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Type", "Group", "Role"]);
    for data_type in DataType::ALL {
        let role = if data_type.is_control() {
            "control".yellow()
        } else if priority_types.contains(data_type) {
            "priority".cyan()
        } else {
            "regular".normal()
        };
        table.add_row(vec![
            data_type.to_string(),
            data_type.default_group().to_string(),
            role.to_string(),
        ]);
    }
    table.to_string()
}

fn status_label(status: ConfigureStatus) -> ColoredString {
    match status {
        ConfigureStatus::Ok | ConfigureStatus::OkFirstRun => status.as_str().green(),
        ConfigureStatus::Aborted => status.as_str().yellow(),
        ConfigureStatus::UnrecoverableError => status.as_str().red().bold(),
        ConfigureStatus::Unknown => status.as_str().normal(),
    }
}

fn state_label(state: ControllerState) -> ColoredString {
    let name = state.to_string();
    match state {
        ControllerState::Running => name.green(),
        ControllerState::Disabled => name.red(),
        ControllerState::NotRunning => name.dimmed(),
        _ => name.yellow(),
    }
}

/// Millisecond rendering of a duration.
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis >= 1000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{millis}ms")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::application::manager::ManagerState;
    use crate::domain::{DataTypeStatusTable, SyncError};

    fn report() -> ConfigureReport {
        let mut status_table = DataTypeStatusTable::new();
        status_table.record(&SyncError::datatype("boom", DataType::Bookmarks));
        let mut controllers = BTreeMap::new();
        controllers.insert(DataType::Bookmarks, ControllerState::NotRunning);
        controllers.insert(DataType::Preferences, ControllerState::Running);

        ConfigureReport {
            result: ConfigureResult::new(
                ConfigureStatus::Ok,
                TypeSet::of(&[DataType::Bookmarks, DataType::Preferences]),
                status_table.clone(),
            ),
            snapshot: ManagerSnapshot {
                state: ManagerState::Configured,
                last_requested_types: TypeSet::of(&[DataType::Bookmarks, DataType::Preferences]),
                active_types: TypeSet::of(&[DataType::Preferences]),
                controllers,
                status_table,
            },
            stats: Vec::new(),
            downloads: vec![DownloadRecord {
                reason: ConfigureReason::NewClient,
                active: TypeSet::of(&[DataType::Nigori]),
            }],
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_table_lists_controllers_and_errors() {
        colored::control::set_override(false);
        let out = format_report_table(&report());
        assert!(out.contains("OK"));
        assert!(out.contains("BOOKMARKS"));
        assert!(out.contains("boom"));
        assert!(out.contains("RUNNING"));
    }

    #[test]
    fn test_json_report() {
        let json = format_report_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["result"]["status"], "OK");
        assert_eq!(value["snapshot"]["state"], "CONFIGURED");
        assert_eq!(value["snapshot"]["controllers"]["PREFERENCES"], "RUNNING");
    }
}
