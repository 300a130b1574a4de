//! syncctl - drive the data type configuration manager from the command line.
//!
//! Runs configure calls against a simulated sync engine whose per-type
//! outcomes come from the configuration file:
//!   syncctl simulate                             # bookmarks, preferences, passwords
//!   syncctl simulate -t bookmarks -p preferences # custom desired and priority types
//!   syncctl simulate --reenable bookmarks        # configure, then re-enable a type
//!   syncctl types                                # list data types and roles
//!   syncctl config init                          # write the default config file

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sync_configurator::application::{
    format_report_json, format_report_table, format_types_table, ConfigureReport, DataTypeManager,
    DownloadRecord, ManagerHandle, ManagerService, OutputFormat, StatsCollector,
};
use sync_configurator::cli::{
    parse_format, parse_reason, parse_type, parse_types, Cli, Commands, ConfigAction,
};
use sync_configurator::domain::{AppConfig, AppError, ConfigureResult};
use sync_configurator::infrastructure::{
    config_file_path, ensure_config_exists, load_config, render_config, simulated_registry,
    SimulatedConfigurer, SimulatedConfigurerLog, StaticEncryptionHandler,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            types,
            priority,
            reason,
            reenable,
            format,
        } => {
            let request = SimulateRequest {
                types,
                priority,
                reason,
                reenable,
                format,
            };
            cmd_simulate(&config, request).await?;
        }
        Commands::Types => {
            println!("{}", format_types_table(&config.manager.priority_type_set()));
        }
        Commands::Config { action } => {
            cmd_config(&config, cli.config.as_deref(), &action)?;
        }
    }

    Ok(())
}

/// Raw `simulate` arguments.
struct SimulateRequest {
    types: Vec<String>,
    priority: Vec<String>,
    reason: String,
    reenable: Option<String>,
    format: String,
}

/// Configure the desired types, optionally re-enable one, and print a report
/// per configure call.
async fn cmd_simulate(config: &AppConfig, request: SimulateRequest) -> anyhow::Result<()> {
    let desired = parse_types(&request.types).map_err(anyhow::Error::msg)?;
    let reason = parse_reason(&request.reason).map_err(anyhow::Error::msg)?;
    let format = parse_format(&request.format).map_err(anyhow::Error::msg)?;
    let reenable = request
        .reenable
        .as_deref()
        .map(parse_type)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let mut registered = desired.clone();
    if let Some(data_type) = reenable {
        registered.insert(data_type);
    }

    let simulation = &config.simulation;
    let configurer = SimulatedConfigurer::new(simulation);
    let downloads = configurer.log_handle();
    let stats = Arc::new(StatsCollector::default());

    let mut manager = DataTypeManager::new(
        &config.manager,
        simulated_registry(simulation, &registered).build(),
        Box::new(configurer),
        Arc::new(StaticEncryptionHandler::new(simulation)),
    );
    if !request.priority.is_empty() {
        manager.set_priority_types(parse_types(&request.priority).map_err(anyhow::Error::msg)?);
    }
    manager.set_debug_listener(stats.clone());

    let (service, handle) = ManagerService::new(manager);
    let service = tokio::spawn(service.run());

    let mut session = ReportSession {
        handle: &handle,
        stats: &stats,
        downloads: &downloads,
        seen: 0,
    };
    let mut reports = Vec::new();

    tracing::info!(types = %desired, %reason, "Starting configure");
    let result = handle.configure_and_wait(desired, reason).await?;
    reports.push(session.report(result).await?);

    if let Some(data_type) = reenable {
        match handle.reenable_type_and_wait(data_type).await? {
            Some(result) => reports.push(session.report(result).await?),
            None => println!(
                "{} {} is already enabled",
                "Note:".yellow(),
                data_type.to_string().cyan()
            ),
        }
    }

    handle.shutdown().await?;
    service.await.context("Manager service task failed")?;

    for (index, report) in reports.iter().enumerate() {
        match format {
            OutputFormat::Json => {
                println!("{}", format_report_json(report).map_err(AppError::json)?);
            }
            OutputFormat::Table => {
                if index > 0 {
                    println!();
                }
                println!("{}", format_report_table(report));
            }
        }
    }

    Ok(())
}

/// Collects what each configure call left behind.
struct ReportSession<'a> {
    handle: &'a ManagerHandle,
    stats: &'a StatsCollector,
    downloads: &'a SimulatedConfigurerLog,
    seen: usize,
}

impl ReportSession<'_> {
    async fn report(&mut self, result: ConfigureResult) -> anyhow::Result<ConfigureReport> {
        let snapshot = self.handle.snapshot().await?;
        let requests = self.downloads.requests();
        let downloads = requests
            .iter()
            .skip(self.seen)
            .map(|(reason, active)| DownloadRecord {
                reason: *reason,
                active: active.clone(),
            })
            .collect();
        self.seen = requests.len();

        Ok(ConfigureReport {
            result,
            snapshot,
            stats: self.stats.take(),
            downloads,
        })
    }
}

fn cmd_config(
    config: &AppConfig,
    explicit: Option<&Path>,
    action: &ConfigAction,
) -> anyhow::Result<()> {
    let path = explicit.map_or_else(config_file_path, Path::to_path_buf);

    match action {
        ConfigAction::Init => {
            if ensure_config_exists(&path)? {
                println!("{} {}", "Created".green(), path.display());
            } else {
                println!("{} {}", "Already exists:".yellow(), path.display());
            }
        }
        ConfigAction::Show => {
            print!("{}", render_config(config)?);
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }

    Ok(())
}

/// Setup logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
