//! In-process stand-ins for the sync engine, used by `syncctl simulate`.
//!
//! The configurer "downloads" after a fixed latency, the models load and
//! associate after their configured latencies, and every outcome is taken
//! from [`SimulationConfig`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::application::{
    ControllerRegistry, DataTypeConfigurer, DataTypeController, DataTypeEncryptionHandler,
    DataTypeModel, DownloadReadyCallback, DownloadRetryCallback, ModelAssociation,
    TypeController,
};
use crate::domain::{
    types_in_state, ConfigState, ConfigStateMap, ConfigureReason, DataType, ModelSafeGroup,
    SimulatedAssociation, SimulatedTypeConfig, SimulationConfig, SyncError, SyncMergeResult,
    TypeSet,
};

/// Model whose behaviour is scripted by a [`SimulatedTypeConfig`].
#[derive(Debug, Clone)]
pub struct SimulatedModel {
    config: SimulatedTypeConfig,
}

impl SimulatedModel {
    #[must_use]
    pub const fn new(config: SimulatedTypeConfig) -> Self {
        Self { config }
    }
}

impl DataTypeModel for SimulatedModel {
    fn ready_for_start(&self) -> bool {
        self.config.ready_for_start
    }

    fn load_model(&self) -> impl Future<Output = Result<(), SyncError>> + Send {
        let latency = Duration::from_millis(self.config.load_latency_ms);
        let error = self.config.load_error.map(|kind| {
            SyncError::new(kind, "Simulated model load failure", self.config.data_type)
        });
        async move {
            tokio::time::sleep(latency).await;
            error.map_or(Ok(()), Err)
        }
    }

    fn associate(&self) -> impl Future<Output = Result<ModelAssociation, SyncError>> + Send {
        let config = self.config.clone();
        async move {
            if config.association == SimulatedAssociation::Hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_millis(config.association_latency_ms)).await;

            let data_type = config.data_type;
            match config.association {
                SimulatedAssociation::Ok | SimulatedAssociation::Hang => {
                    Ok(merged(&config, false))
                }
                SimulatedAssociation::FirstRun => Ok(merged(&config, true)),
                SimulatedAssociation::Fail => {
                    Err(SyncError::datatype("Simulated association failure", data_type))
                }
                SimulatedAssociation::NeedsCrypto => {
                    Err(SyncError::crypto("Cryptographer not ready", data_type))
                }
                SimulatedAssociation::Unrecoverable => Err(SyncError::unrecoverable(
                    "Simulated unrecoverable failure",
                    data_type,
                )),
            }
        }
    }

    fn stop(&self) {
        tracing::debug!(data_type = %self.config.data_type, "Simulated model released");
    }
}

/// Merge counts of an association where both sides end up with the union.
fn merged(config: &SimulatedTypeConfig, first_run: bool) -> ModelAssociation {
    let remote = if first_run { 0 } else { config.remote_items };
    let total = config.local_items.max(remote);
    ModelAssociation {
        first_run,
        local_merge_result: SyncMergeResult {
            items_before: config.local_items,
            items_after: total,
            items_added: total - config.local_items,
            ..SyncMergeResult::default()
        },
        syncer_merge_result: SyncMergeResult {
            items_before: remote,
            items_after: total,
            items_added: total - remote,
            ..SyncMergeResult::default()
        },
    }
}

/// Registry with one simulated controller per type in `types`.
#[must_use]
pub fn simulated_registry(simulation: &SimulationConfig, types: &TypeSet) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    for data_type in types.user_types().iter() {
        let config = simulation.type_config(data_type);
        registry.register(data_type, move |data_type| -> Box<dyn DataTypeController> {
            Box::new(TypeController::new(
                data_type,
                SimulatedModel::new(config.clone()),
            ))
        });
    }
    registry
}

#[derive(Debug, Default)]
struct ConfigurerLog {
    requests: Vec<(ConfigureReason, TypeSet)>,
    active: BTreeMap<DataType, ModelSafeGroup>,
}

/// Configurer that completes every download after a fixed latency.
#[derive(Debug)]
pub struct SimulatedConfigurer {
    latency: Duration,
    failures: TypeSet,
    log: Arc<Mutex<ConfigurerLog>>,
}

impl SimulatedConfigurer {
    #[must_use]
    pub fn new(simulation: &SimulationConfig) -> Self {
        Self {
            latency: Duration::from_millis(simulation.download_latency_ms),
            failures: simulation.download_failures.iter().copied().collect(),
            log: Arc::default(),
        }
    }

    /// Shared view of the download log, usable after the configurer moved
    /// into a manager.
    #[must_use]
    pub fn log_handle(&self) -> SimulatedConfigurerLog {
        SimulatedConfigurerLog {
            log: Arc::clone(&self.log),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConfigurerLog> {
        lock_log(&self.log)
    }
}

fn lock_log(log: &Mutex<ConfigurerLog>) -> MutexGuard<'_, ConfigurerLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read side of a [`SimulatedConfigurer`]'s download log.
#[derive(Debug, Clone)]
pub struct SimulatedConfigurerLog {
    log: Arc<Mutex<ConfigurerLog>>,
}

impl SimulatedConfigurerLog {
    /// Download requests so far, as the `ConfigureActive` set of each.
    #[must_use]
    pub fn requests(&self) -> Vec<(ConfigureReason, TypeSet)> {
        lock_log(&self.log).requests.clone()
    }

    /// Types currently activated.
    #[must_use]
    pub fn active_types(&self) -> TypeSet {
        lock_log(&self.log).active.keys().copied().collect()
    }
}

impl DataTypeConfigurer for SimulatedConfigurer {
    fn configure_data_types(
        &mut self,
        reason: ConfigureReason,
        states: &ConfigStateMap,
        ready: DownloadReadyCallback,
        retry: DownloadRetryCallback,
    ) -> TypeSet {
        let active = types_in_state(states, ConfigState::ConfigureActive);
        let purged = types_in_state(states, ConfigState::ConfigureClean);
        tracing::debug!(%reason, active = %active, purged = %purged, "Simulated download requested");
        self.lock().requests.push((reason, active.clone()));

        let failed = active.intersection(&self.failures);
        let downloaded = active.difference(&failed);
        let latency = self.latency;
        tokio::spawn(async move {
            if !failed.is_empty() {
                retry.run();
            }
            tokio::time::sleep(latency).await;
            ready.run(downloaded, failed);
        });
        TypeSet::new()
    }

    fn activate_data_type(&mut self, data_type: DataType, group: ModelSafeGroup) {
        tracing::debug!(data_type = %data_type, %group, "Simulated activation");
        self.lock().active.insert(data_type, group);
    }

    fn deactivate_data_type(&mut self, data_type: DataType) {
        tracing::debug!(data_type = %data_type, "Simulated deactivation");
        self.lock().active.remove(&data_type);
    }
}

/// Encryption handler with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticEncryptionHandler {
    passphrase_required: bool,
    encrypted: TypeSet,
}

impl StaticEncryptionHandler {
    #[must_use]
    pub fn new(simulation: &SimulationConfig) -> Self {
        Self {
            passphrase_required: simulation.passphrase_required,
            encrypted: simulation.encrypted_types.iter().copied().collect(),
        }
    }
}

impl DataTypeEncryptionHandler for StaticEncryptionHandler {
    fn is_passphrase_required(&self) -> bool {
        self.passphrase_required
    }

    fn encrypted_data_types(&self) -> TypeSet {
        self.encrypted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ControllerState;
    use crate::domain::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_model_outcomes() {
        let config = SimulatedTypeConfig {
            local_items: 3,
            remote_items: 5,
            ..SimulatedTypeConfig::new(DataType::Bookmarks)
        };
        let association = SimulatedModel::new(config.clone()).associate().await.unwrap();
        assert!(!association.first_run);
        assert_eq!(association.local_merge_result.items_added, 2);
        assert_eq!(association.syncer_merge_result.items_after, 5);

        let failing = SimulatedModel::new(SimulatedTypeConfig {
            association: SimulatedAssociation::NeedsCrypto,
            load_error: Some(ErrorKind::Persistence),
            ..config
        });
        assert_eq!(
            failing.load_model().await.unwrap_err().kind(),
            ErrorKind::Persistence
        );
        assert_eq!(failing.associate().await.unwrap_err().kind(), ErrorKind::Crypto);
    }

    #[test]
    fn test_registry_skips_control_types() {
        let types = TypeSet::of(&[DataType::Bookmarks, DataType::Nigori]);
        let registry = simulated_registry(&SimulationConfig::default(), &types);
        assert_eq!(registry.registered_types(), TypeSet::of(&[DataType::Bookmarks]));

        let controllers = registry.build();
        assert_eq!(
            controllers[&DataType::Bookmarks].state(),
            ControllerState::NotRunning
        );
    }

    #[test]
    fn test_encryption_handler_reads_simulation() {
        let simulation = SimulationConfig {
            passphrase_required: true,
            ..SimulationConfig::default()
        };
        let handler = StaticEncryptionHandler::new(&simulation);
        assert!(handler.is_passphrase_required());
        assert_eq!(
            handler.encrypted_data_types(),
            TypeSet::of(&[DataType::Passwords])
        );
    }
}
