//! The data type manager: brings the desired set of data types up in
//! priority bands and reports one result per configure call.
//!
//! All state lives on the task that owns the manager. Collaborators report
//! back through [`ManagerEvent`]s, which are applied by [`DataTypeManager::process_event`]
//! (or [`DataTypeManager::pump`] for everything already queued). Each
//! configure pass runs under a fresh [`Epoch`]; events of older passes are
//! dropped on arrival.
//!
//! A pass walks its bands strictly in order: request the band's download,
//! wait for the ready callback, associate the band, then move on. Types that
//! fail along the way are recorded in the status table and, once every band
//! has resolved, the pass is restarted without them. Only the last pass of a
//! call is reported to observers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;

use super::association::{AssociationProgress, BandContext, BandResult, ModelAssociationManager};
use super::configurer::{DataTypeConfigurer, DataTypeEncryptionHandler};
use super::controller::{ControllerMap, ControllerState};
use super::events::{
    DownloadReadyCallback, DownloadRetryCallback, Epoch, EventReceiver, EventSender, ManagerEvent,
};
use super::observer::{DataTypeDebugInfoListener, DataTypeManagerObserver, ObserverList};
use crate::domain::{
    control_types, BandPriority, ConfigState, ConfigStateMap, ConfigureReason, ConfigureResult,
    ConfigureStatus, DataType, DataTypeConfigurationStats, DataTypeStatusTable, ErrorKind,
    ManagerConfig, SyncError, TypeSet,
};

/// Externally visible state of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManagerState {
    Stopped,
    /// Waiting for the configurer to download the current band.
    DownloadPending,
    /// Associating the current band.
    Configuring,
    Configured,
}

impl ManagerState {
    /// A configure call is in flight.
    #[must_use]
    pub const fn is_configuring(self) -> bool {
        matches!(self, Self::DownloadPending | Self::Configuring)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "STOPPED",
            Self::DownloadPending => "DOWNLOAD_PENDING",
            Self::Configuring => "CONFIGURING",
            Self::Configured => "CONFIGURED",
        };
        f.write_str(name)
    }
}

/// The observer-visible configure call.
#[derive(Debug)]
struct PendingConfigure {
    requested: TypeSet,
    started_at: Instant,
    associated: TypeSet,
    first_run: TypeSet,
    high_priority_configured: TypeSet,
    stats: Vec<DataTypeConfigurationStats>,
}

impl PendingConfigure {
    fn new(requested: TypeSet) -> Self {
        Self {
            requested,
            started_at: Instant::now(),
            associated: TypeSet::new(),
            first_run: TypeSet::new(),
            high_priority_configured: TypeSet::new(),
            stats: Vec::new(),
        }
    }

    fn status(&self) -> ConfigureStatus {
        if !self.associated.is_empty() && self.first_run == self.associated {
            ConfigureStatus::OkFirstRun
        } else {
            ConfigureStatus::Ok
        }
    }
}

/// One pass over the bands. A call may restart several passes.
#[derive(Debug)]
struct ConfigurePass {
    reason: ConfigureReason,
    enabled: TypeSet,
    purge: TypeSet,
    bands: Vec<TypeSet>,
    band: usize,
    band_requested_at: Instant,
    needs_reconfigure: bool,
}

impl ConfigurePass {
    fn drop_types(&mut self, types: &TypeSet) {
        self.enabled.remove_all(types);
        for band in &mut self.bands {
            band.remove_all(types);
        }
    }
}

/// Orchestrates configuration of every registered data type.
pub struct DataTypeManager {
    configurer: Box<dyn DataTypeConfigurer>,
    encryption: Arc<dyn DataTypeEncryptionHandler>,
    association: ModelAssociationManager,
    observers: ObserverList,
    debug_listener: Option<Arc<dyn DataTypeDebugInfoListener>>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    priority_types: TypeSet,
    state: ManagerState,
    epoch: Epoch,
    status_table: DataTypeStatusTable,
    last_requested_types: TypeSet,
    active_types: TypeSet,
    pending: Option<PendingConfigure>,
    pass: Option<ConfigurePass>,
}

impl DataTypeManager {
    /// Create a stopped manager owning `controllers`.
    ///
    /// Controllers registered for control types are dropped: those types are
    /// download-only.
    #[must_use]
    pub fn new(
        config: &ManagerConfig,
        mut controllers: ControllerMap,
        configurer: Box<dyn DataTypeConfigurer>,
        encryption: Arc<dyn DataTypeEncryptionHandler>,
    ) -> Self {
        controllers.retain(|data_type, _| {
            if data_type.is_control() {
                tracing::warn!(data_type = %data_type, "Dropping controller for control type");
            }
            !data_type.is_control()
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let association = ModelAssociationManager::new(
            controllers,
            events_tx.clone(),
            config.association_timeout(),
        );

        Self {
            configurer,
            encryption,
            association,
            observers: ObserverList::new(),
            debug_listener: None,
            events_tx,
            events_rx,
            priority_types: config.priority_type_set(),
            state: ManagerState::Stopped,
            epoch: Epoch::default(),
            status_table: DataTypeStatusTable::new(),
            last_requested_types: TypeSet::new(),
            active_types: TypeSet::new(),
            pending: None,
            pass: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ManagerState {
        self.state
    }

    #[must_use]
    pub const fn status_table(&self) -> &DataTypeStatusTable {
        &self.status_table
    }

    /// Desired types of the most recent call, control types included.
    #[must_use]
    pub const fn last_requested_types(&self) -> &TypeSet {
        &self.last_requested_types
    }

    /// Types currently activated with the configurer.
    #[must_use]
    pub const fn active_types(&self) -> &TypeSet {
        &self.active_types
    }

    #[must_use]
    pub fn registered_types(&self) -> TypeSet {
        self.association.registered_types()
    }

    #[must_use]
    pub fn controller_state(&self, data_type: DataType) -> Option<ControllerState> {
        self.association.controller_state(data_type)
    }

    #[must_use]
    pub fn controller_states(&self) -> BTreeMap<DataType, ControllerState> {
        self.association.controller_states()
    }

    pub fn add_observer(&self, observer: Arc<dyn DataTypeManagerObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn DataTypeManagerObserver>) -> bool {
        self.observers.remove(observer)
    }

    /// Shared handle on the observer list.
    #[must_use]
    pub fn observers(&self) -> ObserverList {
        self.observers.clone()
    }

    pub fn set_debug_listener(&mut self, listener: Arc<dyn DataTypeDebugInfoListener>) {
        self.debug_listener = Some(listener);
    }

    /// Types configured in the first band, besides the control types.
    pub fn set_priority_types(&mut self, types: TypeSet) {
        self.priority_types = types;
    }

    /// Converge the running set to `desired` plus the control types.
    ///
    /// Supersedes a call already in flight, which then finishes `Aborted`.
    /// Returns immediately; progress is made as events are processed.
    pub fn configure(&mut self, desired: TypeSet, reason: ConfigureReason) {
        let mut desired = desired;
        desired.put_all(&control_types());
        self.configure_impl(desired, reason, TypeSet::new());
    }

    /// Configure without `types`, asking the configurer to drop their data.
    ///
    /// Persistence errors of `types` are cleared. Control types listed in
    /// `types` are left out as well.
    pub fn purge_for_migration(&mut self, types: &TypeSet, reason: ConfigureReason) {
        self.status_table.reset_persistence_errors_from(types);
        let desired = self.last_requested_types.difference(types);
        self.configure_impl(desired, reason, types.clone());
    }

    /// Clear the data-type and unready errors of `data_type` and configure
    /// with it added back. A no-op if the type is already enabled.
    pub fn reenable_type(&mut self, data_type: DataType) {
        let enabled = self.last_requested_types.contains(data_type)
            && !self.status_table.failed_types().contains(data_type);
        if enabled {
            tracing::debug!(data_type = %data_type, "Type already enabled");
            return;
        }

        let cleared = self.status_table.reset_data_type_error_for(data_type)
            | self.status_table.reset_unready_error_for(data_type);
        tracing::info!(data_type = %data_type, cleared, "Re-enabling type");
        if self.state == ManagerState::Stopped {
            return;
        }

        let mut desired = self.last_requested_types.clone();
        desired.insert(data_type);
        self.configure_impl(desired, ConfigureReason::Programmatic, TypeSet::new());
    }

    /// Clear every data-type error.
    pub fn reset_data_type_errors(&mut self) {
        self.status_table.reset_data_type_errors();
    }

    /// Re-run the last configuration if crypto errors can now be cleared.
    ///
    /// Returns whether a configure call was started.
    pub fn on_encryption_state_changed(&mut self) -> bool {
        if self.state == ManagerState::Stopped
            || self.status_table.crypto_error_types().is_empty()
            || self.encryption.is_passphrase_required()
        {
            return false;
        }
        tracing::info!("Passphrase available, reconfiguring crypto-blocked types");
        let desired = self.last_requested_types.clone();
        self.configure_impl(desired, ConfigureReason::Crypto, TypeSet::new());
        true
    }

    /// Halt everything. Owes `Aborted` to a call in flight. No-op when stopped.
    pub fn stop(&mut self) {
        if self.state == ManagerState::Stopped {
            return;
        }
        let in_flight = self.state.is_configuring();
        tracing::info!(state = %self.state, "Stopping data type manager");

        self.halt();
        if in_flight {
            self.notify_done(ConfigureStatus::Aborted);
        }
    }

    /// Apply every event already queued; returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.process_event(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event from a collaborator.
    pub async fn next_event(&mut self) -> Option<ManagerEvent> {
        self.events_rx.recv().await
    }

    pub fn process_event(&mut self, event: ManagerEvent) {
        let stale = event.epoch() != Some(self.epoch) || !self.state.is_configuring();
        match event {
            ManagerEvent::TypeError { error } => self.on_type_error(error),
            event if stale => {
                tracing::debug!(?event, current = %self.epoch, "Dropping stale event");
            }
            ManagerEvent::DownloadReady {
                band,
                ready,
                failed,
                ..
            } => self.on_download_ready(band, &ready, &failed),
            ManagerEvent::DownloadRetry { .. } => {
                tracing::info!("Configurer retrying download");
                self.observers.notify(|o| o.on_configure_retry());
            }
            ManagerEvent::ModelLoaded {
                epoch,
                data_type,
                result,
            } => {
                let progress = self.association.on_model_loaded(epoch, data_type, result);
                self.handle_progress(progress);
            }
            ManagerEvent::AssociationDone {
                epoch,
                data_type,
                result,
            } => {
                let progress = self.association.on_association_done(epoch, data_type, result);
                self.handle_progress(progress);
            }
            ManagerEvent::AssociationTimeout { epoch, band } => {
                let progress = self.association.on_timeout(epoch, band);
                self.handle_progress(progress);
            }
        }
    }

    fn configure_impl(&mut self, desired: TypeSet, reason: ConfigureReason, purge: TypeSet) {
        if self.state.is_configuring() {
            tracing::info!(epoch = %self.epoch, "Superseding configuration in flight");
            self.epoch = self.epoch.next();
            let aborted = self.association.abort();
            if !aborted.is_empty() {
                tracing::debug!(types = %aborted, "Stopped types with work in flight");
            }
            self.pass = None;
            self.notify_done(ConfigureStatus::Aborted);
        }

        tracing::info!(types = %desired, %reason, "Configure requested");
        self.last_requested_types = desired.clone();
        self.pending = Some(PendingConfigure::new(desired));
        self.observers.notify(|o| o.on_configure_start());

        if let Some(error) = self.status_table.unrecoverable_error() {
            tracing::error!(error = %error, "Refusing to configure after unrecoverable error");
            self.halt();
            self.notify_done(ConfigureStatus::UnrecoverableError);
            return;
        }

        self.restart(reason, purge, true);
    }

    /// Start a new pass over the last requested types.
    ///
    /// `fresh` passes also refresh crypto and unready errors; internal
    /// reconfigurations keep them so a failed type stays out.
    fn restart(&mut self, reason: ConfigureReason, purge: TypeSet, fresh: bool) {
        self.epoch = self.epoch.next();
        if fresh {
            self.refresh_error_state();
        }

        let failed = self.status_table.failed_types();
        let mut enabled = self.last_requested_types.difference(&failed).difference(&purge);
        let known = self.association.registered_types().union(&control_types());
        let unknown = enabled.difference(&known);
        if !unknown.is_empty() {
            tracing::debug!(types = %unknown, "Ignoring types without a controller");
            enabled.remove_all(&unknown);
        }

        let stopped = self.association.initialize(&enabled);
        self.deactivate_types(&stopped);
        let stale_active = self.active_types.difference(&enabled);
        self.deactivate_types(&stale_active);

        let bands = self.priority_bands(&enabled, reason);
        tracing::info!(
            epoch = %self.epoch,
            %reason,
            enabled = %enabled,
            failed = %failed,
            bands = bands.len(),
            "Starting configure pass"
        );

        self.pass = Some(ConfigurePass {
            reason,
            enabled,
            purge,
            bands,
            band: 0,
            band_requested_at: Instant::now(),
            needs_reconfigure: false,
        });
        self.download_band(0);
    }

    fn refresh_error_state(&mut self) {
        if self.encryption.is_passphrase_required() {
            let blocked = self
                .encryption
                .encrypted_data_types()
                .intersection(&self.last_requested_types)
                .difference(&self.status_table.failed_types());
            let errors: Vec<_> = blocked
                .iter()
                .map(|data_type| SyncError::crypto("Passphrase required", data_type))
                .collect();
            self.status_table.update_failed_data_types(&errors);
        } else {
            self.status_table.reset_crypto_errors();
        }

        for data_type in self.status_table.unready_error_types().iter() {
            if self.association.is_ready_for_start(data_type) {
                self.status_table.reset_unready_error_for(data_type);
            }
        }
    }

    fn priority_bands(&self, enabled: &TypeSet, reason: ConfigureReason) -> Vec<TypeSet> {
        if reason == ConfigureReason::BackupRollback {
            return vec![enabled.clone()];
        }
        let high = enabled.intersection(&control_types().union(&self.priority_types));
        let regular = enabled.difference(&high);
        let mut bands = vec![high];
        if !regular.is_empty() {
            bands.push(regular);
        }
        bands
    }

    fn download_band(&mut self, index: usize) {
        let epoch = self.epoch;
        let Some(band_types) = self.pass.as_ref().and_then(|p| p.bands.get(index).cloned()) else {
            return;
        };
        self.state = ManagerState::DownloadPending;

        let unready = self.association.load_models(&band_types, epoch);
        if !unready.is_empty() {
            tracing::info!(types = %unready, "Types not ready to start");
            let errors: Vec<_> = unready
                .iter()
                .map(|data_type| SyncError::unready("Type not ready for start", data_type))
                .collect();
            self.status_table.update_failed_data_types(&errors);
            self.deactivate_types(&unready);
        }

        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        pass.drop_types(&unready);
        pass.band = index;
        pass.band_requested_at = Instant::now();
        let reason = pass.reason;

        let states = self.config_state_map();
        tracing::info!(
            band = index,
            epoch = %epoch,
            types = %band_types.difference(&unready),
            "Requesting download"
        );
        let downloaded = self.configurer.configure_data_types(
            reason,
            &states,
            DownloadReadyCallback::new(self.events_tx.clone(), epoch, index),
            DownloadRetryCallback::new(self.events_tx.clone(), epoch),
        );
        if !downloaded.is_empty() {
            tracing::debug!(types = %downloaded, "Already downloaded");
        }
    }

    fn config_state_map(&self) -> ConfigStateMap {
        let Some(pass) = self.pass.as_ref() else {
            return ConfigStateMap::new();
        };
        let empty = TypeSet::new();
        let current = pass.bands.get(pass.band).unwrap_or(&empty);
        let table = &self.status_table;
        let fatal = table
            .fatal_error_types()
            .union(&table.persistence_error_types());
        let crypto = table.crypto_error_types();
        let unready = table.unready_error_types();

        let universe = self
            .association
            .registered_types()
            .union(&self.last_requested_types)
            .union(&control_types())
            .union(&pass.purge);

        universe
            .iter()
            .map(|data_type| {
                let state = if pass.purge.contains(data_type) {
                    ConfigState::ConfigureClean
                } else if current.contains(data_type) {
                    ConfigState::ConfigureActive
                } else if pass.enabled.contains(data_type) {
                    ConfigState::ConfigureInactive
                } else if fatal.contains(data_type) {
                    ConfigState::Fatal
                } else if crypto.contains(data_type) {
                    ConfigState::Crypto
                } else if unready.contains(data_type) {
                    ConfigState::Unready
                } else {
                    ConfigState::Disabled
                };
                (data_type, state)
            })
            .collect()
    }

    fn on_download_ready(&mut self, band: usize, ready: &TypeSet, failed: &TypeSet) {
        if self.state != ManagerState::DownloadPending {
            tracing::debug!(band, state = %self.state, "Ignoring download callback");
            return;
        }
        let Some(pass) = self.pass.as_mut().filter(|p| p.band == band) else {
            tracing::debug!(band, "Ignoring download callback for another band");
            return;
        };

        let download_time = pass.band_requested_at.elapsed();
        let band_types = pass.bands.get(band).cloned().unwrap_or_default();
        let failed = failed.intersection(&band_types);
        let not_reported = band_types.difference(ready).difference(&failed);
        if !not_reported.is_empty() {
            tracing::debug!(types = %not_reported, "Treating unreported types as ready");
        }
        if !failed.is_empty() {
            pass.drop_types(&failed);
            pass.needs_reconfigure = true;
        }
        let band_requested_at = pass.band_requested_at;
        let band_count = pass.bands.len();
        let band_types = band_types.difference(&failed);

        tracing::info!(band, ready = %ready, failed = %failed, "Download finished");
        if !failed.is_empty() {
            let errors: Vec<_> = failed
                .iter()
                .map(|data_type| SyncError::datatype("Failed to download", data_type))
                .collect();
            self.status_table.update_failed_data_types(&errors);
            for data_type in failed.iter() {
                self.association.stop_type(data_type);
            }
            self.deactivate_types(&failed);
        }

        let (download_wait_time, high_priority_types_configured_before) = self
            .pending
            .as_ref()
            .map_or((Duration::ZERO, TypeSet::new()), |pending| {
                (
                    band_requested_at.saturating_duration_since(pending.started_at),
                    pending.high_priority_configured.clone(),
                )
            });
        let priority = if band == 0 && band_count > 1 {
            BandPriority::High
        } else {
            BandPriority::Regular
        };

        self.state = ManagerState::Configuring;
        let progress = self.association.start_association(
            &band_types,
            self.epoch,
            BandContext {
                band,
                priority,
                download_wait_time,
                download_time,
                high_priority_types_configured_before,
            },
        );
        self.handle_progress(progress);
    }

    fn handle_progress(&mut self, progress: AssociationProgress) {
        for error in progress.failures {
            if !self.handle_type_failure(&error) {
                return;
            }
        }
        if let Some(band) = progress.band {
            self.on_band_done(band);
        }
    }

    /// Record `error` and drop its type from the pass. Returns false if the
    /// manager stopped.
    fn handle_type_failure(&mut self, error: &SyncError) -> bool {
        let data_type = error.data_type();
        self.status_table.record(error);
        if error.kind() == ErrorKind::Unrecoverable {
            self.abort_unrecoverable(error);
            return false;
        }

        self.deactivate_types(&TypeSet::from(data_type));
        if let Some(pass) = self.pass.as_mut() {
            pass.drop_types(&TypeSet::from(data_type));
            if error.kind() != ErrorKind::Unready {
                pass.needs_reconfigure = true;
            }
        }
        true
    }

    fn on_band_done(&mut self, result: BandResult) {
        let Some(pass) = self.pass.as_ref() else {
            return;
        };
        let next = result.band + 1;
        let has_next = next < pass.bands.len();

        if let Some(pending) = self.pending.as_mut() {
            pending.associated.put_all(&result.associated);
            pending.first_run.put_all(&result.first_run);
            if result.band == 0 && has_next {
                pending
                    .high_priority_configured
                    .put_all(&result.associated.union(&result.already_running));
            }
            pending.stats.extend(result.stats);
        }

        if has_next {
            self.download_band(next);
        } else {
            self.finish_pass();
        }
    }

    fn finish_pass(&mut self) {
        let Some(pass) = self.pass.take() else {
            return;
        };
        if pass.needs_reconfigure {
            tracing::info!(
                failed = %self.status_table.failed_types(),
                "Reconfiguring without failed types"
            );
            self.restart(pass.reason, pass.purge, false);
            return;
        }

        let running = self.association.running_types();
        for data_type in running.difference(&self.active_types).iter() {
            let group = self
                .association
                .model_safe_group(data_type)
                .unwrap_or_else(|| data_type.default_group());
            tracing::debug!(data_type = %data_type, %group, "Activating type");
            self.configurer.activate_data_type(data_type, group);
            self.active_types.insert(data_type);
        }

        self.state = ManagerState::Configured;
        let status = self
            .pending
            .as_ref()
            .map_or(ConfigureStatus::Ok, PendingConfigure::status);
        tracing::info!(%status, active = %self.active_types, "Configuration finished");
        self.notify_done(status);
    }

    fn on_type_error(&mut self, error: SyncError) {
        let data_type = error.data_type();
        let configured = self.last_requested_types.contains(data_type)
            || self.active_types.contains(data_type);
        if !configured
            && error.kind() != ErrorKind::Unrecoverable
            && self.state != ManagerState::Stopped
        {
            tracing::debug!(data_type = %data_type, error = %error, "Ignoring error from type not configured");
            self.association.stop_type(data_type);
            return;
        }

        tracing::warn!(data_type = %data_type, error = %error, "Type reported an error");
        self.status_table.record(&error);

        if self.state == ManagerState::Stopped {
            self.association.stop_type(data_type);
            return;
        }
        if error.kind() == ErrorKind::Unrecoverable {
            self.abort_unrecoverable(&error);
            return;
        }

        self.deactivate_types(&TypeSet::from(data_type));
        if self.state.is_configuring() {
            let progress = self.association.drop_type(data_type);
            if let Some(pass) = self.pass.as_mut() {
                pass.drop_types(&TypeSet::from(data_type));
                if error.kind() != ErrorKind::Unready {
                    pass.needs_reconfigure = true;
                }
            }
            self.handle_progress(progress);
        } else {
            self.association.stop_type(data_type);
            let desired = self.last_requested_types.clone();
            self.configure_impl(desired, ConfigureReason::Reconfiguration, TypeSet::new());
        }
    }

    fn abort_unrecoverable(&mut self, error: &SyncError) {
        tracing::error!(
            data_type = %error.data_type(),
            location = %error.location(),
            message = error.message(),
            "Unrecoverable error, stopping every type"
        );
        self.halt();
        self.notify_done(ConfigureStatus::UnrecoverableError);
    }

    /// Invalidate outstanding events and tear every type down.
    fn halt(&mut self) {
        self.epoch = self.epoch.next();
        self.pass = None;
        let stopped = self.association.stop_all();
        if !stopped.is_empty() {
            tracing::debug!(types = %stopped, "Stopped controllers");
        }
        let active = std::mem::take(&mut self.active_types);
        for data_type in active.iter() {
            self.configurer.deactivate_data_type(data_type);
        }
        self.state = ManagerState::Stopped;
    }

    fn deactivate_types(&mut self, types: &TypeSet) {
        for data_type in types.iter() {
            if self.active_types.remove(data_type) {
                tracing::debug!(data_type = %data_type, "Deactivating type");
                self.configurer.deactivate_data_type(data_type);
            }
        }
    }

    /// Deliver the result of the pending call, if one is owed.
    fn notify_done(&mut self, status: ConfigureStatus) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let result = ConfigureResult::new(status, pending.requested, self.status_table.clone());
        tracing::info!(%status, elapsed_ms = pending.started_at.elapsed().as_millis(), "Configure done");

        if status.is_success() {
            if let Some(listener) = &self.debug_listener {
                listener.on_data_type_configure_complete(&pending.stats);
            }
        }
        self.observers.notify(|o| o.on_configure_done(&result));
    }
}

impl fmt::Debug for DataTypeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTypeManager")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("last_requested_types", &self.last_requested_types)
            .field("active_types", &self.active_types)
            .field("status_table", &self.status_table)
            .finish_non_exhaustive()
    }
}
