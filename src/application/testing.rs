//! Fakes shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::configurer::{DataTypeConfigurer, DataTypeEncryptionHandler};
use super::controller::{ControllerMap, ControllerState, DataTypeController};
use super::events::{DownloadReadyCallback, DownloadRetryCallback, ModelLoadCallback, StartCallback, TypeErrorReporter};
use super::manager::DataTypeManager;
use super::observer::{DataTypeDebugInfoListener, DataTypeManagerObserver};
use crate::domain::{
    types_in_state, AssociationOutcome, AssociationResult, ConfigState, ConfigStateMap,
    ConfigureReason, ConfigureResult, DataType, DataTypeConfigurationStats, ManagerConfig,
    ModelSafeGroup, SyncError, SyncMergeResult, TypeSet,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

#[derive(Debug)]
struct FakeControllerInner {
    state: ControllerState,
    ready_for_start: bool,
    model_load_error: Option<SyncError>,
    delay_model_load: bool,
    pending_load: Option<ModelLoadCallback>,
    pending_start: Option<StartCallback>,
    reporter: Option<TypeErrorReporter>,
    load_calls: usize,
    start_calls: usize,
    stop_calls: usize,
}

/// Controller whose completions are driven by a [`FakeControllerHandle`].
#[derive(Debug)]
pub struct FakeDataTypeController {
    data_type: DataType,
    inner: Arc<Mutex<FakeControllerInner>>,
}

/// Test-side view of a [`FakeDataTypeController`].
#[derive(Debug, Clone)]
pub struct FakeControllerHandle {
    data_type: DataType,
    inner: Arc<Mutex<FakeControllerInner>>,
}

impl FakeDataTypeController {
    pub fn new(data_type: DataType) -> (Self, FakeControllerHandle) {
        let inner = Arc::new(Mutex::new(FakeControllerInner {
            state: ControllerState::NotRunning,
            ready_for_start: true,
            model_load_error: None,
            delay_model_load: false,
            pending_load: None,
            pending_start: None,
            reporter: None,
            load_calls: 0,
            start_calls: 0,
            stop_calls: 0,
        }));
        let handle = FakeControllerHandle {
            data_type,
            inner: Arc::clone(&inner),
        };
        (Self { data_type, inner }, handle)
    }
}

fn finish_load(inner: &Mutex<FakeControllerInner>, done: ModelLoadCallback) {
    let mut guard = lock(inner);
    let result = match guard.model_load_error.clone() {
        Some(error) => {
            guard.state = ControllerState::Disabled;
            Err(error)
        }
        None => {
            guard.state = ControllerState::ModelLoaded;
            Ok(())
        }
    };
    drop(guard);
    done.run(result);
}

impl DataTypeController for FakeDataTypeController {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn state(&self) -> ControllerState {
        lock(&self.inner).state
    }

    fn ready_for_start(&self) -> bool {
        lock(&self.inner).ready_for_start
    }

    fn on_registered(&mut self, reporter: TypeErrorReporter) {
        lock(&self.inner).reporter = Some(reporter);
    }

    fn load_models(&mut self, done: ModelLoadCallback) {
        let mut guard = lock(&self.inner);
        guard.load_calls += 1;
        match guard.state {
            ControllerState::NotRunning => {}
            ControllerState::ModelLoaded | ControllerState::Running => {
                drop(guard);
                done.run(Ok(()));
                return;
            }
            _ => return,
        }
        guard.state = ControllerState::ModelStarting;
        if guard.delay_model_load {
            guard.pending_load = Some(done);
            return;
        }
        drop(guard);
        finish_load(&self.inner, done);
    }

    fn start_associating(&mut self, done: StartCallback) {
        let mut guard = lock(&self.inner);
        guard.start_calls += 1;
        guard.state = ControllerState::Associating;
        guard.pending_start = Some(done);
    }

    fn stop(&mut self) {
        let mut guard = lock(&self.inner);
        guard.stop_calls += 1;
        guard.state = ControllerState::NotRunning;
        guard.pending_load = None;
        guard.pending_start = None;
    }
}

impl FakeControllerHandle {
    pub fn state(&self) -> ControllerState {
        lock(&self.inner).state
    }

    pub fn set_ready_for_start(&self, ready: bool) {
        lock(&self.inner).ready_for_start = ready;
    }

    pub fn set_model_load_error(&self, error: SyncError) {
        lock(&self.inner).model_load_error = Some(error);
    }

    /// Hold model loads until [`Self::simulate_model_load_finishing`].
    pub fn delay_model_load(&self) {
        lock(&self.inner).delay_model_load = true;
    }

    pub fn simulate_model_load_finishing(&self) {
        let done = {
            let mut guard = lock(&self.inner);
            guard.delay_model_load = false;
            guard.pending_load.take()
        };
        let done = done.unwrap_or_else(|| panic!("{} has no pending model load", self.data_type));
        finish_load(&self.inner, done);
    }

    pub fn is_associating(&self) -> bool {
        lock(&self.inner).pending_start.is_some()
    }

    /// Complete the pending association with `outcome`.
    pub fn finish_start(&self, outcome: AssociationOutcome) {
        let result = match outcome {
            AssociationOutcome::Ok => {
                AssociationResult::success(false, SyncMergeResult::default(), SyncMergeResult::default())
            }
            AssociationOutcome::OkFirstRun => {
                AssociationResult::success(true, SyncMergeResult::default(), SyncMergeResult::default())
            }
            AssociationOutcome::AssociationFailed => {
                AssociationResult::failure(SyncError::datatype("Association failed", self.data_type))
            }
            AssociationOutcome::NeedsCrypto => {
                AssociationResult::failure(SyncError::crypto("Needs crypto", self.data_type))
            }
            AssociationOutcome::UnrecoverableError => AssociationResult::failure(
                SyncError::unrecoverable("Unrecoverable", self.data_type),
            ),
        };
        self.finish_start_with(result);
    }

    pub fn finish_start_with(&self, result: AssociationResult) {
        let done = {
            let mut guard = lock(&self.inner);
            guard.state = match result.outcome {
                AssociationOutcome::Ok | AssociationOutcome::OkFirstRun => ControllerState::Running,
                AssociationOutcome::AssociationFailed => ControllerState::Disabled,
                AssociationOutcome::NeedsCrypto | AssociationOutcome::UnrecoverableError => {
                    ControllerState::NotRunning
                }
            };
            guard.pending_start.take()
        };
        let done = done.unwrap_or_else(|| panic!("{} is not associating", self.data_type));
        done.run(result);
    }

    /// Report an error the way a running type would, outside any callback.
    pub fn report_error(&self, error: SyncError) {
        let reporter = lock(&self.inner).reporter.clone();
        reporter
            .unwrap_or_else(|| panic!("{} was never registered", self.data_type))
            .report(error);
    }

    pub fn load_calls(&self) -> usize {
        lock(&self.inner).load_calls
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.inner).start_calls
    }

    pub fn stop_calls(&self) -> usize {
        lock(&self.inner).stop_calls
    }
}

#[derive(Debug, Default)]
struct FakeConfigurerInner {
    requests: Vec<(ConfigureReason, ConfigStateMap)>,
    ready: Option<DownloadReadyCallback>,
    retry: Option<DownloadRetryCallback>,
    activated: BTreeMap<DataType, ModelSafeGroup>,
    deactivated: Vec<DataType>,
}

/// Configurer that records requests and holds ready callbacks until told.
#[derive(Debug, Default)]
pub struct FakeConfigurer {
    inner: Arc<Mutex<FakeConfigurerInner>>,
}

#[derive(Debug, Clone)]
pub struct FakeConfigurerHandle {
    inner: Arc<Mutex<FakeConfigurerInner>>,
}

impl FakeConfigurer {
    pub fn new() -> (Self, FakeConfigurerHandle) {
        let configurer = Self::default();
        let handle = FakeConfigurerHandle {
            inner: Arc::clone(&configurer.inner),
        };
        (configurer, handle)
    }
}

impl DataTypeConfigurer for FakeConfigurer {
    fn configure_data_types(
        &mut self,
        reason: ConfigureReason,
        states: &ConfigStateMap,
        ready: DownloadReadyCallback,
        retry: DownloadRetryCallback,
    ) -> TypeSet {
        let mut guard = lock(&self.inner);
        guard.requests.push((reason, states.clone()));
        guard.ready = Some(ready);
        guard.retry = Some(retry);
        TypeSet::new()
    }

    fn activate_data_type(&mut self, data_type: DataType, group: ModelSafeGroup) {
        lock(&self.inner).activated.insert(data_type, group);
    }

    fn deactivate_data_type(&mut self, data_type: DataType) {
        let mut guard = lock(&self.inner);
        guard.activated.remove(&data_type);
        guard.deactivated.push(data_type);
    }
}

impl FakeConfigurerHandle {
    pub fn request_count(&self) -> usize {
        lock(&self.inner).requests.len()
    }

    pub fn last_reason(&self) -> Option<ConfigureReason> {
        lock(&self.inner).requests.last().map(|(reason, _)| *reason)
    }

    pub fn last_states(&self) -> ConfigStateMap {
        lock(&self.inner)
            .requests
            .last()
            .map(|(_, states)| states.clone())
            .unwrap_or_default()
    }

    /// `ConfigureActive` types of the most recent request.
    pub fn last_active_types(&self) -> TypeSet {
        types_in_state(&self.last_states(), ConfigState::ConfigureActive)
    }

    /// `ConfigureActive` types of every request so far, in order.
    pub fn active_types_per_request(&self) -> Vec<TypeSet> {
        lock(&self.inner)
            .requests
            .iter()
            .map(|(_, states)| types_in_state(states, ConfigState::ConfigureActive))
            .collect()
    }

    /// Take the pending ready callback without running it.
    pub fn take_download_callback(&self) -> Option<DownloadReadyCallback> {
        lock(&self.inner).ready.take()
    }

    pub fn has_pending_download(&self) -> bool {
        lock(&self.inner).ready.is_some()
    }

    /// Report the pending download done, with `failed` types not downloaded.
    pub fn finish_download_with_failures(&self, failed: &TypeSet) {
        let (ready_callback, active) = {
            let mut guard = lock(&self.inner);
            let active = guard
                .requests
                .last()
                .map(|(_, states)| types_in_state(states, ConfigState::ConfigureActive))
                .unwrap_or_default();
            (guard.ready.take(), active)
        };
        let ready_callback = ready_callback.unwrap_or_else(|| panic!("no download pending"));
        ready_callback.run(active.difference(failed), failed.clone());
    }

    pub fn finish_download(&self) {
        self.finish_download_with_failures(&TypeSet::new());
    }

    pub fn trigger_retry(&self) {
        let retry = lock(&self.inner).retry.clone();
        retry.unwrap_or_else(|| panic!("no download pending")).run();
    }

    pub fn activated_types(&self) -> TypeSet {
        lock(&self.inner).activated.keys().copied().collect()
    }

    pub fn deactivated(&self) -> Vec<DataType> {
        lock(&self.inner).deactivated.clone()
    }
}

/// Encryption handler whose answers tests can change.
#[derive(Debug, Default)]
pub struct FakeEncryptionHandler {
    passphrase_required: AtomicBool,
    encrypted: Mutex<TypeSet>,
}

impl FakeEncryptionHandler {
    pub fn set_passphrase_required(&self, required: bool) {
        self.passphrase_required.store(required, Ordering::SeqCst);
    }

    pub fn set_encrypted_types(&self, types: TypeSet) {
        *lock(&self.encrypted) = types;
    }
}

impl DataTypeEncryptionHandler for FakeEncryptionHandler {
    fn is_passphrase_required(&self) -> bool {
        self.passphrase_required.load(Ordering::SeqCst)
    }

    fn encrypted_data_types(&self) -> TypeSet {
        lock(&self.encrypted).clone()
    }
}

/// Observer that records every notification.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    name: &'static str,
    log: Option<Arc<Mutex<Vec<String>>>>,
    starts: AtomicUsize,
    retries: AtomicUsize,
    results: Mutex<Vec<ConfigureResult>>,
}

impl RecordingObserver {
    /// Observer appending `name:event` entries to a shared `log`.
    pub fn with_log(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            log: Some(log),
            ..Self::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn retry_count(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn results(&self) -> Vec<ConfigureResult> {
        lock(&self.results).clone()
    }

    pub fn last_result(&self) -> Option<ConfigureResult> {
        lock(&self.results).last().cloned()
    }

    fn append(&self, entry: String) {
        if let Some(log) = &self.log {
            lock(log).push(format!("{}:{entry}", self.name));
        }
    }
}

impl DataTypeManagerObserver for RecordingObserver {
    fn on_configure_start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.append("start".to_string());
    }

    fn on_configure_done(&self, result: &ConfigureResult) {
        lock(&self.results).push(result.clone());
        self.append(format!("done:{}", result.status));
    }

    fn on_configure_retry(&self) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.append("retry".to_string());
    }
}

#[derive(Debug, Default)]
pub struct RecordingDebugListener {
    reports: Mutex<Vec<Vec<DataTypeConfigurationStats>>>,
}

impl RecordingDebugListener {
    pub fn reports(&self) -> Vec<Vec<DataTypeConfigurationStats>> {
        lock(&self.reports).clone()
    }
}

impl DataTypeDebugInfoListener for RecordingDebugListener {
    fn on_data_type_configure_complete(&self, stats: &[DataTypeConfigurationStats]) {
        lock(&self.reports).push(stats.to_vec());
    }
}

/// A manager wired to fakes, with handles to drive them.
pub struct ManagerHarness {
    pub manager: DataTypeManager,
    pub controllers: BTreeMap<DataType, FakeControllerHandle>,
    pub configurer: FakeConfigurerHandle,
    pub encryption: Arc<FakeEncryptionHandler>,
    pub observer: Arc<RecordingObserver>,
}

impl ManagerHarness {
    pub fn new(types: &[DataType]) -> Self {
        Self::with_config(types, &ManagerConfig::default())
    }

    pub fn with_config(types: &[DataType], config: &ManagerConfig) -> Self {
        let mut controllers = ControllerMap::new();
        let mut handles = BTreeMap::new();
        for &data_type in types {
            let (controller, handle) = FakeDataTypeController::new(data_type);
            controllers.insert(data_type, Box::new(controller));
            handles.insert(data_type, handle);
        }
        let (configurer, configurer_handle) = FakeConfigurer::new();
        let encryption = Arc::new(FakeEncryptionHandler::default());
        let observer = Arc::new(RecordingObserver::default());

        let manager = DataTypeManager::new(
            config,
            controllers,
            Box::new(configurer),
            encryption.clone(),
        );
        manager.add_observer(observer.clone());

        Self {
            manager,
            controllers: handles,
            configurer: configurer_handle,
            encryption,
            observer,
        }
    }

    pub fn controller(&self, data_type: DataType) -> &FakeControllerHandle {
        &self.controllers[&data_type]
    }

    /// Finish the pending download and apply the resulting events.
    pub fn finish_download(&mut self) {
        self.configurer.finish_download();
        self.manager.pump();
    }

    pub fn finish_start(&mut self, data_type: DataType, outcome: AssociationOutcome) {
        self.controller(data_type).finish_start(outcome);
        self.manager.pump();
    }
}
