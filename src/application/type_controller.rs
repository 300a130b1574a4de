//! Controller for data types backed by a [`DataTypeModel`].
//!
//! Model loading and association run on spawned tokio tasks. The controller
//! state lives behind a mutex shared with those tasks; each task carries the
//! run id it was started under and leaves the state alone once a `stop` has
//! bumped it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;

use super::controller::{ControllerState, DataTypeController};
use super::events::{ModelLoadCallback, StartCallback, TypeErrorReporter};
use crate::domain::{AssociationResult, DataType, SyncError, SyncMergeResult};

/// Counts reported by a successful association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelAssociation {
    /// No remote data existed for the type before this association.
    pub first_run: bool,
    pub local_merge_result: SyncMergeResult,
    pub syncer_merge_result: SyncMergeResult,
}

/// Local model of one data type.
pub trait DataTypeModel: Send + Sync + 'static {
    fn ready_for_start(&self) -> bool {
        true
    }

    /// Handed a reporter for failures discovered outside of load/associate.
    fn on_registered(&self, _reporter: TypeErrorReporter) {}

    fn load_model(&self) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn associate(&self) -> impl Future<Output = Result<ModelAssociation, SyncError>> + Send;

    /// Release whatever the model holds. Called on every controller stop.
    fn stop(&self) {}
}

#[derive(Debug)]
struct Inner {
    state: ControllerState,
    run_id: u64,
    task: Option<JoinHandle<()>>,
}

/// [`DataTypeController`] driving a [`DataTypeModel`] on worker tasks.
pub struct TypeController<M> {
    data_type: DataType,
    model: Arc<M>,
    inner: Arc<Mutex<Inner>>,
}

impl<M: DataTypeModel> TypeController<M> {
    #[must_use]
    pub fn new(data_type: DataType, model: M) -> Self {
        Self {
            data_type,
            model: Arc::new(model),
            inner: Arc::new(Mutex::new(Inner {
                state: ControllerState::NotRunning,
                run_id: 0,
                task: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply `state` only if the controller was not stopped since `run_id`.
fn finish(inner: &Mutex<Inner>, run_id: u64, state: ControllerState) -> bool {
    let mut guard = lock_inner(inner);
    if guard.run_id != run_id {
        return false;
    }
    guard.state = state;
    guard.task = None;
    true
}

impl<M: DataTypeModel> DataTypeController for TypeController<M> {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn state(&self) -> ControllerState {
        self.lock().state
    }

    fn ready_for_start(&self) -> bool {
        self.model.ready_for_start()
    }

    fn on_registered(&mut self, reporter: TypeErrorReporter) {
        self.model.on_registered(reporter);
    }

    fn load_models(&mut self, done: ModelLoadCallback) {
        let mut guard = self.lock();
        match guard.state {
            ControllerState::NotRunning => {}
            ControllerState::ModelLoaded | ControllerState::Running => {
                drop(guard);
                done.run(Ok(()));
                return;
            }
            state => {
                tracing::warn!(data_type = %self.data_type, %state, "Ignoring model load request");
                return;
            }
        }

        guard.state = ControllerState::ModelStarting;
        let run_id = guard.run_id;
        let model = Arc::clone(&self.model);
        let inner = Arc::clone(&self.inner);
        let data_type = self.data_type;

        guard.task = Some(tokio::spawn(async move {
            let result = model.load_model().await;
            let next = if result.is_ok() {
                ControllerState::ModelLoaded
            } else {
                ControllerState::Disabled
            };
            if finish(&inner, run_id, next) {
                tracing::debug!(data_type = %data_type, state = %next, "Model load finished");
                done.run(result);
            }
        }));
    }

    fn start_associating(&mut self, done: StartCallback) {
        let mut guard = self.lock();
        if guard.state != ControllerState::ModelLoaded {
            let state = guard.state;
            drop(guard);
            done.run(AssociationResult::failure(SyncError::datatype(
                format!("Cannot associate in state {state}"),
                self.data_type,
            )));
            return;
        }

        guard.state = ControllerState::Associating;
        let run_id = guard.run_id;
        let model = Arc::clone(&self.model);
        let inner = Arc::clone(&self.inner);

        guard.task = Some(tokio::spawn(async move {
            let result = match model.associate().await {
                Ok(association) => AssociationResult::success(
                    association.first_run,
                    association.local_merge_result,
                    association.syncer_merge_result,
                ),
                Err(error) => AssociationResult::failure(error),
            };
            let next = if result.outcome.is_success() {
                ControllerState::Running
            } else {
                ControllerState::Disabled
            };
            if finish(&inner, run_id, next) {
                done.run(result);
            }
        }));
    }

    fn stop(&mut self) {
        let mut guard = self.lock();
        if let Some(task) = guard.task.take() {
            task.abort();
        }
        if guard.state == ControllerState::NotRunning {
            return;
        }
        guard.run_id += 1;
        guard.state = ControllerState::NotRunning;
        drop(guard);

        self.model.stop();
        tracing::debug!(data_type = %self.data_type, "Controller stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;
    use crate::application::events::{Epoch, ManagerEvent};
    use crate::domain::AssociationOutcome;

    #[derive(Default)]
    struct CountingModel {
        fail_association: bool,
        hang: bool,
        stops: AtomicUsize,
    }

    impl DataTypeModel for CountingModel {
        async fn load_model(&self) -> Result<(), SyncError> {
            Ok(())
        }

        async fn associate(&self) -> Result<ModelAssociation, SyncError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail_association {
                return Err(SyncError::datatype("merge failed", DataType::Bookmarks));
            }
            Ok(ModelAssociation {
                first_run: true,
                ..ModelAssociation::default()
            })
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_load_then_associate_reaches_running() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epoch = Epoch::default();
        let mut controller = TypeController::new(DataType::Bookmarks, CountingModel::default());

        controller.load_models(ModelLoadCallback::new(tx.clone(), epoch, DataType::Bookmarks));
        assert!(matches!(
            rx.recv().await,
            Some(ManagerEvent::ModelLoaded { result: Ok(()), .. })
        ));
        assert_eq!(controller.state(), ControllerState::ModelLoaded);

        controller.start_associating(StartCallback::new(tx, epoch, DataType::Bookmarks));
        match rx.recv().await {
            Some(ManagerEvent::AssociationDone { result, .. }) => {
                assert_eq!(result.outcome, AssociationOutcome::OkFirstRun);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(controller.state(), ControllerState::Running);
    }

    #[tokio::test]
    async fn test_failed_association_disables() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epoch = Epoch::default();
        let model = CountingModel {
            fail_association: true,
            ..CountingModel::default()
        };
        let mut controller = TypeController::new(DataType::Bookmarks, model);

        controller.load_models(ModelLoadCallback::new(tx.clone(), epoch, DataType::Bookmarks));
        rx.recv().await;
        controller.start_associating(StartCallback::new(tx, epoch, DataType::Bookmarks));
        match rx.recv().await {
            Some(ManagerEvent::AssociationDone { result, .. }) => {
                assert_eq!(result.outcome, AssociationOutcome::AssociationFailed);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(controller.state(), ControllerState::Disabled);

        controller.stop();
        assert_eq!(controller.state(), ControllerState::NotRunning);
        assert_eq!(controller.model.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_associate_before_load_fails_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut controller = TypeController::new(DataType::Bookmarks, CountingModel::default());

        controller.start_associating(StartCallback::new(tx, Epoch::default(), DataType::Bookmarks));
        match rx.try_recv() {
            Ok(ManagerEvent::AssociationDone { result, .. }) => {
                assert!(!result.outcome.is_success());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_while_associating_suppresses_callback() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let epoch = Epoch::default();
        let model = CountingModel {
            hang: true,
            ..CountingModel::default()
        };
        let mut controller = TypeController::new(DataType::Bookmarks, model);

        controller.load_models(ModelLoadCallback::new(tx.clone(), epoch, DataType::Bookmarks));
        rx.recv().await;
        controller.start_associating(StartCallback::new(tx, epoch, DataType::Bookmarks));
        assert_eq!(controller.state(), ControllerState::Associating);

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), ControllerState::NotRunning);
        assert_eq!(controller.model.stops.load(Ordering::SeqCst), 1);

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
