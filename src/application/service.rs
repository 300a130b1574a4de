//! Async service owning a [`DataTypeManager`] on a single task.
//!
//! Commands arrive from any number of [`ManagerHandle`]s over an mpsc channel.
//! Completions from controllers and the configurer arrive on the manager's
//! own event channel. Both are drained by one `select!` loop, so every
//! manager transition and observer notification happens on the service task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::select;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::controller::ControllerState;
use super::manager::{DataTypeManager, ManagerState};
use super::observer::DataTypeManagerObserver;
use crate::domain::{
    AppError, ConfigureReason, ConfigureResult, DataType, DataTypeStatusTable, Result, TypeSet,
};

const COMMAND_BUFFER: usize = 32;
const NOTIFICATION_BUFFER: usize = 64;

/// Answered with the result of the configure call a command started, or
/// `None` when the command started no call.
pub type ResultReply = oneshot::Sender<Option<ConfigureResult>>;

/// Requests a [`ManagerHandle`] forwards to the service task.
#[derive(Debug)]
pub enum ManagerCommand {
    Configure {
        types: TypeSet,
        reason: ConfigureReason,
        reply: Option<ResultReply>,
    },
    PurgeForMigration {
        types: TypeSet,
        reason: ConfigureReason,
    },
    ReenableType {
        data_type: DataType,
        reply: Option<ResultReply>,
    },
    ResetDataTypeErrors,
    EncryptionStateChanged,
    Stop,
    Snapshot(oneshot::Sender<ManagerSnapshot>),
    Shutdown,
}

/// Observer notifications, rebroadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum ManagerNotification {
    ConfigureStarted,
    ConfigureRetry,
    ConfigureDone(ConfigureResult),
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerSnapshot {
    pub state: ManagerState,
    pub last_requested_types: TypeSet,
    pub active_types: TypeSet,
    pub controllers: BTreeMap<DataType, ControllerState>,
    pub status_table: DataTypeStatusTable,
}

impl ManagerSnapshot {
    fn capture(manager: &DataTypeManager) -> Self {
        Self {
            state: manager.state(),
            last_requested_types: manager.last_requested_types().clone(),
            active_types: manager.active_types().clone(),
            controllers: manager.controller_states(),
            status_table: manager.status_table().clone(),
        }
    }
}

struct BroadcastObserver {
    notifications: broadcast::Sender<ManagerNotification>,
}

impl BroadcastObserver {
    fn send(&self, notification: ManagerNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}

impl DataTypeManagerObserver for BroadcastObserver {
    fn on_configure_start(&self) {
        self.send(ManagerNotification::ConfigureStarted);
    }

    fn on_configure_done(&self, result: &ConfigureResult) {
        self.send(ManagerNotification::ConfigureDone(result.clone()));
    }

    fn on_configure_retry(&self) {
        self.send(ManagerNotification::ConfigureRetry);
    }
}

#[derive(Default)]
struct PendingReplies {
    /// Callers of the command being applied.
    queued: Vec<ResultReply>,
    /// Callers of the configure call in flight.
    in_flight: Vec<ResultReply>,
}

/// Hands each configure result to the callers whose command started it.
#[derive(Default)]
struct ResultRouter {
    replies: Mutex<PendingReplies>,
}

impl ResultRouter {
    fn lock(&self) -> MutexGuard<'_, PendingReplies> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self, reply: Option<ResultReply>) {
        if let Some(reply) = reply {
            self.lock().queued.push(reply);
        }
    }

    /// Answer `None` to callers whose command started no call.
    fn release_unstarted(&self) {
        let queued = std::mem::take(&mut self.lock().queued);
        for reply in queued {
            let _ = reply.send(None);
        }
    }
}

impl DataTypeManagerObserver for ResultRouter {
    fn on_configure_start(&self) {
        let mut replies = self.lock();
        let queued = std::mem::take(&mut replies.queued);
        replies.in_flight.extend(queued);
    }

    fn on_configure_done(&self, result: &ConfigureResult) {
        let in_flight = std::mem::take(&mut self.lock().in_flight);
        for reply in in_flight {
            let _ = reply.send(Some(result.clone()));
        }
    }
}

/// The task side: owns the manager and runs its event loop.
pub struct ManagerService {
    manager: DataTypeManager,
    commands: mpsc::Receiver<ManagerCommand>,
    router: Arc<ResultRouter>,
}

impl ManagerService {
    /// Wrap `manager`; returns the service and a handle to drive it.
    #[must_use]
    pub fn new(manager: DataTypeManager) -> (Self, ManagerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (notification_tx, _) = broadcast::channel(NOTIFICATION_BUFFER);
        manager.add_observer(Arc::new(BroadcastObserver {
            notifications: notification_tx.clone(),
        }));
        let router = Arc::new(ResultRouter::default());
        manager.add_observer(router.clone());

        let service = Self {
            manager,
            commands: command_rx,
            router,
        };
        let handle = ManagerHandle {
            commands: command_tx,
            notifications: notification_tx,
        };
        (service, handle)
    }

    /// Run until shut down or every handle is dropped. Stops the manager on exit.
    pub async fn run(mut self) {
        tracing::info!("Data type manager service started");
        loop {
            select! {
                // Commands first so a stop is never starved by completions.
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = self.manager.next_event() => {
                    self.manager.process_event(event);
                },
            }
        }
        self.manager.stop();
        tracing::info!("Data type manager service is down");
    }

    /// Apply `command`; returns false once the service should exit.
    fn handle_command(&mut self, command: ManagerCommand) -> bool {
        tracing::debug!(?command, "Command received");
        match command {
            ManagerCommand::Configure {
                types,
                reason,
                reply,
            } => {
                self.router.queue(reply);
                self.manager.configure(types, reason);
            }
            ManagerCommand::PurgeForMigration { types, reason } => {
                self.manager.purge_for_migration(&types, reason);
            }
            ManagerCommand::ReenableType { data_type, reply } => {
                self.router.queue(reply);
                self.manager.reenable_type(data_type);
            }
            ManagerCommand::ResetDataTypeErrors => self.manager.reset_data_type_errors(),
            ManagerCommand::EncryptionStateChanged => {
                self.manager.on_encryption_state_changed();
            }
            ManagerCommand::Stop => self.manager.stop(),
            ManagerCommand::Snapshot(reply) => {
                let _ = reply.send(ManagerSnapshot::capture(&self.manager));
            }
            ManagerCommand::Shutdown => {
                tracing::info!("Shutdown requested");
                return false;
            }
        }
        self.router.release_unstarted();
        true
    }
}

/// Cloneable client of a [`ManagerService`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<ManagerCommand>,
    notifications: broadcast::Sender<ManagerNotification>,
}

impl ManagerHandle {
    /// Receive every observer notification from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerNotification> {
        self.notifications.subscribe()
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn configure(&self, types: TypeSet, reason: ConfigureReason) -> Result<()> {
        self.send(ManagerCommand::Configure {
            types,
            reason,
            reply: None,
        })
        .await
    }

    /// Configure and wait for the terminal result of this call.
    ///
    /// A call superseded by another handle's configure ends `ABORTED`.
    ///
    /// # Errors
    /// Returns error if the service shuts down before the result arrives.
    pub async fn configure_and_wait(
        &self,
        types: TypeSet,
        reason: ConfigureReason,
    ) -> Result<ConfigureResult> {
        self.request(|reply| ManagerCommand::Configure {
            types,
            reason,
            reply: Some(reply),
        })
        .await?
        .ok_or_else(|| AppError::service_unavailable("Configure request started no configuration"))
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn purge_for_migration(&self, types: TypeSet, reason: ConfigureReason) -> Result<()> {
        self.send(ManagerCommand::PurgeForMigration { types, reason })
            .await
    }

    /// Re-enable `data_type` and wait for the resulting configure call.
    ///
    /// Returns `None` when the type was already enabled and no call started.
    ///
    /// # Errors
    /// Returns error if the service shuts down before the result arrives.
    pub async fn reenable_type_and_wait(
        &self,
        data_type: DataType,
    ) -> Result<Option<ConfigureResult>> {
        self.request(|reply| ManagerCommand::ReenableType {
            data_type,
            reply: Some(reply),
        })
        .await
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn reenable_type(&self, data_type: DataType) -> Result<()> {
        self.send(ManagerCommand::ReenableType {
            data_type,
            reply: None,
        })
        .await
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn reset_data_type_errors(&self) -> Result<()> {
        self.send(ManagerCommand::ResetDataTypeErrors).await
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn encryption_state_changed(&self) -> Result<()> {
        self.send(ManagerCommand::EncryptionStateChanged).await
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn stop(&self) -> Result<()> {
        self.send(ManagerCommand::Stop).await
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn snapshot(&self) -> Result<ManagerSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(ManagerCommand::Snapshot(reply)).await?;
        response
            .await
            .map_err(|_| AppError::service_unavailable("Manager dropped the snapshot request"))
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn state(&self) -> Result<ManagerState> {
        Ok(self.snapshot().await?.state)
    }

    /// # Errors
    /// Returns error if the service has shut down.
    pub async fn status_table(&self) -> Result<DataTypeStatusTable> {
        Ok(self.snapshot().await?.status_table)
    }

    /// Ask the service to stop the manager and exit.
    ///
    /// # Errors
    /// Returns error if the service has already shut down.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(ManagerCommand::Shutdown).await
    }

    /// Send the command built around a fresh reply channel and wait for the
    /// result of the configure call it started.
    async fn request(
        &self,
        command: impl FnOnce(ResultReply) -> ManagerCommand,
    ) -> Result<Option<ConfigureResult>> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| {
            AppError::service_unavailable("Manager service stopped before the configuration finished")
        })
    }

    async fn send(&self, command: ManagerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::service_unavailable("Manager service is not running"))
    }
}
