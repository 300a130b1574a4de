//! Completion events and the callbacks that post them.
//!
//! Controllers and the configurer finish their work on other tasks. They
//! never touch manager state; they post a [`ManagerEvent`] onto the
//! manager's channel and the manager applies it on its own task. Every event
//! belonging to a configure pass carries that pass's [`Epoch`], so results
//! of superseded or stopped passes are recognized and dropped.

use std::fmt;

use tokio::sync::mpsc;

use crate::domain::{AssociationResult, DataType, SyncError, TypeSet};

/// Generation counter of configure passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that happened off the manager's task.
#[derive(Debug)]
pub enum ManagerEvent {
    /// The configurer finished downloading a band.
    DownloadReady {
        epoch: Epoch,
        band: usize,
        ready: TypeSet,
        failed: TypeSet,
    },
    /// The configurer is retrying a download.
    DownloadRetry { epoch: Epoch },
    /// A controller finished loading its model.
    ModelLoaded {
        epoch: Epoch,
        data_type: DataType,
        result: std::result::Result<(), SyncError>,
    },
    /// A controller finished associating.
    AssociationDone {
        epoch: Epoch,
        data_type: DataType,
        result: AssociationResult,
    },
    /// The association timer of a band fired.
    AssociationTimeout { epoch: Epoch, band: usize },
    /// A type reported a failure outside of any callback.
    TypeError { error: SyncError },
}

impl ManagerEvent {
    /// Epoch the event belongs to; `None` for events not tied to a pass.
    #[must_use]
    pub const fn epoch(&self) -> Option<Epoch> {
        match self {
            Self::DownloadReady { epoch, .. }
            | Self::DownloadRetry { epoch }
            | Self::ModelLoaded { epoch, .. }
            | Self::AssociationDone { epoch, .. }
            | Self::AssociationTimeout { epoch, .. } => Some(*epoch),
            Self::TypeError { .. } => None,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ManagerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ManagerEvent>;

pub(crate) fn post(events: &EventSender, event: ManagerEvent) {
    if let Err(err) = events.send(event) {
        tracing::debug!(event = ?err.0, "Manager is gone, dropping event");
    }
}

/// Reports the end of a model load. Runs at most once.
#[derive(Debug)]
pub struct ModelLoadCallback {
    events: EventSender,
    epoch: Epoch,
    data_type: DataType,
}

impl ModelLoadCallback {
    pub(crate) const fn new(events: EventSender, epoch: Epoch, data_type: DataType) -> Self {
        Self {
            events,
            epoch,
            data_type,
        }
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn run(self, result: std::result::Result<(), SyncError>) {
        post(
            &self.events,
            ManagerEvent::ModelLoaded {
                epoch: self.epoch,
                data_type: self.data_type,
                result,
            },
        );
    }
}

/// Reports the end of an association. Runs at most once.
#[derive(Debug)]
pub struct StartCallback {
    events: EventSender,
    epoch: Epoch,
    data_type: DataType,
}

impl StartCallback {
    pub(crate) const fn new(events: EventSender, epoch: Epoch, data_type: DataType) -> Self {
        Self {
            events,
            epoch,
            data_type,
        }
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn run(self, result: AssociationResult) {
        post(
            &self.events,
            ManagerEvent::AssociationDone {
                epoch: self.epoch,
                data_type: self.data_type,
                result,
            },
        );
    }
}

/// Reports that a band finished downloading. Runs at most once.
#[derive(Debug)]
pub struct DownloadReadyCallback {
    events: EventSender,
    epoch: Epoch,
    band: usize,
}

impl DownloadReadyCallback {
    pub(crate) const fn new(events: EventSender, epoch: Epoch, band: usize) -> Self {
        Self {
            events,
            epoch,
            band,
        }
    }

    /// `ready` types downloaded fine, `failed` types could not be downloaded.
    pub fn run(self, ready: TypeSet, failed: TypeSet) {
        post(
            &self.events,
            ManagerEvent::DownloadReady {
                epoch: self.epoch,
                band: self.band,
                ready,
                failed,
            },
        );
    }
}

/// Tells the manager the configurer is retrying. May run any number of times.
#[derive(Debug, Clone)]
pub struct DownloadRetryCallback {
    events: EventSender,
    epoch: Epoch,
}

impl DownloadRetryCallback {
    pub(crate) const fn new(events: EventSender, epoch: Epoch) -> Self {
        Self { events, epoch }
    }

    pub fn run(&self) {
        post(&self.events, ManagerEvent::DownloadRetry { epoch: self.epoch });
    }
}

/// Lets a data type report a failure at any time.
#[derive(Debug, Clone)]
pub struct TypeErrorReporter {
    events: EventSender,
    data_type: DataType,
}

impl TypeErrorReporter {
    pub(crate) const fn new(events: EventSender, data_type: DataType) -> Self {
        Self { events, data_type }
    }

    /// Report `error` against the type this reporter was handed to.
    /// Unrecoverable errors stop the manager.
    pub fn report(&self, error: SyncError) {
        let error = error.attributed_to(self.data_type);
        post(&self.events, ManagerEvent::TypeError { error });
    }
}
