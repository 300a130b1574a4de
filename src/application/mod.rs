//! Application layer - state machines and orchestration.
//!
//! This layer contains the controllers, the association manager, the data
//! type manager and the async service wrapping it.

pub mod association;
pub mod configurer;
pub mod controller;
pub mod events;
pub mod manager;
pub mod observer;
pub mod report;
pub mod service;
pub mod type_controller;

#[cfg(test)]
pub mod testing;

pub use association::{AssociationProgress, BandContext, BandResult, ModelAssociationManager};
pub use configurer::{DataTypeConfigurer, DataTypeEncryptionHandler};
pub use controller::{ControllerMap, ControllerRegistry, ControllerState, DataTypeController};
pub use events::{
    DownloadReadyCallback, DownloadRetryCallback, Epoch, ManagerEvent, ModelLoadCallback,
    StartCallback, TypeErrorReporter,
};
pub use manager::{DataTypeManager, ManagerState};
pub use observer::{DataTypeDebugInfoListener, DataTypeManagerObserver, ObserverList};
pub use report::{
    format_report_json, format_report_table, format_types_table, ConfigureReport,
    DownloadRecord, OutputFormat, StatsCollector,
};
pub use service::{
    ManagerCommand, ManagerHandle, ManagerNotification, ManagerService, ManagerSnapshot,
    ResultReply,
};
pub use type_controller::{DataTypeModel, ModelAssociation, TypeController};
