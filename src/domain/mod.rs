//! Domain layer - core value types.
//!
//! This layer contains pure data types, the status table and error types
//! without any async machinery or I/O.

pub mod config;
pub mod configure;
pub mod data_type;
pub mod error;
pub mod status_table;

pub use config::{
    AppConfig, ManagerConfig, PathConfig, SimulatedAssociation, SimulatedTypeConfig,
    SimulationConfig,
};
pub use configure::{
    types_in_state, AssociationOutcome, AssociationResult, BandPriority, ConfigState,
    ConfigStateMap, ConfigureReason, ConfigureResult, ConfigureStatus,
    DataTypeConfigurationStats, SyncMergeResult,
};
pub use data_type::{control_types, DataType, ModelSafeGroup, TypeSet};
pub use error::{AppError, ErrorKind, Result, SyncError};
pub use status_table::{DataTypeStatusTable, TypeErrorMap};
