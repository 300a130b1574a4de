//! Collaborators the manager drives but does not own the logic of.

use crate::domain::{ConfigStateMap, ConfigureReason, DataType, ModelSafeGroup, TypeSet};

use super::events::{DownloadReadyCallback, DownloadRetryCallback};

/// Download and activation handshake with the sync engine.
pub trait DataTypeConfigurer: Send {
    /// Request downloads for the `ConfigureActive` types in `states`.
    ///
    /// `ready` runs once, later, with the types that downloaded and the types
    /// that failed to. `retry` may run any number of times before that.
    /// Returns the types that were already downloaded when the call was made.
    fn configure_data_types(
        &mut self,
        reason: ConfigureReason,
        states: &ConfigStateMap,
        ready: DownloadReadyCallback,
        retry: DownloadRetryCallback,
    ) -> TypeSet;

    /// Wire the type's change stream to `group`.
    fn activate_data_type(&mut self, data_type: DataType, group: ModelSafeGroup);

    /// Unwire the type's change stream.
    fn deactivate_data_type(&mut self, data_type: DataType);
}

/// Encryption state polled at every restart.
pub trait DataTypeEncryptionHandler: Send + Sync {
    fn is_passphrase_required(&self) -> bool;

    fn encrypted_data_types(&self) -> TypeSet;
}
