//! Per-type failure bookkeeping.
//!
//! Errors are sticky across configure cycles until a `reset_*` call clears
//! them. A type is in at most one bucket at a time.

use std::collections::BTreeMap;

use serde::Serialize;

use super::data_type::{DataType, TypeSet};
use super::error::{ErrorKind, SyncError};

/// Map of type to the error recorded against it.
pub type TypeErrorMap = BTreeMap<DataType, SyncError>;

/// Failed data types, partitioned by failure kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataTypeStatusTable {
    unrecoverable_errors: TypeErrorMap,
    data_type_errors: TypeErrorMap,
    crypto_errors: TypeErrorMap,
    persistence_errors: TypeErrorMap,
    unready_errors: TypeErrorMap,
    /// Most recent unrecoverable error, kept for diagnostics.
    unrecoverable_error: Option<SyncError>,
}

impl DataTypeStatusTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of errors in, moving each type to the bucket of its new kind.
    pub fn update_failed_data_types<'a, I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = &'a SyncError>,
    {
        for error in errors {
            let data_type = error.data_type();
            self.remove_everywhere(data_type);

            if error.kind() == ErrorKind::Unrecoverable {
                self.unrecoverable_error = Some(error.clone());
            }
            self.bucket_mut(error.kind()).insert(data_type, error.clone());
        }
    }

    /// Record a single error.
    pub fn record(&mut self, error: &SyncError) {
        self.update_failed_data_types(std::iter::once(error));
    }

    /// Clear every bucket.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Clear crypto errors; called once a passphrase becomes available.
    pub fn reset_crypto_errors(&mut self) {
        self.crypto_errors.clear();
    }

    /// Clear persistence errors for types whose data was purged.
    pub fn reset_persistence_errors_from(&mut self, purged_types: &TypeSet) {
        self.persistence_errors
            .retain(|data_type, _| !purged_types.contains(*data_type));
    }

    /// Clear every data-type error.
    pub fn reset_data_type_errors(&mut self) {
        self.data_type_errors.clear();
    }

    /// Clear the data-type error for `data_type`; returns whether one was present.
    pub fn reset_data_type_error_for(&mut self, data_type: DataType) -> bool {
        self.data_type_errors.remove(&data_type).is_some()
    }

    /// Clear the unready error for `data_type`; returns whether one was present.
    pub fn reset_unready_error_for(&mut self, data_type: DataType) -> bool {
        self.unready_errors.remove(&data_type).is_some()
    }

    /// All recorded errors, one per failed type.
    #[must_use]
    pub fn all_errors(&self) -> TypeErrorMap {
        self.buckets()
            .into_iter()
            .flat_map(|bucket| bucket.iter())
            .map(|(data_type, error)| (*data_type, error.clone()))
            .collect()
    }

    /// Union of every bucket.
    #[must_use]
    pub fn failed_types(&self) -> TypeSet {
        self.buckets()
            .into_iter()
            .flat_map(|bucket| bucket.keys().copied())
            .collect()
    }

    /// Types with unrecoverable or data-type errors.
    #[must_use]
    pub fn fatal_error_types(&self) -> TypeSet {
        self.unrecoverable_errors
            .keys()
            .chain(self.data_type_errors.keys())
            .copied()
            .collect()
    }

    #[must_use]
    pub fn unrecoverable_error_types(&self) -> TypeSet {
        self.unrecoverable_errors.keys().copied().collect()
    }

    #[must_use]
    pub fn data_type_error_types(&self) -> TypeSet {
        self.data_type_errors.keys().copied().collect()
    }

    #[must_use]
    pub fn crypto_error_types(&self) -> TypeSet {
        self.crypto_errors.keys().copied().collect()
    }

    #[must_use]
    pub fn persistence_error_types(&self) -> TypeSet {
        self.persistence_errors.keys().copied().collect()
    }

    #[must_use]
    pub fn unready_error_types(&self) -> TypeSet {
        self.unready_errors.keys().copied().collect()
    }

    /// The most recent unrecoverable error, if any.
    #[must_use]
    pub const fn unrecoverable_error(&self) -> Option<&SyncError> {
        self.unrecoverable_error.as_ref()
    }

    /// Error recorded for `data_type`, whichever bucket holds it.
    #[must_use]
    pub fn error_for(&self, data_type: DataType) -> Option<&SyncError> {
        self.buckets()
            .into_iter()
            .find_map(|bucket| bucket.get(&data_type))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets().iter().all(|bucket| bucket.is_empty())
    }

    fn remove_everywhere(&mut self, data_type: DataType) {
        self.unrecoverable_errors.remove(&data_type);
        self.data_type_errors.remove(&data_type);
        self.crypto_errors.remove(&data_type);
        self.persistence_errors.remove(&data_type);
        self.unready_errors.remove(&data_type);
    }

    fn bucket_mut(&mut self, kind: ErrorKind) -> &mut TypeErrorMap {
        match kind {
            ErrorKind::Unrecoverable => &mut self.unrecoverable_errors,
            ErrorKind::DataType => &mut self.data_type_errors,
            ErrorKind::Crypto => &mut self.crypto_errors,
            ErrorKind::Persistence => &mut self.persistence_errors,
            ErrorKind::Unready => &mut self.unready_errors,
        }
    }

    const fn buckets(&self) -> [&TypeErrorMap; 5] {
        [
            &self.unrecoverable_errors,
            &self.data_type_errors,
            &self.crypto_errors,
            &self.persistence_errors,
            &self.unready_errors,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_moves_type_between_buckets() {
        let mut table = DataTypeStatusTable::new();
        table.record(&SyncError::unready("not ready", DataType::Bookmarks));
        assert_eq!(
            table.unready_error_types(),
            TypeSet::of(&[DataType::Bookmarks])
        );

        table.record(&SyncError::datatype("failed", DataType::Bookmarks));
        assert!(table.unready_error_types().is_empty());
        assert_eq!(
            table.data_type_error_types(),
            TypeSet::of(&[DataType::Bookmarks])
        );
        assert_eq!(table.all_errors().len(), 1);
    }

    #[test]
    fn test_failed_types_is_union_of_buckets() {
        let mut table = DataTypeStatusTable::new();
        let errors = [
            SyncError::crypto("crypto", DataType::Passwords),
            SyncError::datatype("assoc", DataType::Bookmarks),
            SyncError::unready("unready", DataType::Apps),
            SyncError::persistence("persist", DataType::Themes),
        ];
        table.update_failed_data_types(&errors);

        assert_eq!(
            table.failed_types(),
            TypeSet::of(&[
                DataType::Passwords,
                DataType::Bookmarks,
                DataType::Apps,
                DataType::Themes,
            ])
        );
        assert_eq!(table.fatal_error_types(), TypeSet::of(&[DataType::Bookmarks]));
    }

    #[test]
    fn test_unrecoverable_slot_tracks_latest() {
        let mut table = DataTypeStatusTable::new();
        assert!(table.unrecoverable_error().is_none());

        table.record(&SyncError::unrecoverable("first", DataType::Bookmarks));
        table.record(&SyncError::unrecoverable("second", DataType::Preferences));

        let latest = table.unrecoverable_error().unwrap();
        assert_eq!(latest.message(), "second");
        assert_eq!(table.unrecoverable_error_types().len(), 2);
    }

    #[test]
    fn test_selective_resets() {
        let mut table = DataTypeStatusTable::new();
        let errors = [
            SyncError::crypto("crypto", DataType::Passwords),
            SyncError::datatype("assoc", DataType::Bookmarks),
            SyncError::unready("unready", DataType::Apps),
            SyncError::persistence("persist", DataType::Themes),
            SyncError::persistence("persist", DataType::Sessions),
        ];
        table.update_failed_data_types(&errors);

        table.reset_crypto_errors();
        assert!(table.crypto_error_types().is_empty());

        table.reset_persistence_errors_from(&TypeSet::of(&[DataType::Themes]));
        assert_eq!(
            table.persistence_error_types(),
            TypeSet::of(&[DataType::Sessions])
        );

        assert!(table.reset_data_type_error_for(DataType::Bookmarks));
        assert!(!table.reset_data_type_error_for(DataType::Bookmarks));
        assert!(table.reset_unready_error_for(DataType::Apps));
        assert!(!table.reset_unready_error_for(DataType::Apps));

        assert_eq!(table.failed_types(), TypeSet::of(&[DataType::Sessions]));

        table.reset();
        assert!(table.is_empty());
    }
}
