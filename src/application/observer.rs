//! Observer registration for configure notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{ConfigureResult, DataTypeConfigurationStats};

/// Receives the start and end of every configure call.
pub trait DataTypeManagerObserver: Send + Sync {
    /// Called once per configure call, before any type work begins.
    fn on_configure_start(&self);

    /// Called once per configure call with its terminal result.
    fn on_configure_done(&self, result: &ConfigureResult);

    /// The configurer is retrying a download.
    fn on_configure_retry(&self) {}
}

/// Receives per-type statistics when a configure call finishes.
pub trait DataTypeDebugInfoListener: Send + Sync {
    fn on_data_type_configure_complete(&self, stats: &[DataTypeConfigurationStats]);
}

/// Shared list of observers, notified in registration order.
///
/// Clones share the list, so an observer holding a clone may add or remove
/// observers while being notified. Removed observers are skipped for the
/// rest of the notification.
#[derive(Clone, Default)]
pub struct ObserverList {
    observers: Arc<Mutex<Vec<Arc<dyn DataTypeManagerObserver>>>>,
}

impl ObserverList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn DataTypeManagerObserver>) {
        let mut observers = self.lock();
        if !observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            observers.push(observer);
        }
    }

    /// Remove `observer`; returns whether it was registered.
    pub fn remove(&self, observer: &Arc<dyn DataTypeManagerObserver>) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke `f` on every observer registered when the call starts.
    pub fn notify(&self, f: impl Fn(&dyn DataTypeManagerObserver)) {
        let snapshot = self.lock().clone();
        for observer in &snapshot {
            let still_registered = self.lock().iter().any(|o| Arc::ptr_eq(o, observer));
            if still_registered {
                f(observer.as_ref());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn DataTypeManagerObserver>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::application::testing::RecordingObserver;
    use crate::domain::ConfigureStatus;

    struct RemovingObserver {
        list: ObserverList,
        victim: OnceLock<Arc<dyn DataTypeManagerObserver>>,
    }

    impl DataTypeManagerObserver for RemovingObserver {
        fn on_configure_start(&self) {
            if let Some(victim) = self.victim.get() {
                self.list.remove(victim);
            }
        }

        fn on_configure_done(&self, _result: &ConfigureResult) {}
    }

    #[test]
    fn test_notify_in_registration_order() {
        let list = ObserverList::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::new(RecordingObserver::with_log("first", Arc::clone(&log)));
        let second = Arc::new(RecordingObserver::with_log("second", Arc::clone(&log)));
        list.add(first.clone());
        list.add(second.clone());
        list.add(first.clone());

        list.notify(|o| o.on_configure_start());
        list.notify(|o| {
            o.on_configure_done(&ConfigureResult {
                status: ConfigureStatus::Ok,
                ..ConfigureResult::default()
            });
        });

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["first:start", "second:start", "first:done:OK", "second:done:OK"]
        );
    }

    #[test]
    fn test_removal_during_notification_skips_removed() {
        let list = ObserverList::new();
        let remover = Arc::new(RemovingObserver {
            list: list.clone(),
            victim: OnceLock::new(),
        });
        let recorder = Arc::new(RecordingObserver::default());
        let victim: Arc<dyn DataTypeManagerObserver> = recorder.clone();
        list.add(remover.clone());
        list.add(Arc::clone(&victim));
        assert!(remover.victim.set(Arc::clone(&victim)).is_ok());

        list.notify(|o| o.on_configure_start());

        assert_eq!(recorder.start_count(), 0);
        assert_eq!(list.len(), 1);
        assert!(!list.remove(&victim));
    }
}
