//! The contract between the manager and a single data type.
//!
//! A controller walks `NotRunning -> ModelStarting -> ModelLoaded ->
//! Associating -> Running`. `stop` returns it to `NotRunning` from anywhere.
//! A failed association leaves it `Disabled` until stopped. Controllers report
//! every outcome through the callbacks they are handed and never retry on
//! their own.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::events::{ModelLoadCallback, StartCallback, TypeErrorReporter};
use crate::domain::{DataType, ModelSafeGroup, TypeSet};

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerState {
    NotRunning,
    ModelStarting,
    ModelLoaded,
    Associating,
    Running,
    /// Association failed; waiting to be stopped.
    Disabled,
}

impl ControllerState {
    /// Whether the controller has work outstanding on another task.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::ModelStarting | Self::Associating)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotRunning => "NOT_RUNNING",
            Self::ModelStarting => "MODEL_STARTING",
            Self::ModelLoaded => "MODEL_LOADED",
            Self::Associating => "ASSOCIATING",
            Self::Running => "RUNNING",
            Self::Disabled => "DISABLED",
        };
        f.write_str(name)
    }
}

/// Per-type state machine driven by the association manager.
pub trait DataTypeController: Send {
    fn data_type(&self) -> DataType;

    fn state(&self) -> ControllerState;

    /// False while some external precondition of the type is missing.
    fn ready_for_start(&self) -> bool {
        true
    }

    /// Worker group the type's changes are applied on once active.
    fn model_safe_group(&self) -> ModelSafeGroup {
        self.data_type().default_group()
    }

    /// Called once when the manager takes ownership of the controller.
    fn on_registered(&mut self, _reporter: TypeErrorReporter) {}

    /// Begin loading the local model. `done` may run before this returns.
    fn load_models(&mut self, done: ModelLoadCallback);

    /// Reconcile local and remote data. Requires `ModelLoaded`.
    fn start_associating(&mut self, done: StartCallback);

    /// Tear down from any state. Idempotent.
    fn stop(&mut self);
}

/// Controllers owned by the manager, keyed by type.
pub type ControllerMap = BTreeMap<DataType, Box<dyn DataTypeController>>;

type ControllerFactory = Box<dyn Fn(DataType) -> Box<dyn DataTypeController> + Send>;

/// Factory map used to build the controller set for a manager.
#[derive(Default)]
pub struct ControllerRegistry {
    factories: BTreeMap<DataType, ControllerFactory>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `data_type`, replacing any earlier one.
    pub fn register<F>(&mut self, data_type: DataType, factory: F)
    where
        F: Fn(DataType) -> Box<dyn DataTypeController> + Send + 'static,
    {
        if data_type.is_control() {
            tracing::warn!(data_type = %data_type, "Control types are download-only; ignoring controller");
            return;
        }
        self.factories.insert(data_type, Box::new(factory));
    }

    /// Types with a registered factory.
    #[must_use]
    pub fn registered_types(&self) -> TypeSet {
        self.factories.keys().copied().collect()
    }

    /// Instantiate one controller per registered type.
    #[must_use]
    pub fn build(&self) -> ControllerMap {
        self.factories
            .iter()
            .map(|(data_type, factory)| (*data_type, factory(*data_type)))
            .collect()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakeDataTypeController;

    #[test]
    fn test_registry_builds_one_controller_per_type() {
        let mut registry = ControllerRegistry::new();
        registry.register(DataType::Bookmarks, |t| {
            Box::new(FakeDataTypeController::new(t).0)
        });
        registry.register(DataType::Preferences, |t| {
            Box::new(FakeDataTypeController::new(t).0)
        });
        registry.register(DataType::Nigori, |t| {
            Box::new(FakeDataTypeController::new(t).0)
        });

        assert_eq!(
            registry.registered_types(),
            TypeSet::of(&[DataType::Bookmarks, DataType::Preferences])
        );

        let controllers = registry.build();
        assert_eq!(controllers.len(), 2);
        assert_eq!(
            controllers[&DataType::Preferences].data_type(),
            DataType::Preferences
        );
        assert_eq!(
            controllers[&DataType::Bookmarks].state(),
            ControllerState::NotRunning
        );
    }
}
