//! Drives model loading and association of one band at a time.
//!
//! The association manager owns every controller. It never records errors
//! itself: failures are handed back to the data type manager inside an
//! [`AssociationProgress`], together with the band result once the last
//! outstanding type of the band has reported or the band timer fired.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;

use super::controller::{ControllerMap, ControllerState, DataTypeController};
use super::events::{
    post, Epoch, EventSender, ManagerEvent, ModelLoadCallback, StartCallback, TypeErrorReporter,
};
use crate::domain::{
    AssociationOutcome, AssociationResult, BandPriority, DataType, DataTypeConfigurationStats,
    ModelSafeGroup, SyncError, TypeSet,
};

/// Timing context of a band, measured by the data type manager.
#[derive(Debug, Clone)]
pub struct BandContext {
    pub band: usize,
    pub priority: BandPriority,
    pub download_wait_time: Duration,
    pub download_time: Duration,
    /// Types configured by earlier high-priority bands of the same call.
    pub high_priority_types_configured_before: TypeSet,
}

/// What one band ended with.
#[derive(Debug, Clone, Default)]
pub struct BandResult {
    pub band: usize,
    /// Types that associated successfully in this band.
    pub associated: TypeSet,
    /// Subset of `associated` that had no remote data yet.
    pub first_run: TypeSet,
    /// Requested types that were already running and were left alone.
    pub already_running: TypeSet,
    pub failed: TypeSet,
    pub stats: Vec<DataTypeConfigurationStats>,
}

/// Result of feeding one event to the association manager.
#[derive(Debug, Default)]
#[must_use]
pub struct AssociationProgress {
    pub failures: Vec<SyncError>,
    /// Set once the active band has resolved.
    pub band: Option<BandResult>,
}

#[derive(Debug)]
struct ActiveBand {
    epoch: Epoch,
    context: BandContext,
    awaiting_load: TypeSet,
    associating: TypeSet,
    association_started: BTreeMap<DataType, Instant>,
    result: BandResult,
}

/// Owner of the controllers and the band association timer.
pub struct ModelAssociationManager {
    controllers: ControllerMap,
    events: EventSender,
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
    band: Option<ActiveBand>,
}

impl ModelAssociationManager {
    /// Take ownership of `controllers`, handing each an error reporter.
    #[must_use]
    pub fn new(mut controllers: ControllerMap, events: EventSender, timeout: Duration) -> Self {
        for (data_type, controller) in &mut controllers {
            controller.on_registered(TypeErrorReporter::new(events.clone(), *data_type));
        }
        Self {
            controllers,
            events,
            timeout,
            timer: None,
            band: None,
        }
    }

    #[must_use]
    pub fn registered_types(&self) -> TypeSet {
        self.controllers.keys().copied().collect()
    }

    #[must_use]
    pub fn controller_state(&self, data_type: DataType) -> Option<ControllerState> {
        self.controllers.get(&data_type).map(|c| c.state())
    }

    #[must_use]
    pub fn controller_states(&self) -> BTreeMap<DataType, ControllerState> {
        self.controllers
            .iter()
            .map(|(data_type, c)| (*data_type, c.state()))
            .collect()
    }

    #[must_use]
    pub fn running_types(&self) -> TypeSet {
        self.types_where(|c| c.state() == ControllerState::Running)
    }

    #[must_use]
    pub fn model_safe_group(&self, data_type: DataType) -> Option<ModelSafeGroup> {
        self.controllers.get(&data_type).map(|c| c.model_safe_group())
    }

    #[must_use]
    pub fn is_ready_for_start(&self, data_type: DataType) -> bool {
        self.controllers
            .get(&data_type)
            .is_some_and(|c| c.ready_for_start())
    }

    /// Prepare for a pass over `desired`.
    ///
    /// Stops every controller outside `desired` and every disabled one, and
    /// returns the undesired types that were not already stopped.
    pub fn initialize(&mut self, desired: &TypeSet) -> TypeSet {
        self.clear_band();

        let mut stopped = TypeSet::new();
        for (data_type, controller) in &mut self.controllers {
            let state = controller.state();
            if state == ControllerState::NotRunning {
                continue;
            }
            if !desired.contains(*data_type) {
                controller.stop();
                stopped.insert(*data_type);
            } else if state == ControllerState::Disabled {
                controller.stop();
            }
        }
        if !stopped.is_empty() {
            tracing::info!(types = %stopped, "Stopped types no longer desired");
        }
        stopped
    }

    /// Drop the active band and stop controllers with work in flight.
    ///
    /// Loaded and running controllers are kept for the next pass.
    pub fn abort(&mut self) -> TypeSet {
        self.clear_band();
        let in_flight = self.types_where(|c| c.state().is_in_flight());
        for data_type in in_flight.iter() {
            self.stop_type(data_type);
        }
        in_flight
    }

    /// Start loading models of `types`; returns the types not ready to start.
    pub fn load_models(&mut self, types: &TypeSet, epoch: Epoch) -> TypeSet {
        let mut unready = TypeSet::new();
        for data_type in types.iter() {
            let Some(controller) = self.controllers.get_mut(&data_type) else {
                continue;
            };
            if !controller.ready_for_start() {
                if controller.state() != ControllerState::NotRunning {
                    controller.stop();
                }
                unready.insert(data_type);
                continue;
            }
            if controller.state() == ControllerState::NotRunning {
                tracing::debug!(data_type = %data_type, epoch = %epoch, "Loading model");
                controller.load_models(ModelLoadCallback::new(
                    self.events.clone(),
                    epoch,
                    data_type,
                ));
            }
        }
        unready
    }

    /// Associate every controller of `types` that loaded its model.
    ///
    /// Running controllers are not associated again. Types still loading are
    /// associated once their load finishes.
    pub fn start_association(
        &mut self,
        types: &TypeSet,
        epoch: Epoch,
        context: BandContext,
    ) -> AssociationProgress {
        self.clear_band();

        let band_index = context.band;
        let mut band = ActiveBand {
            epoch,
            result: BandResult {
                band: band_index,
                ..BandResult::default()
            },
            context,
            awaiting_load: TypeSet::new(),
            associating: TypeSet::new(),
            association_started: BTreeMap::new(),
        };

        for data_type in types.iter() {
            let Some(controller) = self.controllers.get_mut(&data_type) else {
                continue;
            };
            match controller.state() {
                ControllerState::Running => {
                    band.result.already_running.insert(data_type);
                }
                ControllerState::ModelLoaded => {
                    begin_association(controller.as_mut(), &self.events, &mut band, data_type);
                }
                ControllerState::ModelStarting => {
                    band.awaiting_load.insert(data_type);
                }
                state => {
                    tracing::debug!(data_type = %data_type, %state, "Skipping association");
                }
            }
        }

        tracing::info!(
            band = band_index,
            epoch = %epoch,
            associating = %band.associating,
            awaiting_load = %band.awaiting_load,
            already_running = %band.result.already_running,
            "Association started"
        );

        let outstanding = !band.associating.is_empty() || !band.awaiting_load.is_empty();
        self.band = Some(band);
        if outstanding {
            self.arm_timer(epoch, band_index);
        }

        AssociationProgress {
            failures: Vec::new(),
            band: self.take_if_complete(),
        }
    }

    pub fn on_model_loaded(
        &mut self,
        epoch: Epoch,
        data_type: DataType,
        result: Result<(), SyncError>,
    ) -> AssociationProgress {
        let mut progress = AssociationProgress::default();
        let awaited = self
            .band
            .as_mut()
            .filter(|band| band.epoch == epoch)
            .is_some_and(|band| band.awaiting_load.remove(data_type));

        match result {
            Err(error) => {
                let error = error.attributed_to(data_type);
                tracing::warn!(data_type = %data_type, error = %error, "Model load failed");
                self.stop_type(data_type);
                if let Some(band) = self.band.as_mut().filter(|_| awaited) {
                    band.result.failed.insert(data_type);
                }
                progress.failures.push(error);
            }
            Ok(()) if awaited => {
                if let (Some(band), Some(controller)) =
                    (self.band.as_mut(), self.controllers.get_mut(&data_type))
                {
                    begin_association(controller.as_mut(), &self.events, band, data_type);
                }
            }
            Ok(()) => {
                tracing::debug!(data_type = %data_type, "Model loaded ahead of association");
            }
        }

        progress.band = self.take_if_complete();
        progress
    }

    pub fn on_association_done(
        &mut self,
        epoch: Epoch,
        data_type: DataType,
        result: AssociationResult,
    ) -> AssociationProgress {
        let mut progress = AssociationProgress::default();
        let Some(band) = self
            .band
            .as_mut()
            .filter(|band| band.epoch == epoch && band.associating.contains(data_type))
        else {
            tracing::debug!(data_type = %data_type, "Ignoring association result for type not associating");
            return progress;
        };
        band.associating.remove(data_type);

        let association_time = band
            .association_started
            .get(&data_type)
            .map(Instant::elapsed)
            .unwrap_or_default();

        if result.outcome.is_success() {
            tracing::info!(
                data_type = %data_type,
                outcome = %result.outcome,
                elapsed_ms = association_time.as_millis(),
                "Association finished"
            );
            band.result.stats.push(DataTypeConfigurationStats {
                data_type,
                priority: band.context.priority,
                configured_at: Utc::now(),
                download_wait_time: band.context.download_wait_time,
                download_time: band.context.download_time,
                association_time,
                high_priority_types_configured_before: band
                    .context
                    .high_priority_types_configured_before
                    .clone(),
                same_priority_types_configured_before: band.result.associated.clone(),
                local_merge_result: result.local_merge_result,
                syncer_merge_result: result.syncer_merge_result,
            });
            band.result.associated.insert(data_type);
            if result.outcome == AssociationOutcome::OkFirstRun {
                band.result.first_run.insert(data_type);
            }
        } else {
            let error = result.error.map_or_else(
                || error_for_outcome(result.outcome, data_type),
                |error| error.attributed_to(data_type),
            );
            tracing::warn!(data_type = %data_type, outcome = %result.outcome, error = %error, "Association failed");
            band.result.failed.insert(data_type);
            progress.failures.push(error);
            self.stop_type(data_type);
        }

        progress.band = self.take_if_complete();
        progress
    }

    /// Fail every type still outstanding in `band`.
    pub fn on_timeout(&mut self, epoch: Epoch, band_index: usize) -> AssociationProgress {
        let mut progress = AssociationProgress::default();
        let Some(band) = self
            .band
            .as_mut()
            .filter(|band| band.epoch == epoch && band.context.band == band_index)
        else {
            return progress;
        };
        self.timer = None;

        let stragglers = band.associating.union(&band.awaiting_load);
        tracing::warn!(band = band_index, types = %stragglers, "Association timed out");
        band.associating = TypeSet::new();
        band.awaiting_load = TypeSet::new();
        band.result.failed.put_all(&stragglers);

        for data_type in stragglers.iter() {
            self.stop_type(data_type);
            progress
                .failures
                .push(SyncError::datatype("Association timed out", data_type));
        }

        progress.band = self.take_if_complete();
        progress
    }

    /// Stop `data_type` and drop it from the active band.
    pub fn drop_type(&mut self, data_type: DataType) -> AssociationProgress {
        self.stop_type(data_type);
        if let Some(band) = self.band.as_mut() {
            let removed = band.associating.remove(data_type) | band.awaiting_load.remove(data_type);
            if removed {
                band.result.failed.insert(data_type);
            }
        }
        AssociationProgress {
            failures: Vec::new(),
            band: self.take_if_complete(),
        }
    }

    pub fn stop_type(&mut self, data_type: DataType) {
        if let Some(controller) = self.controllers.get_mut(&data_type) {
            controller.stop();
        }
    }

    /// Stop everything; returns the types that were not already stopped.
    pub fn stop_all(&mut self) -> TypeSet {
        self.clear_band();
        let stopped = self.types_where(|c| c.state() != ControllerState::NotRunning);
        for controller in self.controllers.values_mut() {
            controller.stop();
        }
        stopped
    }

    fn types_where(&self, predicate: impl Fn(&dyn DataTypeController) -> bool) -> TypeSet {
        self.controllers
            .iter()
            .filter(|(_, c)| predicate(c.as_ref()))
            .map(|(data_type, _)| *data_type)
            .collect()
    }

    fn take_if_complete(&mut self) -> Option<BandResult> {
        let complete = self
            .band
            .as_ref()
            .is_some_and(|band| band.associating.is_empty() && band.awaiting_load.is_empty());
        if !complete {
            return None;
        }
        self.cancel_timer();
        let band = self.band.take()?;
        tracing::info!(
            band = band.context.band,
            associated = %band.result.associated,
            failed = %band.result.failed,
            "Band resolved"
        );
        Some(band.result)
    }

    fn arm_timer(&mut self, epoch: Epoch, band: usize) {
        self.cancel_timer();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, association timer not armed");
            return;
        };
        let events = self.events.clone();
        let timeout = self.timeout;
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            post(&events, ManagerEvent::AssociationTimeout { epoch, band });
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn clear_band(&mut self) {
        self.cancel_timer();
        self.band = None;
    }
}

impl Drop for ModelAssociationManager {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

impl std::fmt::Debug for ModelAssociationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAssociationManager")
            .field("controllers", &self.controller_states())
            .field("timeout", &self.timeout)
            .field("band", &self.band)
            .finish_non_exhaustive()
    }
}

fn begin_association(
    controller: &mut dyn DataTypeController,
    events: &EventSender,
    band: &mut ActiveBand,
    data_type: DataType,
) {
    band.associating.insert(data_type);
    band.association_started.insert(data_type, Instant::now());
    controller.start_associating(StartCallback::new(events.clone(), band.epoch, data_type));
}

fn error_for_outcome(outcome: AssociationOutcome, data_type: DataType) -> SyncError {
    match outcome {
        AssociationOutcome::NeedsCrypto => SyncError::crypto("Cryptographer not ready", data_type),
        AssociationOutcome::UnrecoverableError => {
            SyncError::unrecoverable("Unrecoverable association error", data_type)
        }
        AssociationOutcome::Ok
        | AssociationOutcome::OkFirstRun
        | AssociationOutcome::AssociationFailed => {
            SyncError::datatype("Association failed", data_type)
        }
    }
}
