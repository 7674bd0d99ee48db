//! Slot registry and lifecycle

use crate::runner::{ExitReason, SlotRunner};
use crate::{SchedulerConfig, SchedulerError, SlotResources};
use alerting::AlertDispatcher;
use camera_capture::FrameSource;
use fall_detection::{DetectionSettings, ObjectDetector, PoseEstimator, SlotId, SlotStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct RunningSlot {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<ExitReason>,
}

struct SlotContext<F, P, D, A> {
    resources: SlotResources<F, P, D, A>,
    settings: watch::Sender<DetectionSettings>,
    status: Arc<watch::Sender<SlotStatus>>,
    running: Option<RunningSlot>,
}

impl<F, P, D, A> SlotContext<F, P, D, A> {
    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

/// Registry of camera slots, each with its own sampling loop
pub struct SlotManager<F, P, D, A> {
    config: SchedulerConfig,
    slots: BTreeMap<SlotId, SlotContext<F, P, D, A>>,
}

impl<F, P, D, A> SlotManager<F, P, D, A>
where
    F: FrameSource,
    P: PoseEstimator,
    D: ObjectDetector,
    A: AlertDispatcher,
{
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            slots: BTreeMap::new(),
        }
    }

    /// Register a slot; it stays idle until started
    pub fn add_slot(
        &mut self,
        slot_id: SlotId,
        resources: SlotResources<F, P, D, A>,
        settings: DetectionSettings,
    ) -> Result<(), SchedulerError> {
        if self.slots.contains_key(&slot_id) {
            return Err(SchedulerError::DuplicateSlot(slot_id));
        }

        let (settings, _) = watch::channel(settings);
        let (status, _) = watch::channel(SlotStatus::default());
        self.slots.insert(
            slot_id,
            SlotContext {
                resources,
                settings,
                status: Arc::new(status),
                running: None,
            },
        );
        info!("Slot {} registered ({} total)", slot_id, self.slots.len());
        Ok(())
    }

    /// Start monitoring. Returns false if the slot was already running.
    pub fn start(&mut self, slot_id: SlotId) -> Result<bool, SchedulerError> {
        let config = self.config.clone();
        let ctx = self.context_mut(slot_id)?;
        if ctx.is_running() {
            return Ok(false);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let runner = SlotRunner::new(
            slot_id,
            ctx.resources.clone(),
            config,
            ctx.settings.subscribe(),
            ctx.status.clone(),
        );
        let handle = tokio::spawn(runner.run(stop_rx));
        ctx.running = Some(RunningSlot { stop_tx, handle });

        info!("Slot {} started", slot_id);
        Ok(true)
    }

    /// Stop monitoring and wait for the loop to wind down.
    /// Returns false if the slot was not running.
    pub async fn stop(&mut self, slot_id: SlotId) -> Result<bool, SchedulerError> {
        let ctx = self.context_mut(slot_id)?;
        let Some(running) = ctx.running.take() else {
            return Ok(false);
        };

        // the loop may already have exited on its own
        let _ = running.stop_tx.send(());
        match running.handle.await {
            Ok(ExitReason::Stopped) => {
                info!("Slot {} stopped", slot_id);
                Ok(true)
            }
            Ok(ExitReason::SourceLost) => Ok(false),
            Err(e) => {
                warn!("Slot {} loop ended abnormally: {}", slot_id, e);
                ctx.status.send_replace(SlotStatus::default());
                Ok(true)
            }
        }
    }

    /// Stop every running slot
    pub async fn stop_all(&mut self) {
        let ids: Vec<SlotId> = self.slots.keys().copied().collect();
        for slot_id in ids {
            // ids come from the registry itself
            let _ = self.stop(slot_id).await;
        }
    }

    pub fn is_running(&self, slot_id: SlotId) -> Result<bool, SchedulerError> {
        Ok(self.context(slot_id)?.is_running())
    }

    /// Change sensitivity; picked up on the next tick.
    /// Returns the effective (floored) sensitivity.
    pub fn set_sensitivity(&self, slot_id: SlotId, sensitivity: f32) -> Result<f32, SchedulerError> {
        if !sensitivity.is_finite() {
            return Err(SchedulerError::InvalidSensitivity(sensitivity));
        }
        let ctx = self.context(slot_id)?;
        ctx.settings.send_modify(|settings| settings.sensitivity = sensitivity);

        let effective = ctx.settings.borrow().effective_sensitivity();
        info!("Slot {} sensitivity set to {} (effective {})", slot_id, sensitivity, effective);
        Ok(effective)
    }

    pub fn settings(&self, slot_id: SlotId) -> Result<DetectionSettings, SchedulerError> {
        Ok(self.context(slot_id)?.settings.borrow().clone())
    }

    pub fn status(&self, slot_id: SlotId) -> Result<SlotStatus, SchedulerError> {
        Ok(self.context(slot_id)?.status.borrow().clone())
    }

    /// Status of every slot, ordered by id
    pub fn statuses(&self) -> Vec<(SlotId, SlotStatus)> {
        self.slots
            .iter()
            .map(|(id, ctx)| (*id, ctx.status.borrow().clone()))
            .collect()
    }

    /// Follow a slot's status changes
    pub fn subscribe(&self, slot_id: SlotId) -> Result<watch::Receiver<SlotStatus>, SchedulerError> {
        Ok(self.context(slot_id)?.status.subscribe())
    }

    fn context(&self, slot_id: SlotId) -> Result<&SlotContext<F, P, D, A>, SchedulerError> {
        self.slots
            .get(&slot_id)
            .ok_or(SchedulerError::UnknownSlot(slot_id))
    }

    fn context_mut(&mut self, slot_id: SlotId) -> Result<&mut SlotContext<F, P, D, A>, SchedulerError> {
        self.slots
            .get_mut(&slot_id)
            .ok_or(SchedulerError::UnknownSlot(slot_id))
    }
}
