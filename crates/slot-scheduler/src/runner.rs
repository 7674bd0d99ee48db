//! Sampling loop for a single slot

use crate::{SchedulerConfig, SlotResources};
use alerting::{capture_and_dispatch, AlertDispatcher, DeliveryOutcome, EvidenceCapture};
use camera_capture::{FrameSource, VideoFrame};
use chrono::{DateTime, TimeDelta, Utc};
use fall_detection::{
    DetectionSettings, ObjectDetector, PoseEstimator, SlotEffect, SlotId, SlotInput, SlotMachine,
    SlotStatus, Tick,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Wall clock anchored at loop start and advanced monotonically,
/// so countdowns are immune to system clock steps
#[derive(Debug, Clone, Copy)]
struct SlotClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl SlotClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.mono.elapsed())
            .ok()
            .and_then(|elapsed| self.wall.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Completion report from an evidence task
#[derive(Debug)]
struct Settled {
    alert_id: Uuid,
    outcome: DeliveryOutcome,
}

/// Why a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitReason {
    Stopped,
    SourceLost,
}

/// Drives one slot's state machine from its frame source
pub(crate) struct SlotRunner<F, P, D, A> {
    slot_id: SlotId,
    machine: SlotMachine,
    resources: SlotResources<F, P, D, A>,
    capture: Arc<EvidenceCapture<F>>,
    config: SchedulerConfig,
    settings: watch::Receiver<DetectionSettings>,
    status: Arc<watch::Sender<SlotStatus>>,
    clock: SlotClock,
    last_frame: Option<VideoFrame>,
    source_failures: u32,
    evidence: Option<(Uuid, JoinHandle<()>)>,
    settled_tx: mpsc::Sender<Settled>,
    settled_rx: mpsc::Receiver<Settled>,
}

impl<F, P, D, A> SlotRunner<F, P, D, A>
where
    F: FrameSource,
    P: PoseEstimator,
    D: ObjectDetector,
    A: AlertDispatcher,
{
    pub(crate) fn new(
        slot_id: SlotId,
        resources: SlotResources<F, P, D, A>,
        config: SchedulerConfig,
        settings: watch::Receiver<DetectionSettings>,
        status: Arc<watch::Sender<SlotStatus>>,
    ) -> Self {
        let capture = Arc::new(EvidenceCapture::new(
            resources.source.clone(),
            config.capture.clone(),
        ));
        let (settled_tx, settled_rx) = mpsc::channel(4);

        let mut runner = Self {
            slot_id,
            machine: SlotMachine::new(slot_id),
            resources,
            capture,
            config,
            settings,
            status,
            clock: SlotClock::start(),
            last_frame: None,
            source_failures: 0,
            evidence: None,
            settled_tx,
            settled_rx,
        };

        // monitoring is visible before the loop is first polled
        let settings = runner.settings.borrow().clone();
        runner.apply(SlotInput::Start, &settings);
        runner
    }

    /// Run until stopped or the source is lost; always ends idle
    pub(crate) async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> ExitReason {
        let settings = self.settings.borrow().clone();
        let mut interval = tokio::time::interval(sample_period(&settings));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Slot {}: monitoring at {:?} per sample",
            self.slot_id,
            interval.period()
        );

        let reason = loop {
            tokio::select! {
                _ = &mut stop_rx => break ExitReason::Stopped,
                Some(settled) = self.settled_rx.recv() => {
                    self.on_settled(settled);
                }
                _ = interval.tick() => {
                    // a sample may wait on camera and pose timeouts
                    tokio::select! {
                        biased;
                        _ = &mut stop_rx => break ExitReason::Stopped,
                        alive = self.tick() => {
                            if !alive {
                                break ExitReason::SourceLost;
                            }
                        }
                    }
                }
            }
        };

        let settings = self.settings.borrow().clone();
        self.apply(SlotInput::Stop, &settings);
        info!("Slot {}: stopped ({:?})", self.slot_id, reason);
        reason
    }

    /// One sample; false once the source is considered lost
    async fn tick(&mut self) -> bool {
        let settings = self.settings.borrow().clone();

        let frame = match self.resources.source.next_frame().await {
            Ok(frame) => {
                if self.source_failures > 0 {
                    info!(
                        "Slot {}: frame source recovered after {} failures",
                        self.slot_id, self.source_failures
                    );
                }
                self.source_failures = 0;
                frame
            }
            Err(e) => {
                self.source_failures += 1;
                if self.source_failures >= self.config.max_source_failures {
                    error!(
                        "Slot {}: frame source lost after {} consecutive failures: {}",
                        self.slot_id, self.source_failures, e
                    );
                    return false;
                }
                debug!(
                    "Slot {}: frame unavailable ({}): {}",
                    self.slot_id, self.source_failures, e
                );
                return true;
            }
        };

        let keypoints = match self.resources.estimator.estimate(&frame).await {
            Ok(keypoints) => keypoints,
            Err(e) => {
                warn!("Slot {}: pose estimation failed, skipping sample: {}", self.slot_id, e);
                return true;
            }
        };

        let detections = match self.resources.detector.detect(&frame).await {
            Ok(detections) => detections,
            Err(e) => {
                debug!("Slot {}: object detection failed: {}", self.slot_id, e);
                Vec::new()
            }
        };

        let tick = Tick::new(self.clock.now(), keypoints, frame.height as f32)
            .with_detections(detections);
        self.last_frame = Some(frame);
        self.apply(SlotInput::Tick(tick), &settings);
        true
    }

    fn on_settled(&mut self, settled: Settled) {
        debug!(
            "Slot {}: alert {} settled: {:?}",
            self.slot_id, settled.alert_id, settled.outcome
        );
        if self
            .evidence
            .as_ref()
            .is_some_and(|(id, _)| *id == settled.alert_id)
        {
            self.evidence = None;
        }

        let settings = self.settings.borrow().clone();
        self.apply(
            SlotInput::EvidenceSettled {
                alert_id: settled.alert_id,
                at: self.clock.now(),
            },
            &settings,
        );
    }

    fn apply(&mut self, input: SlotInput, settings: &DetectionSettings) {
        let before = self.machine.state().phase;
        let effects = self.machine.handle(input, settings);
        let after = self.machine.state().phase;

        if before.name() != after.name() {
            info!("Slot {}: {} -> {}", self.slot_id, before, after);
        }

        for effect in effects {
            match effect {
                SlotEffect::RaiseAlert(event) => {
                    warn!("Slot {}: FALL ALERT {}", self.slot_id, event.id);
                    metrics::counter!("fallwatch_alerts_total", "slot" => self.slot_id.to_string())
                        .increment(1);
                    self.spawn_evidence(event);
                }
                SlotEffect::AbortEvidence { alert_id } => {
                    if let Some((id, handle)) = self.evidence.take() {
                        if id == alert_id {
                            info!("Slot {}: aborting evidence for alert {}", self.slot_id, id);
                            handle.abort();
                        } else {
                            self.evidence = Some((id, handle));
                        }
                    }
                }
            }
        }

        self.status.send_replace(self.machine.state().status());
    }

    fn spawn_evidence(&mut self, event: fall_detection::AlertEvent) {
        let capture = self.capture.clone();
        let dispatcher = self.resources.dispatcher.clone();
        let settled_tx = self.settled_tx.clone();
        let frame = self.last_frame.clone();
        let alert_id = event.id;

        let handle = tokio::spawn(async move {
            let outcome = capture_and_dispatch(capture.as_ref(), dispatcher.as_ref(), &event, frame).await;
            // runner gone means the slot was stopped
            let _ = settled_tx.send(Settled { alert_id, outcome }).await;
        });

        if let Some((old, previous)) = self.evidence.replace((alert_id, handle)) {
            debug!("Slot {}: alert {} still in flight, detaching", self.slot_id, old);
            drop(previous);
        }
    }
}

/// Tick period for the configured sample rate
pub(crate) fn sample_period(settings: &DetectionSettings) -> Duration {
    let hz = settings.sample_rate_hz;
    if hz.is_finite() && hz > 0.0 {
        Duration::from_secs_f64(1.0 / f64::from(hz.min(1000.0)))
    } else {
        Duration::from_millis(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_period() {
        assert_eq!(sample_period(&DetectionSettings::default()), Duration::from_millis(100));
        let broken = DetectionSettings {
            sample_rate_hz: f32::NAN,
            ..Default::default()
        };
        assert_eq!(sample_period(&broken), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_monotonic_time() {
        let clock = SlotClock::start();
        let t0 = clock.now();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.now() - t0, TimeDelta::seconds(5));
    }
}
