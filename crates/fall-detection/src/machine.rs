//! Slot state machine
//!
//! `advance` is a pure transition `(state, input) -> (state, effects)`.
//! Evidence capture and dispatch are returned as effects and executed by the
//! slot scheduler, which reports completion back as `EvidenceSettled`.

use crate::config::DetectionSettings;
use crate::keypoints::KeypointSet;
use crate::motion;
use crate::posture::{Detection, PostureClassifier, PostureVerdict};
use crate::state::{Countdown, Phase, SlotState};
use crate::SlotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One sampling tick
#[derive(Debug, Clone)]
pub struct Tick {
    /// Wall-clock time of the sample
    pub at: DateTime<Utc>,
    /// Skeleton estimate, `None` when nobody was detected
    pub keypoints: Option<KeypointSet>,
    /// Frame height in pixels
    pub frame_height: f32,
    /// Optional object detector output
    pub detections: Vec<Detection>,
}

impl Tick {
    pub fn new(at: DateTime<Utc>, keypoints: Option<KeypointSet>, frame_height: f32) -> Self {
        Self {
            at,
            keypoints,
            frame_height,
            detections: Vec::new(),
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = detections;
        self
    }
}

/// Inputs accepted by a slot
#[derive(Debug, Clone)]
pub enum SlotInput {
    Start,
    Stop,
    Tick(Tick),
    /// Evidence capture and dispatch for `alert_id` finished (success or not)
    EvidenceSettled { alert_id: Uuid, at: DateTime<Utc> },
}

/// Fall alert raised by a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub slot_id: SlotId,
    pub timestamp: DateTime<Utc>,
    pub last_keypoints: Option<KeypointSet>,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEffect {
    /// Start evidence capture and dispatch
    RaiseAlert(AlertEvent),
    /// Drop the in-flight capture for this alert
    AbortEvidence { alert_id: Uuid },
}

/// Apply one input to a slot state
pub fn advance(
    slot_id: SlotId,
    state: SlotState,
    input: SlotInput,
    settings: &DetectionSettings,
) -> (SlotState, Vec<SlotEffect>) {
    match input {
        SlotInput::Start => {
            if state.is_running() {
                (state, Vec::new())
            } else {
                (SlotState::monitoring(), Vec::new())
            }
        }
        SlotInput::Stop => {
            let effects = state
                .alert_in_flight()
                .map(|alert_id| SlotEffect::AbortEvidence { alert_id })
                .into_iter()
                .collect();
            (SlotState::default(), effects)
        }
        SlotInput::Tick(tick) => on_tick(slot_id, state, tick, settings),
        SlotInput::EvidenceSettled { alert_id, at } => {
            let next = match state.phase {
                Phase::Alerting { alert_id: current, .. } if current == alert_id => {
                    let until = at
                        .checked_add_signed(settings.cooldown())
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    SlotState {
                        phase: Phase::Cooldown { until },
                        ..state
                    }
                }
                // stale completion from an earlier session or alert
                _ => state,
            };
            (next, Vec::new())
        }
    }
}

fn on_tick(
    slot_id: SlotId,
    mut state: SlotState,
    tick: Tick,
    settings: &DetectionSettings,
) -> (SlotState, Vec<SlotEffect>) {
    if !state.is_running() {
        return (state, Vec::new());
    }

    let classifier = PostureClassifier::new(settings);

    let (movement, verdict) = match &tick.keypoints {
        Some(curr) => {
            let verdict = classifier.classify(curr, tick.frame_height);
            (
                motion::movement(state.last_keypoints.as_ref(), curr),
                classifier.apply_detections(verdict, &tick.detections),
            )
        }
        None => (None, PostureVerdict::Unknown),
    };

    let still = matches!(movement, Some(m) if m < settings.move_threshold());
    state.still_frames = if still {
        state.still_frames.saturating_add(1)
    } else {
        0
    };
    state.last_keypoints = tick.keypoints;

    let confirmed =
        verdict.is_lying() && settings.still_secs(state.still_frames) >= settings.confirmation_secs;

    let mut effects = Vec::new();
    state.phase = match state.phase {
        Phase::Idle => Phase::Idle,
        Phase::Monitoring | Phase::Confirming => arm(confirmed, tick.at, settings),
        Phase::Counting(countdown) => {
            if !confirmed {
                Phase::Monitoring
            } else {
                let remaining = countdown.remaining_at(tick.at, settings.countdown());
                if remaining <= chrono::TimeDelta::zero() {
                    let alert_id = Uuid::new_v4();
                    effects.push(SlotEffect::RaiseAlert(AlertEvent {
                        id: alert_id,
                        slot_id,
                        timestamp: tick.at,
                        last_keypoints: state.last_keypoints.clone(),
                    }));
                    state.still_frames = 0;
                    Phase::Alerting {
                        alert_id,
                        raised_at: tick.at,
                    }
                } else {
                    Phase::Counting(Countdown {
                        remaining,
                        ..countdown
                    })
                }
            }
        }
        alerting @ Phase::Alerting { .. } => alerting,
        Phase::Cooldown { until } => {
            if tick.at >= until {
                arm(confirmed, tick.at, settings)
            } else {
                Phase::Cooldown { until }
            }
        }
    };

    (state, effects)
}

/// Monitoring step: start the countdown once the confirmation floor is met
fn arm(confirmed: bool, at: DateTime<Utc>, settings: &DetectionSettings) -> Phase {
    if confirmed {
        // Confirming hands over to Counting on the same tick
        Phase::Counting(Countdown::start(at, settings.countdown()))
    } else {
        Phase::Monitoring
    }
}

/// Owns one slot's state and feeds it through `advance`
#[derive(Debug, Clone)]
pub struct SlotMachine {
    slot_id: SlotId,
    state: SlotState,
}

impl SlotMachine {
    pub fn new(slot_id: SlotId) -> Self {
        Self {
            slot_id,
            state: SlotState::default(),
        }
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn handle(&mut self, input: SlotInput, settings: &DetectionSettings) -> Vec<SlotEffect> {
        let state = std::mem::take(&mut self.state);
        let (next, effects) = advance(self.slot_id, state, input, settings);
        self.state = next;
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::{Keypoint, KeypointName};
    use crate::posture::tests::{lying_skeleton, standing_skeleton};
    use crate::posture::ObjectClass;
    use crate::state::SlotActivity;
    use chrono::TimeDelta;

    const H: f32 = 480.0;

    struct Harness {
        machine: SlotMachine,
        settings: DetectionSettings,
        t0: DateTime<Utc>,
        ticks: i64,
        alerts: Vec<(i64, AlertEvent)>,
    }

    impl Harness {
        fn new() -> Self {
            let settings = DetectionSettings::default();
            let mut machine = SlotMachine::new(3);
            machine.handle(SlotInput::Start, &settings);
            Self {
                machine,
                settings,
                t0: Utc::now(),
                ticks: 0,
                alerts: Vec::new(),
            }
        }

        /// Time of tick `n` at 10 Hz
        fn at(&self, n: i64) -> DateTime<Utc> {
            self.t0 + TimeDelta::milliseconds(100 * n)
        }

        fn now(&self) -> DateTime<Utc> {
            self.at(self.ticks)
        }

        fn feed(&mut self, keypoints: Option<KeypointSet>) -> Vec<SlotEffect> {
            let tick = Tick::new(self.now(), keypoints, H);
            self.feed_tick(tick)
        }

        fn feed_tick(&mut self, tick: Tick) -> Vec<SlotEffect> {
            let effects = self.machine.handle(SlotInput::Tick(tick), &self.settings);
            for effect in &effects {
                if let SlotEffect::RaiseAlert(event) = effect {
                    self.alerts.push((self.ticks, event.clone()));
                }
            }
            self.ticks += 1;
            effects
        }

        fn feed_n(&mut self, n: usize, keypoints: &KeypointSet) {
            for _ in 0..n {
                self.feed(Some(keypoints.clone()));
            }
        }

        fn settle_last_alert(&mut self) -> DateTime<Utc> {
            let (_, event) = self.alerts.last().unwrap().clone();
            let at = self.now();
            self.machine.handle(
                SlotInput::EvidenceSettled { alert_id: event.id, at },
                &self.settings,
            );
            at
        }

        fn phase(&self) -> Phase {
            self.machine.state().phase
        }
    }

    fn shifted(set: &KeypointSet, dx: f32) -> KeypointSet {
        KeypointSet::new(
            set.iter()
                .map(|k| Keypoint::new(k.name, k.x + dx, k.y, k.score))
                .collect(),
        )
    }

    #[test]
    fn test_idle_ignores_ticks() {
        let settings = DetectionSettings::default();
        let mut machine = SlotMachine::new(0);
        for _ in 0..400 {
            let tick = Tick::new(Utc::now(), Some(lying_skeleton()), H);
            assert!(machine.handle(SlotInput::Tick(tick), &settings).is_empty());
        }
        assert_eq!(*machine.state(), SlotState::default());
    }

    #[test]
    fn test_first_sample_never_counts_as_still() {
        let mut h = Harness::new();
        h.feed(Some(lying_skeleton()));
        assert_eq!(h.machine.state().still_frames, 0);
        h.feed(Some(lying_skeleton()));
        assert_eq!(h.machine.state().still_frames, 1);
    }

    #[test]
    fn test_single_alert_after_confirmation_and_countdown() {
        let mut h = Harness::new();
        let lying = lying_skeleton();

        // tick 0 has no comparison; ticks 1..=20 reach the 2 s floor
        h.feed_n(20, &lying);
        assert_eq!(h.phase(), Phase::Monitoring);

        h.feed(Some(lying.clone()));
        let countdown = *h.machine.state().countdown().unwrap();
        assert_eq!(countdown.started_at, h.at(20));
        assert_eq!(countdown.remaining_secs(), 30);

        // 299 more samples: still counting, no alert
        h.feed_n(299, &lying);
        assert!(h.alerts.is_empty());
        assert_eq!(h.machine.state().countdown().unwrap().remaining_secs(), 1);

        // the 300th sample after confirmation fires (t = 32 s)
        h.feed(Some(lying.clone()));
        assert_eq!(h.alerts.len(), 1);
        let (tick, event) = &h.alerts[0];
        assert_eq!(*tick, 320);
        assert_eq!(event.timestamp, h.t0 + TimeDelta::seconds(32));
        assert_eq!(event.slot_id, 3);
        assert_eq!(event.last_keypoints.as_ref(), Some(&lying));

        assert!(matches!(h.phase(), Phase::Alerting { alert_id, .. } if alert_id == event.id));
        assert_eq!(h.machine.state().still_frames, 0);
        assert_eq!(h.machine.state().status().activity, SlotActivity::Alerting);
    }

    #[test]
    fn test_interruption_restarts_from_scratch() {
        let mut h = Harness::new();
        let lying = lying_skeleton();

        h.feed_n(21, &lying);
        h.feed_n(150, &lying);
        assert!(h.machine.state().countdown().is_some());

        // one standing sample aborts the countdown
        h.feed(Some(standing_skeleton()));
        assert_eq!(h.phase(), Phase::Monitoring);
        assert!(h.machine.state().countdown().is_none());

        // back to lying: needs the full 2 s floor again
        let resumed_at = h.ticks;
        h.feed_n(20, &lying);
        assert_eq!(h.phase(), Phase::Monitoring);
        h.feed(Some(lying.clone()));
        assert_eq!(h.machine.state().countdown().unwrap().started_at, h.at(resumed_at + 20));

        // and the full 30 s countdown
        h.feed_n(299, &lying);
        assert!(h.alerts.is_empty());
        h.feed(Some(lying.clone()));
        assert_eq!(h.alerts.len(), 1);
        assert_eq!(h.alerts[0].0, resumed_at + 320);
    }

    #[test]
    fn test_movement_cancels_countdown() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(25, &lying);
        assert!(h.machine.state().countdown().is_some());

        h.feed(Some(shifted(&lying, 5.0)));
        assert_eq!(h.phase(), Phase::Monitoring);
        assert_eq!(h.machine.state().still_frames, 0);
    }

    #[test]
    fn test_missing_skeleton_resets_stillness() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(25, &lying);

        h.feed(None);
        assert_eq!(h.phase(), Phase::Monitoring);
        assert_eq!(h.machine.state().still_frames, 0);
        assert!(h.machine.state().last_keypoints.is_none());

        // the sample after a gap has nothing to compare against
        h.feed(Some(lying.clone()));
        assert_eq!(h.machine.state().still_frames, 0);
    }

    #[test]
    fn test_countdown_follows_wall_clock_not_ticks() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(21, &lying);
        let started = h.machine.state().countdown().unwrap().started_at;

        // a slow camera: one sample 31 s later still completes the countdown
        let late = Tick::new(started + TimeDelta::seconds(31), Some(lying.clone()), H);
        h.feed_tick(late);
        assert_eq!(h.alerts.len(), 1);
    }

    #[test]
    fn test_no_second_alert_during_alerting_or_cooldown() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(321, &lying);
        assert_eq!(h.alerts.len(), 1);

        // capture takes 20 s; subject stays down
        h.feed_n(200, &lying);
        assert_eq!(h.alerts.len(), 1);
        assert!(h.machine.state().alert_in_flight().is_some());

        let settled_at = h.settle_last_alert();
        let until = h.machine.state().cooldown_until().unwrap();
        assert_eq!(until, settled_at + TimeDelta::seconds(20));

        // through the whole cooldown
        while h.now() < until {
            h.feed(Some(lying.clone()));
            assert!(h.machine.state().countdown().is_none());
        }
        assert_eq!(h.alerts.len(), 1);

        // re-armed: a new countdown starts and eventually fires again
        h.feed(Some(lying.clone()));
        assert!(h.machine.state().countdown().is_some());
        h.feed_n(300, &lying);
        assert_eq!(h.alerts.len(), 2);
        assert_ne!(h.alerts[0].1.id, h.alerts[1].1.id);
    }

    #[test]
    fn test_cooldown_expires_back_to_monitoring() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(321, &lying);
        h.settle_last_alert();

        let until = h.machine.state().cooldown_until().unwrap();
        while h.now() < until {
            h.feed(Some(standing_skeleton()));
        }
        h.feed(Some(standing_skeleton()));
        assert_eq!(h.phase(), Phase::Monitoring);
    }

    #[test]
    fn test_stale_settlement_ignored() {
        let mut h = Harness::new();
        h.feed_n(321, &lying_skeleton());
        let before = h.phase();

        h.machine.handle(
            SlotInput::EvidenceSettled {
                alert_id: Uuid::new_v4(),
                at: h.now(),
            },
            &h.settings,
        );
        assert_eq!(h.phase(), before);
    }

    #[test]
    fn test_stop_mid_countdown_discards_everything() {
        let mut h = Harness::new();
        let lying = lying_skeleton();
        h.feed_n(200, &lying);
        assert!(h.machine.state().countdown().is_some());

        let effects = h.machine.handle(SlotInput::Stop, &h.settings);
        assert!(effects.is_empty());
        assert_eq!(*h.machine.state(), SlotState::default());

        h.machine.handle(SlotInput::Start, &h.settings);
        assert_eq!(*h.machine.state(), SlotState::monitoring());

        // nothing carried over: the next 320 samples do not alert
        h.feed_n(320, &lying);
        assert!(h.alerts.is_empty());
        h.feed(Some(lying.clone()));
        assert_eq!(h.alerts.len(), 1);
    }

    #[test]
    fn test_stop_while_alerting_aborts_evidence() {
        let mut h = Harness::new();
        h.feed_n(321, &lying_skeleton());
        let alert_id = h.alerts[0].1.id;

        let effects = h.machine.handle(SlotInput::Stop, &h.settings);
        assert_eq!(effects, vec![SlotEffect::AbortEvidence { alert_id }]);

        // the late completion must not leak into a restarted slot
        h.machine.handle(SlotInput::Start, &h.settings);
        h.machine.handle(
            SlotInput::EvidenceSettled { alert_id, at: h.now() },
            &h.settings,
        );
        assert_eq!(*h.machine.state(), SlotState::monitoring());
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut h = Harness::new();
        h.feed_n(10, &lying_skeleton());
        let before = h.machine.state().clone();
        h.machine.handle(SlotInput::Start, &h.settings);
        assert_eq!(*h.machine.state(), before);
    }

    #[test]
    fn test_zero_sensitivity_still_counts() {
        let mut h = Harness::new();
        h.settings.sensitivity = 0.0;
        let lying = lying_skeleton();

        // clamped sensitivity gives a generous threshold: small jitter stays still
        h.feed(Some(lying.clone()));
        h.feed(Some(shifted(&lying, 1.0)));
        assert_eq!(h.machine.state().still_frames, 1);
    }

    #[test]
    fn test_upright_detection_blocks_countdown() {
        let mut h = Harness::new();
        let upright = Detection {
            bbox: [250.0, 100.0, 120.0, 360.0],
            score: 0.9,
            class: ObjectClass::Person,
        };
        for _ in 0..100 {
            let tick = Tick::new(h.now(), Some(lying_skeleton()), H).with_detections(vec![upright.clone()]);
            h.feed_tick(tick);
        }
        assert_eq!(h.phase(), Phase::Monitoring);
        assert!(h.machine.state().still_frames >= 99);
    }

    #[test]
    fn test_unknown_posture_never_counts_down() {
        let mut h = Harness::new();
        let partial = KeypointSet::new(vec![
            Keypoint::new(KeypointName::LeftShoulder, 200.0, 400.0, 0.9),
            Keypoint::new(KeypointName::LeftHip, 320.0, 400.0, 0.9),
        ]);
        h.feed_n(400, &partial);
        assert_eq!(h.phase(), Phase::Monitoring);
        assert!(h.alerts.is_empty());
    }
}
