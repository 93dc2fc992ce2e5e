use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::game::events::{LifecycleEvent, Notifier};
use crate::game::judgment::HitGrade;

pub const MIN_BASE_DURATION_S: f64 = 0.1;
const MIN_BEAT_INTERVAL_S: f64 = 0.001;

// Seconds gained or lost on the bonus countdown per judged hit.
pub const TIME_PERFECT: f64 = 0.15;
pub const TIME_GOOD: f64 = 0.05;
pub const TIME_MISS: f64 = 0.0;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRewards {
    pub perfect_bonus: f64,
    pub good_bonus: f64,
    /// Subtracted on Miss. Zero disables the penalty.
    pub miss_penalty: f64,
}

impl Default for TimeRewards {
    fn default() -> Self {
        Self {
            perfect_bonus: TIME_PERFECT,
            good_bonus: TIME_GOOD,
            miss_penalty: TIME_MISS,
        }
    }
}

impl TimeRewards {
    #[inline(always)]
    pub fn delta_for(&self, grade: HitGrade) -> f64 {
        // Hits only ever add time and misses only ever take it away.
        let v = match grade {
            HitGrade::Perfect => self.perfect_bonus.max(0.0),
            HitGrade::Good => self.good_bonus.max(0.0),
            HitGrade::Miss => -self.miss_penalty.max(0.0),
        };
        if v.is_finite() { v } else { 0.0 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Inactive,
    Active,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Succeeded,
    Failed,
}

/// Countdown state machine for one bonus event.
///
/// `Inactive -> Active -> Inactive`. Every lifecycle that was begun ends with
/// exactly one terminal notification, whether it succeeds, times out, or is
/// cancelled from outside.
#[derive(Debug)]
pub struct EventLifecycle {
    state: LifecycleState,
    remaining: f64,
    base_duration: f64,
    max_duration: f64,
    beat_interval: f64,
    beat_accum: f64,
    beat_index: u64,
    end_on_zero: bool,
    rewards: TimeRewards,
    events: Notifier<LifecycleEvent>,
}

impl EventLifecycle {
    pub fn new(rewards: TimeRewards, beat_interval: f64) -> Self {
        Self {
            state: LifecycleState::Inactive,
            remaining: 0.0,
            base_duration: MIN_BASE_DURATION_S,
            max_duration: MIN_BASE_DURATION_S,
            beat_interval: sanitize_interval(beat_interval),
            beat_accum: 0.0,
            beat_index: 0,
            end_on_zero: true,
            rewards,
            events: Notifier::new(),
        }
    }

    /// When disabled, the countdown parks at zero until `end_success` or
    /// `end_fail` is called.
    pub fn with_end_on_zero(mut self, end_on_zero: bool) -> Self {
        self.end_on_zero = end_on_zero;
        self
    }

    pub fn events_mut(&mut self) -> &mut Notifier<LifecycleEvent> {
        &mut self.events
    }

    #[inline(always)]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    #[inline(always)]
    pub const fn remaining(&self) -> f64 {
        self.remaining
    }

    #[inline(always)]
    pub const fn max_duration(&self) -> f64 {
        self.max_duration
    }

    #[inline(always)]
    pub const fn beat_index(&self) -> u64 {
        self.beat_index
    }

    /// Remaining time as a fraction of the base duration, clamped to `[0, 1]`.
    #[inline(always)]
    pub fn normalized(&self) -> f64 {
        (self.remaining / self.base_duration).clamp(0.0, 1.0)
    }

    /// Position within the current beat cycle, in `[0, 1)`.
    #[inline(always)]
    pub fn phase(&self) -> f64 {
        (self.beat_accum / self.beat_interval).clamp(0.0, 1.0 - f64::EPSILON)
    }

    pub fn set_beat_interval(&mut self, beat_interval: f64) {
        self.beat_interval = sanitize_interval(beat_interval);
    }

    /// Starts the countdown. Returns false (and changes nothing) when the
    /// lifecycle is already active.
    pub fn begin(&mut self, base_duration: f64, max_duration: f64) -> bool {
        if self.is_active() {
            debug!("EventLifecycle: begin ignored, already active");
            return false;
        }
        let base = if base_duration.is_finite() {
            base_duration.max(MIN_BASE_DURATION_S)
        } else {
            MIN_BASE_DURATION_S
        };
        let max = if max_duration.is_finite() { max_duration.max(base) } else { base };
        self.base_duration = base;
        self.max_duration = max;
        self.remaining = base.clamp(MIN_BASE_DURATION_S, max);
        self.beat_accum = 0.0;
        self.beat_index = 0;
        self.state = LifecycleState::Active;
        info!("Bonus event started: {:.2}s (max {:.2}s)", self.remaining, max);
        self.events.emit(&LifecycleEvent::Started {
            remaining: self.remaining,
        });
        self.emit_time_changed();
        true
    }

    /// Advances by a wall-clock `delta` (unaffected by any gameplay pause or
    /// slow motion). Returns the outcome when this tick ended the event.
    pub fn tick(&mut self, delta: f64) -> Option<EventOutcome> {
        if !self.is_active() {
            return None;
        }
        let delta = if delta.is_finite() { delta.max(0.0) } else { 0.0 };

        self.remaining = (self.remaining - delta).max(0.0);
        self.emit_time_changed();

        self.beat_accum += delta;
        while self.beat_accum >= self.beat_interval {
            self.beat_accum -= self.beat_interval;
            self.beat_index += 1;
            trace!("Bonus event beat {}", self.beat_index);
            self.events.emit(&LifecycleEvent::Beat {
                index: self.beat_index,
            });
        }

        if self.remaining <= 0.0 && self.end_on_zero {
            info!("Bonus event timed out");
            self.end_fail();
            return Some(EventOutcome::Failed);
        }
        None
    }

    /// Applies the time reward for one judged hit. No-op while inactive.
    pub fn report_hit(&mut self, grade: HitGrade) {
        if !self.is_active() {
            return;
        }
        let delta = self.rewards.delta_for(grade);
        if delta == 0.0 {
            return;
        }
        self.remaining = (self.remaining + delta).clamp(0.0, self.max_duration);
        trace!("Bonus event hit {grade:?}: {delta:+.3}s -> {:.3}s", self.remaining);
        self.emit_time_changed();
    }

    /// Returns false when the lifecycle was not active.
    pub fn end_success(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = LifecycleState::Inactive;
        info!("Bonus event succeeded with {:.2}s left", self.remaining);
        self.events.emit(&LifecycleEvent::Succeeded);
        true
    }

    /// Returns false when the lifecycle was not active. Safe to call from a
    /// teardown path at any time.
    pub fn end_fail(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = LifecycleState::Inactive;
        info!("Bonus event failed");
        self.events.emit(&LifecycleEvent::Failed);
        true
    }

    fn emit_time_changed(&mut self) {
        let event = LifecycleEvent::TimeChanged {
            remaining: self.remaining,
            normalized: self.normalized(),
        };
        self.events.emit(&event);
    }
}

#[inline(always)]
fn sanitize_interval(interval: f64) -> f64 {
    if interval.is_finite() {
        interval.max(MIN_BEAT_INTERVAL_S)
    } else {
        0.5
    }
}
