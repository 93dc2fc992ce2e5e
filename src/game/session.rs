use log::{debug, info};
use rand::Rng;

use crate::game::beat_clock::{BeatClock, DEFAULT_BPM};
use crate::game::bonus_event::{EventLifecycle, EventOutcome, TimeRewards};
use crate::game::chance::{BonusSlot, LevelSource};
use crate::game::events::{Notifier, SessionEvent};
use crate::game::judgment::{HitGrade, HitJudge, Judgment};
use crate::game::schedule::{ScheduleConstraints, build_schedule};
use crate::game::spawn_chain::{ChainGate, roll_chain_count};
use crate::game::timing_stats::{
    GradeCounts, TimingStats, compute_grade_counts, compute_timing_stats,
};
use crate::game::timing_windows::JudgeWindows;

pub const DEFAULT_SESSION_SECONDS: f64 = 30.0;
pub const DEFAULT_BASE_DURATION_S: f64 = 6.0;
pub const DEFAULT_MAX_DURATION_S: f64 = 10.0;

/// Everything a session needs, already loaded from config.
#[derive(Clone, Debug)]
pub struct DirectorSettings {
    pub session_seconds: f64,
    pub bpm: f64,
    pub windows: JudgeWindows,
    pub auto_miss: bool,
    pub beats_per_note: u64,
    pub note_phase: u64,
    pub constraints: ScheduleConstraints,
    pub base_duration: f64,
    pub max_duration: f64,
    pub rewards: TimeRewards,
    pub end_on_zero: bool,
    pub slots: Vec<BonusSlot>,
    pub gate: Option<ChainGate>,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            session_seconds: DEFAULT_SESSION_SECONDS,
            bpm: DEFAULT_BPM,
            windows: JudgeWindows::default(),
            auto_miss: true,
            beats_per_note: 1,
            note_phase: 0,
            constraints: ScheduleConstraints::default(),
            base_duration: DEFAULT_BASE_DURATION_S,
            max_duration: DEFAULT_MAX_DURATION_S,
            rewards: TimeRewards::default(),
            end_on_zero: true,
            slots: Vec::new(),
            gate: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub rolled: usize,
    pub scheduled: usize,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub grades: GradeCounts,
    pub timing: TimingStats,
}

/// Drives one mining session: rolls the bonus chain, lays out the schedule
/// and runs at most one bonus event at a time while judging inputs.
///
/// Everything advances from [`BonusDirector::tick`]; nothing blocks and
/// nothing runs in the background.
pub struct BonusDirector<R: Rng> {
    settings: DirectorSettings,
    rng: R,
    clock: BeatClock,
    judge: HitJudge,
    lifecycle: EventLifecycle,
    start_time: f64,
    last_tick: f64,
    running: bool,
    schedule: Vec<f64>,
    next_occurrence: usize,
    deferred: bool,
    judgments: Vec<Judgment>,
    rolled: usize,
    succeeded: u32,
    failed: u32,
    skipped: u32,
    log_timer: f64,
    events: Notifier<SessionEvent>,
}

impl<R: Rng> BonusDirector<R> {
    pub fn new(settings: DirectorSettings, rng: R) -> Self {
        let clock = BeatClock::new(settings.bpm, 0.0);
        let judge = HitJudge::new(settings.windows, settings.auto_miss)
            .with_note_grouping(settings.beats_per_note, settings.note_phase);
        let lifecycle = EventLifecycle::new(settings.rewards, clock.beat_interval())
            .with_end_on_zero(settings.end_on_zero);
        Self {
            settings,
            rng,
            clock,
            judge,
            lifecycle,
            start_time: 0.0,
            last_tick: 0.0,
            running: false,
            schedule: Vec::new(),
            next_occurrence: 0,
            deferred: false,
            judgments: Vec::new(),
            rolled: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            log_timer: 0.0,
            events: Notifier::new(),
        }
    }

    pub fn events_mut(&mut self) -> &mut Notifier<SessionEvent> {
        &mut self.events
    }

    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut BeatClock {
        &mut self.clock
    }

    pub fn judge_mut(&mut self) -> &mut HitJudge {
        &mut self.judge
    }

    pub fn lifecycle(&self) -> &EventLifecycle {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut EventLifecycle {
        &mut self.lifecycle
    }

    pub fn schedule(&self) -> &[f64] {
        &self.schedule
    }

    #[inline(always)]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    #[inline(always)]
    pub fn elapsed(&self, now: f64) -> f64 {
        now - self.start_time
    }

    /// Begins a session at `now`: resets all per-session state, rolls the
    /// chain once and publishes the schedule.
    pub fn start(&mut self, now: f64, levels: Option<&dyn LevelSource>) -> &[f64] {
        let s = &self.settings;
        self.clock.restart(s.bpm, now);
        self.judge.reset(s.windows, s.auto_miss);
        self.lifecycle.end_fail();
        self.lifecycle.set_beat_interval(self.clock.beat_interval());

        self.rolled = roll_chain_count(&s.slots, s.gate.as_ref(), levels, &mut self.rng);
        self.schedule = build_schedule(
            self.rolled,
            s.session_seconds,
            &s.constraints,
            &mut self.rng,
        );
        self.next_occurrence = 0;
        self.deferred = false;
        self.judgments.clear();
        self.succeeded = 0;
        self.failed = 0;
        self.skipped = 0;
        self.log_timer = 0.0;
        self.start_time = now;
        self.last_tick = now;
        self.running = true;

        info!(
            "Session started: {:.1}s at {:.1} BPM, {} bonus event(s) scheduled at {:?}",
            self.settings.session_seconds,
            self.clock.bpm(),
            self.schedule.len(),
            self.schedule
        );
        self.events
            .emit(&SessionEvent::ScheduleReady(self.schedule.clone()));
        &self.schedule
    }

    /// Advances the session to `now`. Returns false once the session is over.
    pub fn tick(&mut self, now: f64) -> bool {
        if !self.running {
            return false;
        }
        let delta = (now - self.last_tick).max(0.0);
        self.last_tick = now;

        for index in self.clock.tick(now) {
            self.judge.on_beat(index, self.clock.beat_time(index));
        }
        for miss in self.judge.tick(now) {
            self.lifecycle.report_hit(miss.grade);
            self.judgments.push(miss);
        }

        if let Some(outcome) = self.lifecycle.tick(delta) {
            self.count_outcome(outcome);
        }

        let elapsed = self.elapsed(now);
        self.activate_due(elapsed);

        self.log_timer += delta;
        if self.log_timer >= 1.0 {
            debug!(
                "Time: {:.2}, Beat phase: {:.2}, Event: {}, Remaining: {:.2}",
                elapsed,
                self.clock.beat_phase(now),
                self.lifecycle.is_active(),
                self.lifecycle.remaining()
            );
            self.log_timer -= 1.0;
        }

        if elapsed >= self.settings.session_seconds {
            info!("Session time reached ({elapsed:.2}s)");
            self.finish();
            return false;
        }
        true
    }

    /// Starts the next due occurrence if no event is live. An occurrence that
    /// comes due behind a live event waits for it, and is dropped once the
    /// start window has closed.
    fn activate_due(&mut self, elapsed: f64) {
        let latest = self
            .settings
            .constraints
            .latest_start(self.settings.session_seconds);
        while let Some(&at) = self.schedule.get(self.next_occurrence) {
            if at > elapsed {
                return;
            }
            let waiting = self.lifecycle.is_active() || self.deferred;
            if waiting && elapsed > latest {
                self.next_occurrence += 1;
                self.deferred = false;
                self.skipped += 1;
                info!("Bonus event at {at:.2}s skipped; start window closed at {latest:.2}s");
                self.events.emit(&SessionEvent::EventSkipped { at });
                continue;
            }
            if self.lifecycle.is_active() {
                self.deferred = true;
                return;
            }
            self.next_occurrence += 1;
            self.deferred = false;
            self.lifecycle.set_beat_interval(self.clock.beat_interval());
            self.lifecycle
                .begin(self.settings.base_duration, self.settings.max_duration);
            return;
        }
    }

    /// Judges a player input at `now` and feeds the outcome to the live
    /// bonus event, if any.
    pub fn press(&mut self, now: f64) -> Option<Judgment> {
        if !self.running {
            return None;
        }
        let judgment = self.judge.judge_input(&self.clock, now);
        self.lifecycle.report_hit(judgment.grade);
        self.judgments.push(judgment.clone());
        Some(judgment)
    }

    /// External success signal (the big ore broke). Returns false when no
    /// event was live.
    pub fn succeed_event(&mut self) -> bool {
        let ended = self.lifecycle.end_success();
        if ended {
            self.count_outcome(EventOutcome::Succeeded);
        }
        ended
    }

    /// Force-fails the live event and drops pending auto-miss checks.
    pub fn cancel(&mut self) {
        if self.lifecycle.end_fail() {
            self.count_outcome(EventOutcome::Failed);
        }
        self.judge.cancel_pending();
    }

    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        self.clock.set_bpm(bpm, now);
        self.lifecycle.set_beat_interval(self.clock.beat_interval());
    }

    fn finish(&mut self) {
        self.cancel();
        self.running = false;
        let remaining = self.schedule.len() - self.next_occurrence;
        if remaining > 0 {
            debug!("{remaining} scheduled bonus event(s) never came due");
        }
        let summary = self.summary();
        info!(
            "Session over: rolled={}, scheduled={}, succeeded={}, failed={}, skipped={}, perfect={}, good={}, miss={}",
            summary.rolled,
            summary.scheduled,
            summary.succeeded,
            summary.failed,
            summary.skipped,
            summary.grades.perfect,
            summary.grades.good,
            summary.grades.miss
        );
    }

    fn count_outcome(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Succeeded => self.succeeded += 1,
            EventOutcome::Failed => self.failed += 1,
        }
    }

    pub fn judgments(&self) -> &[Judgment] {
        &self.judgments
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            rolled: self.rolled,
            scheduled: self.schedule.len(),
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            grades: compute_grade_counts(&self.judgments),
            timing: compute_timing_stats(&self.judgments),
        }
    }

    /// Count of qualifying (non-Miss) inputs recorded since `since_index`
    /// into [`BonusDirector::judgments`].
    pub fn qualifying_hits_since(&self, since_index: usize) -> usize {
        self.judgments
            .get(since_index..)
            .map_or(0, |js| js.iter().filter(|j| j.grade != HitGrade::Miss).count())
    }
}
