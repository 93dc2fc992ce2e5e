use std::collections::VecDeque;

use log::{debug, info};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::game::beat_clock::BeatClock;
use crate::game::events::{JudgeEvent, Notifier};
use crate::game::timing_windows::JudgeWindows;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HitGrade {
    Perfect,
    Good,
    Miss,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Judgment {
    pub time_error_s: f64, // Signed: positive when the input came after the beat
    pub grade: HitGrade,
    pub beat_index: u64,
    pub auto: bool, // Synthesized by the auto-miss check, not by an input
}

/// Classifies an absolute timing error. Window edges are inclusive.
#[inline(always)]
pub fn judge(windows: &JudgeWindows, offset_s: f64) -> HitGrade {
    let offset_s = offset_s.abs();
    if offset_s <= windows.perfect_s() {
        HitGrade::Perfect
    } else if offset_s <= windows.good_s() {
        HitGrade::Good
    } else {
        HitGrade::Miss
    }
}

#[derive(Copy, Clone, Debug)]
struct PendingCheck {
    due: f64,
    beat_index: u64,
}

/// Judges inputs against a [`BeatClock`] and, optionally, synthesizes one
/// Miss per judged beat that nobody hit within the good window.
///
/// Auto-miss checks are time-stamped entries evaluated in [`HitJudge::tick`];
/// nothing runs asynchronously.
#[derive(Debug)]
pub struct HitJudge {
    windows: JudgeWindows,
    auto_miss: bool,
    beats_per_note: u64,
    note_phase: u64,
    satisfied: FxHashSet<u64>,
    pending: VecDeque<PendingCheck>,
    events: Notifier<JudgeEvent>,
}

impl HitJudge {
    pub fn new(windows: JudgeWindows, auto_miss: bool) -> Self {
        Self {
            windows,
            auto_miss,
            beats_per_note: 1,
            note_phase: 0,
            satisfied: FxHashSet::default(),
            pending: VecDeque::new(),
            events: Notifier::new(),
        }
    }

    /// Only judge every `beats_per_note`-th beat, starting at `phase`.
    /// A zero period is treated as 1; the phase is taken modulo the period.
    pub fn with_note_grouping(mut self, beats_per_note: u64, phase: u64) -> Self {
        self.beats_per_note = beats_per_note.max(1);
        self.note_phase = phase % self.beats_per_note;
        self
    }

    #[inline(always)]
    pub const fn windows(&self) -> &JudgeWindows {
        &self.windows
    }

    pub fn events_mut(&mut self) -> &mut Notifier<JudgeEvent> {
        &mut self.events
    }

    #[inline(always)]
    pub const fn is_judged_beat(&self, beat_index: u64) -> bool {
        beat_index % self.beats_per_note == self.note_phase
    }

    pub fn pending_checks(&self) -> usize {
        self.pending.len()
    }

    /// Call once per beat boundary fired by the clock.
    pub fn on_beat(&mut self, beat_index: u64, beat_time: f64) {
        if !self.auto_miss || !self.is_judged_beat(beat_index) {
            return;
        }
        self.pending.push_back(PendingCheck {
            due: beat_time + self.windows.good_s(),
            beat_index,
        });
    }

    /// Nearest judged beat to `now` as `(index, time)`.
    fn nearest_note(&self, clock: &BeatClock, now: f64) -> (u64, f64) {
        let period = self.beats_per_note as f64;
        let phase = self.note_phase as f64;
        let position = clock.beat_position(now);
        let steps = ((position - phase) / period).round().max(0.0);
        let index = self.note_phase + steps as u64 * self.beats_per_note;
        (index, clock.beat_time(index))
    }

    /// Judges a player input at `now` and marks its beat satisfied when the
    /// grade is not Miss.
    pub fn judge_input(&mut self, clock: &BeatClock, now: f64) -> Judgment {
        let (beat_index, beat_time) = self.nearest_note(clock, now);
        let time_error_s = now - beat_time;
        let grade = judge(&self.windows, time_error_s);
        if grade != HitGrade::Miss && self.auto_miss {
            self.satisfied.insert(beat_index);
        }
        debug!(
            "Input at {now:.4}: beat={beat_index}, offset_ms={:.2}, grade={grade:?}",
            time_error_s * 1000.0
        );
        let judgment = Judgment {
            time_error_s,
            grade,
            beat_index,
            auto: false,
        };
        self.events.emit(&JudgeEvent::Judged(judgment.clone()));
        judgment
    }

    /// Resolves every auto-miss check whose window closed before `now`. An
    /// input landing exactly on the window edge still counts.
    pub fn tick(&mut self, now: f64) -> SmallVec<[Judgment; 2]> {
        let mut misses = SmallVec::new();
        while let Some(check) = self.pending.front().copied() {
            if check.due >= now {
                break;
            }
            self.pending.pop_front();
            let was_satisfied = self.satisfied.remove(&check.beat_index);
            self.satisfied.retain(|&i| i > check.beat_index);
            if was_satisfied {
                continue;
            }
            info!("MISSED (no input): beat {}", check.beat_index);
            let judgment = Judgment {
                time_error_s: self.windows.good_s(),
                grade: HitGrade::Miss,
                beat_index: check.beat_index,
                auto: true,
            };
            self.events.emit(&JudgeEvent::Judged(judgment.clone()));
            misses.push(judgment);
        }
        misses
    }

    /// Drops queued auto-miss checks and satisfaction flags (scene teardown
    /// or pause).
    pub fn cancel_pending(&mut self) {
        self.pending.clear();
        self.satisfied.clear();
    }

    /// Clears all per-session state and applies new windows. Subscribers
    /// stay attached.
    pub fn reset(&mut self, windows: JudgeWindows, auto_miss: bool) {
        self.windows = windows;
        self.auto_miss = auto_miss;
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::{HitGrade, HitJudge, judge};
    use crate::game::beat_clock::BeatClock;
    use crate::game::events::JudgeEvent;
    use crate::game::timing_windows::JudgeWindows;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn windows() -> JudgeWindows {
        JudgeWindows::new(0.10, 0.25)
    }

    #[test]
    fn window_edges_are_inclusive() {
        let w = windows();
        let cases = [
            (0.0, HitGrade::Perfect),
            (0.10, HitGrade::Perfect),
            (0.101, HitGrade::Good),
            (0.25, HitGrade::Good),
            (0.2501, HitGrade::Miss),
            (-0.10, HitGrade::Perfect),
        ];
        for (offset, expected) in cases {
            assert_eq!(judge(&w, offset), expected, "offset {offset}");
        }
    }

    fn drive(hj: &mut HitJudge, clock: &mut BeatClock, now: f64) -> Vec<u64> {
        for index in clock.tick(now) {
            hj.on_beat(index, clock.beat_time(index));
        }
        hj.tick(now).iter().map(|j| j.beat_index).collect()
    }

    #[test]
    fn unhit_beat_auto_misses_exactly_once() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);

        assert!(drive(&mut hj, &mut clock, 1.0).is_empty());
        assert!(drive(&mut hj, &mut clock, 1.2).is_empty());
        assert_eq!(drive(&mut hj, &mut clock, 1.3), vec![1]);
        assert!(drive(&mut hj, &mut clock, 1.4).is_empty(), "miss must not repeat");
    }

    #[test]
    fn qualifying_input_suppresses_auto_miss() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);

        drive(&mut hj, &mut clock, 1.0);
        let j = hj.judge_input(&clock, 1.05);
        assert_eq!((j.grade, j.beat_index), (HitGrade::Perfect, 1));
        assert!(drive(&mut hj, &mut clock, 1.5).is_empty());
        assert_eq!(hj.pending_checks(), 0);
    }

    #[test]
    fn input_on_window_edge_beats_same_frame_check() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);

        drive(&mut hj, &mut clock, 1.0);
        // The check is due at 1.25; a tick at exactly that time must not resolve it.
        assert!(drive(&mut hj, &mut clock, 1.25).is_empty());
        let j = hj.judge_input(&clock, 1.25);
        assert_eq!((j.grade, j.beat_index), (HitGrade::Good, 1));
        assert!(drive(&mut hj, &mut clock, 1.3).is_empty());
        assert_eq!(hj.pending_checks(), 0);
    }

    #[test]
    fn reset_clears_state_but_keeps_subscribers() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);
        let judged = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&judged);
        hj.events_mut().subscribe(move |_: &JudgeEvent| *sink.borrow_mut() += 1);

        drive(&mut hj, &mut clock, 1.0);
        hj.reset(JudgeWindows::new(0.05, 0.2), true);
        assert_eq!(hj.pending_checks(), 0);
        assert_eq!(hj.windows().good_s(), 0.2);

        assert_eq!(drive(&mut hj, &mut clock, 2.3), vec![2]);
        assert_eq!(*judged.borrow(), 1);
    }

    #[test]
    fn early_input_satisfies_upcoming_beat() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);

        drive(&mut hj, &mut clock, 0.85);
        let j = hj.judge_input(&clock, 0.85);
        assert_eq!((j.grade, j.beat_index), (HitGrade::Good, 1));
        assert!(j.time_error_s < 0.0);
        assert!(drive(&mut hj, &mut clock, 1.5).is_empty());
    }

    #[test]
    fn miss_input_does_not_satisfy() {
        let mut clock = BeatClock::new(30.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);

        drive(&mut hj, &mut clock, 2.0);
        let j = hj.judge_input(&clock, 2.6);
        assert_eq!(j.grade, HitGrade::Miss);
        assert_eq!(drive(&mut hj, &mut clock, 2.7), vec![1]);
    }

    #[test]
    fn grouped_notes_ignore_off_phase_beats() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true).with_note_grouping(2, 1);

        let mut missed = Vec::new();
        for step in 1..=50 {
            missed.extend(drive(&mut hj, &mut clock, f64::from(step) * 0.1));
        }
        assert_eq!(missed, vec![1, 3]);

        // Beat 4 is off-phase: an input right on it is judged against beat 5 or 3.
        let j = hj.judge_input(&clock, 4.0);
        assert_eq!(j.grade, HitGrade::Miss);
        assert!(j.beat_index == 3 || j.beat_index == 5);
    }

    #[test]
    fn disabled_auto_miss_never_queues_checks() {
        let mut clock = BeatClock::new(120.0, 0.0);
        let mut hj = HitJudge::new(windows(), false);
        assert!(drive(&mut hj, &mut clock, 10.0).is_empty());
        assert_eq!(hj.pending_checks(), 0);
    }

    #[test]
    fn cancel_pending_drops_queued_checks() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let mut hj = HitJudge::new(windows(), true);
        drive(&mut hj, &mut clock, 1.0);
        assert_eq!(hj.pending_checks(), 1);
        hj.cancel_pending();
        assert!(drive(&mut hj, &mut clock, 1.3).is_empty());
    }
}
