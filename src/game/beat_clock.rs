use log::{debug, trace};
use smallvec::SmallVec;

use crate::game::events::{ClockEvent, Notifier};

pub const MIN_BPM: f64 = 30.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Beat indices crossed by one [`BeatClock::tick`] call. Frame hitches can
/// cross several at once, the common case is zero or one.
pub type CrossedBeats = SmallVec<[u64; 4]>;

#[inline(always)]
fn sanitize_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() { bpm.max(MIN_BPM) } else { DEFAULT_BPM }
}

/// Periodic beat source driven by an external monotonic time.
///
/// The clock never reads time on its own: every query takes `now` in seconds
/// on the same monotonic timeline that was passed to [`BeatClock::new`].
/// Beat `0` is the start time itself and is never emitted; the first emitted
/// beat is index `1`, one interval later.
#[derive(Debug)]
pub struct BeatClock {
    bpm: f64,
    interval: f64,
    next_beat_time: f64,
    next_beat_index: u64,
    next_half_beat_time: f64,
    next_half_beat_index: u64,
    events: Notifier<ClockEvent>,
}

impl BeatClock {
    pub fn new(bpm: f64, start_time: f64) -> Self {
        let bpm = sanitize_bpm(bpm);
        let interval = 60.0 / bpm;
        Self {
            bpm,
            interval,
            next_beat_time: start_time + interval,
            next_beat_index: 1,
            next_half_beat_time: start_time + interval * 0.5,
            next_half_beat_index: 0,
            events: Notifier::new(),
        }
    }

    /// Rewinds the clock to a fresh start at `start_time`. Subscribers stay
    /// attached.
    pub fn restart(&mut self, bpm: f64, start_time: f64) {
        self.bpm = sanitize_bpm(bpm);
        self.interval = 60.0 / self.bpm;
        self.next_beat_time = start_time + self.interval;
        self.next_beat_index = 1;
        self.next_half_beat_time = start_time + self.interval * 0.5;
        self.next_half_beat_index = 0;
    }

    #[inline(always)]
    pub const fn bpm(&self) -> f64 {
        self.bpm
    }

    #[inline(always)]
    pub const fn beat_interval(&self) -> f64 {
        self.interval
    }

    #[inline(always)]
    pub const fn next_beat_time(&self) -> f64 {
        self.next_beat_time
    }

    pub fn events_mut(&mut self) -> &mut Notifier<ClockEvent> {
        &mut self.events
    }

    /// Time of the most recently processed beat boundary (the start time
    /// before any beat has fired, or the reschedule point after `set_bpm`).
    #[inline(always)]
    pub fn current_beat_time(&self) -> f64 {
        self.next_beat_time - self.interval
    }

    #[inline(always)]
    fn current_beat_index(&self) -> u64 {
        self.next_beat_index - 1
    }

    /// Changes tempo without touching beats that already fired. Both the
    /// full-beat and half-beat markers are rescheduled relative to `now`.
    pub fn set_bpm(&mut self, bpm: f64, now: f64) {
        let clamped = sanitize_bpm(bpm);
        if clamped != bpm {
            debug!("BeatClock: bpm {bpm} clamped to {clamped}");
        }
        self.bpm = clamped;
        self.interval = 60.0 / clamped;
        self.next_beat_time = now + self.interval;
        self.next_half_beat_time = now + self.interval * 0.5;
        self.next_half_beat_index = self.current_beat_index();
    }

    /// Fires every beat and half-beat boundary at or before `now`, in time
    /// order, and returns the full-beat indices that were crossed.
    pub fn tick(&mut self, now: f64) -> CrossedBeats {
        let mut crossed = CrossedBeats::new();
        loop {
            let beat_due = self.next_beat_time <= now;
            let half_due = self.next_half_beat_time <= now;
            if !beat_due && !half_due {
                break;
            }
            if beat_due && (!half_due || self.next_beat_time <= self.next_half_beat_time) {
                let index = self.next_beat_index;
                trace!("Beat {index} at {:.4}", self.next_beat_time);
                self.next_beat_time += self.interval;
                self.next_beat_index += 1;
                crossed.push(index);
                self.events.emit(&ClockEvent::Beat { index });
            } else {
                let index = self.next_half_beat_index;
                self.next_half_beat_time += self.interval;
                self.next_half_beat_index += 1;
                self.events.emit(&ClockEvent::HalfBeat { index });
            }
        }
        crossed
    }

    /// Nearest beat boundary to `now`, past or future, as `(index, time)`.
    pub fn nearest_beat(&self, now: f64) -> (u64, f64) {
        let anchor = self.current_beat_time();
        let multiples = ((now - anchor) / self.interval).round();
        let time = anchor + multiples * self.interval;
        let index = (self.current_beat_index() as i64 + multiples as i64).max(0) as u64;
        (index, time)
    }

    #[inline(always)]
    pub fn offset_to_nearest_beat(&self, now: f64) -> f64 {
        (now - self.nearest_beat(now).1).abs()
    }

    /// Signed distance to the nearest beat; positive when `now` is late.
    #[inline(always)]
    pub fn signed_offset_to_nearest_beat(&self, now: f64) -> f64 {
        now - self.nearest_beat(now).1
    }

    /// Continuous beat number at `now`; integral values are beat boundaries.
    pub fn beat_position(&self, now: f64) -> f64 {
        self.current_beat_index() as f64 + (now - self.current_beat_time()) / self.interval
    }

    /// Index of the last beat boundary at or before `now`.
    #[inline(always)]
    pub fn beat_index_at(&self, now: f64) -> u64 {
        self.beat_position(now).floor().max(0.0) as u64
    }

    /// Scheduled time of beat `index` under the current tempo.
    pub fn beat_time(&self, index: u64) -> f64 {
        let delta = index as f64 - self.current_beat_index() as f64;
        self.current_beat_time() + delta * self.interval
    }

    /// Position within the current beat cycle, in `[0, 1)`.
    pub fn beat_phase(&self, now: f64) -> f64 {
        ((now - self.current_beat_time()) / self.interval).rem_euclid(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{BeatClock, MIN_BPM};
    use crate::game::events::ClockEvent;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn catch_up_fires_every_crossed_beat_in_one_tick() {
        let mut clock = BeatClock::new(120.0, 10.0);
        let interval = clock.beat_interval();
        let crossed = clock.tick(10.0 + 3.5 * interval);
        assert_eq!(crossed.as_slice(), &[1, 2, 3], "expected three beats, got {crossed:?}");
    }

    #[test]
    fn beats_and_half_beats_are_emitted_in_time_order() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        clock.events_mut().subscribe(move |e| sink.borrow_mut().push(*e));

        clock.tick(2.2);
        assert_eq!(
            *seen.borrow(),
            vec![
                ClockEvent::HalfBeat { index: 0 },
                ClockEvent::Beat { index: 1 },
                ClockEvent::HalfBeat { index: 1 },
                ClockEvent::Beat { index: 2 },
            ]
        );
    }

    #[test]
    fn repeated_tick_at_same_time_fires_nothing_new() {
        let mut clock = BeatClock::new(120.0, 0.0);
        assert_eq!(clock.tick(0.5).len(), 1);
        assert!(clock.tick(0.5).is_empty());
    }

    #[test]
    fn offset_rounds_to_nearest_boundary_either_side() {
        let mut clock = BeatClock::new(60.0, 0.0);
        clock.tick(3.2);
        assert!((clock.offset_to_nearest_beat(3.2) - 0.2).abs() < 1e-9);
        assert!((clock.offset_to_nearest_beat(3.9) - 0.1).abs() < 1e-9);
        assert!((clock.signed_offset_to_nearest_beat(3.9) + 0.1).abs() < 1e-9);
        assert_eq!(clock.nearest_beat(3.9).0, 4);
        assert_eq!(clock.nearest_beat(3.2).0, 3);
        assert_eq!(clock.beat_index_at(3.9), 3);
        assert_eq!(clock.beat_index_at(4.0), 4);
    }

    #[test]
    fn bpm_floor_and_reschedule_from_now() {
        let mut clock = BeatClock::new(10.0, 0.0);
        assert_eq!(clock.bpm(), MIN_BPM);
        assert!((clock.beat_interval() - 2.0).abs() < 1e-12);

        clock.tick(2.5);
        clock.set_bpm(120.0, 2.5);
        assert!((clock.next_beat_time() - 3.0).abs() < 1e-12);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        clock.events_mut().subscribe(move |e| sink.borrow_mut().push(*e));

        // Half-beat lands at now + interval / 2, ahead of the next full beat.
        assert!(clock.tick(2.74).is_empty());
        assert!(seen.borrow().is_empty(), "nothing due before 2.75: {:?}", seen.borrow());
        assert!(clock.tick(2.75).is_empty());
        assert_eq!(*seen.borrow(), vec![ClockEvent::HalfBeat { index: 1 }]);
        assert_eq!(clock.tick(3.0).as_slice(), &[2]);
        assert!(clock.tick(3.24).is_empty());
        clock.tick(3.25);
        assert_eq!(
            *seen.borrow(),
            vec![
                ClockEvent::HalfBeat { index: 1 },
                ClockEvent::Beat { index: 2 },
                ClockEvent::HalfBeat { index: 2 },
            ]
        );
        assert!(clock.beat_phase(3.25) > 0.49 && clock.beat_phase(3.25) < 0.51);
    }

    #[test]
    fn restart_keeps_subscribers() {
        let mut clock = BeatClock::new(60.0, 0.0);
        let beats = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&beats);
        clock.events_mut().subscribe(move |e| {
            if let ClockEvent::Beat { .. } = e {
                *sink.borrow_mut() += 1;
            }
        });
        clock.tick(3.0);
        clock.restart(120.0, 10.0);
        assert_eq!(clock.bpm(), 120.0);
        assert_eq!(clock.tick(11.0).as_slice(), &[1, 2]);
        assert_eq!(*beats.borrow(), 5);
    }

    #[test]
    fn nonsense_bpm_falls_back_to_default() {
        let clock = BeatClock::new(f64::NAN, 0.0);
        assert!(clock.bpm().is_finite());
        let clock = BeatClock::new(-40.0, 0.0);
        assert_eq!(clock.bpm(), MIN_BPM);
    }
}
