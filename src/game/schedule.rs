use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_DELAY_S: f64 = 1.5;
pub const DEFAULT_MAX_DELAY_S: f64 = 8.0;
pub const DEFAULT_NO_SCHEDULE_TAIL_S: f64 = 5.0;
pub const DEFAULT_MIN_GAP_S: f64 = 8.0;

/// Where bonus events may start within a session. All values in seconds
/// from session start.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConstraints {
    pub min_delay: f64,
    pub max_delay: f64,
    /// Events never start inside this many seconds before the session ends.
    pub no_schedule_tail: f64,
    pub min_gap: f64,
}

impl Default for ScheduleConstraints {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_DELAY_S,
            max_delay: DEFAULT_MAX_DELAY_S,
            no_schedule_tail: DEFAULT_NO_SCHEDULE_TAIL_S,
            min_gap: DEFAULT_MIN_GAP_S,
        }
    }
}

#[inline(always)]
fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

impl ScheduleConstraints {
    /// Non-negative values with `max_delay >= min_delay`.
    pub fn sanitized(&self) -> Self {
        let min_delay = non_negative(self.min_delay);
        Self {
            min_delay,
            max_delay: non_negative(self.max_delay).max(min_delay),
            no_schedule_tail: non_negative(self.no_schedule_tail),
            min_gap: non_negative(self.min_gap),
        }
    }

    /// Latest allowed start time for a session of `session_duration` seconds.
    #[inline(always)]
    pub fn latest_start(&self, session_duration: f64) -> f64 {
        session_duration - non_negative(self.no_schedule_tail)
    }
}

/// Lays out up to `count` start times inside the session.
///
/// Every returned time `t` satisfies `min_delay <= t <= duration - tail` and
/// consecutive times are at least `min_gap` apart. When the window runs out
/// the list is simply shorter than `count`.
pub fn build_schedule<R>(
    count: usize,
    session_duration: f64,
    constraints: &ScheduleConstraints,
    rng: &mut R,
) -> Vec<f64>
where
    R: Rng,
{
    let c = constraints.sanitized();
    let session_duration = non_negative(session_duration);
    let latest = c.latest_start(session_duration);

    let mut times: Vec<f64> = Vec::with_capacity(count);
    for i in 0..count {
        let mut lo = c.min_delay;
        if let Some(&prev) = times.last() {
            lo = lo.max(prev + c.min_gap);
        }
        if lo >= latest {
            debug!("Schedule: slot {i} does not fit (lo={lo:.3}, latest={latest:.3}); stopping");
            break;
        }
        let mut hi = c.max_delay.min(latest);
        if hi < lo {
            hi = latest;
        }
        let t = if hi > lo { rng.random_range(lo..=hi) } else { lo };
        times.push(t.min(latest));
    }
    times.sort_by(f64::total_cmp);
    debug!("Schedule: {} of {count} occurrences placed: {times:?}", times.len());
    times
}

#[cfg(test)]
mod tests {
    use super::{ScheduleConstraints, build_schedule};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn check_invariants(times: &[f64], duration: f64, c: &ScheduleConstraints) {
        let latest = duration - c.no_schedule_tail;
        for &t in times {
            assert!(t >= c.min_delay && t <= latest, "t={t} outside [{}, {latest}]", c.min_delay);
        }
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= c.min_gap - 1e-9, "gap too small in {times:?}");
        }
    }

    #[test]
    fn default_session_respects_window_and_gap() {
        let c = ScheduleConstraints {
            min_delay: 1.5,
            max_delay: 8.0,
            no_schedule_tail: 5.0,
            min_gap: 8.0,
        };
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let times = build_schedule(3, 30.0, &c, &mut rng);
            assert!(!times.is_empty() && times.len() <= 3);
            assert!(times[0] <= 8.0, "first event must honour max_delay: {times:?}");
            check_invariants(&times, 30.0, &c);
        }
    }

    #[test]
    fn requests_that_do_not_fit_are_truncated() {
        let c = ScheduleConstraints {
            min_delay: 5.0,
            max_delay: 5.0,
            no_schedule_tail: 5.0,
            min_gap: 8.0,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let times = build_schedule(5, 20.0, &c, &mut rng);
        assert_eq!(times.len(), 2, "got {times:?}");
        assert_eq!(times[0], 5.0);
        check_invariants(&times, 20.0, &c);
    }

    #[test]
    fn no_room_at_all_yields_empty_schedule() {
        let c = ScheduleConstraints::default();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(build_schedule(4, 6.0, &c, &mut rng).is_empty());
        assert!(build_schedule(0, 60.0, &c, &mut rng).is_empty());
        assert!(build_schedule(2, f64::NAN, &c, &mut rng).is_empty());
    }

    #[test]
    fn inverted_delays_are_repaired() {
        let c = ScheduleConstraints {
            min_delay: 4.0,
            max_delay: 1.0,
            no_schedule_tail: -3.0,
            min_gap: 0.0,
        };
        let s = c.sanitized();
        assert_eq!((s.max_delay, s.no_schedule_tail), (4.0, 0.0));
        let times = build_schedule(1, 10.0, &c, &mut StdRng::seed_from_u64(5));
        assert_eq!(times, vec![4.0]);
    }

    #[test]
    fn randomized_constraints_hold_invariants() {
        let mut rng = StdRng::seed_from_u64(0xBEA7);
        for _ in 0..2_000 {
            let min_delay = rng.random_range(0.0..10.0);
            let c = ScheduleConstraints {
                min_delay,
                max_delay: min_delay + rng.random_range(0.0..15.0),
                no_schedule_tail: rng.random_range(0.0..8.0),
                min_gap: rng.random_range(0.0..12.0),
            };
            let duration = rng.random_range(0.0..90.0);
            let count = rng.random_range(0..8);
            let times = build_schedule(count, duration, &c, &mut rng);
            assert!(times.len() <= count);
            check_invariants(&times, duration, &c);
        }
    }
}
