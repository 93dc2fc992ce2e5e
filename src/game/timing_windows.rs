// Judgement windows shared by the hit judge and the auto-miss check.

// All windows are in seconds, measured as absolute distance to the beat.
pub const DEFAULT_PERFECT_WINDOW_S: f64 = 0.10;
pub const DEFAULT_GOOD_WINDOW_S: f64 = 0.25;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JudgeWindows {
    perfect_s: f64,
    good_s: f64,
}

impl Default for JudgeWindows {
    fn default() -> Self {
        Self {
            perfect_s: DEFAULT_PERFECT_WINDOW_S,
            good_s: DEFAULT_GOOD_WINDOW_S,
        }
    }
}

#[inline(always)]
fn non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

impl JudgeWindows {
    /// Builds windows with `0 <= perfect <= good`. A perfect window wider
    /// than the good window is narrowed to it.
    pub fn new(perfect_s: f64, good_s: f64) -> Self {
        let good_s = non_negative(good_s);
        let perfect_s = non_negative(perfect_s).min(good_s);
        Self { perfect_s, good_s }
    }

    #[inline(always)]
    pub const fn perfect_s(&self) -> f64 {
        self.perfect_s
    }

    #[inline(always)]
    pub const fn good_s(&self) -> f64 {
        self.good_s
    }
}
