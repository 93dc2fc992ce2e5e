use crate::game::judgment::{HitGrade, Judgment};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GradeCounts {
    pub perfect: u32,
    pub good: u32,
    pub miss: u32,
    pub auto_miss: u32, // Subset of `miss` synthesized for silent beats
}

impl GradeCounts {
    pub fn record(&mut self, j: &Judgment) {
        match j.grade {
            HitGrade::Perfect => self.perfect = self.perfect.saturating_add(1),
            HitGrade::Good => self.good = self.good.saturating_add(1),
            HitGrade::Miss => {
                self.miss = self.miss.saturating_add(1);
                if j.auto {
                    self.auto_miss = self.auto_miss.saturating_add(1);
                }
            }
        }
    }

    pub fn total(&self) -> u32 {
        self.perfect + self.good + self.miss
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TimingStats {
    pub mean_abs_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub max_abs_ms: f64,
    pub count: usize,
}

#[inline(always)]
pub fn compute_grade_counts(judgments: &[Judgment]) -> GradeCounts {
    let mut out = GradeCounts::default();
    for j in judgments {
        out.record(j);
    }
    out
}

/// Offset statistics over the non-Miss judgments.
pub fn compute_timing_stats(judgments: &[Judgment]) -> TimingStats {
    // First pass: accumulate sums and maxima over non-miss judgments
    let mut sum_abs = 0.0_f64;
    let mut sum_signed = 0.0_f64;
    let mut max_abs = 0.0_f64;
    let mut count: usize = 0;

    for j in judgments.iter().filter(|j| j.grade != HitGrade::Miss) {
        let e = j.time_error_s * 1000.0;
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        if a > max_abs {
            max_abs = a;
        }
        count += 1;
    }

    if count == 0 {
        return TimingStats::default();
    }

    let mean_ms = sum_signed / (count as f64);
    let mean_abs_ms = sum_abs / (count as f64);

    // Second pass: sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f64 = judgments
            .iter()
            .filter(|j| j.grade != HitGrade::Miss)
            .map(|j| {
                let d = j.time_error_s * 1000.0 - mean_ms;
                d * d
            })
            .sum();
        (sum_diff_sq / ((count as f64) - 1.0)).sqrt()
    } else {
        0.0
    };

    TimingStats {
        mean_abs_ms,
        mean_ms,
        stddev_ms,
        max_abs_ms: max_abs,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_grade_counts, compute_timing_stats};
    use crate::game::judgment::{HitGrade, Judgment};

    fn j(time_error_s: f64, grade: HitGrade, auto: bool) -> Judgment {
        Judgment {
            time_error_s,
            grade,
            beat_index: 0,
            auto,
        }
    }

    #[test]
    fn misses_are_counted_but_excluded_from_offsets() {
        let judgments = vec![
            j(0.010, HitGrade::Perfect, false),
            j(-0.030, HitGrade::Perfect, false),
            j(0.200, HitGrade::Good, false),
            j(0.250, HitGrade::Miss, true),
            j(0.400, HitGrade::Miss, false),
        ];
        let counts = compute_grade_counts(&judgments);
        assert_eq!((counts.perfect, counts.good, counts.miss, counts.auto_miss), (2, 1, 2, 1));
        assert_eq!(counts.total(), 5);

        let stats = compute_timing_stats(&judgments);
        assert_eq!(stats.count, 3);
        assert!((stats.mean_ms - 60.0).abs() < 1e-9, "mean={}", stats.mean_ms);
        assert!((stats.mean_abs_ms - 80.0).abs() < 1e-9);
        assert!((stats.max_abs_ms - 200.0).abs() < 1e-9);
        assert!(stats.stddev_ms > 0.0);
    }

    #[test]
    fn empty_or_all_miss_is_default() {
        assert_eq!(compute_timing_stats(&[]).count, 0);
        let only_miss = [j(0.3, HitGrade::Miss, false)];
        assert_eq!(compute_timing_stats(&only_miss).mean_ms, 0.0);
    }
}
