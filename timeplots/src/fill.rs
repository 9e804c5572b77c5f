//! Gap filling: turning a sparse series into an evenly spaced one.
//!
//! The sampling period is inferred, not configured: it is the smallest
//! positive step between adjacent timestamps. Walking the series, every
//! point that arrives more than half a period after the next expected slot
//! causes default-valued points to be synthesized for the missed slots.
//!
//! ```text
//! input     08:00 ─ 09:00 ──────────────── 12:00       period = 1h
//! output    08:00 ─ 09:00 ─ 10:00 ─ 11:00 ─ 12:00
//!                           (0)     (0)
//! ```
//!
//! A point that is late by less than half a period is accepted for the slot
//! it was due in, and the grid re-anchors on it. Jitter larger than that is
//! not corrected, so the output is only as regular as the input allows.
//!
//! The inferred period is taken at face value: a single pair of points that
//! happen to be close together shrinks the period for the whole series.

use chrono::{NaiveDateTime, TimeDelta};

use crate::series::Series;

/// Smallest positive step between adjacent timestamps of `series`.
///
/// Returns `None` for series with fewer than two points.
pub fn minimum_delta(series: &Series) -> Option<TimeDelta> {
    series
        .points()
        .windows(2)
        .map(|pair| pair[1].0 - pair[0].0)
        .filter(|delta| *delta > TimeDelta::zero())
        .min()
}

/// Densifies series by synthesizing points for missed sampling slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapFiller {
    default: f64,
}

impl GapFiller {
    /// Creates a filler that synthesizes `default` for missing slots.
    pub fn new(default: f64) -> Self {
        Self { default }
    }

    /// The value used for synthesized points.
    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Returns `series` with every missed slot filled.
    ///
    /// Series with fewer than two points are returned unchanged, since no
    /// period can be inferred from them.
    pub fn fill(&self, series: &Series) -> Series {
        let Some(period) = minimum_delta(series) else {
            return series.clone();
        };
        let tolerance = period / 2;
        let points = series.points();

        let mut dense = Vec::with_capacity(points.len());
        let mut synthesized = 0usize;
        let mut expected = points[0].0;

        for &(timestamp, value) in points {
            while let Some(limit) = expected.checked_add_signed(tolerance)
                && timestamp > limit
            {
                dense.push((expected, self.default));
                synthesized += 1;
                match expected.checked_add_signed(period) {
                    Some(next) => expected = next,
                    None => break,
                }
            }
            dense.push((timestamp, value));
            expected = next_slot(timestamp, period);
        }

        tracing::debug!(
            period_secs = period.num_seconds(),
            input = points.len(),
            synthesized,
            "filled gaps"
        );
        Series::from_sorted(dense)
    }
}

impl Default for GapFiller {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn next_slot(timestamp: NaiveDateTime, period: TimeDelta) -> NaiveDateTime {
    timestamp
        .checked_add_signed(period)
        .unwrap_or(NaiveDateTime::MAX)
}
