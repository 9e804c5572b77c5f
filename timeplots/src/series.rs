//! Ordered `(timestamp, value)` series and the builders that produce them.
//!
//! Two ways in:
//!
//! - **Counting** - push event timestamps (duplicates expected) into a
//!   [`SeriesBuilder`]; [`SeriesBuilder::build`] yields one point per
//!   distinct timestamp whose value is the number of events.
//! - **Aligned** - [`Series::aligned`] takes equal-length timestamp and
//!   value sequences computed elsewhere (counter deltas, rates) and only
//!   sorts and validates them.
//!
//! Either way the result is strictly increasing in timestamp.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

/// A strictly increasing sequence of `(timestamp, value)` points.
///
/// Deserialized points go through [`Series::aligned`], so unsorted input is
/// sorted and repeated timestamps are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct Series {
    points: Vec<(NaiveDateTime, f64)>,
}

/// Unvalidated serialized form of [`Series`].
#[derive(Deserialize)]
struct RawSeries {
    points: Vec<(NaiveDateTime, f64)>,
}

impl TryFrom<RawSeries> for Series {
    type Error = SeriesError;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        if raw.points.is_empty() {
            return Ok(Self::empty());
        }
        let (timestamps, values) = raw.points.into_iter().unzip();
        Self::aligned(timestamps, values)
    }
}

impl Series {
    /// A series with no points.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Counts events per distinct timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] if `timestamps` yields nothing.
    pub fn count<I>(timestamps: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let mut builder = SeriesBuilder::new();
        builder.extend(timestamps);
        builder.build()
    }

    /// Builds a series from already aligned timestamps and values.
    ///
    /// Points are sorted by timestamp; values travel with their timestamps.
    ///
    /// # Errors
    ///
    /// - [`SeriesError::LengthMismatch`] if the sequences differ in length.
    /// - [`SeriesError::Empty`] if both are empty.
    /// - [`SeriesError::DuplicateTimestamp`] if a timestamp repeats.
    pub fn aligned(timestamps: Vec<NaiveDateTime>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if timestamps.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        if timestamps.is_empty() {
            return Err(SeriesError::Empty);
        }

        let mut points: Vec<(NaiveDateTime, f64)> = timestamps.into_iter().zip(values).collect();
        points.sort_by_key(|(ts, _)| *ts);
        if let Some(pair) = points.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(SeriesError::DuplicateTimestamp {
                timestamp: pair[0].0,
            });
        }
        Ok(Self { points })
    }

    /// Wraps points the caller guarantees are strictly increasing.
    pub(crate) fn from_sorted(points: Vec<(NaiveDateTime, f64)>) -> Self {
        debug_assert!(points.windows(2).all(|pair| pair[0].0 <= pair[1].0));
        Self { points }
    }

    /// The points, in timestamp order.
    pub fn points(&self) -> &[(NaiveDateTime, f64)] {
        &self.points
    }

    /// Consumes the series, returning its points.
    pub fn into_points(self) -> Vec<(NaiveDateTime, f64)> {
        self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the series has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamps, in order.
    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.points.iter().map(|(ts, _)| *ts)
    }

    /// Values, in timestamp order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, value)| *value)
    }

    /// Returns true if every value is zero.
    pub fn is_all_zero(&self) -> bool {
        self.points.iter().all(|(_, value)| *value == 0.0)
    }

    /// The first and last timestamps, if any.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.points.first()?.0, self.points.last()?.0))
    }
}

/// Accumulates event timestamps for one category.
///
/// Duplicate timestamps are folded into a count as they arrive, so memory
/// grows with the number of distinct buckets rather than the number of
/// lines.
#[derive(Debug, Clone, Default)]
pub struct SeriesBuilder {
    counts: BTreeMap<NaiveDateTime, u64>,
    events: u64,
}

impl SeriesBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event.
    pub fn push(&mut self, timestamp: NaiveDateTime) {
        *self.counts.entry(timestamp).or_insert(0) += 1;
        self.events += 1;
    }

    /// Number of events recorded.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Number of distinct timestamps recorded.
    pub fn buckets(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if no event was recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Produces the counted series.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Empty`] if no event was recorded.
    #[allow(clippy::cast_precision_loss)] // Counts above 2^52 are not realistic
    pub fn build(self) -> Result<Series, SeriesError> {
        if self.counts.is_empty() {
            return Err(SeriesError::Empty);
        }
        Ok(Series::from_sorted(
            self.counts
                .into_iter()
                .map(|(ts, count)| (ts, count as f64))
                .collect(),
        ))
    }
}

impl Extend<NaiveDateTime> for SeriesBuilder {
    fn extend<T: IntoIterator<Item = NaiveDateTime>>(&mut self, iter: T) {
        for timestamp in iter {
            self.push(timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_count_groups_and_sorts() {
        let series = Series::count([at(9, 0), at(8, 0), at(9, 0), at(8, 30), at(9, 0)]).unwrap();
        assert_eq!(
            series.points(),
            &[(at(8, 0), 1.0), (at(8, 30), 1.0), (at(9, 0), 3.0)]
        );
    }

    #[test]
    fn test_count_empty_fails() {
        assert_eq!(Series::count([]), Err(SeriesError::Empty));
        assert_eq!(SeriesBuilder::new().build(), Err(SeriesError::Empty));
    }

    #[test]
    fn test_builder_tracks_events_and_buckets() {
        let mut builder = SeriesBuilder::new();
        builder.extend([at(8, 0), at(8, 0), at(8, 5)]);
        assert_eq!(builder.events(), 3);
        assert_eq!(builder.buckets(), 2);
        assert!(!builder.is_empty());
    }

    #[test]
    fn test_aligned_sorts_values_with_timestamps() {
        let series =
            Series::aligned(vec![at(12, 0), at(8, 0), at(9, 0)], vec![21.0, 17.0, 5.0]).unwrap();
        assert_eq!(
            series.points(),
            &[(at(8, 0), 17.0), (at(9, 0), 5.0), (at(12, 0), 21.0)]
        );
        assert_eq!(series.span(), Some((at(8, 0), at(12, 0))));
    }

    #[test]
    fn test_aligned_validation() {
        assert_eq!(
            Series::aligned(vec![at(8, 0)], vec![1.0, 2.0]),
            Err(SeriesError::LengthMismatch {
                timestamps: 1,
                values: 2
            })
        );
        assert_eq!(Series::aligned(vec![], vec![]), Err(SeriesError::Empty));
        assert_eq!(
            Series::aligned(vec![at(8, 0), at(8, 0)], vec![1.0, 2.0]),
            Err(SeriesError::DuplicateTimestamp {
                timestamp: at(8, 0)
            })
        );
    }

    #[test]
    fn test_deserialize_validates_order() {
        let json = r#"{"points":[["2019-12-01T09:00:00",2.0],["2019-12-01T08:00:00",1.0]]}"#;
        let series: Series = serde_json::from_str(json).unwrap();
        assert_eq!(series.points(), &[(at(8, 0), 1.0), (at(9, 0), 2.0)]);

        let json = r#"{"points":[["2019-12-01T08:00:00",1.0],["2019-12-01T08:00:00",1.0]]}"#;
        let err = serde_json::from_str::<Series>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate timestamp"));

        let empty: Series = serde_json::from_str(r#"{"points":[]}"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_all_zero() {
        assert!(Series::empty().is_all_zero());
        let series = Series::aligned(vec![at(8, 0), at(9, 0)], vec![0.0, 0.0]).unwrap();
        assert!(series.is_all_zero());
    }
}
