//! Bucketing windows: the grid that parsed timestamps are floored onto.
//!
//! A window is written as a magnitude plus an optional unit suffix, e.g.
//! `30`, `30s`, `5m`, `1h`, `7d`. A bare number means seconds. Flooring is
//! measured from a fixed epoch (`0001-01-01T00:00:00`), so two runs over
//! differently formatted logs land on the same grid.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, WindowError};

/// Seconds between the flooring epoch `0001-01-01T00:00:00` and the Unix epoch.
const EPOCH_OFFSET_SECS: i64 = 62_135_596_800;

/// Unit suffix of a window specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowUnit {
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
}

impl WindowUnit {
    /// Length of one unit in seconds.
    pub const fn secs(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3_600,
            Self::Days => 86_400,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "s" => Some(Self::Seconds),
            "m" => Some(Self::Minutes),
            "h" => Some(Self::Hours),
            "d" => Some(Self::Days),
            _ => None,
        }
    }

    const fn suffix(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
        }
    }

    const fn plural(self) -> &'static str {
        match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        }
    }

    const fn singular(self) -> &'static str {
        match self {
            Self::Seconds => "second",
            Self::Minutes => "minute",
            Self::Hours => "hour",
            Self::Days => "day",
        }
    }
}

/// A non-negative bucketing duration.
///
/// The magnitude and unit are kept as written so the chart's value axis can
/// be labelled the way the user asked for it (`events every 90 seconds`
/// rather than `events every 1.5 minutes`).
///
/// # Example
///
/// ```rust
/// use timeplots::window::BucketingWindow;
///
/// let window: BucketingWindow = "5m".parse()?;
/// assert_eq!(window.secs(), 300);
/// assert_eq!(window.units_label(), "events every 5 minutes");
/// # Ok::<(), timeplots::error::WindowError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketingWindow {
    magnitude: u64,
    unit: WindowUnit,
    secs: u64,
}

impl BucketingWindow {
    /// A window that leaves timestamps untouched.
    pub const NONE: Self = Self {
        magnitude: 0,
        unit: WindowUnit::Seconds,
        secs: 0,
    };

    /// Creates a window of `magnitude` units.
    ///
    /// Returns `None` if the window is too large to represent.
    pub fn new(magnitude: u64, unit: WindowUnit) -> Option<Self> {
        let secs = magnitude.checked_mul(unit.secs())?;
        // Flooring works on i64 seconds.
        i64::try_from(secs).ok()?;
        Some(Self {
            magnitude,
            unit,
            secs,
        })
    }

    /// Window length in whole seconds.
    pub fn secs(&self) -> u64 {
        self.secs
    }

    /// Returns true if this window performs no truncation.
    pub fn is_none(&self) -> bool {
        self.secs == 0
    }

    /// Floors `timestamp` onto this window's grid.
    ///
    /// Sub-second precision is dropped. A zero window returns the timestamp
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::OutOfRange`] if the floored value cannot be
    /// represented.
    pub fn floor(&self, timestamp: NaiveDateTime) -> Result<NaiveDateTime, ExtractError> {
        if self.is_none() {
            return Ok(timestamp);
        }
        let out_of_range = || ExtractError::OutOfRange {
            timestamp,
            window_secs: self.secs,
        };
        let window = i64::try_from(self.secs).map_err(|_| out_of_range())?;
        let unix = timestamp.and_utc().timestamp();
        let elapsed = unix.checked_add(EPOCH_OFFSET_SECS).ok_or_else(out_of_range)?;
        let floored = unix - elapsed.rem_euclid(window);
        DateTime::from_timestamp(floored, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(out_of_range)
    }

    /// Value-axis label for event counts bucketed by this window.
    pub fn units_label(&self) -> String {
        if self.is_none() && self.magnitude == 0 {
            return "events".to_string();
        }
        let unit = if self.magnitude == 1 {
            self.unit.singular()
        } else {
            self.unit.plural()
        };
        format!("events every {} {unit}", self.magnitude)
    }
}

impl Default for BucketingWindow {
    fn default() -> Self {
        Self::NONE
    }
}

impl FromStr for BucketingWindow {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(WindowError::Empty);
        }

        let split = spec
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(spec.len(), |(i, _)| i);
        let (digits, suffix) = spec.split_at(split);

        if digits.is_empty() {
            return Err(WindowError::InvalidMagnitude {
                spec: spec.to_string(),
            });
        }
        let unit = if suffix.is_empty() {
            WindowUnit::Seconds
        } else {
            WindowUnit::from_suffix(suffix).ok_or_else(|| WindowError::UnknownUnit {
                spec: spec.to_string(),
                unit: suffix.to_string(),
            })?
        };
        let magnitude: u64 = digits.parse().map_err(|_| WindowError::Overflow {
            spec: spec.to_string(),
        })?;

        Self::new(magnitude, unit).ok_or_else(|| WindowError::Overflow {
            spec: spec.to_string(),
        })
    }
}

impl fmt::Display for BucketingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_units() {
        assert_eq!("30".parse::<BucketingWindow>().unwrap().secs(), 30);
        assert_eq!("30s".parse::<BucketingWindow>().unwrap().secs(), 30);
        assert_eq!("5m".parse::<BucketingWindow>().unwrap().secs(), 300);
        assert_eq!("2h".parse::<BucketingWindow>().unwrap().secs(), 7_200);
        assert_eq!("1d".parse::<BucketingWindow>().unwrap().secs(), 86_400);
        assert!("0".parse::<BucketingWindow>().unwrap().is_none());
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        assert_eq!("".parse::<BucketingWindow>(), Err(WindowError::Empty));
        assert!(matches!(
            "m".parse::<BucketingWindow>(),
            Err(WindowError::InvalidMagnitude { .. })
        ));
        assert!(matches!(
            "5w".parse::<BucketingWindow>(),
            Err(WindowError::UnknownUnit { unit, .. }) if unit == "w"
        ));
        assert!(matches!(
            "1.5h".parse::<BucketingWindow>(),
            Err(WindowError::UnknownUnit { .. })
        ));
        assert!(matches!(
            "99999999999999999999d".parse::<BucketingWindow>(),
            Err(WindowError::Overflow { .. })
        ));
    }

    #[test]
    fn test_floor_five_minutes() {
        let window: BucketingWindow = "5m".parse().unwrap();
        assert_eq!(window.floor(at(10, 7, 32)).unwrap(), at(10, 5, 0));
        assert_eq!(window.floor(at(10, 5, 0)).unwrap(), at(10, 5, 0));
    }

    #[test]
    fn test_floor_drops_subseconds() {
        let window: BucketingWindow = "1s".parse().unwrap();
        let ts = at(10, 7, 32) + chrono::TimeDelta::milliseconds(750);
        assert_eq!(window.floor(ts).unwrap(), at(10, 7, 32));
    }

    #[test]
    fn test_floor_is_measured_from_year_one() {
        // 0001-01-01 is a Monday; a 7 day window aligns to Mondays.
        let window: BucketingWindow = "7d".parse().unwrap();
        // 2019-12-01 is a Sunday, the previous Monday is 2019-11-25.
        let expected = NaiveDate::from_ymd_opt(2019, 11, 25)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(window.floor(at(13, 0, 0)).unwrap(), expected);
    }

    #[test]
    fn test_zero_window_is_identity() {
        let ts = at(10, 7, 32) + chrono::TimeDelta::milliseconds(5);
        assert_eq!(BucketingWindow::NONE.floor(ts).unwrap(), ts);
    }

    #[test]
    fn test_units_label() {
        assert_eq!(BucketingWindow::NONE.units_label(), "events");
        let one: BucketingWindow = "1m".parse().unwrap();
        assert_eq!(one.units_label(), "events every 1 minute");
        let many: BucketingWindow = "90".parse().unwrap();
        assert_eq!(many.units_label(), "events every 90 seconds");
    }

    #[test]
    fn test_display_round_trips() {
        let window: BucketingWindow = "15m".parse().unwrap();
        assert_eq!(window.to_string(), "15m");
    }
}
