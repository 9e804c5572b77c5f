//! Timestamp extraction from log lines.
//!
//! [`TimestampExtractor`] combines a [`TimestampFormat`] (known up front or
//! detected from the first line it sees) with a [`BucketingWindow`], and
//! memoizes results per distinct timestamp prefix. Log files repeat the
//! same second many times, so most lines are a single map lookup.
//!
//! # Format state
//!
//! ```text
//! Undetected(detector) --first line parses--> Detected(format)
//!         |
//!         +--------------no candidate--------> FormatError (fatal)
//! ```
//!
//! The transition happens once. A detected extractor never looks at the
//! candidates again and rejects attempts to replace its format.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::error::{ExtractError, FormatError, Result};
use crate::format::{FormatDetector, TimestampFormat};
use crate::window::BucketingWindow;

#[derive(Debug, Clone)]
enum FormatState {
    Undetected(FormatDetector),
    Detected(TimestampFormat),
}

/// Parses, floors and memoizes timestamps for one run.
///
/// The memo table belongs to the instance: two extractors never share
/// entries, and the table is dropped with the extractor.
///
/// # Example
///
/// ```rust
/// use timeplots::extract::TimestampExtractor;
/// use timeplots::format::{Delimiter, TimestampFormat};
///
/// let format = TimestampFormat::from_pattern("%b %d %H:%M:%S", Delimiter::Whitespace)?;
/// let mut extractor = TimestampExtractor::new(format, "5m".parse()?);
/// let ts = extractor.extract("Jan 5 10:07:32 sshd: accepted")?;
/// assert_eq!(ts.format("%H:%M:%S").to_string(), "10:05:00");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct TimestampExtractor {
    state: FormatState,
    window: BucketingWindow,
    cache: HashMap<String, std::result::Result<NaiveDateTime, ExtractError>>,
    hits: u64,
}

impl TimestampExtractor {
    /// Creates an extractor with a known format.
    pub fn new(format: TimestampFormat, window: BucketingWindow) -> Self {
        Self {
            state: FormatState::Detected(format),
            window,
            cache: HashMap::new(),
            hits: 0,
        }
    }

    /// Creates an extractor that detects its format from the first line.
    pub fn detecting(detector: FormatDetector, window: BucketingWindow) -> Self {
        Self {
            state: FormatState::Undetected(detector),
            window,
            cache: HashMap::new(),
            hits: 0,
        }
    }

    /// The format in use, once known.
    pub fn format(&self) -> Option<&TimestampFormat> {
        match &self.state {
            FormatState::Detected(format) => Some(format),
            FormatState::Undetected(_) => None,
        }
    }

    /// The bucketing window applied to every timestamp.
    pub fn window(&self) -> BucketingWindow {
        self.window
    }

    /// Supplies the format explicitly while still undetected.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::AlreadyDetected`] once a format is in place.
    pub fn set_format(&mut self, format: TimestampFormat) -> std::result::Result<(), FormatError> {
        if let FormatState::Detected(current) = &self.state {
            return Err(FormatError::AlreadyDetected {
                pattern: current.pattern().to_string(),
            });
        }
        self.state = FormatState::Detected(format);
        Ok(())
    }

    /// Extracts the (floored) timestamp at the start of `line`.
    ///
    /// # Errors
    ///
    /// - [`FormatError::NotDetected`] if the format is still undetected and
    ///   no candidate parses this line. This is fatal to the run.
    /// - [`ExtractError`] if this line's prefix does not parse. This only
    ///   concerns the one line.
    pub fn extract(&mut self, line: &str) -> Result<NaiveDateTime> {
        if let FormatState::Undetected(detector) = &mut self.state {
            let format = detector.detect(line)?.clone();
            self.state = FormatState::Detected(format);
        }
        let FormatState::Detected(format) = &self.state else {
            return Err(FormatError::NotDetected {
                line: line.to_string(),
            }
            .into());
        };
        let text = format.prefix(line);

        if let Some(cached) = self.cache.get(&text) {
            self.hits += 1;
            return cached.clone().map_err(Into::into);
        }

        let window = self.window;
        let result = format
            .parse_prefix(&text)
            .map_err(|source| ExtractError::Parse {
                text: text.clone(),
                pattern: format.pattern().to_string(),
                source,
            })
            .and_then(|ts| window.floor(ts));
        self.cache.insert(text, result.clone());
        result.map_err(Into::into)
    }

    /// Number of distinct prefixes seen so far.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of lines answered from the memo table.
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }
}
