//! Timestamp layouts and format auto-detection.
//!
//! A [`TimestampFormat`] says how to find a timestamp at the start of a log
//! line: take the first `tokens` non-empty delimiter-separated tokens,
//! rejoin them with the delimiter, and parse the result against a chrono
//! strftime pattern. Fields the pattern does not mention are defaulted the
//! way `strptime(3)` does (year 1900, January, day 1, midnight), so a
//! syslog-style `%b %d %H:%M:%S` stamp still parses.
//!
//! A [`FormatDetector`] tries an ordered list of candidate formats against a
//! sample line and remembers the first one that parses.

use std::fmt;

use chrono::NaiveDateTime;
use chrono::format::{self, Item, ParseResult, Parsed, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, FormatError};

/// Layouts tried by [`FormatDetector::builtin`], in order.
const BUILTIN_FORMATS: &[(&str, usize)] = &[
    ("%b %d %H:%M:%S", 3),
    ("%Y-%m-%d %H:%M:%S", 2),
    ("%Y-%m-%d %H:%M:%S%.f", 2),
    ("%Y-%m-%dT%H:%M:%S", 1),
    ("%Y-%m-%dT%H:%M:%S%.f", 1),
    ("%a %b %d %H:%M:%S %Y", 5),
    ("%d/%b/%Y:%H:%M:%S", 1),
];

/// Separator between the tokens of a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Any run of whitespace; tokens are rejoined with a single space.
    #[default]
    Whitespace,
    /// A literal separator string.
    Literal(String),
}

impl Delimiter {
    /// Returns the first `count` non-empty tokens of `line`, rejoined.
    pub fn prefix(&self, line: &str, count: usize) -> String {
        match self {
            Self::Whitespace => join(line.split_whitespace().take(count), " "),
            Self::Literal(sep) => join(
                line.split(sep.as_str()).filter(|t| !t.is_empty()).take(count),
                sep,
            ),
        }
    }

    /// Counts the non-empty tokens of `text`.
    pub fn count_tokens(&self, text: &str) -> usize {
        match self {
            Self::Whitespace => text.split_whitespace().count(),
            Self::Literal(sep) => text.split(sep.as_str()).filter(|t| !t.is_empty()).count(),
        }
    }
}

fn join<'a>(tokens: impl Iterator<Item = &'a str>, sep: &str) -> String {
    let mut out = String::new();
    for (i, token) in tokens.enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(token);
    }
    out
}

/// How to locate and parse the timestamp at the start of a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimestampFormat {
    pattern: String,
    delimiter: Delimiter,
    tokens: usize,
}

impl TimestampFormat {
    /// Creates a format spanning exactly `tokens` tokens.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidPattern`] if the pattern contains an
    /// unknown directive, or [`FormatError::ZeroTokens`] if `tokens` is 0.
    pub fn new(pattern: &str, delimiter: Delimiter, tokens: usize) -> Result<Self, FormatError> {
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(FormatError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }
        if tokens == 0 {
            return Err(FormatError::ZeroTokens {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self {
            pattern: pattern.to_string(),
            delimiter,
            tokens,
        })
    }

    /// Creates a format whose token count is the number of tokens in the
    /// pattern itself (`"%b %d %H:%M:%S"` spans 3 whitespace tokens).
    ///
    /// # Errors
    ///
    /// See [`TimestampFormat::new`].
    pub fn from_pattern(pattern: &str, delimiter: Delimiter) -> Result<Self, FormatError> {
        let tokens = delimiter.count_tokens(pattern);
        Self::new(pattern, delimiter, tokens)
    }

    /// The strftime pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The token delimiter.
    pub fn delimiter(&self) -> &Delimiter {
        &self.delimiter
    }

    /// Number of leading tokens that make up the timestamp.
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    /// Returns the timestamp prefix of `line`, ignoring the remainder.
    pub fn prefix(&self, line: &str) -> String {
        self.delimiter.prefix(line, self.tokens)
    }

    /// Parses an already extracted prefix.
    ///
    /// # Errors
    ///
    /// Returns the chrono error if `text` does not match the pattern in full.
    pub fn parse_prefix(&self, text: &str) -> ParseResult<NaiveDateTime> {
        strptime(text, &self.pattern)
    }

    /// Extracts and parses the timestamp at the start of `line`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Parse`] if the prefix does not match.
    pub fn parse_line(&self, line: &str) -> Result<NaiveDateTime, ExtractError> {
        let text = self.prefix(line);
        self.parse_prefix(&text)
            .map_err(|source| ExtractError::Parse {
                text,
                pattern: self.pattern.clone(),
                source,
            })
    }

    fn builtin(pattern: &str, tokens: usize) -> Self {
        Self {
            pattern: pattern.to_string(),
            delimiter: Delimiter::Whitespace,
            tokens,
        }
    }
}

impl fmt::Display for TimestampFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} tokens)", self.pattern, self.tokens)
    }
}

/// Parses `text` against `pattern`, defaulting absent fields like `strptime(3)`.
fn strptime(text: &str, pattern: &str) -> ParseResult<NaiveDateTime> {
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, text, StrftimeItems::new(pattern))?;
    if let Ok(datetime) = parsed.to_naive_datetime_with_offset(0) {
        return Ok(datetime);
    }

    let no_week = parsed.week_from_sun().is_none()
        && parsed.week_from_mon().is_none()
        && parsed.isoweek().is_none();
    if parsed.year().is_none() && parsed.year_mod_100().is_none() && parsed.isoyear().is_none() {
        parsed.set_year(1900)?;
    }
    if parsed.month().is_none() && parsed.ordinal().is_none() && no_week {
        parsed.set_month(1)?;
    }
    if parsed.day().is_none() && parsed.ordinal().is_none() && no_week {
        parsed.set_day(1)?;
    }
    if parsed.hour_mod_12().is_none() && parsed.hour_div_12().is_none() {
        parsed.set_hour(0)?;
    }
    if parsed.minute().is_none() {
        parsed.set_minute(0)?;
    }
    parsed.to_naive_datetime_with_offset(0)
}

/// Picks a [`TimestampFormat`] by trying candidates against a sample line.
///
/// The first successful detection is retained: later calls to
/// [`FormatDetector::detect`] return it without looking at the line.
#[derive(Debug, Clone)]
pub struct FormatDetector {
    candidates: Vec<TimestampFormat>,
    detected: Option<usize>,
}

impl FormatDetector {
    /// Creates a detector over an ordered list of candidates.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::NoCandidates`] if `candidates` is empty.
    pub fn new(candidates: Vec<TimestampFormat>) -> Result<Self, FormatError> {
        if candidates.is_empty() {
            return Err(FormatError::NoCandidates);
        }
        Ok(Self {
            candidates,
            detected: None,
        })
    }

    /// A detector over the common log layouts: syslog, ISO 8601 (space or
    /// `T` separated, with or without fractional seconds), ctime and the
    /// Apache access-log stamp.
    pub fn builtin() -> Self {
        Self {
            candidates: BUILTIN_FORMATS
                .iter()
                .map(|&(pattern, tokens)| TimestampFormat::builtin(pattern, tokens))
                .collect(),
            detected: None,
        }
    }

    /// The candidates, in the order they are tried.
    pub fn candidates(&self) -> &[TimestampFormat] {
        &self.candidates
    }

    /// The retained detection, if any.
    pub fn detected(&self) -> Option<&TimestampFormat> {
        self.detected.map(|i| &self.candidates[i])
    }

    /// Returns the first candidate that parses `line`, without retaining it.
    pub fn probe(&self, line: &str) -> Option<&TimestampFormat> {
        self.position(line).map(|i| &self.candidates[i])
    }

    /// Returns the retained format, detecting it from `line` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::NotDetected`] if nothing has been retained yet
    /// and no candidate parses `line`.
    pub fn detect(&mut self, line: &str) -> Result<&TimestampFormat, FormatError> {
        let index = match self.detected {
            Some(index) => index,
            None => {
                let index = self.position(line).ok_or_else(|| FormatError::NotDetected {
                    line: line.to_string(),
                })?;
                tracing::info!(
                    pattern = %self.candidates[index].pattern,
                    tokens = self.candidates[index].tokens,
                    "detected timestamp format"
                );
                self.detected = Some(index);
                index
            }
        };
        Ok(&self.candidates[index])
    }

    fn position(&self, line: &str) -> Option<usize> {
        self.candidates
            .iter()
            .position(|candidate| candidate.parse_line(line).is_ok())
    }
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::builtin()
    }
}
