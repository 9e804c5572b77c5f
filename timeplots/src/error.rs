//! Error types for the timeplots pipeline.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// The main error type for all timeplots operations.
///
/// Each variant wraps the error enum of one concern. Callers that need to
/// tell per-line failures apart from fatal ones match on
/// [`TimeplotsError::Extract`], which is the only per-line variant.
#[derive(Error, Debug)]
pub enum TimeplotsError {
    /// Error describing or detecting a timestamp format.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// A single line did not yield a timestamp.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Error parsing a bucketing window specification.
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Error compiling a category pattern.
    #[error("classify error: {0}")]
    Classify(#[from] ClassifyError),

    /// Error building a series.
    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    /// Error reading periodic device dumps.
    #[error("dump error: {0}")]
    Dump(#[from] DumpError),

    /// Error reading packet-rate logs.
    #[error("pps error: {0}")]
    Pps(#[from] PpsError),

    /// Error reading input lines.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Error producing charts or exports.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Error loading or validating the run configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl TimeplotsError {
    /// Returns true if this error only concerns a single input line.
    ///
    /// Per-line errors drop the line; every other error aborts the run.
    pub fn is_per_line(&self) -> bool {
        matches!(self, Self::Extract(_))
    }
}

/// Errors describing or detecting a timestamp format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The pattern contains an unknown or malformed directive.
    #[error("invalid timestamp pattern '{pattern}'")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
    },

    /// The timestamp would span zero tokens.
    #[error("timestamp pattern '{pattern}' must span at least one token")]
    ZeroTokens {
        /// The rejected pattern.
        pattern: String,
    },

    /// No candidate format matched the inspected line.
    #[error("no timestamp format detected in line '{line}'")]
    NotDetected {
        /// The line that was inspected.
        line: String,
    },

    /// A format was already detected and cannot be replaced.
    #[error("timestamp format already detected as '{pattern}'")]
    AlreadyDetected {
        /// The pattern that was locked in.
        pattern: String,
    },

    /// No candidate formats were supplied to the detector.
    #[error("no candidate timestamp formats configured")]
    NoCandidates,
}

/// Per-line extraction failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The timestamp prefix did not match the pattern.
    #[error("'{text}' does not match '{pattern}': {source}")]
    Parse {
        /// The rejoined timestamp prefix.
        text: String,
        /// The pattern it was parsed against.
        pattern: String,
        /// The underlying chrono error.
        #[source]
        source: chrono::ParseError,
    },

    /// Flooring moved the timestamp outside the representable range.
    #[error("timestamp {timestamp} cannot be floored to a {window_secs}s window")]
    OutOfRange {
        /// The parsed timestamp.
        timestamp: NaiveDateTime,
        /// The window length in seconds.
        window_secs: u64,
    },
}

/// Errors parsing a bucketing window specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// The specification was empty.
    #[error("empty interval specification")]
    Empty,

    /// The magnitude is not a non-negative integer.
    #[error("invalid interval magnitude in '{spec}'")]
    InvalidMagnitude {
        /// The full specification.
        spec: String,
    },

    /// The unit suffix is not one of s, m, h, d.
    #[error("unknown interval unit '{unit}' in '{spec}': use s, m, h, or d")]
    UnknownUnit {
        /// The full specification.
        spec: String,
        /// The rejected suffix.
        unit: String,
    },

    /// The window does not fit in the supported range.
    #[error("interval '{spec}' is too large")]
    Overflow {
        /// The full specification.
        spec: String,
    },
}

/// Errors compiling category patterns.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// A category pattern is not a valid regular expression.
    #[error("invalid category pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// Two categories were declared with the same label.
    #[error("category '{label}' declared more than once")]
    DuplicateLabel {
        /// The repeated label.
        label: String,
    },
}

/// Errors building a series.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// There were no data points to group.
    #[error("cannot build a series from zero data points")]
    Empty,

    /// Timestamps and values differ in length.
    #[error("{timestamps} timestamps but {values} values")]
    LengthMismatch {
        /// Number of timestamps supplied.
        timestamps: usize,
        /// Number of values supplied.
        values: usize,
    },

    /// The same timestamp was supplied twice in aligned mode.
    #[error("duplicate timestamp {timestamp}")]
    DuplicateTimestamp {
        /// The repeated timestamp.
        timestamp: NaiveDateTime,
    },
}

/// Errors reading periodic device dumps.
#[derive(Error, Debug)]
pub enum DumpError {
    /// None of the inputs contained a dump header.
    #[error("no 'periodic dump at' header found in any input")]
    NoHeaders,

    /// A dump header carried an unparseable timestamp.
    #[error("invalid dump header '{line}': {source}")]
    InvalidHeader {
        /// The header line.
        line: String,
        /// The underlying chrono error.
        #[source]
        source: chrono::ParseError,
    },

    /// A counter line could not be split into key/value pairs.
    #[error("invalid counter line '{line}'")]
    InvalidCounters {
        /// The offending line.
        line: String,
    },

    /// Two consecutive samples are further apart than allowed.
    #[error("gap of {gap_secs}s between {previous} and {next} exceeds {max_gap_secs}s")]
    Discontiguous {
        /// The earlier sample.
        previous: NaiveDateTime,
        /// The later sample.
        next: NaiveDateTime,
        /// Observed gap in seconds.
        gap_secs: i64,
        /// Allowed gap in seconds.
        max_gap_secs: i64,
    },

    /// Fewer than two network samples, so no deltas can be computed.
    #[error("need at least 2 network samples, found {count}")]
    TooFewSamples {
        /// Number of samples found.
        count: usize,
    },

    /// The sample period must be positive.
    #[error("sample period must be positive")]
    ZeroPeriod,

    /// The sample period does not fit in a time delta.
    #[error("sample period of {secs}s is out of range")]
    PeriodOutOfRange {
        /// The requested period in seconds.
        secs: i64,
    },
}

/// Errors reading packet-rate logs.
#[derive(Error, Debug)]
pub enum PpsError {
    /// The TX/RX section splitter failed to compile.
    #[error("invalid TX/RX splitter: {0}")]
    Splitter(#[from] regex::Error),

    /// A timestamped line lacks exactly one TX and one RX section.
    #[error("expected one TX and one RX section in '{line}'")]
    InvalidLine {
        /// The offending line.
        line: String,
    },

    /// The TX section names no known measurement.
    #[error("no known measurement in '{line}'")]
    UnknownMeasurement {
        /// The offending line.
        line: String,
    },

    /// No line carried a reading.
    #[error("no TX/RX readings found")]
    NoReadings,
}

/// Errors reading input lines.
#[derive(Error, Debug)]
pub enum InputError {
    /// An input file could not be opened.
    #[error("failed to open '{}': {source}", path.display())]
    Open {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from an input failed mid-stream.
    #[error("failed to read '{name}': {source}")]
    Read {
        /// The file path, or `-` for stdin.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors producing charts or exports.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A line was added before any chart was started.
    #[error("line '{line}' added before a chart was started")]
    NoActiveChart {
        /// The name of the rejected line.
        line: String,
    },

    /// Writing the output failed.
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        /// The output path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing to a stream failed.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing chart data failed.
    #[error("failed to serialize chart data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing a CSV record failed.
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors loading or validating the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Load {
        /// The config path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::config::PlotConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The delimiter is empty.
    #[error("delimiter must not be empty")]
    EmptyDelimiter,
}

/// Type alias for `Result<T, TimeplotsError>`.
pub type Result<T> = std::result::Result<T, TimeplotsError>;
