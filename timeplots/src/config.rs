//! Run configuration for the log-events mode.
//!
//! A [`PlotConfig`] holds everything needed to turn log lines into charts:
//! the timestamp layout (or nothing, to detect it), category patterns, the
//! bucketing window, and output settings. It can be written by hand as JSON
//! or assembled from command-line flags; either way [`PlotConfig::validate`]
//! checks it before any input is read.
//!
//! # Example
//!
//! ```rust
//! use timeplots::config::PlotConfig;
//!
//! let config: PlotConfig = serde_json::from_str(r#"{
//!     "pattern": "%b %d %H:%M:%S",
//!     "categories": ["Accepted", "Failed"],
//!     "interval": "5m"
//! }"#)?;
//! config.validate()?;
//! assert_eq!(config.title, "Events over Time");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::LineClassifier;
use crate::error::{ConfigError, Result};
use crate::extract::TimestampExtractor;
use crate::fill::GapFiller;
use crate::format::{Delimiter, FormatDetector, TimestampFormat};
use crate::render::OutputFormat;
use crate::window::BucketingWindow;

/// Default chart title.
pub const DEFAULT_TITLE: &str = "Events over Time";

/// Default output file.
pub const DEFAULT_OUTPUT: &str = "logplot.html";

/// Configuration of one log-events run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotConfig {
    /// strftime-style timestamp pattern. Detected from the input when unset.
    pub pattern: Option<String>,

    /// Literal token separator. Whitespace when unset.
    pub delimiter: Option<String>,

    /// Number of tokens the timestamp spans.
    ///
    /// Derived from `pattern` when unset. Ignored while detecting.
    pub tokens: Option<usize>,

    /// Category regexes, in priority order. Empty means every line counts.
    pub categories: Vec<String>,

    /// Bucketing window such as `30s`, `5m`, `1h` or `7d`. No bucketing when unset.
    pub interval: Option<String>,

    /// Value synthesized for empty slots.
    pub fill: f64,

    /// Page and chart title.
    pub title: String,

    /// Output file.
    pub output: PathBuf,

    /// Output encoding.
    pub export: OutputFormat,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            delimiter: None,
            tokens: None,
            categories: Vec::new(),
            interval: None,
            fill: 0.0,
            title: DEFAULT_TITLE.to_string(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            export: OutputFormat::Html,
        }
    }
}

impl PlotConfig {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or any
    /// error from [`PlotConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every setting that can fail before input is read.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting: delimiter, timestamp pattern,
    /// interval, or category pattern.
    pub fn validate(&self) -> Result<()> {
        self.timestamp_format()?;
        self.window()?;
        self.classifier()?;
        Ok(())
    }

    /// The token delimiter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyDelimiter`] for an empty delimiter.
    pub fn delimiter(&self) -> Result<Delimiter> {
        match self.delimiter.as_deref() {
            None => Ok(Delimiter::Whitespace),
            Some("") => Err(ConfigError::EmptyDelimiter.into()),
            Some(sep) if sep.trim().is_empty() => Ok(Delimiter::Whitespace),
            Some(sep) => Ok(Delimiter::Literal(sep.to_string())),
        }
    }

    /// The explicit timestamp format, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern or token count is invalid.
    pub fn timestamp_format(&self) -> Result<Option<TimestampFormat>> {
        let delimiter = self.delimiter()?;
        let Some(pattern) = self.pattern.as_deref() else {
            return Ok(None);
        };
        let format = match self.tokens {
            Some(tokens) => TimestampFormat::new(pattern, delimiter, tokens)?,
            None => TimestampFormat::from_pattern(pattern, delimiter)?,
        };
        Ok(Some(format))
    }

    /// The bucketing window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::WindowError`] for a malformed interval.
    pub fn window(&self) -> Result<BucketingWindow> {
        match self.interval.as_deref() {
            None => Ok(BucketingWindow::NONE),
            Some(spec) => Ok(spec.parse()?),
        }
    }

    /// The line classifier.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ClassifyError`] for a bad category pattern.
    pub fn classifier(&self) -> Result<LineClassifier> {
        Ok(LineClassifier::new(&self.categories)?)
    }

    /// A fresh extractor: fixed format if configured, detecting otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the format or window is invalid.
    pub fn extractor(&self) -> Result<TimestampExtractor> {
        let window = self.window()?;
        Ok(match self.timestamp_format()? {
            Some(format) => TimestampExtractor::new(format, window),
            None => TimestampExtractor::detecting(FormatDetector::builtin(), window),
        })
    }

    /// The gap filler.
    pub fn filler(&self) -> GapFiller {
        GapFiller::new(self.fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeplotsError;

    #[test]
    fn test_defaults() {
        let config = PlotConfig::default();
        assert_eq!(config.title, DEFAULT_TITLE);
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert!(config.validate().is_ok());
        assert!(config.extractor().unwrap().format().is_none());
        assert!(config.window().unwrap().is_none());
        assert!(config.classifier().unwrap().is_all_lines());
    }

    #[test]
    fn test_explicit_format_and_tokens() {
        let config = PlotConfig {
            pattern: Some("%Y-%m-%d %H:%M:%S".to_string()),
            ..PlotConfig::default()
        };
        assert_eq!(config.timestamp_format().unwrap().unwrap().tokens(), 2);

        let config = PlotConfig {
            pattern: Some("%Y-%m-%d|%H:%M:%S".to_string()),
            delimiter: Some("|".to_string()),
            tokens: Some(2),
            ..PlotConfig::default()
        };
        let format = config.timestamp_format().unwrap().unwrap();
        assert_eq!(format.delimiter(), &Delimiter::Literal("|".to_string()));
        assert_eq!(format.tokens(), 2);
    }

    #[test]
    fn test_validation_failures() {
        let bad_window = PlotConfig {
            interval: Some("5w".to_string()),
            ..PlotConfig::default()
        };
        assert!(matches!(bad_window.validate(), Err(TimeplotsError::Window(_))));

        let bad_pattern = PlotConfig {
            pattern: Some("%Q".to_string()),
            ..PlotConfig::default()
        };
        assert!(matches!(bad_pattern.validate(), Err(TimeplotsError::Format(_))));

        let bad_category = PlotConfig {
            categories: vec!["(".to_string()],
            ..PlotConfig::default()
        };
        assert!(matches!(bad_category.validate(), Err(TimeplotsError::Classify(_))));

        let empty_delimiter = PlotConfig {
            delimiter: Some(String::new()),
            ..PlotConfig::default()
        };
        assert!(matches!(
            empty_delimiter.validate(),
            Err(TimeplotsError::Config(ConfigError::EmptyDelimiter))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.json");
        fs::write(
            &path,
            r#"{"categories": ["sshd"], "interval": "1h", "export": "csv", "fill": -1.0}"#,
        )
        .unwrap();

        let config = PlotConfig::load(&path).unwrap();
        assert_eq!(config.categories, vec!["sshd"]);
        assert_eq!(config.export, OutputFormat::Csv);
        assert_eq!(config.window().unwrap().secs(), 3600);
        assert_eq!(config.filler().default_value(), -1.0);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PlotConfig::load(&dir.path().join("missing.json")),
            Err(TimeplotsError::Config(ConfigError::Load { .. }))
        ));

        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"colour": "red"}"#).unwrap();
        assert!(matches!(
            PlotConfig::load(&path),
            Err(TimeplotsError::Config(ConfigError::Parse { .. }))
        ));
    }
}
