//! # timeplots
//!
//! Turn timestamped log lines into dense, evenly spaced time series.
//!
//! timeplots reads line-oriented text (application logs, syslog, periodic
//! device counter dumps, or TX/RX packet-rate logs), pulls a timestamp off the front of every line,
//! buckets events into uniform intervals, and fills the intervals where
//! nothing happened, so that a chart drawn from the result shows quiet
//! periods as zeros instead of straight lines across them.
//!
//! ## Quick Start
//!
//! ```rust
//! use timeplots::{FormatDetector, GapFiller, LineClassifier, Pipeline, Plotter, TimestampExtractor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = "\
//! 2019-12-01 08:00:12 sshd: Accepted password
//! 2019-12-01 08:00:40 sshd: Failed password
//! 2019-12-01 08:01:10 sshd: Failed password
//! 2019-12-01 08:03:05 sshd: Failed password
//! ";
//!
//! // Detect the timestamp layout from the first line, count per minute.
//! let extractor = TimestampExtractor::detecting(FormatDetector::builtin(), "1m".parse()?);
//! let classifier = LineClassifier::new(["Accepted", "Failed"])?;
//! let mut pipeline = Pipeline::new(extractor, classifier, GapFiller::default());
//!
//! let run = pipeline.run(log.lines().map(|l| Ok(l.to_string())))?;
//! let failed: Vec<f64> = run.series("Failed").unwrap().values().collect();
//! assert_eq!(failed, vec![1.0, 1.0, 0.0, 1.0]);
//!
//! let mut plotter = Plotter::new();
//! run.plot(&mut plotter, "sshd")?;
//! let html = plotter.to_html("sshd");
//! # assert!(html.contains("<svg"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`TimestampExtractor`] - Parses, floors and memoizes line timestamps
//! - [`LineClassifier`] - Routes lines to categories, first match wins
//! - [`SeriesBuilder`] - Counts events per distinct bucket
//! - [`GapFiller`] - Infers the sampling period and fills missed slots
//! - [`Pipeline`] - Drives a batch of lines through all of the above
//! - [`Plotter`] - Collects charts and writes HTML, CSV or JSON
//!
//! ## Modules
//!
//! - [`format`] - Timestamp layouts and format detection
//! - [`extract`] - Per-line timestamp extraction
//! - [`window`] - Bucketing windows and flooring
//! - [`classify`] - Category matching
//! - [`series`] - Series types and builders
//! - [`fill`] - Gap filling
//! - [`pipeline`] - The log-events batch driver
//! - [`dump`] - Periodic device counter dumps
//! - [`pps`] - TX/RX packet-rate logs
//! - [`input`] - Line input with gzip support
//! - [`render`] - Chart output
//! - [`config`] - Run configuration
//! - [`error`] - Error types

pub mod classify;
pub mod config;
pub mod dump;
pub mod error;
pub mod extract;
pub mod fill;
pub mod format;
pub mod input;
pub mod pipeline;
pub mod pps;
pub mod render;
pub mod series;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use classify::LineClassifier;
pub use config::PlotConfig;
pub use dump::DumpReport;
pub use error::{Result, TimeplotsError};
pub use extract::TimestampExtractor;
pub use fill::GapFiller;
pub use format::{Delimiter, FormatDetector, TimestampFormat};
pub use input::InputLines;
pub use pipeline::{Pipeline, PlotRun, RunStats};
pub use pps::PpsReport;
pub use render::{ChartSink, OutputFormat, Plotter};
pub use series::{Series, SeriesBuilder};
pub use window::BucketingWindow;
