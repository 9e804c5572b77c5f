//! The log-events batch driver.
//!
//! ```text
//! lines ──> LineClassifier ──> TimestampExtractor ──> SeriesBuilder[category]
//!                                                          │
//!                       ChartSink <── GapFiller <── Series ┘
//! ```
//!
//! Blank lines are skipped. Lines that match no category are counted and
//! ignored. A line whose timestamp does not parse is dropped and logged;
//! a failure to detect the timestamp format aborts the run.

use crate::classify::LineClassifier;
use crate::config::PlotConfig;
use crate::error::{InputError, RenderError, Result, SeriesError};
use crate::extract::TimestampExtractor;
use crate::fill::GapFiller;
use crate::render::ChartSink;
use crate::series::{Series, SeriesBuilder};
use crate::window::BucketingWindow;

/// Line counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Lines read, blank ones included.
    pub lines: u64,
    /// Blank lines skipped.
    pub blank: u64,
    /// Lines that matched no category.
    pub unmatched: u64,
    /// Lines whose timestamp did not parse.
    pub dropped: u64,
    /// Lines counted into a category.
    pub parsed: u64,
}

/// Drives lines through extraction, classification and gap filling.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extractor: TimestampExtractor,
    classifier: LineClassifier,
    filler: GapFiller,
}

impl Pipeline {
    /// Creates a pipeline from its stages.
    pub fn new(extractor: TimestampExtractor, classifier: LineClassifier, filler: GapFiller) -> Self {
        Self {
            extractor,
            classifier,
            filler,
        }
    }

    /// Creates a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any part of the configuration is invalid.
    pub fn from_config(config: &PlotConfig) -> Result<Self> {
        Ok(Self::new(config.extractor()?, config.classifier()?, config.filler()))
    }

    /// The extractor, with its detected format and memo statistics.
    pub fn extractor(&self) -> &TimestampExtractor {
        &self.extractor
    }

    /// Consumes `lines` and returns one dense series per category.
    ///
    /// # Errors
    ///
    /// - Any input error, or a failure to detect the timestamp format.
    /// - [`SeriesError::Empty`] if no line produced a timestamp and none was
    ///   left out by the classifier. Input where every line misses every
    ///   category gives an empty series per category.
    pub fn run<I>(&mut self, lines: I) -> Result<PlotRun>
    where
        I: IntoIterator<Item = std::result::Result<String, InputError>>,
    {
        let labels: Vec<String> = self
            .classifier
            .labels()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut builders: Vec<SeriesBuilder> = labels.iter().map(|_| SeriesBuilder::new()).collect();
        let mut stats = RunStats::default();

        for line in lines {
            let line = line?;
            stats.lines += 1;
            if line.trim().is_empty() {
                stats.blank += 1;
                continue;
            }
            let Some(index) = self.classifier.classify_index(&line) else {
                stats.unmatched += 1;
                continue;
            };
            match self.extractor.extract(&line) {
                Ok(timestamp) => {
                    builders[index].push(timestamp);
                    stats.parsed += 1;
                }
                Err(e) if e.is_per_line() => {
                    tracing::debug!(line = stats.lines, error = %e, "dropping line");
                    stats.dropped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if stats.dropped > 0 {
            tracing::warn!(dropped = stats.dropped, "lines without a parseable timestamp");
        }
        tracing::info!(
            lines = stats.lines,
            parsed = stats.parsed,
            unmatched = stats.unmatched,
            distinct_stamps = self.extractor.cache_len(),
            "read input"
        );
        // Lines that all missed every category still make a (blank) run.
        if stats.parsed == 0 && stats.unmatched == 0 {
            return Err(SeriesError::Empty.into());
        }

        let mut categories = Vec::with_capacity(labels.len());
        for (label, builder) in labels.into_iter().zip(builders) {
            let series = if builder.is_empty() {
                tracing::info!(category = %label, "no matching lines");
                Series::empty()
            } else {
                let counted = builder.build()?;
                self.filler.fill(&counted)
            };
            categories.push((label, series));
        }

        Ok(PlotRun {
            categories,
            stats,
            window: self.extractor.window(),
        })
    }
}

/// The outcome of [`Pipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRun {
    categories: Vec<(String, Series)>,
    stats: RunStats,
    window: BucketingWindow,
}

impl PlotRun {
    /// Dense series per category, in declaration order. Categories with no
    /// matching line hold an empty series.
    pub fn categories(&self) -> &[(String, Series)] {
        &self.categories
    }

    /// The series for one category label.
    pub fn series(&self, label: &str) -> Option<&Series> {
        self.categories
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, series)| series)
    }

    /// Line counts.
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Value-axis label for the window in use.
    pub fn units(&self) -> String {
        self.window.units_label()
    }

    /// Emits a single chart with one line per non-empty category.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the sink rejects a line.
    pub fn plot<S: ChartSink>(&self, sink: &mut S, title: &str) -> std::result::Result<(), RenderError> {
        sink.new_chart(title, &self.units());
        for (label, series) in &self.categories {
            if !series.is_empty() {
                sink.add_line(label, series, None)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormatError, TimeplotsError};
    use crate::format::{Delimiter, FormatDetector, TimestampFormat};
    use crate::render::Plotter;

    fn lines(text: &str) -> Vec<std::result::Result<String, InputError>> {
        text.lines().map(|l| Ok(l.to_string())).collect()
    }

    fn syslog(window: &str, categories: &[&str]) -> Pipeline {
        let format = TimestampFormat::from_pattern("%b %d %H:%M:%S", Delimiter::Whitespace).unwrap();
        Pipeline::new(
            TimestampExtractor::new(format, window.parse().unwrap()),
            LineClassifier::new(categories).unwrap(),
            GapFiller::default(),
        )
    }

    #[test]
    fn test_counts_and_fills_per_category() {
        let input = "\
Jan 05 10:00:01 host sshd: Accepted password for bob
Jan 05 10:00:40 host sshd: Failed password for root
Jan 05 10:01:10 host sshd: Accepted password for bob
Jan 05 10:01:30 host sshd: Failed password for root
Jan 05 10:03:59 host sshd: Accepted publickey for amy
Jan 05 10:04:00 host cron: job started
";
        let mut pipeline = syslog("1m", &["Accepted", "Failed"]);
        let run = pipeline.run(lines(input)).unwrap();

        let accepted: Vec<f64> = run.series("Accepted").unwrap().values().collect();
        assert_eq!(accepted, vec![1.0, 1.0, 0.0, 1.0]);
        let failed: Vec<f64> = run.series("Failed").unwrap().values().collect();
        assert_eq!(failed, vec![1.0, 1.0]);

        let stats = run.stats();
        assert_eq!(stats.lines, 6);
        assert_eq!(stats.parsed, 5);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(run.units(), "events every 1 minute");
    }

    #[test]
    fn test_bad_lines_are_dropped() {
        let input = "Jan 05 10:00:01 ok\n\ngarbage here now\nJan 05 10:00:01 ok\n";
        let mut pipeline = syslog("0", &[]);
        let run = pipeline.run(lines(input)).unwrap();
        let stats = run.stats();
        assert_eq!((stats.blank, stats.dropped, stats.parsed), (1, 1, 2));
        assert_eq!(run.series("values").unwrap().values().collect::<Vec<_>>(), vec![2.0]);
    }

    #[test]
    fn test_empty_category_stays_empty() {
        let mut pipeline = syslog("0", &["sshd", "nginx"]);
        let run = pipeline.run(lines("Jan 05 10:00:01 sshd: hi\n")).unwrap();
        assert!(run.series("nginx").unwrap().is_empty());

        let mut plotter = Plotter::new();
        run.plot(&mut plotter, "t").unwrap();
        let chart = plotter.charts().next().unwrap();
        assert_eq!(chart.lines.len(), 1);
        assert_eq!(chart.lines[0].name, "sshd");
    }

    #[test]
    fn test_nothing_parsed_is_an_error() {
        let mut pipeline = syslog("0", &[]);
        assert!(matches!(
            pipeline.run(lines("no stamps\nat all\n")),
            Err(TimeplotsError::Series(SeriesError::Empty))
        ));
    }

    #[test]
    fn test_no_matching_lines_gives_empty_categories() {
        let mut pipeline = syslog("0", &["sshd", "nginx"]);
        let run = pipeline
            .run(lines("Jan 05 10:00:01 host kernel: up\nJan 05 10:00:02 host cron: tick\n"))
            .unwrap();

        let labels: Vec<&str> = run.categories().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["sshd", "nginx"]);
        assert!(run.categories().iter().all(|(_, series)| series.is_empty()));
        assert_eq!(run.stats().unmatched, 2);
        assert_eq!(run.stats().parsed, 0);

        let mut plotter = Plotter::new();
        run.plot(&mut plotter, "t").unwrap();
        assert!(plotter.charts().next().unwrap().lines.is_empty());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let mut pipeline = syslog("0", &["sshd"]);
        assert!(matches!(
            pipeline.run(lines("\n\n")),
            Err(TimeplotsError::Series(SeriesError::Empty))
        ));
    }

    #[test]
    fn test_detection_failure_is_fatal() {
        let mut pipeline = Pipeline::new(
            TimestampExtractor::detecting(FormatDetector::builtin(), BucketingWindow::NONE),
            LineClassifier::all_lines(),
            GapFiller::default(),
        );
        let result = pipeline.run(lines("banner line\n2019-12-01 08:00:00 ok\n"));
        assert!(matches!(
            result,
            Err(TimeplotsError::Format(FormatError::NotDetected { .. }))
        ));
    }

    #[test]
    fn test_detects_format_from_first_line() {
        let input = "\n2019-12-01 08:00:00 a\n2019-12-01 09:00:00 b\n2019-12-01 11:00:00 c\n";
        let mut pipeline = Pipeline::new(
            TimestampExtractor::detecting(FormatDetector::builtin(), BucketingWindow::NONE),
            LineClassifier::all_lines(),
            GapFiller::default(),
        );
        let run = pipeline.run(lines(input)).unwrap();
        assert_eq!(
            pipeline.extractor().format().unwrap().pattern(),
            "%Y-%m-%d %H:%M:%S"
        );
        assert_eq!(run.series("values").unwrap().len(), 4);
        assert_eq!(run.units(), "events");
    }
}
