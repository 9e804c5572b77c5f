//! Packet-rate ("pps") logs: TX and RX readings per measurement.
//!
//! Each reading is one line. The timestamp is spread over words 2 to 4
//! and word 6; everything after it is split at the `TX` and `RX` markers:
//!
//! ```text
//! Sun Dec 01 08:00:01 UTC 2019: TX 1200 pkts/s RX 900 pkts/s
//! Sun Dec 01 08:00:01 UTC 2019: TX 96 kB/s RX 71 kB/s
//! Sun Dec 01 08:00:01 UTC 2019: TX PktLen 512 RX PktLen 498
//! ```
//!
//! The measurement name is the first of [`MEASURES`] found in the TX
//! section. Each measurement becomes one chart with an `rx` and a `tx`
//! line.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{InputError, PpsError, RenderError, Result};
use crate::input::InputLines;
use crate::render::ChartSink;
use crate::series::Series;

/// Layout of the rejoined timestamp words.
pub const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S %Y:";

/// Known measurements, matched in this order.
pub const MEASURES: [&str; 3] = ["pkts/s", "kB/s", "PktLen"];

/// Substring every pps log file name contains.
pub const FILE_MARKER: &str = "pps";

/// Separates the prefix, TX and RX sections of a reading.
const SPLITTER: &str = r" ?[TR]X ?";

/// Returns the timestamp of a pps line, or `None` if it has none.
pub fn parse_timestamp(line: &str) -> Option<NaiveDateTime> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 6 {
        return None;
    }
    let stamp = format!("{} {}", words[1..4].join(" "), words[5]);
    NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).ok()
}

/// One line's TX and RX values for a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// One of [`MEASURES`].
    pub measurement: &'static str,
    /// When the reading was taken.
    pub timestamp: NaiveDateTime,
    /// First whole number in the TX section.
    pub tx: Option<u64>,
    /// First whole number in the RX section.
    pub rx: Option<u64>,
}

/// Splits pps lines into [`Reading`]s.
#[derive(Debug, Clone)]
pub struct PpsParser {
    splitter: Regex,
}

impl PpsParser {
    /// Creates a parser.
    ///
    /// # Errors
    ///
    /// Returns [`PpsError::Splitter`] if the section splitter fails to compile.
    pub fn new() -> std::result::Result<Self, PpsError> {
        Ok(Self {
            splitter: Regex::new(SPLITTER)?,
        })
    }

    /// Parses one line. Lines without a timestamp yield `None`.
    ///
    /// # Errors
    ///
    /// - [`PpsError::InvalidLine`] unless the line has exactly one TX and
    ///   one RX section.
    /// - [`PpsError::UnknownMeasurement`] if the TX section names none of
    ///   [`MEASURES`].
    pub fn parse_line(&self, line: &str) -> std::result::Result<Option<Reading>, PpsError> {
        let Some(timestamp) = parse_timestamp(line) else {
            return Ok(None);
        };
        let sections: Vec<&str> = self.splitter.split(line).collect();
        let [_, tx, rx] = sections.as_slice() else {
            return Err(PpsError::InvalidLine {
                line: line.to_string(),
            });
        };
        let measurement = MEASURES
            .into_iter()
            .find(|m| tx.contains(m))
            .ok_or_else(|| PpsError::UnknownMeasurement {
                line: line.to_string(),
            })?;
        Ok(Some(Reading {
            measurement,
            timestamp,
            tx: first_number(tx),
            rx: first_number(rx),
        }))
    }
}

fn first_number(text: &str) -> Option<u64> {
    text.split_whitespace()
        .filter(|word| word.bytes().all(|b| b.is_ascii_digit()))
        .find_map(|word| word.parse().ok())
}

/// Returns true if any line of the file at `path` carries a pps timestamp.
///
/// # Errors
///
/// Returns [`InputError`] if the file cannot be read.
pub fn has_readings(path: &Path) -> std::result::Result<bool, InputError> {
    for line in InputLines::from_paths(&[path]) {
        if parse_timestamp(&line?).is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Lists files in `dir` whose name contains [`FILE_MARKER`] and that hold
/// at least one reading, sorted by name. Subdirectories are not searched.
///
/// # Errors
///
/// Returns [`InputError`] if the directory or a candidate cannot be read.
pub fn find_files(dir: &Path) -> std::result::Result<Vec<PathBuf>, InputError> {
    let read_err = |source| InputError::Read {
        name: dir.display().to_string(),
        source,
    };
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.contains(FILE_MARKER) && !name.contains("html") && has_readings(&path)? {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// RX and TX series for one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// One of [`MEASURES`].
    pub name: String,
    /// Received values.
    pub rx: Series,
    /// Transmitted values.
    pub tx: Series,
}

/// All measurements read from a pps log, in order of first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct PpsReport {
    start: NaiveDateTime,
    end: NaiveDateTime,
    measurements: Vec<Measurement>,
}

impl PpsReport {
    /// Reads every reading from `lines`.
    ///
    /// Lines without a timestamp are ignored. Timestamped lines that do not
    /// split into a known measurement are dropped and counted. Within one
    /// measurement a repeated timestamp keeps the first reading.
    ///
    /// # Errors
    ///
    /// - Any input error.
    /// - [`PpsError::NoReadings`] if no line produced a reading.
    pub fn from_lines<I>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = std::result::Result<String, InputError>>,
    {
        type Points = BTreeMap<NaiveDateTime, (Option<u64>, Option<u64>)>;

        let parser = PpsParser::new()?;
        let mut order: Vec<&'static str> = Vec::new();
        let mut readings: BTreeMap<&'static str, Points> = BTreeMap::new();
        let (mut dropped, mut repeated) = (0u64, 0u64);

        for (number, line) in lines.into_iter().enumerate() {
            let line = line?;
            let reading = match parser.parse_line(&line) {
                Ok(Some(reading)) => reading,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(line = number + 1, error = %e, "dropping line");
                    dropped += 1;
                    continue;
                }
            };
            if !readings.contains_key(reading.measurement) {
                order.push(reading.measurement);
            }
            let points = readings.entry(reading.measurement).or_default();
            if points.contains_key(&reading.timestamp) {
                repeated += 1;
                continue;
            }
            points.insert(reading.timestamp, (reading.tx, reading.rx));
        }

        if dropped > 0 {
            tracing::warn!(dropped, "lines without a TX/RX reading");
        }
        if repeated > 0 {
            tracing::warn!(repeated, "repeated readings skipped");
        }

        let mut measurements = Vec::with_capacity(order.len());
        let (mut start, mut end) = (None::<NaiveDateTime>, None::<NaiveDateTime>);
        for name in order {
            let Some(points) = readings.remove(name) else {
                continue;
            };
            if let Some((first, _)) = points.first_key_value() {
                start = Some(start.map_or(*first, |s| s.min(*first)));
            }
            if let Some((last, _)) = points.last_key_value() {
                end = Some(end.map_or(*last, |e| e.max(*last)));
            }
            let tx = aligned(points.iter().map(|(ts, (tx, _))| (*ts, *tx)))?;
            let rx = aligned(points.iter().map(|(ts, (_, rx))| (*ts, *rx)))?;
            measurements.push(Measurement {
                name: name.to_string(),
                rx,
                tx,
            });
        }

        let (Some(start), Some(end)) = (start, end) else {
            return Err(PpsError::NoReadings.into());
        };
        tracing::info!(measurements = measurements.len(), %start, %end, "collected pps readings");
        Ok(Self {
            start,
            end,
            measurements,
        })
    }

    /// Earliest reading.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Latest reading.
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Measurements in order of first appearance.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// One measurement by name.
    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.name == name)
    }

    /// Covered period, e.g. `20191201.080001 - 20191201.090001`.
    pub fn timeframe(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%Y%m%d.%H%M%S"),
            self.end.format("%Y%m%d.%H%M%S")
        )
    }

    /// Emits the title and timeframe headings, then one chart per
    /// measurement. Returns the number of charts emitted.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the sink rejects a line.
    pub fn plot<S: ChartSink>(&self, sink: &mut S, title: &str) -> std::result::Result<usize, RenderError> {
        sink.heading(title);
        sink.heading(&self.timeframe());
        for measurement in &self.measurements {
            tracing::info!(chart = %measurement.name, "generating plot");
            sink.new_chart(&measurement.name, units_for(&measurement.name));
            if !measurement.rx.is_empty() {
                sink.add_line("rx", &measurement.rx, Some("blue"))?;
            }
            if !measurement.tx.is_empty() {
                sink.add_line("tx", &measurement.tx, Some("green"))?;
            }
        }
        Ok(self.measurements.len())
    }
}

/// Builds a series from the readings that carry a value.
#[allow(clippy::cast_precision_loss)] // Readings fit comfortably in f64
fn aligned<I>(points: I) -> std::result::Result<Series, crate::error::SeriesError>
where
    I: Iterator<Item = (NaiveDateTime, Option<u64>)>,
{
    let (timestamps, values): (Vec<_>, Vec<_>) = points
        .filter_map(|(ts, value)| value.map(|v| (ts, v as f64)))
        .unzip();
    if timestamps.is_empty() {
        return Ok(Series::empty());
    }
    Series::aligned(timestamps, values)
}

fn units_for(measurement: &str) -> &'static str {
    match measurement {
        "pkts/s" => "pps",
        "kB/s" => "kB/s",
        _ => "bytes",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeplotsError;
    use crate::render::Plotter;
    use chrono::NaiveDate;

    fn at(m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 12, 1)
            .unwrap()
            .and_hms_opt(8, m, s)
            .unwrap()
    }

    fn lines(text: &str) -> Vec<std::result::Result<String, InputError>> {
        text.lines().map(|l| Ok(l.to_string())).collect()
    }

    #[test]
    fn test_parse_timestamp_skips_the_fifth_word() {
        assert_eq!(
            parse_timestamp("Sun Dec 01 08:00:01 UTC 2019: TX 1 pkts/s RX 2 pkts/s"),
            Some(at(0, 1))
        );
        assert_eq!(parse_timestamp("Sun Dec 01 08:00:01 UTC"), None);
        assert_eq!(parse_timestamp("interface stats follow"), None);
    }

    #[test]
    fn test_parse_line_sections() {
        let parser = PpsParser::new().unwrap();
        let reading = parser
            .parse_line("Sun Dec 01 08:00:01 UTC 2019: TX PktLen 512 RX PktLen 498")
            .unwrap()
            .unwrap();
        assert_eq!(reading.measurement, "PktLen");
        assert_eq!((reading.tx, reading.rx), (Some(512), Some(498)));

        let reading = parser
            .parse_line("Sun Dec 01 08:00:01 UTC 2019: TX n/a kB/s RX 71 kB/s")
            .unwrap()
            .unwrap();
        assert_eq!((reading.measurement, reading.tx, reading.rx), ("kB/s", None, Some(71)));

        assert_eq!(parser.parse_line("no stamp here").unwrap(), None);
    }

    #[test]
    fn test_parse_line_rejects_malformed_sections() {
        let parser = PpsParser::new().unwrap();
        assert!(matches!(
            parser.parse_line("Sun Dec 01 08:00:01 UTC 2019: TX 5 pkts/s"),
            Err(PpsError::InvalidLine { .. })
        ));
        assert!(matches!(
            parser.parse_line("Sun Dec 01 08:00:01 UTC 2019: TX 5 frames RX 6 frames"),
            Err(PpsError::UnknownMeasurement { .. })
        ));
    }

    #[test]
    fn test_report_groups_measurements_in_order() {
        let input = "\
pps monitor started
Sun Dec 01 08:00:01 UTC 2019: TX 96 kB/s RX 71 kB/s
Sun Dec 01 08:00:01 UTC 2019: TX 1200 pkts/s RX 900 pkts/s
Sun Dec 01 08:00:02 UTC 2019: TX 1300 pkts/s RX 950 pkts/s
Sun Dec 01 08:00:02 UTC 2019: TX 1 pkts/s RX 1 pkts/s
Sun Dec 01 08:00:02 UTC 2019: TX garbage
Sun Dec 01 08:00:03 UTC 2019: TX 99 kB/s RX 70 kB/s
";
        let report = PpsReport::from_lines(lines(input)).unwrap();
        let names: Vec<&str> = report.measurements().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["kB/s", "pkts/s"]);

        let pps = report.measurement("pkts/s").unwrap();
        assert_eq!(pps.tx.points(), &[(at(0, 1), 1200.0), (at(0, 2), 1300.0)]);
        assert_eq!(pps.rx.points(), &[(at(0, 1), 900.0), (at(0, 2), 950.0)]);
        assert_eq!(report.timeframe(), "20191201.080001 - 20191201.080003");
    }

    #[test]
    fn test_report_without_readings() {
        assert!(matches!(
            PpsReport::from_lines(lines("nothing\nto see\n")),
            Err(TimeplotsError::Pps(PpsError::NoReadings))
        ));
    }

    #[test]
    fn test_plot_one_chart_per_measurement() {
        let input = "\
Sun Dec 01 08:00:01 UTC 2019: TX 1200 pkts/s RX 900 pkts/s
Sun Dec 01 08:00:01 UTC 2019: TX PktLen 512 RX PktLen 498
Sun Dec 01 08:00:02 UTC 2019: TX 1300 pkts/s RX 950 pkts/s
";
        let report = PpsReport::from_lines(lines(input)).unwrap();
        let mut plotter = Plotter::new();
        assert_eq!(report.plot(&mut plotter, "pps_plot-x").unwrap(), 2);

        let charts: Vec<_> = plotter.charts().collect();
        assert_eq!(charts[0].title, "pkts/s");
        assert_eq!(charts[0].units, "pps");
        let colors: Vec<&str> = charts[0].lines.iter().map(|l| l.color.as_str()).collect();
        assert_eq!(colors, vec!["blue", "green"]);
        assert_eq!(charts[1].units, "bytes");
        assert_eq!(plotter.blocks().len(), 4);
    }
}
