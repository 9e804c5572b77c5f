//! Periodic device dumps: interface counters sampled once a minute.
//!
//! A dump file is a sequence of blocks, each opened by a header line:
//!
//! ```text
//! periodic dump at Sun Dec 01 08:00:01 2019
//! name: [knet0], mtu: [1500], port: [eth0], state: [up],
//! iface name: knet0
//! rx_packets: [1200] tx_packets: [900] rx_bytes: [81000] tx_bytes: [64000]
//! ```
//!
//! Only blocks that carry network counters (`tx_packets`) are sampled.
//! Raw counters are monotonically increasing 32-bit values; consecutive
//! samples are turned into deltas, and packet and byte deltas into rates.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::{DumpError, RenderError, Result};
use crate::input::InputLines;
use crate::render::ChartSink;
use crate::series::Series;

/// Prefix of a block header line.
pub const HEADER_PREFIX: &str = "periodic dump at ";

/// Timestamp layout following [`HEADER_PREFIX`].
pub const HEADER_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Largest allowed gap between consecutive samples, in seconds.
pub const MAX_GAP_SECS: i64 = 301;

/// Sampling period assumed for rate conversion unless told otherwise.
pub const DEFAULT_PERIOD_SECS: i64 = 60;

/// Counter kinds charted per interface, in chart order.
pub const COUNTER_KINDS: [&str; 4] = ["packets per second", "bits per second", "errors", "dropped"];

/// Marker of a block carrying network counters.
const NETWORK_MARKER: &str = "tx_packets";

/// One network sample: raw counters keyed `"<interface>: <counter>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// When the dump was taken.
    pub timestamp: NaiveDateTime,
    /// Raw counter values.
    pub counters: BTreeMap<String, u64>,
}

/// Parses a header line, returning `None` if `line` is not a header.
///
/// # Errors
///
/// Returns [`DumpError::InvalidHeader`] if the header timestamp is malformed.
pub fn parse_header(line: &str) -> std::result::Result<Option<NaiveDateTime>, DumpError> {
    let Some(rest) = line.strip_prefix(HEADER_PREFIX) else {
        return Ok(None);
    };
    NaiveDateTime::parse_from_str(rest.trim(), HEADER_FORMAT)
        .map(Some)
        .map_err(|source| DumpError::InvalidHeader {
            line: line.to_string(),
            source,
        })
}

/// Returns the first header timestamp in the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the header is malformed.
pub fn first_header(path: &Path) -> Result<Option<NaiveDateTime>> {
    for line in InputLines::from_paths(&[path]) {
        if let Some(timestamp) = parse_header(&line?)? {
            return Ok(Some(timestamp));
        }
    }
    Ok(None)
}

/// Orders dump files by their first header; files without one are skipped.
///
/// # Errors
///
/// Returns an error if a file cannot be read or has a malformed header.
pub fn sort_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut dated = Vec::with_capacity(paths.len());
    for path in paths {
        match first_header(path)? {
            Some(timestamp) => dated.push((timestamp, path.clone())),
            None => tracing::warn!(path = %path.display(), "no dump header, skipping"),
        }
    }
    dated.sort_by_key(|(timestamp, _)| *timestamp);
    Ok(dated.into_iter().map(|(_, path)| path).collect())
}

/// Splits lines into header-led blocks that carry network counters.
///
/// Lines before the first header belong to no block and are discarded.
///
/// # Errors
///
/// Returns the first input error encountered.
pub fn split_blocks<I>(lines: I) -> Result<Vec<Vec<String>>>
where
    I: IntoIterator<Item = std::result::Result<String, crate::error::InputError>>,
{
    let mut blocks = Vec::new();
    let mut current: Option<Vec<String>> = None;
    for line in lines {
        let line = line?;
        if line.starts_with(HEADER_PREFIX) {
            blocks.extend(current.take().filter(|b| is_network_block(b)));
            current = Some(vec![line]);
        } else if let Some(block) = current.as_mut() {
            block.push(line);
        }
    }
    blocks.extend(current.filter(|b| is_network_block(b)));
    Ok(blocks)
}

fn is_network_block(block: &[String]) -> bool {
    block.iter().any(|line| line.contains(NETWORK_MARKER))
}

/// Parses one header-led block into a [`Sample`].
///
/// # Errors
///
/// Returns [`DumpError`] if the header is missing or malformed, or a counter
/// line cannot be read.
pub fn parse_block(block: &[String]) -> std::result::Result<Sample, DumpError> {
    let timestamp = match block.first() {
        Some(line) => parse_header(line)?.ok_or(DumpError::NoHeaders)?,
        None => return Err(DumpError::NoHeaders),
    };

    let mut ports: BTreeMap<&str, &str> = BTreeMap::new();
    let mut counters = BTreeMap::new();
    let mut iface: Option<String> = None;

    for line in &block[1..] {
        if line.starts_with("name: [knet") {
            if let (Some(knet), Some(port)) = (bracketed(line, "name: ["), bracketed(line, "port: [")) {
                ports.insert(knet, port);
            }
        } else if let Some(name) = line.strip_prefix("iface name: ")
            && name.starts_with("knet")
        {
            let name = name.split_whitespace().last().unwrap_or(name);
            iface = Some(match ports.get(name) {
                Some(port) => format!("{name} ({port})"),
                None => name.to_string(),
            });
        } else if line.starts_with("rx_packets:")
            && let Some(name) = iface.take()
        {
            parse_counters(&name, line, &mut counters)?;
        }
    }

    Ok(Sample { timestamp, counters })
}

/// Returns the word-character value of `label` in `line`, e.g. `port: [eth0]`.
fn bracketed<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let start = line.find(label)? + label.len();
    let rest = &line[start..];
    let value = &rest[..rest.find(']')?];
    let valid = !value.is_empty() && value.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(value)
}

fn parse_counters(
    iface: &str,
    line: &str,
    counters: &mut BTreeMap<String, u64>,
) -> std::result::Result<(), DumpError> {
    let invalid = || DumpError::InvalidCounters {
        line: line.to_string(),
    };
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() % 2 != 0 {
        return Err(invalid());
    }
    for pair in tokens.chunks(2) {
        let key = pair[0].strip_suffix(':').ok_or_else(invalid)?;
        let value = pair[1]
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let key = match key.replace('_', " ").as_str() {
            "rx error" => "rx errors".to_string(),
            other => other.to_string(),
        };
        counters.insert(format!("{iface}: {key}"), value);
    }
    Ok(())
}

/// Reads network samples from dump files, oldest first.
///
/// # Errors
///
/// Returns [`DumpError::NoHeaders`] if no file has a dump header, or any
/// read or parse error.
pub fn load(paths: &[PathBuf]) -> Result<Vec<Sample>> {
    let sorted = sort_files(paths)?;
    if sorted.is_empty() {
        return Err(DumpError::NoHeaders.into());
    }
    let blocks = split_blocks(InputLines::from_paths(&sorted))?;
    let samples = blocks
        .iter()
        .map(|block| parse_block(block))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    tracing::info!(files = sorted.len(), samples = samples.len(), "collected dump samples");
    Ok(samples)
}

/// Converts a sample spacing given in seconds.
///
/// # Errors
///
/// - [`DumpError::ZeroPeriod`] if `secs` is not positive.
/// - [`DumpError::PeriodOutOfRange`] if `secs` overflows a [`TimeDelta`].
pub fn sample_period(secs: i64) -> std::result::Result<TimeDelta, DumpError> {
    if secs <= 0 {
        return Err(DumpError::ZeroPeriod);
    }
    TimeDelta::try_seconds(secs).ok_or(DumpError::PeriodOutOfRange { secs })
}

/// Difference between two readings of a wrapping 32-bit counter.
pub fn counter_delta(before: u64, after: u64) -> u64 {
    if before <= after {
        after - before
    } else {
        (1u64 << 32).saturating_sub(before) + after
    }
}

/// Per-counter delta and rate series computed from consecutive samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpReport {
    start: NaiveDateTime,
    end: NaiveDateTime,
    samples: usize,
    counters: BTreeMap<String, Series>,
}

impl DumpReport {
    /// Computes deltas between consecutive samples.
    ///
    /// Samples are ordered by timestamp; a repeated timestamp keeps the
    /// first sample. Packet counters become `packets per second` and byte
    /// counters `bits per second`, using `period` as the sample spacing.
    ///
    /// # Errors
    ///
    /// - [`DumpError::ZeroPeriod`] if `period` is not positive.
    /// - [`DumpError::TooFewSamples`] with fewer than two distinct samples.
    /// - [`DumpError::Discontiguous`] if two samples are more than
    ///   [`MAX_GAP_SECS`] apart.
    #[allow(clippy::cast_precision_loss)] // Counter deltas fit comfortably in f64
    pub fn from_samples(samples: &[Sample], period: TimeDelta) -> std::result::Result<Self, DumpError> {
        if period <= TimeDelta::zero() {
            return Err(DumpError::ZeroPeriod);
        }
        let period_secs = period.num_milliseconds() as f64 / 1000.0;

        let mut ordered: Vec<&Sample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.timestamp);
        ordered.dedup_by(|later, earlier| {
            let duplicate = later.timestamp == earlier.timestamp;
            if duplicate {
                tracing::warn!(timestamp = %later.timestamp, "duplicate dump sample, skipping");
            }
            duplicate
        });

        let (Some(first), Some(last)) = (ordered.first(), ordered.last()) else {
            return Err(DumpError::TooFewSamples { count: 0 });
        };
        if ordered.len() < 2 {
            return Err(DumpError::TooFewSamples {
                count: ordered.len(),
            });
        }
        for pair in ordered.windows(2) {
            let gap_secs = (pair[1].timestamp - pair[0].timestamp).num_seconds();
            if gap_secs > MAX_GAP_SECS {
                return Err(DumpError::Discontiguous {
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                    gap_secs,
                    max_gap_secs: MAX_GAP_SECS,
                });
            }
        }

        let mut deltas: BTreeMap<String, (Vec<NaiveDateTime>, Vec<f64>)> = BTreeMap::new();
        for pair in ordered.windows(2) {
            let (before, after) = (pair[0], pair[1]);
            for (key, &value) in &after.counters {
                let Some(&previous) = before.counters.get(key) else {
                    continue;
                };
                let delta = counter_delta(previous, value) as f64;
                let (key, value) = if let Some(stem) = key.strip_suffix(" packets") {
                    (format!("{stem} packets per second"), delta / period_secs)
                } else if let Some(stem) = key.strip_suffix(" bytes") {
                    (format!("{stem} bits per second"), delta * 8.0 / period_secs)
                } else {
                    (key.clone(), delta)
                };
                let entry = deltas.entry(key).or_default();
                entry.0.push(after.timestamp);
                entry.1.push(value);
            }
        }

        let mut counters = BTreeMap::new();
        for (key, (timestamps, values)) in deltas {
            // Timestamps are distinct after dedup, so this only fails on empty.
            if let Ok(series) = Series::aligned(timestamps, values) {
                counters.insert(key, series);
            }
        }

        Ok(Self {
            start: first.timestamp,
            end: last.timestamp,
            samples: ordered.len(),
            counters,
        })
    }

    /// Timestamp of the first sample.
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Timestamp of the last sample.
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Number of distinct samples used.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// All delta series keyed `"<interface>: <counter>"`.
    pub fn counters(&self) -> &BTreeMap<String, Series> {
        &self.counters
    }

    /// Delta series for one counter key.
    pub fn series(&self, key: &str) -> Option<&Series> {
        self.counters.get(key)
    }

    /// Interface names, sorted.
    pub fn interfaces(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .counters
            .keys()
            .filter_map(|key| key.split(':').next())
            .collect();
        names.into_iter().collect()
    }

    /// Page title, e.g. `service_core-20191201.080001-20191201.090001`.
    pub fn title(&self) -> String {
        format!(
            "service_core-{}-{}",
            self.start.format("%Y%m%d.%H%M%S"),
            self.end.format("%Y%m%d.%H%M%S")
        )
    }

    /// Human-readable covered period.
    pub fn period_label(&self) -> String {
        format!(
            "{} through {}",
            self.start.format("%a %b %d %H:%M:%S"),
            self.end.format("%a %b %d %H:%M:%S (%Y)")
        )
    }

    /// Emits one chart per interface and counter kind, skipping all-zero
    /// charts. Returns the number of charts emitted.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the sink rejects a line.
    pub fn plot<S: ChartSink>(&self, sink: &mut S) -> std::result::Result<usize, RenderError> {
        sink.heading(&self.period_label());
        let mut charts = 0;
        for iface in self.interfaces() {
            let mut header_pending = true;
            for kind in COUNTER_KINDS {
                let rx = self.series(&format!("{iface}: rx {kind}"));
                let tx = self.series(&format!("{iface}: tx {kind}"));
                let has_data = [rx, tx].into_iter().flatten().any(|s| !s.is_all_zero());
                if !has_data {
                    continue;
                }
                if header_pending {
                    sink.heading(iface);
                    header_pending = false;
                }
                let title = format!("{iface}: {kind}");
                tracing::info!(chart = %title, "generating plot");
                sink.new_chart(&title, units_for(kind));
                if let Some(rx) = rx {
                    sink.add_line("rx", rx, Some("blue"))?;
                }
                if let Some(tx) = tx {
                    sink.add_line("tx", tx, Some("green"))?;
                }
                charts += 1;
            }
        }
        Ok(charts)
    }
}

fn units_for(kind: &str) -> &'static str {
    match kind {
        "packets per second" => "pps",
        "bits per second" => "bps",
        _ => "Value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Plotter;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, 1)
            .unwrap()
    }

    fn block(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn sample(ts: NaiveDateTime, counters: &[(&str, u64)]) -> Sample {
        Sample {
            timestamp: ts,
            counters: counters.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("periodic dump at Sun Dec 01 08:00:01 2019").unwrap(),
            Some(at(8, 0))
        );
        assert_eq!(parse_header("rx_packets: [1]").unwrap(), None);
        assert!(matches!(
            parse_header("periodic dump at yesterday"),
            Err(DumpError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_split_keeps_network_blocks_including_the_last() {
        let lines = [
            "preamble",
            "periodic dump at Sun Dec 01 08:00:01 2019",
            "rx_packets: [1] tx_packets: [2]",
            "periodic dump at Sun Dec 01 08:00:02 2019",
            "cpu: [5]",
            "periodic dump at Sun Dec 01 08:01:01 2019",
            "rx_packets: [3] tx_packets: [4]",
        ];
        let blocks = split_blocks(lines.iter().map(|l| Ok(l.to_string()))).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0][0], "periodic dump at Sun Dec 01 08:00:01 2019");
        assert_eq!(blocks[1][0], "periodic dump at Sun Dec 01 08:01:01 2019");
    }

    #[test]
    fn test_parse_block_maps_interfaces() {
        let sample = parse_block(&block(
            "periodic dump at Sun Dec 01 08:00:01 2019\n\
             name: [knet0], mtu: [1500], port: [eth0], state: [up],\n\
             iface name: knet0\n\
             rx_packets: [10] tx_packets: [20] rx_error: [1] tx_errors: [0]\n\
             iface name: knet1\n\
             rx_packets: [5] tx_packets: [6]\n\
             rx_packets: [99] tx_packets: [99]",
        ))
        .unwrap();

        assert_eq!(sample.timestamp, at(8, 0));
        assert_eq!(sample.counters["knet0 (eth0): rx packets"], 10);
        assert_eq!(sample.counters["knet0 (eth0): tx packets"], 20);
        assert_eq!(sample.counters["knet0 (eth0): rx errors"], 1);
        assert_eq!(sample.counters["knet1: rx packets"], 5);
        // A counter line without a selected interface is ignored.
        assert_eq!(sample.counters.len(), 6);
    }

    #[test]
    fn test_malformed_counter_line() {
        let result = parse_block(&block(
            "periodic dump at Sun Dec 01 08:00:01 2019\n\
             iface name: knet0\n\
             rx_packets: 10 tx_packets: [20]",
        ));
        assert!(matches!(result, Err(DumpError::InvalidCounters { .. })));
    }

    #[test]
    fn test_counter_delta_wraps_at_32_bits() {
        assert_eq!(counter_delta(10, 25), 15);
        assert_eq!(counter_delta(4_294_967_290, 4), 10);
    }

    #[test]
    fn test_rates_and_deltas() {
        let samples = [
            sample(at(8, 0), &[("knet0: rx packets", 0), ("knet0: rx bytes", 0), ("knet0: rx dropped", 3)]),
            sample(at(8, 1), &[("knet0: rx packets", 600), ("knet0: rx bytes", 7500), ("knet0: rx dropped", 5)]),
        ];
        let report = DumpReport::from_samples(&samples, TimeDelta::seconds(60)).unwrap();

        assert_eq!(report.samples(), 2);
        assert_eq!(report.series("knet0: rx packets per second").unwrap().points(), &[(at(8, 1), 10.0)]);
        assert_eq!(report.series("knet0: rx bits per second").unwrap().points(), &[(at(8, 1), 1000.0)]);
        assert_eq!(report.series("knet0: rx dropped").unwrap().points(), &[(at(8, 1), 2.0)]);
        assert_eq!(report.title(), "service_core-20191201.080001-20191201.080101");
    }

    #[test]
    fn test_discontiguous_samples() {
        let samples = [sample(at(8, 0), &[]), sample(at(8, 6), &[])];
        assert!(matches!(
            DumpReport::from_samples(&samples, TimeDelta::seconds(60)),
            Err(DumpError::Discontiguous { gap_secs: 360, .. })
        ));

        let samples = [sample(at(8, 0), &[]), sample(at(8, 5), &[])];
        assert!(DumpReport::from_samples(&samples, TimeDelta::seconds(60)).is_ok());
    }

    #[test]
    fn test_too_few_samples_and_zero_period() {
        let one = [sample(at(8, 0), &[])];
        assert!(matches!(
            DumpReport::from_samples(&one, TimeDelta::seconds(60)),
            Err(DumpError::TooFewSamples { count: 1 })
        ));
        let dup = [sample(at(8, 0), &[]), sample(at(8, 0), &[])];
        assert!(matches!(
            DumpReport::from_samples(&dup, TimeDelta::seconds(60)),
            Err(DumpError::TooFewSamples { count: 1 })
        ));
        assert!(matches!(
            DumpReport::from_samples(&one, TimeDelta::zero()),
            Err(DumpError::ZeroPeriod)
        ));
    }

    #[test]
    fn test_sample_period_bounds() {
        assert_eq!(sample_period(60).unwrap(), TimeDelta::seconds(60));
        assert!(matches!(sample_period(0), Err(DumpError::ZeroPeriod)));
        assert!(matches!(
            sample_period(i64::MAX),
            Err(DumpError::PeriodOutOfRange { secs: i64::MAX })
        ));
    }

    #[test]
    fn test_plot_skips_all_zero_charts() {
        let samples = [
            sample(at(8, 0), &[("eth0: rx packets", 0), ("eth0: tx packets", 0), ("eth0: rx errors", 0)]),
            sample(at(8, 1), &[("eth0: rx packets", 60), ("eth0: tx packets", 0), ("eth0: rx errors", 0)]),
        ];
        let report = DumpReport::from_samples(&samples, TimeDelta::seconds(60)).unwrap();
        let mut plotter = Plotter::new();
        assert_eq!(report.plot(&mut plotter).unwrap(), 1);

        let chart = plotter.charts().next().unwrap();
        assert_eq!(chart.title, "eth0: packets per second");
        assert_eq!(chart.units, "pps");
        assert_eq!(chart.lines.len(), 2);
        assert_eq!(report.interfaces(), vec!["eth0"]);
    }
}
