//! Integration tests for the log-events pipeline.
//!
//! These tests run real files (plain and gzip) through configuration,
//! extraction, classification and gap filling, the way the CLI does.

use std::fs::{self, File};
use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::tempdir;
use timeplots::config::PlotConfig;
use timeplots::error::{FormatError, TimeplotsError};
use timeplots::input::InputLines;
use timeplots::pipeline::Pipeline;

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 12, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

/// An hourly access log with a quiet spell between 10:00 and 12:00.
const ACCESS_LOG: &str = "\
2019-12-01 08:05:11 GET /index.html 200
2019-12-01 08:17:40 GET /missing 404
2019-12-01 08:59:59 GET /index.html 200
2019-12-01 09:00:00 POST /login 200
2019-12-01 09:30:12 GET /missing 404
2019-12-01 12:15:00 GET /index.html 200
";

#[test]
fn test_hourly_buckets_with_gaps_from_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("access.log");
    fs::write(&path, ACCESS_LOG).unwrap();

    let config = PlotConfig {
        pattern: Some("%Y-%m-%d %H:%M:%S".to_string()),
        interval: Some("1h".to_string()),
        ..PlotConfig::default()
    };
    let mut pipeline = Pipeline::from_config(&config).unwrap();
    let run = pipeline.run(InputLines::from_paths(&[&path])).unwrap();

    let values = run.series("values").unwrap();
    assert_eq!(
        values.points(),
        &[
            (at(8, 0), 3.0),
            (at(9, 0), 2.0),
            (at(10, 0), 0.0),
            (at(11, 0), 0.0),
            (at(12, 0), 1.0),
        ]
    );
    assert_eq!(run.units(), "events every 1 hour");
    // The memo is keyed by the raw prefix, not the floored stamp.
    assert_eq!(pipeline.extractor().cache_len(), 6);
}

#[test]
fn test_categories_across_plain_and_gzip_inputs() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("access.log.1.gz");
    let mut encoder = GzEncoder::new(File::create(&first).unwrap(), Compression::default());
    encoder.write_all(ACCESS_LOG.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let second = dir.path().join("access.log");
    fs::write(
        &second,
        "2019-12-01 13:01:00 GET /missing 404\n2019-12-01 13:02:00 GET /index.html 200\n",
    )
    .unwrap();

    let config = PlotConfig {
        categories: vec![" 404$".to_string(), " 200$".to_string()],
        interval: Some("1h".to_string()),
        ..PlotConfig::default()
    };
    let mut pipeline = Pipeline::from_config(&config).unwrap();
    let run = pipeline
        .run(InputLines::from_paths(&[&first, &second]))
        .unwrap();

    let labels: Vec<&str> = run.categories().iter().map(|(l, _)| l.as_str()).collect();
    assert_eq!(labels, vec![" 404$", " 200$"]);

    let missing: Vec<f64> = run.series(" 404$").unwrap().values().collect();
    // 08:00, 09:00, then a gap until 13:00.
    assert_eq!(missing, vec![1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
    let ok: Vec<f64> = run.series(" 200$").unwrap().values().collect();
    assert_eq!(ok, vec![2.0, 1.0, 0.0, 0.0, 1.0, 1.0]);

    // Format was detected from the first line.
    assert_eq!(
        pipeline.extractor().format().unwrap().pattern(),
        "%Y-%m-%d %H:%M:%S"
    );
}

#[test]
fn test_undetectable_input_fails_the_run() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "starting up\n2019-12-01 08:00:00 ready\n").unwrap();

    let mut pipeline = Pipeline::from_config(&PlotConfig::default()).unwrap();
    let result = pipeline.run(InputLines::from_paths(&[&path]));
    assert!(matches!(
        result,
        Err(TimeplotsError::Format(FormatError::NotDetected { .. }))
    ));
}

#[test]
fn test_missing_input_file_fails_the_run() {
    let dir = tempdir().unwrap();
    let mut pipeline = Pipeline::from_config(&PlotConfig::default()).unwrap();
    let result = pipeline.run(InputLines::from_paths(&[dir.path().join("nope.log")]));
    assert!(matches!(result, Err(TimeplotsError::Input(_))));
}

#[test]
fn test_literal_delimiter_and_custom_fill() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.csv");
    fs::write(
        &path,
        "2019-12-01,08:00:00,start\n2019-12-01,08:01:00,tick\n2019-12-01,08:04:00,stop\n",
    )
    .unwrap();

    let config = PlotConfig {
        pattern: Some("%Y-%m-%d,%H:%M:%S".to_string()),
        delimiter: Some(",".to_string()),
        fill: -1.0,
        ..PlotConfig::default()
    };
    let mut pipeline = Pipeline::from_config(&config).unwrap();
    let run = pipeline.run(InputLines::from_paths(&[&path])).unwrap();

    let values: Vec<f64> = run.series("values").unwrap().values().collect();
    assert_eq!(values, vec![1.0, 1.0, -1.0, -1.0, 1.0]);
}

#[test]
fn test_no_line_matches_any_category() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("syslog");
    fs::write(
        &path,
        "Dec 01 08:00:01 host kernel: eth0 up\nDec 01 08:00:05 host cron[7]: job run\n",
    )
    .unwrap();

    let config = PlotConfig {
        pattern: Some("%b %d %H:%M:%S".to_string()),
        categories: vec!["sshd".to_string(), "nginx".to_string()],
        ..PlotConfig::default()
    };
    let mut pipeline = Pipeline::from_config(&config).unwrap();
    let run = pipeline.run(InputLines::from_paths(&[&path])).unwrap();

    assert_eq!(run.categories().len(), 2);
    assert!(run.series("sshd").unwrap().is_empty());
    assert!(run.series("nginx").unwrap().is_empty());
    assert_eq!(run.stats().unmatched, 2);
}
