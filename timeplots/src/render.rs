//! Chart assembly and output.
//!
//! The pipeline talks to a [`ChartSink`]: start a chart with a title and a
//! value-axis unit, then add named lines to it. [`Plotter`] is the sink the
//! CLI uses; it keeps every chart in memory and writes them out as one
//! self-contained HTML page, as CSV, or as JSON.
//!
//! HTML charts are inline SVG driven by a short inline script: hovering
//! shows the time under the cursor, the mouse wheel zooms the time axis,
//! dragging pans and a double click resets. Nothing is fetched from
//! anywhere.
//!
//! # Example
//!
//! ```rust
//! use timeplots::render::{ChartSink, OutputFormat, Plotter};
//! use timeplots::series::Series;
//!
//! let mut plotter = Plotter::new();
//! plotter.new_chart("Interface eth0", "pps");
//! plotter.add_line("rx", &Series::empty(), None)?;
//! let mut out = Vec::new();
//! plotter.write(OutputFormat::Json, "eth0", &mut out)?;
//! # Ok::<(), timeplots::error::RenderError>(())
//! ```

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::series::Series;

/// Line colors handed out in order when the caller does not pick one.
const PALETTE: &[&str] = &[
    "#1f77b4", "#2ca02c", "#d62728", "#ff7f0e", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Time format used on the x axis and in tooltips.
const AXIS_TIME_FORMAT: &str = "%a %b %d %H:%M:%S";

/// Hover readout, wheel zoom and drag pan for every `svg.chart`.
const CHART_SCRIPT: &str = r#"
document.querySelectorAll('svg.chart').forEach(function (svg) {
  var w = +svg.getAttribute('width'), h = +svg.getAttribute('height');
  var left = +svg.dataset.left, right = w - +svg.dataset.right;
  var t0 = +svg.dataset.t0, t1 = +svg.dataset.t1;
  var cursor = svg.querySelector('.cursor'), readout = svg.querySelector('.readout');
  var view = { x: 0, w: w }, drag = null;
  function apply() { svg.setAttribute('viewBox', view.x + ' 0 ' + view.w + ' ' + h); }
  function clampX(x) { return Math.min(w - view.w, Math.max(0, x)); }
  function svgX(e) {
    var r = svg.getBoundingClientRect();
    return view.x + (e.clientX - r.left) / r.width * view.w;
  }
  svg.addEventListener('mousemove', function (e) {
    if (drag) {
      var r = svg.getBoundingClientRect();
      view.x = clampX(drag.x - (e.clientX - drag.cx) / r.width * view.w);
      apply();
    }
    var x = svgX(e);
    if (x < left || x > right) { cursor.style.display = 'none'; readout.textContent = ''; return; }
    cursor.setAttribute('x1', x); cursor.setAttribute('x2', x); cursor.style.display = '';
    var t = new Date(t0 + (x - left) / (right - left) * (t1 - t0));
    readout.textContent = t.toISOString().replace('T', ' ').slice(0, 19);
  });
  svg.addEventListener('mousedown', function (e) { drag = { cx: e.clientX, x: view.x }; });
  svg.addEventListener('mouseup', function () { drag = null; });
  svg.addEventListener('mouseleave', function () { drag = null; });
  svg.addEventListener('wheel', function (e) {
    e.preventDefault();
    var x = svgX(e), k = e.deltaY < 0 ? 0.8 : 1.25;
    var nw = Math.min(w, Math.max(w / 50, view.w * k));
    view.x = x - (x - view.x) * nw / view.w;
    view.w = nw;
    view.x = clampX(view.x);
    apply();
  }, { passive: false });
  svg.addEventListener('dblclick', function () { view = { x: 0, w: w }; apply(); });
});
"#;

/// Receiver of charts produced by the pipeline.
pub trait ChartSink {
    /// Starts a new chart; subsequent lines are added to it.
    fn new_chart(&mut self, title: &str, units: &str);

    /// Adds a named line to the current chart.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::NoActiveChart`] if no chart was started.
    fn add_line(&mut self, name: &str, series: &Series, color: Option<&str>) -> Result<(), RenderError>;

    /// Adds a section heading. Lines can't be added until the next chart.
    fn heading(&mut self, text: &str);
}

/// One line on a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Legend name.
    pub name: String,
    /// CSS color.
    pub color: String,
    /// The points, in timestamp order.
    pub points: Vec<(NaiveDateTime, f64)>,
}

/// A chart with a shared time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    /// Chart title.
    pub title: String,
    /// Value-axis unit label.
    pub units: String,
    /// Lines in the order they were added.
    pub lines: Vec<Line>,
}

/// An element of the rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Block {
    /// A section heading.
    Heading {
        /// Heading text.
        text: String,
    },
    /// A chart.
    Chart(Chart),
}

/// Output encodings supported by [`Plotter::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Self-contained HTML page with SVG charts.
    #[default]
    Html,
    /// `chart,series,timestamp,value` rows.
    Csv,
    /// The chart blocks as JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}': use html, csv, or json")),
        }
    }
}

/// Collects charts and writes them out.
#[derive(Debug, Clone)]
pub struct Plotter {
    width: u32,
    height: u32,
    blocks: Vec<Block>,
    active: Option<usize>,
}

impl Plotter {
    /// Default chart width in pixels.
    pub const DEFAULT_WIDTH: u32 = 1400;
    /// Default chart height in pixels.
    pub const DEFAULT_HEIGHT: u32 = 400;

    /// Creates a plotter with the default chart size.
    pub fn new() -> Self {
        Self::with_size(Self::DEFAULT_WIDTH, Self::DEFAULT_HEIGHT)
    }

    /// Creates a plotter with the given chart size.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width: width.max(200),
            height: height.max(100),
            blocks: Vec::new(),
            active: None,
        }
    }

    /// The blocks collected so far.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The charts collected so far.
    pub fn charts(&self) -> impl Iterator<Item = &Chart> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Chart(chart) => Some(chart),
            Block::Heading { .. } => None,
        })
    }

    /// Writes all blocks to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if writing or serialization fails.
    pub fn write(&self, format: OutputFormat, title: &str, out: &mut dyn Write) -> Result<(), RenderError> {
        match format {
            OutputFormat::Html => out.write_all(self.to_html(title).as_bytes())?,
            OutputFormat::Csv => self.write_csv(&mut *out)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *out, &self.blocks)?;
                out.write_all(b"\n")?;
            }
        }
        out.flush()?;
        Ok(())
    }

    /// Writes all blocks to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Write`] if the file cannot be written.
    pub fn save(&self, path: &Path, format: OutputFormat, title: &str) -> Result<(), RenderError> {
        tracing::info!(path = %path.display(), "writing file");
        let file = File::create(path).map_err(|source| RenderError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        let mut out = BufWriter::new(file);
        self.write(format, title, &mut out).map_err(|e| match e {
            RenderError::Io(source) => RenderError::Write {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    fn write_csv(&self, out: &mut dyn Write) -> Result<(), RenderError> {
        let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(out);
        writer.write_record(["chart", "series", "timestamp", "value"])?;
        for chart in self.charts() {
            for line in &chart.lines {
                for (ts, value) in &line.points {
                    let ts = ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string();
                    let value = value.to_string();
                    writer.write_record([
                        chart.title.as_str(),
                        line.name.as_str(),
                        ts.as_str(),
                        value.as_str(),
                    ])?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Renders the page as a standalone HTML document.
    pub fn to_html(&self, title: &str) -> String {
        let mut html = String::new();
        let _ = writeln!(html, "<!DOCTYPE html>");
        let _ = writeln!(html, "<html>\n<head>\n<meta charset=\"utf-8\">");
        let _ = writeln!(html, "<title>{}</title>", escape(title));
        let _ = writeln!(
            html,
            "<style>body{{font-family:sans-serif}} svg{{display:block;margin:8px 0}} \
             .legend{{font-size:12px}} .axis{{font-size:11px;fill:#444}}</style>"
        );
        let _ = writeln!(html, "</head>\n<body>");
        for block in &self.blocks {
            match block {
                Block::Heading { text } => {
                    let _ = writeln!(html, "<hr/><h2>{}</h2>", escape(text));
                }
                Block::Chart(chart) => self.svg(chart, &mut html),
            }
        }
        let _ = writeln!(html, "<script>{CHART_SCRIPT}</script>");
        let _ = writeln!(html, "</body>\n</html>");
        html
    }

    #[allow(clippy::cast_precision_loss)] // Pixel coordinates do not need i64 precision
    fn svg(&self, chart: &Chart, html: &mut String) {
        const MARGIN_LEFT: f64 = 70.0;
        const MARGIN_RIGHT: f64 = 20.0;
        const MARGIN_TOP: f64 = 30.0;
        const MARGIN_BOTTOM: f64 = 40.0;

        let width = f64::from(self.width);
        let height = f64::from(self.height);
        let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = height - MARGIN_TOP - MARGIN_BOTTOM;

        let points = chart.lines.iter().flat_map(|line| line.points.iter());
        let (mut t_min, mut t_max, mut y_max) = (i64::MAX, i64::MIN, 0.0f64);
        for (ts, value) in points {
            let millis = ts.and_utc().timestamp_millis();
            t_min = t_min.min(millis);
            t_max = t_max.max(millis);
            if value.is_finite() {
                y_max = y_max.max(*value);
            }
        }
        if t_min > t_max {
            (t_min, t_max) = (0, 1);
        }
        let t_span = (t_max - t_min).max(1) as f64;
        let y_max = if y_max > 0.0 { y_max } else { 1.0 };

        let x = |millis: i64| MARGIN_LEFT + (millis - t_min) as f64 / t_span * plot_w;
        let y = |value: f64| MARGIN_TOP + plot_h - value.max(0.0) / y_max * plot_h;

        let _ = writeln!(
            html,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" class=\"chart\" width=\"{w}\" height=\"{h}\" \
             viewBox=\"0 0 {w} {h}\" preserveAspectRatio=\"none\" data-t0=\"{t_min}\" data-t1=\"{t_max}\" \
             data-left=\"{MARGIN_LEFT}\" data-right=\"{MARGIN_RIGHT}\">",
            w = self.width,
            h = self.height
        );
        let _ = writeln!(
            html,
            "<line class=\"cursor\" x1=\"0\" x2=\"0\" y1=\"{MARGIN_TOP}\" y2=\"{:.1}\" \
             stroke=\"#888\" stroke-dasharray=\"3,3\" style=\"display:none\"/>",
            MARGIN_TOP + plot_h
        );
        let _ = writeln!(
            html,
            "<text class=\"readout axis\" x=\"{:.1}\" y=\"18\" text-anchor=\"end\"></text>",
            width - MARGIN_RIGHT
        );
        let _ = writeln!(
            html,
            "<text x=\"{MARGIN_LEFT}\" y=\"18\" font-weight=\"bold\">{}</text>",
            escape(&chart.title)
        );
        let _ = writeln!(
            html,
            "<rect x=\"{MARGIN_LEFT}\" y=\"{MARGIN_TOP}\" width=\"{plot_w}\" height=\"{plot_h}\" \
             fill=\"none\" stroke=\"#ccc\"/>"
        );

        // y axis: zero, midpoint, max
        for fraction in [0.0, 0.5, 1.0] {
            let value = y_max * fraction;
            let _ = writeln!(
                html,
                "<text class=\"axis\" x=\"{}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>",
                MARGIN_LEFT - 6.0,
                y(value) + 4.0,
                format_si(value)
            );
        }
        let _ = writeln!(
            html,
            "<text class=\"axis\" x=\"14\" y=\"{:.1}\" transform=\"rotate(-90 14 {:.1})\" \
             text-anchor=\"middle\">{}</text>",
            MARGIN_TOP + plot_h / 2.0,
            MARGIN_TOP + plot_h / 2.0,
            escape(&chart.units)
        );

        // x axis: five evenly spaced ticks
        for i in 0..5i64 {
            let millis = t_min + (t_max - t_min) * i / 4;
            if let Some(ts) = chrono::DateTime::from_timestamp_millis(millis) {
                let _ = writeln!(
                    html,
                    "<text class=\"axis\" x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>",
                    x(millis),
                    height - MARGIN_BOTTOM + 16.0,
                    ts.naive_utc().format(AXIS_TIME_FORMAT)
                );
            }
        }

        for (index, line) in chart.lines.iter().enumerate() {
            let mut coords = String::new();
            for (ts, value) in &line.points {
                let _ = write!(
                    coords,
                    "{:.1},{:.1} ",
                    x(ts.and_utc().timestamp_millis()),
                    y(*value)
                );
            }
            let _ = writeln!(
                html,
                "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"1\" points=\"{}\">\
                 <title>{}</title></polyline>",
                escape(&line.color),
                coords.trim_end(),
                escape(&line.name)
            );
            let legend_y = MARGIN_TOP + 14.0 * (index as f64 + 1.0);
            let _ = writeln!(
                html,
                "<text class=\"legend\" x=\"{:.1}\" y=\"{legend_y:.1}\" fill=\"{}\" \
                 text-anchor=\"end\">{}</text>",
                width - MARGIN_RIGHT - 6.0,
                escape(&line.color),
                escape(&line.name)
            );
        }
        let _ = writeln!(html, "</svg>");
    }
}

impl Default for Plotter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartSink for Plotter {
    fn new_chart(&mut self, title: &str, units: &str) {
        self.blocks.push(Block::Chart(Chart {
            title: title.to_string(),
            units: units.to_string(),
            lines: Vec::new(),
        }));
        self.active = Some(self.blocks.len() - 1);
    }

    fn add_line(&mut self, name: &str, series: &Series, color: Option<&str>) -> Result<(), RenderError> {
        let no_chart = || RenderError::NoActiveChart {
            line: name.to_string(),
        };
        let index = self.active.ok_or_else(no_chart)?;
        let Some(Block::Chart(chart)) = self.blocks.get_mut(index) else {
            return Err(no_chart());
        };
        let color = color.map_or_else(
            || PALETTE[chart.lines.len() % PALETTE.len()].to_string(),
            str::to_string,
        );
        chart.lines.push(Line {
            name: name.to_string(),
            color,
            points: series.points().to_vec(),
        });
        Ok(())
    }

    fn heading(&mut self, text: &str) {
        self.blocks.push(Block::Heading {
            text: text.to_string(),
        });
        self.active = None;
    }
}

/// Formats a number with an SI suffix (`1.5k`, `12M`).
pub fn format_si(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e12 {
        (value / 1e12, "t")
    } else if abs >= 1e9 {
        (value / 1e9, "b")
    } else if abs >= 1e6 {
        (value / 1e6, "m")
    } else if abs >= 1e3 {
        (value / 1e3, "k")
    } else {
        (value, "")
    };
    let text = format!("{scaled:.1}");
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{text}{suffix}")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
