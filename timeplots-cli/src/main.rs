//! CLI for timeplots.
//!
//! Plots event counts from log files, interface counters from periodic
//! device dumps, and TX/RX readings from packet-rate logs.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use timeplots::dump::{self, DEFAULT_PERIOD_SECS};
use timeplots::input::{self, InputLines};
use timeplots::render::OutputFormat as Export;
use timeplots::pps;
use timeplots::{DumpReport, Pipeline, PlotConfig, Plotter, PpsReport};
use tracing_subscriber::EnvFilter;

/// Default file name searched for by `timeplots dump`.
const DUMP_FILE_PREFIX: &str = "service_core_periodic_dump_port_5001.txt";

/// pps charts are drawn wider than the default.
const PPS_CHART_WIDTH: u32 = 1500;

/// timeplots - plot events over time from logs and device dumps.
#[derive(Parser)]
#[command(name = "timeplots", version, about)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Count log lines per time interval, optionally per category.
    Log {
        /// Input files (`.gz` is decompressed; `-` or none reads stdin).
        files: Vec<PathBuf>,

        /// Timestamp pattern in strftime syntax (detected when omitted).
        #[arg(long)]
        format: Option<String>,

        /// Number of tokens the timestamp spans (derived from the pattern when omitted).
        #[arg(long)]
        tokens: Option<usize>,

        /// Literal token delimiter (whitespace when omitted).
        #[arg(long)]
        delimiter: Option<String>,

        /// Category regex; repeat for several categories, first match wins.
        #[arg(short = 'e', long = "expression")]
        expressions: Vec<String>,

        /// Bucketing interval: seconds, or a number with s, m, h or d.
        #[arg(short, long)]
        interval: Option<String>,

        /// Value used for empty intervals.
        #[arg(long)]
        fill: Option<f64>,

        /// Output file (`-` for stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chart title.
        #[arg(short, long)]
        title: Option<String>,

        /// Output format.
        #[arg(long)]
        export: Option<OutputFormat>,

        /// JSON run configuration; flags override its fields.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Plot interface counters from periodic device dumps.
    Dump {
        /// Dump files, or a directory to search (current directory when omitted).
        paths: Vec<PathBuf>,

        /// File name prefix to search for in directories.
        #[arg(long, default_value = DUMP_FILE_PREFIX)]
        prefix: String,

        /// Seconds between samples, used for rate conversion.
        #[arg(long, default_value_t = DEFAULT_PERIOD_SECS)]
        period: i64,

        /// Output file (`-` for stdout; named after the covered period when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format.
        #[arg(long, default_value = "html")]
        export: OutputFormat,
    },

    /// Plot TX/RX readings from a packet-rate ("pps") log.
    Pps {
        /// pps log file (searched for in the current directory when omitted).
        file: Option<PathBuf>,

        /// Output file (`-` for stdout; named after the input when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format.
        #[arg(long, default_value = "html")]
        export: OutputFormat,
    },
}

/// Output format for charts.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Standalone HTML page with SVG charts.
    Html,
    /// Comma-separated values.
    Csv,
    /// JSON array of chart blocks.
    Json,
}

impl From<OutputFormat> for Export {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Html => Export::Html,
            OutputFormat::Csv => Export::Csv,
            OutputFormat::Json => Export::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Log {
            files,
            format,
            tokens,
            delimiter,
            expressions,
            interval,
            fill,
            output,
            title,
            export,
            config,
        } => {
            let overrides = LogOverrides {
                format,
                tokens,
                delimiter,
                expressions,
                interval,
                fill,
                output,
                title,
                export,
            };
            cmd_log(&files, config.as_deref(), overrides)
        }
        Commands::Dump {
            paths,
            prefix,
            period,
            output,
            export,
        } => cmd_dump(&paths, &prefix, period, output.as_deref(), export.into()),
        Commands::Pps { file, output, export } => cmd_pps(file, output.as_deref(), export.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// `timeplots log` flags that override the configuration file.
struct LogOverrides {
    format: Option<String>,
    tokens: Option<usize>,
    delimiter: Option<String>,
    expressions: Vec<String>,
    interval: Option<String>,
    fill: Option<f64>,
    output: Option<PathBuf>,
    title: Option<String>,
    export: Option<OutputFormat>,
}

impl LogOverrides {
    fn apply(self, config: &mut PlotConfig) {
        if self.format.is_some() {
            config.pattern = self.format;
        }
        if self.tokens.is_some() {
            config.tokens = self.tokens;
        }
        if self.delimiter.is_some() {
            config.delimiter = self.delimiter;
        }
        if !self.expressions.is_empty() {
            config.categories = self.expressions;
        }
        if self.interval.is_some() {
            config.interval = self.interval;
        }
        if let Some(fill) = self.fill {
            config.fill = fill;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(title) = self.title {
            config.title = title;
        }
        if let Some(export) = self.export {
            config.export = export.into();
        }
    }
}

/// Implements `timeplots log [FILES]...`.
fn cmd_log(
    files: &[PathBuf],
    config_path: Option<&Path>,
    overrides: LogOverrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => PlotConfig::load(path)?,
        None => PlotConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;

    let mut pipeline = Pipeline::from_config(&config)?;
    let run = pipeline.run(InputLines::from_paths(files))?;

    let stats = run.stats();
    if stats.parsed == 0 {
        tracing::warn!(unmatched = stats.unmatched, "no line matched any category");
    }
    tracing::info!(
        format = %pipeline.extractor().format().map(ToString::to_string).unwrap_or_default(),
        counted = stats.parsed,
        dropped = stats.dropped,
        "run complete"
    );

    let mut plotter = Plotter::new();
    run.plot(&mut plotter, &config.title)?;
    write_output(&plotter, &config.output, config.export, &config.title)
}

/// Implements `timeplots dump [PATHS]...`.
fn cmd_dump(
    paths: &[PathBuf],
    prefix: &str,
    period: i64,
    output: Option<&Path>,
    export: Export,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = resolve_dump_files(paths, prefix)?;
    if files.is_empty() {
        return Err(format!("no files named '{prefix}*' found").into());
    }

    let samples = dump::load(&files)?;
    tracing::info!(samples = samples.len(), "sample times collected");

    let report = DumpReport::from_samples(&samples, dump::sample_period(period)?)?;
    let mut plotter = Plotter::new();
    let charts = report.plot(&mut plotter)?;
    if charts == 0 {
        tracing::warn!("every counter is zero, no charts to draw");
    }

    let title = report.title();
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!("{title}.{}", extension(export))),
    };
    write_output(&plotter, &output, export, &title)
}

/// Implements `timeplots pps [FILE]`.
fn cmd_pps(file: Option<PathBuf>, output: Option<&Path>, export: Export) -> Result<(), Box<dyn std::error::Error>> {
    let file = match file {
        Some(file) => file,
        None => choose_pps_file()?,
    };
    let report = PpsReport::from_lines(InputLines::from_paths(&[&file]))?;

    let name = file
        .file_name()
        .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
    let title = format!("pps_plot-{name}");
    let mut plotter = Plotter::with_size(PPS_CHART_WIDTH, Plotter::DEFAULT_HEIGHT);
    report.plot(&mut plotter, &title)?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!("{title}.{}", extension(export))),
    };
    write_output(&plotter, &output, export, &title)
}

/// Picks the single pps log in the current directory.
fn choose_pps_file() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut files = pps::find_files(Path::new("."))?;
    match files.len() {
        0 => Err("no pps files with readings found in the current directory".into()),
        1 => Ok(files.remove(0)),
        _ => {
            let names: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
            Err(format!("several pps files found, pick one: {}", names.join(", ")).into())
        }
    }
}

/// Expands directories into the dump files found beneath them.
fn resolve_dump_files(paths: &[PathBuf], prefix: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    if paths.is_empty() {
        return Ok(input::find_files(Path::new("."), prefix)?);
    }
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(input::find_files(path, prefix)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn extension(export: Export) -> &'static str {
    match export {
        Export::Html => "html",
        Export::Csv => "csv",
        Export::Json => "json",
    }
}

fn write_output(
    plotter: &Plotter,
    path: &Path,
    export: Export,
    title: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if path.as_os_str() == input::STDIN_NAME {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        plotter.write(export, title, &mut out)?;
        out.flush()?;
        return Ok(());
    }
    plotter.save(path, export, title)?;
    println!("Output saved to {}", path.display());
    Ok(())
}
