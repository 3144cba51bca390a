//! # perfscan
//!
//! Command-line front end for the perfscan parsers.
//!
//! ## Usage
//!
//! ```bash
//! # Summarize an atop capture as a table
//! perfscan --tool atop --input atop.txt
//!
//! # Append nvidia-smi metrics to a CSV log
//! perfscan --tool nvidia-smi --input gpu.csv --csv-file metrics.csv
//!
//! # Dump the lspci device tree as JSON
//! lspci -vvv | perfscan --tool lspci
//! ```
//!
//! Metrics are printed as a table when stdout is a terminal and streamed as
//! CSV rows otherwise. Diagnostics go to stderr; set `RUST_LOG=debug` for
//! parser details.

use std::io::{self, Write};
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use perfscan::config::{Config, Tool};
use perfscan::lspci::LspciParser;
use perfscan::sink::{CsvMetricsSink, MetricsSink, SinkContext};
use perfscan::{parsers, source, Metric, ParseError};

/// Anything that can stop a run.
#[derive(thiserror::Error, Debug)]
enum RunError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .finish()
        .init();

    let config = Config::parse();
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(tool = %config.tool.name(), "{err}");
            eprintln!("perfscan: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), RunError> {
    let start_time = Utc::now();
    let text = source::open(config.input.as_deref()).read_text()?;

    let Some(parser) = parsers::for_tool(config.tool) else {
        return print_devices(config, &text);
    };

    let metrics = if config.counters.is_empty() {
        parser.parse(&text)?
    } else {
        parser.parse_filtered(&text, &config.counters)?
    };
    info!(tool = %config.tool.name(), metrics = metrics.len(), "parsed input");

    let context = SinkContext::new(
        config.scenario.as_str(),
        config.tool.name(),
        start_time,
        Utc::now(),
    );

    if let Some(path) = &config.csv_file {
        CsvMetricsSink::append(path)?.write(&context, &metrics)?;
        info!(path = %path.display(), "appended metrics");
    }

    if is_terminal() {
        print_table(&metrics)?;
    } else {
        CsvMetricsSink::new(io::stdout().lock(), true).write(&context, &metrics)?;
    }
    Ok(())
}

fn print_devices(config: &Config, text: &str) -> Result<(), RunError> {
    debug_assert_eq!(config.tool, Tool::Lspci);
    if !config.counters.is_empty() {
        warn!("counter filters do not apply to lspci output");
    }
    if config.csv_file.is_some() {
        warn!("lspci output is not a metric list, skipping the CSV log");
    }

    let devices = LspciParser.parse(text)?;
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &devices)?;
    writeln!(stdout)?;
    Ok(())
}

/// Print metrics as aligned `name  value unit` rows.
fn print_table(metrics: &[Metric]) -> io::Result<()> {
    let width = metrics.iter().map(|m| m.name().len()).max().unwrap_or(0);
    let mut stdout = io::stdout().lock();
    for metric in metrics {
        writeln!(
            stdout,
            "{:<width$}  {:>16} {}",
            metric.name(),
            metric.value(),
            metric.unit()
        )?;
    }
    if metrics.is_empty() {
        writeln!(stdout, "no metrics")?;
    }
    Ok(())
}

/// Check if stdout is connected to a terminal.
fn is_terminal() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 }
}
