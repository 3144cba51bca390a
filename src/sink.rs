//! Destinations for parsed metrics.
//!
//! [`CsvMetricsSink`] writes one row per metric, stamped with the scenario,
//! the tool and the capture window. Appending to an existing file writes the
//! header only when the file is new.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::metric::{Metric, MetricRelativity};

/// Context attached to every metric handed to a sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkContext {
    pub scenario: String,
    pub tool: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SinkContext {
    pub fn new(
        scenario: impl Into<String>,
        tool: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            tool: tool.into(),
            start_time,
            end_time,
        }
    }
}

/// Accepts parsed metrics for logging or upload.
pub trait MetricsSink {
    fn write(&mut self, context: &SinkContext, metrics: &[Metric]) -> io::Result<()>;
}

/// One CSV row.
#[derive(Debug, Serialize)]
struct MetricRow<'a> {
    start_time: String,
    end_time: String,
    scenario: &'a str,
    tool: &'a str,
    name: &'a str,
    value: f64,
    unit: &'a str,
    relativity: MetricRelativity,
    description: &'a str,
    /// Tags joined with `;`
    tags: String,
    /// Metadata as `key=value` pairs joined with `;`
    metadata: String,
}

impl<'a> MetricRow<'a> {
    fn new(context: &'a SinkContext, metric: &'a Metric) -> Self {
        Self {
            start_time: context
                .start_time
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            end_time: context.end_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            scenario: &context.scenario,
            tool: &context.tool,
            name: metric.name(),
            value: metric.value(),
            unit: metric.unit(),
            relativity: metric.relativity(),
            description: metric.description(),
            tags: metric.tags().join(";"),
            metadata: metric
                .metadata()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// Writes metrics as CSV rows.
pub struct CsvMetricsSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvMetricsSink<W> {
    /// Wrap `writer`, emitting the header row before the first metric when
    /// `write_header` is set.
    pub fn new(writer: W, write_header: bool) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(writer);
        Self { writer }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|err| err.into_error())
    }
}

impl CsvMetricsSink<File> {
    /// Append to the CSV file at `path`, creating it with a header row if it
    /// does not exist yet.
    pub fn append(path: &Path) -> io::Result<Self> {
        let exists = path.exists();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self::new(file, !exists))
    }
}

impl<W: Write> MetricsSink for CsvMetricsSink<W> {
    fn write(&mut self, context: &SinkContext, metrics: &[Metric]) -> io::Result<()> {
        for metric in metrics {
            self.writer
                .serialize(MetricRow::new(context, metric))
                .map_err(io::Error::other)?;
        }
        self.writer.flush()
    }
}
