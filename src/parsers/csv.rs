//! CSV exports with a header row.
//!
//! The header names the columns and may embed a unit in brackets
//! (`clocks.current.sm [MHz]`). A [`CsvSchema`] decides which columns are
//! metrics and which are identifiers copied into the metadata of every
//! metric of the row.

use std::collections::BTreeMap;

use ::csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::metric::{Metric, MetricRelativity};
use crate::parser::{require_text, MetricsParser};
use crate::tokenizer::{is_sentinel, split_header_unit, split_value_unit};

/// A metric column known to a schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsvColumn {
    /// Header name without its bracketed unit.
    pub name: &'static str,
    /// Unit used when the header does not carry one.
    pub unit: &'static str,
    pub description: &'static str,
    pub relativity: MetricRelativity,
}

/// Which header columns become metrics.
#[derive(Clone, Debug)]
pub enum MetricColumns {
    /// Only the listed columns.
    Listed(Vec<CsvColumn>),
    /// Every column that is not an identifier. When the header has no unit,
    /// the first `(suffix, unit)` pair whose suffix ends the column name
    /// supplies it.
    Remaining(&'static [(&'static str, &'static str)]),
}

/// Column layout of one CSV export.
#[derive(Clone, Debug)]
pub struct CsvSchema {
    format: &'static str,
    metrics: MetricColumns,
    identifiers: Vec<(&'static str, &'static str)>,
    tags: Vec<&'static str>,
}

impl CsvSchema {
    pub fn new(format: &'static str, metrics: MetricColumns) -> Self {
        Self {
            format,
            metrics,
            identifiers: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Copy `column` into the metadata of every metric under `key`.
    #[must_use]
    pub fn with_identifier(mut self, column: &'static str, key: &'static str) -> Self {
        self.identifiers.push((column, key));
        self
    }

    /// Tags attached to every metric.
    #[must_use]
    pub fn with_tags(mut self, tags: &[&'static str]) -> Self {
        self.tags = tags.to_vec();
        self
    }

    fn identifier_key(&self, column: &str) -> Option<&'static str> {
        self.identifiers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|&(_, key)| key)
    }
}

/// A metric column resolved against the header of one document.
#[derive(Debug)]
struct Plan {
    index: usize,
    name: String,
    unit: String,
    description: &'static str,
    relativity: MetricRelativity,
}

/// Parser for header-plus-rows CSV exports.
#[derive(Clone, Debug)]
pub struct CsvParser {
    schema: CsvSchema,
}

impl CsvParser {
    pub fn new(schema: CsvSchema) -> Self {
        Self { schema }
    }

    fn plan(&self, headers: &StringRecord) -> (Vec<Plan>, Vec<(usize, &'static str)>) {
        let mut plans = Vec::new();
        let mut identifiers = Vec::new();

        for (index, header) in headers.iter().enumerate() {
            let (name, header_unit) = split_header_unit(header);
            if name.is_empty() {
                continue;
            }
            if let Some(key) = self.schema.identifier_key(name) {
                identifiers.push((index, key));
                continue;
            }

            let plan = match &self.schema.metrics {
                MetricColumns::Listed(columns) => columns
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
                    .map(|column| Plan {
                        index,
                        name: name.to_string(),
                        unit: pick_unit(header_unit, column.unit),
                        description: column.description,
                        relativity: column.relativity,
                    }),
                MetricColumns::Remaining(suffixes) => Some(Plan {
                    index,
                    name: name.to_string(),
                    unit: pick_unit(header_unit, unit_for_suffix(suffixes, name)),
                    description: "",
                    relativity: MetricRelativity::Undefined,
                }),
            };

            match plan {
                Some(plan) => plans.push(plan),
                None => trace!(format = self.schema.format, column = name, "ignoring column"),
            }
        }

        (plans, identifiers)
    }
}

fn unit_for_suffix(suffixes: &[(&'static str, &'static str)], name: &str) -> &'static str {
    suffixes
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map_or("", |&(_, unit)| unit)
}

fn pick_unit(header_unit: &str, fallback: &str) -> String {
    if header_unit.is_empty() {
        fallback.to_string()
    } else {
        header_unit.to_string()
    }
}

impl MetricsParser for CsvParser {
    fn format(&self) -> &'static str {
        self.schema.format
    }

    fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError> {
        let raw = require_text(raw)?;
        let format = self.schema.format;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(raw.trim_start().as_bytes());

        let headers = reader.headers()?.clone();
        let (plans, identifiers) = self.plan(&headers);
        if plans.is_empty() {
            return Err(ParseError::MissingSection {
                format,
                section: "metric columns in the header row",
            });
        }

        let mut metrics = Vec::new();
        let mut rows = 0usize;
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows += 1;

            let metadata: BTreeMap<String, String> = identifiers
                .iter()
                .filter_map(|&(index, key)| {
                    let value = record.get(index)?;
                    (!is_sentinel(value)).then(|| (key.to_string(), value.to_string()))
                })
                .collect();

            for plan in &plans {
                let cell = record.get(plan.index).unwrap_or_default();
                let Some((value, _)) = split_value_unit(cell) else {
                    trace!(format, column = %plan.name, cell, "skipping cell without a reading");
                    continue;
                };

                metrics.push(
                    Metric::new(plan.name.as_str(), value)?
                        .with_unit(plan.unit.as_str())
                        .with_relativity(plan.relativity)
                        .with_description(plan.description)
                        .with_tags(self.schema.tags.iter().copied())
                        .with_metadata(metadata.clone()),
                );
            }
        }

        debug!(format, rows, metrics = metrics.len(), "parsed CSV export");
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> CsvSchema {
        CsvSchema::new(
            "test",
            MetricColumns::Listed(vec![
                CsvColumn {
                    name: "utilization.gpu",
                    unit: "",
                    description: "GPU utilization",
                    relativity: MetricRelativity::Undefined,
                },
                CsvColumn {
                    name: "temperature.gpu",
                    unit: "celsius",
                    description: "GPU temperature",
                    relativity: MetricRelativity::LowerIsBetter,
                },
            ]),
        )
        .with_identifier("index", "gpu_index")
        .with_tags(&["gpu"])
    }

    #[test]
    fn header_units_win_over_fallbacks() {
        let raw = "index, utilization.gpu [%], temperature.gpu, fan.speed [%]\n0, 17 %, 26, 30 %\n";
        let metrics = CsvParser::new(schema()).parse(raw).unwrap();

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].name(), "utilization.gpu");
        assert_eq!(metrics[0].value(), 17.0);
        assert_eq!(metrics[0].unit(), "%");
        assert_eq!(metrics[1].name(), "temperature.gpu");
        assert_eq!(metrics[1].unit(), "celsius");
        assert_eq!(metrics[1].relativity(), MetricRelativity::LowerIsBetter);
        assert_eq!(metrics[1].metadata()["gpu_index"], "0");
        assert_eq!(metrics[1].tags(), ["gpu"]);
    }

    #[test]
    fn one_metric_per_column_per_row() {
        let raw = "index,utilization.gpu [%],temperature.gpu\n0,5,30\n1,N/A,31\n";
        let metrics = CsvParser::new(schema()).parse(raw).unwrap();
        let rendered: Vec<_> = metrics.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "utilization.gpu = 5 %",
                "temperature.gpu = 30 celsius",
                "temperature.gpu = 31 celsius",
            ]
        );
        assert_eq!(metrics[2].metadata()["gpu_index"], "1");
    }

    #[test]
    fn remaining_columns_infer_units() {
        let schema = CsvSchema::new(
            "inferred",
            MetricColumns::Remaining(&[("_power", "W")]),
        )
        .with_identifier("gpu", "gpu.id");
        let raw = "gpu,socket_power,busy\n0,120,7\n";
        let metrics = CsvParser::new(schema).parse(raw).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].unit(), "W");
        assert_eq!(metrics[1].unit(), "");
        assert_eq!(metrics[1].metadata()["gpu.id"], "0");
    }

    #[test]
    fn header_without_known_columns_is_an_error() {
        let err = CsvParser::new(schema()).parse("a,b\n1,2\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingSection { format: "test", .. }));
    }

    #[test]
    fn header_only_yields_nothing() {
        let raw = "index,utilization.gpu [%]\n";
        assert!(CsvParser::new(schema()).parse(raw).unwrap().is_empty());
    }
}
