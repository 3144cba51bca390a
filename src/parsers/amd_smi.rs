//! `amd-smi metric --csv` exports.

use super::csv::{CsvParser, CsvSchema, MetricColumns};
use crate::metric::unit::{CELSIUS, KILOBYTES, MEGABYTES, MEGAHERTZ, PERCENT, WATTS};

pub const FORMAT: &str = "amd-smi";

/// Units inferred from the column name. The first matching suffix wins.
pub const UNIT_SUFFIXES: &[(&str, &str)] = &[
    ("_usage", PERCENT),
    ("_power", WATTS),
    ("_clk", MEGAHERTZ),
    ("_temperature", CELSIUS),
    ("_vram", MEGABYTES),
    ("_data", KILOBYTES),
];

/// Every column except `gpu` is a metric; `gpu` becomes `gpu.id` metadata.
pub fn metric_schema() -> CsvSchema {
    CsvSchema::new(FORMAT, MetricColumns::Remaining(UNIT_SUFFIXES))
        .with_identifier("gpu", "gpu.id")
        .with_tags(&["gpu", "amd"])
}

pub fn metric_parser() -> CsvParser {
    CsvParser::new(metric_schema())
}
