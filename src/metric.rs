//! Metric data structures for perfscan.
//!
//! This module defines the [`Metric`] value object that every parser
//! produces, the [`MetricRelativity`] hint and the well-known unit strings
//! in [`unit`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::counter_path::CounterPath;
use crate::error::ParseError;

/// Unit strings used by the parsers.
pub mod unit {
    /// Percentage (0-100, or more for multi-core totals)
    pub const PERCENT: &str = "%";
    /// Bytes
    pub const BYTES: &str = "bytes";
    /// Kilobytes
    pub const KILOBYTES: &str = "KB";
    /// Megabytes
    pub const MEGABYTES: &str = "MB";
    /// Mebibytes
    pub const MEBIBYTES: &str = "MiB";
    /// Milliseconds
    pub const MILLISECONDS: &str = "ms";
    /// Megahertz
    pub const MEGAHERTZ: &str = "MHz";
    /// Degrees celsius
    pub const CELSIUS: &str = "celsius";
    /// Watts
    pub const WATTS: &str = "W";
    /// Gigabytes per second
    pub const GIGABYTES_PER_SECOND: &str = "GB/s";
    /// Gigabits per second
    pub const GIGABITS_PER_SECOND: &str = "Gb/s";
    /// Megabytes per second
    pub const MEGABYTES_PER_SECOND: &str = "MB/s";
    /// Kilobits per second
    pub const KILOBITS_PER_SECOND: &str = "Kbps";
    /// Plain event count
    pub const COUNT: &str = "count";
}

/// Whether a higher or a lower value is considered better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MetricRelativity {
    /// No interpretation
    #[default]
    Undefined,
    /// Higher values are better (throughput, bandwidth)
    HigherIsBetter,
    /// Lower values are better (latency, temperature, errors)
    LowerIsBetter,
}

impl fmt::Display for MetricRelativity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricRelativity::Undefined => "Undefined",
            MetricRelativity::HigherIsBetter => "HigherIsBetter",
            MetricRelativity::LowerIsBetter => "LowerIsBetter",
        };
        f.write_str(s)
    }
}

/// A single normalized measurement.
///
/// Metrics are immutable once built. The `with_*` methods consume the
/// metric and return a new one, so a fully described metric reads as a
/// single expression:
///
/// ```
/// use perfscan::metric::{unit, Metric, MetricRelativity};
///
/// let metric = Metric::new("utilization.gpu", 0.0)?
///     .with_unit(unit::PERCENT)
///     .with_relativity(MetricRelativity::Undefined);
/// assert_eq!(metric.unit(), "%");
/// # Ok::<(), perfscan::ParseError>(())
/// ```
///
/// Equality compares name, value and unit only. Use
/// [`Metric::eq_with_tags`] when the tags matter too.
#[derive(Clone, Debug, Serialize)]
pub struct Metric {
    name: String,
    value: f64,
    unit: String,
    relativity: MetricRelativity,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl Metric {
    /// Create a metric with no unit, tags, description or metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidArgument`] if `name` is empty or
    /// whitespace only.
    pub fn new(name: impl Into<String>, value: f64) -> Result<Self, ParseError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ParseError::InvalidArgument("metric name must not be empty"));
        }

        Ok(Self {
            name,
            value,
            unit: String::new(),
            relativity: MetricRelativity::Undefined,
            tags: Vec::new(),
            description: String::new(),
            metadata: BTreeMap::new(),
        })
    }

    /// Return the metric with the given unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Return the metric with the given relativity.
    #[must_use]
    pub fn with_relativity(mut self, relativity: MetricRelativity) -> Self {
        self.relativity = relativity;
        self
    }

    /// Return the metric with the given tags, in order.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Return the metric with the given description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Return the metric with the given metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric reading.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unit, empty when the source gave none.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn relativity(&self) -> MetricRelativity {
        self.relativity
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Split the name into category, instance and counter, when it is a
    /// counter path such as `\Disk(sda)\# Reads`.
    pub fn counter_path(&self) -> Option<CounterPath> {
        CounterPath::parse(&self.name)
    }

    /// Equality including the ordered tag list.
    pub fn eq_with_tags(&self, other: &Self) -> bool {
        self == other && self.tags == other.tags
    }
}

impl PartialEq for Metric {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value && self.unit == other.unit
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{} = {}", self.name, self.value)
        } else {
            write!(f, "{} = {} {}", self.name, self.value, self.unit)
        }
    }
}
