//! Per-counter sample aggregation.
//!
//! Samples are grouped by metric name in first-seen order. When finished, a
//! group with one sample becomes one metric carrying the raw value, and a
//! group with two or more samples becomes four metrics: the mean under the
//! bare name followed by `" Min"`, `" Max"` and `" Median"`.

use std::collections::HashMap;

use tracing::trace;

use crate::error::ParseError;
use crate::metric::Metric;

/// Suffixes of the summary metrics emitted after the mean, in order.
pub const SUMMARY_SUFFIXES: [&str; 3] = [" Min", " Max", " Median"];

/// All samples recorded for one counter.
#[derive(Clone, Debug)]
struct Group {
    name: String,
    unit: String,
    mean: f64,
    min: f64,
    max: f64,
    values: Vec<f64>,
}

impl Group {
    fn new(name: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push(value);
        // Welford running mean: no running sum to overflow.
        let n = self.values.len() as f64;
        let delta = value - self.mean;
        if delta.is_finite() {
            self.mean += delta / n;
        } else {
            self.mean += value / n - self.mean / n;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn median(&self) -> f64 {
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            sorted[mid - 1] / 2.0 + sorted[mid] / 2.0
        }
    }

    fn into_metrics(self, out: &mut Vec<Metric>) -> Result<(), ParseError> {
        if let [only] = self.values.as_slice() {
            out.push(Metric::new(self.name.as_str(), *only)?.with_unit(self.unit.as_str()));
            return Ok(());
        }

        let mean = self.mean.clamp(self.min, self.max);
        let median = self.median().clamp(self.min, self.max);
        out.push(Metric::new(self.name.as_str(), mean)?.with_unit(self.unit.as_str()));
        for (suffix, value) in SUMMARY_SUFFIXES.iter().zip([self.min, self.max, median]) {
            out.push(
                Metric::new(format!("{}{suffix}", self.name), value)?.with_unit(self.unit.as_str()),
            );
        }
        Ok(())
    }
}

/// Collects samples per counter name and summarizes them.
#[derive(Clone, Debug, Default)]
pub struct SampleAggregator {
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl SampleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample. The unit of the first sample of a counter is the
    /// unit of its metrics. Non-finite values are dropped.
    pub fn record(&mut self, name: &str, unit: &str, value: f64) {
        if !value.is_finite() {
            trace!(name, value, "dropping non-finite sample");
            return;
        }

        let slot = match self.index.get(name) {
            Some(&slot) => slot,
            None => {
                self.groups.push(Group::new(name, unit));
                self.index.insert(name.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].push(value);
    }

    /// Number of distinct counters recorded so far.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Turn every group into its metrics, in first-seen order.
    ///
    /// # Errors
    ///
    /// Fails only if a counter was recorded under an empty name.
    pub fn finish(self) -> Result<Vec<Metric>, ParseError> {
        let mut metrics = Vec::with_capacity(self.groups.len() * 4);
        for group in self.groups {
            group.into_metrics(&mut metrics)?;
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn summarize(values: &[f64]) -> Vec<Metric> {
        let mut aggregator = SampleAggregator::new();
        for &v in values {
            aggregator.record("\\Disk(sda)\\% Busy Time", "%", v);
        }
        aggregator.finish().unwrap()
    }

    #[test]
    fn single_sample_keeps_the_raw_value() {
        let metrics = summarize(&[2.0]);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "\\Disk(sda)\\% Busy Time");
        assert_eq!(metrics[0].value(), 2.0);
        assert_eq!(metrics[0].unit(), "%");
    }

    #[test]
    fn many_samples_become_four_metrics_in_order() {
        let metrics = summarize(&[4.0, 1.0, 3.0, 2.0]);
        let names: Vec<_> = metrics.iter().map(Metric::name).collect();
        assert_eq!(
            names,
            [
                "\\Disk(sda)\\% Busy Time",
                "\\Disk(sda)\\% Busy Time Min",
                "\\Disk(sda)\\% Busy Time Max",
                "\\Disk(sda)\\% Busy Time Median",
            ]
        );
        assert!((metrics[0].value() - 2.5).abs() < 1e-12);
        assert_eq!(metrics[1].value(), 1.0);
        assert_eq!(metrics[2].value(), 4.0);
        assert_eq!(metrics[3].value(), 2.5);
        assert!(metrics.iter().all(|m| m.unit() == "%"));
    }

    #[test]
    fn odd_counts_take_the_middle_value() {
        let metrics = summarize(&[9.0, 1.0, 2.0]);
        assert_eq!(metrics[3].value(), 2.0);
        assert_eq!(metrics[0].value(), 4.0);
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let mut aggregator = SampleAggregator::new();
        aggregator.record("b", "", 1.0);
        aggregator.record("a", "", 1.0);
        aggregator.record("b", "", 3.0);
        assert_eq!(aggregator.len(), 2);

        let metrics = aggregator.finish().unwrap();
        let names: Vec<_> = metrics.iter().map(Metric::name).collect();
        assert_eq!(names, ["b", "b Min", "b Max", "b Median", "a"]);
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let mut aggregator = SampleAggregator::new();
        aggregator.record("x", "", f64::NAN);
        aggregator.record("x", "", f64::INFINITY);
        assert!(aggregator.is_empty());
        aggregator.record("x", "", 5.0);
        assert_eq!(aggregator.finish().unwrap().len(), 1);
    }

    #[test]
    fn mean_survives_wide_dynamic_range() {
        let metrics = summarize(&[f64::MAX, f64::MAX, f64::MAX]);
        assert_eq!(metrics[0].value(), f64::MAX);
        let metrics = summarize(&[f64::MAX, -f64::MAX]);
        assert_eq!(metrics[0].value(), 0.0);
        assert_eq!(metrics[3].value(), 0.0);
    }

    proptest! {
        #[test]
        fn summaries_are_ordered(values in proptest::collection::vec(-1.0e12f64..1.0e12, 2..64)) {
            let metrics = summarize(&values);
            prop_assert_eq!(metrics.len(), 4);
            let (mean, min, max, median) = (
                metrics[0].value(),
                metrics[1].value(),
                metrics[2].value(),
                metrics[3].value(),
            );
            prop_assert!(min <= median && median <= max);
            prop_assert!(min <= mean && mean <= max);
        }

        #[test]
        fn one_sample_is_one_metric(value in proptest::num::f64::NORMAL) {
            let metrics = summarize(&[value]);
            prop_assert_eq!(metrics.len(), 1);
            prop_assert_eq!(metrics[0].value(), value);
        }
    }
}
