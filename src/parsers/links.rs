//! JSON link telemetry: NVIDIA C2C link speeds and AMD XGMI link counters.
//!
//! Both documents are arrays of per-GPU objects that nest an array of link
//! objects. The GPU and link identifiers are folded into the metric name.
//!
//! C2C (`[{"gpu": 0, "links": [{"link": 3, "speed": 44.712}]}]`) yields
//! `GPU 0: C2C Link 3 Speed` in GB/s. XGMI (`amd-smi xgmi -m --json`) yields
//! `xgmi_bit_rate` and `xgmi_max_bandwidth` per GPU plus `xgmi_<i>_read`,
//! `xgmi_<i>_write` and `xgmi_<i>_data` per link.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::metric::unit::{GIGABITS_PER_SECOND, GIGABYTES_PER_SECOND, KILOBYTES, MEGABYTES_PER_SECOND};
use crate::metric::{Metric, MetricRelativity};
use crate::parser::{require_text, MetricsParser};
use crate::tokenizer::split_value_unit;

/// Which link document a [`LinkJsonParser`] reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkFormat {
    C2c,
    Xgmi,
}

impl LinkFormat {
    fn name(self) -> &'static str {
        match self {
            LinkFormat::C2c => "c2c-json",
            LinkFormat::Xgmi => "amd-smi-xgmi",
        }
    }
}

/// Parser for JSON arrays of per-GPU link telemetry.
#[derive(Clone, Copy, Debug)]
pub struct LinkJsonParser {
    format: LinkFormat,
}

impl LinkJsonParser {
    pub fn c2c() -> Self {
        Self {
            format: LinkFormat::C2c,
        }
    }

    pub fn xgmi() -> Self {
        Self {
            format: LinkFormat::Xgmi,
        }
    }
}

impl MetricsParser for LinkJsonParser {
    fn format(&self) -> &'static str {
        self.format.name()
    }

    fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError> {
        let raw = require_text(raw)?;
        let format = self.format.name();

        let document: Value = serde_json::from_str(raw)?;
        let gpus = document
            .as_array()
            .ok_or_else(|| ParseError::unexpected(format, "document is not a JSON array"))?;

        let mut metrics = Vec::new();
        let mut recognized = 0usize;
        for entry in gpus {
            let Some(gpu) = entry.as_object() else {
                trace!(format, "skipping array entry that is not an object");
                continue;
            };
            let Some(gpu_id) = gpu.get("gpu").and_then(identifier) else {
                trace!(format, "skipping GPU entry without an id");
                continue;
            };

            recognized += 1;
            match self.format {
                LinkFormat::C2c => c2c_metrics(gpu, &gpu_id, &mut metrics)?,
                LinkFormat::Xgmi => xgmi_metrics(gpu, &gpu_id, &mut metrics)?,
            }
        }

        if recognized == 0 && !gpus.is_empty() {
            return Err(ParseError::MissingSection {
                format,
                section: "GPU entry",
            });
        }
        debug!(format, gpus = recognized, metrics = metrics.len(), "parsed link telemetry");
        Ok(metrics)
    }
}

/// A GPU or link id, numeric or textual.
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// A reading given as a number, a string with an optional unit, or an
/// object of the form `{"value": .., "unit": ..}`.
fn reading(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => split_value_unit(s).map(|(v, _)| v),
        Value::Object(fields) => fields.get("value").and_then(reading),
        _ => None,
    }
}

/// The unit attached to an object reading, or `fallback`.
fn reading_unit(value: &Value, fallback: &str) -> String {
    value
        .get("unit")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case("N/A"))
        .unwrap_or(fallback)
        .to_string()
}

fn c2c_metrics(
    gpu: &Map<String, Value>,
    gpu_id: &str,
    metrics: &mut Vec<Metric>,
) -> Result<(), ParseError> {
    let mut metadata = BTreeMap::new();
    metadata.insert("gpu_index".to_string(), gpu_id.to_string());
    for (field, key) in [("name", "gpu_name"), ("uuid", "gpu_uuid")] {
        if let Some(value) = gpu.get(field).and_then(Value::as_str) {
            metadata.insert(key.to_string(), value.trim().to_string());
        }
    }

    let links = gpu.get("links").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
    for link in links {
        let Some(link_id) = link.get("link").and_then(identifier) else {
            continue;
        };
        let Some(speed) = link.get("speed").and_then(reading) else {
            trace!(gpu = gpu_id, link = %link_id, "skipping link without a speed");
            continue;
        };
        metrics.push(c2c_link_metric(gpu_id, &link_id, speed, metadata.clone())?);
    }
    Ok(())
}

/// `GPU <gpu>: C2C Link <link> Speed`, shared with the plain-text report.
pub(crate) fn c2c_link_metric(
    gpu: &str,
    link: &str,
    speed: f64,
    metadata: BTreeMap<String, String>,
) -> Result<Metric, ParseError> {
    Ok(Metric::new(format!("GPU {gpu}: C2C Link {link} Speed"), speed)?
        .with_unit(GIGABYTES_PER_SECOND)
        .with_relativity(MetricRelativity::HigherIsBetter)
        .with_description(format!("C2C link speed for GPU {gpu} link {link}."))
        .with_tags(["gpu", "nvidia", "c2c"])
        .with_metadata(metadata))
}

fn xgmi_metrics(
    gpu: &Map<String, Value>,
    gpu_id: &str,
    metrics: &mut Vec<Metric>,
) -> Result<(), ParseError> {
    let mut metadata = BTreeMap::new();
    metadata.insert("gpu.id".to_string(), gpu_id.to_string());
    if let Some(bdf) = gpu.get("bdf").and_then(Value::as_str) {
        metadata.insert("gpu.bdf".to_string(), bdf.trim().to_string());
    }

    let Some(link_metrics) = gpu.get("link_metrics") else {
        trace!(gpu = gpu_id, "GPU entry has no link_metrics");
        return Ok(());
    };

    let xgmi = |name: String, value: f64, unit: String, metadata: BTreeMap<String, String>| {
        Metric::new(name, value).map(|m| {
            m.with_unit(unit)
                .with_tags(["gpu", "amd", "xgmi"])
                .with_metadata(metadata)
        })
    };

    for field in ["bit_rate", "max_bandwidth"] {
        if let Some(node) = link_metrics.get(field) {
            if let Some(value) = reading(node) {
                let unit = reading_unit(node, GIGABITS_PER_SECOND);
                metrics.push(xgmi(format!("xgmi_{field}"), value, unit, metadata.clone())?);
            }
        }
    }

    let links = link_metrics
        .get("links")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    for (index, link) in links.iter().enumerate() {
        let mut link_metadata = metadata.clone();
        if let Some(peer) = link.get("gpu").and_then(identifier) {
            link_metadata.insert("link.gpu".to_string(), peer);
        }
        if let Some(bdf) = link.get("bdf").and_then(Value::as_str) {
            link_metadata.insert("link.bdf".to_string(), bdf.trim().to_string());
        }

        let read = link.get("read").and_then(reading);
        let write = link.get("write").and_then(reading);
        let unit = link
            .get("read")
            .map_or_else(|| KILOBYTES.to_string(), |node| reading_unit(node, KILOBYTES));

        for (direction, value) in [("read", read), ("write", write)] {
            if let Some(value) = value {
                metrics.push(xgmi(
                    format!("xgmi_{index}_{direction}"),
                    value,
                    unit.clone(),
                    link_metadata.clone(),
                )?);
            }
        }
        if let (Some(read), Some(write)) = (read, write) {
            metrics.push(xgmi(
                format!("xgmi_{index}_data"),
                read + write,
                unit.clone(),
                link_metadata,
            )?);
        }
    }
    Ok(())
}

fn is_link_data(name: &str) -> bool {
    name.strip_prefix("xgmi_")
        .and_then(|rest| rest.strip_suffix("_data"))
        .map_or(false, |index| {
            !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
        })
}

/// Per GPU total of the `xgmi_<i>_data` counters, in first-seen order.
fn data_totals(metrics: &[Metric]) -> Vec<(String, f64, BTreeMap<String, String>)> {
    let mut totals: Vec<(String, f64, BTreeMap<String, String>)> = Vec::new();
    for metric in metrics.iter().filter(|m| is_link_data(m.name())) {
        let Some(gpu) = metric.metadata().get("gpu.id") else {
            continue;
        };
        match totals.iter_mut().find(|(id, _, _)| id == gpu) {
            Some((_, total, _)) => *total += metric.value(),
            None => {
                let metadata = metric
                    .metadata()
                    .iter()
                    .filter(|(key, _)| key.starts_with("gpu."))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                totals.push((gpu.clone(), metric.value(), metadata));
            }
        }
    }
    totals
}

/// Derive `xgmi.bw` (MB/s) per GPU from two XGMI snapshots taken `elapsed`
/// apart. GPUs are matched on their `gpu.id` metadata; a GPU present in only
/// one snapshot yields nothing.
///
/// # Errors
///
/// [`ParseError::InvalidArgument`] when `elapsed` is zero.
pub fn xgmi_bandwidth(
    before: &[Metric],
    after: &[Metric],
    elapsed: Duration,
) -> Result<Vec<Metric>, ParseError> {
    if elapsed.is_zero() {
        return Err(ParseError::InvalidArgument("elapsed time must be positive"));
    }
    let seconds = elapsed.as_secs_f64();
    let before = data_totals(before);

    let mut metrics = Vec::new();
    for (gpu, total_after, metadata) in data_totals(after) {
        let Some((_, total_before, _)) = before.iter().find(|(id, _, _)| *id == gpu) else {
            debug!(gpu = %gpu, "no earlier XGMI snapshot for GPU");
            continue;
        };
        // KB per second to MB per second.
        let bandwidth = (total_after - total_before) / seconds / 1024.0;
        metrics.push(
            Metric::new("xgmi.bw", bandwidth)?
                .with_unit(MEGABYTES_PER_SECOND)
                .with_relativity(MetricRelativity::HigherIsBetter)
                .with_description("XGMI bandwidth over the sampling interval.")
                .with_tags(["gpu", "amd", "xgmi"])
                .with_metadata(metadata),
        );
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const XGMI: &str = r#"[
        {"gpu": 0, "bdf": "0000:0c:00.0", "link_metrics": {
            "bit_rate": {"value": 32, "unit": "Gb/s"},
            "max_bandwidth": {"value": 512, "unit": "Gb/s"},
            "links": [
                {"gpu": 0, "bdf": "0000:0c:00.0", "read": {"value": "N/A", "unit": "KB"}, "write": {"value": "N/A", "unit": "KB"}},
                {"gpu": 1, "bdf": "0000:22:00.0", "read": {"value": 1024, "unit": "KB"}, "write": {"value": 2048, "unit": "KB"}}
            ]}}
    ]"#;

    #[test]
    fn c2c_speeds_accept_numbers_and_strings() {
        let raw = r#"[{"gpu": 0, "name": "NVIDIA GH200 480GB", "uuid": "GPU-1",
                      "links": [{"link": 0, "speed": 44.712},
                                {"link": 1, "speed": "44.712 GB/s"},
                                {"link": 2, "speed": "N/A"}]}]"#;
        let metrics = LinkJsonParser::c2c().parse(raw).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].name(), "GPU 0: C2C Link 1 Speed");
        assert_eq!(metrics[1].value(), 44.712);
        assert_eq!(metrics[1].unit(), "GB/s");
        assert_eq!(metrics[1].relativity(), MetricRelativity::HigherIsBetter);
        assert_eq!(metrics[1].metadata()["gpu_uuid"], "GPU-1");
    }

    #[test]
    fn xgmi_links_are_flattened() {
        let metrics = LinkJsonParser::xgmi().parse(XGMI).unwrap();
        let rendered: Vec<_> = metrics.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "xgmi_bit_rate = 32 Gb/s",
                "xgmi_max_bandwidth = 512 Gb/s",
                "xgmi_1_read = 1024 KB",
                "xgmi_1_write = 2048 KB",
                "xgmi_1_data = 3072 KB",
            ]
        );
        assert_eq!(metrics[4].metadata()["gpu.id"], "0");
        assert_eq!(metrics[4].metadata()["link.bdf"], "0000:22:00.0");
    }

    #[test]
    fn non_array_documents_are_rejected() {
        let err = LinkJsonParser::xgmi().parse(r#"{"gpu": 0}"#).unwrap_err();
        assert!(matches!(err, ParseError::Unexpected { format: "amd-smi-xgmi", .. }));
        let err = LinkJsonParser::c2c().parse("[{").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn arrays_without_gpu_entries_are_rejected() {
        for raw in [r#"[{"foo": 1}]"#, "[1, 2, 3]"] {
            let err = LinkJsonParser::c2c().parse(raw).unwrap_err();
            assert!(
                matches!(err, ParseError::MissingSection { section: "GPU entry", .. }),
                "{raw}"
            );
        }
        let err = LinkJsonParser::xgmi().parse(r#"[{"bdf": "0000:0c:00.0"}]"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingSection { format: "amd-smi-xgmi", .. }));
        assert!(LinkJsonParser::c2c().parse("[]").unwrap().is_empty());
    }

    #[test]
    fn bandwidth_between_snapshots() {
        let before = LinkJsonParser::xgmi().parse(XGMI).unwrap();
        let after_raw = XGMI.replace("1024", "3072").replace("2048", "4096");
        let after = LinkJsonParser::xgmi().parse(&after_raw).unwrap();

        let bw = xgmi_bandwidth(&before, &after, Duration::from_millis(2000)).unwrap();
        assert_eq!(bw.len(), 1);
        // (7168 - 3072) KB over 2 s is 2048 KB/s, or 2 MB/s.
        assert_eq!(bw[0].to_string(), "xgmi.bw = 2 MB/s");
        assert_eq!(bw[0].metadata()["gpu.bdf"], "0000:0c:00.0");
        assert!(!bw[0].metadata().contains_key("link.bdf"));
    }

    #[test]
    fn bandwidth_needs_elapsed_time() {
        assert!(matches!(
            xgmi_bandwidth(&[], &[], Duration::ZERO),
            Err(ParseError::InvalidArgument(_))
        ));
    }
}
