//! Plain-text `nvidia-smi c2c -s` reports.
//!
//! ```text
//! GPU 0: NVIDIA GH200 480GB (UUID: GPU-6a9f...)
//!      C2C Link 0: 44.712 GB/s
//!      C2C Link 1: 44.712 GB/s
//! ```
//!
//! Metric names match the JSON form read by
//! [`LinkJsonParser::c2c`](super::links::LinkJsonParser::c2c).

use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::links::c2c_link_metric;
use crate::error::ParseError;
use crate::metric::Metric;
use crate::parser::{require_text, MetricsParser};
use crate::tokenizer::{split_value_unit, Line};

pub const FORMAT: &str = "nvidia-smi-c2c";

#[derive(Clone, Copy, Debug, Default)]
pub struct C2cTextParser;

/// A `GPU n: <name> (UUID: ...)` header.
#[derive(Debug, PartialEq, Eq)]
struct GpuHeader<'a> {
    index: &'a str,
    name: &'a str,
    uuid: Option<&'a str>,
}

impl GpuHeader<'_> {
    fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("gpu_index".to_string(), self.index.to_string());
        metadata.insert("gpu_name".to_string(), self.name.to_string());
        if let Some(uuid) = self.uuid {
            metadata.insert("gpu_uuid".to_string(), uuid.to_string());
        }
        metadata
    }
}

enum ScanState<'a> {
    SeekGpu,
    InGpu(GpuHeader<'a>),
}

fn gpu_header(text: &str) -> Option<GpuHeader<'_>> {
    let (index, rest) = text.strip_prefix("GPU ")?.split_once(':')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let rest = rest.trim();
    let (name, uuid) = match rest.rfind("(UUID:") {
        Some(open) => {
            let uuid = rest[open + "(UUID:".len()..].trim().trim_end_matches(')').trim();
            (rest[..open].trim(), Some(uuid))
        }
        None => (rest, None),
    };
    Some(GpuHeader { index, name, uuid })
}

fn link_speed(text: &str) -> Option<(&str, Option<f64>)> {
    let (link, speed) = text.strip_prefix("C2C Link ")?.split_once(':')?;
    let link = link.trim();
    if link.is_empty() || !link.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let speed = split_value_unit(speed)
        .filter(|(_, unit)| unit.is_empty() || unit.eq_ignore_ascii_case("GB/s"))
        .map(|(value, _)| value);
    Some((link, speed))
}

impl MetricsParser for C2cTextParser {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError> {
        let raw = require_text(raw)?;

        let mut state = ScanState::SeekGpu;
        let mut gpus = 0usize;
        let mut metrics = Vec::new();

        for raw_line in raw.lines() {
            let text = Line::new(raw_line).text();
            if text.is_empty() {
                continue;
            }

            if let Some(header) = gpu_header(text) {
                gpus += 1;
                state = ScanState::InGpu(header);
                continue;
            }

            let ScanState::InGpu(gpu) = &state else {
                trace!(line = text, "skipping text before the first GPU header");
                continue;
            };
            match link_speed(text) {
                Some((link, Some(speed))) => {
                    metrics.push(c2c_link_metric(gpu.index, link, speed, gpu.metadata())?);
                }
                Some((link, None)) => {
                    trace!(gpu = gpu.index, link, "skipping link without a speed");
                }
                None => trace!(line = text, "ignoring line"),
            }
        }

        if gpus == 0 {
            return Err(ParseError::MissingSection {
                format: FORMAT,
                section: "GPU header",
            });
        }
        debug!(gpus, metrics = metrics.len(), "parsed C2C report");
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers() {
        assert_eq!(
            gpu_header("GPU 1: NVIDIA GH200 480GB (UUID: GPU-0f3c)"),
            Some(GpuHeader {
                index: "1",
                name: "NVIDIA GH200 480GB",
                uuid: Some("GPU-0f3c"),
            })
        );
        assert_eq!(gpu_header("GPU x: thing"), None);
        assert_eq!(gpu_header("C2C Link 0: 44.712 GB/s"), None);
    }

    #[test]
    fn links_follow_their_gpu() {
        let raw = "GPU 0: NVIDIA GH200 480GB (UUID: GPU-a)\n\
                   \t C2C Link 0: 44.712 GB/s\n\
                   \t C2C Link 1: N/A\n\
                   GPU 1: NVIDIA GH200 480GB (UUID: GPU-b)\n\
                   \t C2C Link 0: 40.5 GB/s\n";
        let metrics = C2cTextParser.parse(raw).unwrap();
        let rendered: Vec<_> = metrics.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            [
                "GPU 0: C2C Link 0 Speed = 44.712 GB/s",
                "GPU 1: C2C Link 0 Speed = 40.5 GB/s",
            ]
        );
        assert_eq!(metrics[1].metadata()["gpu_uuid"], "GPU-b");
    }

    #[test]
    fn missing_header_is_an_error() {
        let err = C2cTextParser.parse("C2C Link 0: 44.712 GB/s\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingSection { .. }));
    }
}
