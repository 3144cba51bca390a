//! atop text dumps (`atop -r <file>` / `atop <interval> <count>`).
//!
//! Each `ATOP` header line opens a capture interval. The lines that follow
//! are `LABEL | cell | cell ...` rows where every cell reads
//! `key value [unit]`. Counters are named with counter paths such as
//! `\Processor(cpu000)\% System Time`, and disk and network devices are
//! additionally rolled up into category-wide counters per interval.
//!
//! The first interval of a dump covers the activity since boot, so it is
//! dropped whenever the dump holds more than one interval.

use tracing::{debug, trace};

use crate::aggregate::SampleAggregator;
use crate::counter_path::CounterPath;
use crate::error::ParseError;
use crate::metric::unit::{BYTES, KILOBITS_PER_SECOND, MILLISECONDS, PERCENT};
use crate::metric::Metric;
use crate::parser::{require_text, MetricsParser};
use crate::tokenizer::{split_value_unit, translate_byte_unit, Line};

pub const FORMAT: &str = "atop";

const PROCESSOR_TOTAL: (&str, Option<&str>) = ("Processor Information", Some("_Total"));

/// `(cell key, counter, unit)` triples of one section.
type CounterTable = &'static [(&'static str, &'static str, &'static str)];

const CPU_COUNTERS: CounterTable = &[
    ("sys", "% System Time", PERCENT),
    ("user", "% User Time", PERCENT),
    ("irq", "% IRQ Time", PERCENT),
    ("idle", "% Idle Time", PERCENT),
    ("wait", "% IOWait Time", PERCENT),
];

const CPL_COUNTERS: CounterTable = &[
    ("avg1", "Available Threads (Avg1)", ""),
    ("avg5", "Available Threads (Avg5)", ""),
    ("avg15", "Available Threads (Avg15)", ""),
    ("csw", "CSwitches", ""),
    ("intr", "Serviced Interrupts", ""),
];

const MEM_COUNTERS: CounterTable = &[
    ("tot", "Total Bytes", BYTES),
    ("free", "Free Bytes", BYTES),
    ("cache", "Cached Bytes", BYTES),
    ("buff", "Buffer Bytes", BYTES),
    ("slab", "Kernel Bytes", BYTES),
];

const SWP_COUNTERS: CounterTable = &[
    ("tot", "Swap Space Total Bytes", BYTES),
    ("free", "Swap Space Free Bytes", BYTES),
    ("vmcom", "Swap Space Virtual Committed Bytes", BYTES),
    ("vmlim", "Swap Space Virtual Limit Bytes", BYTES),
];

const PAG_COUNTERS: CounterTable = &[
    ("scan", "Page Scans", ""),
    ("steal", "Page Steals", ""),
    ("stall", "Page Reclaims", ""),
    ("swin", "Swap Space Reads", ""),
    ("swout", "Swap Space Writes", ""),
];

const DSK_COUNTERS: CounterTable = &[
    ("busy", "% Busy Time", PERCENT),
    ("read", "# Reads", ""),
    ("write", "# Writes", ""),
    ("avio", "Avg. Request Time", MILLISECONDS),
];

const TRANSPORT_COUNTERS: CounterTable = &[
    ("tcpi", "TCP Segments Received", ""),
    ("tcpo", "TCP Segments Transmitted", ""),
    ("udpi", "UDP Segments Received", ""),
    ("udpo", "UDP Segments Transmitted", ""),
];

const NETWORK_COUNTERS: CounterTable = &[
    ("ipi", "IP Datagrams Received", ""),
    ("ipo", "IP Datagrams Transmitted", ""),
    ("ipfrw", "IP Datagrams Forwarded", ""),
    ("deliv", "IP Datagrams Delivered", ""),
];

const INTERFACE_PACKET_COUNTERS: CounterTable = &[
    ("pcki", "Packets Received", ""),
    ("pcko", "Packets Transmitted", ""),
];

const INTERFACE_RATE_COUNTERS: CounterTable = &[
    ("si", "KB/sec Received", KILOBITS_PER_SECOND),
    ("so", "KB/sec Transmitted", KILOBITS_PER_SECOND),
];

/// How a roll-up combines the device instances of one interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rollup {
    Mean,
    Total,
}

/// `(category, device counter, roll-up counter, combination)`.
const ROLLUPS: &[(&str, &str, &str, Rollup)] = &[
    ("Disk", "% Busy Time", "Avg. % Busy Time", Rollup::Mean),
    ("Disk", "Avg. Request Time", "Avg. Request Time", Rollup::Mean),
    ("Disk", "# Reads", "# Reads", Rollup::Total),
    ("Disk", "# Writes", "# Writes", Rollup::Total),
    ("Network", "% Usage", "Avg. % Usage", Rollup::Mean),
    ("Network", "KB/sec Received", "Avg. KB/sec Received", Rollup::Mean),
    ("Network", "KB/sec Transmitted", "Avg. KB/sec Transmitted", Rollup::Mean),
    ("Network", "Packets Received", "Packets Received", Rollup::Total),
    ("Network", "Packets Transmitted", "Packets Transmitted", Rollup::Total),
];

/// How the value part of a cell is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Reading {
    /// A number with an optional unit that is ignored.
    Plain,
    /// A size with a K/M/G/T/P suffix.
    Bytes,
    /// A bit rate, normalized to Kbps.
    Rate,
}

#[derive(Clone, Debug)]
struct Sample {
    path: CounterPath,
    unit: &'static str,
    value: f64,
}

/// The samples of one capture interval.
#[derive(Clone, Debug, Default)]
struct Interval {
    samples: Vec<Sample>,
}

impl Interval {
    fn push(&mut self, path: CounterPath, unit: &'static str, value: f64) {
        self.samples.push(Sample { path, unit, value });
    }

    /// Read every known counter of `cells` into this interval.
    fn scan(
        &mut self,
        cells: &[&str],
        table: CounterTable,
        (category, instance): (&str, Option<&str>),
        reading: Reading,
    ) {
        for cell in cells {
            let Some((key, rest)) = cell.split_once(char::is_whitespace) else {
                continue;
            };
            let Some(&(_, counter, unit)) = table.iter().find(|(k, _, _)| *k == key) else {
                continue;
            };
            match read_value(rest, reading) {
                Some(value) => self.push(CounterPath::new(category, instance, counter), unit, value),
                None => trace!(category, key, cell = *cell, "skipping unreadable cell"),
            }
        }
    }

    /// Append the category roll-ups computed from the device instances.
    fn close(mut self) -> Vec<Sample> {
        for &(category, counter, rollup_counter, rollup) in ROLLUPS {
            let devices = self.samples.iter().filter(|s| {
                s.path.category() == category
                    && s.path.instance().is_some()
                    && s.path.counter() == counter
            });

            let mut first = None;
            let mut count = 0usize;
            let mut total = 0.0;
            for sample in devices {
                first.get_or_insert(sample);
                count += 1;
                total += sample.value;
            }
            let Some(first) = first else {
                continue;
            };

            let value = match rollup {
                Rollup::Mean => total / count as f64,
                Rollup::Total => total,
            };
            let (path, unit) = (first.path.rollup(rollup_counter), first.unit);
            self.push(path, unit, value);
        }
        self.samples
    }
}

fn read_value(text: &str, reading: Reading) -> Option<f64> {
    match reading {
        Reading::Plain => split_value_unit(text).map(|(value, _)| value),
        Reading::Bytes => translate_byte_unit(text),
        Reading::Rate => {
            let (value, unit) = split_value_unit(text)?;
            let scale = match unit.to_ascii_lowercase().as_str() {
                "bps" => 1.0e-3,
                "" | "kbps" => 1.0,
                "mbps" => 1.0e3,
                "gbps" => 1.0e6,
                _ => return None,
            };
            Some(value * scale)
        }
    }
}

/// Split a data row into its label and non-empty cells.
fn row(text: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = text.split('|');
    let label = parts.next()?.trim();
    let cells: Vec<&str> = parts.map(str::trim).filter(|c| !c.is_empty()).collect();
    if label.is_empty() || cells.is_empty() {
        return None;
    }
    Some((label, cells))
}

fn is_interval_header(text: &str) -> bool {
    text.split_whitespace().next() == Some("ATOP")
}

/// The `cpuNNN w N%` cell of a `cpu` row: the instance and its IOWait
/// reading, when the reading is readable.
fn cpu_instance<'a>(cells: &[&'a str]) -> Option<(&'a str, Option<f64>)> {
    cells.iter().copied().find_map(|cell: &'a str| {
        let mut tokens = cell.split_whitespace();
        let token = tokens.next()?;
        let digits = token.strip_prefix("cpu")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let wait = match (tokens.next(), tokens.next()) {
            (Some("w"), Some(reading)) => split_value_unit(reading).map(|(value, _)| value),
            _ => None,
        };
        Some((token, wait))
    })
}

fn scan_row(interval: &mut Interval, label: &str, cells: &[&str]) {
    match label {
        "CPU" => interval.scan(cells, CPU_COUNTERS, PROCESSOR_TOTAL, Reading::Plain),
        "cpu" => match cpu_instance(cells) {
            Some((cpu, wait)) => {
                interval.scan(cells, CPU_COUNTERS, ("Processor", Some(cpu)), Reading::Plain);
                match wait {
                    Some(wait) => interval.push(
                        CounterPath::new("Processor", Some(cpu), "% IOWait Time"),
                        PERCENT,
                        wait,
                    ),
                    None => trace!(cpu, "cpu row without a readable wait cell"),
                }
            }
            None => trace!("cpu row without a cpuNNN cell"),
        },
        "CPL" => interval.scan(cells, CPL_COUNTERS, PROCESSOR_TOTAL, Reading::Plain),
        "MEM" => interval.scan(cells, MEM_COUNTERS, ("Memory", None), Reading::Bytes),
        "SWP" => interval.scan(cells, SWP_COUNTERS, ("Memory", None), Reading::Bytes),
        "PAG" => interval.scan(cells, PAG_COUNTERS, ("Memory", None), Reading::Plain),
        "DSK" => {
            let device = cells[0];
            if device.contains(char::is_whitespace) {
                trace!(device, "DSK row without a device cell");
                return;
            }
            interval.scan(&cells[1..], DSK_COUNTERS, ("Disk", Some(device)), Reading::Plain);
        }
        "NET" => scan_network(interval, cells),
        _ => {}
    }
}

fn scan_network(interval: &mut Interval, cells: &[&str]) {
    let mut head = cells[0].split_whitespace();
    let name = head.next().unwrap_or_default();
    let usage = head.next();

    match (name, usage) {
        ("transport", None) => {
            interval.scan(&cells[1..], TRANSPORT_COUNTERS, ("Network", None), Reading::Plain);
        }
        ("network", None) => {
            interval.scan(&cells[1..], NETWORK_COUNTERS, ("Network", None), Reading::Plain);
        }
        (_, Some(usage)) if usage.starts_with("---") => {
            trace!(interface = name, "skipping loopback interface");
        }
        (iface, Some(usage)) => {
            let instance = ("Network", Some(iface));
            match split_value_unit(usage) {
                Some((value, _)) => interval.push(
                    CounterPath::new("Network", Some(iface), "% Usage"),
                    PERCENT,
                    value,
                ),
                None => trace!(interface = iface, usage, "unreadable interface usage"),
            }
            interval.scan(&cells[1..], INTERFACE_PACKET_COUNTERS, instance, Reading::Plain);
            interval.scan(&cells[1..], INTERFACE_RATE_COUNTERS, instance, Reading::Rate);
        }
        (other, None) => trace!(label = other, "ignoring NET row"),
    }
}

enum ScanState {
    SeekInterval,
    InInterval(Interval),
}

/// Advance the scan by one line, moving finished intervals into `closed`.
fn step(state: ScanState, text: &str, closed: &mut Vec<Vec<Sample>>) -> ScanState {
    if is_interval_header(text) {
        if let ScanState::InInterval(interval) = state {
            closed.push(interval.close());
        }
        return ScanState::InInterval(Interval::default());
    }

    match state {
        ScanState::SeekInterval => ScanState::SeekInterval,
        ScanState::InInterval(mut interval) => {
            if let Some((label, cells)) = row(text) {
                scan_row(&mut interval, label, &cells);
            }
            ScanState::InInterval(interval)
        }
    }
}

/// Parser for atop text dumps.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtopParser;

impl MetricsParser for AtopParser {
    fn format(&self) -> &'static str {
        FORMAT
    }

    fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError> {
        let raw = require_text(raw)?;

        let mut closed = Vec::new();
        let mut state = ScanState::SeekInterval;
        for line in raw.lines() {
            state = step(state, Line::new(line).text(), &mut closed);
        }
        if let ScanState::InInterval(interval) = state {
            closed.push(interval.close());
        }

        if closed.is_empty() {
            return Err(ParseError::MissingSection {
                format: FORMAT,
                section: "ATOP",
            });
        }
        let intervals = closed.len();
        if intervals > 1 {
            debug!("dropping the first interval, it covers activity since boot");
            closed.remove(0);
        }

        let mut aggregator = SampleAggregator::new();
        for sample in closed.iter().flatten() {
            aggregator.record(&sample.path.to_string(), sample.unit, sample.value);
        }
        let counters = aggregator.len();
        let metrics = aggregator.finish()?;
        debug!(intervals, counters, metrics = metrics.len(), "parsed atop dump");
        Ok(metrics)
    }
}
