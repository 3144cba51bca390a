//! `nvidia-smi --query-gpu=... --format=csv` exports.
//!
//! One row per GPU. The identifier columns (`index`, `name`, `pci.bus_id`,
//! ...) become `gpu_*` metadata so rows for different GPUs can be told apart.

use super::csv::{CsvColumn, CsvParser, CsvSchema, MetricColumns};
use crate::metric::unit::{CELSIUS, COUNT, MEBIBYTES, MEGAHERTZ, PERCENT, WATTS};
use crate::metric::MetricRelativity::{self, LowerIsBetter, Undefined};

pub const FORMAT: &str = "nvidia-smi";

const fn column(
    name: &'static str,
    unit: &'static str,
    description: &'static str,
    relativity: MetricRelativity,
) -> CsvColumn {
    CsvColumn {
        name,
        unit,
        description,
        relativity,
    }
}

/// Metric columns of the query, in the order nvidia-smi is asked for them.
pub const QUERY_GPU_COLUMNS: [CsvColumn; 31] = [
    column("utilization.gpu", PERCENT, "The current percentage utilization of the GPU.", Undefined),
    column("utilization.memory", PERCENT, "The current percentage of memory utilization for the GPU.", Undefined),
    column("temperature.gpu", CELSIUS, "The current temperature reading (in celsius) for the GPU.", LowerIsBetter),
    column("temperature.memory", CELSIUS, "The current temperature reading (in celsius) for the GPU memory.", LowerIsBetter),
    column("power.draw.average", WATTS, "The average power draw (in watts) for the GPU.", LowerIsBetter),
    column("clocks.current.graphics", MEGAHERTZ, "The current clock speed for GPU graphics processing.", Undefined),
    column("clocks.current.sm", MEGAHERTZ, "The current clock speed for GPU streaming multiprocessors.", Undefined),
    column("clocks.current.video", MEGAHERTZ, "The current clock speed for GPU video processing.", Undefined),
    column("clocks.current.memory", MEGAHERTZ, "The current clock speed for GPU memory operations.", Undefined),
    column("memory.total", MEBIBYTES, "The total memory (in mebibytes) of the GPU.", Undefined),
    column("memory.free", MEBIBYTES, "The memory (in mebibytes) currently free on the GPU.", Undefined),
    column("memory.used", MEBIBYTES, "The memory (in mebibytes) currently used on the GPU.", Undefined),
    column("power.draw.instant", WATTS, "The instant power draw (in watts) for the GPU.", LowerIsBetter),
    column("pcie.link.gen.gpucurrent", "", "The current PCIe link generation of the GPU.", Undefined),
    column("pcie.link.width.current", "", "The current PCIe link width of the GPU.", Undefined),
    column("ecc.errors.corrected.volatile.device_memory", COUNT, "Volatile corrected ECC errors in device memory.", LowerIsBetter),
    column("ecc.errors.corrected.volatile.dram", COUNT, "Volatile corrected ECC errors in DRAM.", LowerIsBetter),
    column("ecc.errors.corrected.volatile.sram", COUNT, "Volatile corrected ECC errors in SRAM.", LowerIsBetter),
    column("ecc.errors.corrected.volatile.total", COUNT, "Total volatile corrected ECC errors.", LowerIsBetter),
    column("ecc.errors.corrected.aggregate.device_memory", COUNT, "Aggregate corrected ECC errors in device memory.", LowerIsBetter),
    column("ecc.errors.corrected.aggregate.dram", COUNT, "Aggregate corrected ECC errors in DRAM.", LowerIsBetter),
    column("ecc.errors.corrected.aggregate.sram", COUNT, "Aggregate corrected ECC errors in SRAM.", LowerIsBetter),
    column("ecc.errors.corrected.aggregate.total", COUNT, "Total aggregate corrected ECC errors.", LowerIsBetter),
    column("ecc.errors.uncorrected.volatile.device_memory", COUNT, "Volatile uncorrected ECC errors in device memory.", LowerIsBetter),
    column("ecc.errors.uncorrected.volatile.dram", COUNT, "Volatile uncorrected ECC errors in DRAM.", LowerIsBetter),
    column("ecc.errors.uncorrected.volatile.sram", COUNT, "Volatile uncorrected ECC errors in SRAM.", LowerIsBetter),
    column("ecc.errors.uncorrected.volatile.total", COUNT, "Total volatile uncorrected ECC errors.", LowerIsBetter),
    column("ecc.errors.uncorrected.aggregate.device_memory", COUNT, "Aggregate uncorrected ECC errors in device memory.", LowerIsBetter),
    column("ecc.errors.uncorrected.aggregate.dram", COUNT, "Aggregate uncorrected ECC errors in DRAM.", LowerIsBetter),
    column("ecc.errors.uncorrected.aggregate.sram", COUNT, "Aggregate uncorrected ECC errors in SRAM.", LowerIsBetter),
    column("ecc.errors.uncorrected.aggregate.total", COUNT, "Total aggregate uncorrected ECC errors.", LowerIsBetter),
];

/// Identifier columns and the metadata key each is stored under.
pub const IDENTIFIER_COLUMNS: [(&str, &str); 7] = [
    ("index", "gpu_index"),
    ("name", "gpu_name"),
    ("pci.bus_id", "gpu_pci_bus_id"),
    ("driver_version", "gpu_driver_version"),
    ("pstate", "gpu_pstate"),
    ("pcie.link.gen.max", "gpu_pcie_link_gen_max"),
    ("pcie.link.gen.current", "gpu_pcie_link_gen_current"),
];

/// The `--query-gpu` field list matching [`QUERY_GPU_COLUMNS`] and
/// [`IDENTIFIER_COLUMNS`].
pub fn query_gpu_fields() -> String {
    IDENTIFIER_COLUMNS
        .iter()
        .map(|(column, _)| *column)
        .chain(QUERY_GPU_COLUMNS.iter().map(|c| c.name))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn query_gpu_schema() -> CsvSchema {
    IDENTIFIER_COLUMNS.iter().fold(
        CsvSchema::new(FORMAT, MetricColumns::Listed(QUERY_GPU_COLUMNS.to_vec()))
            .with_tags(&["gpu", "nvidia"]),
        |schema, &(column, key)| schema.with_identifier(column, key),
    )
}

/// Parser for `nvidia-smi --query-gpu` CSV exports.
pub fn query_gpu_parser() -> CsvParser {
    CsvParser::new(query_gpu_schema())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::MetricsParser;

    #[test]
    fn field_list_names_every_column() {
        let fields = query_gpu_fields();
        assert_eq!(fields.split(',').count(), 38);
        assert!(fields.starts_with("index,name,pci.bus_id,"));
        assert!(fields.ends_with(",ecc.errors.uncorrected.aggregate.total"));
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let raw = "index, fan.speed [%], utilization.gpu [%]\n0, 30, 12\n";
        let metrics = query_gpu_parser().parse(raw).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].to_string(), "utilization.gpu = 12 %");
        assert_eq!(metrics[0].tags(), ["gpu", "nvidia"]);
    }

    #[test]
    fn not_supported_cells_are_skipped() {
        let raw = "index, name, temperature.memory, memory.used [MiB]\n\
                   0, NVIDIA H100, [N/A], 0 MiB\n";
        let metrics = query_gpu_parser().parse(raw).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name(), "memory.used");
        assert_eq!(metrics[0].unit(), "MiB");
        assert_eq!(metrics[0].metadata()["gpu_name"], "NVIDIA H100");
    }
}
