//! Command-line configuration for perfscan.
//!
//! This module defines all CLI arguments using `clap` for parsing: which
//! tool produced the input, where to read it from, which counters to keep
//! and where to log the resulting metrics.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Tools whose output perfscan understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum Tool {
    /// atop text dump
    Atop,
    /// `nvidia-smi --query-gpu=... --format=csv`
    NvidiaSmi,
    /// `nvidia-smi c2c -s` report
    NvidiaSmiC2c,
    /// C2C link speeds as a JSON array
    C2cJson,
    /// `amd-smi metric --csv`
    AmdSmi,
    /// `amd-smi xgmi -m --json`
    AmdSmiXgmi,
    /// `lspci -vvv`
    Lspci,
}

impl Tool {
    /// The name used on the command line and in the CSV `tool` column.
    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|value| value.get_name().to_string())
            .unwrap_or_default()
    }
}

/// Normalize system tool output into performance metrics.
///
/// perfscan reads the captured output of atop, nvidia-smi, amd-smi or
/// lspci and prints the metrics it contains. Metrics can be restricted to
/// named counters and appended to a CSV log.
///
/// # Examples
///
/// ```bash
/// # Summarize an atop capture
/// perfscan --tool atop --input atop.txt
///
/// # Keep two counters and log them
/// perfscan --tool atop --input atop.txt \
///     --counter '\Disk\# Reads' --counter '\Memory\Free Bytes' \
///     --csv-file metrics.csv --scenario baseline
///
/// # Parse nvidia-smi output from a pipe
/// nvidia-smi --query-gpu=index,utilization.gpu --format=csv | perfscan --tool nvidia-smi
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Normalize system tool output into performance metrics")]
pub struct Config {
    /// Tool that produced the input.
    #[arg(short, long, value_enum)]
    pub tool: Tool,

    /// Captured output file. Standard input is read when omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Keep only the named counter (case-insensitive). May be repeated.
    ///
    /// Ignored for lspci, whose output is a device listing.
    #[arg(long = "counter", value_name = "NAME")]
    pub counters: Vec<String>,

    /// Append the metrics to this CSV file as well.
    ///
    /// A new file starts with a header row; existing files only grow.
    #[arg(short = 'c', long)]
    pub csv_file: Option<PathBuf>,

    /// Scenario name recorded with every logged metric.
    #[arg(short, long, default_value = "default")]
    pub scenario: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_counters() {
        let config = Config::try_parse_from([
            "perfscan",
            "--tool",
            "atop",
            "--input",
            "atop.txt",
            "--counter",
            "\\Disk\\# Reads",
            "--counter",
            "\\Memory\\Free Bytes",
        ])
        .unwrap();
        assert_eq!(config.tool, Tool::Atop);
        assert_eq!(config.input, Some(PathBuf::from("atop.txt")));
        assert_eq!(config.counters, ["\\Disk\\# Reads", "\\Memory\\Free Bytes"]);
        assert_eq!(config.csv_file, None);
        assert_eq!(config.scenario, "default");
    }

    #[test]
    fn tool_names_are_kebab_case() {
        let config = Config::try_parse_from(["perfscan", "-t", "amd-smi-xgmi"]).unwrap();
        assert_eq!(config.tool, Tool::AmdSmiXgmi);
        assert_eq!(Tool::NvidiaSmiC2c.name(), "nvidia-smi-c2c");
        assert!(Config::try_parse_from(["perfscan", "--tool", "iostat"]).is_err());
    }
}
