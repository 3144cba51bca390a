//! # perfscan
//!
//! Parsers that turn the captured output of system tools into normalized
//! performance metrics.
//!
//! ## Overview
//!
//! Benchmark runs capture raw output from tools such as atop, nvidia-smi,
//! amd-smi and lspci. `perfscan` reads that text and produces an ordered
//! list of [`Metric`] values with consistent names, units and metadata, or,
//! for lspci, a [`lspci::Device`] tree.
//!
//! ```
//! use perfscan::parsers::atop::AtopParser;
//! use perfscan::MetricsParser;
//!
//! let dump = "ATOP - host 2024/01/15 10:00:00 ---- 10s elapsed\n\
//!             cpu | sys 2% | user 6% | irq 0% | idle 92% | cpu000 w 0% |\n";
//! let metrics = AtopParser.parse(dump)?;
//! assert_eq!(metrics[0].to_string(), "\\Processor(cpu000)\\% System Time = 2 %");
//! # Ok::<(), perfscan::ParseError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`metric`]: the metric value object and unit strings
//! - [`counter_path`]: `\Category(Instance)\Counter` names
//! - [`tokenizer`]: line classification and value tokenization
//! - [`aggregate`]: per-counter sample summaries
//! - [`parser`]: the [`MetricsParser`] contract
//! - [`parsers`]: atop, CSV, JSON link and C2C report parsers
//! - [`lspci`]: the lspci device listing parser
//! - [`source`] and [`sink`]: reading raw text and writing metrics
//! - [`config`]: command-line configuration

pub mod aggregate;
pub mod config;
pub mod counter_path;
pub mod error;
pub mod lspci;
pub mod metric;
pub mod parser;
pub mod parsers;
pub mod sink;
pub mod source;
pub mod tokenizer;

pub use counter_path::CounterPath;
pub use error::ParseError;
pub use metric::{Metric, MetricRelativity};
pub use parser::MetricsParser;
