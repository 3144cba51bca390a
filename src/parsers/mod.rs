//! Source-specific metric parsers.

pub mod amd_smi;
pub mod atop;
pub mod c2c;
pub mod csv;
pub mod links;
pub mod nvidia_smi;

use crate::config::Tool;
use crate::parser::MetricsParser;

/// The metric parser for a tool's output, or `None` for tools whose output
/// is not a metric list (lspci).
pub fn for_tool(tool: Tool) -> Option<Box<dyn MetricsParser>> {
    let parser: Box<dyn MetricsParser> = match tool {
        Tool::Atop => Box::new(atop::AtopParser),
        Tool::NvidiaSmi => Box::new(nvidia_smi::query_gpu_parser()),
        Tool::NvidiaSmiC2c => Box::new(c2c::C2cTextParser),
        Tool::C2cJson => Box::new(links::LinkJsonParser::c2c()),
        Tool::AmdSmi => Box::new(amd_smi::metric_parser()),
        Tool::AmdSmiXgmi => Box::new(links::LinkJsonParser::xgmi()),
        Tool::Lspci => return None,
    };
    Some(parser)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;

    #[test]
    fn every_metric_tool_has_a_parser() {
        for tool in Tool::value_variants() {
            assert_eq!(for_tool(*tool).is_some(), *tool != Tool::Lspci, "{tool:?}");
        }
    }

    #[test]
    fn parser_formats_match_tool_names() {
        for tool in Tool::value_variants() {
            if let Some(parser) = for_tool(*tool) {
                let name = tool.to_possible_value().map(|v| v.get_name().to_string());
                assert_eq!(Some(parser.format().to_string()), name);
            }
        }
    }
}
