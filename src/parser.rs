//! The contract every metric parser implements.

use std::collections::HashSet;

use tracing::debug;

use crate::error::ParseError;
use crate::metric::Metric;

/// Turns the raw text output of one tool into metrics.
///
/// Parsers are stateless configuration values: each call owns its own scan
/// state, so a single parser may be shared between threads.
pub trait MetricsParser: Send + Sync {
    /// Short name of the format, used in errors and logs.
    fn format(&self) -> &'static str;

    /// Parse every metric the text contains, in document order.
    ///
    /// # Errors
    ///
    /// Fails when the text is empty or does not contain the structure the
    /// format requires. Individual unreadable values are skipped.
    fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError>;

    /// Parse, then keep only the metrics whose names match one of `names`,
    /// ignoring case. Values are identical to those of [`Self::parse`] and
    /// their order is preserved.
    ///
    /// # Errors
    ///
    /// [`ParseError::InvalidArgument`] when `names` is empty, otherwise the
    /// same errors as [`Self::parse`].
    fn parse_filtered(&self, raw: &str, names: &[String]) -> Result<Vec<Metric>, ParseError> {
        if names.is_empty() {
            return Err(ParseError::InvalidArgument("counter filter must not be empty"));
        }
        let metrics = self.parse(raw)?;
        let total = metrics.len();
        let kept = retain_named(metrics, names);
        debug!(
            format = self.format(),
            total,
            kept = kept.len(),
            "applied counter filter"
        );
        Ok(kept)
    }
}

/// Keep the metrics named in `names`, compared case-insensitively.
pub fn retain_named(metrics: Vec<Metric>, names: &[String]) -> Vec<Metric> {
    let wanted: HashSet<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
    metrics
        .into_iter()
        .filter(|m| wanted.contains(&m.name().to_lowercase()))
        .collect()
}

/// Reject empty or whitespace-only input before scanning.
pub(crate) fn require_text(raw: &str) -> Result<&str, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::InvalidArgument("raw text must not be empty"));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl MetricsParser for Fixed {
        fn format(&self) -> &'static str {
            "fixed"
        }

        fn parse(&self, raw: &str) -> Result<Vec<Metric>, ParseError> {
            require_text(raw)?;
            Ok(vec![
                Metric::new("\\Disk\\# Reads", 1.0)?,
                Metric::new("\\Disk\\# Writes", 2.0)?,
                Metric::new("\\Disk(sda)\\# Reads", 3.0)?,
            ])
        }
    }

    #[test]
    fn filter_is_case_insensitive_and_ordered() {
        let names = vec!["\\disk(SDA)\\# reads".to_string(), "\\DISK\\# READS".to_string()];
        let metrics = Fixed.parse_filtered("x", &names).unwrap();
        let names: Vec<_> = metrics.iter().map(Metric::name).collect();
        assert_eq!(names, ["\\Disk\\# Reads", "\\Disk(sda)\\# Reads"]);
    }

    #[test]
    fn filter_matching_nothing_is_empty() {
        let names = vec!["\\Memory\\Free Bytes".to_string()];
        assert!(Fixed.parse_filtered("x", &names).unwrap().is_empty());
    }

    #[test]
    fn empty_filter_is_rejected() {
        assert!(matches!(
            Fixed.parse_filtered("x", &[]),
            Err(ParseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            Fixed.parse(" \n\t"),
            Err(ParseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn parsers_are_object_safe() {
        let parser: Box<dyn MetricsParser> = Box::new(Fixed);
        assert_eq!(parser.parse("x").unwrap().len(), 3);
    }
}
