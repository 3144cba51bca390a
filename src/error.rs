//! Error type shared by every parser in perfscan.
//!
//! Structural problems (nothing recognizable to parse) surface as a
//! [`ParseError`]. Problems with a single cell or value never do: those
//! values are skipped and the rest of the document is still parsed.

/// Errors raised by the parsers and the metric constructor.
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// A caller supplied an argument that can never be valid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The header or section the format requires was not found.
    #[error("{format}: expected section '{section}' was not found")]
    MissingSection {
        /// Name of the source format.
        format: &'static str,
        /// The header or section that could not be located.
        section: &'static str,
    },
    /// The document was readable but does not have the expected shape.
    #[error("{format}: {detail}")]
    Unexpected {
        /// Name of the source format.
        format: &'static str,
        /// What was wrong with the document.
        detail: String,
    },
    /// CSV reader failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON reader failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    /// Shorthand used by the parsers when a document has the wrong shape.
    pub(crate) fn unexpected(format: &'static str, detail: impl Into<String>) -> Self {
        Self::Unexpected {
            format,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_format_and_section() {
        let err = ParseError::MissingSection {
            format: "atop",
            section: "ATOP",
        };
        assert_eq!(err.to_string(), "atop: expected section 'ATOP' was not found");

        let err = ParseError::unexpected("links", "document is not a JSON array");
        assert_eq!(err.to_string(), "links: document is not a JSON array");
    }
}
