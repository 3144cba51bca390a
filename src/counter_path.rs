//! Counter paths of the form `\Category(Instance)\Counter`.
//!
//! The atop parser names every metric with a counter path, and callers
//! use [`CounterPath`] to split a metric name back into its parts. The
//! instance is delimited by the outermost matching pair of parentheses, so
//! `\Disk(nvme0n1 (p1))\# Reads` has the instance `nvme0n1 (p1)`.

use std::fmt;

/// A parsed counter path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CounterPath {
    category: String,
    instance: Option<String>,
    counter: String,
}

impl CounterPath {
    /// Build a path from its parts.
    pub fn new(
        category: impl Into<String>,
        instance: Option<&str>,
        counter: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            instance: instance.map(str::to_string),
            counter: counter.into(),
        }
    }

    /// Parse `\Category(Instance)\Counter` or `\Category\Counter`.
    ///
    /// Returns `None` when the text is not a counter path: no leading
    /// backslash, unbalanced parentheses, or an empty category or counter.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('\\')?;

        let open = rest.find('(');
        let sep = rest.find('\\')?;

        match open {
            Some(open) if open < sep => {
                let close = open + matching_close(&rest[open..])?;
                let category = rest[..open].trim_end();
                let instance = &rest[open + 1..close];
                let counter = rest[close + 1..].strip_prefix('\\')?;
                if category.is_empty() || counter.is_empty() {
                    return None;
                }
                Some(Self::new(category, Some(instance), counter))
            }
            _ => {
                let category = &rest[..sep];
                let counter = &rest[sep + 1..];
                if category.is_empty() || counter.is_empty() {
                    return None;
                }
                Some(Self::new(category, None, counter))
            }
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    pub fn counter(&self) -> &str {
        &self.counter
    }

    /// The category-wide path for a roll-up counter, e.g.
    /// `\Disk(sda)\% Busy Time` rolls up into `\Disk\Avg. % Busy Time`.
    pub fn rollup(&self, counter: impl Into<String>) -> Self {
        Self::new(self.category.clone(), None, counter)
    }
}

impl fmt::Display for CounterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "\\{}({})\\{}", self.category, instance, self.counter),
            None => write!(f, "\\{}\\{}", self.category, self.counter),
        }
    }
}

/// Byte offset of the parenthesis closing the one at the start of `text`.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
