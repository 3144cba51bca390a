//! Line and value tokenization shared by the text parsers.
//!
//! Indented listings (lspci, C2C reports) are read one [`Line`] at a time and
//! classified into a [`LineRole`]. Cell values from every format go through
//! the same helpers, so `N/A` handling and unit splitting behave identically
//! across tools.

/// One physical line with its indentation measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line<'a> {
    depth: usize,
    text: &'a str,
}

impl<'a> Line<'a> {
    /// Measure `raw`. A tab is one level of depth, and so are four spaces.
    pub fn new(raw: &'a str) -> Self {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        let mut depth = 0;
        let mut spaces = 0;
        for c in raw.chars() {
            match c {
                '\t' => {
                    depth += 1;
                    spaces = 0;
                }
                ' ' => {
                    spaces += 1;
                    if spaces == 4 {
                        depth += 1;
                        spaces = 0;
                    }
                }
                _ => break,
            }
        }

        Self {
            depth,
            text: raw.trim(),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The line without indentation or trailing whitespace.
    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Structural meaning of a line in an indented key:value listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineRole<'a> {
    Blank,
    /// A rule made of `-` or `=` characters.
    Separator,
    /// Unindented text that opens a new record.
    Header(&'a str),
    /// `Capabilities: [40] Power Management version 3`, holding the name
    /// after the bracketed offset.
    Capability { name: &'a str },
    /// An indented `Key: Value` pair. The value may be empty.
    Property { key: &'a str, value: &'a str },
    /// Indented text that is not a key:value pair.
    Text(&'a str),
}

/// Classify a line by its depth and shape.
pub fn classify<'a>(line: &Line<'a>) -> LineRole<'a> {
    let text = line.text();
    if text.is_empty() {
        return LineRole::Blank;
    }
    if text.len() >= 3 && text.chars().all(|c| c == '-' || c == '=') {
        return LineRole::Separator;
    }
    if line.depth() == 0 {
        return LineRole::Header(text);
    }
    if let Some(rest) = text.strip_prefix("Capabilities:") {
        let rest = rest.trim();
        let name = match rest.find(']') {
            Some(end) if rest.starts_with('[') => rest[end + 1..].trim(),
            _ => rest,
        };
        return LineRole::Capability { name };
    }
    match split_property(text) {
        Some((key, value)) => LineRole::Property { key, value },
        None => LineRole::Text(text),
    }
}

/// Split `Key: Value` on the first colon followed by whitespace or the end of
/// the line, so bus addresses such as `00:1f.0` stay intact.
fn split_property(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let colon = text.char_indices().find_map(|(i, c)| {
        let boundary = bytes
            .get(i + 1)
            .map_or(true, |next| next.is_ascii_whitespace());
        (c == ':' && boundary).then_some(i)
    })?;

    let key = text[..colon].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, text[colon + 1..].trim()))
}

/// Whether a cell carries the "no reading" marker.
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value == "-"
        || value == "-1"
        || value.eq_ignore_ascii_case("N/A")
        || value.eq_ignore_ascii_case("[N/A]")
        || value.eq_ignore_ascii_case("[Not Supported]")
}

/// Parse a numeric cell. Sentinels, non-numbers and non-finite values yield
/// `None`.
///
/// Integers go through `i64` first so large counters keep their exact value
/// whenever `f64` can represent it.
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if is_sentinel(value) {
        return None;
    }
    if let Ok(integer) = value.parse::<i64>() {
        return Some(integer as f64);
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split `3.50 ms` into `(3.5, "ms")` and `92%` into `(92.0, "%")`.
pub fn split_value_unit(value: &str) -> Option<(f64, &str)> {
    let value = value.trim();
    if let Some(number) = value.strip_suffix('%') {
        return parse_number(number).map(|n| (n, "%"));
    }
    match value.split_once(char::is_whitespace) {
        Some((number, unit)) => parse_number(number).map(|n| (n, unit.trim())),
        None => parse_number(value).map(|n| (n, "")),
    }
}

/// Split a CSV header such as `utilization.gpu [%]` into the bare name and
/// its unit. The unit is empty when the header has none.
pub fn split_header_unit(header: &str) -> (&str, &str) {
    let header = header.trim();
    if header.ends_with(']') {
        if let Some(open) = header.rfind('[') {
            let name = header[..open].trim_end();
            if !name.is_empty() {
                return (name, header[open + 1..header.len() - 1].trim());
            }
        }
    }
    (header, "")
}

/// Convert a size such as `15.6G`, `512.0M` or `4 KiB` into bytes, using
/// powers of 1024. A bare number is already in bytes.
pub fn translate_byte_unit(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let number = parse_number(number)?;

    let mut chars = suffix.chars();
    let exponent = match chars.next().map(|c| c.to_ascii_uppercase()) {
        None => return Some(number),
        Some('B') if chars.as_str().is_empty() => return Some(number),
        Some('K') => 1,
        Some('M') => 2,
        Some('G') => 3,
        Some('T') => 4,
        Some('P') => 5,
        Some(_) => return None,
    };
    let rest = chars.as_str();
    if !(rest.is_empty() || rest.eq_ignore_ascii_case("b") || rest.eq_ignore_ascii_case("ib")) {
        return None;
    }

    Some(number * 1024f64.powi(exponent))
}
