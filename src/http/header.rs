//! HTTP header lines.
//!
//! # Responsibilities
//! - Parse a single raw header line into a name/value pair
//! - Serialize a header back to wire form
//! - Look headers up by name in declaration order
//!
//! # Design Decisions
//! - Names are kept exactly as received (no case folding)
//! - No multi-line continuation support
//! - Duplicates are allowed; lookups return the first match

/// One `name: value` header pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a raw header line.
    ///
    /// Splits on the first colon and drops exactly one leading space from the
    /// value. A line without a colon yields the whole line as the name and an
    /// empty value, so callers should check [`is_header_line`] first.
    pub fn parse_line(line: &str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match line.split_once(':') {
            Some((name, value)) => {
                let value = value.strip_prefix(' ').unwrap_or(value);
                Self::new(name, value)
            }
            None => Self::new(line, ""),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Render as `name: value`, optionally terminated by CRLF.
    pub fn to_wire(&self, append_crlf: bool) -> String {
        let mut out = String::with_capacity(self.name.len() + self.value.len() + 4);
        out.push_str(&self.name);
        out.push_str(": ");
        out.push_str(&self.value);
        if append_crlf {
            out.push_str("\r\n");
        }
        out
    }
}

/// True iff the line contains a colon.
pub fn is_header_line(line: &str) -> bool {
    line.contains(':')
}

/// First header whose name matches exactly.
pub fn find<'a>(headers: &'a [Header], name: &str) -> Option<&'a Header> {
    headers.iter().find(|h| h.name == name)
}

/// First header whose name matches ignoring ASCII case.
pub fn find_ignore_case<'a>(headers: &'a [Header], name: &str) -> Option<&'a Header> {
    headers.iter().find(|h| h.name.eq_ignore_ascii_case(name))
}
