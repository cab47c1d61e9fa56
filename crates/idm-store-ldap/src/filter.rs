//! LDAP search filters.
//!
//! Filters are built as a typed tree and rendered to RFC 4515 text only at
//! the wire boundary, so values are always escaped. The same tree is
//! evaluated against entries by the in-memory directory and when entries
//! referenced directly by DN must be checked against a type's filter.

use std::fmt;

use crate::dn;
use crate::error::{LdapError, LdapResult};
use crate::search::LdapEntry;

/// A parsed LDAP search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All sub-filters match.
    And(Vec<Filter>),
    /// Any sub-filter matches.
    Or(Vec<Filter>),
    /// The sub-filter does not match.
    Not(Box<Filter>),
    /// `(attr=value)`
    Equal(String, String),
    /// `(attr=*)`
    Present(String),
    /// `(attr=initial*any*final)`
    Substring {
        /// Attribute name.
        attribute: String,
        /// Leading fixed part.
        initial: Option<String>,
        /// Middle parts, in order.
        any: Vec<String>,
        /// Trailing fixed part.
        last: Option<String>,
    },
    /// `(attr>=value)`
    GreaterOrEqual(String, String),
    /// `(attr<=value)`
    LessOrEqual(String, String),
    /// `(attr~=value)`
    Approx(String, String),
}

impl Filter {
    /// `(attr=value)`
    #[must_use]
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equal(attribute.into(), value.into())
    }

    /// `(attr=*)`
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present(attribute.into())
    }

    /// Conjunction, flattening a single operand.
    #[must_use]
    pub fn and(mut filters: Vec<Self>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Self::And(filters)
        }
    }

    /// Disjunction, flattening a single operand.
    #[must_use]
    pub fn or(mut filters: Vec<Self>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Self::Or(filters)
        }
    }

    /// Builds an equality, presence or substring filter from a `*` pattern.
    #[must_use]
    pub fn wildcard(attribute: &str, pattern: &str) -> Self {
        if !pattern.contains('*') {
            return Self::eq(attribute, pattern);
        }
        if pattern.chars().all(|c| c == '*') {
            return Self::present(attribute);
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self::Substring {
            attribute: attribute.to_string(),
            initial: non_empty(parts[0]),
            any: parts[1..parts.len() - 1]
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| (*p).to_string())
                .collect(),
            last: non_empty(parts[parts.len() - 1]),
        }
    }

    /// Parses RFC 4515 filter text.
    ///
    /// ## Errors
    ///
    /// Returns `LdapError::Filter` on malformed input.
    pub fn parse(text: &str) -> LdapResult<Self> {
        let text = text.trim();
        let mut parser = Parser {
            input: text.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.input.len() {
            return Err(LdapError::filter(format!("trailing input in '{text}'")));
        }
        Ok(filter)
    }

    /// Evaluates the filter against an entry.
    ///
    /// Attribute names and values compare case-insensitively; values that
    /// look like DNs compare in normalized form.
    #[must_use]
    pub fn matches(&self, entry: &LdapEntry) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(filter) => !filter.matches(entry),
            Self::Present(attribute) => {
                attribute.eq_ignore_ascii_case("objectClass") || !entry.values(attribute).is_empty()
            }
            Self::Equal(attribute, value) | Self::Approx(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| values_equal(v, value)),
            Self::GreaterOrEqual(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| v.to_lowercase() >= value.to_lowercase()),
            Self::LessOrEqual(attribute, value) => entry
                .values(attribute)
                .iter()
                .any(|v| v.to_lowercase() <= value.to_lowercase()),
            Self::Substring {
                attribute,
                initial,
                any,
                last,
            } => entry
                .values(attribute)
                .iter()
                .any(|v| substring_match(v, initial.as_deref(), any, last.as_deref())),
        }
    }
}

fn values_equal(stored: &str, wanted: &str) -> bool {
    if stored.eq_ignore_ascii_case(wanted) {
        return true;
    }
    stored.contains('=') && wanted.contains('=') && dn::same(stored, wanted)
}

fn substring_match(value: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();

    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(r) => rest = r,
            None => return false,
        }
    }
    for part in any {
        let part = part.to_lowercase();
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(last.to_lowercase().as_str()),
        None => true,
    }
}

/// Escapes a filter value (RFC 4515 section 3).
#[must_use]
pub fn escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

/// Escapes a `*` pattern, keeping the wildcards.
#[must_use]
pub fn escape_pattern(pattern: &str) -> String {
    pattern.split('*').map(escape).collect::<Vec<_>>().join("*")
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Equal(a, v) => write!(f, "({a}={})", escape(v)),
            Self::Present(a) => write!(f, "({a}=*)"),
            Self::GreaterOrEqual(a, v) => write!(f, "({a}>={})", escape(v)),
            Self::LessOrEqual(a, v) => write!(f, "({a}<={})", escape(v)),
            Self::Approx(a, v) => write!(f, "({a}~={})", escape(v)),
            Self::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape(initial))?;
                }
                f.write_str("*")?;
                for part in any {
                    write!(f, "{}*", escape(part))?;
                }
                if let Some(last) = last {
                    f.write_str(&escape(last))?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &str) -> LdapError {
        LdapError::filter(format!(
            "{msg} at position {} in '{}'",
            self.pos,
            String::from_utf8_lossy(self.input)
        ))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> LdapResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn filter(&mut self) -> LdapResult<Filter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> LdapResult<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn item(&mut self) -> LdapResult<Filter> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'>' | b'<' | b'~' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let attribute = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("attribute is not UTF-8"))?
            .trim()
            .to_string();
        if attribute.is_empty() {
            return Err(self.error("missing attribute"));
        }

        let op = match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                b'='
            }
            Some(op @ (b'>' | b'<' | b'~')) => {
                self.pos += 1;
                self.expect(b'=')?;
                op
            }
            _ => return Err(self.error("expected operator")),
        };

        let parts = self.value_parts()?;
        match op {
            b'>' => Ok(Filter::GreaterOrEqual(attribute, self.single(parts)?)),
            b'<' => Ok(Filter::LessOrEqual(attribute, self.single(parts)?)),
            b'~' => Ok(Filter::Approx(attribute, self.single(parts)?)),
            _ if parts.len() == 1 => Ok(Filter::Equal(attribute, parts.into_iter().collect())),
            _ if parts.len() == 2 && parts.iter().all(String::is_empty) => Ok(Filter::Present(attribute)),
            _ => {
                let last_index = parts.len() - 1;
                let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
                Ok(Filter::Substring {
                    initial: non_empty(&parts[0]),
                    any: parts[1..last_index].iter().filter(|p| !p.is_empty()).cloned().collect(),
                    last: non_empty(&parts[last_index]),
                    attribute,
                })
            }
        }
    }

    fn single(&self, parts: Vec<String>) -> LdapResult<String> {
        if parts.len() == 1 {
            Ok(parts.into_iter().collect())
        } else {
            Err(self.error("wildcard not allowed here"))
        }
    }

    /// Reads an assertion value split at unescaped `*`.
    fn value_parts(&mut self) -> LdapResult<Vec<String>> {
        let mut parts = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                Some(b')') => break,
                Some(b'*') => {
                    self.pos += 1;
                    parts.push(self.utf8(std::mem::take(&mut current))?);
                }
                Some(b'\\') => {
                    let hex = self
                        .input
                        .get(self.pos + 1..self.pos + 3)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| self.error("bad escape"))?;
                    current.push(hex);
                    self.pos += 3;
                }
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b) => {
                    current.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated value")),
            }
        }
        parts.push(self.utf8(current)?);
        Ok(parts)
    }

    fn utf8(&self, bytes: Vec<u8>) -> LdapResult<String> {
        String::from_utf8(bytes).map_err(|_| self.error("value is not UTF-8"))
    }
}
