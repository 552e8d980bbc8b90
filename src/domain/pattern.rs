//! `%`-wildcard name patterns

use regex::Regex;

use crate::domain::error::{DomainError, DomainResult};

/// Wildcard character: matches any (possibly empty) substring.
pub const WILDCARD: char = '%';

/// Name pattern matched against qualified node names.
#[derive(Debug, Clone)]
pub struct NamePattern {
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> DomainResult<Self> {
        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| DomainError::Parse(format!("pattern '{pattern}': {e}")))?;
        Ok(Self { regex })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}
