//! Credential scanning.

use crate::error::Result;
use crate::patterns::{compile_table, NamedRegex, SECRET_PATTERNS};
use gateway_config::NamedPattern;

/// Finds credential-shaped substrings.
///
/// Only the name of the matching pattern is ever reported.
#[derive(Debug, Clone)]
pub struct SecretScanner {
    patterns: Vec<NamedRegex>,
}

impl SecretScanner {
    /// Scanner with the built-in patterns plus `extra`
    pub fn new(extra: &[NamedPattern]) -> Result<Self> {
        let mut patterns = compile_table(SECRET_PATTERNS)?;
        for p in extra {
            patterns.push(NamedRegex::compile(&p.name, &p.pattern)?);
        }
        Ok(Self { patterns })
    }

    /// Name of the first pattern found in `text`
    #[must_use]
    pub fn scan(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(text))
            .map(|p| p.name.as_str())
    }

    /// All pattern names found in `text`
    #[must_use]
    pub fn scan_all(&self, text: &str) -> Vec<&str> {
        self.patterns
            .iter()
            .filter(|p| p.regex.is_match(text))
            .map(|p| p.name.as_str())
            .collect()
    }
}
