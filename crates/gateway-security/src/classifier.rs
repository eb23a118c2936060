//! Pluggable content classifiers.
//!
//! The guardrail only knows the [`Classifier`] capability; which concrete
//! checks run, and in what order, is decided when it is built.

use crate::patterns::NamedRegex;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Stable reasons a guardrail can block for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCategory {
    /// Content type not on the allow-list
    ContentType,
    /// Body larger than the ceiling
    RequestSize,
    /// Prompt token estimate above the ceiling
    InputTokens,
    /// Personally identifiable information
    Pii,
    /// Toxic language
    Toxic,
    /// Hateful language
    Hate,
    /// Violent language
    Violence,
    /// Sexual content
    Sexual,
    /// Credential-shaped string
    Secret,
    /// Completion token estimate above the ceiling
    OutputTokens,
}

impl BlockCategory {
    /// Reason code surfaced to callers and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentType => "content_type",
            Self::RequestSize => "request_size",
            Self::InputTokens => "input_tokens",
            Self::Pii => "pii",
            Self::Toxic => "toxic",
            Self::Hate => "hate",
            Self::Violence => "violence",
            Self::Sexual => "sexual",
            Self::Secret => "secret",
            Self::OutputTokens => "output_tokens",
        }
    }

    /// Keyword category by config name
    #[must_use]
    pub fn keyword_category(name: &str) -> Option<Self> {
        match name {
            "toxic" => Some(Self::Toxic),
            "hate" => Some(Self::Hate),
            "violence" => Some(Self::Violence),
            "sexual" => Some(Self::Sexual),
            _ => None,
        }
    }
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Nothing found
    Clean,
    /// Content matched; `detail` never contains the matched text for
    /// sensitive categories
    Flagged {
        /// Short description, e.g. the pattern name
        detail: String,
    },
}

impl Classification {
    /// Whether the content was flagged
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        matches!(self, Self::Flagged { .. })
    }
}

/// A content check that can be plugged into the guardrail
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Category reported when this classifier flags content
    fn category(&self) -> BlockCategory;

    /// Inspect `text`
    fn classify(&self, text: &str) -> Classification;
}

/// Flags text matching any of a set of named regexes.
///
/// The detail is the first matching pattern's name, so PII and secrets are
/// never echoed back.
#[derive(Debug)]
pub struct PatternClassifier {
    category: BlockCategory,
    patterns: Vec<NamedRegex>,
}

impl PatternClassifier {
    /// Create a classifier over compiled patterns
    #[must_use]
    pub fn new(category: BlockCategory, patterns: Vec<NamedRegex>) -> Self {
        Self { category, patterns }
    }

    /// Number of patterns
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when there are no patterns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Classifier for PatternClassifier {
    fn category(&self) -> BlockCategory {
        self.category
    }

    fn classify(&self, text: &str) -> Classification {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(text))
            .map_or(Classification::Clean, |p| Classification::Flagged {
                detail: p.name.clone(),
            })
    }
}

/// Flags text containing any listed keyword (whole words, any case)
#[derive(Debug)]
pub struct KeywordClassifier {
    category: BlockCategory,
    regex: Regex,
}

impl KeywordClassifier {
    /// Create from a compiled alternation
    #[must_use]
    pub fn new(category: BlockCategory, regex: Regex) -> Self {
        Self { category, regex }
    }
}

impl Classifier for KeywordClassifier {
    fn category(&self) -> BlockCategory {
        self.category
    }

    fn classify(&self, text: &str) -> Classification {
        match self.regex.find(text) {
            Some(m) => Classification::Flagged {
                detail: format!("keyword '{}'", m.as_str().to_lowercase()),
            },
            None => Classification::Clean,
        }
    }
}
