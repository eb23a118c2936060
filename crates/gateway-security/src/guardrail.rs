//! Content guardrail.
//!
//! Input checks run in a fixed order and the first failure wins:
//! 1. content type allow-list
//! 2. request size
//! 3. prompt token estimate
//! 4. classifiers (PII, toxic, hate, violence, sexual), each togglable
//! 5. optional credential scan
//!
//! Output checks are the completion token estimate, then the credential scan.

use crate::classifier::{
    BlockCategory, Classification, Classifier, KeywordClassifier, PatternClassifier,
};
use crate::error::{Result, SecurityError};
use crate::patterns::{
    compile_table, keyword_regex, NamedRegex, HATE_KEYWORDS, PII_PATTERNS, SEXUAL_KEYWORDS,
    TOXIC_KEYWORDS, VIOLENCE_KEYWORDS,
};
use crate::secret_scan::SecretScanner;
use gateway_config::GuardrailConfig;
use gateway_core::{estimate_tokens, GatewayError, GuardrailStage};
use mime::Mime;
use serde::Serialize;
use tracing::{debug, warn};

/// Why content was blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReason {
    /// Stable category
    pub category: BlockCategory,
    /// Human-readable detail; never contains matched secrets or PII
    pub detail: String,
}

impl BlockReason {
    /// Create a reason
    pub fn new(category: BlockCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }
}

/// Outcome of a guardrail check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Content may proceed
    Pass,
    /// Content must not proceed
    Blocked(BlockReason),
}

impl Verdict {
    /// Whether the content passed
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Category if blocked
    #[must_use]
    pub fn category(&self) -> Option<BlockCategory> {
        match self {
            Self::Pass => None,
            Self::Blocked(reason) => Some(reason.category),
        }
    }

    /// Convert into the gateway error taxonomy
    pub fn into_result(self, stage: GuardrailStage) -> std::result::Result<(), GatewayError> {
        match self {
            Self::Pass => Ok(()),
            Self::Blocked(reason) => Err(GatewayError::guardrail(
                stage,
                reason.category.as_str(),
                reason.detail,
            )),
        }
    }
}

/// Stateless input/output content checks
#[derive(Debug)]
pub struct ContentGuardrail {
    enabled: bool,
    allowed_content_types: Vec<Mime>,
    max_request_size: usize,
    max_input_tokens: u32,
    max_output_tokens: u32,
    classifiers: Vec<Box<dyn Classifier>>,
    output_scanner: Option<SecretScanner>,
    input_scanner: Option<SecretScanner>,
}

impl ContentGuardrail {
    /// Build the guardrail described by `config`
    pub fn from_config(config: &GuardrailConfig) -> Result<Self> {
        let allowed_content_types = config
            .allowed_content_types
            .iter()
            .map(|ct| {
                ct.parse::<Mime>()
                    .map_err(|_| SecurityError::InvalidContentType(ct.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        for category in config.extra_keywords.keys() {
            if BlockCategory::keyword_category(category).is_none() {
                return Err(SecurityError::UnknownCategory(category.clone()));
            }
        }

        let mut classifiers: Vec<Box<dyn Classifier>> = Vec::new();

        if config.block_pii {
            let mut patterns = compile_table(PII_PATTERNS)?;
            for p in &config.extra_pii_patterns {
                patterns.push(NamedRegex::compile(&p.name, &p.pattern)?);
            }
            classifiers.push(Box::new(PatternClassifier::new(BlockCategory::Pii, patterns)));
        }

        let keyword_checks = [
            (config.block_toxic, "toxic", TOXIC_KEYWORDS),
            (config.block_hate, "hate", HATE_KEYWORDS),
            (config.block_violence, "violence", VIOLENCE_KEYWORDS),
            (config.block_sexual, "sexual", SEXUAL_KEYWORDS),
        ];
        for (enabled, name, defaults) in keyword_checks {
            if !enabled {
                continue;
            }
            let mut keywords: Vec<String> = defaults.iter().map(ToString::to_string).collect();
            if let Some(extra) = config.extra_keywords.get(name) {
                keywords.extend(extra.iter().cloned());
            }
            if let (Some(category), Some(regex)) = (
                BlockCategory::keyword_category(name),
                keyword_regex(name, &keywords)?,
            ) {
                classifiers.push(Box::new(KeywordClassifier::new(category, regex)));
            }
        }

        let output_scanner = if config.scan_for_secrets {
            Some(SecretScanner::new(&config.extra_secret_patterns)?)
        } else {
            None
        };
        let input_scanner = if config.scan_input_for_secrets {
            Some(SecretScanner::new(&config.extra_secret_patterns)?)
        } else {
            None
        };

        debug!(
            enabled = config.enabled,
            classifiers = classifiers.len(),
            scan_output = output_scanner.is_some(),
            scan_input = input_scanner.is_some(),
            "Content guardrail configured"
        );

        Ok(Self {
            enabled: config.enabled,
            allowed_content_types,
            max_request_size: config.max_request_size,
            max_input_tokens: config.max_input_tokens,
            max_output_tokens: config.max_output_tokens,
            classifiers,
            output_scanner,
            input_scanner,
        })
    }

    /// Append a classifier; it runs after the configured ones
    #[must_use]
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifiers.push(classifier);
        self
    }

    /// Whether checks run at all
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Categories of the installed classifiers, in evaluation order
    #[must_use]
    pub fn classifier_categories(&self) -> Vec<BlockCategory> {
        self.classifiers.iter().map(|c| c.category()).collect()
    }

    /// Check an inbound prompt
    pub fn check_input(&self, text: &str, content_type: Option<&str>, size: usize) -> Verdict {
        if !self.enabled {
            return Verdict::Pass;
        }

        let verdict = self.evaluate_input(text, content_type, size);
        if let Verdict::Blocked(reason) = &verdict {
            warn!(
                stage = "input",
                category = %reason.category,
                detail = %reason.detail,
                "Guardrail blocked request"
            );
        }
        verdict
    }

    /// Check a generated completion
    pub fn check_output(&self, text: &str) -> Verdict {
        if !self.enabled {
            return Verdict::Pass;
        }

        let verdict = self.evaluate_output(text);
        if let Verdict::Blocked(reason) = &verdict {
            warn!(
                stage = "output",
                category = %reason.category,
                detail = %reason.detail,
                "Guardrail blocked response"
            );
        }
        verdict
    }

    fn evaluate_input(&self, text: &str, content_type: Option<&str>, size: usize) -> Verdict {
        if let Some(reason) = self.check_content_type(content_type) {
            return Verdict::Blocked(reason);
        }

        if size > self.max_request_size {
            return Verdict::Blocked(BlockReason::new(
                BlockCategory::RequestSize,
                format!("{size} bytes exceeds limit of {}", self.max_request_size),
            ));
        }

        let tokens = estimate_tokens(text);
        if tokens > self.max_input_tokens {
            return Verdict::Blocked(BlockReason::new(
                BlockCategory::InputTokens,
                format!("~{tokens} tokens exceeds limit of {}", self.max_input_tokens),
            ));
        }

        for classifier in &self.classifiers {
            if let Classification::Flagged { detail } = classifier.classify(text) {
                return Verdict::Blocked(BlockReason::new(classifier.category(), detail));
            }
        }

        if let Some(name) = self.input_scanner.as_ref().and_then(|s| s.scan(text)) {
            return Verdict::Blocked(BlockReason::new(BlockCategory::Secret, name));
        }

        Verdict::Pass
    }

    fn evaluate_output(&self, text: &str) -> Verdict {
        let tokens = estimate_tokens(text);
        if tokens > self.max_output_tokens {
            return Verdict::Blocked(BlockReason::new(
                BlockCategory::OutputTokens,
                format!("~{tokens} tokens exceeds limit of {}", self.max_output_tokens),
            ));
        }

        if let Some(name) = self.output_scanner.as_ref().and_then(|s| s.scan(text)) {
            return Verdict::Blocked(BlockReason::new(BlockCategory::Secret, name));
        }

        Verdict::Pass
    }

    fn check_content_type(&self, content_type: Option<&str>) -> Option<BlockReason> {
        let Some(raw) = content_type.map(str::trim).filter(|c| !c.is_empty()) else {
            return Some(BlockReason::new(BlockCategory::ContentType, "missing content type"));
        };

        let Ok(parsed) = raw.parse::<Mime>() else {
            return Some(BlockReason::new(
                BlockCategory::ContentType,
                format!("unparseable content type '{raw}'"),
            ));
        };

        let essence = parsed.essence_str();
        if self
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.essence_str().eq_ignore_ascii_case(essence))
        {
            None
        } else {
            Some(BlockReason::new(
                BlockCategory::ContentType,
                format!("'{essence}' is not allowed"),
            ))
        }
    }
}
