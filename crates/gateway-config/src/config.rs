//! Configuration schema.
//!
//! Every section has working defaults, so an empty file (or no file at all)
//! yields a runnable gateway.

use chrono::Weekday;
use gateway_core::{BudgetPeriod, PrincipalLimits, WindowKind};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use validator::Validate;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GatewayConfig {
    /// HTTP listener
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,

    /// Caller authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream inference provider
    #[serde(default)]
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Admission control
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Content guardrails
    #[serde(default)]
    #[validate(nested)]
    pub guardrails: GuardrailConfig,

    /// Cost budgets
    #[serde(default)]
    #[validate(nested)]
    pub budgets: BudgetConfig,

    /// Model price table
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,

    /// Logging and tracing
    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            upstream: UpstreamConfig::default(),
            rate_limits: RateLimitConfig::default(),
            guardrails: GuardrailConfig::default(),
            budgets: BudgetConfig::default(),
            models: default_models(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Look up a model entry by name
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }
}

// ============================================================================
// Server
// ============================================================================

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Hard cap on body bytes accepted by the HTTP layer.
    ///
    /// Must exceed `guardrails.max_request_size` so oversized bodies reach the
    /// guardrail and get a structured rejection.
    #[serde(default = "default_body_limit")]
    #[validate(range(min = 1024))]
    pub body_limit_bytes: usize,

    /// How long in-flight requests get to finish on shutdown
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_body_limit() -> usize {
    8 * 1024 * 1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Auth
// ============================================================================

/// Static credential check. Auth is disabled when no key is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Bearer token callers must present
    #[serde(default)]
    pub master_key: Option<SecretString>,

    /// Ignore `x-user-id` and the body `user` field; the principal is always
    /// the key id. Rate limits and budgets then apply per key.
    #[serde(default)]
    pub pin_principal_to_key: bool,
}

// ============================================================================
// Upstream
// ============================================================================

/// OpenAI-compatible upstream endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// Base URL; `/chat/completions` is appended
    #[serde(default = "default_base_url")]
    #[validate(length(min = 1))]
    pub base_url: String,

    /// Bearer token sent upstream
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Per-request timeout
    #[serde(with = "humantime_serde", default = "default_upstream_timeout")]
    pub timeout: Duration,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout: default_upstream_timeout(),
        }
    }
}

// ============================================================================
// Rate limits
// ============================================================================

/// Request ceilings per fixed window. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    /// Requests per minute
    #[serde(default)]
    pub requests_per_minute: Option<u64>,
    /// Requests per hour
    #[serde(default)]
    pub requests_per_hour: Option<u64>,
    /// Requests per day
    #[serde(default)]
    pub requests_per_day: Option<u64>,
}

impl WindowLimits {
    /// Ceiling for one window kind
    #[must_use]
    pub fn limit(&self, kind: WindowKind) -> Option<u64> {
        match kind {
            WindowKind::Minute => self.requests_per_minute,
            WindowKind::Hour => self.requests_per_hour,
            WindowKind::Day => self.requests_per_day,
        }
    }

    /// True when no window is limited
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        WindowKind::ALL.iter().all(|k| self.limit(*k).is_none())
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Turn admission control off entirely
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ceilings across all callers
    #[serde(default = "default_global_limits")]
    pub global: WindowLimits,

    /// Defaults for every principal
    #[serde(default = "default_principal_limits")]
    pub per_principal: PrincipalLimits,

    /// Overrides by principal id; unset fields fall back to `per_principal`
    #[serde(default)]
    pub principals: HashMap<String, PrincipalLimits>,
}

fn default_true() -> bool {
    true
}

fn default_global_limits() -> WindowLimits {
    WindowLimits {
        requests_per_minute: Some(600),
        requests_per_hour: Some(20_000),
        requests_per_day: Some(200_000),
    }
}

fn default_principal_limits() -> PrincipalLimits {
    PrincipalLimits {
        requests_per_minute: Some(60),
        requests_per_hour: Some(1_000),
        requests_per_day: Some(10_000),
        max_concurrent: Some(10),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: default_global_limits(),
            per_principal: default_principal_limits(),
            principals: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Effective limits for a principal id
    #[must_use]
    pub fn limits_for(&self, principal: &str) -> PrincipalLimits {
        let defaults = self.per_principal;
        match self.principals.get(principal) {
            Some(o) => PrincipalLimits {
                requests_per_minute: o.requests_per_minute.or(defaults.requests_per_minute),
                requests_per_hour: o.requests_per_hour.or(defaults.requests_per_hour),
                requests_per_day: o.requests_per_day.or(defaults.requests_per_day),
                max_concurrent: o.max_concurrent.or(defaults.max_concurrent),
            },
            None => defaults,
        }
    }
}

// ============================================================================
// Guardrails
// ============================================================================

/// A named regular expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPattern {
    /// Name reported in logs and block details
    pub name: String,
    /// Regex source
    pub pattern: String,
}

/// Content guardrail configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GuardrailConfig {
    /// Master switch; when off every check passes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Block prompts containing PII
    #[serde(default = "default_true")]
    pub block_pii: bool,

    /// Block toxic prompts
    #[serde(default = "default_true")]
    pub block_toxic: bool,

    /// Block hateful prompts
    #[serde(default = "default_true")]
    pub block_hate: bool,

    /// Block violent prompts
    #[serde(default = "default_true")]
    pub block_violence: bool,

    /// Block sexual prompts
    #[serde(default = "default_true")]
    pub block_sexual: bool,

    /// Estimated prompt token ceiling
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_input_tokens: u32,

    /// Estimated completion token ceiling
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_output_tokens: u32,

    /// Body size ceiling in bytes
    #[serde(default = "default_max_request_size")]
    #[validate(range(min = 1))]
    pub max_request_size: usize,

    /// Scan completions for credentials
    #[serde(default = "default_true")]
    pub scan_for_secrets: bool,

    /// Also scan prompts for credentials
    #[serde(default)]
    pub scan_input_for_secrets: bool,

    /// Accepted request MIME types (parameters ignored)
    #[serde(default = "default_content_types")]
    #[validate(length(min = 1))]
    pub allowed_content_types: Vec<String>,

    /// Extra keywords keyed by category (`toxic`, `hate`, `violence`, `sexual`)
    #[serde(default)]
    pub extra_keywords: BTreeMap<String, Vec<String>>,

    /// Extra PII patterns
    #[serde(default)]
    pub extra_pii_patterns: Vec<NamedPattern>,

    /// Extra secret patterns
    #[serde(default)]
    pub extra_secret_patterns: Vec<NamedPattern>,
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_max_request_size() -> usize {
    1_048_576
}

fn default_content_types() -> Vec<String> {
    vec!["application/json".to_string(), "text/plain".to_string()]
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_pii: true,
            block_toxic: true,
            block_hate: true,
            block_violence: true,
            block_sexual: true,
            max_input_tokens: default_max_tokens(),
            max_output_tokens: default_max_tokens(),
            max_request_size: default_max_request_size(),
            scan_for_secrets: true,
            scan_input_for_secrets: false,
            allowed_content_types: default_content_types(),
            extra_keywords: BTreeMap::new(),
            extra_pii_patterns: Vec::new(),
            extra_secret_patterns: Vec::new(),
        }
    }
}

// ============================================================================
// Budgets
// ============================================================================

/// Alert thresholds as fractions of a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Warning fraction
    #[serde(default = "default_warning")]
    pub warning: Decimal,
    /// Critical fraction
    #[serde(default = "default_critical")]
    pub critical: Decimal,
    /// Emergency fraction; requests are refused at or above it
    #[serde(default = "default_emergency")]
    pub emergency: Decimal,
}

fn default_warning() -> Decimal {
    Decimal::new(75, 2)
}

fn default_critical() -> Decimal {
    Decimal::new(90, 2)
}

fn default_emergency() -> Decimal {
    Decimal::new(95, 2)
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warning: default_warning(),
            critical: default_critical(),
            emergency: default_emergency(),
        }
    }
}

/// Spend ceilings in USD per period. `None` leaves the period unchecked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCeilings {
    /// Per UTC day
    #[serde(default)]
    pub daily: Option<Decimal>,
    /// Per week
    #[serde(default)]
    pub weekly: Option<Decimal>,
    /// Per calendar month
    #[serde(default)]
    pub monthly: Option<Decimal>,
}

impl PeriodCeilings {
    /// Ceiling for a period
    #[must_use]
    pub fn ceiling(&self, period: BudgetPeriod) -> Option<Decimal> {
        match period {
            BudgetPeriod::Day => self.daily,
            BudgetPeriod::Week => self.weekly,
            BudgetPeriod::Month => self.monthly,
        }
    }

    /// Field-wise fallback
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            daily: self.daily.or(fallback.daily),
            weekly: self.weekly.or(fallback.weekly),
            monthly: self.monthly.or(fallback.monthly),
        }
    }
}

/// Cost budget configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BudgetConfig {
    /// Alert thresholds
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Ceilings across all callers and models
    #[serde(default = "default_global_ceilings")]
    pub global: PeriodCeilings,

    /// Ceilings applied to every principal
    #[serde(default)]
    pub per_principal: PeriodCeilings,

    /// Overrides by principal id; unset fields fall back to `per_principal`
    #[serde(default)]
    pub principals: HashMap<String, PeriodCeilings>,

    /// Ceilings by model name
    #[serde(default)]
    pub models: HashMap<String, PeriodCeilings>,

    /// First day of the budget week
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,

    /// Capacity of the recent cost entry log
    #[serde(default = "default_recent_entries")]
    #[validate(range(min = 1))]
    pub recent_entries: usize,

    /// Capacity of the recent alert log
    #[serde(default = "default_recent_alerts")]
    #[validate(range(min = 1))]
    pub recent_alerts: usize,
}

fn default_global_ceilings() -> PeriodCeilings {
    PeriodCeilings {
        daily: Some(Decimal::new(100, 0)),
        weekly: Some(Decimal::new(500, 0)),
        monthly: Some(Decimal::new(2000, 0)),
    }
}

fn default_week_start() -> Weekday {
    Weekday::Mon
}

fn default_recent_entries() -> usize {
    1000
}

fn default_recent_alerts() -> usize {
    100
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            global: default_global_ceilings(),
            per_principal: PeriodCeilings::default(),
            principals: HashMap::new(),
            models: HashMap::new(),
            week_start: default_week_start(),
            recent_entries: default_recent_entries(),
            recent_alerts: default_recent_alerts(),
        }
    }
}

impl BudgetConfig {
    /// Effective ceilings for a principal id
    #[must_use]
    pub fn principal_ceilings(&self, principal: &str) -> PeriodCeilings {
        self.principals
            .get(principal)
            .map_or(self.per_principal, |o| o.or(self.per_principal))
    }
}

// ============================================================================
// Models
// ============================================================================

/// One entry of the price table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as sent by callers
    pub name: String,
    /// USD per 1000 prompt tokens
    pub input_cost_per_1k: Decimal,
    /// USD per 1000 completion tokens
    pub output_cost_per_1k: Decimal,
    /// Ceilings counted across all callers of this model
    #[serde(default)]
    pub rate_limits: WindowLimits,
}

impl ModelConfig {
    /// Model with prices and no extra rate limit
    pub fn new(name: impl Into<String>, input_cost_per_1k: Decimal, output_cost_per_1k: Decimal) -> Self {
        Self {
            name: name.into(),
            input_cost_per_1k,
            output_cost_per_1k,
            rate_limits: WindowLimits::default(),
        }
    }
}

fn default_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new(
            "vertex-gemini-pro",
            Decimal::new(125, 6),
            Decimal::new(375, 6),
        ),
        ModelConfig::new(
            "vertex-gemini-flash",
            Decimal::new(75, 6),
            Decimal::new(3, 4),
        ),
    ]
}

// ============================================================================
// Telemetry
// ============================================================================

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging and tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TelemetryConfig {
    /// Default filter directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    #[validate(length(min = 1))]
    pub log_level: String,

    /// Output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Install the OpenTelemetry span layer
    #[serde(default)]
    pub otel_enabled: bool,

    /// Service name attached to spans
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Trace sampling ratio
    #[serde(default = "default_sampling_ratio")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub sampling_ratio: f64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "llm-policy-gateway".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            otel_enabled: false,
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.budgets.global.daily, Some(dec!(100)));
        assert_eq!(config.budgets.thresholds.warning, dec!(0.75));
        assert_eq!(config.guardrails.max_request_size, 1_048_576);
        assert!(config.guardrails.block_toxic);
        assert!(!config.guardrails.scan_input_for_secrets);
    }

    #[test]
    fn test_empty_document_matches_default() {
        let parsed: GatewayConfig = serde_yaml::from_str("{}").expect("parse");
        let defaults = GatewayConfig::default();
        assert_eq!(parsed.models, defaults.models);
        assert_eq!(parsed.models.len(), 2);
        assert_eq!(parsed.rate_limits.per_principal.max_concurrent, Some(10));
        assert_eq!(parsed.budgets.week_start, Weekday::Mon);
    }

    #[test]
    fn test_default_prices() {
        let config: GatewayConfig = serde_yaml::from_str("{}").expect("parse");
        let pro = config.model("vertex-gemini-pro").expect("model");
        assert_eq!(pro.input_cost_per_1k, dec!(0.000125));
        assert_eq!(pro.output_cost_per_1k, dec!(0.000375));
        assert!(config.model("unknown").is_none());
    }

    #[test]
    fn test_principal_limits_fall_back_per_field() {
        let mut config = RateLimitConfig::default();
        config.principals.insert(
            "alice".to_string(),
            PrincipalLimits {
                requests_per_minute: Some(2),
                ..PrincipalLimits::default()
            },
        );

        let alice = config.limits_for("alice");
        assert_eq!(alice.requests_per_minute, Some(2));
        assert_eq!(alice.requests_per_hour, Some(1_000));
        assert_eq!(alice.max_concurrent, Some(10));

        let bob = config.limits_for("bob");
        assert_eq!(bob.requests_per_minute, Some(60));
    }

    #[test]
    fn test_principal_ceilings_fall_back_per_field() {
        let mut config = BudgetConfig::default();
        config.per_principal.daily = Some(dec!(10));
        config.principals.insert(
            "alice".to_string(),
            PeriodCeilings {
                monthly: Some(dec!(50)),
                ..PeriodCeilings::default()
            },
        );
        let alice = config.principal_ceilings("alice");
        assert_eq!(alice.daily, Some(dec!(10)));
        assert_eq!(alice.monthly, Some(dec!(50)));
        assert_eq!(alice.weekly, None);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
