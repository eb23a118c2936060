//! Prometheus metrics for the gateway.
//!
//! Every emitter owns its registry, so tests and multiple gateways in one
//! process never collide on metric names.

use crate::budget::BudgetAlert;
use gateway_core::{GatewayError, GuardrailStage};
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::debug;

/// Latency buckets in seconds
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0,
];

/// Metrics setup error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A metric could not be created or registered
    #[error("Failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
    /// Text exposition failed
    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// How a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
    /// Completion returned to the caller
    Success,
    /// Refused by the rate limiter
    RateLimited,
    /// Refused by an input or output guardrail
    GuardrailBlocked,
    /// Refused by the budget enforcer
    BudgetExceeded,
    /// Upstream returned an error
    UpstreamError,
    /// Upstream did not answer in time
    UpstreamTimeout,
    /// Malformed request or unknown model
    InvalidRequest,
    /// Caller went away before the request finished
    Cancelled,
    /// Anything else
    Error,
}

impl RequestOutcome {
    /// Label value
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::GuardrailBlocked => "guardrail_blocked",
            Self::BudgetExceeded => "budget_exceeded",
            Self::UpstreamError => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::InvalidRequest => "invalid_request",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    /// Outcome for a pipeline error
    #[must_use]
    pub fn from_error(err: &GatewayError) -> Self {
        match err {
            GatewayError::RateLimitExceeded { .. } => Self::RateLimited,
            GatewayError::GuardrailViolation { .. } => Self::GuardrailBlocked,
            GatewayError::BudgetExceeded { .. } => Self::BudgetExceeded,
            GatewayError::Upstream { .. } => Self::UpstreamError,
            GatewayError::UpstreamTimeout { .. } => Self::UpstreamTimeout,
            GatewayError::Validation { .. } | GatewayError::Configuration(_) => {
                Self::InvalidRequest
            }
            GatewayError::Authentication(_) | GatewayError::Internal(_) => Self::Error,
        }
    }
}

/// A guardrail block attached to a usage event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailBlock {
    /// Input or output
    pub stage: GuardrailStage,
    /// Stable reason code
    pub category: String,
}

/// Per-request record handed to [`MetricsEmitter::observe`]
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    /// Request ID
    pub request_id: String,
    /// Caller
    pub principal: String,
    /// Model label
    pub model: String,
    /// Prompt tokens
    pub input_tokens: u32,
    /// Completion tokens
    pub output_tokens: u32,
    /// Charged cost
    pub cost: Decimal,
    /// Wall time from admission to exit
    pub latency: Duration,
    /// How the request ended
    pub outcome: RequestOutcome,
    /// Guardrail verdict, when one blocked
    pub guardrail_block: Option<GuardrailBlock>,
    /// Rate dimension that refused the request
    pub rate_limited_by: Option<String>,
}

impl UsageEvent {
    /// Event with no tokens, cost or verdicts yet
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        principal: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            principal: principal.into(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost: Decimal::ZERO,
            latency: Duration::ZERO,
            outcome: RequestOutcome::Cancelled,
            guardrail_block: None,
            rate_limited_by: None,
        }
    }

    /// Set the outcome
    #[must_use]
    pub fn with_outcome(mut self, outcome: RequestOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set token counts
    #[must_use]
    pub fn with_tokens(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Set the charged cost
    #[must_use]
    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.cost = cost;
        self
    }

    /// Set latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Gateway metrics collector
#[derive(Clone)]
pub struct MetricsEmitter {
    registry: Registry,
    requests_total: IntCounterVec,
    cost_usd_total: CounterVec,
    tokens_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    guardrail_blocks_total: IntCounterVec,
    budget_alerts_total: IntCounterVec,
    in_flight_requests: IntGauge,
}

impl std::fmt::Debug for MetricsEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsEmitter")
            .field("in_flight", &self.in_flight_requests.get())
            .finish_non_exhaustive()
    }
}

impl MetricsEmitter {
    /// Create metrics registered in a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Requests handled, by model and outcome"),
            &["model", "outcome"],
        )?;
        let cost_usd_total = CounterVec::new(
            Opts::new("gateway_cost_usd_total", "Charged cost in USD, by model"),
            &["model"],
        )?;
        let tokens_total = IntCounterVec::new(
            Opts::new("gateway_tokens_total", "Tokens processed, by model and direction"),
            &["model", "direction"],
        )?;
        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_request_duration_seconds",
                "Request latency in seconds, by model and outcome",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["model", "outcome"],
        )?;
        let guardrail_blocks_total = IntCounterVec::new(
            Opts::new("gateway_guardrail_blocks_total", "Guardrail blocks, by stage and category"),
            &["stage", "category"],
        )?;
        let budget_alerts_total = IntCounterVec::new(
            Opts::new("gateway_budget_alerts_total", "Budget threshold crossings"),
            &["scope", "period", "status"],
        )?;
        let in_flight_requests = IntGauge::new(
            "gateway_in_flight_requests",
            "Requests admitted and not yet finished",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cost_usd_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(request_duration_seconds.clone()))?;
        registry.register(Box::new(guardrail_blocks_total.clone()))?;
        registry.register(Box::new(budget_alerts_total.clone()))?;
        registry.register(Box::new(in_flight_requests.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cost_usd_total,
            tokens_total,
            request_duration_seconds,
            guardrail_blocks_total,
            budget_alerts_total,
            in_flight_requests,
        })
    }

    /// Underlying registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one finished request. Never fails.
    pub fn observe(&self, event: &UsageEvent) {
        let outcome = event.outcome.as_str();
        let model = event.model.as_str();

        self.requests_total
            .with_label_values(&[model, outcome])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[model, outcome])
            .observe(event.latency.as_secs_f64());

        if event.input_tokens > 0 {
            self.tokens_total
                .with_label_values(&[model, "input"])
                .inc_by(u64::from(event.input_tokens));
        }
        if event.output_tokens > 0 {
            self.tokens_total
                .with_label_values(&[model, "output"])
                .inc_by(u64::from(event.output_tokens));
        }
        if event.cost > Decimal::ZERO {
            let cost = event.cost.to_f64().unwrap_or_default();
            self.cost_usd_total.with_label_values(&[model]).inc_by(cost);
        }
        if let Some(block) = &event.guardrail_block {
            self.guardrail_blocks_total
                .with_label_values(&[block.stage.to_string().as_str(), block.category.as_str()])
                .inc();
        }

        debug!(
            request_id = %event.request_id,
            principal = %event.principal,
            model = %model,
            outcome = outcome,
            latency_ms = event.latency.as_millis() as u64,
            "Observed request"
        );
    }

    /// Count a budget threshold crossing
    pub fn record_budget_alert(&self, alert: &BudgetAlert) {
        self.budget_alerts_total
            .with_label_values(&[alert.scope.kind(), alert.period.to_string().as_str(), alert.to.as_str()])
            .inc();
    }

    /// A request was admitted
    pub fn request_started(&self) {
        self.in_flight_requests.inc();
    }

    /// An admitted request finished
    pub fn request_finished(&self) {
        self.in_flight_requests.dec();
    }

    /// Current in-flight gauge value
    #[must_use]
    pub fn in_flight(&self) -> i64 {
        self.in_flight_requests.get()
    }

    /// Render the text exposition format
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::BudgetStatus;
    use chrono::Utc;
    use gateway_core::{BudgetPeriod, Scope};
    use rust_decimal_macros::dec;

    #[test]
    fn test_observe_success() {
        let metrics = MetricsEmitter::new().expect("metrics");
        let event = UsageEvent::new("req-1", "alice", "gemini-pro")
            .with_outcome(RequestOutcome::Success)
            .with_tokens(1000, 500)
            .with_cost(dec!(0.0003125))
            .with_latency(Duration::from_millis(120));
        metrics.observe(&event);

        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["gemini-pro", "success"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .tokens_total
                .with_label_values(&["gemini-pro", "output"])
                .get(),
            500
        );
        let cost = metrics
            .cost_usd_total
            .with_label_values(&["gemini-pro"])
            .get();
        assert!((cost - 0.000_312_5).abs() < 1e-12);
        assert_eq!(
            metrics
                .request_duration_seconds
                .with_label_values(&["gemini-pro", "success"])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn test_observe_guardrail_block() {
        let metrics = MetricsEmitter::new().expect("metrics");
        let mut event = UsageEvent::new("req-2", "alice", "gemini-pro")
            .with_outcome(RequestOutcome::GuardrailBlocked);
        event.guardrail_block = Some(GuardrailBlock {
            stage: GuardrailStage::Input,
            category: "toxic".to_string(),
        });
        metrics.observe(&event);

        assert_eq!(
            metrics
                .guardrail_blocks_total
                .with_label_values(&["input", "toxic"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .tokens_total
                .with_label_values(&["gemini-pro", "input"])
                .get(),
            0
        );
    }

    #[test]
    fn test_outcome_from_error() {
        assert_eq!(
            RequestOutcome::from_error(&GatewayError::rate_limited(3, "global per minute")),
            RequestOutcome::RateLimited
        );
        assert_eq!(
            RequestOutcome::from_error(&GatewayError::configuration("no pricing")),
            RequestOutcome::InvalidRequest
        );
        assert_eq!(
            RequestOutcome::from_error(&GatewayError::UpstreamTimeout {
                timeout: Duration::from_secs(5)
            }),
            RequestOutcome::UpstreamTimeout
        );
    }

    #[test]
    fn test_in_flight_gauge() {
        let metrics = MetricsEmitter::new().expect("metrics");
        metrics.request_started();
        metrics.request_started();
        metrics.request_finished();
        assert_eq!(metrics.in_flight(), 1);
    }

    #[test]
    fn test_budget_alert_counter() {
        let metrics = MetricsEmitter::new().expect("metrics");
        metrics.record_budget_alert(&BudgetAlert {
            scope: Scope::Principal("alice".into()),
            period: BudgetPeriod::Month,
            from: BudgetStatus::Ok,
            to: BudgetStatus::Warning,
            spend: dec!(38),
            ceiling: dec!(50),
            at: Utc::now(),
        });
        assert_eq!(
            metrics
                .budget_alerts_total
                .with_label_values(&["principal", "month", "warning"])
                .get(),
            1
        );
    }

    #[test]
    fn test_gather_text_format() {
        let metrics = MetricsEmitter::new().expect("metrics");
        metrics.observe(
            &UsageEvent::new("req-3", "bob", "gemini-flash").with_outcome(RequestOutcome::Success),
        );
        let text = metrics.gather().expect("gather");
        assert!(text.contains("gateway_requests_total"));
        assert!(text.contains("outcome=\"success\""));
        assert!(text.contains("gateway_in_flight_requests"));
    }

    #[test]
    fn test_emitters_do_not_share_state() {
        let a = MetricsEmitter::new().expect("metrics");
        let b = MetricsEmitter::new().expect("metrics");
        a.observe(&UsageEvent::new("r", "p", "m").with_outcome(RequestOutcome::Success));
        assert_eq!(b.requests_total.with_label_values(&["m", "success"]).get(), 0);
    }
}
