//! Request pipeline.
//!
//! admit -> input guardrail -> budget preflight -> upstream -> output
//! guardrail -> cost record -> budget postflight -> metrics.
//!
//! The in-flight guard owns the admission permit and the usage event. It is
//! dropped on every exit path, including when the handling task is cancelled,
//! so the concurrency slot is released and exactly one observation is emitted.

use gateway_config::GatewayConfig;
use gateway_core::{
    estimate_tokens, Clock, Completion, GatewayError, GatewayRequest, GatewayResult,
    GuardrailStage, InferenceProvider, Principal,
};
use gateway_resilience::{AdmissionPermit, RateLimiter};
use gateway_security::ContentGuardrail;
use gateway_telemetry::{
    request_span, BudgetEnforcer, BudgetStatus, CostEntry, CostTracker, GuardrailBlock,
    MetricsEmitter, PricingTable, RequestOutcome, UsageEvent,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};

/// Model label used in metrics for names missing from the price table
const UNKNOWN_MODEL: &str = "unknown";

/// Transport facts about the inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestEnvelope {
    /// Correlation ID
    pub request_id: String,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Body size in bytes
    pub size: usize,
}

impl RequestEnvelope {
    /// Create an envelope
    #[must_use]
    pub fn new(request_id: impl Into<String>, content_type: Option<&str>, size: usize) -> Self {
        Self {
            request_id: request_id.into(),
            content_type: content_type.map(str::to_string),
            size,
        }
    }
}

/// Per-request guard: emits the usage event and releases the slot on drop
struct InFlight {
    metrics: Arc<MetricsEmitter>,
    event: UsageEvent,
    started: Instant,
    permit: Option<AdmissionPermit>,
}

impl InFlight {
    fn new(metrics: Arc<MetricsEmitter>, event: UsageEvent) -> Self {
        metrics.request_started();
        Self {
            metrics,
            event,
            started: Instant::now(),
            permit: None,
        }
    }

    fn finish(&mut self, result: &GatewayResult<Completion>) {
        match result {
            Ok(_) => self.event.outcome = RequestOutcome::Success,
            Err(err) => {
                self.event.outcome = RequestOutcome::from_error(err);
                match err {
                    GatewayError::RateLimitExceeded { dimension, .. } => {
                        self.event.rate_limited_by = Some(dimension.clone());
                    }
                    GatewayError::GuardrailViolation { reason, stage, .. } => {
                        self.event.guardrail_block = Some(GuardrailBlock {
                            stage: *stage,
                            category: reason.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.event.latency = self.started.elapsed();
        if self.event.outcome == RequestOutcome::Cancelled {
            info!(request_id = %self.event.request_id, "Request cancelled before completion");
        }
        self.metrics.observe(&self.event);
        self.metrics.request_finished();
        drop(self.permit.take());
    }
}

/// Runs every policy stage around one upstream call
pub struct GatewayPipeline {
    limiter: Arc<RateLimiter>,
    guardrail: Arc<ContentGuardrail>,
    pricing: Arc<PricingTable>,
    costs: Arc<CostTracker>,
    budgets: Arc<BudgetEnforcer>,
    metrics: Arc<MetricsEmitter>,
    provider: Arc<dyn InferenceProvider>,
    clock: Arc<dyn Clock>,
    upstream_timeout: Duration,
}

impl std::fmt::Debug for GatewayPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayPipeline")
            .field("provider", &self.provider.id())
            .field("upstream_timeout", &self.upstream_timeout)
            .finish_non_exhaustive()
    }
}

impl GatewayPipeline {
    /// Build every policy component from configuration
    ///
    /// # Errors
    /// Returns a configuration error if a guardrail pattern or metric cannot
    /// be built
    pub fn from_config(
        config: &GatewayConfig,
        provider: Arc<dyn InferenceProvider>,
        clock: Arc<dyn Clock>,
    ) -> GatewayResult<Self> {
        let guardrail = ContentGuardrail::from_config(&config.guardrails)
            .map_err(|e| GatewayError::configuration(e.to_string()))?;
        let metrics =
            MetricsEmitter::new().map_err(|e| GatewayError::configuration(e.to_string()))?;
        let costs = Arc::new(CostTracker::new(
            config.budgets.week_start,
            config.budgets.recent_entries,
        ));

        Ok(Self {
            limiter: Arc::new(RateLimiter::new(
                config.rate_limits.clone(),
                &config.models,
                Arc::clone(&clock),
            )),
            guardrail: Arc::new(guardrail),
            pricing: Arc::new(PricingTable::from_models(&config.models)),
            budgets: Arc::new(BudgetEnforcer::new(config.budgets.clone(), Arc::clone(&costs))),
            costs,
            metrics: Arc::new(metrics),
            provider,
            clock,
            upstream_timeout: config.upstream.timeout,
        })
    }

    /// Rate limiter
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Content guardrail
    #[must_use]
    pub fn guardrail(&self) -> &ContentGuardrail {
        &self.guardrail
    }

    /// Price table
    #[must_use]
    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Cost tracker
    #[must_use]
    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    /// Budget enforcer
    #[must_use]
    pub fn budgets(&self) -> &BudgetEnforcer {
        &self.budgets
    }

    /// Metrics emitter
    #[must_use]
    pub fn metrics(&self) -> &MetricsEmitter {
        &self.metrics
    }

    /// Clock used for windows and periods
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Handle one request end to end
    pub async fn handle(
        &self,
        principal: &Principal,
        request: GatewayRequest,
        envelope: RequestEnvelope,
    ) -> GatewayResult<Completion> {
        let model_label = if self.pricing.contains(&request.model) {
            request.model.as_str()
        } else {
            UNKNOWN_MODEL
        };
        let span = request_span!(envelope.request_id, principal.id(), model_label);
        let mut flight = InFlight::new(
            Arc::clone(&self.metrics),
            UsageEvent::new(&envelope.request_id, principal.id(), model_label),
        );

        let result = self
            .run(principal, &request, &envelope, &mut flight)
            .instrument(span)
            .await;

        flight.finish(&result);
        result
    }

    async fn run(
        &self,
        principal: &Principal,
        request: &GatewayRequest,
        envelope: &RequestEnvelope,
        flight: &mut InFlight,
    ) -> GatewayResult<Completion> {
        flight.permit = Some(self.limiter.admit(principal, &request.model).into_result()?);

        request.validate()?;
        let model = request.model.as_str();
        if !self.pricing.contains(model) {
            return Err(GatewayError::configuration(format!(
                "No pricing for model '{model}'"
            )));
        }

        let prompt = request.prompt_text();
        self.guardrail
            .check_input(&prompt, envelope.content_type.as_deref(), envelope.size)
            .into_result(GuardrailStage::Input)?;

        let estimate = self.pricing.estimate_cost(
            model,
            estimate_tokens(&prompt),
            request.max_tokens.unwrap_or(0),
        )?;
        let check = self
            .budgets
            .preflight(principal.id(), model, estimate.total, self.clock.now())?;
        if check.projected_status > BudgetStatus::Ok {
            debug!(
                status = %check.status,
                projected = %check.projected_status,
                estimate = %estimate.total,
                "Budget nearing ceiling"
            );
        }

        let completion = tokio::time::timeout(self.upstream_timeout, self.provider.complete(request))
            .await
            .map_err(|_| GatewayError::UpstreamTimeout {
                timeout: self.upstream_timeout,
            })??;

        let cost = self
            .pricing
            .estimate_cost(model, completion.input_tokens, completion.output_tokens)?;
        flight.event.input_tokens = completion.input_tokens;
        flight.event.output_tokens = completion.output_tokens;
        flight.event.cost = cost.total;

        // The upstream call happened, so the cost is charged even if the
        // output is withheld.
        let output_verdict = self.guardrail.check_output(&completion.text);

        let outcome = self.costs.record_entry(CostEntry::new(
            &envelope.request_id,
            principal.id(),
            model,
            completion.input_tokens,
            completion.output_tokens,
            cost,
            self.clock.now(),
        ));
        let report = self.budgets.postflight(&outcome);
        for alert in &report.alerts {
            self.metrics.record_budget_alert(alert);
        }

        output_verdict.into_result(GuardrailStage::Output)?;

        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            cost = %cost.total,
            budget_status = %report.status,
            "Request completed"
        );
        Ok(completion)
    }
}
