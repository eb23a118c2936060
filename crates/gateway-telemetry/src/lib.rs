//! # Gateway Telemetry
//!
//! Cost, budget and observability for the LLM policy gateway.
//!
//! This crate provides:
//! - Decimal cost calculation and per-period spend accumulators
//! - Budget enforcement with edge-triggered threshold alerts
//! - Prometheus metrics
//! - Structured logging and OpenTelemetry tracing setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod cost;
pub mod metrics;
pub mod tracing_setup;

// Re-export main types
pub use budget::{
    BudgetAlert, BudgetCheck, BudgetEnforcer, BudgetStatus, PeriodReport, PostflightReport,
    Thresholds,
};
pub use cost::{
    AccumulatorKey, CostBreakdown, CostEntry, CostTracker, ModelPricing, PeriodSpend,
    PricingTable, RecordOutcome, SpendChange,
};
pub use metrics::{GuardrailBlock, MetricsEmitter, MetricsError, RequestOutcome, UsageEvent};
pub use tracing_setup::{
    build_filter, init_tracing, parse_filter, shutdown_tracing, TracingConfig, TracingError,
};
