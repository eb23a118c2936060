//! Cost tracking for LLM usage.
//!
//! Provides:
//! - Per-model pricing and cost calculation in exact decimal arithmetic
//! - Spend accumulators per (scope, period) with lazy period rollover
//! - A bounded log of recent cost entries for reporting

use chrono::{DateTime, Utc, Weekday};
use dashmap::DashMap;
use gateway_config::ModelConfig;
use gateway_core::{BudgetPeriod, GatewayError, GatewayResult, Scope};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

const TOKENS_PER_UNIT: u32 = 1000;

/// Model pricing information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPricing {
    /// Model name
    pub model: String,
    /// Cost per 1K input tokens (USD)
    pub input_cost_per_1k: Decimal,
    /// Cost per 1K output tokens (USD)
    pub output_cost_per_1k: Decimal,
}

impl ModelPricing {
    /// Create new model pricing
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        input_cost_per_1k: Decimal,
        output_cost_per_1k: Decimal,
    ) -> Self {
        Self {
            model: model.into(),
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }

    /// Calculate cost for given token counts
    #[must_use]
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> CostBreakdown {
        let per_unit = Decimal::from(TOKENS_PER_UNIT);
        let input_cost = Decimal::from(input_tokens) / per_unit * self.input_cost_per_1k;
        let output_cost = Decimal::from(output_tokens) / per_unit * self.output_cost_per_1k;
        CostBreakdown {
            input_cost,
            output_cost,
            total: input_cost + output_cost,
        }
    }
}

impl From<&ModelConfig> for ModelPricing {
    fn from(model: &ModelConfig) -> Self {
        Self::new(
            model.name.clone(),
            model.input_cost_per_1k,
            model.output_cost_per_1k,
        )
    }
}

/// Cost of one request split by direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    /// Prompt cost
    pub input_cost: Decimal,
    /// Completion cost
    pub output_cost: Decimal,
    /// Sum of both
    pub total: Decimal,
}

/// Immutable price table, built once at startup
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Build from configured models
    #[must_use]
    pub fn from_models(models: &[ModelConfig]) -> Self {
        Self {
            models: models
                .iter()
                .map(|m| (m.name.clone(), ModelPricing::from(m)))
                .collect(),
        }
    }

    /// Pricing for a model
    #[must_use]
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Whether the model is priced
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// All priced models, sorted by name
    #[must_use]
    pub fn models(&self) -> Vec<&ModelPricing> {
        let mut models: Vec<_> = self.models.values().collect();
        models.sort_by(|a, b| a.model.cmp(&b.model));
        models
    }

    /// Cost of a request against `model`.
    ///
    /// Unknown models are a configuration error, never a free request.
    pub fn estimate_cost(
        &self,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> GatewayResult<CostBreakdown> {
        self.get(model)
            .map(|p| p.calculate_cost(input_tokens, output_tokens))
            .ok_or_else(|| GatewayError::configuration(format!("No pricing for model '{model}'")))
    }
}

/// Identifies one spend accumulator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccumulatorKey {
    /// Who the spend is attributed to
    pub scope: Scope,
    /// Accounting period
    pub period: BudgetPeriod,
}

impl AccumulatorKey {
    /// Create a key
    #[must_use]
    pub fn new(scope: Scope, period: BudgetPeriod) -> Self {
        Self { scope, period }
    }
}

#[derive(Debug)]
struct PeriodAccumulator {
    period_start: DateTime<Utc>,
    total: Decimal,
}

/// Spend on one accumulator before and after a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendChange {
    /// Accumulator
    pub key: AccumulatorKey,
    /// Current-period spend before the record
    pub before: Decimal,
    /// Current-period spend after the record
    pub after: Decimal,
}

/// Everything a single `record` touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Timestamp the amount was recorded at
    pub at: DateTime<Utc>,
    /// Amount added
    pub amount: Decimal,
    /// One change per affected accumulator, in canonical key order
    pub changes: Vec<SpendChange>,
}

impl RecordOutcome {
    /// Change for a specific accumulator
    #[must_use]
    pub fn change(&self, scope: &Scope, period: BudgetPeriod) -> Option<&SpendChange> {
        self.changes
            .iter()
            .find(|c| &c.key.scope == scope && c.key.period == period)
    }
}

/// One priced request, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostEntry {
    /// Request ID
    pub request_id: String,
    /// Principal the cost is attributed to
    pub principal: String,
    /// Model used
    pub model: String,
    /// Input tokens consumed
    pub input_tokens: u32,
    /// Output tokens produced
    pub output_tokens: u32,
    /// Prompt cost
    pub input_cost: Decimal,
    /// Completion cost
    pub output_cost: Decimal,
    /// Total cost
    pub total_cost: Decimal,
    /// When the cost was recorded
    pub timestamp: DateTime<Utc>,
}

impl CostEntry {
    /// Create an entry from a breakdown
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        principal: impl Into<String>,
        model: impl Into<String>,
        input_tokens: u32,
        output_tokens: u32,
        cost: CostBreakdown,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            principal: principal.into(),
            model: model.into(),
            input_tokens,
            output_tokens,
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            total_cost: cost.total,
            timestamp,
        }
    }
}

/// Global spend for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSpend {
    /// Accounting period
    pub period: BudgetPeriod,
    /// Human-readable bucket, e.g. `2024-W20`
    pub bucket: String,
    /// Spend in the current period
    pub spent: Decimal,
}

/// Records spend into per-(scope, period) accumulators.
///
/// Each accumulator has its own lock; a record takes the nine locks it needs
/// in key order, so concurrent records never deadlock and never lose updates.
#[derive(Debug)]
pub struct CostTracker {
    week_start: Weekday,
    accumulators: DashMap<AccumulatorKey, Arc<Mutex<PeriodAccumulator>>>,
    entries: Mutex<VecDeque<CostEntry>>,
    max_entries: usize,
}

impl CostTracker {
    /// Create a new cost tracker
    #[must_use]
    pub fn new(week_start: Weekday, max_entries: usize) -> Self {
        Self {
            week_start,
            accumulators: DashMap::new(),
            entries: Mutex::new(VecDeque::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// First day of the budget week
    #[must_use]
    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Add `amount` to global, principal and model accumulators for every period
    pub fn record(
        &self,
        principal: &str,
        model: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        let amount = if amount.is_sign_negative() {
            warn!(principal = %principal, model = %model, amount = %amount, "Ignoring negative cost");
            Decimal::ZERO
        } else {
            amount
        };

        let mut keys: Vec<AccumulatorKey> = [
            Scope::Global,
            Scope::Principal(principal.to_string()),
            Scope::Model(model.to_string()),
        ]
        .into_iter()
        .flat_map(|scope| {
            BudgetPeriod::ALL
                .into_iter()
                .map(move |period| AccumulatorKey::new(scope.clone(), period))
        })
        .collect();
        keys.sort();

        // Clone the handles out so no map shard lock is held while locking.
        let handles: Vec<(AccumulatorKey, Arc<Mutex<PeriodAccumulator>>)> = keys
            .into_iter()
            .map(|key| {
                let handle = self
                    .accumulators
                    .entry(key.clone())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(PeriodAccumulator {
                            period_start: key.period.period_start(now, self.week_start),
                            total: Decimal::ZERO,
                        }))
                    })
                    .clone();
                (key, handle)
            })
            .collect();

        let mut guards: Vec<_> = handles.iter().map(|(key, h)| (key, h.lock())).collect();

        let changes = guards
            .iter_mut()
            .map(|(key, acc)| {
                let current_start = key.period.period_start(now, self.week_start);
                // A late timestamp from the previous period lands in the live one.
                if current_start > acc.period_start {
                    acc.period_start = current_start;
                    acc.total = Decimal::ZERO;
                }
                let before = acc.total;
                acc.total += amount;
                SpendChange {
                    key: (*key).clone(),
                    before,
                    after: acc.total,
                }
            })
            .collect();
        drop(guards);

        debug!(principal = %principal, model = %model, amount = %amount, "Recorded cost");

        RecordOutcome {
            at: now,
            amount,
            changes,
        }
    }

    /// Record a priced request and keep it in the recent entry log
    pub fn record_entry(&self, entry: CostEntry) -> RecordOutcome {
        let outcome = self.record(&entry.principal, &entry.model, entry.total_cost, entry.timestamp);

        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);

        outcome
    }

    /// Current-period spend for a scope; zero when the stored period is stale
    #[must_use]
    pub fn spend(&self, scope: &Scope, period: BudgetPeriod, now: DateTime<Utc>) -> Decimal {
        let key = AccumulatorKey::new(scope.clone(), period);
        let Some(handle) = self.accumulators.get(&key).map(|h| Arc::clone(h.value())) else {
            return Decimal::ZERO;
        };
        let acc = handle.lock();
        if acc.period_start >= period.period_start(now, self.week_start) {
            acc.total
        } else {
            Decimal::ZERO
        }
    }

    /// Most recent `limit` entries, oldest first
    #[must_use]
    pub fn recent_entries(&self, limit: usize) -> Vec<CostEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of entries currently held
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Global spend for every period
    #[must_use]
    pub fn summary(&self, now: DateTime<Utc>) -> Vec<PeriodSpend> {
        BudgetPeriod::ALL
            .into_iter()
            .map(|period| PeriodSpend {
                period,
                bucket: period.bucket_key(now, self.week_start),
                spent: self.spend(&Scope::Global, period, now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid time")
    }

    fn pricing() -> PricingTable {
        PricingTable::from_models(&[ModelConfig::new("gemini-pro", dec!(0.000125), dec!(0.000375))])
    }

    #[test]
    fn test_model_pricing() {
        let cost = pricing()
            .estimate_cost("gemini-pro", 1000, 500)
            .expect("priced");
        assert_eq!(cost.input_cost, dec!(0.000125));
        assert_eq!(cost.output_cost, dec!(0.0001875));
        assert_eq!(cost.total, dec!(0.0003125));
    }

    #[test]
    fn test_unknown_model_is_configuration_error() {
        let err = pricing().estimate_cost("mystery", 10, 10).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_zero_tokens_cost_nothing() {
        let cost = pricing().estimate_cost("gemini-pro", 0, 0).expect("priced");
        assert_eq!(cost.total, Decimal::ZERO);
    }

    #[test]
    fn test_record_updates_all_nine_accumulators() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let now = at(2024, 5, 17, 12);
        let outcome = tracker.record("alice", "gemini-pro", dec!(1.5), now);

        assert_eq!(outcome.changes.len(), 9);
        for scope in [
            Scope::Global,
            Scope::Principal("alice".into()),
            Scope::Model("gemini-pro".into()),
        ] {
            for period in BudgetPeriod::ALL {
                assert_eq!(tracker.spend(&scope, period, now), dec!(1.5));
                let change = outcome.change(&scope, period).expect("change");
                assert_eq!(change.before, Decimal::ZERO);
                assert_eq!(change.after, dec!(1.5));
            }
        }
        assert_eq!(
            tracker.spend(&Scope::Principal("bob".into()), BudgetPeriod::Day, now),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_decimal_accumulation_is_exact() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let now = at(2024, 5, 17, 12);
        for _ in 0..10_000 {
            tracker.record("alice", "gemini-pro", dec!(0.0001), now);
        }
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Day, now), dec!(1));
    }

    #[test]
    fn test_day_rollover_keeps_month() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let friday = at(2024, 5, 17, 23);
        tracker.record("alice", "gemini-pro", dec!(2), friday);

        let saturday = friday + Duration::hours(2);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Day, saturday), Decimal::ZERO);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Week, saturday), dec!(2));

        let outcome = tracker.record("alice", "gemini-pro", dec!(1), saturday);
        let day = outcome.change(&Scope::Global, BudgetPeriod::Day).expect("day");
        assert_eq!(day.before, Decimal::ZERO);
        assert_eq!(day.after, dec!(1));
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Month, saturday), dec!(3));
    }

    #[test]
    fn test_week_rolls_over_on_configured_day() {
        let tracker = CostTracker::new(Weekday::Sun, 10);
        // Saturday 2024-05-18
        tracker.record("alice", "gemini-pro", dec!(5), at(2024, 5, 18, 12));
        // Sunday starts a new week
        let sunday = at(2024, 5, 19, 1);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Week, sunday), Decimal::ZERO);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Month, sunday), dec!(5));
    }

    #[test]
    fn test_month_rollover() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        tracker.record("alice", "gemini-pro", dec!(7), at(2024, 5, 31, 22));
        let june = at(2024, 6, 1, 0);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Month, june), Decimal::ZERO);
    }

    #[test]
    fn test_late_timestamp_does_not_reset_live_period() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let today = at(2024, 5, 17, 0);
        tracker.record("alice", "gemini-pro", dec!(1), today);
        tracker.record("alice", "gemini-pro", dec!(1), today - Duration::minutes(1));
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Day, today), dec!(2));
    }

    #[test]
    fn test_negative_amount_ignored() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let now = at(2024, 5, 17, 12);
        tracker.record("alice", "gemini-pro", dec!(3), now);
        tracker.record("alice", "gemini-pro", dec!(-1), now);
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Day, now), dec!(3));
    }

    #[test]
    fn test_recent_entries_are_bounded() {
        let tracker = CostTracker::new(Weekday::Mon, 3);
        let now = at(2024, 5, 17, 12);
        let cost = pricing().estimate_cost("gemini-pro", 1000, 0).expect("priced");
        for i in 0..5 {
            tracker.record_entry(CostEntry::new(
                format!("req-{i}"),
                "alice",
                "gemini-pro",
                1000,
                0,
                cost,
                now,
            ));
        }

        assert_eq!(tracker.entry_count(), 3);
        let ids: Vec<_> = tracker
            .recent_entries(2)
            .into_iter()
            .map(|e| e.request_id)
            .collect();
        assert_eq!(ids, vec!["req-3", "req-4"]);
        assert_eq!(
            tracker.spend(&Scope::Global, BudgetPeriod::Day, now),
            dec!(0.000625)
        );
    }

    #[test]
    fn test_summary_reports_buckets() {
        let tracker = CostTracker::new(Weekday::Mon, 10);
        let now = at(2024, 5, 17, 12);
        tracker.record("alice", "gemini-pro", dec!(4), now);
        let summary = tracker.summary(now);
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].bucket, "2024-05-17");
        assert_eq!(summary[1].bucket, "2024-W20");
        assert_eq!(summary[2].bucket, "2024-05");
        assert!(summary.iter().all(|s| s.spent == dec!(4)));
    }

    #[test]
    fn test_concurrent_records_lose_nothing() {
        let tracker = Arc::new(CostTracker::new(Weekday::Mon, 10));
        let now = at(2024, 5, 17, 12);
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    let principal = format!("user-{}", i % 3);
                    let model = if i % 2 == 0 { "a" } else { "b" };
                    for _ in 0..250 {
                        tracker.record(&principal, model, dec!(0.01), now);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("thread");
        }
        assert_eq!(tracker.spend(&Scope::Global, BudgetPeriod::Month, now), dec!(20));
        assert_eq!(
            tracker.spend(&Scope::Model("a".into()), BudgetPeriod::Day, now),
            dec!(10)
        );
    }
}
