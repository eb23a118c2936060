//! Budget enforcement.
//!
//! Status per (scope, period) is derived fresh from spend / ceiling on every
//! check. Nothing about it is sticky: a period rollover brings a blocked
//! scope straight back to `ok`.

use crate::cost::{CostTracker, PeriodSpend, RecordOutcome};
use chrono::{DateTime, Utc};
use gateway_config::{BudgetConfig, ThresholdConfig};
use gateway_core::{BudgetPeriod, GatewayError, GatewayResult, Scope};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Budget status, ordered by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    /// Below the warning threshold
    #[default]
    Ok,
    /// At or above the warning threshold
    Warning,
    /// At or above the critical threshold
    Critical,
    /// At or above the emergency threshold; new requests are refused
    Blocked,
}

impl BudgetStatus {
    /// Lowercase label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert thresholds as fractions of a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Warning fraction
    pub warning: Decimal,
    /// Critical fraction
    pub critical: Decimal,
    /// Emergency fraction
    pub emergency: Decimal,
}

impl Default for Thresholds {
    fn default() -> Self {
        ThresholdConfig::default().into()
    }
}

impl From<ThresholdConfig> for Thresholds {
    fn from(config: ThresholdConfig) -> Self {
        Self {
            warning: config.warning,
            critical: config.critical,
            emergency: config.emergency,
        }
    }
}

impl Thresholds {
    /// Status of `spend` against `ceiling`
    #[must_use]
    pub fn classify(&self, spend: Decimal, ceiling: Decimal) -> BudgetStatus {
        if ceiling <= Decimal::ZERO {
            return BudgetStatus::Blocked;
        }
        let ratio = spend / ceiling;
        if ratio >= self.emergency {
            BudgetStatus::Blocked
        } else if ratio >= self.critical {
            BudgetStatus::Critical
        } else if ratio >= self.warning {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }
}

/// Result of a preflight check that let the request through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetCheck {
    /// Worst status across scopes right now
    pub status: BudgetStatus,
    /// Worst status if this request's estimate were spent
    pub projected_status: BudgetStatus,
}

/// A (scope, period) whose status rose
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetAlert {
    /// Scope that crossed a threshold
    #[serde(serialize_with = "scope_as_str")]
    pub scope: Scope,
    /// Accounting period
    pub period: BudgetPeriod,
    /// Status before the spend
    pub from: BudgetStatus,
    /// Status after the spend
    pub to: BudgetStatus,
    /// Current-period spend
    pub spend: Decimal,
    /// Configured ceiling
    pub ceiling: Decimal,
    /// When the crossing happened
    pub at: DateTime<Utc>,
}

fn scope_as_str<S: Serializer>(scope: &Scope, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(scope)
}

/// Result of a postflight check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostflightReport {
    /// Worst status across recorded scopes
    pub status: BudgetStatus,
    /// Threshold crossings caused by this record
    pub alerts: Vec<BudgetAlert>,
}

/// Global budget state for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodReport {
    /// Spend and bucket label
    #[serde(flatten)]
    pub spend: PeriodSpend,
    /// Configured ceiling, if any
    pub budget: Option<Decimal>,
    /// Spend as a percentage of the ceiling
    pub percentage: Option<Decimal>,
    /// Derived status
    pub status: BudgetStatus,
}

/// Checks spend against configured ceilings
#[derive(Debug)]
pub struct BudgetEnforcer {
    config: BudgetConfig,
    thresholds: Thresholds,
    tracker: Arc<CostTracker>,
    alerts: Mutex<VecDeque<BudgetAlert>>,
}

impl BudgetEnforcer {
    /// Create an enforcer over `tracker`
    #[must_use]
    pub fn new(config: BudgetConfig, tracker: Arc<CostTracker>) -> Self {
        Self {
            thresholds: config.thresholds.into(),
            config,
            tracker,
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    /// Configured thresholds
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Underlying cost tracker
    #[must_use]
    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    /// Ceiling for a scope and period, if one is configured
    #[must_use]
    pub fn ceiling(&self, scope: &Scope, period: BudgetPeriod) -> Option<Decimal> {
        match scope {
            Scope::Global => self.config.global.ceiling(period),
            Scope::Principal(id) => self.config.principal_ceilings(id).ceiling(period),
            Scope::Model(name) => self
                .config
                .models
                .get(name)
                .and_then(|c| c.ceiling(period)),
        }
    }

    /// Status of a single scope and period right now
    #[must_use]
    pub fn status(&self, scope: &Scope, period: BudgetPeriod, now: DateTime<Utc>) -> BudgetStatus {
        self.ceiling(scope, period).map_or(BudgetStatus::Ok, |ceiling| {
            self.thresholds
                .classify(self.tracker.spend(scope, period, now), ceiling)
        })
    }

    /// Check every applicable scope before the upstream call.
    ///
    /// Refuses the request when any scope is already at the emergency
    /// threshold. Warning and critical are advisory.
    pub fn preflight(
        &self,
        principal: &str,
        model: &str,
        estimated_cost: Decimal,
        now: DateTime<Utc>,
    ) -> GatewayResult<BudgetCheck> {
        let mut check = BudgetCheck {
            status: BudgetStatus::Ok,
            projected_status: BudgetStatus::Ok,
        };

        for scope in scopes(principal, model) {
            for period in BudgetPeriod::ALL {
                let Some(ceiling) = self.ceiling(&scope, period) else {
                    continue;
                };
                let spend = self.tracker.spend(&scope, period, now);
                let status = self.thresholds.classify(spend, ceiling);
                if status == BudgetStatus::Blocked {
                    warn!(
                        scope = %scope,
                        period = %period,
                        spend = %spend,
                        ceiling = %ceiling,
                        "Budget exhausted, refusing request"
                    );
                    return Err(GatewayError::BudgetExceeded { scope, period });
                }
                let projected = self
                    .thresholds
                    .classify(spend + estimated_cost.max(Decimal::ZERO), ceiling);
                check.status = check.status.max(status);
                check.projected_status = check.projected_status.max(projected);
            }
        }

        Ok(check)
    }

    /// Compare pre- and post-record status for every recorded scope.
    ///
    /// One alert is raised per (scope, period) whose status rose, so a scope
    /// that stays at `warning` does not alert again.
    pub fn postflight(&self, outcome: &RecordOutcome) -> PostflightReport {
        let mut report = PostflightReport::default();

        for change in &outcome.changes {
            let Some(ceiling) = self.ceiling(&change.key.scope, change.key.period) else {
                continue;
            };
            let from = self.thresholds.classify(change.before, ceiling);
            let to = self.thresholds.classify(change.after, ceiling);
            report.status = report.status.max(to);

            if to > from {
                let alert = BudgetAlert {
                    scope: change.key.scope.clone(),
                    period: change.key.period,
                    from,
                    to,
                    spend: change.after,
                    ceiling,
                    at: outcome.at,
                };
                log_alert(&alert);
                report.alerts.push(alert);
            }
        }

        if !report.alerts.is_empty() {
            let mut log = self.alerts.lock();
            for alert in &report.alerts {
                if log.len() >= self.config.recent_alerts.max(1) {
                    log.pop_front();
                }
                log.push_back(alert.clone());
            }
        }

        report
    }

    /// Most recent `limit` alerts, oldest first
    #[must_use]
    pub fn recent_alerts(&self, limit: usize) -> Vec<BudgetAlert> {
        let log = self.alerts.lock();
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// Global spend, ceiling and status for every period
    #[must_use]
    pub fn status_report(&self, now: DateTime<Utc>) -> Vec<PeriodReport> {
        self.tracker
            .summary(now)
            .into_iter()
            .map(|spend| {
                let budget = self.config.global.ceiling(spend.period);
                let percentage = budget
                    .filter(|b| !b.is_zero())
                    .map(|b| (spend.spent / b * Decimal::ONE_HUNDRED).round_dp(2));
                let status = budget.map_or(BudgetStatus::Ok, |b| {
                    self.thresholds.classify(spend.spent, b)
                });
                PeriodReport {
                    spend,
                    budget,
                    percentage,
                    status,
                }
            })
            .collect()
    }
}

fn scopes(principal: &str, model: &str) -> [Scope; 3] {
    [
        Scope::Global,
        Scope::Principal(principal.to_string()),
        Scope::Model(model.to_string()),
    ]
}

fn log_alert(alert: &BudgetAlert) {
    match alert.to {
        BudgetStatus::Blocked => error!(
            scope = %alert.scope,
            period = %alert.period,
            spend = %alert.spend,
            ceiling = %alert.ceiling,
            from = %alert.from,
            "Budget emergency threshold reached"
        ),
        BudgetStatus::Warning | BudgetStatus::Critical => warn!(
            scope = %alert.scope,
            period = %alert.period,
            spend = %alert.spend,
            ceiling = %alert.ceiling,
            from = %alert.from,
            status = %alert.to,
            "Budget threshold crossed"
        ),
        BudgetStatus::Ok => info!(scope = %alert.scope, period = %alert.period, "Budget ok"),
    }
}
