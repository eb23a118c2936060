//! Multi-dimensional admission control.
//!
//! Fixed windows aligned to wall-clock minute/hour/day boundaries are kept
//! for three scopes:
//! - global, across all callers
//! - per principal (config overrides fall back field by field)
//! - per model, across all callers of that model
//!
//! Counters roll over lazily when touched. A per-principal concurrency gauge
//! is checked before any window. Window counters for one request are locked
//! together in key order and incremented all or none, so a rejected request
//! never occupies capacity in any window.

use crate::concurrency::{ConcurrencyLimiter, ConcurrencyPermit};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use gateway_config::{ModelConfig, RateLimitConfig, WindowLimits};
use gateway_core::{Clock, GatewayError, Principal, PrincipalLimits, Scope, WindowKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Retry hint returned when the concurrency ceiling is hit
pub const CONCURRENCY_RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct CounterKey {
    scope: Scope,
    window: WindowKind,
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}", self.scope, self.window)
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    window_start: DateTime<Utc>,
    count: u64,
}

impl WindowCounter {
    /// Reset in place if `now` has moved past this counter's window
    fn roll(&mut self, kind: WindowKind, now: DateTime<Utc>) {
        let current = kind.window_start(now);
        if self.window_start != current {
            self.window_start = current;
            self.count = 0;
        }
    }
}

/// Outcome of [`RateLimiter::admit`]
#[derive(Debug)]
pub enum RateDecision {
    /// Request may proceed; keep the permit alive until it finishes
    Allowed(AdmissionPermit),
    /// Request refused
    Rejected {
        /// Seconds until the earliest violated window rolls over
        retry_after_secs: u64,
        /// Which ceiling was hit, e.g. `principal:alice per minute`
        dimension: String,
    },
}

impl RateDecision {
    /// Whether the request was admitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Convert into the gateway error taxonomy
    pub fn into_result(self) -> Result<AdmissionPermit, GatewayError> {
        match self {
            Self::Allowed(permit) => Ok(permit),
            Self::Rejected {
                retry_after_secs,
                dimension,
            } => Err(GatewayError::rate_limited(retry_after_secs, dimension)),
        }
    }
}

/// Proof of admission.
///
/// Holds the principal's concurrency slot; dropping it releases the slot
/// exactly once, whatever way the request ended.
#[derive(Debug)]
pub struct AdmissionPermit {
    principal: String,
    _slot: Option<ConcurrencyPermit>,
}

impl AdmissionPermit {
    /// Principal that was admitted
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

/// Windowed request limiter with a per-principal concurrency gauge
pub struct RateLimiter {
    config: RateLimitConfig,
    model_limits: HashMap<String, WindowLimits>,
    counters: DashMap<CounterKey, Arc<Mutex<WindowCounter>>>,
    concurrency: ConcurrencyLimiter,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.config.enabled)
            .field("counters", &self.counters.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter from configuration and the model table
    pub fn new(config: RateLimitConfig, models: &[ModelConfig], clock: Arc<dyn Clock>) -> Self {
        let model_limits = models
            .iter()
            .filter(|m| !m.rate_limits.is_unlimited())
            .map(|m| (m.name.clone(), m.rate_limits))
            .collect();

        Self {
            config,
            model_limits,
            counters: DashMap::new(),
            concurrency: ConcurrencyLimiter::new(),
            clock,
        }
    }

    /// Effective limits: principal overrides, then config overrides, then defaults
    #[must_use]
    pub fn limits_for(&self, principal: &Principal) -> PrincipalLimits {
        let configured = self.config.limits_for(principal.id());
        match principal.limits() {
            Some(o) => PrincipalLimits {
                requests_per_minute: o.requests_per_minute.or(configured.requests_per_minute),
                requests_per_hour: o.requests_per_hour.or(configured.requests_per_hour),
                requests_per_day: o.requests_per_day.or(configured.requests_per_day),
                max_concurrent: o.max_concurrent.or(configured.max_concurrent),
            },
            None => configured,
        }
    }

    /// Decide whether a request may proceed.
    ///
    /// All applicable window counters are locked in key order and every
    /// ceiling is evaluated before anything is committed. Either each counter
    /// is incremented or none is. On rejection the concurrency slot is
    /// released and the smallest retry-after among the violated dimensions
    /// is reported.
    pub fn admit(&self, principal: &Principal, model: &str) -> RateDecision {
        let limits = self.limits_for(principal);

        if !self.config.enabled {
            return RateDecision::Allowed(AdmissionPermit {
                principal: principal.id().to_string(),
                _slot: None,
            });
        }

        let slot = match self
            .concurrency
            .try_acquire(principal.id(), limits.max_concurrent)
        {
            Ok(slot) => slot,
            Err(in_flight) => {
                warn!(
                    principal = %principal,
                    in_flight,
                    limit = ?limits.max_concurrent,
                    "Concurrency limit reached"
                );
                return RateDecision::Rejected {
                    retry_after_secs: CONCURRENCY_RETRY_AFTER_SECS,
                    dimension: format!("principal:{} concurrency", principal.id()),
                };
            }
        };

        let now = self.clock.now();
        let mut handles: Vec<(usize, CounterKey, u64, Arc<Mutex<WindowCounter>>)> = self
            .dimensions(principal, model, &limits)
            .into_iter()
            .enumerate()
            .map(|(order, (key, limit))| {
                let handle = self.counter(&key, now);
                (order, key, limit, handle)
            })
            .collect();
        handles.sort_by(|a, b| a.1.cmp(&b.1));

        let mut guards: Vec<_> = handles
            .iter()
            .map(|(order, key, limit, handle)| (*order, key, *limit, handle.lock()))
            .collect();
        for (_, key, _, counter) in &mut guards {
            counter.roll(key.window, now);
        }

        // Ties on retry-after go to evaluation order: global, principal, model.
        let violation = guards
            .iter()
            .filter(|(_, _, limit, counter)| counter.count >= *limit)
            .map(|(order, key, _, _)| (key.window.seconds_until_rollover(now), *order, *key))
            .min_by_key(|(retry, order, _)| (*retry, *order))
            .map(|(retry, _, key)| (retry, key.clone()));

        if violation.is_none() {
            for (_, _, _, counter) in &mut guards {
                counter.count += 1;
            }
        }
        drop(guards);

        if let Some((retry_after_secs, key)) = violation {
            drop(slot);
            warn!(
                principal = %principal,
                model = %model,
                dimension = %key,
                retry_after_secs,
                "Rate limit exceeded"
            );
            return RateDecision::Rejected {
                retry_after_secs,
                dimension: key.to_string(),
            };
        }

        debug!(principal = %principal, model = %model, "Request admitted");
        RateDecision::Allowed(AdmissionPermit {
            principal: principal.id().to_string(),
            _slot: Some(slot),
        })
    }

    /// Requests counted in the current window for a scope
    #[must_use]
    pub fn window_count(&self, scope: &Scope, window: WindowKind) -> u64 {
        let key = CounterKey {
            scope: scope.clone(),
            window,
        };
        let current = window.window_start(self.clock.now());
        self.counters.get(&key).map_or(0, |handle| {
            let counter = handle.lock();
            if counter.window_start == current {
                counter.count
            } else {
                0
            }
        })
    }

    /// In-flight requests for a principal
    #[must_use]
    pub fn in_flight(&self, principal: &str) -> u32 {
        self.concurrency.in_flight(principal)
    }

    /// In-flight requests across every principal
    #[must_use]
    pub fn total_in_flight(&self) -> u64 {
        self.concurrency.total_in_flight()
    }

    /// Limited dimensions in evaluation order: global, principal, model
    fn dimensions(
        &self,
        principal: &Principal,
        model: &str,
        limits: &PrincipalLimits,
    ) -> Vec<(CounterKey, u64)> {
        let principal_windows = WindowLimits {
            requests_per_minute: limits.requests_per_minute,
            requests_per_hour: limits.requests_per_hour,
            requests_per_day: limits.requests_per_day,
        };

        let mut scopes = vec![
            (Scope::Global, self.config.global),
            (Scope::Principal(principal.id().to_string()), principal_windows),
        ];
        if let Some(model_limits) = self.model_limits.get(model) {
            scopes.push((Scope::Model(model.to_string()), *model_limits));
        }

        scopes
            .into_iter()
            .flat_map(|(scope, windows)| {
                WindowKind::ALL.into_iter().filter_map(move |window| {
                    windows.limit(window).map(|limit| {
                        (
                            CounterKey {
                                scope: scope.clone(),
                                window,
                            },
                            limit,
                        )
                    })
                })
            })
            .collect()
    }

    /// Shared handle for a counter, created on first use. The map entry is
    /// released before the caller locks the handle.
    fn counter(&self, key: &CounterKey, now: DateTime<Utc>) -> Arc<Mutex<WindowCounter>> {
        self.counters
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WindowCounter {
                    window_start: key.window.window_start(now),
                    count: 0,
                }))
            })
            .clone()
    }
}
