//! Fixed-window rate limiting with punitive backoff.
//!
//! Every (origin, endpoint) pair owns a counter that resets when its window
//! passes. Overflowing a window extends it by a multiplier that grows with
//! the number of recent violations, capped at [`MAX_BACKOFF_MULTIPLIER`].
//! A quiet window rollover forgives one violation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;

use crate::config::{EndpointPolicyConfig, ValidationError, DEFAULT_POLICY_KEY};
use crate::security::sweeper::Sweepable;

/// Upper bound for the backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 5.0;

/// Multiplier growth per recorded violation.
const BACKOFF_STEP: f64 = 0.5;

/// Admission policy for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl From<EndpointPolicyConfig> for EndpointPolicy {
    fn from(config: EndpointPolicyConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window_ms: config.window_ms,
        }
    }
}

/// Validated policy table: a mandatory default plus exact-path overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyTable {
    default: EndpointPolicy,
    overrides: HashMap<String, EndpointPolicy>,
}

impl PolicyTable {
    pub fn new(default: EndpointPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Add or replace the policy for an exact endpoint path.
    pub fn with_override(mut self, path: impl Into<String>, policy: EndpointPolicy) -> Self {
        self.overrides.insert(path.into(), policy);
        self
    }

    /// Policy for `path`, falling back to the default.
    pub fn policy_for(&self, path: &str) -> EndpointPolicy {
        self.overrides.get(path).copied().unwrap_or(self.default)
    }

    /// Label for metrics: the path itself when overridden, else `default`.
    pub fn policy_label<'a>(&self, path: &'a str) -> &'a str {
        if self.overrides.contains_key(path) {
            path
        } else {
            DEFAULT_POLICY_KEY
        }
    }

    pub fn default_policy(&self) -> EndpointPolicy {
        self.default
    }
}

impl TryFrom<&BTreeMap<String, EndpointPolicyConfig>> for PolicyTable {
    type Error = ValidationError;

    fn try_from(policies: &BTreeMap<String, EndpointPolicyConfig>) -> Result<Self, Self::Error> {
        let default = policies
            .get(DEFAULT_POLICY_KEY)
            .copied()
            .ok_or(ValidationError::MissingDefaultPolicy)?;

        let overrides = policies
            .iter()
            .filter(|(path, _)| path.as_str() != DEFAULT_POLICY_KEY)
            .map(|(path, policy)| (path.clone(), EndpointPolicy::from(*policy)))
            .collect();

        Ok(Self {
            default: default.into(),
            overrides,
        })
    }
}

/// Counter state for one (origin, endpoint) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: u64,
    pub violation_count: u32,
}

impl RateLimitEntry {
    fn fresh(now: u64, window_ms: u64) -> Self {
        Self {
            count: 0,
            window_reset_at: now.saturating_add(window_ms),
            violation_count: 0,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Milliseconds since the Unix epoch.
    pub reset_at: u64,
    pub retry_after_secs: Option<u64>,
}

/// Backoff multiplier applied after `violation_count` violations.
pub fn backoff_multiplier(violation_count: u32) -> f64 {
    (1.0 + BACKOFF_STEP * f64::from(violation_count)).min(MAX_BACKOFF_MULTIPLIER)
}

/// Shared rate limiter over an origin -> endpoint -> entry table.
///
/// Each origin's endpoints live under one map shard lock, so the
/// check-and-increment for a pair is atomic and calls are applied in order.
pub struct RateLimiter {
    table: DashMap<String, HashMap<String, RateLimitEntry>>,
    policies: ArcSwap<PolicyTable>,
}

impl RateLimiter {
    pub fn new(policies: PolicyTable) -> Self {
        Self {
            table: DashMap::new(),
            policies: ArcSwap::from_pointee(policies),
        }
    }

    /// Decide whether `origin` may call `endpoint` at `now` (ms since epoch).
    pub fn admit(&self, origin: &str, endpoint: &str, now: u64) -> Decision {
        let policy = self.policies.load().policy_for(endpoint);

        let mut endpoints = self.table.entry(origin.to_string()).or_default();
        let entry = endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| RateLimitEntry::fresh(now, policy.window_ms));

        if now > entry.window_reset_at {
            entry.count = 0;
            entry.window_reset_at = now.saturating_add(policy.window_ms);
            entry.violation_count = entry.violation_count.saturating_sub(1);
        }

        if entry.count < policy.max_requests {
            entry.count += 1;
            return Decision {
                allowed: true,
                limit: policy.max_requests,
                remaining: policy.max_requests - entry.count,
                reset_at: entry.window_reset_at,
                retry_after_secs: None,
            };
        }

        entry.violation_count = entry.violation_count.saturating_add(1);
        let multiplier = backoff_multiplier(entry.violation_count);
        let penalty_ms = (policy.window_ms as f64 * multiplier).ceil() as u64;
        entry.window_reset_at = now.saturating_add(penalty_ms);

        Decision {
            allowed: false,
            limit: policy.max_requests,
            remaining: 0,
            reset_at: entry.window_reset_at,
            retry_after_secs: Some((entry.window_reset_at - now).div_ceil(1000)),
        }
    }

    /// Replace the policy table. Existing counters are kept.
    pub fn update_policies(&self, policies: PolicyTable) {
        self.policies.store(Arc::new(policies));
    }

    /// Snapshot of the active policy table.
    pub fn policies(&self) -> Arc<PolicyTable> {
        self.policies.load_full()
    }

    /// Current entry for a pair, if tracked.
    pub fn entry(&self, origin: &str, endpoint: &str) -> Option<RateLimitEntry> {
        self.table
            .get(origin)
            .and_then(|endpoints| endpoints.get(endpoint).copied())
    }

    /// Number of tracked origins.
    pub fn origin_count(&self) -> usize {
        self.table.len()
    }

    /// Number of tracked (origin, endpoint) pairs.
    pub fn entry_count(&self) -> usize {
        self.table.iter().map(|endpoints| endpoints.len()).sum()
    }

    /// Drop every entry whose window has passed, then every empty origin.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let mut removed = 0;
        self.table.retain(|_, endpoints| {
            let before = endpoints.len();
            endpoints.retain(|_, entry| entry.window_reset_at >= now);
            removed += before - endpoints.len();
            !endpoints.is_empty()
        });
        removed
    }
}

impl Sweepable for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn sweep(&self, now: u64) -> usize {
        self.sweep_expired(now)
    }

    fn size(&self) -> usize {
        self.entry_count()
    }
}
