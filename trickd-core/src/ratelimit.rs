//! Per-operation rate limiting.

use crate::error::GameError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Admission check consulted before every engine operation.
pub trait RateLimiter: Send + Sync {
    /// Counts one request for `key` under `operation`.
    fn check(&self, operation: &str, key: &str) -> Result<(), GameError>;

    /// Counts one request against every key, or against none of them if
    /// any key is over its limit.
    fn check_all(&self, operation: &str, keys: &[String]) -> Result<(), GameError> {
        keys.iter().try_for_each(|key| self.check(operation, key))
    }
}

/// Limiter that admits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLimits;

impl RateLimiter for NoLimits {
    fn check(&self, _operation: &str, _key: &str) -> Result<(), GameError> {
        Ok(())
    }
}

/// At most `max_requests` per `window_secs`. Zero requests disables the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.max_requests == 0 || self.window_secs == 0
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter per `(operation, key)`.
///
/// Each check locks only the shard holding its own counter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    rules: HashMap<String, RateLimitRule>,
    default_rule: RateLimitRule,
    windows: DashMap<(String, String), Window>,
}

impl FixedWindowLimiter {
    pub fn new(default_rule: RateLimitRule) -> Self {
        Self {
            rules: HashMap::new(),
            default_rule,
            windows: DashMap::new(),
        }
    }

    /// Overrides the rule for one operation.
    pub fn with_rule(mut self, operation: impl Into<String>, rule: RateLimitRule) -> Self {
        self.rules.insert(operation.into(), rule);
        self
    }

    pub fn rule_for(&self, operation: &str) -> RateLimitRule {
        self.rules
            .get(operation)
            .copied()
            .unwrap_or(self.default_rule)
    }

    /// `check` with an explicit clock.
    pub fn check_at(&self, operation: &str, key: &str, now: Instant) -> Result<(), GameError> {
        self.check_all_at(operation, &[key.to_string()], now)
    }

    /// `check_all` with an explicit clock.
    ///
    /// Each key is checked under its own shard lock, then all are charged.
    /// Two racing requests may both pass the check for the last slot; the
    /// count can then exceed the limit by the number of racers.
    pub fn check_all_at(
        &self,
        operation: &str,
        keys: &[String],
        now: Instant,
    ) -> Result<(), GameError> {
        let rule = self.rule_for(operation);
        if rule.is_disabled() {
            return Ok(());
        }

        for key in keys {
            let Some(window) = self.windows.get(&(operation.to_string(), key.clone())) else {
                continue;
            };
            let elapsed = now.saturating_duration_since(window.started);
            if elapsed < rule.window() && window.count >= rule.max_requests {
                let remaining = rule.window().saturating_sub(elapsed);
                // Round up so clients never retry before the window closes.
                let retry_after_secs =
                    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                tracing::debug!(operation, key = %key, retry_after_secs, "rate limited");
                return Err(GameError::RateLimited {
                    retry_after_secs: retry_after_secs.max(1),
                });
            }
        }

        for key in keys {
            let mut window = self
                .windows
                .entry((operation.to_string(), key.clone()))
                .or_insert(Window {
                    started: now,
                    count: 0,
                });
            if now.saturating_duration_since(window.started) >= rule.window() {
                window.started = now;
                window.count = 0;
            }
            window.count += 1;
        }
        Ok(())
    }

    /// Drops counters whose window has closed. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|(operation, _), window| {
            let rule = self.rule_for(operation);
            now.saturating_duration_since(window.started) < rule.window()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of live counters.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, operation: &str, key: &str) -> Result<(), GameError> {
        self.check_at(operation, key, Instant::now())
    }

    fn check_all(&self, operation: &str, keys: &[String]) -> Result<(), GameError> {
        self.check_all_at(operation, keys, Instant::now())
    }
}
