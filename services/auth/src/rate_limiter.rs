//! Fixed-window rate limiter
//!
//! Every request increments a counter keyed `rl:{scope}:{identity}:{window}`
//! in a shared cache, where `window = floor(now / window_size)`. Counters get
//! a TTL of two windows on first increment so stale keys expire by
//! themselves. A client can burst up to twice its limit across a window
//! boundary; that is accepted in exchange for one atomic increment per
//! request.

use async_trait::async_trait;
use common::{
    cache::RedisPool,
    error::{CacheError, CacheResult},
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    config::{FailMode, RateLimitConfig},
    error::{AuthError, AuthResult},
};

/// Shared counter storage
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the new count; the TTL applies only when
    /// this increment created the key
    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64>;
}

#[async_trait]
impl CounterStore for RedisPool {
    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        self.incr_with_expiry(key, ttl_secs).await
    }
}

/// Expired counters are swept from the whole table once per this many increments
const SWEEP_EVERY: u64 = 1024;

#[derive(Default)]
struct CounterTable {
    counters: HashMap<String, (u64, Instant)>,
    increments: u64,
}

/// Counter store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    table: Arc<Mutex<CounterTable>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counters currently held, expired or not
    pub async fn len(&self) -> usize {
        self.table.lock().await.counters.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl_secs: u64) -> CacheResult<u64> {
        let mut guard = self.table.lock().await;
        let table = &mut *guard;
        let now = Instant::now();

        table.increments += 1;
        if table.increments % SWEEP_EVERY == 0 {
            table.counters.retain(|_, (_, expires)| *expires > now);
        }

        let fresh = (1, now + Duration::from_secs(ttl_secs));
        let count = match table.counters.get_mut(key) {
            Some(entry) if entry.1 > now => {
                entry.0 += 1;
                entry.0
            }
            Some(entry) => {
                *entry = fresh;
                1
            }
            None => {
                table.counters.insert(key.to_string(), fresh);
                1
            }
        };
        Ok(count)
    }
}

/// Whose budget a request is charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    /// Anonymous traffic, keyed by client IP
    Ip,
    /// Authenticated traffic, keyed by user id
    User,
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateScope::Ip => f.write_str("ip"),
            RateScope::User => f.write_str("user"),
        }
    }
}

/// Quota left after an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the current window closes
    pub reset_after_secs: u64,
}

/// Rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            config: config.clone(),
        }
    }

    pub fn limit_for(&self, scope: RateScope) -> u64 {
        match scope {
            RateScope::Ip => self.config.ip_limit,
            RateScope::User => self.config.user_limit,
        }
    }

    /// Charge one request to `identity`
    ///
    /// Returns the remaining quota, `None` when the cache is down and the
    /// limiter is configured to fail open, or `AuthError::RateLimited` once
    /// the window's budget is spent.
    pub async fn check(
        &self,
        scope: RateScope,
        identity: &str,
    ) -> AuthResult<Option<RateLimitStatus>> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.check_at(scope, identity, now_ms).await
    }

    /// Same as [`RateLimiter::check`] at an explicit time in epoch milliseconds
    pub async fn check_at(
        &self,
        scope: RateScope,
        identity: &str,
        now_ms: u64,
    ) -> AuthResult<Option<RateLimitStatus>> {
        let window_ms = self.config.window_secs * 1000;
        let window = now_ms / window_ms;
        let key = format!("rl:{}:{}:{}", scope, identity, window);

        let count = match self.store.increment(&key, self.config.window_secs * 2).await {
            Ok(count) => count,
            Err(e) => return self.on_store_failure(e),
        };

        let limit = self.limit_for(scope);
        let window_end_ms = (window + 1) * window_ms;
        let reset_after_secs = (window_end_ms - now_ms).div_ceil(1000).max(1);

        if count > limit {
            info!(
                scope = %scope,
                identity,
                count,
                limit,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited {
                retry_after: reset_after_secs,
            });
        }

        Ok(Some(RateLimitStatus {
            limit,
            remaining: limit - count,
            reset_after_secs,
        }))
    }

    fn on_store_failure(&self, err: CacheError) -> AuthResult<Option<RateLimitStatus>> {
        match self.config.fail_mode {
            FailMode::Open => {
                warn!("Rate limit cache unavailable, request not metered: {}", err);
                Ok(None)
            }
            FailMode::Closed => {
                error!("Rate limit cache unavailable: {}", err);
                Err(AuthError::DependencyUnavailable(err.to_string()))
            }
        }
    }
}
