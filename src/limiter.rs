//! The limiter facade: the single public entry point. Scales inputs up
//! by 1000 on the way in, scales results down on the way out, and
//! converts denial into a structured rejection.

use redis::AsyncCommands;
use tracing::{debug, trace, warn};

use crate::algorithm::AlgorithmTag;
use crate::clock::{self, StoreTime};
use crate::config::RateLimiterConfig;
use crate::error::{RateLimitError, RateLimitResult};
use crate::grammar::RateSpec;
use crate::key;
use crate::pool::{with_socket_timeout, Backend, BackendInitializer, PooledConnection};

/// The four window sizes the rate grammar can ever produce. A sweep
/// over these four covers every key a caller could have created,
/// without needing to know which rate was in effect for this identifier.
const STANDARD_WINDOWS: [u64; 4] = [1, 60, 3600, 86400];

/// Options for a single `check`/`check_with_info` call.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Algorithm to use; defaults to the limiter's configured default.
    pub algorithm: Option<AlgorithmTag>,
    /// Tenant tag partitioning this identifier's counters; defaults to `"default"`.
    pub tenant_tag: Option<String>,
    /// Cost of this request against the budget; defaults to 1.
    pub cost: u64,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            algorithm: None,
            tenant_tag: None,
            cost: 1,
        }
    }
}

impl CheckOptions {
    /// Start from the defaults (`cost = 1`, default algorithm, default tenant).
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the algorithm for this call.
    pub fn algorithm(mut self, algorithm: AlgorithmTag) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Set the tenant tag for this call.
    pub fn tenant_tag(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_tag = Some(tenant.into());
        self
    }

    /// Set the cost for this call.
    pub fn cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }
}

/// Which algorithm(s) a `reset` call should clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    /// Clear fixed-window, bucket, and sliding state.
    All,
    /// Clear only the named algorithm's state.
    Only(AlgorithmTag),
}

/// Decision plus usage, returned by `check_with_info`.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub retry_after_seconds: u64,
    pub window_seconds: u64,
}

/// A point-in-time usage report, shaped per algorithm.
#[derive(Debug, Clone)]
pub enum UsageSnapshot {
    Fixed {
        current: u64,
        limit: u64,
        remaining: u64,
        ttl_seconds: u64,
        window_seconds: u64,
    },
    Bucket {
        tokens: u64,
        limit: u64,
        remaining: u64,
        ttl_seconds: u64,
        window_seconds: u64,
    },
    Sliding {
        current: u64,
        limit: u64,
        remaining: u64,
        current_window: u64,
        previous_window: u64,
        weight: u32,
        window_seconds: u64,
        ttl_seconds: u64,
    },
}

/// The distributed rate limiter. Construction is free of I/O; the
/// connection pool and script registry are built once, lazily and
/// idempotently, on first use. Share one instance (behind an `Arc` if
/// needed across tasks) rather than constructing a new one per call.
pub struct RateLimiter {
    config: RateLimiterConfig,
    backend: BackendInitializer,
}

impl RateLimiter {
    /// Construct a limiter from its configuration. No I/O happens here:
    /// the connection pool and script registry are built lazily, and
    /// idempotently, on the first call that needs the store.
    pub fn new(config: RateLimiterConfig) -> Self {
        debug!(redis_url = %config.redacted_url(), "rate limiter configured");
        Self {
            config,
            backend: BackendInitializer::new(),
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    async fn backend(&self) -> RateLimitResult<&Backend> {
        self.backend.get_or_init(&self.config).await
    }

    fn tenant<'a>(opts_tenant: &'a Option<String>) -> &'a str {
        opts_tenant.as_deref().unwrap_or("default")
    }

    /// Check whether a request is admitted. Returns `Ok(())` when
    /// admitted, or `Err(RateLimitError::RateLimitExceeded { .. })` when
    /// denied — the same single round-trip `check_with_info` performs.
    pub async fn check(
        &self,
        identifier: &str,
        rate: RateSpec,
        opts: CheckOptions,
    ) -> RateLimitResult<()> {
        self.check_with_info(identifier, rate, opts).await?;
        Ok(())
    }

    /// Check and return full decision info. On denial, raises the same
    /// error `check` would, already populated from the script result.
    pub async fn check_with_info(
        &self,
        identifier: &str,
        rate: RateSpec,
        opts: CheckOptions,
    ) -> RateLimitResult<CheckResult> {
        let algorithm = opts.algorithm.unwrap_or(self.config.default_algorithm);
        let tenant = Self::tenant(&opts.tenant_tag);
        let cost = opts.cost;

        trace!(identifier = %identifier, tenant = %tenant, algorithm = ?algorithm, cost, "checking rate limit");

        let backend = self.backend().await?;
        let mut conn = backend.get().await?;
        let now = with_socket_timeout(self.config.socket_timeout, clock::read_time(&mut *conn)).await?;

        let (allowed, remaining_scaled, retry_after_ms) = match algorithm {
            AlgorithmTag::Fixed => {
                Self::decide_fixed(&self.config, backend, &mut conn, identifier, tenant, rate, cost, now)
                    .await?
            }
            AlgorithmTag::Bucket => {
                Self::decide_bucket(&self.config, backend, &mut conn, identifier, tenant, rate, cost, now)
                    .await?
            }
            AlgorithmTag::Sliding => {
                Self::decide_sliding(&self.config, backend, &mut conn, identifier, tenant, rate, cost, now)
                    .await?
            }
        };

        let remaining = remaining_scaled / 1000;

        if allowed {
            debug!(identifier = %identifier, algorithm = ?algorithm, remaining, "request allowed");
            Ok(CheckResult {
                allowed: true,
                limit: rate.count,
                remaining,
                retry_after_seconds: 0,
                window_seconds: rate.window_seconds,
            })
        } else {
            warn!(identifier = %identifier, algorithm = ?algorithm, "request denied");
            Err(RateLimitError::exceeded(retry_after_ms, rate.count))
        }
    }

    async fn decide_fixed(
        config: &RateLimiterConfig,
        backend: &Backend,
        conn: &mut PooledConnection<'_>,
        identifier: &str,
        tenant: &str,
        rate: RateSpec,
        cost: u64,
        now: StoreTime,
    ) -> RateLimitResult<(bool, u64, i64)> {
        let window_start = clock::window_start(now.seconds, rate.window_seconds);
        let window_end = window_start + rate.window_seconds;
        let full_key = key::compose(&config.key_prefix, identifier, tenant, &window_start.to_string());

        let (allowed, remaining, ttl_ms): (i64, i64, i64) = with_socket_timeout(config.socket_timeout, async {
            backend
                .scripts
                .fixed_window
                .script
                .key(&full_key)
                .arg(rate.count_scaled())
                .arg(rate.window_seconds)
                .arg(window_end)
                .arg(cost * 1000)
                .invoke_async(&mut **conn)
                .await
                .map_err(|e| RateLimitError::backend(format!("fixed window script failed: {e}")))
        })
        .await?;

        Ok((allowed == 1, remaining.max(0) as u64, ttl_ms))
    }

    async fn decide_bucket(
        config: &RateLimiterConfig,
        backend: &Backend,
        conn: &mut PooledConnection<'_>,
        identifier: &str,
        tenant: &str,
        rate: RateSpec,
        cost: u64,
        now: StoreTime,
    ) -> RateLimitResult<(bool, u64, i64)> {
        let full_key = key::compose(&config.key_prefix, identifier, tenant, AlgorithmTag::Bucket.key_suffix());
        let refill_per_sec_scaled = rate.count_scaled() / rate.window_seconds;

        let (allowed, remaining, retry_after_ms): (i64, i64, i64) = with_socket_timeout(config.socket_timeout, async {
            backend
                .scripts
                .token_bucket
                .script
                .key(&full_key)
                .arg(rate.count_scaled())
                .arg(refill_per_sec_scaled)
                .arg(rate.window_seconds)
                .arg(now.as_millis())
                .arg(cost * 1000)
                .invoke_async(&mut **conn)
                .await
                .map_err(|e| RateLimitError::backend(format!("token bucket script failed: {e}")))
        })
        .await?;

        Ok((allowed == 1, remaining.max(0) as u64, retry_after_ms))
    }

    async fn decide_sliding(
        config: &RateLimiterConfig,
        backend: &Backend,
        conn: &mut PooledConnection<'_>,
        identifier: &str,
        tenant: &str,
        rate: RateSpec,
        cost: u64,
        now: StoreTime,
    ) -> RateLimitResult<(bool, u64, i64)> {
        let window_start = clock::window_start(now.seconds, rate.window_seconds);
        let prev_start = window_start.saturating_sub(rate.window_seconds);

        let current_key = key::compose(
            &config.key_prefix,
            identifier,
            tenant,
            &format!("sliding:{window_start}"),
        );
        let previous_key = key::compose(
            &config.key_prefix,
            identifier,
            tenant,
            &format!("sliding:{prev_start}"),
        );

        let (allowed, remaining, retry_after_ms): (i64, i64, i64) = with_socket_timeout(config.socket_timeout, async {
            backend
                .scripts
                .sliding_window
                .script
                .key(&current_key)
                .key(&previous_key)
                .arg(rate.count_scaled())
                .arg(rate.window_seconds)
                .arg(now.seconds)
                .arg(cost * 1000)
                .invoke_async(&mut **conn)
                .await
                .map_err(|e| RateLimitError::backend(format!("sliding window script failed: {e}")))
        })
        .await?;

        Ok((allowed == 1, remaining.max(0) as u64, retry_after_ms))
    }

    /// Delete state for the given algorithm(s). `ResetScope::All` sweeps
    /// fixed-window and sliding keys across every window size the rate
    /// grammar can produce ({1, 60, 3600, 86400}s), plus the bucket key.
    pub async fn reset(
        &self,
        identifier: &str,
        scope: ResetScope,
        tenant_tag: Option<&str>,
    ) -> RateLimitResult<()> {
        let tenant = tenant_tag.unwrap_or("default");
        debug!(identifier = %identifier, tenant = %tenant, scope = ?scope, "resetting rate limit state");

        let backend = self.backend().await?;
        let mut conn = backend.get().await?;
        let now = with_socket_timeout(self.config.socket_timeout, clock::read_time(&mut *conn)).await?;

        let reset_fixed = matches!(scope, ResetScope::All | ResetScope::Only(AlgorithmTag::Fixed));
        let reset_bucket = matches!(scope, ResetScope::All | ResetScope::Only(AlgorithmTag::Bucket));
        let reset_sliding = matches!(scope, ResetScope::All | ResetScope::Only(AlgorithmTag::Sliding));

        let mut keys: Vec<String> = Vec::new();

        if reset_fixed {
            for window_seconds in STANDARD_WINDOWS {
                let window_start = clock::window_start(now.seconds, window_seconds);
                keys.push(key::compose(
                    &self.config.key_prefix,
                    identifier,
                    tenant,
                    &window_start.to_string(),
                ));
            }
        }

        if reset_bucket {
            keys.push(key::compose(
                &self.config.key_prefix,
                identifier,
                tenant,
                AlgorithmTag::Bucket.key_suffix(),
            ));
        }

        if reset_sliding {
            for window_seconds in STANDARD_WINDOWS {
                let window_start = clock::window_start(now.seconds, window_seconds);
                let prev_start = window_start.saturating_sub(window_seconds);
                keys.push(key::compose(
                    &self.config.key_prefix,
                    identifier,
                    tenant,
                    &format!("sliding:{window_start}"),
                ));
                keys.push(key::compose(
                    &self.config.key_prefix,
                    identifier,
                    tenant,
                    &format!("sliding:{prev_start}"),
                ));
            }
        }

        if !keys.is_empty() {
            with_socket_timeout(self.config.socket_timeout, async {
                conn.del::<_, ()>(keys)
                    .await
                    .map_err(|e| RateLimitError::backend(format!("reset failed: {e}")))
            })
            .await?;
        }

        Ok(())
    }

    /// Read-only usage projection for a single algorithm. Never mutates
    /// store state.
    pub async fn get_usage(
        &self,
        identifier: &str,
        rate: RateSpec,
        algorithm: AlgorithmTag,
        tenant_tag: Option<&str>,
    ) -> RateLimitResult<UsageSnapshot> {
        let tenant = tenant_tag.unwrap_or("default");
        let backend = self.backend().await?;
        let mut conn = backend.get().await?;
        let now = with_socket_timeout(self.config.socket_timeout, clock::read_time(&mut *conn)).await?;

        match algorithm {
            AlgorithmTag::Fixed => {
                let window_start = clock::window_start(now.seconds, rate.window_seconds);
                let full_key = key::compose(&self.config.key_prefix, identifier, tenant, &window_start.to_string());

                let (current_scaled, ttl): (Option<i64>, i64) = with_socket_timeout(self.config.socket_timeout, async {
                    let mut pipe = redis::pipe();
                    pipe.get(&full_key).ttl(&full_key);
                    pipe.query_async(&mut *conn)
                        .await
                        .map_err(|e| RateLimitError::backend(format!("usage read failed: {e}")))
                })
                .await?;
                let current_scaled = current_scaled.unwrap_or(0).max(0) as u64;

                let current = current_scaled / 1000;
                let remaining = rate.count.saturating_sub(current);

                Ok(UsageSnapshot::Fixed {
                    current,
                    limit: rate.count,
                    remaining,
                    ttl_seconds: ttl.max(0) as u64,
                    window_seconds: rate.window_seconds,
                })
            }
            AlgorithmTag::Bucket => {
                let full_key = key::compose(&self.config.key_prefix, identifier, tenant, AlgorithmTag::Bucket.key_suffix());

                let (tokens_scaled, last_refill_ms, ttl): (Option<i64>, Option<i64>, i64) =
                    with_socket_timeout(self.config.socket_timeout, async {
                        let mut pipe = redis::pipe();
                        pipe.hget(&full_key, "tokens")
                            .hget(&full_key, "last_refill_ms")
                            .ttl(&full_key);
                        pipe.query_async(&mut *conn)
                            .await
                            .map_err(|e| RateLimitError::backend(format!("usage read failed: {e}")))
                    })
                    .await?;

                let max_tokens_scaled = rate.count_scaled() as i64;
                let refill_per_sec_scaled = (rate.count_scaled() / rate.window_seconds) as i64;

                let tokens_scaled = match (tokens_scaled, last_refill_ms) {
                    (Some(tokens), Some(last_refill_ms)) => {
                        let elapsed_ms = (now.as_millis() as i64 - last_refill_ms).max(0);
                        let refilled = if refill_per_sec_scaled > 0 {
                            refill_per_sec_scaled * elapsed_ms / 1000
                        } else {
                            0
                        };
                        (tokens + refilled).min(max_tokens_scaled)
                    }
                    _ => max_tokens_scaled,
                };

                let tokens = (tokens_scaled.max(0) as u64) / 1000;

                Ok(UsageSnapshot::Bucket {
                    tokens,
                    limit: rate.count,
                    remaining: tokens,
                    ttl_seconds: ttl.max(0) as u64,
                    window_seconds: rate.window_seconds,
                })
            }
            AlgorithmTag::Sliding => {
                let window_start = clock::window_start(now.seconds, rate.window_seconds);
                let prev_start = window_start.saturating_sub(rate.window_seconds);
                let elapsed = now.seconds - window_start;

                let current_key = key::compose(
                    &self.config.key_prefix,
                    identifier,
                    tenant,
                    &format!("sliding:{window_start}"),
                );
                let previous_key = key::compose(
                    &self.config.key_prefix,
                    identifier,
                    tenant,
                    &format!("sliding:{prev_start}"),
                );

                let (current_scaled, previous_scaled, ttl): (Option<i64>, Option<i64>, i64) =
                    with_socket_timeout(self.config.socket_timeout, async {
                        let mut pipe = redis::pipe();
                        pipe.get(&current_key).get(&previous_key).ttl(&current_key);
                        pipe.query_async(&mut *conn)
                            .await
                            .map_err(|e| RateLimitError::backend(format!("usage read failed: {e}")))
                    })
                    .await?;

                let current_scaled = current_scaled.unwrap_or(0).max(0) as u64;
                let previous_scaled = previous_scaled.unwrap_or(0).max(0) as u64;

                let weight = ((rate.window_seconds - elapsed) * 1000 / rate.window_seconds) as u32;
                let weighted = current_scaled + (previous_scaled * weight as u64) / 1000;

                let current = current_scaled / 1000;
                let limit = rate.count;
                let remaining = limit.saturating_sub(weighted / 1000);

                Ok(UsageSnapshot::Sliding {
                    current,
                    limit,
                    remaining,
                    current_window: window_start,
                    previous_window: prev_start,
                    weight,
                    window_seconds: rate.window_seconds,
                    ttl_seconds: ttl.max(0) as u64,
                })
            }
        }
    }

    /// Ping the store. Returns `Ok(true)` when reachable, the error
    /// otherwise (never silently returns `false` for a real backend
    /// failure — callers that want a boolean can `.unwrap_or(false)`).
    pub async fn health(&self) -> RateLimitResult<bool> {
        let backend = self.backend().await?;
        backend.ping().await?;
        Ok(true)
    }
}
