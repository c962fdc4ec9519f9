//! Connection pool: a bounded, idempotently-initialized pool of store
//! connections shared by every decision in a process.

use std::future::Future;
use std::time::Duration;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use tokio::sync::OnceCell;

use crate::config::RateLimiterConfig;
use crate::error::{RateLimitError, RateLimitResult};
use crate::scripts::ScriptRegistry;

/// The pooled connection type handed to a decision.
pub(crate) type PooledConnection<'a> = bb8::PooledConnection<'a, RedisConnectionManager>;

/// Bound a single store round trip by the configured per-operation
/// socket timeout, mapping an elapsed deadline into a backend failure
/// rather than letting a hung connection block a decision indefinitely.
/// A timeout is never converted into "allowed".
pub(crate) async fn with_socket_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = RateLimitResult<T>>,
) -> RateLimitResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(RateLimitError::backend(format!(
            "store operation timed out after {timeout:?}"
        ))),
    }
}

/// Lazily-built, idempotently-initialized pool plus the script registry
/// that was preloaded against it.
pub(crate) struct Backend {
    pool: Pool<RedisConnectionManager>,
    pub(crate) scripts: ScriptRegistry,
    socket_timeout: Duration,
}

impl Backend {
    pub(crate) async fn get(&self) -> RateLimitResult<PooledConnection<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| RateLimitError::backend(format!("connection pool exhausted: {e}")))
    }

    pub(crate) async fn ping(&self) -> RateLimitResult<()> {
        let mut conn = self.get().await?;
        with_socket_timeout(self.socket_timeout, async {
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RateLimitError::backend(format!("ping failed: {e}")))?;
            Ok(())
        })
        .await
    }
}

/// Builds [`Backend`] instances exactly once per handle, no matter how
/// many callers race to initialize it.
pub(crate) struct BackendInitializer {
    cell: OnceCell<Backend>,
}

impl BackendInitializer {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the shared backend, building it on the first call. Every
    /// concurrent caller observes the same pool; losers of the race
    /// await the winner's in-flight build rather than starting their
    /// own (`tokio::sync::OnceCell::get_or_try_init`).
    pub(crate) async fn get_or_init(&self, config: &RateLimiterConfig) -> RateLimitResult<&Backend> {
        self.cell
            .get_or_try_init(|| build_backend(config))
            .await
    }
}

async fn build_backend(config: &RateLimiterConfig) -> RateLimitResult<Backend> {
    let manager = RedisConnectionManager::new(config.redis_url.clone())
        .map_err(|e| RateLimitError::config(format!("invalid redis_url: {e}")))?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| RateLimitError::backend(format!("failed to build connection pool: {e}")))?;

    let scripts = ScriptRegistry::new();
    {
        let mut conn = pool
            .get()
            .await
            .map_err(|e| RateLimitError::backend(format!("connection pool exhausted: {e}")))?;
        with_socket_timeout(config.socket_timeout, async {
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RateLimitError::backend(format!("ping failed: {e}")))?;
            Ok(())
        })
        .await?;

        scripts.preload(&mut *conn, config.socket_timeout).await?;
    }

    Ok(Backend {
        pool,
        scripts,
        socket_timeout: config.socket_timeout,
    })
}
