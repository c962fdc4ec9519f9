//! Script registry: loads the three atomic decision scripts once per
//! process and memoizes their content-hashes. `redis::Script` computes
//! the hash client-side at construction time and transparently falls
//! back to `SCRIPT LOAD` + retry on `NOSCRIPT`, which is exactly the
//! "upload once, invoke by hash, re-upload-and-retry-exactly-once on a
//! lost cache" contract this registry exists to uphold.

use std::time::Duration;

use redis::aio::ConnectionLike;

use crate::error::{RateLimitError, RateLimitResult};
use crate::pool::with_socket_timeout;

const FIXED_WINDOW_SOURCE: &str = include_str!("fixed_window.lua");
const TOKEN_BUCKET_SOURCE: &str = include_str!("token_bucket.lua");
const SLIDING_WINDOW_SOURCE: &str = include_str!("sliding_window.lua");

/// One script's source plus its memoized content-hash.
pub(crate) struct ScriptHandle {
    source: &'static str,
    pub(crate) script: redis::Script,
}

impl ScriptHandle {
    fn new(source: &'static str) -> Self {
        Self {
            source,
            script: redis::Script::new(source),
        }
    }

    /// The content-hash `SCRIPT LOAD` would return for this source,
    /// computed client-side once at construction.
    pub(crate) fn hash(&self) -> &str {
        self.script.get_hash()
    }
}

/// Holds the three per-algorithm scripts for the lifetime of a limiter.
pub(crate) struct ScriptRegistry {
    pub(crate) fixed_window: ScriptHandle,
    pub(crate) token_bucket: ScriptHandle,
    pub(crate) sliding_window: ScriptHandle,
}

impl ScriptRegistry {
    pub(crate) fn new() -> Self {
        Self {
            fixed_window: ScriptHandle::new(FIXED_WINDOW_SOURCE),
            token_bucket: ScriptHandle::new(TOKEN_BUCKET_SOURCE),
            sliding_window: ScriptHandle::new(SLIDING_WINDOW_SOURCE),
        }
    }

    /// Upload every script once so its hash is cached store-side before
    /// the first decision is made. Not required for correctness (the
    /// per-call fallback handles a cold cache too) but avoids paying
    /// the upload cost on the hot path for the first caller. Each
    /// upload is bounded by `socket_timeout`, same as any other round
    /// trip.
    pub(crate) async fn preload<C>(&self, conn: &mut C, socket_timeout: Duration) -> RateLimitResult<()>
    where
        C: ConnectionLike + Send,
    {
        for source in [FIXED_WINDOW_SOURCE, TOKEN_BUCKET_SOURCE, SLIDING_WINDOW_SOURCE] {
            with_socket_timeout(socket_timeout, async {
                redis::cmd("SCRIPT")
                    .arg("LOAD")
                    .arg(source)
                    .query_async::<String>(&mut *conn)
                    .await
                    .map_err(|e| RateLimitError::backend(format!("script upload failed: {e}")))
            })
            .await?;
        }
        Ok(())
    }
}
