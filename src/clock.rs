//! Clock source: the authoritative wall clock comes from the store's
//! `TIME` command, never the local host, so window alignment agrees
//! across every instance sharing the store regardless of host clock
//! skew.

use redis::aio::ConnectionLike;

use crate::error::{RateLimitError, RateLimitResult};

/// A store-clock reading: seconds and microseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTime {
    pub seconds: u64,
    pub micros: u64,
}

impl StoreTime {
    /// Millisecond-precision epoch timestamp, used by the token bucket
    /// script which needs sub-second granularity.
    pub fn as_millis(&self) -> u64 {
        self.seconds * 1000 + self.micros / 1000
    }
}

/// Read the store's wall clock via the `TIME` command.
pub async fn read_time<C>(conn: &mut C) -> RateLimitResult<StoreTime>
where
    C: ConnectionLike + Send,
{
    let (seconds, micros): (u64, u64) = redis::cmd("TIME")
        .query_async(conn)
        .await
        .map_err(|e| RateLimitError::backend(format!("TIME command failed: {e}")))?;

    Ok(StoreTime { seconds, micros })
}

/// The aligned window start (in epoch seconds) containing `epoch_seconds`
/// for a window of size `window_seconds`.
pub fn window_start(epoch_seconds: u64, window_seconds: u64) -> u64 {
    epoch_seconds - (epoch_seconds % window_seconds)
}
