//! # ratelimit-core
//!
//! Distributed, Redis-backed rate limiting with three algorithms, each
//! implemented as a single atomic server-side script so a check-and-decrement
//! never races another instance sharing the same store.
//!
//! ## Algorithms
//!
//! - **Fixed window** — a counter reset at aligned window boundaries.
//!   Simplest and cheapest; allows a burst of up to 2x the limit at a
//!   window edge.
//! - **Token bucket** — smoothly refilling capacity; allows bursts up to
//!   the bucket size, then throttles to the refill rate.
//! - **Sliding window** — a weighted blend of the current and previous
//!   aligned windows; bounds the edge burst the fixed window allows
//!   without the extra state a true sliding log would need.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ratelimit_core::{RateLimiter, RateLimiterConfig, RateSpec, CheckOptions, AlgorithmTag};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RateLimiterConfig::builder()
//!     .redis_url("redis://127.0.0.1:6379")
//!     .default_algorithm(AlgorithmTag::Sliding)
//!     .build()?;
//!
//! let limiter = RateLimiter::new(config);
//! let rate = RateSpec::parse("100/minute")?;
//!
//! match limiter.check_with_info("user:123", rate, CheckOptions::new()).await {
//!     Ok(result) => println!("allowed, {} remaining", result.remaining),
//!     Err(e) if e.is_exceeded() => println!("denied: retry after {:?}s", e.retry_after_secs()),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! All keys are composed as `prefix:identifier:tenant:suffix`, so the
//! same identifier checked under different `tenant_tag`s draws from
//! independent budgets. The store's own clock (`TIME`) is authoritative,
//! not the local host clock, so window alignment agrees across every
//! instance sharing the store.

mod algorithm;
mod clock;
mod config;
mod error;
mod grammar;
mod key;
mod limiter;
mod pool;
mod scripts;

pub use algorithm::AlgorithmTag;
pub use config::{redact_password, RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::{RateLimitError, RateLimitResult};
pub use grammar::RateSpec;
pub use limiter::{CheckOptions, CheckResult, RateLimiter, ResetScope, UsageSnapshot};
