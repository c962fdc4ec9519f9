//! Integration tests against a real Redis instance.
//!
//! Run with `cargo test -- --ignored` once `REDIS_URL` (or the default
//! `redis://127.0.0.1:6379`) points at a reachable server.

use std::time::Duration;

use ratelimit_core::{AlgorithmTag, CheckOptions, RateLimiter, RateLimiterConfig, RateSpec, ResetScope};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_config(key_prefix: &str) -> RateLimiterConfig {
    init_tracing();
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RateLimiterConfig::builder()
        .redis_url(redis_url)
        .key_prefix(key_prefix)
        .build()
        .expect("valid test configuration")
}

fn unique_identifier(label: &str) -> String {
    format!("{label}:{}", std::process::id())
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn fixed_window_basic() {
    let limiter = RateLimiter::new(test_config("it-fixed-basic"));
    let rate = RateSpec::parse("5/second").unwrap();
    let identifier = unique_identifier("fixed-basic");
    let opts = CheckOptions::new().algorithm(AlgorithmTag::Fixed);

    for expected_remaining in [4u64, 3, 2, 1, 0] {
        let result = limiter
            .check_with_info(&identifier, rate, opts.clone())
            .await
            .expect("within budget");
        assert_eq!(result.remaining, expected_remaining);
    }

    let err = limiter
        .check_with_info(&identifier, rate, opts.clone())
        .await
        .expect_err("6th request must be denied");
    assert!(err.is_exceeded());
    assert_eq!(err.retry_after_secs(), Some(1));

    tokio::time::sleep(Duration::from_millis(1200)).await;

    let result = limiter
        .check_with_info(&identifier, rate, opts)
        .await
        .expect("window rolled over");
    assert!(result.allowed);
    assert_eq!(result.remaining, 4);
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn bucket_burst_then_drip() {
    let limiter = RateLimiter::new(test_config("it-bucket-burst"));
    let rate = RateSpec::parse("10/second").unwrap();
    let identifier = unique_identifier("bucket-burst");
    let opts = CheckOptions::new().algorithm(AlgorithmTag::Bucket);

    for _ in 0..10 {
        let result = limiter.check_with_info(&identifier, rate, opts.clone()).await;
        assert!(result.is_ok());
    }

    let err = limiter
        .check_with_info(&identifier, rate, opts.clone())
        .await
        .expect_err("11th request exceeds bucket capacity");
    assert_eq!(err.retry_after_secs(), Some(1));

    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut allowed_count = 0;
    for _ in 0..6 {
        if limiter.check_with_info(&identifier, rate, opts.clone()).await.is_ok() {
            allowed_count += 1;
        }
    }
    assert_eq!(allowed_count, 5);
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn sliding_window_no_boundary_burst() {
    let limiter = RateLimiter::new(test_config("it-sliding-burst"));
    let rate = RateSpec::parse("5/second").unwrap();
    let identifier = unique_identifier("sliding-burst");
    let opts = CheckOptions::new().algorithm(AlgorithmTag::Sliding);

    let mut admitted = 0;
    for _ in 0..5 {
        if limiter.check_with_info(&identifier, rate, opts.clone()).await.is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 5);

    let err = limiter
        .check_with_info(&identifier, rate, opts.clone())
        .await
        .expect_err("6th request denied at full capacity");
    assert!(err.is_exceeded());

    tokio::time::sleep(Duration::from_millis(1050)).await;

    let mut admitted_after_rollover = 0;
    for _ in 0..10 {
        if limiter.check_with_info(&identifier, rate, opts.clone()).await.is_ok() {
            admitted_after_rollover += 1;
        }
    }
    assert!(admitted_after_rollover < 10);
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn cost_greater_than_limit_is_denied_immediately() {
    let limiter = RateLimiter::new(test_config("it-cost-over-limit"));
    let rate = RateSpec::parse("10/minute").unwrap();
    let identifier = unique_identifier("cost-over-limit");
    let opts = CheckOptions::new().cost(15);

    let err = limiter
        .check_with_info(&identifier, rate, opts)
        .await
        .expect_err("cost above limit can never be admitted");
    assert!(err.is_exceeded());
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn concurrency_200_vs_50_limit_admits_exactly_50() {
    let limiter = std::sync::Arc::new(RateLimiter::new(test_config("it-concurrency")));
    let rate = RateSpec::parse("50/second").unwrap();
    let identifier = unique_identifier("concurrency");

    let mut handles = Vec::new();
    for _ in 0..200 {
        let limiter = limiter.clone();
        let identifier = identifier.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .check_with_info(&identifier, rate, CheckOptions::new())
                .await
                .is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 50);
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn reset_all_clears_every_algorithm() {
    let limiter = RateLimiter::new(test_config("it-reset-all"));
    let identifier = unique_identifier("reset-all");

    for algorithm in [AlgorithmTag::Fixed, AlgorithmTag::Bucket, AlgorithmTag::Sliding] {
        let rate = RateSpec::parse("1/minute").unwrap();
        let opts = CheckOptions::new().algorithm(algorithm);

        limiter.check_with_info(&identifier, rate, opts.clone()).await.unwrap();
        let err = limiter.check_with_info(&identifier, rate, opts).await;
        assert!(err.is_err(), "{algorithm:?} should be exhausted after one check");
    }

    limiter.reset(&identifier, ResetScope::All, None).await.unwrap();

    for algorithm in [AlgorithmTag::Fixed, AlgorithmTag::Bucket, AlgorithmTag::Sliding] {
        let rate = RateSpec::parse("1/minute").unwrap();
        let opts = CheckOptions::new().algorithm(algorithm);
        let result = limiter.check_with_info(&identifier, rate, opts).await;
        assert!(result.is_ok(), "{algorithm:?} should be admitted again after reset");
    }
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn tenant_isolation_gives_independent_counters() {
    let limiter = RateLimiter::new(test_config("it-tenant-isolation"));
    let rate = RateSpec::parse("1/minute").unwrap();
    let identifier = unique_identifier("tenant-isolation");

    let opts_p = CheckOptions::new().tenant_tag("tenant-p");
    let opts_q = CheckOptions::new().tenant_tag("tenant-q");

    assert!(limiter.check_with_info(&identifier, rate, opts_p.clone()).await.is_ok());
    assert!(limiter.check_with_info(&identifier, rate, opts_p).await.is_err());

    assert!(limiter.check_with_info(&identifier, rate, opts_q).await.is_ok());
}

#[tokio::test]
#[ignore = "Requires running Redis instance"]
async fn health_reports_reachable_store() {
    let limiter = RateLimiter::new(test_config("it-health"));
    assert!(limiter.health().await.unwrap());
}
