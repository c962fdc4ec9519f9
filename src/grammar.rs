//! Rate grammar: parses textual limits such as `100/minute` into a
//! `(count, window_seconds)` pair.

use crate::error::{RateLimitError, RateLimitResult};

/// A parsed rate budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    /// Requests allowed per window.
    pub count: u64,
    /// Window size in seconds.
    pub window_seconds: u64,
}

impl RateSpec {
    /// Parse a rate string of the form `<integer>/<period>`.
    ///
    /// `period` is one of second(s), minute(s), hour(s), day(s),
    /// case-insensitive, with outer whitespace trimmed.
    pub fn parse(rate: &str) -> RateLimitResult<Self> {
        let trimmed = rate.trim().to_ascii_lowercase();

        let (count_str, period) = trimmed.split_once('/').ok_or_else(|| {
            RateLimitError::config(format!(
                "invalid rate string '{rate}': expected 'number/period' (e.g. '100/minute')"
            ))
        })?;

        if count_str.is_empty() || !count_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RateLimitError::config(format!(
                "invalid rate string '{rate}': count must be a non-negative integer"
            )));
        }

        let count: u64 = count_str
            .parse()
            .map_err(|_| RateLimitError::config(format!("invalid rate string '{rate}': count out of range")))?;

        let window_seconds = match period.trim_end_matches('s') {
            "second" => 1,
            "minute" => 60,
            "hour" => 3600,
            "day" => 86400,
            other => {
                return Err(RateLimitError::config(format!(
                    "invalid rate string '{rate}': unknown period '{other}'"
                )));
            }
        };

        Ok(Self {
            count,
            window_seconds,
        })
    }

    /// This rate's count scaled by 1000 for fixed-point store arithmetic.
    pub fn count_scaled(&self) -> u64 {
        self.count * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_period() {
        assert_eq!(
            RateSpec::parse("100/minute").unwrap(),
            RateSpec {
                count: 100,
                window_seconds: 60
            }
        );
        assert_eq!(RateSpec::parse("1/second").unwrap().window_seconds, 1);
        assert_eq!(RateSpec::parse("1/seconds").unwrap().window_seconds, 1);
        assert_eq!(RateSpec::parse("10/hour").unwrap().window_seconds, 3600);
        assert_eq!(RateSpec::parse("10/hours").unwrap().window_seconds, 3600);
        assert_eq!(RateSpec::parse("10/day").unwrap().window_seconds, 86400);
        assert_eq!(RateSpec::parse("10/days").unwrap().window_seconds, 86400);
    }

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(
            RateSpec::parse("  100/MINUTE  ").unwrap(),
            RateSpec {
                count: 100,
                window_seconds: 60
            }
        );
    }

    #[test]
    fn rejects_missing_slash() {
        assert!(RateSpec::parse("100minute").is_err());
    }

    #[test]
    fn rejects_non_digit_count() {
        assert!(RateSpec::parse("abc/minute").is_err());
        assert!(RateSpec::parse("-5/minute").is_err());
        assert!(RateSpec::parse("/minute").is_err());
    }

    #[test]
    fn rejects_unknown_period() {
        assert!(RateSpec::parse("100/fortnight").is_err());
    }

    #[test]
    fn zero_count_is_allowed() {
        assert_eq!(RateSpec::parse("0/second").unwrap().count, 0);
    }
}
