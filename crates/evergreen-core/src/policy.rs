//! Renewal policy - proactive lead time, poll cadence, and the retry
//! backoff ladder.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default proactive-renewal lead: renew five minutes before expiry.
pub const DEFAULT_REFRESH_LEAD_MS: i64 = 300_000;

/// Default liveness poll cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;

/// Default delay before the first retry after a failed renewal.
pub const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Default ceiling for the retry backoff ladder.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Default bound on consecutive failed renewal attempts per cycle.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Cap on the doubling exponent; keeps the shift far inside u64 range and
/// any realistic ladder saturated well before it.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Scheduling knobs for the session lifecycle manager.
///
/// Field names on the wire are the camelCase options recognized across the
/// API's clients:
///
/// ```json
/// { "refreshLeadMs": 300000, "pollIntervalMs": 30000,
///   "initialRetryDelayMs": 1000, "maxRetryDelayMs": 30000, "maxRetries": 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshPolicy {
    /// How long before expiry a proactive renewal becomes due, in
    /// milliseconds.
    pub refresh_lead_ms: i64,
    /// Cadence of the refresh-independent liveness poll, in milliseconds.
    pub poll_interval_ms: u64,
    /// Delay before the first retry after a failed renewal, in
    /// milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Ceiling on the retry delay, in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Consecutive failed attempts tolerated before exhaustion handling
    /// runs. The first attempt is not a retry, so a cycle makes at most
    /// `max_retries + 1` calls.
    pub max_retries: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            refresh_lead_ms: DEFAULT_REFRESH_LEAD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            initial_retry_delay_ms: DEFAULT_INITIAL_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RefreshPolicy {
    /// Returns the policy with degenerate values clamped to usable ones.
    ///
    /// A zero poll interval or retry delay would spin the scheduler; a
    /// ceiling below the initial delay would make the ladder
    /// non-monotonic.
    #[must_use]
    pub fn validated(mut self) -> Self {
        if self.refresh_lead_ms < 0 {
            self.refresh_lead_ms = 0;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.initial_retry_delay_ms == 0 {
            self.initial_retry_delay_ms = 1;
        }
        if self.max_retry_delay_ms < self.initial_retry_delay_ms {
            self.max_retry_delay_ms = self.initial_retry_delay_ms;
        }
        self
    }

    /// Backoff delay for the given retry (1-based): the initial delay
    /// doubled per consecutive failure, capped at the ceiling.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay_ms = self
            .initial_retry_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Liveness poll cadence as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let policy = RefreshPolicy::default();

        assert_eq!(policy.refresh_lead_ms, 300_000);
        assert_eq!(policy.poll_interval_ms, 30_000);
        assert_eq!(policy.initial_retry_delay_ms, 1_000);
        assert_eq!(policy.max_retry_delay_ms, 30_000);
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn test_backoff_ladder_doubles_then_caps() {
        let policy = RefreshPolicy::default();

        let delays: Vec<u64> = (1..=7)
            .map(|retry| policy.backoff_delay(retry).as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn test_backoff_stays_capped_for_large_retry_counts() {
        let policy = RefreshPolicy::default();

        assert_eq!(policy.backoff_delay(40), Duration::from_millis(30_000));
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_respects_custom_ceiling() {
        let policy = RefreshPolicy {
            initial_retry_delay_ms: 1_000,
            max_retry_delay_ms: 2_500,
            ..RefreshPolicy::default()
        };

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2_500));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(2_500));
    }

    #[test]
    fn test_backoff_retry_zero_behaves_like_first_retry() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.backoff_delay(0), policy.backoff_delay(1));
    }

    #[test]
    fn test_validated_clamps_degenerate_values() {
        let policy = RefreshPolicy {
            refresh_lead_ms: -5,
            poll_interval_ms: 0,
            initial_retry_delay_ms: 0,
            max_retry_delay_ms: 0,
            max_retries: 0,
        }
        .validated();

        assert_eq!(policy.refresh_lead_ms, 0);
        assert_eq!(policy.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(policy.initial_retry_delay_ms, 1);
        assert_eq!(policy.max_retry_delay_ms, 1);
        // A zero retry bound is legal: the first failure exhausts the cycle.
        assert_eq!(policy.max_retries, 0);
    }

    #[test]
    fn test_validated_keeps_sane_values_untouched() {
        let policy = RefreshPolicy::default().validated();
        assert_eq!(policy, RefreshPolicy::default());
    }

    #[test]
    fn test_deserializes_from_empty_object() {
        let policy: RefreshPolicy = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(policy, RefreshPolicy::default());
    }

    #[test]
    fn test_deserializes_partial_overrides() {
        let policy: RefreshPolicy =
            serde_json::from_str(r#"{ "maxRetries": 2, "initialRetryDelayMs": 500 }"#)
                .expect("deserialize");

        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_retry_delay_ms, 500);
        assert_eq!(policy.refresh_lead_ms, DEFAULT_REFRESH_LEAD_MS);
        assert_eq!(policy.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_serializes_with_camel_case_names() {
        let json = serde_json::to_value(RefreshPolicy::default()).expect("serialize");

        assert_eq!(json["refreshLeadMs"], 300_000);
        assert_eq!(json["pollIntervalMs"], 30_000);
        assert_eq!(json["initialRetryDelayMs"], 1_000);
        assert_eq!(json["maxRetryDelayMs"], 30_000);
        assert_eq!(json["maxRetries"], 5);
    }
}
