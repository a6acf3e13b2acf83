//! Failover policy for broker connections

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::values::duration_ms;

/// Alternate broker endpoints plus reconnect timing
///
/// Built before a connection is opened and read-only for the lifetime of an
/// attempt sequence. With no broker URIs, failover is disabled and the first
/// transport fault is fatal regardless of `max_reconnect_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailoverSettings {
    /// Candidate brokers, tried round-robin from index 0
    pub broker_uris: Vec<String>,
    /// Wait before the first retry
    #[serde(rename = "initialReconnectDelayMs", with = "duration_ms")]
    pub initial_reconnect_delay: Duration,
    /// Upper bound for the escalating wait between retries
    #[serde(rename = "maxReconnectDelayMs", with = "duration_ms")]
    pub max_reconnect_delay: Duration,
    /// Number of retries after the initial attempt; 0 means no retry
    pub max_reconnect_attempts: u32,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            broker_uris: Vec::new(),
            initial_reconnect_delay: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
        }
    }
}

impl FailoverSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failover over the given broker list
    pub fn with_broker_uris<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.broker_uris = uris.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_broker_uri(mut self, uri: impl Into<String>) -> Self {
        self.broker_uris.push(uri.into());
        self
    }

    pub fn with_initial_reconnect_delay(mut self, delay: Duration) -> Self {
        self.initial_reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// True when no alternate brokers are configured
    pub fn is_empty(&self) -> bool {
        self.broker_uris.is_empty()
    }

    /// Retries allowed after a transport fault
    pub fn retry_budget(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.max_reconnect_attempts
        }
    }

    /// Broker to use for retry `attempt` (1-based), cycling the list
    pub fn broker_uri_for_attempt(&self, attempt: u32) -> Option<&str> {
        if self.broker_uris.is_empty() || attempt == 0 {
            return None;
        }
        let index = (attempt as usize - 1) % self.broker_uris.len();
        self.broker_uris.get(index).map(String::as_str)
    }

    /// Wait before retry `attempt` (1-based): doubles from the initial delay,
    /// capped at the max delay
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_reconnect_delay
            .checked_mul(factor)
            .unwrap_or(self.max_reconnect_delay)
            .min(self.max_reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_starts_at_first_broker() {
        let settings = FailoverSettings::new().with_broker_uris(["tcp://a:1", "tcp://b:2"]);
        assert_eq!(settings.broker_uri_for_attempt(1), Some("tcp://a:1"));
        assert_eq!(settings.broker_uri_for_attempt(2), Some("tcp://b:2"));
        assert_eq!(settings.broker_uri_for_attempt(3), Some("tcp://a:1"));
        assert_eq!(settings.broker_uri_for_attempt(0), None);
    }

    #[test]
    fn test_empty_settings_disable_retry() {
        let settings = FailoverSettings::new().with_max_reconnect_attempts(10);
        assert!(settings.is_empty());
        assert_eq!(settings.retry_budget(), 0);
        assert_eq!(settings.broker_uri_for_attempt(1), None);
    }

    #[test]
    fn test_reconnect_delay_escalates_to_cap() {
        let settings = FailoverSettings::new()
            .with_initial_reconnect_delay(Duration::from_millis(100))
            .with_max_reconnect_delay(Duration::from_millis(350));

        assert_eq!(settings.reconnect_delay(1), Duration::from_millis(100));
        assert_eq!(settings.reconnect_delay(2), Duration::from_millis(200));
        assert_eq!(settings.reconnect_delay(3), Duration::from_millis(350));
        assert_eq!(settings.reconnect_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_deserialize_from_config() {
        let json = r#"{
            "brokerUris": ["tcp://backup:61616"],
            "initialReconnectDelayMs": 250,
            "maxReconnectAttempts": 3
        }"#;
        let settings: FailoverSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.broker_uris, vec!["tcp://backup:61616".to_string()]);
        assert_eq!(settings.initial_reconnect_delay, Duration::from_millis(250));
        assert_eq!(settings.max_reconnect_delay, Duration::from_secs(30));
        assert_eq!(settings.max_reconnect_attempts, 3);
    }
}
