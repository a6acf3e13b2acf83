use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Connected,
    Failed(String),
}

/// One recorded connection attempt
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub uri: String,
    /// 0 for the initial attempt, otherwise the 1-based retry number
    pub retry: u32,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

impl ConnectionAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Connected
    }
}

/// Ordered log of connection attempts made by connection managers
///
/// Clones share the same log, so one registry can be handed to several
/// managers and inspected afterwards.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    attempts: Arc<Mutex<Vec<ConnectionAttempt>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, uri: &str, retry: u32, outcome: AttemptOutcome) {
        self.attempts.lock().push(ConnectionAttempt {
            uri: uri.to_string(),
            retry,
            outcome,
            at: Utc::now(),
        });
    }

    pub fn attempts(&self) -> Vec<ConnectionAttempt> {
        self.attempts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.lock().is_empty()
    }

    /// Target URIs in attempt order
    pub fn uris(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|a| a.uri.clone()).collect()
    }

    pub fn failures(&self) -> usize {
        self.attempts.lock().iter().filter(|a| !a.succeeded()).count()
    }
}
