//! Instrumentation for resources handed out by the simulator
//!
//! Every connection, session, producer and consumer gets a [`ResourceStats`]
//! entry, in creation order. Tests use the counters to verify that each
//! resource is disposed exactly once and to inspect what was sent.

use courier_core::TextMessage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::model::ResourceKind;

/// Counters for one simulated resource
#[derive(Debug)]
pub struct ResourceStats {
    id: u64,
    kind: ResourceKind,
    /// Connection URI or destination URI
    label: String,
    dispose_count: AtomicU32,
    commit_count: AtomicU32,
    rollback_count: AtomicU32,
    sent: Mutex<Vec<TextMessage>>,
}

impl ResourceStats {
    fn new(id: u64, kind: ResourceKind, label: String) -> Self {
        Self {
            id,
            kind,
            label,
            dispose_count: AtomicU32::new(0),
            commit_count: AtomicU32::new(0),
            rollback_count: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dispose_count(&self) -> u32 {
        self.dispose_count.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> u32 {
        self.commit_count.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u32 {
        self.rollback_count.load(Ordering::SeqCst)
    }

    /// Messages sent through this resource (producer history for sessions)
    pub fn sent(&self) -> Vec<TextMessage> {
        self.sent.lock().clone()
    }

    pub(crate) fn record_dispose(&self) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_commit(&self) {
        self.commit_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rollback(&self) {
        self.rollback_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_send(&self, message: &TextMessage) {
        self.sent.lock().push(message.clone());
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    connection_attempts: Mutex<Vec<String>>,
    resources: Mutex<Vec<Arc<ResourceStats>>>,
}

/// Shared record of everything the simulator created
///
/// Cheap to clone; clones observe the same records.
#[derive(Debug, Clone, Default)]
pub struct SimRegistry {
    inner: Arc<RegistryInner>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_attempt(&self, uri: &str) {
        self.inner.connection_attempts.lock().push(uri.to_string());
    }

    pub(crate) fn register(&self, kind: ResourceKind, label: impl Into<String>) -> Arc<ResourceStats> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stats = Arc::new(ResourceStats::new(id, kind, label.into()));
        self.inner.resources.lock().push(Arc::clone(&stats));
        stats
    }

    /// Every connection attempt in order, including failed ones
    pub fn connection_attempts(&self) -> Vec<String> {
        self.inner.connection_attempts.lock().clone()
    }

    /// Every resource created, in creation order
    pub fn resources(&self) -> Vec<Arc<ResourceStats>> {
        self.inner.resources.lock().clone()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> Vec<Arc<ResourceStats>> {
        self.inner
            .resources
            .lock()
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn connections(&self) -> Vec<Arc<ResourceStats>> {
        self.of_kind(ResourceKind::Connection)
    }

    pub fn sessions(&self) -> Vec<Arc<ResourceStats>> {
        self.of_kind(ResourceKind::Session)
    }

    pub fn producers(&self) -> Vec<Arc<ResourceStats>> {
        self.of_kind(ResourceKind::Producer)
    }

    pub fn consumers(&self) -> Vec<Arc<ResourceStats>> {
        self.of_kind(ResourceKind::Consumer)
    }

    /// Resources whose dispose count is not exactly one
    pub fn disposal_violations(&self) -> Vec<Arc<ResourceStats>> {
        self.inner
            .resources
            .lock()
            .iter()
            .filter(|r| r.dispose_count() != 1)
            .cloned()
            .collect()
    }

    /// Total commits across all sessions
    pub fn total_commits(&self) -> u32 {
        self.sessions().iter().map(|s| s.commit_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_in_order() {
        let registry = SimRegistry::new();
        let conn = registry.register(ResourceKind::Connection, "tcp://a:1");
        let session = registry.register(ResourceKind::Session, "tcp://a:1");

        assert_eq!(registry.resources().len(), 2);
        assert!(conn.id() < session.id());
        assert_eq!(registry.connections().len(), 1);
        assert_eq!(registry.sessions().len(), 1);
    }

    #[test]
    fn test_disposal_violations() {
        let registry = SimRegistry::new();
        let once = registry.register(ResourceKind::Producer, "q");
        let twice = registry.register(ResourceKind::Producer, "q");
        let _never = registry.register(ResourceKind::Consumer, "q");

        once.record_dispose();
        twice.record_dispose();
        twice.record_dispose();

        let violations = registry.disposal_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|r| r.id() != once.id()));
    }
}
