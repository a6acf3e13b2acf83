//! Addressable queues and topics
//!
//! A [`Destination`] names a queue or topic by its full URI. The URI is made of
//! a broker host (`tcp://localhost:61616`) and a path (`Orders`), which
//! [`DestinationUri`] splits apart so a destination can be rebound to another
//! broker during failover.

mod kind;
mod uri;

pub use kind::DestinationKind;
pub use uri::DestinationUri;

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A queue or topic on a broker
///
/// Equality and hashing use `(kind, uri)` only. Temporary destinations compare
/// equal to a physical destination of the same kind and URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    kind: DestinationKind,
    uri: String,
    name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    temporary: bool,
}

impl Destination {
    /// Create a destination of the given kind
    pub fn new(kind: DestinationKind, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let name = DestinationUri::parse(&uri).name().to_string();
        Self {
            kind,
            uri,
            name,
            temporary: false,
        }
    }

    /// Create a queue destination
    pub fn queue(uri: impl Into<String>) -> Self {
        Self::new(DestinationKind::Queue, uri)
    }

    /// Create a topic destination
    pub fn topic(uri: impl Into<String>) -> Self {
        Self::new(DestinationKind::Topic, uri)
    }

    /// Create a broker-provisioned temporary destination
    pub fn temporary(kind: DestinationKind, uri: impl Into<String>) -> Self {
        Self {
            temporary: true,
            ..Self::new(kind, uri)
        }
    }

    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    /// Full destination URI, including the broker host when known
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Last path segment of the URI
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn is_queue(&self) -> bool {
        self.kind == DestinationKind::Queue
    }

    pub fn is_topic(&self) -> bool {
        self.kind == DestinationKind::Topic
    }

    /// Split URI of this destination
    pub fn destination_uri(&self) -> DestinationUri {
        DestinationUri::parse(&self.uri)
    }

    /// Same destination bound to another broker host
    pub fn with_host(&self, host: &str) -> Self {
        let uri = self.destination_uri().with_host(host).uri();
        Self {
            kind: self.kind,
            name: self.name.clone(),
            temporary: self.temporary,
            uri,
        }
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.uri == other.uri
    }
}

impl Eq for Destination {}

impl Hash for Destination {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.uri.hash(state);
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.uri)
    }
}
