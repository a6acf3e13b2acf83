//! Courier Core Domain
//!
//! Pure value types shared by every Courier crate: destinations, failover
//! policy, the normalized message envelope and the structured fault document.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod destination;
pub mod failover;
pub mod messages;
pub mod values;

// Re-export commonly used types at crate root
pub use destination::{Destination, DestinationKind, DestinationUri};
pub use failover::FailoverSettings;
pub use messages::{
    Fault, MAX_EXPIRATION, SERVICE_HOST_ADVISORY_TOPIC, ServiceHostAdvisory, TextMessage,
};
pub use values::{CorrelationId, MessageId, Timestamp};
