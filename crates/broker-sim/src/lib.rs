//! Courier Broker Simulator
//!
//! An in-process implementation of the broker SDK ports. It behaves like a
//! conventional transacted-queue broker (queues, topics, durable
//! subscriptions, temporary destinations, commit/rollback with redelivery)
//! and records every resource it hands out so tests can assert on creation
//! and disposal counts.
//!
//! ```text
//! SimConnectionFactory ──creates──▶ SimConnection ──▶ SimSession ──▶ SimProducer
//!         │                              │                 └──────▶ SimConsumer
//!         │ records                      │ severs
//!         ▼                              ▼
//!    SimRegistry                   InMemoryBroker (queues, subscriptions)
//! ```

// Application layer
pub mod application;

// Infrastructure layer
pub mod infrastructure;

// Cross-cutting concerns
pub mod model;
pub mod registry;

// Re-export main types for convenience
pub use application::InMemoryBroker;
pub use infrastructure::{ConnectFailure, SimConnection, SimConnectionFactory};
pub use model::ResourceKind;
pub use registry::{ResourceStats, SimRegistry};
