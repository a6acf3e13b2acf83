//! Courier Gateway
//!
//! Client-side orchestration between application code and a queue/topic
//! broker. Provides:
//! - Connection management with failover across a list of brokers
//! - One-way and request/reply clients (temporary reply queues, correlation ids)
//! - A transactional listener with bounded redelivery and dead-letter forwarding
//!
//! ## Architecture
//!
//! ```text
//!  OneWayClient / ReplyClient        GatewayListener
//!            │                             │
//!            └──────────┬──────────────────┘
//!                       │ sessions, producers, consumers
//!               ┌───────▼───────┐
//!               │  Connection   │──▶ ConnectionRegistry
//!               │   Manager     │
//!               └───────┬───────┘
//!                       │ ConnectionFactory (broker SDK port)
//!                  Broker(s): primary, failover list
//! ```
//!
//! ## Transport
//!
//! The broker SDK is injected through the `courier-ports` traits. The
//! `Publisher`/`Requester` traits let callers depend on sending behaviour
//! without naming a concrete client.

pub mod client;
pub mod connection;
mod dispose;
pub mod error;
pub mod listener;
pub mod transport;

// Re-export commonly used types
pub use client::{OneWayClient, PendingReply, ReplyClient};
pub use connection::{
    AttemptOutcome, ConnectionAttempt, ConnectionHandle, ConnectionManager, ConnectionRegistry,
    ConnectionState, Recovery,
};
pub use error::{ConnectionError, GatewayError, Result};
pub use listener::{
    Disposition, FnHandler, GatewayListener, HandlerError, ListenerOptions, ListenerStats,
    MessageHandler,
};
pub use transport::{Publisher, Requester};
