//! Transport abstraction layer
//!
//! Unified traits for sending messages so that service hosts and application
//! code depend on the behaviour rather than on a concrete client.

use crate::error::Result;
use async_trait::async_trait;
use courier_core::{Destination, TextMessage};
use std::time::Duration;

/// Publisher - sends messages without waiting for an answer
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish to the publisher's configured destination
    async fn publish(&self, message: &TextMessage) -> Result<()>;

    /// Publish to an explicit destination (e.g. a reply-to queue)
    async fn publish_to(&self, destination: &Destination, message: &TextMessage) -> Result<()>;
}

/// Request/Reply pattern over an asynchronous transport
#[async_trait]
pub trait Requester: Send + Sync {
    /// Send a request and wait up to `timeout` for the correlated reply
    async fn request(&self, message: TextMessage, timeout: Duration) -> Result<TextMessage>;
}
