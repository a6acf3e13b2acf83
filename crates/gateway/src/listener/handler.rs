use async_trait::async_trait;
use courier_ports::Delivery;
use thiserror::Error;

/// What the listener should do with a processed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge the message
    Commit,
    /// Return the message to the broker for redelivery
    Rollback,
}

/// Failure raised by a subscriber; treated as a rollback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Subscriber invoked for every message a listener receives
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, delivery: &Delivery) -> Result<Disposition, HandlerError>;
}

/// Adapts a synchronous closure into a [`MessageHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Delivery) -> Result<Disposition, HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Delivery) -> Result<Disposition, HandlerError> + Send + Sync,
{
    async fn on_message(&self, delivery: &Delivery) -> Result<Disposition, HandlerError> {
        (self.f)(delivery)
    }
}
