use async_trait::async_trait;
use std::sync::Arc;

use crate::error::BrokerResult;
use crate::session::{AcknowledgementMode, BrokerSession};

/// Creates physical broker connections from a URI
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a connection to the broker at `uri`
    async fn create_connection(&self, uri: &str) -> BrokerResult<Arc<dyn BrokerConnection>>;
}

/// A physical broker connection, shared by the sessions created from it
///
/// Closing a connection closes every session it owns that is still open.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// URI this connection was opened against
    fn uri(&self) -> &str;

    /// Set the client id used for durable subscriptions
    async fn set_client_id(&self, client_id: &str) -> BrokerResult<()>;

    /// Create a session in the given acknowledgement mode
    async fn create_session(&self, mode: AcknowledgementMode)
    -> BrokerResult<Box<dyn BrokerSession>>;

    /// Start delivery to consumers
    async fn start(&self) -> BrokerResult<()>;

    /// Release the connection; must be called exactly once
    async fn close(&self) -> BrokerResult<()>;
}
