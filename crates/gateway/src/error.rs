//! Error types for the gateway crate

use courier_core::CorrelationId;
use courier_ports::BrokerFault;
use std::time::Duration;
use thiserror::Error;

/// Connectivity errors surfaced once failover has given up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Every attempt of a reconnect sequence failed; carries the fault that
    /// started the sequence
    #[error("Connection to {uri} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        uri: String,
        attempts: u32,
        #[source]
        source: BrokerFault,
    },

    /// An operation kept failing after its recovery budget was spent
    #[error("Operation failed after {recoveries} recovery attempt(s): {source}")]
    RecoveryBudgetSpent {
        recoveries: u32,
        #[source]
        source: BrokerFault,
    },

    /// The broker rejected the connection outright
    #[error("Connection to {uri} rejected: {source}")]
    Rejected {
        uri: String,
        #[source]
        source: BrokerFault,
    },
}

impl ConnectionError {
    /// The broker fault behind this error
    pub fn fault(&self) -> &BrokerFault {
        match self {
            ConnectionError::Exhausted { source, .. }
            | ConnectionError::RecoveryBudgetSpent { source, .. }
            | ConnectionError::Rejected { source, .. } => source,
        }
    }
}

/// Gateway-level errors (client and listener operations)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Non-transport fault from the broker; never retried
    #[error("Broker error: {0}")]
    Broker(BrokerFault),

    #[error("No reply for correlation id {correlation_id} within {timeout:?}")]
    Timeout {
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// The reply consumer was lost with its connection
    #[error("Reply for correlation id {correlation_id} lost: {source}")]
    ReplyLost {
        correlation_id: CorrelationId,
        #[source]
        source: BrokerFault,
    },

    #[error("No pending request with correlation id {0}")]
    UnknownReply(CorrelationId),

    #[error("No destination configured for one-way send")]
    NoDestination,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Client or listener is closed")]
    Closed,
}

impl GatewayError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
