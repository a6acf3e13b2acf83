use thiserror::Error;

/// Classification of a broker SDK failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Connectivity lost or broker unreachable; recoverable by reconnecting
    Transport,
    /// Misuse or broker-side rejection; reconnecting does not help
    Protocol,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Transport => f.write_str("Transport"),
            FaultKind::Protocol => f.write_str("Protocol"),
        }
    }
}

/// The single fault type surfaced by every broker SDK operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} fault: {message}")]
pub struct BrokerFault {
    kind: FaultKind,
    message: String,
}

impl BrokerFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection-level failure requiring reconnect
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Transport, message)
    }

    /// Non-recoverable failure
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Protocol, message)
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transport(&self) -> bool {
        self.kind == FaultKind::Transport
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerFault>;

/// Payload marshaling errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Serialization failed: {0}")]
    Serialize(String),

    #[error("Deserialization failed: {0}")]
    Deserialize(String),
}
