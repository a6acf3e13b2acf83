//! Error types for the service host crate

use courier_core::Fault;
use courier_gateway::GatewayError;
use thiserror::Error;

/// Application failure raised by a service handler
///
/// Turned into a [`Fault`] reply; the request itself is still committed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{fault_code}: {message}")]
pub struct ServiceError {
    fault_code: String,
    message: String,
    detail: String,
}

impl ServiceError {
    /// Capture an error with its full type name as the fault code
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error,
    {
        Self {
            fault_code: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            detail: format!("{error:?}"),
        }
    }

    pub fn new(fault_code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            fault_code: fault_code.into(),
            detail: message.clone(),
            message,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn fault_code(&self) -> &str {
        &self.fault_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn to_fault(&self) -> Fault {
        Fault::new(&self.fault_code, &self.message, &self.detail)
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Service hosting errors
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown service type: {0}")]
    UnknownService(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

pub type Result<T> = std::result::Result<T, HostError>;
