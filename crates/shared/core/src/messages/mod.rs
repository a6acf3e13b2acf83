//! Message envelope and structured payload documents

mod advisory;
mod fault;
mod text_message;

pub use advisory::{SERVICE_HOST_ADVISORY_TOPIC, ServiceHostAdvisory};
pub use fault::Fault;
pub use text_message::{MAX_EXPIRATION, TextMessage};
