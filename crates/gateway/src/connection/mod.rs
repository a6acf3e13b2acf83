//! Physical connection ownership and failover

mod manager;
mod recovery;
mod registry;

pub use manager::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use recovery::Recovery;
pub use registry::{AttemptOutcome, ConnectionAttempt, ConnectionRegistry};
