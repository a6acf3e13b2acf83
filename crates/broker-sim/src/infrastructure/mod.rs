//! Broker SDK port implementations backed by [`crate::InMemoryBroker`]

mod connection;
mod endpoint;
mod factory;
mod session;

pub use connection::SimConnection;
pub use endpoint::{SimConsumer, SimProducer};
pub use factory::{ConnectFailure, SimConnectionFactory};
pub use session::SimSession;
