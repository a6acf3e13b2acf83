//! Courier Ports
//!
//! Port definitions (traits) for the Courier gateway.
//! These define the boundaries between the orchestration logic and the
//! broker SDK or payload serializer it is given.
//!
//! Every broker operation fails with a single [`BrokerFault`] type so the
//! connection manager can tell transport faults (reconnect) from protocol
//! faults (surface as-is).

mod connection;
mod endpoint;
mod error;
mod serializer;
mod session;

pub use connection::{BrokerConnection, ConnectionFactory};
pub use endpoint::{Delivery, MessageConsumer, MessageProducer};
pub use error::{BrokerFault, BrokerResult, FaultKind, SerializationError};
pub use serializer::MessageSerializer;
pub use session::{AcknowledgementMode, BrokerSession};
