//! Consumer-side listener with redelivery accounting

mod gateway_listener;
mod handler;
mod options;
mod redelivery;

pub use gateway_listener::{GatewayListener, ListenerStats};
pub use handler::{Disposition, FnHandler, HandlerError, MessageHandler};
pub use options::ListenerOptions;
pub use redelivery::RedeliveryTracker;
