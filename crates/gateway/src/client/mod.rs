//! Producer-side clients

mod one_way;
mod reply;

pub(crate) use one_way::produce;
pub use one_way::OneWayClient;
pub use reply::{PendingReply, ReplyClient};
