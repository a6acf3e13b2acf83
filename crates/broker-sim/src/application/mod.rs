mod broker;

pub use broker::InMemoryBroker;
