use serde::{Deserialize, Serialize};

use crate::destination::{Destination, DestinationUri};
use crate::values::Timestamp;

/// Topic that receives keep-alive advisories from service hosts
pub const SERVICE_HOST_ADVISORY_TOPIC: &str = "ServiceHostAdvisory";

/// Keep-alive notice published by a listener to prove its connection works
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHostAdvisory {
    /// Destination the advertising listener consumes from
    pub destination_uri: String,
    pub process_name: String,
    pub process_id: u32,
    pub time: Timestamp,
}

impl ServiceHostAdvisory {
    pub fn new(
        destination_uri: impl Into<String>,
        process_name: impl Into<String>,
        process_id: u32,
        time: Timestamp,
    ) -> Self {
        Self {
            destination_uri: destination_uri.into(),
            process_name: process_name.into(),
            process_id,
            time,
        }
    }

    /// Advisory topic on the given broker host
    pub fn topic(host: &str) -> Destination {
        Destination::topic(DestinationUri::new(host, SERVICE_HOST_ADVISORY_TOPIC).uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_on_host() {
        let topic = ServiceHostAdvisory::topic("tcp://localhost:61616");
        assert!(topic.is_topic());
        assert_eq!(topic.uri(), "tcp://localhost:61616/ServiceHostAdvisory");
    }
}
