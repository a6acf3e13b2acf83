use serde::{Deserialize, Serialize};

/// Structured fault document returned in place of a response
///
/// A fault is a payload, not a transport failure: the reply carrying it is
/// delivered like any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    /// Full type name of the error
    pub fault_code: String,
    /// Human readable error message
    pub fault_message: String,
    /// Serialized error detail
    pub detail: String,
}

impl Fault {
    pub fn new(
        fault_code: impl Into<String>,
        fault_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            fault_code: fault_code.into(),
            fault_message: fault_message.into(),
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.fault_code, self.fault_message)
    }
}
