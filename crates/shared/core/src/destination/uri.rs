/// A destination URI split into broker host and destination path
///
/// `tcp://localhost:61616/Orders` has host `tcp://localhost:61616` and path
/// `Orders`. A value without a scheme is a bare path with an empty host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationUri {
    host: String,
    path: String,
}

impl DestinationUri {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        let host = host.into();
        let path = path.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
            path: path.trim_start_matches('/').to_string(),
        }
    }

    /// Parse a full URI into host and path
    pub fn parse(uri: &str) -> Self {
        match uri.find("://") {
            Some(scheme_end) => {
                let authority_start = scheme_end + 3;
                match uri[authority_start..].find('/') {
                    Some(offset) => {
                        let split = authority_start + offset;
                        Self::new(&uri[..split], &uri[split + 1..])
                    }
                    None => Self::new(uri, ""),
                }
            }
            None => Self::new("", uri),
        }
    }

    /// Broker endpoint, e.g. `tcp://localhost:61616`
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Destination path relative to the broker
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(self.path.as_str())
    }

    /// Same path on another broker
    pub fn with_host(&self, host: &str) -> Self {
        Self::new(host, self.path.clone())
    }

    /// Recombined URI
    pub fn uri(&self) -> String {
        match (self.host.is_empty(), self.path.is_empty()) {
            (true, _) => self.path.clone(),
            (false, true) => self.host.clone(),
            (false, false) => format!("{}/{}", self.host, self.path),
        }
    }
}

impl std::fmt::Display for DestinationUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri())
    }
}
