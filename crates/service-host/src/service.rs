//! Request handler abstraction
//!
//! Typed services implement [`Service`]; the host only sees the erased
//! [`RequestHandler`] working on `serde_json::Value`.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ServiceError;

/// A typed request handler
#[async_trait]
pub trait Service: Send + Sync + 'static {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(&self, request: Self::Request) -> Result<Self::Response, ServiceError>;
}

/// Type-erased handler as stored in the registry
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Value) -> Result<Value, ServiceError>;
}

/// Erases a [`Service`] into a [`RequestHandler`]
pub struct ServiceAdapter<S> {
    service: S,
}

impl<S: Service> ServiceAdapter<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }
}

#[async_trait]
impl<S: Service> RequestHandler for ServiceAdapter<S> {
    async fn handle(&self, request: Value) -> Result<Value, ServiceError> {
        let request: S::Request =
            serde_json::from_value(request).map_err(ServiceError::from_error)?;
        let response = self.service.handle(request).await?;
        serde_json::to_value(response).map_err(ServiceError::from_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Add {
        a: i64,
        b: i64,
    }

    struct Adder;

    #[async_trait]
    impl Service for Adder {
        type Request = Add;
        type Response = i64;

        async fn handle(&self, request: Add) -> Result<i64, ServiceError> {
            Ok(request.a + request.b)
        }
    }

    #[tokio::test]
    async fn test_adapter_round_trips_values() {
        let handler = ServiceAdapter::new(Adder);
        let result = handler.handle(json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(result, json!(5));
    }

    #[tokio::test]
    async fn test_bad_request_shape_is_service_error() {
        let handler = ServiceAdapter::new(Adder);
        let err = handler.handle(json!({"a": "two"})).await.unwrap_err();
        assert!(err.fault_code().contains("serde_json"));
    }
}
