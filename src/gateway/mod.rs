//! Uniform access to the TV's JointSpace control endpoints.
//!
//! [`DeviceGateway`] owns the JSON contract: request bodies are serialised
//! here and reply bodies are classified here. Moving bytes is delegated to a
//! [`Transport`], which is [`HttpTransport`] in production and a scripted
//! stub in tests.
//!
//! There are no retries at this layer. Each feature decides what a failed
//! call means for it.

mod http;

pub use http::{Credentials, HttpTransport};

use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use strum::{AsRefStr, Display};

/// HTTP verb of a device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// A single request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub method: Method,
    /// Path relative to the versioned API prefix, e.g. `powerstate`.
    pub endpoint: String,
    /// Serialised JSON body.
    pub body: Option<String>,
}

/// Opaque request/response primitive underneath the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request and return the raw reply body.
    async fn send(&self, request: DeviceRequest) -> Result<String>;
}

/// Classified reply body.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(Value),
    /// Empty or non-JSON body; most write endpoints answer like this.
    Empty,
}

impl Reply {
    fn classify(endpoint: &str, body: &str) -> Result<Self> {
        if body.trim().is_empty() || !(body.contains('{') || body.contains('[')) {
            return Ok(Self::Empty);
        }
        serde_json::from_str(body)
            .map(Self::Json)
            .map_err(|e| BridgeError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Shared, stateless call path to the TV.
#[derive(Clone)]
pub struct DeviceGateway {
    transport: Arc<dyn Transport>,
}

impl DeviceGateway {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Call `endpoint` and classify the reply.
    pub async fn call(&self, endpoint: &str, method: Method, body: Option<&Value>) -> Result<Reply> {
        let body = body.map(serde_json::to_string).transpose()?;
        log::trace!(
            "[Gateway] {} {} {}",
            method,
            endpoint,
            body.as_deref().unwrap_or("")
        );
        let request = DeviceRequest {
            method,
            endpoint: endpoint.to_string(),
            body,
        };
        let text = self.transport.send(request).await?;
        Reply::classify(endpoint, &text)
    }

    /// `GET` an endpoint and decode its JSON reply into `T`.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        match self.call(endpoint, Method::Get, None).await? {
            Reply::Json(value) => serde_json::from_value(value).map_err(|e| BridgeError::Decode {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }),
            Reply::Empty => Err(BridgeError::Decode {
                endpoint: endpoint.to_string(),
                reason: "empty reply where a JSON document was expected".to_string(),
            }),
        }
    }

    /// `POST` a JSON body to an endpoint.
    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Reply> {
        let value = serde_json::to_value(body)?;
        self.call(endpoint, Method::Post, Some(&value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Power {
        powerstate: String,
    }

    #[test]
    fn test_classify_empty_and_plain_bodies() {
        assert_eq!(Reply::classify("x", "").unwrap(), Reply::Empty);
        assert_eq!(Reply::classify("x", "  \n").unwrap(), Reply::Empty);
        assert_eq!(Reply::classify("x", "OK").unwrap(), Reply::Empty);
    }

    #[test]
    fn test_classify_json_documents() {
        assert_eq!(
            Reply::classify("x", r#" {"a":1}"#).unwrap(),
            Reply::Json(json!({"a": 1}))
        );
        assert_eq!(
            Reply::classify("x", "[1,2]").unwrap(),
            Reply::Json(json!([1, 2]))
        );
    }

    #[test]
    fn test_classify_broken_json_is_decode_error() {
        let err = Reply::classify("powerstate", r#"{"powerstate": "#).unwrap_err();
        assert!(matches!(err, BridgeError::Decode { ref endpoint, .. } if endpoint == "powerstate"));
    }

    #[tokio::test]
    async fn test_get_decodes_typed_reply() {
        let stub = Arc::new(StubTransport::new());
        stub.reply("powerstate", r#"{"powerstate":"On"}"#);
        let gateway = DeviceGateway::new(stub.clone());

        let power: Power = gateway.get("powerstate").await.unwrap();
        assert_eq!(power.powerstate, "On");
        assert_eq!(stub.count(Method::Get, "powerstate"), 1);
    }

    #[tokio::test]
    async fn test_get_with_empty_reply_is_decode_error() {
        let stub = Arc::new(StubTransport::new());
        stub.reply("powerstate", "");
        let gateway = DeviceGateway::new(stub);

        let err = gateway.get::<Power>("powerstate").await.unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_post_serialises_body_and_accepts_empty_reply() {
        let stub = Arc::new(StubTransport::new());
        let gateway = DeviceGateway::new(stub.clone());

        let reply = gateway
            .post("powerstate", &json!({"powerstate": "Standby"}))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Empty);

        let posted = stub.last_body("powerstate").unwrap();
        assert_eq!(posted, json!({"powerstate": "Standby"}));
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let stub = Arc::new(StubTransport::new());
        stub.fail("powerstate");
        let gateway = DeviceGateway::new(stub);

        let err = gateway.get::<Power>("powerstate").await.unwrap_err();
        assert!(err.is_transport());
    }
}
