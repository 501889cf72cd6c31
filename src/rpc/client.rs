//! Daemon JSON-RPC client
//!
//! Posts `{"method": .., "params": [..]}` to a coin daemon with basic-auth
//! credentials and hands back the `result` member.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// RPC errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Daemon error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("Empty result from {0}")]
    EmptyResult(String),
    #[error("Embedded full node required for {0}")]
    MissingNode(String),
}

/// Daemon endpoint and credentials
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RpcEndpoint {
    /// Endpoint on the local host
    pub fn local(port: u16) -> Self {
        Self {
            url: format!("http://127.0.0.1:{}", port),
            user: None,
            password: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client for one daemon
#[derive(Debug, Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    endpoint: RpcEndpoint,
    request_id: Arc<AtomicU64>,
}

impl DaemonClient {
    /// Create a client with the given request timeout
    pub fn new(endpoint: RpcEndpoint, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            request_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// The endpoint this client talks to
    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Issue `method` with positional `params`, returning the raw result
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let params = match params {
            Value::Null => Value::Array(vec![]),
            other => other,
        };
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http.post(&self.endpoint.url).json(&request);
        if let Some(user) = &self.endpoint.user {
            builder = builder.basic_auth(user, self.endpoint.password.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        // bitcoind answers RPC errors with HTTP 500 and a JSON body
        let parsed: RpcResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(RpcError::Status(status.as_u16())),
            Err(e) => return Err(RpcError::Decode(e)),
        };

        if let Some(err) = parsed.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        if parsed.result.is_null() {
            return Err(RpcError::EmptyResult(method.to_string()));
        }
        Ok(parsed.result)
    }

    /// Issue `method` and deserialise the result
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let result = self.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_builder() {
        let endpoint = RpcEndpoint::local(7771).with_auth("user", "pass");
        assert_eq!(endpoint.url, "http://127.0.0.1:7771");
        assert_eq!(endpoint.user.as_deref(), Some("user"));
        assert_eq!(endpoint.password.as_deref(), Some("pass"));
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: 7,
            method: "getblockhash",
            params: serde_json::json!([1000]),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "getblockhash");
        assert_eq!(json["params"], serde_json::json!([1000]));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_transport_error() {
        let client = DaemonClient::new(RpcEndpoint::local(1), Duration::from_secs(2)).unwrap();
        let result = client.call("getinfo", Value::Null).await;
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }
}
