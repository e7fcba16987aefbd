//! Transport Traits
//!
//! The seam between the streaming core and the network. The session,
//! fallback and cancellation layers only ever talk to a [`Transport`], which
//! lets tests script byte streams and failures without a live backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

/// A live, potentially unbounded response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Errors raised by the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the backend
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Backend answered with a non-2xx status
    #[error("Backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Reading the response body failed mid-stream
    #[error("Stream read failed: {0}")]
    Stream(String),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// Stream ended before a terminal event arrived
    #[error("Stream closed before completion")]
    StreamClosed,
}

/// HTTP method of a backend request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
}

/// A single request against the backend
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
    /// JSON body, if any
    pub body: Option<Value>,
    /// Idempotency key, sent as the `Idempotency-Key` header
    pub idempotency_key: Option<String>,
}

impl ApiRequest {
    /// Create a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            idempotency_key: None,
        }
    }

    /// Create a POST request with a JSON body
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Transport trait
///
/// Implement this to connect the client to a backend. [`HttpTransport`]
/// is the production implementation.
///
/// [`HttpTransport`]: super::HttpTransport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming request and return its body as a byte stream
    ///
    /// Fails before any bytes are produced if the backend is unreachable or
    /// answers with a non-2xx status.
    async fn open_stream(&self, request: &ApiRequest) -> Result<ByteStream, TransportError>;

    /// Send a request and decode the complete JSON response
    async fn send_json(&self, request: &ApiRequest) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/chat", serde_json::json!({"query": "hi"}))
            .with_idempotency_key("abc");

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/chat");
        assert_eq!(request.idempotency_key.as_deref(), Some("abc"));

        let request = ApiRequest::get("/status");
        assert_eq!(request.method, Method::Get);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned 502: bad gateway");
    }
}
