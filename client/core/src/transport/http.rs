//! HTTP Transport
//!
//! [`Transport`] implementation backed by `reqwest`. Streaming requests
//! hand the response body back as a byte stream; everything else decodes a
//! single JSON document.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::traits::{ApiRequest, ByteStream, Method, Transport, TransportError};
use crate::config::ServerConfig;

/// Header carrying the idempotency key of a logical operation
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP transport for the docchat backend
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// Base URL, without trailing slash
    base_url: String,
    /// Deadline for non-streaming requests
    request_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the given server configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connect` if the HTTP client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, TransportError> {
        // No total timeout on the client itself: streaming bodies may stay
        // open for as long as the backend keeps producing frames.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            http_client,
        })
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a request path
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn build(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.http_client.get(url),
            Method::Post => self.http_client.post(url),
        };
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(ref key) = request.idempotency_key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        builder
    }

    async fn send_checked(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = builder.send().await.map_err(map_reqwest_error)?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_decode() {
        TransportError::Decode(e.to_string())
    } else if e.is_body() {
        TransportError::Stream(e.to_string())
    } else {
        TransportError::Connect(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open_stream(&self, request: &ApiRequest) -> Result<ByteStream, TransportError> {
        tracing::debug!(path = %request.path, "Opening stream");
        let response = self.send_checked(self.build(request)).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Stream(e.to_string())));
        Ok(stream.boxed())
    }

    async fn send_json(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        tracing::debug!(path = %request.path, "Sending request");
        let builder = self.build(request).timeout(self.request_timeout);
        let response = self.send_checked(builder).await?;

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> ServerConfig {
        ServerConfig {
            base_url: base_url.to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new(&config("http://localhost:8000/")).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8000");
        assert_eq!(transport.url("/status"), "http://localhost:8000/status");
        assert_eq!(transport.url("status"), "http://localhost:8000/status");
    }
}
