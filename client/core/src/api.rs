//! Backend API
//!
//! Endpoint paths and the request/response shapes of the document chat
//! backend. Streaming payloads are decoded in [`crate::streaming::parser`];
//! everything here is conventional request/response JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::streaming::{Dialect, OperationDescriptor};
use crate::transport::ApiRequest;

/// Endpoint paths, relative to the configured base URL
pub mod paths {
    /// Streaming chat (JSON lines)
    pub const CHAT_STREAM: &str = "/chat/stream";
    /// Non-streaming chat
    pub const CHAT: &str = "/chat";
    /// Streaming model pull (SSE)
    pub const PULL_STREAM: &str = "/models/pull/stream";
    /// Best-effort cleanup of a cancelled pull
    pub const PULL_CANCEL: &str = "/models/pull/cancel";
    /// Backend and engine status
    pub const STATUS: &str = "/status";
    /// Host memory usage
    pub const MEMORY: &str = "/system/memory";
    /// Local and remote models
    pub const MODELS: &str = "/models";

    /// Chat sessions of a project
    #[must_use]
    pub fn chats(project: &str) -> String {
        format!("/chats/{project}")
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Body of both chat endpoints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message
    pub query: String,
    /// Project whose documents give context
    pub project: String,
    /// Chat session the message belongs to
    pub chat_id: String,
    /// Ask the backend for retrieval diagnostics
    pub debug: bool,
}

impl ChatRequest {
    /// Streaming attempt plus its non-streaming fallback, sharing one
    /// idempotency key
    #[must_use]
    pub fn descriptor(&self, idempotency_key: &str) -> OperationDescriptor {
        let body = serde_json::json!({
            "query": self.query,
            "project": self.project,
            "chat_id": self.chat_id,
            "debug": self.debug,
        });
        OperationDescriptor {
            request: ApiRequest::post(paths::CHAT_STREAM, body.clone())
                .with_idempotency_key(idempotency_key),
            dialect: Dialect::JsonLines,
            fallback: Some(
                ApiRequest::post(paths::CHAT, body).with_idempotency_key(idempotency_key),
            ),
        }
    }
}

/// Body of the pull and pull-cancel endpoints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Model to pull, e.g. `phi3.5:mini`
    pub name: String,
}

impl PullRequest {
    /// Streaming pull; pulls have no non-streaming fallback
    #[must_use]
    pub fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor {
            request: ApiRequest::post(paths::PULL_STREAM, self.body()),
            dialect: Dialect::Sse,
            fallback: None,
        }
    }

    /// Cleanup request for a cancelled pull of this model
    #[must_use]
    pub fn cancel_request(&self) -> ApiRequest {
        ApiRequest::post(paths::PULL_CANCEL, self.body())
    }

    fn body(&self) -> Value {
        serde_json::json!({ "name": self.name })
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Non-streaming chat answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Full answer text
    pub response: String,
    /// Model that answered
    #[serde(default)]
    pub model: Option<String>,
    /// Retrieval diagnostics, when debug was requested
    #[serde(default)]
    pub debug_info: Option<Value>,
    /// `document_chat` or `general_chat`
    #[serde(default)]
    pub mode: Option<String>,
    /// Chunks fed into the prompt
    #[serde(default)]
    pub chunks_processed: Option<u64>,
    /// Chunks available in the project
    #[serde(default)]
    pub total_chunks_available: Option<u64>,
    /// Prompt context length in characters
    #[serde(default)]
    pub context_length: Option<u64>,
}

/// Inference engine health
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Engine name, if one is detected
    #[serde(default)]
    pub name: Option<String>,
    /// Engine process found
    #[serde(default)]
    pub available: bool,
    /// Engine answered a status check
    #[serde(default)]
    pub responding: bool,
    /// Engine passed verification
    #[serde(default)]
    pub verified: bool,
}

/// `GET /status`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Backend can reach its engine
    pub connected: bool,
    /// Engine details
    #[serde(default)]
    pub engine: EngineStatus,
    /// Installed model names
    #[serde(default)]
    pub local_models: Vec<String>,
    /// Installed model count
    #[serde(default)]
    pub total_models: u64,
    /// Backend-reported problem
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /system/memory`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total RAM in GB
    pub total_gb: f64,
    /// Available RAM in GB
    pub available_gb: f64,
    /// Used RAM in GB
    pub used_gb: f64,
    /// Used share, 0-100
    pub percent_used: f64,
}

/// One entry of `GET /chats/{project}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Chat id
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Creation time as reported
    #[serde(default)]
    pub created_at: String,
    /// Last update time as reported
    #[serde(default)]
    pub updated_at: String,
    /// Messages in the chat
    #[serde(default)]
    pub message_count: u64,
}

/// A model known to the backend
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Estimated RAM needed, in GB
    #[serde(default)]
    pub estimated_ram_gb: u64,
    /// Size class
    #[serde(default)]
    pub category: String,
}

/// `GET /models`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Installed models
    #[serde(default)]
    pub local: Vec<ModelInfo>,
    /// Models available to pull
    #[serde(default)]
    pub remote: Vec<ModelInfo>,
    /// Memory snapshot taken with the listing
    #[serde(default)]
    pub system_memory: Value,
    /// Why the remote listing is missing, if it is
    #[serde(default)]
    pub remote_error: Option<String>,
}
