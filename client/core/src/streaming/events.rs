//! Stream Events
//!
//! Application-level events decoded from stream frames, and the updates a
//! session publishes to its observer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Download progress reported by a model pull
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    /// Percent complete (0-100)
    pub percent: f64,
    /// Bytes downloaded so far, as reported by the backend
    pub downloaded: String,
    /// Total size, as reported by the backend
    pub total: String,
    /// Backend status text ("pulling manifest", "success", ...)
    pub status: String,
    /// Model being pulled, when the backend echoes it
    #[serde(default)]
    pub model_name: Option<String>,
}

/// A decoded stream event
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Backend reasoning text shown before the answer
    Thinking(String),
    /// Answer is starting
    ResponseStart {
        /// Model producing the answer
        model: Option<String>,
        /// Retrieval diagnostics, when debug was requested
        debug_info: Option<Value>,
    },
    /// Incremental answer text
    Content(String),
    /// Answer is complete
    ResponseEnd,
    /// Backend reported an error
    Error(String),
    /// Model pull progress
    Progress(PullProgress),
    /// Model pull finished
    Completed(String),
}

impl StreamEvent {
    /// Whether this event ends the session on its own
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResponseEnd | Self::Error(_) | Self::Completed(_)
        )
    }
}

/// The single terminal event a successful session reports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalEvent {
    /// Chat answer finished
    ResponseEnd,
    /// Model pull finished with the given status
    Completed(String),
}

/// Lifecycle of a streaming exchange
///
/// ```text
/// Idle -> Opening -> Streaming -> Finalizing -> Closed
///            \           \
///             +-----------+----> Cancelled -> Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// Request sent, waiting for the first chunk
    Opening,
    /// Receiving chunks
    Streaming,
    /// Terminal event or failure observed, wrapping up
    Finalizing,
    /// Cancelled by the caller
    Cancelled,
    /// Done; no further callbacks
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{Cancelled, Closed, Finalizing, Idle, Opening, Streaming};
        match (self, next) {
            (Idle, Opening) | (Opening, Streaming) => true,
            // Failures before the first chunk finalize straight from Opening
            (Opening | Streaming, Finalizing) => true,
            (Idle | Opening | Streaming | Finalizing, Cancelled) => true,
            (Finalizing | Cancelled, Closed) => true,
            _ => false,
        }
    }
}

/// Update published by a session, for surfaces that consume a channel
#[derive(Clone, Debug, PartialEq)]
pub enum SessionUpdate {
    /// Session moved to a new state
    State(SessionState),
    /// Reasoning text
    Thinking(String),
    /// A new assistant message opened
    ResponseStart {
        /// Model producing the answer
        model: Option<String>,
        /// Retrieval diagnostics
        debug_info: Option<Value>,
    },
    /// Content arrived
    Content {
        /// The new text
        delta: String,
        /// Full text accumulated so far, for re-rendering
        accumulated: String,
    },
    /// Pull progress
    Progress(PullProgress),
    /// Session finished
    Terminal(TerminalEvent),
    /// Session failed
    Error {
        /// Error text
        message: String,
        /// Partial message the error was appended to, if any
        partial: Option<String>,
    },
    /// Session was cancelled
    Cancelled,
}
