//! Stream Session
//!
//! Drives one streaming exchange (a chat answer or a model pull) from
//! request to close, as an explicit state machine:
//!
//! ```text
//! Idle ──start──▶ Opening ──first chunk──▶ Streaming ──terminal──▶ Finalizing ──▶ Closed
//!                    │                        │                                   ▲
//!                    └────────cancel──────────┴──────▶ Cancelled ─────────────────┘
//! ```
//!
//! Failures are split by whether partial output has been shown. Anything
//! that goes wrong before the first `Content` event is retryable, since the
//! user has seen nothing and a fallback transport can safely take over. Once
//! content has been rendered the failure is final: the error is appended to
//! the partial message instead.

use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::events::{PullProgress, SessionState, StreamEvent, TerminalEvent};
use super::observer::SessionObserver;
use super::parser::{parse_frame, Dialect, FrameOutcome};
use crate::transport::{ApiRequest, ByteStreamFramer, Transport, TransportError};

// ============================================================================
// Operation Descriptor
// ============================================================================

/// What a session should stream
#[derive(Clone, Debug, PartialEq)]
pub struct OperationDescriptor {
    /// The streaming request
    pub request: ApiRequest,
    /// Frame dialect of the response
    pub dialect: Dialect,
    /// Equivalent non-streaming request, if the operation has one
    pub fallback: Option<ApiRequest>,
}

// ============================================================================
// Errors and Outcomes
// ============================================================================

/// Why a session failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Transport failed before any content was shown
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Backend sent an error event before any content was shown
    #[error("Backend error: {0}")]
    Remote(String),

    /// Failure after content was already shown
    #[error("Stream failed after partial output: {message}")]
    PartialStream {
        /// What went wrong
        message: String,
        /// The partial message, with the error appended
        partial_content: String,
    },
}

impl StreamError {
    /// Whether a fallback request may replace this attempt
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PartialStream { .. })
    }
}

/// A successfully finished stream
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedStream {
    /// The terminal event that ended the stream
    pub terminal: TerminalEvent,
    /// Model that answered (chat only)
    pub model: Option<String>,
    /// Retrieval diagnostics (chat only)
    pub debug_info: Option<Value>,
    /// Full message text (chat only)
    pub content: String,
    /// Last reported progress (pull only)
    pub progress: Option<PullProgress>,
}

/// How a session ended without failing
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Terminal event received
    Completed(CompletedStream),
    /// Caller cancelled; not an error
    Cancelled,
}

// ============================================================================
// Message Buffer
// ============================================================================

/// The assistant message being assembled from `Content` deltas
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageBuffer {
    model: Option<String>,
    debug_info: Option<Value>,
    content: String,
}

impl MessageBuffer {
    /// Open a new, empty message
    #[must_use]
    pub fn new(model: Option<String>, debug_info: Option<Value>) -> Self {
        Self {
            model,
            debug_info,
            content: String::new(),
        }
    }

    /// Append a delta and return the full text so far
    pub fn append(&mut self, delta: &str) -> &str {
        self.content.push_str(delta);
        &self.content
    }

    /// Append a terminal error note and return the full text
    pub fn append_error(&mut self, message: &str) -> &str {
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str("\n**Error:** ");
        self.content.push_str(message);
        &self.content
    }

    /// Full text so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Model that produced the message
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

// ============================================================================
// Stream Session
// ============================================================================

/// One streaming exchange
pub struct StreamSession {
    descriptor: OperationDescriptor,
    cancel: CancellationToken,
    state: SessionState,
    message: Option<MessageBuffer>,
    content_seen: bool,
    last_progress: Option<PullProgress>,
}

/// What handling one event decided
enum Step {
    Continue,
    Finish(TerminalEvent),
    Fail(StreamError),
}

impl StreamSession {
    /// Create a session for the given operation
    #[must_use]
    pub fn new(descriptor: OperationDescriptor, cancel: CancellationToken) -> Self {
        Self {
            descriptor,
            cancel,
            state: SessionState::Idle,
            message: None,
            content_seen: false,
            last_progress: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that cancels this session
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The operation being streamed
    #[must_use]
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Run the exchange to completion
    ///
    /// Callbacks fire on `observer` in frame-arrival order. The session
    /// always ends in [`SessionState::Closed`], and the response body is
    /// dropped (closing the connection) before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`StreamError`]; check [`StreamError::is_retryable`] to
    /// decide whether a fallback may run. Partial failures have already been
    /// reported through `observer.on_error`.
    pub async fn run<T>(
        mut self,
        transport: &T,
        observer: &mut dyn SessionObserver,
    ) -> Result<SessionOutcome, StreamError>
    where
        T: Transport + ?Sized,
    {
        self.transition(SessionState::Opening, observer);

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            opened = transport.open_stream(&self.descriptor.request) => Some(opened),
        };

        let body = match opened {
            None => return Ok(self.cancelled(observer)),
            Some(Ok(body)) => body,
            Some(Err(e)) => return Err(self.fail(e.into(), observer)),
        };

        let mut body = body;
        let mut framer = ByteStreamFramer::new();

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                next = body.next() => Some(next),
            };
            let Some(next) = next else {
                return Ok(self.cancelled(observer));
            };

            let ended = match next {
                Some(Ok(chunk)) => {
                    if self.state == SessionState::Opening {
                        self.transition(SessionState::Streaming, observer);
                    }
                    framer.push(&chunk);
                    false
                }
                Some(Err(e)) => return Err(self.fail(e.into(), observer)),
                None => true,
            };

            while let Some(frame) = framer.next_frame() {
                match self.handle_frame(&frame, observer) {
                    Step::Continue => {}
                    Step::Finish(terminal) => return Ok(self.finish(terminal, observer)),
                    Step::Fail(e) => return Err(self.fail(e, observer)),
                }
            }

            if ended {
                if let Some(frame) = framer.finish() {
                    match self.handle_frame(&frame, observer) {
                        Step::Continue => {}
                        Step::Finish(terminal) => return Ok(self.finish(terminal, observer)),
                        Step::Fail(e) => return Err(self.fail(e, observer)),
                    }
                }
                return Err(self.fail(TransportError::StreamClosed.into(), observer));
            }
        }
    }

    fn handle_frame(&mut self, frame: &str, observer: &mut dyn SessionObserver) -> Step {
        match parse_frame(frame, self.descriptor.dialect) {
            FrameOutcome::Skip | FrameOutcome::NotParseable => Step::Continue,
            FrameOutcome::Event { event, terminal } => self.apply(event, terminal, observer),
        }
    }

    fn apply(
        &mut self,
        event: StreamEvent,
        terminal: bool,
        observer: &mut dyn SessionObserver,
    ) -> Step {
        match event {
            StreamEvent::Thinking(text) => observer.on_thinking(&text),
            StreamEvent::ResponseStart { model, debug_info } => {
                if self.message.is_some() {
                    tracing::warn!("Ignoring repeated response_start in one session");
                } else {
                    observer.on_response_start(model.as_deref(), debug_info.as_ref());
                    self.message = Some(MessageBuffer::new(model, debug_info));
                }
            }
            StreamEvent::Content(delta) => {
                // Content must follow exactly one ResponseStart
                let message = self.message.get_or_insert_with(|| {
                    tracing::debug!("Content before response_start, opening message implicitly");
                    observer.on_response_start(None, None);
                    MessageBuffer::default()
                });
                self.content_seen = true;
                let accumulated = message.append(&delta);
                observer.on_content(&delta, accumulated);
            }
            StreamEvent::Progress(progress) => {
                observer.on_progress(&progress);
                self.last_progress = Some(progress);
            }
            StreamEvent::ResponseEnd => return Step::Finish(TerminalEvent::ResponseEnd),
            StreamEvent::Completed(status) => return Step::Finish(TerminalEvent::Completed(status)),
            StreamEvent::Error(message) => return Step::Fail(StreamError::Remote(message)),
        }

        if terminal {
            return Step::Finish(self.implied_terminal());
        }
        Step::Continue
    }

    /// Terminal event for a payload whose completion flag ended the stream
    fn implied_terminal(&self) -> TerminalEvent {
        match self.descriptor.dialect {
            Dialect::JsonLines => TerminalEvent::ResponseEnd,
            Dialect::Sse => TerminalEvent::Completed(
                self.last_progress
                    .as_ref()
                    .map(|p| p.status.clone())
                    .unwrap_or_else(|| "success".to_string()),
            ),
        }
    }

    fn transition(&mut self, next: SessionState, observer: &mut dyn SessionObserver) {
        self.set_state(next);
        observer.on_state(next);
    }

    /// Move to `next` without notifying; cancellation reports only `on_cancelled`
    fn set_state(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(from = ?self.state, to = ?next, path = %self.descriptor.request.path, "Session transition");
        self.state = next;
    }

    fn finish(mut self, terminal: TerminalEvent, observer: &mut dyn SessionObserver) -> SessionOutcome {
        self.transition(SessionState::Finalizing, observer);
        observer.on_terminal(&terminal);
        self.transition(SessionState::Closed, observer);

        let message = self.message.take().unwrap_or_default();
        SessionOutcome::Completed(CompletedStream {
            terminal,
            model: message.model,
            debug_info: message.debug_info,
            content: message.content,
            progress: self.last_progress.take(),
        })
    }

    fn fail(&mut self, error: StreamError, observer: &mut dyn SessionObserver) -> StreamError {
        self.transition(SessionState::Finalizing, observer);

        let error = match (self.content_seen, self.message.as_mut()) {
            (true, Some(message)) => {
                let text = match error {
                    StreamError::Remote(text) => text,
                    other => other.to_string(),
                };
                let partial_content = message.append_error(&text).to_string();
                observer.on_error(&text, Some(&partial_content));
                StreamError::PartialStream {
                    message: text,
                    partial_content,
                }
            }
            _ => error,
        };

        tracing::debug!(
            error = %error,
            retryable = error.is_retryable(),
            path = %self.descriptor.request.path,
            "Stream session failed"
        );
        self.transition(SessionState::Closed, observer);
        error
    }

    fn cancelled(mut self, observer: &mut dyn SessionObserver) -> SessionOutcome {
        tracing::debug!(path = %self.descriptor.request.path, "Stream session cancelled");
        self.set_state(SessionState::Cancelled);
        self.set_state(SessionState::Closed);
        observer.on_cancelled();
        SessionOutcome::Cancelled
    }
}
