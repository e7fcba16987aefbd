//! Fallback Coordinator
//!
//! Wraps one [`StreamSession`] attempt. When the attempt fails before any
//! content was shown and the operation has a non-streaming equivalent, the
//! same request is sent once more without streaming, under the same
//! idempotency key, and its answer is rendered through the same observer.

use serde_json::Value;
use thiserror::Error;

use super::events::{PullProgress, SessionState, TerminalEvent};
use super::observer::SessionObserver;
use super::session::{CompletedStream, SessionOutcome, StreamError, StreamSession};
use crate::api::ChatResponse;
use crate::transport::{Transport, TransportError};

/// Which path delivered the answer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPath {
    /// The streaming attempt
    Streaming,
    /// The non-streaming fallback
    Fallback,
}

/// Result of a coordinated attempt
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// How the operation ended
    pub outcome: SessionOutcome,
    /// Which path produced it
    pub path: DeliveryPath,
    /// Response metadata, only present for the fallback path
    pub response: Option<ChatResponse>,
}

/// Errors after fallback was considered
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FallbackError {
    /// Streaming failed and no fallback applied
    #[error(transparent)]
    Stream(StreamError),

    /// Both the streaming attempt and the fallback failed
    #[error("{fallback} (streaming attempt: {stream})")]
    Exhausted {
        /// Error of the non-streaming request
        fallback: TransportError,
        /// Error of the streaming attempt
        stream: StreamError,
    },
}

impl FallbackError {
    /// Whether partial output was already shown to the user
    #[must_use]
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Stream(StreamError::PartialStream { .. }))
    }
}

/// Forwards to the caller's observer, noting whether a message was opened
struct StartTracking<'a> {
    inner: &'a mut dyn SessionObserver,
    response_started: bool,
}

impl SessionObserver for StartTracking<'_> {
    fn on_state(&mut self, state: SessionState) {
        self.inner.on_state(state);
    }

    fn on_thinking(&mut self, text: &str) {
        self.inner.on_thinking(text);
    }

    fn on_response_start(&mut self, model: Option<&str>, debug_info: Option<&Value>) {
        self.response_started = true;
        self.inner.on_response_start(model, debug_info);
    }

    fn on_content(&mut self, delta: &str, accumulated: &str) {
        self.inner.on_content(delta, accumulated);
    }

    fn on_progress(&mut self, progress: &PullProgress) {
        self.inner.on_progress(progress);
    }

    fn on_terminal(&mut self, event: &TerminalEvent) {
        self.inner.on_terminal(event);
    }

    fn on_error(&mut self, message: &str, partial: Option<&str>) {
        self.inner.on_error(message, partial);
    }

    fn on_cancelled(&mut self) {
        self.inner.on_cancelled();
    }
}

/// Runs a session with at most one non-streaming retry
pub struct FallbackCoordinator;

impl FallbackCoordinator {
    /// Run `session`, falling back once on a retryable failure
    ///
    /// Failures that were not already reported inline are passed to
    /// `observer.on_error` before returning.
    ///
    /// # Errors
    ///
    /// [`FallbackError::Stream`] when the failure is not retryable or the
    /// operation has no fallback; [`FallbackError::Exhausted`] when the
    /// fallback also failed.
    pub async fn run<T>(
        transport: &T,
        session: StreamSession,
        observer: &mut dyn SessionObserver,
    ) -> Result<Delivery, FallbackError>
    where
        T: Transport + ?Sized,
    {
        let descriptor = session.descriptor();
        let fallback = descriptor.fallback.clone().map(|mut request| {
            if let Some(key) = &descriptor.request.idempotency_key {
                request.idempotency_key = Some(key.clone());
            }
            request
        });
        let cancel = session.cancel_token();

        let mut tracking = StartTracking {
            inner: &mut *observer,
            response_started: false,
        };
        let result = session.run(transport, &mut tracking).await;
        let response_started = tracking.response_started;

        let stream_error = match result {
            Ok(outcome) => {
                return Ok(Delivery {
                    outcome,
                    path: DeliveryPath::Streaming,
                    response: None,
                })
            }
            Err(e) => e,
        };

        let fallback = match fallback {
            Some(request) if stream_error.is_retryable() => request,
            _ => {
                if stream_error.is_retryable() {
                    observer.on_error(&stream_error.to_string(), None);
                }
                return Err(FallbackError::Stream(stream_error));
            }
        };

        tracing::warn!(
            error = %stream_error,
            path = %fallback.path,
            "Streaming failed before any output, retrying without streaming"
        );

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            sent = transport.send_json(&fallback) => Some(sent),
        };
        let Some(sent) = sent else {
            observer.on_cancelled();
            return Ok(Delivery {
                outcome: SessionOutcome::Cancelled,
                path: DeliveryPath::Fallback,
                response: None,
            });
        };

        let response = sent.and_then(|value| {
            serde_json::from_value::<ChatResponse>(value)
                .map_err(|e| TransportError::Decode(e.to_string()))
        });

        match response {
            Ok(response) => {
                // The failed attempt may already have opened the message
                if !response_started {
                    observer.on_response_start(response.model.as_deref(), response.debug_info.as_ref());
                }
                if !response.response.is_empty() {
                    observer.on_content(&response.response, &response.response);
                }
                observer.on_terminal(&TerminalEvent::ResponseEnd);

                Ok(Delivery {
                    outcome: SessionOutcome::Completed(CompletedStream {
                        terminal: TerminalEvent::ResponseEnd,
                        model: response.model.clone(),
                        debug_info: response.debug_info.clone(),
                        content: response.response.clone(),
                        progress: None,
                    }),
                    path: DeliveryPath::Fallback,
                    response: Some(response),
                })
            }
            Err(fallback_error) => {
                tracing::warn!(error = %fallback_error, "Non-streaming fallback failed");
                let error = FallbackError::Exhausted {
                    fallback: fallback_error,
                    stream: stream_error,
                };
                observer.on_error(&error.to_string(), None);
                Err(error)
            }
        }
    }
}
