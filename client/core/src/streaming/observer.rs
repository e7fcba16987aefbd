//! Session Observers
//!
//! Callbacks a session fires while it streams. Rendering surfaces either
//! implement [`SessionObserver`] directly or take the ordered
//! [`SessionUpdate`] messages from a [`ChannelObserver`].

use serde_json::Value;
use tokio::sync::mpsc;

use super::events::{PullProgress, SessionState, SessionUpdate, TerminalEvent};

/// Receives a session's callbacks, in frame-arrival order
///
/// Every method has a no-op default so observers only implement what they
/// render.
pub trait SessionObserver: Send {
    /// Session changed state
    ///
    /// Not called for `Cancelled` and `Closed` after a cancellation; there
    /// [`SessionObserver::on_cancelled`] is the only notification.
    fn on_state(&mut self, _state: SessionState) {}

    /// Backend reasoning text
    fn on_thinking(&mut self, _text: &str) {}

    /// A new assistant message opened
    fn on_response_start(&mut self, _model: Option<&str>, _debug_info: Option<&Value>) {}

    /// Content arrived; `accumulated` is the whole message so far
    ///
    /// Renderers should re-apply markdown over `accumulated` rather than
    /// appending `delta`, so provisional formatting of an unfinished token
    /// corrects itself on the next update.
    fn on_content(&mut self, _delta: &str, _accumulated: &str) {}

    /// Model pull progress
    fn on_progress(&mut self, _progress: &PullProgress) {}

    /// Session finished successfully
    fn on_terminal(&mut self, _event: &TerminalEvent) {}

    /// Session failed; `partial` is the message the error was appended to
    fn on_error(&mut self, _message: &str, _partial: Option<&str>) {}

    /// Session was cancelled and closed; nothing else fires afterwards
    fn on_cancelled(&mut self) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Observer forwarding every callback as a [`SessionUpdate`]
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: SessionUpdate) {
        if self.tx.send(update).is_err() {
            tracing::trace!("Session update receiver dropped");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_state(&mut self, state: SessionState) {
        self.send(SessionUpdate::State(state));
    }

    fn on_thinking(&mut self, text: &str) {
        self.send(SessionUpdate::Thinking(text.to_string()));
    }

    fn on_response_start(&mut self, model: Option<&str>, debug_info: Option<&Value>) {
        self.send(SessionUpdate::ResponseStart {
            model: model.map(String::from),
            debug_info: debug_info.cloned(),
        });
    }

    fn on_content(&mut self, delta: &str, accumulated: &str) {
        self.send(SessionUpdate::Content {
            delta: delta.to_string(),
            accumulated: accumulated.to_string(),
        });
    }

    fn on_progress(&mut self, progress: &PullProgress) {
        self.send(SessionUpdate::Progress(progress.clone()));
    }

    fn on_terminal(&mut self, event: &TerminalEvent) {
        self.send(SessionUpdate::Terminal(event.clone()));
    }

    fn on_error(&mut self, message: &str, partial: Option<&str>) {
        self.send(SessionUpdate::Error {
            message: message.to_string(),
            partial: partial.map(String::from),
        });
    }

    fn on_cancelled(&mut self) {
        self.send(SessionUpdate::Cancelled);
    }
}
