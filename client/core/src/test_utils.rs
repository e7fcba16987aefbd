//! Test Utilities
//!
//! Scripted transport and recording observer for exercising sessions,
//! fallback and cancellation without a live backend.
//!
//! # Usage
//!
//! ```ignore
//! let transport = ScriptedTransport::new();
//! transport.push_stream(StreamScript::lines(&[r#"{"type":"response_end"}"#]));
//! transport.push_response("/chat", Ok(json!({"response": "hi", "model": "m"})));
//!
//! // After the test, verify what was requested
//! assert_eq!(transport.json_requests("/chat").len(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;

use crate::streaming::{PullProgress, SessionObserver, SessionState, TerminalEvent};
use crate::transport::{ApiRequest, ByteStream, Transport, TransportError};

// ============================================================================
// Scripted Transport
// ============================================================================

/// How one `open_stream` call behaves
pub enum StreamScript {
    /// Opening the stream fails outright
    Fail(TransportError),
    /// Stream yields these chunks, then ends
    Chunks(Vec<Result<Bytes, TransportError>>),
    /// Stream yields these chunks, then never produces anything else
    ChunksThenHang(Vec<Result<Bytes, TransportError>>),
}

impl StreamScript {
    /// One chunk per line, each terminated by `\n`
    pub fn lines(lines: &[&str]) -> Self {
        Self::Chunks(
            lines
                .iter()
                .map(|l| Ok(Bytes::from(format!("{l}\n"))))
                .collect(),
        )
    }

    /// Lines followed by a mid-stream transport failure
    pub fn lines_then_error(lines: &[&str], error: TransportError) -> Self {
        let mut chunks: Vec<_> = lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{l}\n"))))
            .collect();
        chunks.push(Err(error));
        Self::Chunks(chunks)
    }

    /// Lines, then a stream that stays open forever
    pub fn lines_then_hang(lines: &[&str]) -> Self {
        Self::ChunksThenHang(
            lines
                .iter()
                .map(|l| Ok(Bytes::from(format!("{l}\n"))))
                .collect(),
        )
    }
}

/// In-memory transport driven by scripts
#[derive(Default)]
pub struct ScriptedTransport {
    streams: Mutex<VecDeque<StreamScript>>,
    responses: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    stream_log: Mutex<Vec<ApiRequest>>,
    json_log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior of the next `open_stream` call
    pub fn push_stream(&self, script: StreamScript) {
        self.streams.lock().push_back(script);
    }

    /// Queue a response for the next `send_json` call to `path`
    pub fn push_response(&self, path: &str, response: Result<Value, TransportError>) {
        self.responses
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// Delay every `send_json` call to `path`
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.delays.lock().insert(path.to_string(), delay);
    }

    /// All streaming requests seen so far
    pub fn stream_requests(&self) -> Vec<ApiRequest> {
        self.stream_log.lock().clone()
    }

    /// Non-streaming requests seen for `path`
    pub fn json_requests(&self, path: &str) -> Vec<ApiRequest> {
        self.json_log
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open_stream(&self, request: &ApiRequest) -> Result<ByteStream, TransportError> {
        self.stream_log.lock().push(request.clone());
        let script = self.streams.lock().pop_front();
        match script {
            Some(StreamScript::Fail(e)) => Err(e),
            Some(StreamScript::Chunks(chunks)) => Ok(stream::iter(chunks).boxed()),
            Some(StreamScript::ChunksThenHang(chunks)) => {
                Ok(stream::iter(chunks).chain(stream::pending()).boxed())
            }
            None => Err(TransportError::Connect("no scripted stream".to_string())),
        }
    }

    async fn send_json(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        self.json_log.lock().push(request.clone());
        let delay = self.delays.lock().get(&request.path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::Connect("no scripted response".to_string())))
    }
}

// ============================================================================
// Recording Observer
// ============================================================================

/// A callback as recorded by [`RecordingObserver`]
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    State(SessionState),
    Thinking(String),
    ResponseStart(Option<String>),
    Content { delta: String, accumulated: String },
    Progress(f64),
    Terminal(TerminalEvent),
    Error { message: String, partial: Option<String> },
    Cancelled,
}

/// Observer that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub calls: Vec<Recorded>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls other than state changes
    pub fn events(&self) -> Vec<Recorded> {
        self.calls
            .iter()
            .filter(|c| !matches!(c, Recorded::State(_)))
            .cloned()
            .collect()
    }

    /// Recorded state changes
    pub fn states(&self) -> Vec<SessionState> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Recorded::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    /// Number of calls matching `pred`
    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Last accumulated content
    pub fn rendered(&self) -> Option<String> {
        self.calls.iter().rev().find_map(|c| match c {
            Recorded::Content { accumulated, .. } => Some(accumulated.clone()),
            _ => None,
        })
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state(&mut self, state: SessionState) {
        self.calls.push(Recorded::State(state));
    }

    fn on_thinking(&mut self, text: &str) {
        self.calls.push(Recorded::Thinking(text.to_string()));
    }

    fn on_response_start(&mut self, model: Option<&str>, _debug_info: Option<&Value>) {
        self.calls.push(Recorded::ResponseStart(model.map(String::from)));
    }

    fn on_content(&mut self, delta: &str, accumulated: &str) {
        self.calls.push(Recorded::Content {
            delta: delta.to_string(),
            accumulated: accumulated.to_string(),
        });
    }

    fn on_progress(&mut self, progress: &PullProgress) {
        self.calls.push(Recorded::Progress(progress.percent));
    }

    fn on_terminal(&mut self, event: &TerminalEvent) {
        self.calls.push(Recorded::Terminal(event.clone()));
    }

    fn on_error(&mut self, message: &str, partial: Option<&str>) {
        self.calls.push(Recorded::Error {
            message: message.to_string(),
            partial: partial.map(String::from),
        });
    }

    fn on_cancelled(&mut self) {
        self.calls.push(Recorded::Cancelled);
    }
}
