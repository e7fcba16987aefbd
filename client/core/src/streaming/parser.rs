//! Event Frame Parser
//!
//! Turns one text frame into at most one [`StreamEvent`]. Two dialects are
//! understood:
//!
//! - [`Dialect::JsonLines`]: bare JSON per line, used by chat streaming.
//!   Each object carries a `type` of `thinking`, `response_start`,
//!   `content`, `response_end` or `error`.
//! - [`Dialect::Sse`]: `data: `-prefixed JSON, used by model pulls. Each
//!   object carries `progress_percent`, `downloaded`, `total`, `status`,
//!   `completed` and optionally `error`.
//!
//! Parse failures never escape this module. A frame that cannot be decoded
//! is reported as [`FrameOutcome::NotParseable`] and the stream carries on.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::events::{PullProgress, StreamEvent};

/// Prefix of SSE data lines
pub const SSE_DATA_PREFIX: &str = "data:";

/// Frames at least this long that look like JSON but fail to decode are
/// reported as truncated rather than ignored quietly
const TRUNCATED_JSON_MIN_LEN: usize = 10;

/// Syntactic wrapping convention of a stream's frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// Bare JSON object per line
    JsonLines,
    /// `data: {json}` lines
    Sse,
}

/// Result of parsing one frame
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Nothing to emit (blank frame, non-data SSE line, unknown type)
    Skip,
    /// Frame could not be decoded; logged and dropped
    NotParseable,
    /// A decoded event
    Event {
        /// The event
        event: StreamEvent,
        /// Whether the payload signals completion of the session
        terminal: bool,
    },
}

impl FrameOutcome {
    fn event(event: StreamEvent) -> Self {
        let terminal = event.is_terminal();
        Self::Event { event, terminal }
    }
}

/// Parse one frame according to its dialect
#[must_use]
pub fn parse_frame(frame: &str, dialect: Dialect) -> FrameOutcome {
    if frame.trim().is_empty() {
        return FrameOutcome::Skip;
    }

    match dialect {
        Dialect::JsonLines => parse_chat_frame(frame.trim()),
        Dialect::Sse => match frame.strip_prefix(SSE_DATA_PREFIX) {
            Some(data) => {
                let data = data.trim();
                if data.is_empty() {
                    FrameOutcome::Skip
                } else {
                    parse_progress_frame(data)
                }
            }
            // event:, id:, retry: and comment lines carry nothing we use
            None => FrameOutcome::Skip,
        },
    }
}

/// Wire shape of a chat stream line
#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    debug_info: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

fn parse_chat_frame(data: &str) -> FrameOutcome {
    let frame: ChatFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(e) => return not_parseable(data, &e),
    };

    let outcome = match frame.kind.as_str() {
        "thinking" => FrameOutcome::event(StreamEvent::Thinking(frame.content.unwrap_or_default())),
        "response_start" => FrameOutcome::event(StreamEvent::ResponseStart {
            model: frame.model,
            debug_info: frame.debug_info,
        }),
        "content" => FrameOutcome::event(StreamEvent::Content(frame.content.unwrap_or_default())),
        "response_end" => FrameOutcome::event(StreamEvent::ResponseEnd),
        "error" => {
            let message = frame
                .message
                .or(frame.error)
                .or(frame.content)
                .unwrap_or_else(|| "Unknown streaming error".to_string());
            FrameOutcome::event(StreamEvent::Error(message))
        }
        other => {
            tracing::debug!(kind = %other, "Ignoring unknown chat frame type");
            FrameOutcome::Skip
        }
    };

    // A `done` flag on any frame also ends the exchange
    match outcome {
        FrameOutcome::Event { event, terminal } => FrameOutcome::Event {
            event,
            terminal: terminal || frame.done,
        },
        FrameOutcome::Skip if frame.done => FrameOutcome::event(StreamEvent::ResponseEnd),
        other => other,
    }
}

/// Wire shape of a pull progress line
#[derive(Debug, Deserialize)]
struct ProgressFrame {
    #[serde(default)]
    progress_percent: f64,
    #[serde(default, deserialize_with = "string_or_number")]
    downloaded: String,
    #[serde(default, deserialize_with = "string_or_number")]
    total: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
}

/// Accept sizes either pre-formatted (`"1.5 GB"`) or as raw numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn parse_progress_frame(data: &str) -> FrameOutcome {
    let frame: ProgressFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(e) => return not_parseable(data, &e),
    };

    if let Some(error) = frame.error {
        return FrameOutcome::event(StreamEvent::Error(error));
    }

    FrameOutcome::Event {
        event: StreamEvent::Progress(PullProgress {
            percent: frame.progress_percent.clamp(0.0, 100.0),
            downloaded: frame.downloaded,
            total: frame.total,
            status: frame.status,
            model_name: frame.model_name,
        }),
        terminal: frame.completed,
    }
}

fn not_parseable(data: &str, error: &serde_json::Error) -> FrameOutcome {
    if data.contains('{') && data.len() > TRUNCATED_JSON_MIN_LEN {
        tracing::warn!(
            len = data.len(),
            error = %error,
            "Dropping frame that looks like truncated JSON"
        );
    } else {
        tracing::debug!(frame = %data, error = %error, "Dropping unparseable frame");
    }
    FrameOutcome::NotParseable
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(frame: &str, dialect: Dialect) -> (StreamEvent, bool) {
        match parse_frame(frame, dialect) {
            FrameOutcome::Event { event, terminal } => (event, terminal),
            other => panic!("expected event for {frame:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_chat_frame_types() {
        assert_eq!(
            event(r#"{"type":"thinking","content":"Reading 3 chunks"}"#, Dialect::JsonLines),
            (StreamEvent::Thinking("Reading 3 chunks".to_string()), false)
        );
        assert_eq!(
            event(
                r#"{"type":"response_start","model":"llama3.2","debug_info":{"chunks":3}}"#,
                Dialect::JsonLines
            ),
            (
                StreamEvent::ResponseStart {
                    model: Some("llama3.2".to_string()),
                    debug_info: Some(serde_json::json!({"chunks": 3})),
                },
                false
            )
        );
        assert_eq!(
            event(r#"{"type":"content","content":"Hel"}"#, Dialect::JsonLines),
            (StreamEvent::Content("Hel".to_string()), false)
        );
        assert_eq!(
            event(r#"{"type":"response_end"}"#, Dialect::JsonLines),
            (StreamEvent::ResponseEnd, true)
        );
        assert_eq!(
            event(r#"{"type":"error","message":"model crashed"}"#, Dialect::JsonLines),
            (StreamEvent::Error("model crashed".to_string()), true)
        );
    }

    #[test]
    fn test_done_flag_is_terminal() {
        assert_eq!(
            event(r#"{"type":"content","content":"!","done":true}"#, Dialect::JsonLines),
            (StreamEvent::Content("!".to_string()), true)
        );
        assert_eq!(
            event(r#"{"type":"stats","done":true}"#, Dialect::JsonLines),
            (StreamEvent::ResponseEnd, true)
        );
    }

    #[test]
    fn test_blank_and_unknown_frames_skip() {
        assert_eq!(parse_frame("   ", Dialect::JsonLines), FrameOutcome::Skip);
        assert_eq!(parse_frame("\t", Dialect::Sse), FrameOutcome::Skip);
        assert_eq!(
            parse_frame(r#"{"type":"heartbeat"}"#, Dialect::JsonLines),
            FrameOutcome::Skip
        );
    }

    #[test]
    fn test_malformed_json_is_not_fatal() {
        assert_eq!(
            parse_frame(r#"{"type":"content","cont"#, Dialect::JsonLines),
            FrameOutcome::NotParseable
        );
        assert_eq!(parse_frame("garbage", Dialect::JsonLines), FrameOutcome::NotParseable);
        assert_eq!(
            parse_frame(r#"data: {"progress_percent": 4"#, Dialect::Sse),
            FrameOutcome::NotParseable
        );
    }

    #[test]
    fn test_sse_prefix_handling() {
        assert_eq!(parse_frame("event: progress", Dialect::Sse), FrameOutcome::Skip);
        assert_eq!(parse_frame(": keep-alive", Dialect::Sse), FrameOutcome::Skip);
        assert_eq!(parse_frame("data:   ", Dialect::Sse), FrameOutcome::Skip);

        let (ev, terminal) = event(
            r#"data:{"progress_percent":10,"downloaded":"1.0 GB","total":"4.0 GB","status":"pulling"}"#,
            Dialect::Sse,
        );
        assert!(!terminal);
        assert_eq!(
            ev,
            StreamEvent::Progress(PullProgress {
                percent: 10.0,
                downloaded: "1.0 GB".to_string(),
                total: "4.0 GB".to_string(),
                status: "pulling".to_string(),
                model_name: None,
            })
        );
    }

    #[test]
    fn test_sse_numeric_sizes_and_completion() {
        let (ev, terminal) = event(
            r#"data: {"progress_percent":100,"downloaded":2048,"total":2048,"status":"success","completed":true,"model_name":"phi3.5:mini"}"#,
            Dialect::Sse,
        );
        assert!(terminal);
        match ev {
            StreamEvent::Progress(progress) => {
                assert_eq!(progress.downloaded, "2048");
                assert_eq!(progress.total, "2048");
                assert_eq!(progress.status, "success");
                assert_eq!(progress.model_name.as_deref(), Some("phi3.5:mini"));
            }
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[test]
    fn test_sse_error_wins_over_completed() {
        let (ev, terminal) = event(
            r#"data: {"status":"error","error":"Failed to pull model x","completed":true,"progress_percent":0}"#,
            Dialect::Sse,
        );
        assert!(terminal);
        assert_eq!(ev, StreamEvent::Error("Failed to pull model x".to_string()));
    }

    #[test]
    fn test_chat_lines_are_not_sse() {
        // A chat line that happens to start with "data:" is not valid JSON
        assert_eq!(
            parse_frame(r#"data: {"type":"content"}"#, Dialect::JsonLines),
            FrameOutcome::NotParseable
        );
    }
}
