//! Docchat Core - Headless Streaming Client for the Document Chat Service
//!
//! This crate holds everything a docchat front-end needs below rendering:
//! decoding streamed answers and model-pull progress, falling back to the
//! non-streaming API, single-flight admission, download cancellation with
//! server cleanup, and background refresh. It can drive a terminal client,
//! a GUI, or run headless in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Surfaces (CLI, GUI, tests)                    │
//! │            SessionObserver callbacks / SessionUpdate channel      │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                         DOCCHAT CORE                             │
//! │  ┌────────────────────────────┴───────────────────────────────┐  │
//! │  │                       DocChatClient                         │  │
//! │  │  ┌──────────┐  ┌────────────┐  ┌───────────┐  ┌──────────┐  │  │
//! │  │  │ AppState │  │  Fallback  │  │ Download  │  │  Poller  │  │  │
//! │  │  │ + Guard  │  │Coordinator │  │  Manager  │  │          │  │  │
//! │  │  └──────────┘  └─────┬──────┘  └───────────┘  └──────────┘  │  │
//! │  │                 StreamSession                               │  │
//! │  │            framer ─▶ parser ─▶ events                      │  │
//! │  └────────────────────────┬───────────────────────────────────┘  │
//! │                       Transport                                   │
//! └───────────────────────────┼──────────────────────────────────────┘
//!                             │ HTTP (reqwest)
//!                      docchat backend
//! ```
//!
//! # Module Overview
//!
//! - [`transport`]: transport trait, HTTP implementation and byte framing
//! - [`streaming`]: frame parsing, session state machine, fallback, observers
//! - [`guard`]: single-flight admission and duplicate rejection
//! - [`download`]: active download tracking and cancellation
//! - [`poller`]: periodic background refresh
//! - [`state`]: application state shared by all of the above
//! - [`api`]: endpoint paths and request/response types
//! - [`config`]: TOML, environment and CLI configuration
//! - [`client`]: the facade surfaces use

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod guard;
pub mod poller;
pub mod state;
pub mod streaming;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::{
    ChatRequest, ChatResponse, ChatSummary, EngineStatus, MemoryInfo, ModelInfo, ModelsResponse,
    PullRequest, StatusResponse,
};
pub use client::{DocChatClient, Refresh};
pub use download::{CancelOutcome, CleanupStatus, DownloadCancellationManager, DownloadHandle, DownloadTicket};
pub use error::{ClientError, Result};
pub use guard::{ConcurrencyGuard, GuardError, OperationKey, OperationPermit, PendingOperation};
pub use poller::{PollTask, Poller, PollerStats, TickOutcome};
pub use state::AppState;

// Streaming exports
pub use streaming::{
    ChannelObserver, CompletedStream, Delivery, DeliveryPath, Dialect, FallbackCoordinator,
    FallbackError, NullObserver, OperationDescriptor, PullProgress, SessionObserver,
    SessionOutcome, SessionState, SessionUpdate, StreamError, StreamEvent, StreamSession,
    TerminalEvent,
};

// Transport exports
pub use transport::{ApiRequest, HttpTransport, Transport, TransportError};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
