//! Client Facade
//!
//! [`DocChatClient`] is what a surface talks to. It admits operations
//! through the application state, runs streaming sessions with fallback,
//! and exposes the conventional endpoints and background pollers.
//!
//! # Usage
//!
//! ```ignore
//! let client = DocChatClient::new(load_config()?)?;
//! let (mut observer, mut updates) = ChannelObserver::new();
//!
//! tokio::spawn(async move {
//!     while let Some(update) = updates.recv().await {
//!         render(update);
//!     }
//! });
//!
//! client.send_chat("chat-1", "What does chapter 2 say?", CancellationToken::new(), &mut observer).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{paths, ChatRequest, ChatSummary, MemoryInfo, ModelsResponse, PullRequest, StatusResponse};
use crate::config::ClientConfig;
use crate::download::CancelOutcome;
use crate::error::{ClientError, Result};
use crate::poller::{PollTask, Poller};
use crate::state::AppState;
use crate::streaming::{Delivery, FallbackCoordinator, SessionObserver, SessionOutcome, StreamSession};
use crate::transport::{ApiRequest, HttpTransport, Transport, TransportError};

/// A background refresh result
#[derive(Clone, Debug, PartialEq)]
pub enum Refresh {
    /// Backend status
    Status(StatusResponse),
    /// Memory usage
    Memory(MemoryInfo),
    /// Chats of the configured project
    Chats(Vec<ChatSummary>),
}

/// Client for the document chat backend; clones share state
#[derive(Clone)]
pub struct DocChatClient {
    transport: Arc<dyn Transport>,
    state: Arc<AppState>,
    config: ClientConfig,
}

impl DocChatClient {
    /// Create a client talking HTTP to the configured backend
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.server)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over any transport
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let state = AppState::new(
            Arc::clone(&transport),
            config.chat.dedup_window(),
            config.download.cleanup_wait(),
        );
        Self {
            transport,
            state: Arc::new(state),
            config,
        }
    }

    /// Shared application state
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------------

    /// Send `query` to `chat_id` and stream the answer into `observer`
    ///
    /// The chat is held busy until the answer completes, fails or is
    /// cancelled through `cancel`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Guard`] if the send is a duplicate or the chat is busy
    /// (nothing is sent); [`ClientError::Fallback`] if the answer failed.
    pub async fn send_chat(
        &self,
        chat_id: &str,
        query: &str,
        cancel: CancellationToken,
        observer: &mut dyn SessionObserver,
    ) -> Result<Delivery> {
        let _permit = self.state.guard().acquire_message(chat_id, query)?;

        let request = ChatRequest {
            query: query.to_string(),
            project: self.config.chat.project.clone(),
            chat_id: chat_id.to_string(),
            debug: self.config.chat.debug,
        };
        let idempotency_key = Uuid::new_v4().to_string();
        tracing::info!(chat_id = %chat_id, key = %idempotency_key, "Sending chat message");

        let session = StreamSession::new(request.descriptor(&idempotency_key), cancel);
        let delivery = FallbackCoordinator::run(self.transport.as_ref(), session, observer).await?;
        Ok(delivery)
    }

    // ------------------------------------------------------------------------
    // Model downloads
    // ------------------------------------------------------------------------

    /// Pull `model_name`, streaming progress into `observer`
    ///
    /// Returns [`SessionOutcome::Cancelled`] if [`Self::cancel_download`]
    /// stopped it.
    ///
    /// # Errors
    ///
    /// [`ClientError::Guard`] if another download is active;
    /// [`ClientError::Fallback`] if the pull failed.
    pub async fn pull_model(
        &self,
        model_name: &str,
        observer: &mut dyn SessionObserver,
    ) -> Result<SessionOutcome> {
        let ticket = self.state.downloads().begin(model_name)?;
        let pull = PullRequest {
            name: model_name.to_string(),
        };

        let session = StreamSession::new(pull.descriptor(), ticket.abort_token());
        let result = FallbackCoordinator::run(self.transport.as_ref(), session, observer).await;
        drop(ticket);

        Ok(result?.outcome)
    }

    /// Cancel the active download, if any
    pub async fn cancel_download(&self) -> CancelOutcome {
        self.state.downloads().cancel().await
    }

    // ------------------------------------------------------------------------
    // Conventional endpoints
    // ------------------------------------------------------------------------

    /// `GET /status`
    ///
    /// # Errors
    ///
    /// Transport or decode failure.
    pub async fn fetch_status(&self) -> Result<StatusResponse> {
        self.get_json(paths::STATUS).await
    }

    /// `GET /system/memory`
    ///
    /// # Errors
    ///
    /// Transport or decode failure.
    pub async fn fetch_memory(&self) -> Result<MemoryInfo> {
        self.get_json(paths::MEMORY).await
    }

    /// `GET /chats/{project}`
    ///
    /// # Errors
    ///
    /// Transport or decode failure.
    pub async fn list_chats(&self, project: &str) -> Result<Vec<ChatSummary>> {
        self.get_json(&paths::chats(project)).await
    }

    /// `GET /models`
    ///
    /// # Errors
    ///
    /// Transport or decode failure.
    pub async fn list_models(&self) -> Result<ModelsResponse> {
        self.get_json(paths::MODELS).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.transport.send_json(&ApiRequest::get(path)).await?;
        serde_json::from_value(value).map_err(|e| ClientError::from(TransportError::Decode(e.to_string())))
    }

    // ------------------------------------------------------------------------
    // Background refresh
    // ------------------------------------------------------------------------

    /// Status, memory and chat-list pollers publishing into `sink`
    #[must_use]
    pub fn pollers(&self, sink: &mpsc::UnboundedSender<Refresh>) -> Vec<Poller> {
        let polling = &self.config.polling;
        [
            ("status", polling.status_interval, RefreshKind::Status),
            ("memory", polling.memory_interval, RefreshKind::Memory),
            ("chats", polling.chats_interval, RefreshKind::Chats),
        ]
        .into_iter()
        .map(|(name, every, kind)| {
            let task = RefreshTask {
                client: self.clone(),
                kind,
                sink: sink.clone(),
            };
            Poller::new(name, every, self.state.guard().clone(), Arc::new(task))
        })
        .collect()
    }
}

impl std::fmt::Debug for DocChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocChatClient")
            .field("base_url", &self.config.server.base_url)
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
enum RefreshKind {
    Status,
    Memory,
    Chats,
}

struct RefreshTask {
    client: DocChatClient,
    kind: RefreshKind,
    sink: mpsc::UnboundedSender<Refresh>,
}

#[async_trait]
impl PollTask for RefreshTask {
    async fn refresh(&self) -> anyhow::Result<()> {
        let update = match self.kind {
            RefreshKind::Status => Refresh::Status(self.client.fetch_status().await?),
            RefreshKind::Memory => Refresh::Memory(self.client.fetch_memory().await?),
            RefreshKind::Chats => {
                let project = &self.client.config.chat.project;
                Refresh::Chats(self.client.list_chats(project).await?)
            }
        };
        self.sink
            .send(update)
            .map_err(|_| anyhow::anyhow!("refresh receiver dropped"))?;
        Ok(())
    }
}
