//! Application State
//!
//! The process-wide mutable state of the client: which chat is current,
//! which sends are in flight and which download is active. Mutation goes
//! through the guard and the download manager; nothing else writes it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::download::DownloadCancellationManager;
use crate::guard::{ConcurrencyGuard, GuardError, OperationKey};
use crate::transport::Transport;

/// Shared client state
#[derive(Debug)]
pub struct AppState {
    guard: ConcurrencyGuard,
    downloads: DownloadCancellationManager,
    current_chat: Mutex<Option<String>>,
}

impl AppState {
    /// Create state with a fresh guard and download manager
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        dedup_window: std::time::Duration,
        cleanup_wait: std::time::Duration,
    ) -> Self {
        let guard = ConcurrencyGuard::new(dedup_window);
        let downloads = DownloadCancellationManager::new(guard.clone(), transport, cleanup_wait);
        Self {
            guard,
            downloads,
            current_chat: Mutex::new(None),
        }
    }

    /// Admission control
    #[must_use]
    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Download tracking
    #[must_use]
    pub fn downloads(&self) -> &DownloadCancellationManager {
        &self.downloads
    }

    /// The selected chat
    #[must_use]
    pub fn current_chat(&self) -> Option<String> {
        self.current_chat.lock().clone()
    }

    /// Select `chat_id` as the current chat
    ///
    /// # Errors
    ///
    /// [`GuardError::Busy`] while the current chat has a send in flight.
    pub fn switch_chat(&self, chat_id: impl Into<String>) -> Result<(), GuardError> {
        let chat_id = chat_id.into();
        let mut current = self.current_chat.lock();

        if let Some(ref active) = *current {
            let key = OperationKey::Chat(active.clone());
            if active != &chat_id && self.guard.is_active(&key) {
                return Err(GuardError::Busy { key });
            }
        }

        tracing::debug!(chat_id = %chat_id, "Switched chat");
        *current = Some(chat_id);
        Ok(())
    }

    /// Whether a foreground operation is in flight
    #[must_use]
    pub fn foreground_busy(&self) -> bool {
        self.guard.foreground_busy()
    }
}
