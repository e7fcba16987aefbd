//! Download Cancellation
//!
//! Owns the single active model download. Cancelling runs two effects
//! concurrently and waits for both, bounded by `cleanup_wait`:
//!
//! - abort: fire the download's token, then wait until the stream task has
//!   actually stopped reading
//! - cleanup: ask the backend to discard the partial download
//!
//! Cleanup is best effort. Its failure is logged and reported in the
//! [`CancelOutcome`], but the cancellation itself always succeeds once the
//! abort has fired.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::PullRequest;
use crate::guard::{ConcurrencyGuard, GuardError, OperationKey, OperationPermit};
use crate::transport::Transport;

/// The active download
#[derive(Clone, Debug)]
pub struct DownloadHandle {
    /// Model being pulled
    pub model_name: String,
    /// Fires to stop the stream read
    pub abort: CancellationToken,
    /// When the pull started
    pub started_at: Instant,
    id: u64,
}

/// What server cleanup did after a cancel
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CleanupStatus {
    /// Backend acknowledged the cleanup
    Acknowledged,
    /// Cleanup request failed
    Failed(String),
    /// Abort and cleanup did not both finish within the wait
    TimedOut,
}

impl CleanupStatus {
    /// Whether the backend may still hold partial download state
    #[must_use]
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::Acknowledged)
    }
}

/// Result of [`DownloadCancellationManager::cancel`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing to cancel
    NoActiveDownload,
    /// Another cancel of the same download is in progress
    AlreadyCancelling,
    /// Download aborted
    Cancelled {
        /// Model that was being pulled
        model_name: String,
        /// Server cleanup result
        cleanup: CleanupStatus,
    },
}

struct ActiveDownload {
    handle: DownloadHandle,
    stopped: CancellationToken,
    cancelling: bool,
    _permit: OperationPermit,
}

struct ManagerInner {
    guard: ConcurrencyGuard,
    transport: Arc<dyn Transport>,
    slot: Mutex<Option<ActiveDownload>>,
    cleanup_wait: Duration,
    next_id: AtomicU64,
}

impl ManagerInner {
    /// Drop the slot entry if it still belongs to download `id`
    fn clear(&self, id: u64, even_if_cancelling: bool) {
        let finished = {
            let mut slot = self.slot.lock();
            let owned = slot
                .as_ref()
                .is_some_and(|a| a.handle.id == id && (even_if_cancelling || !a.cancelling));
            if owned {
                slot.take()
            } else {
                None
            }
        };
        // Permit released outside the slot lock
        drop(finished);
    }

    /// A cancel of download `id` stopped waiting before its barrier settled
    ///
    /// If the reader has already let go the slot clears now; otherwise the
    /// ticket clears it when the reader drops it.
    fn abandon_cancel(&self, id: u64) {
        let finished = {
            let mut slot = self.slot.lock();
            let reader_gone = match slot.as_mut() {
                Some(active) if active.handle.id == id => {
                    active.cancelling = false;
                    active.stopped.is_cancelled()
                }
                _ => false,
            };
            if reader_gone {
                slot.take()
            } else {
                None
            }
        };
        drop(finished);
    }
}

/// Settles the slot for one `cancel()` call, however that call ends
struct CancelInFlight<'a> {
    manager: &'a ManagerInner,
    id: u64,
    settled: bool,
}

impl Drop for CancelInFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            self.manager.clear(self.id, true);
        } else {
            tracing::debug!(id = self.id, "Download cancel dropped before settling");
            self.manager.abandon_cancel(self.id);
        }
    }
}

/// Tracks at most one download globally
#[derive(Clone)]
pub struct DownloadCancellationManager {
    inner: Arc<ManagerInner>,
}

impl DownloadCancellationManager {
    /// Create a manager sharing `guard`'s download slot
    #[must_use]
    pub fn new(guard: ConcurrencyGuard, transport: Arc<dyn Transport>, cleanup_wait: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                guard,
                transport,
                slot: Mutex::new(None),
                cleanup_wait,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a new download of `model_name`
    ///
    /// The returned ticket must live for as long as the stream task reads;
    /// dropping it signals that the read has stopped.
    ///
    /// # Errors
    ///
    /// [`GuardError::Busy`] if a download is already active.
    pub fn begin(&self, model_name: &str) -> Result<DownloadTicket, GuardError> {
        let permit = self.inner.guard.acquire(OperationKey::Download)?;
        let handle = DownloadHandle {
            model_name: model_name.to_string(),
            abort: CancellationToken::new(),
            started_at: Instant::now(),
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let stopped = CancellationToken::new();

        let ticket = DownloadTicket {
            manager: Arc::clone(&self.inner),
            id: handle.id,
            model_name: handle.model_name.clone(),
            abort: handle.abort.clone(),
            stopped: stopped.clone(),
        };

        tracing::info!(model = %model_name, "Download started");
        *self.inner.slot.lock() = Some(ActiveDownload {
            handle,
            stopped,
            cancelling: false,
            _permit: permit,
        });
        Ok(ticket)
    }

    /// The active download, if any
    #[must_use]
    pub fn current(&self) -> Option<DownloadHandle> {
        self.inner.slot.lock().as_ref().map(|a| a.handle.clone())
    }

    /// Whether a download is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// Cancel the active download
    ///
    /// Idempotent: with no active download, or while another cancel is in
    /// flight, nothing is aborted and no cleanup request is sent.
    pub async fn cancel(&self) -> CancelOutcome {
        let (handle, stopped) = {
            let mut slot = self.inner.slot.lock();
            match slot.as_mut() {
                None => return CancelOutcome::NoActiveDownload,
                Some(active) if active.cancelling => return CancelOutcome::AlreadyCancelling,
                Some(active) => {
                    active.cancelling = true;
                    (active.handle.clone(), active.stopped.clone())
                }
            }
        };

        let mut in_flight = CancelInFlight {
            manager: &self.inner,
            id: handle.id,
            settled: false,
        };
        tracing::info!(model = %handle.model_name, "Cancelling download");

        let abort = async {
            handle.abort.cancel();
            stopped.cancelled().await;
        };
        let cleanup_request = PullRequest {
            name: handle.model_name.clone(),
        }
        .cancel_request();
        let cleanup = self.inner.transport.send_json(&cleanup_request);

        let barrier = async { tokio::join!(abort, cleanup) };
        let cleanup = match tokio::time::timeout(self.inner.cleanup_wait, barrier).await {
            Ok(((), Ok(_))) => CleanupStatus::Acknowledged,
            Ok(((), Err(e))) => {
                tracing::warn!(model = %handle.model_name, error = %e, "Download cleanup failed");
                CleanupStatus::Failed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    model = %handle.model_name,
                    wait_ms = self.inner.cleanup_wait.as_millis(),
                    "Download cancellation did not settle in time"
                );
                CleanupStatus::TimedOut
            }
        };

        in_flight.settled = true;
        drop(in_flight);

        CancelOutcome::Cancelled {
            model_name: handle.model_name,
            cleanup,
        }
    }
}

impl fmt::Debug for DownloadCancellationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadCancellationManager")
            .field("current", &self.current().map(|h| h.model_name))
            .field("cleanup_wait", &self.inner.cleanup_wait)
            .finish()
    }
}

/// Held by the task reading a download stream
pub struct DownloadTicket {
    manager: Arc<ManagerInner>,
    id: u64,
    model_name: String,
    abort: CancellationToken,
    stopped: CancellationToken,
}

impl DownloadTicket {
    /// Token the stream session should watch
    #[must_use]
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Model being pulled
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl fmt::Debug for DownloadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTicket")
            .field("id", &self.id)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl Drop for DownloadTicket {
    fn drop(&mut self) {
        self.stopped.cancel();
        // A cancel in progress clears the slot itself once its barrier settles
        self.manager.clear(self.id, false);
    }
}
