//! Concurrency Guard
//!
//! Single-flight admission per logical resource: one in-flight send per
//! chat id and one active download globally. Admission hands out an
//! [`OperationPermit`]; dropping the permit releases the key, so every exit
//! path (success, error, panic unwind, task abort) releases exactly once.
//!
//! Chat sends are additionally deduplicated: the same text for the same chat
//! within the dedup window is rejected as [`GuardError::Duplicate`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

// ============================================================================
// Keys and Operations
// ============================================================================

/// Logical resource an operation occupies
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperationKey {
    /// A send in the given chat
    Chat(String),
    /// The single global download slot
    Download,
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "chat {id}"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// An admitted operation
#[derive(Clone, Debug, PartialEq)]
pub struct PendingOperation {
    /// Resource held
    pub key: OperationKey,
    /// Monotonic admission token
    pub token: u64,
    /// When it was admitted
    pub started_at: Instant,
}

/// Admission rejections
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// The key already has an active operation
    #[error("Please wait, {key} already has an operation in progress")]
    Busy {
        /// The busy key
        key: OperationKey,
    },

    /// Same message sent again within the dedup window
    #[error("Duplicate message ignored for chat {chat_id}")]
    Duplicate {
        /// Chat the message was sent to
        chat_id: String,
    },
}

// ============================================================================
// Guard
// ============================================================================

#[derive(Default)]
struct GuardState {
    active: HashMap<OperationKey, PendingOperation>,
    last_sent: HashMap<String, (String, Instant)>,
}

struct GuardInner {
    state: Mutex<GuardState>,
    next_token: AtomicU64,
    dedup_window: Duration,
}

/// Shared admission control; clones share state
#[derive(Clone)]
pub struct ConcurrencyGuard {
    inner: Arc<GuardInner>,
}

impl ConcurrencyGuard {
    /// Create a guard with the given duplicate-message window
    #[must_use]
    pub fn new(dedup_window: Duration) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                state: Mutex::new(GuardState::default()),
                next_token: AtomicU64::new(1),
                dedup_window,
            }),
        }
    }

    /// Admit an operation on `key`
    ///
    /// # Errors
    ///
    /// [`GuardError::Busy`] if `key` is already active.
    pub fn acquire(&self, key: OperationKey) -> Result<OperationPermit, GuardError> {
        let mut state = self.inner.state.lock();
        self.admit(&mut state, key)
    }

    /// Admit a chat send of `text` to `chat_id`
    ///
    /// # Errors
    ///
    /// [`GuardError::Duplicate`] if the same text was admitted for this chat
    /// within the dedup window, otherwise [`GuardError::Busy`] if the chat
    /// already has a send in flight.
    pub fn acquire_message(&self, chat_id: &str, text: &str) -> Result<OperationPermit, GuardError> {
        let text = text.trim();
        let mut state = self.inner.state.lock();

        if let Some((last, at)) = state.last_sent.get(chat_id) {
            if last == text && at.elapsed() < self.inner.dedup_window {
                tracing::debug!(chat_id = %chat_id, "Rejecting duplicate message");
                return Err(GuardError::Duplicate {
                    chat_id: chat_id.to_string(),
                });
            }
        }

        let permit = self.admit(&mut state, OperationKey::Chat(chat_id.to_string()))?;
        state
            .last_sent
            .insert(chat_id.to_string(), (text.to_string(), Instant::now()));
        Ok(permit)
    }

    fn admit(
        &self,
        state: &mut GuardState,
        key: OperationKey,
    ) -> Result<OperationPermit, GuardError> {
        if state.active.contains_key(&key) {
            tracing::debug!(key = %key, "Rejecting operation, key busy");
            return Err(GuardError::Busy { key });
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        state.active.insert(
            key.clone(),
            PendingOperation {
                key: key.clone(),
                token,
                started_at: Instant::now(),
            },
        );
        tracing::trace!(key = %key, token, "Operation admitted");

        Ok(OperationPermit {
            guard: self.clone(),
            key,
            token,
        })
    }

    fn release(&self, key: &OperationKey, token: u64) {
        let mut state = self.inner.state.lock();
        // Only the permit that admitted the operation may clear it
        if state.active.get(key).is_some_and(|op| op.token == token) {
            state.active.remove(key);
            tracing::trace!(key = %key, token, "Operation released");
        }
    }

    /// Whether `key` has an active operation
    #[must_use]
    pub fn is_active(&self, key: &OperationKey) -> bool {
        self.inner.state.lock().active.contains_key(key)
    }

    /// Snapshot of active operations
    #[must_use]
    pub fn active(&self) -> Vec<PendingOperation> {
        self.inner.state.lock().active.values().cloned().collect()
    }

    /// Whether any chat send is in flight
    ///
    /// Background pollers skip their tick while this is true. Downloads run
    /// in the background and do not count.
    #[must_use]
    pub fn foreground_busy(&self) -> bool {
        self.inner
            .state
            .lock()
            .active
            .keys()
            .any(|key| matches!(key, OperationKey::Chat(_)))
    }
}

impl fmt::Debug for ConcurrencyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGuard")
            .field("active", &self.inner.state.lock().active.len())
            .field("dedup_window", &self.inner.dedup_window)
            .finish()
    }
}

// ============================================================================
// Permit
// ============================================================================

/// Scoped admission; releases its key on drop
#[must_use = "dropping the permit releases the operation immediately"]
pub struct OperationPermit {
    guard: ConcurrencyGuard,
    key: OperationKey,
    token: u64,
}

impl OperationPermit {
    /// Key held by this permit
    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Admission token
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Release now rather than at end of scope
    pub fn release(self) {}
}

impl fmt::Debug for OperationPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationPermit")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        self.guard.release(&self.key, self.token);
    }
}
