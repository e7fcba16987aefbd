//! Client error type
//!
//! Each concern owns a `thiserror` enum; [`ClientError`] unifies them for
//! the facade.

use thiserror::Error;

use crate::config::ConfigError;
use crate::guard::GuardError;
use crate::streaming::FallbackError;
use crate::transport::TransportError;

/// Any error the client facade returns
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request failed at the transport
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Streaming and fallback both failed, or no fallback applied
    #[error(transparent)]
    Fallback(#[from] FallbackError),

    /// Rejected before reaching the network
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Whether the operation was rejected without being attempted
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Guard(_))
    }
}

/// Result alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
