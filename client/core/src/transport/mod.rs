//! Transport Layer
//!
//! Provides abstraction over how requests reach the backend:
//! - [`Transport`]: async trait used by every higher layer
//! - [`HttpTransport`]: `reqwest` implementation
//! - [`ByteStreamFramer`]: newline framing of raw response bodies
//!
//! # Design Philosophy
//!
//! The transport layer separates the communication mechanism from the
//! streaming logic. Sessions see a byte stream and nothing else, so the
//! same state machine runs against a live server or a scripted test body.

pub mod frame;
pub mod http;
pub mod traits;

// Re-exports for convenience
pub use frame::{frames, ByteStreamFramer, StreamFrame};
pub use http::{HttpTransport, IDEMPOTENCY_HEADER};
pub use traits::{ApiRequest, ByteStream, Method, Transport, TransportError};
