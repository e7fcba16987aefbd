//! Streaming
//!
//! Everything between a live response body and the observer callbacks:
//!
//! - [`parser`]: frame to [`StreamEvent`] decoding for both dialects
//! - [`session`]: the per-exchange state machine
//! - [`fallback`]: one non-streaming retry for failures before output
//! - [`observer`]: callback trait and channel adapter for surfaces

pub mod events;
pub mod fallback;
pub mod observer;
pub mod parser;
pub mod session;

pub use events::{PullProgress, SessionState, SessionUpdate, StreamEvent, TerminalEvent};
pub use fallback::{Delivery, DeliveryPath, FallbackCoordinator, FallbackError};
pub use observer::{ChannelObserver, NullObserver, SessionObserver};
pub use parser::{parse_frame, Dialect, FrameOutcome, SSE_DATA_PREFIX};
pub use session::{
    CompletedStream, MessageBuffer, OperationDescriptor, SessionOutcome, StreamError,
    StreamSession,
};
