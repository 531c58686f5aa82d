//! Error types for workplace-sync.

use thiserror::Error;

use workplace_core::StoreError;

use crate::frame::FrameError;

/// All errors that can arise from notification sync operations.
///
/// REST failures are split the way callers need to react to them: `Auth`
/// means sign in again, `Network` means retry later, `Server` means the
/// request reached the server and was refused.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No usable access token, or the server rejected it. No request is sent
    /// when the token is missing.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The request could not complete (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The request completed but the server reported failure.
    #[error("server error: {0}")]
    Server(String),

    /// The push channel could not be established or was lost.
    #[error("push channel error: {0}")]
    Connection(String),

    /// A newer fetch was issued before this one completed; its result was
    /// discarded.
    #[error("fetch superseded by a newer request")]
    Superseded,

    /// A malformed push-channel frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A configured endpoint cannot be used.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("configuration error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The sync service has stopped.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}
