//! Remote channel errors
//!
//! Propagated verbatim to the caller of the terminal cursor operation. No
//! retry happens at this layer.

use thiserror::Error;

/// Result type for remote channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors reported by a `RemoteChannel`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Query could not be opened
    #[error("Remote open failed: {0}")]
    Open(String),

    /// Fetching the next row failed
    #[error("Remote next failed: {0}")]
    Next(String),

    /// Releasing the query failed
    #[error("Remote close failed: {0}")]
    Close(String),

    /// Handle unknown to the channel, or already closed
    #[error("Unknown or closed query handle {0}")]
    UnknownHandle(u64),
}

impl ChannelError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::Open(_) => "ENTIQ_REMOTE_OPEN",
            ChannelError::Next(_) => "ENTIQ_REMOTE_NEXT",
            ChannelError::Close(_) => "ENTIQ_REMOTE_CLOSE",
            ChannelError::UnknownHandle(_) => "ENTIQ_REMOTE_HANDLE",
        }
    }
}
