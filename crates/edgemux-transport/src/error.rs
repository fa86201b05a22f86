use std::time::Duration;

use edgemux_frame::FrameError;

/// Errors that can occur on a physical edge connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Encoding or decoding a frame failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The send was not confirmed within the allowed time.
    #[error("timed out after {0:?} waiting for send to complete")]
    Timeout(Duration),

    /// The caller's write deadline passed before the send was confirmed.
    #[error("write deadline exceeded")]
    DeadlineExceeded,

    /// The address string was not understood by any registered parser.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// True for both fixed timeouts and expired deadlines.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
