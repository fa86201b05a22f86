use std::fmt;

use edgemux_frame::FrameError;
use edgemux_transport::TransportError;

/// Errors that can occur in edge operations.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    /// Physical connection error, including send timeouts.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON serialization/deserialization of a control body failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A control frame had a different content type than its body implies.
    #[error("unexpected content type {actual:#x} (expected {expected:#x})")]
    UnexpectedContentType { expected: u32, actual: u32 },

    /// A sink with this connection id is already registered.
    #[error("message sink with id {0} already exists")]
    DuplicateSink(u32),

    /// The multiplexer has shut down.
    #[error("message mux is closed")]
    MuxClosed,

    /// The logical connection is closed.
    #[error("edge connection {0} is closed")]
    ConnClosed(u32),

    /// No listener is hosting with this session token.
    #[error("no listener for session {0}")]
    UnknownSession(String),

    /// The listener is closed.
    #[error("listener is closed")]
    ListenerClosed,

    /// The listener was closed because of an earlier failure.
    #[error("listener is closed ({0})")]
    ListenerClosedWith(#[source] Box<EdgeError>),

    /// Several children of a multi-listener failed.
    #[error(transparent)]
    Multiple(MultipleErrors),
}

impl EdgeError {
    /// True when a send was not confirmed in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, EdgeError>;

/// Ordered collection of errors from a broadcast operation.
#[derive(Debug)]
pub struct MultipleErrors(Vec<EdgeError>);

impl MultipleErrors {
    pub fn errors(&self) -> &[EdgeError] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<EdgeError> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MultipleErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => f.write_str("no errors occurred"),
            [only] => write!(f, "{only}"),
            errors => {
                f.write_str("multiple errors occurred")?;
                for (idx, err) in errors.iter().enumerate() {
                    write!(f, " {idx}: {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultipleErrors {}

/// Zero errors is success, one is returned as-is, more are wrapped in order.
pub fn condense(mut errors: Vec<EdgeError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(EdgeError::Multiple(MultipleErrors(errors))),
    }
}
