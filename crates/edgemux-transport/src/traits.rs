use std::time::Duration;

use async_trait::async_trait;
use edgemux_frame::Message;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Result, TransportError};

/// Outbound queue a frame is placed on. Higher priorities are always drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Bulk data.
    #[default]
    Standard,
    /// Latency-sensitive traffic.
    High,
    /// State and control frames that must not queue behind data.
    Highest,
}

/// A physical connection to one edge router.
///
/// Implementations must hand frames of equal priority to the transport in the
/// order `send_and_sync` was called.
pub trait Channel: Send + Sync {
    /// Identifies the connection in logs.
    fn label(&self) -> &str;

    /// Queue a frame. The returned completion resolves once the frame has been
    /// written and flushed, or with the error that prevented it.
    fn send_and_sync(&self, msg: Message, priority: Priority) -> Result<SendCompletion>;

    /// Stop the connection. Queued frames fail with [`TransportError::Shutdown`].
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Pending confirmation that a queued frame reached the transport.
///
/// Dropping it (for instance when a wait times out) tells the writer the
/// frame is no longer wanted; a frame that has not been written yet is then
/// skipped.
#[derive(Debug)]
pub struct SendCompletion {
    rx: oneshot::Receiver<Result<()>>,
}

impl SendCompletion {
    /// Create a completion and the sender that resolves it.
    pub fn pair() -> (oneshot::Sender<Result<()>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// A completion that has already resolved.
    pub fn ready(result: Result<()>) -> Self {
        let (tx, completion) = Self::pair();
        let _ = tx.send(result);
        completion
    }

    /// Wait without bound.
    pub async fn wait(self) -> Result<()> {
        self.rx.await.unwrap_or(Err(TransportError::Shutdown))
    }

    /// Wait at most `timeout`, failing with [`TransportError::Timeout`].
    pub async fn wait_timeout(self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Wait until `deadline`, failing with [`TransportError::DeadlineExceeded`].
    pub async fn wait_until(self, deadline: Instant) -> Result<()> {
        match tokio::time::timeout_at(deadline, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::DeadlineExceeded),
        }
    }
}

/// Consumer of inbound frames and of connection loss.
#[async_trait]
pub trait ReceiveHandler: Send + Sync {
    /// Called for each decoded frame, in arrival order. The reader does not
    /// read the next frame until this returns.
    async fn handle_receive(&self, msg: Message);

    /// Called once when the connection stops reading.
    async fn handle_close(&self);
}
