use std::sync::Arc;

use edgemux_frame::{FrameConfig, FrameError, Message, MessageCodec, DEFAULT_MAX_PAYLOAD};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Channel, Priority, ReceiveHandler, SendCompletion};

/// Configuration for a [`FramedChannel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name used in logs, typically the router name.
    pub label: String,
    /// Maximum header block plus body size in either direction.
    pub max_payload_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            label: "edge".to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

struct Outbound {
    msg: Message,
    done: oneshot::Sender<Result<()>>,
}

/// [`Channel`] over any async byte stream, framed with the edge wire format.
///
/// Spawns a writer task that drains the priority queues and a reader task that
/// feeds the [`ReceiveHandler`]. Both stop when the channel is closed or the
/// stream fails.
pub struct FramedChannel {
    label: String,
    highest: mpsc::UnboundedSender<Outbound>,
    high: mpsc::UnboundedSender<Outbound>,
    standard: mpsc::UnboundedSender<Outbound>,
    closed: CancellationToken,
}

impl FramedChannel {
    /// Start reader and writer tasks over `reader` / `writer`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<R, W>(
        reader: R,
        writer: W,
        handler: Arc<dyn ReceiveHandler>,
        config: ChannelConfig,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (highest, highest_rx) = mpsc::unbounded_channel();
        let (high, high_rx) = mpsc::unbounded_channel();
        let (standard, standard_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let codec = MessageCodec::new(FrameConfig {
            max_payload_size: config.max_payload_size,
        });

        tokio::spawn(run_writer(
            config.label.clone(),
            FramedWrite::new(writer, codec.clone()),
            PriorityQueues {
                highest: highest_rx,
                high: high_rx,
                standard: standard_rx,
            },
            closed.clone(),
        ));
        tokio::spawn(run_reader(
            config.label.clone(),
            FramedRead::new(reader, codec),
            handler,
            closed.clone(),
        ));

        debug!(label = %config.label, "edge channel started");
        Arc::new(Self {
            label: config.label,
            highest,
            high,
            standard,
            closed,
        })
    }
}

impl Channel for FramedChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn send_and_sync(&self, msg: Message, priority: Priority) -> Result<SendCompletion> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Shutdown);
        }
        let (done, completion) = SendCompletion::pair();
        let queue = match priority {
            Priority::Highest => &self.highest,
            Priority::High => &self.high,
            Priority::Standard => &self.standard,
        };
        queue
            .send(Outbound { msg, done })
            .map_err(|_| TransportError::Shutdown)?;
        Ok(completion)
    }

    fn close(&self) {
        if !self.closed.is_cancelled() {
            debug!(label = %self.label, "closing edge channel");
            self.closed.cancel();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl Drop for FramedChannel {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

struct PriorityQueues {
    highest: mpsc::UnboundedReceiver<Outbound>,
    high: mpsc::UnboundedReceiver<Outbound>,
    standard: mpsc::UnboundedReceiver<Outbound>,
}

async fn run_writer<W>(
    label: String,
    mut sink: FramedWrite<W, MessageCodec>,
    mut queues: PriorityQueues,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let outbound = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            Some(outbound) = queues.highest.recv() => outbound,
            Some(outbound) = queues.high.recv() => outbound,
            Some(outbound) = queues.standard.recv() => outbound,
            else => break,
        };

        if outbound.done.is_closed() {
            trace!(%label, content_type = outbound.msg.content_type, "sender stopped waiting; frame skipped");
            continue;
        }

        match sink.send(outbound.msg).await {
            Ok(()) => {
                let _ = outbound.done.send(Ok(()));
            }
            Err(FrameError::Io(error)) => {
                warn!(%label, %error, "edge channel write failed");
                let _ = outbound.done.send(Err(TransportError::Io(error)));
                closed.cancel();
                break;
            }
            // Rejected by the encoder before any byte reached the stream.
            Err(error) => {
                warn!(%label, %error, "edge channel rejected frame");
                let _ = outbound.done.send(Err(error.into()));
            }
        }
    }

    // Pending completions resolve to Shutdown once their senders drop here.
    queues.highest.close();
    queues.high.close();
    queues.standard.close();
    debug!(%label, "edge channel writer stopped");
}

async fn run_reader<R>(
    label: String,
    mut stream: FramedRead<R, MessageCodec>,
    handler: Arc<dyn ReceiveHandler>,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(msg)) => {
                    trace!(%label, content_type = msg.content_type, "received frame");
                    handler.handle_receive(msg).await;
                }
                Some(Err(error)) => {
                    warn!(%label, %error, "edge channel read failed");
                    break;
                }
                None => {
                    debug!(%label, "edge channel closed by peer");
                    break;
                }
            },
        }
    }

    closed.cancel();
    handler.handle_close().await;
}
