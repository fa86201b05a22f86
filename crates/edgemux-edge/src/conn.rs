use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use edgemux_frame::STATE_CLOSED;
use edgemux_transport::Channel;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MsgChannelConfig;
use crate::control::state_closed;
use crate::error::{EdgeError, Result};
use crate::msg_channel::MsgChannel;
use crate::mux::{MsgEvent, MsgMux, MsgSink};

/// One logical connection over a shared physical connection.
///
/// Outbound data goes through its [`MsgChannel`]; inbound events arrive from
/// the [`MsgMux`] it is registered with and are buffered until [`EdgeConn::recv`].
pub struct EdgeConn {
    msg_channel: MsgChannel,
    mux: MsgMux,
    service: String,
    inbound_tx: mpsc::UnboundedSender<MsgEvent>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<MsgEvent>>,
    closed: CancellationToken,
    close_started: AtomicBool,
}

impl EdgeConn {
    /// Create the connection and register it with `mux` under `conn_id`.
    pub async fn connect(
        channel: Arc<dyn Channel>,
        mux: &MsgMux,
        conn_id: u32,
        service: impl Into<String>,
        config: MsgChannelConfig,
    ) -> Result<Arc<Self>> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            msg_channel: MsgChannel::new(channel, conn_id, config),
            mux: mux.clone(),
            service: service.into(),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            closed: CancellationToken::new(),
            close_started: AtomicBool::new(false),
        });
        mux.add_sink(conn.clone()).await?;
        debug!(conn_id, service = %conn.service, "edge connection registered");
        Ok(conn)
    }

    pub fn id(&self) -> u32 {
        self.msg_channel.id()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn msg_channel(&self) -> &MsgChannel {
        &self.msg_channel
    }

    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(EdgeError::ConnClosed(self.id()));
        }
        self.msg_channel.write(data).await
    }

    /// Next inbound event. Events buffered before close are still returned.
    pub async fn recv(&self) -> Result<MsgEvent> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            event = inbound.recv() => return event.ok_or(EdgeError::ConnClosed(self.id())),
            _ = self.closed.cancelled() => {}
        }
        inbound
            .try_recv()
            .map_err(|_| EdgeError::ConnClosed(self.id()))
    }

    /// Tell the router this connection is closing and unregister it.
    ///
    /// Local teardown happens even when the state frame cannot be sent; that
    /// error is returned. Repeated calls return `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        if self.close_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sent = if self.closed.is_cancelled() {
            Ok(())
        } else {
            self.msg_channel.send_state(state_closed(self.id())).await
        };
        self.closed.cancel();
        self.mux.remove_sink(self.id()).await;
        if let Err(err) = &sent {
            warn!(conn_id = self.id(), error = %err, "failed to send state closed");
        }
        sent
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl MsgSink for EdgeConn {
    fn id(&self) -> u32 {
        self.msg_channel.id()
    }

    fn accept(&self, event: MsgEvent) {
        if event.msg.content_type == STATE_CLOSED {
            debug!(conn_id = event.conn_id, "remote closed edge connection");
            self.closed.cancel();
            return;
        }
        if self.inbound_tx.send(event).is_err() {
            debug!(conn_id = self.id(), "edge connection dropped inbound event");
        }
    }

    fn handle_mux_close(&self) -> Result<()> {
        self.closed.cancel();
        Ok(())
    }
}
