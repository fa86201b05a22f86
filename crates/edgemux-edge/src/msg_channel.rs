use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use edgemux_frame::{Message, Sequence, SEQ_HEADER, UUID_HEADER};
use edgemux_transport::{Channel, Priority, SendCompletion, TransportError};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MsgChannelConfig;
use crate::error::Result;

/// Framed, sequenced send side of one logical connection.
///
/// Every data frame and state frame gets the next sequence number for this
/// connection id. Frames are queued on the physical channel in call order, and
/// each send waits until the transport confirms the frame was written.
pub struct MsgChannel {
    channel: Arc<dyn Channel>,
    id: u32,
    seq: Sequence,
    write_deadline: Mutex<Option<Instant>>,
    // Held while a sequence number is taken and its frame queued, so the two stay in order.
    send_order: Mutex<()>,
    config: MsgChannelConfig,
}

impl MsgChannel {
    pub fn new(channel: Arc<dyn Channel>, conn_id: u32, config: MsgChannelConfig) -> Self {
        if config.trace {
            info!(conn_id, "edge message tracing ENABLED");
        }
        Self {
            channel,
            id: conn_id,
            seq: Sequence::new(),
            write_deadline: Mutex::new(None),
            send_order: Mutex::new(()),
            config,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Bound subsequent writes by `deadline`; `None` waits without bound.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        *self
            .write_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = deadline;
    }

    pub fn write_deadline(&self) -> Option<Instant> {
        *self
            .write_deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `data` as the next data frame. Returns once the transport has the frame.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        self.write_traced(data, None).await
    }

    /// Like [`MsgChannel::write`], carrying the caller's trace correlation id.
    pub async fn write_traced(&self, data: &[u8], trace_id: Option<Bytes>) -> Result<usize> {
        let deadline = self.write_deadline();
        if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
            return Err(TransportError::DeadlineExceeded.into());
        }

        let completion = self.queue(Priority::Standard, |seq| {
            let mut msg = Message::data(self.id, seq, Bytes::copy_from_slice(data));
            if let Some(trace_id) = trace_id {
                msg.put_header(UUID_HEADER, trace_id);
            }
            debug!(conn_id = self.id, seq, len = data.len(), "writing data");
            self.trace_msg("write", &mut msg);
            msg
        })?;

        match deadline {
            Some(deadline) => completion.wait_until(deadline).await?,
            None => completion.wait().await?,
        }
        Ok(data.len())
    }

    /// Send a state frame at the highest priority, waiting at most the configured
    /// state send timeout regardless of any write deadline.
    pub async fn send_state(&self, mut msg: Message) -> Result<()> {
        let completion = self.queue(Priority::Highest, |seq| {
            msg.put_u32_header(SEQ_HEADER, seq);
            self.trace_msg("send_state", &mut msg);
            msg
        })?;
        completion
            .wait_timeout(self.config.state_send_timeout)
            .await?;
        Ok(())
    }

    /// Send a control frame as-is (no sequence number) and wait at most `timeout`.
    pub async fn send_with_timeout(&self, mut msg: Message, timeout: Duration) -> Result<()> {
        self.trace_msg("send_with_timeout", &mut msg);
        self.channel
            .send_and_sync(msg, Priority::Standard)?
            .wait_timeout(timeout)
            .await?;
        Ok(())
    }

    /// Stamp an untraced frame with a fresh correlation id when tracing is on, and
    /// log every frame that carries one.
    pub fn trace_msg(&self, source: &str, msg: &mut Message) {
        if self.config.trace && !msg.has_header(UUID_HEADER) {
            let id = Uuid::new_v4();
            msg.put_header(UUID_HEADER, Bytes::copy_from_slice(id.as_bytes()));
        }

        if let Some(trace_id) = msg.trace_id() {
            debug!(
                conn_id = self.id,
                source,
                content_type = msg.content_type_name(),
                trace_id = %trace_label(trace_id),
                "tracing message"
            );
        }
    }

    fn queue(
        &self,
        priority: Priority,
        build: impl FnOnce(u32) -> Message,
    ) -> Result<SendCompletion> {
        let _order = self
            .send_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let msg = build(self.seq.next());
        Ok(self.channel.send_and_sync(msg, priority)?)
    }
}

fn trace_label(trace_id: &[u8]) -> String {
    Uuid::from_slice(trace_id)
        .map(|id| id.to_string())
        .unwrap_or_else(|_| format!("{trace_id:02x?}"))
}
