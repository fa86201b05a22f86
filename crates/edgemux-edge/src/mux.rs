use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use edgemux_frame::Message;
use edgemux_transport::ReceiveHandler;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::MuxConfig;
use crate::error::{EdgeError, Result};

/// Receiver of inbound events for one logical connection.
///
/// The mux keeps only a weak reference; dropping the last strong reference
/// has the same effect as removing the sink.
pub trait MsgSink: Send + Sync {
    /// Connection id this sink receives events for.
    fn id(&self) -> u32;

    /// Deliver one event. Runs on the dispatch task, so it must not block.
    fn accept(&self, event: MsgEvent);

    /// The physical connection is going away.
    fn handle_mux_close(&self) -> Result<()>;
}

/// A decoded inbound frame addressed to one logical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgEvent {
    pub conn_id: u32,
    /// Sender's sequence number, 0 when the frame carried none.
    pub seq: u32,
    pub msg: Message,
}

impl MsgEvent {
    pub fn decode(msg: Message) -> Result<Self> {
        let conn_id = msg.conn_id()?;
        let seq = msg.seq()?.unwrap_or(0);
        Ok(Self { conn_id, seq, msg })
    }
}

enum MuxEvent {
    Msg(MsgEvent),
    AddSink {
        sink: Arc<dyn MsgSink>,
        done: oneshot::Sender<Result<()>>,
    },
    RemoveSink(u32),
    Close,
}

/// Routes inbound frames of one physical connection to registered sinks.
///
/// All registrations, removals and deliveries are applied by a single
/// dispatch task in the order they were submitted, so a sink is visible to
/// every frame dispatched after [`MsgMux::add_sink`] returns. Cloning the
/// handle is cheap; the dispatch task ends after close, or once every handle
/// is dropped.
#[derive(Clone)]
pub struct MsgMux {
    events: mpsc::Sender<MuxEvent>,
    close_requested: Arc<AtomicBool>,
    closed: CancellationToken,
}

impl MsgMux {
    /// Create a mux and spawn its dispatch task on the current runtime.
    pub fn new(config: MuxConfig) -> Self {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let closed = CancellationToken::new();
        let dispatcher = Dispatcher {
            sinks: HashMap::new(),
            closed: closed.clone(),
            config,
        };
        tokio::spawn(dispatcher.run(rx));
        Self {
            events,
            close_requested: Arc::new(AtomicBool::new(false)),
            closed,
        }
    }

    /// Register `sink`, returning once it is visible to dispatch.
    pub async fn add_sink(&self, sink: Arc<dyn MsgSink>) -> Result<()> {
        if self.is_closed() {
            return Err(EdgeError::MuxClosed);
        }
        let (done, registered) = oneshot::channel();
        self.events
            .send(MuxEvent::AddSink { sink, done })
            .await
            .map_err(|_| EdgeError::MuxClosed)?;
        registered.await.unwrap_or(Err(EdgeError::MuxClosed))
    }

    /// Unregister the sink for `id`. Removing an unknown id is a no-op.
    pub async fn remove_sink(&self, id: u32) {
        if self.is_closed() {
            return;
        }
        let _ = self.events.send(MuxEvent::RemoveSink(id)).await;
    }

    pub async fn remove_sink_by(&self, sink: &dyn MsgSink) {
        self.remove_sink(sink.id()).await;
    }

    /// Decode `msg` and queue it for delivery. Undecodable frames are dropped.
    pub async fn dispatch(&self, msg: Message) {
        match MsgEvent::decode(msg) {
            Ok(event) => self.event(event).await,
            Err(err) => warn!(error = %err, "dropping undecodable inbound frame"),
        }
    }

    /// Queue an already decoded event for delivery.
    pub async fn event(&self, event: MsgEvent) {
        if self.is_closed() {
            trace!(conn_id = event.conn_id, "mux closed, dropping event");
            return;
        }
        let _ = self.events.send(MuxEvent::Msg(event)).await;
    }

    /// Close the mux and notify every registered sink. Repeated calls are no-ops.
    ///
    /// The first call returns once the sinks have been notified.
    pub async fn close(&self) {
        if self.close_requested.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.events.send(MuxEvent::Close).await.is_ok() {
            self.closed.cancelled().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once close processing has finished.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

#[async_trait]
impl ReceiveHandler for MsgMux {
    async fn handle_receive(&self, msg: Message) {
        self.dispatch(msg).await;
    }

    async fn handle_close(&self) {
        self.close().await;
    }
}

struct Dispatcher {
    sinks: HashMap<u32, Weak<dyn MsgSink>>,
    closed: CancellationToken,
    config: MuxConfig,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::Receiver<MuxEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                MuxEvent::Msg(event) => self.deliver(event),
                MuxEvent::AddSink { sink, done } => {
                    let _ = done.send(self.add(sink));
                }
                MuxEvent::RemoveSink(id) => self.remove(id),
                MuxEvent::Close => break,
            }
        }

        self.close();
        self.drain(rx).await;
    }

    fn deliver(&self, event: MsgEvent) {
        match self.sinks.get(&event.conn_id).and_then(Weak::upgrade) {
            Some(sink) => sink.accept(event),
            None => debug!(
                conn_id = event.conn_id,
                seq = event.seq,
                content_type = event.msg.content_type_name(),
                "no sink for connection, dropping event"
            ),
        }
    }

    fn add(&mut self, sink: Arc<dyn MsgSink>) -> Result<()> {
        let id = sink.id();
        if self.sinks.get(&id).and_then(Weak::upgrade).is_some() {
            return Err(EdgeError::DuplicateSink(id));
        }
        self.sinks.insert(id, Arc::downgrade(&sink));
        debug!(conn_id = id, "added message sink");
        Ok(())
    }

    fn remove(&mut self, id: u32) {
        if self.sinks.remove(&id).is_some() {
            debug!(conn_id = id, "removed message sink");
        } else {
            debug!(conn_id = id, "no message sink to remove");
        }
    }

    fn close(&mut self) {
        for (id, sink) in self.sinks.drain() {
            let Some(sink) = sink.upgrade() else {
                continue;
            };
            if let Err(err) = sink.handle_mux_close() {
                warn!(conn_id = id, error = %err, "message sink failed to close");
            }
        }
        self.closed.cancel();
        debug!("message mux closed");
    }

    // Keep accepting submissions from tasks that raced with close, until the
    // queue stays quiet for a full window.
    async fn drain(&self, mut rx: mpsc::Receiver<MuxEvent>) {
        let window = self.config.drain_window;
        while let Ok(Some(event)) = tokio::time::timeout(window, rx.recv()).await {
            if let MuxEvent::AddSink { done, .. } = event {
                let _ = done.send(Err(EdgeError::MuxClosed));
            }
        }
        trace!("message mux event queue released");
    }
}
