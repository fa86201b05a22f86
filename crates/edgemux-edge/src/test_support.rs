//! Test doubles shared by the unit tests in this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use edgemux_frame::Message;
use edgemux_transport::{Channel, Priority, SendCompletion, TransportError};
use tokio::sync::{oneshot, Notify};

use crate::control::Precedence;
use crate::error::{EdgeError, Result};
use crate::listener::{BaseListener, Listener, ListenerAddr};
use crate::mux::{MsgEvent, MsgSink};

/// Channel that records every frame and either confirms it at once or holds it.
pub struct RecordingChannel {
    sent: Mutex<Vec<(Message, Priority)>>,
    held: Mutex<Vec<oneshot::Sender<edgemux_transport::Result<()>>>>,
    hold: bool,
    closed: AtomicBool,
    sent_notify: Notify,
}

impl RecordingChannel {
    pub fn completing() -> Arc<Self> {
        Self::build(false)
    }

    pub fn holding() -> Arc<Self> {
        Self::build(true)
    }

    fn build(hold: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            hold,
            closed: AtomicBool::new(false),
            sent_notify: Notify::new(),
        })
    }

    pub fn sent(&self) -> Vec<(Message, Priority)> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_for_sends(&self, count: usize) {
        loop {
            let notified = self.sent_notify.notified();
            if self.sent.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }

    pub fn complete_all(&self, result: edgemux_transport::Result<()>) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for done in held {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(_) => Err(TransportError::Shutdown),
            };
            let _ = done.send(outcome);
        }
    }
}

impl Channel for RecordingChannel {
    fn label(&self) -> &str {
        "recording"
    }

    fn send_and_sync(
        &self,
        msg: Message,
        priority: Priority,
    ) -> edgemux_transport::Result<SendCompletion> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        self.sent.lock().unwrap().push((msg, priority));
        self.sent_notify.notify_waiters();
        if self.hold {
            let (done, completion) = SendCompletion::pair();
            self.held.lock().unwrap().push(done);
            Ok(completion)
        } else {
            Ok(SendCompletion::ready(Ok(())))
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Sink that records delivered events and mux-close notifications.
pub struct RecordingSink {
    id: u32,
    events: Mutex<Vec<MsgEvent>>,
    mux_closes: AtomicUsize,
    fail_close: bool,
    arrived: Notify,
}

impl RecordingSink {
    pub fn new(id: u32) -> Arc<Self> {
        Self::build(id, false)
    }

    pub fn failing_close(id: u32) -> Arc<Self> {
        Self::build(id, true)
    }

    fn build(id: u32, fail_close: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            events: Mutex::new(Vec::new()),
            mux_closes: AtomicUsize::new(0),
            fail_close,
            arrived: Notify::new(),
        })
    }

    pub fn events(&self) -> Vec<MsgEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn mux_closes(&self) -> usize {
        self.mux_closes.load(Ordering::SeqCst)
    }

    pub async fn wait_for_events(&self, count: usize) -> Vec<MsgEvent> {
        loop {
            let notified = self.arrived.notified();
            {
                let events = self.events.lock().unwrap();
                if events.len() >= count {
                    return events.clone();
                }
            }
            notified.await;
        }
    }
}

impl MsgSink for RecordingSink {
    fn id(&self) -> u32 {
        self.id
    }

    fn accept(&self, event: MsgEvent) {
        self.events.lock().unwrap().push(event);
        self.arrived.notify_waiters();
    }

    fn handle_mux_close(&self) -> Result<()> {
        self.mux_closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(EdgeError::ConnClosed(self.id))
        } else {
            Ok(())
        }
    }
}

/// Scriptable child listener for multi-listener tests.
pub struct MockListener {
    base: BaseListener<u32>,
    close_error: Mutex<Option<EdgeError>>,
    update_error: Mutex<Option<EdgeError>>,
    closes: AtomicUsize,
    updates: Mutex<Vec<(Option<u16>, Option<Precedence>)>>,
}

impl MockListener {
    pub fn new(service: &str) -> Arc<Self> {
        Arc::new(Self {
            base: BaseListener::new(service),
            close_error: Mutex::new(None),
            update_error: Mutex::new(None),
            closes: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_close(service: &str, err: EdgeError) -> Arc<Self> {
        let listener = Self::new(service);
        *listener.close_error.lock().unwrap() = Some(err);
        listener
    }

    pub fn fail_updates_with(&self, err: EdgeError) {
        *self.update_error.lock().unwrap() = Some(err);
    }

    /// Hand a connection to whoever is accepting on this listener. Returns
    /// false if the listener closed before anyone took it.
    pub async fn push(&self, conn: u32) -> bool {
        self.base.offer(conn).await.is_ok()
    }

    /// Close the listener the way a lost router connection would, without
    /// going through `Listener::close`.
    pub fn drop_connection(&self) {
        self.base.mark_closed();
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(Option<u16>, Option<Precedence>)> {
        self.updates.lock().unwrap().clone()
    }

    fn record_update(&self, cost: Option<u16>, precedence: Option<Precedence>) -> Result<()> {
        self.updates.lock().unwrap().push((cost, precedence));
        match self.update_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Listener for MockListener {
    type Conn = u32;

    async fn accept(&self) -> Result<u32> {
        self.base.accept().await
    }

    async fn close(&self) -> Result<()> {
        if !self.base.mark_closed() {
            return Ok(());
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        match self.close_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn addr(&self) -> ListenerAddr {
        self.base.addr()
    }

    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    async fn update_cost(&self, cost: u16) -> Result<()> {
        self.record_update(Some(cost), None)
    }

    async fn update_precedence(&self, precedence: Precedence) -> Result<()> {
        self.record_update(None, Some(precedence))
    }

    async fn update_cost_and_precedence(&self, cost: u16, precedence: Precedence) -> Result<()> {
        self.record_update(Some(cost), Some(precedence))
    }
}
