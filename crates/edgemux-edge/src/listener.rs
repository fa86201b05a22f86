use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::ListenerConfig;
use crate::conn::EdgeConn;
use crate::control::{Precedence, UnbindRequest, UpdateBindRequest};
use crate::error::{EdgeError, Result};

/// Network name reported by edge listener addresses.
pub const EDGE_NETWORK: &str = "edge";

/// Address of a hosted service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerAddr {
    service: String,
}

impl ListenerAddr {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn network(&self) -> &'static str {
        EDGE_NETWORK
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl fmt::Display for ListenerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service)
    }
}

/// A stream of accepted connections for one hosted service.
#[async_trait]
pub trait Listener: Send + Sync {
    type Conn: Send + 'static;

    /// Wait for the next connection. Fails once the listener is closed.
    async fn accept(&self) -> Result<Self::Conn>;

    /// Stop accepting. Only the first call does any work.
    async fn close(&self) -> Result<()>;

    fn addr(&self) -> ListenerAddr;

    fn is_closed(&self) -> bool;

    async fn update_cost(&self, cost: u16) -> Result<()>;

    async fn update_precedence(&self, precedence: Precedence) -> Result<()>;

    async fn update_cost_and_precedence(&self, cost: u16, precedence: Precedence) -> Result<()>;
}

/// Accept hand-off, error slot and closed state shared by listener types.
///
/// The hand-off is a rendezvous: each pending accept registers a oneshot slot
/// and an offer completes only once a waiting accept has taken the connection.
pub(crate) struct BaseListener<C> {
    service: String,
    accepters_tx: mpsc::UnboundedSender<oneshot::Sender<C>>,
    accepters_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<oneshot::Sender<C>>>,
    error: Mutex<Option<EdgeError>>,
    closing: AtomicBool,
    closed: CancellationToken,
}

impl<C: Send> BaseListener<C> {
    pub(crate) fn new(service: impl Into<String>) -> Self {
        let (accepters_tx, accepters_rx) = mpsc::unbounded_channel();
        Self {
            service: service.into(),
            accepters_tx,
            accepters_rx: tokio::sync::Mutex::new(accepters_rx),
            error: Mutex::new(None),
            closing: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub(crate) fn service_name(&self) -> &str {
        &self.service
    }

    pub(crate) fn addr(&self) -> ListenerAddr {
        ListenerAddr::new(self.service.clone())
    }

    pub(crate) async fn accept(&self) -> Result<C> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        let (slot, mut handed) = oneshot::channel();
        if self.accepters_tx.send(slot).is_err() {
            return Err(self.closed_error());
        }

        tokio::select! {
            biased;
            conn = &mut handed => {
                if let Ok(conn) = conn {
                    return Ok(conn);
                }
            }
            _ = self.closed.cancelled() => {}
        }

        // An offer that won the race against close still counts as accepted.
        handed.close();
        match handed.try_recv() {
            Ok(conn) => Ok(conn),
            Err(_) => Err(self.closed_error()),
        }
    }

    /// Hand `conn` to a waiting accept, blocking until one takes it.
    /// Gives the connection back if the listener closes first.
    pub(crate) async fn offer(&self, mut conn: C) -> std::result::Result<(), C> {
        let mut accepters = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(conn),
            accepters = self.accepters_rx.lock() => accepters,
        };
        loop {
            let slot = tokio::select! {
                biased;
                _ = self.closed.cancelled() => None,
                slot = accepters.recv() => slot,
            };
            let Some(slot) = slot else {
                return Err(conn);
            };
            // Slots left by cancelled or closed accepts refuse the connection.
            match slot.send(conn) {
                Ok(()) => return Ok(()),
                Err(returned) => conn = returned,
            }
        }
    }

    /// Keep `err` for the next accept to report. The first recorded error wins.
    pub(crate) fn record_error(&self, err: EdgeError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Mark closed. Returns true only for the call that closed it.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed.cancel();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) async fn closed(&self) {
        self.closed.cancelled().await;
    }

    fn closed_error(&self) -> EdgeError {
        match self
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(cause) => EdgeError::ListenerClosedWith(Box::new(cause)),
            None => EdgeError::ListenerClosed,
        }
    }
}

/// Listener hosting one service session over one router connection.
pub struct EdgeListener<C> {
    base: BaseListener<C>,
    token: String,
    conn: Arc<EdgeConn>,
    sessions: Arc<SessionTable<C>>,
    config: ListenerConfig,
}

impl<C: Send + 'static> EdgeListener<C> {
    /// Create the listener for a bound session and register it in `sessions`.
    pub fn new(
        conn: Arc<EdgeConn>,
        token: impl Into<String>,
        sessions: Arc<SessionTable<C>>,
        config: ListenerConfig,
    ) -> Arc<Self> {
        let listener = Arc::new(Self {
            base: BaseListener::new(conn.service()),
            token: token.into(),
            conn,
            sessions,
            config,
        });
        listener.sessions.register(&listener.token, &listener);
        listener
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn conn(&self) -> &Arc<EdgeConn> {
        &self.conn
    }

    /// Hand an incoming connection to [`Listener::accept`], waiting until an
    /// accept takes it. Fails if the listener closes first.
    pub async fn deliver(&self, conn: C) -> Result<()> {
        self.base
            .offer(conn)
            .await
            .map_err(|_| EdgeError::ListenerClosed)
    }

    async fn unbind(&self) -> Result<()> {
        let msg = UnbindRequest::new(self.token.clone()).to_message(self.conn.id())?;
        self.conn
            .msg_channel()
            .send_with_timeout(msg, self.config.remote_timeout)
            .await
    }

    async fn update_bind(&self, cost: Option<u16>, precedence: Option<Precedence>) -> Result<()> {
        debug!(
            conn_id = self.conn.id(),
            session = %self.token,
            ?cost,
            ?precedence,
            "updating bind"
        );
        let msg =
            UpdateBindRequest::new(self.token.clone(), cost, precedence).to_message(self.conn.id())?;
        self.conn
            .msg_channel()
            .send_with_timeout(msg, self.config.remote_timeout)
            .await
    }
}

#[async_trait]
impl<C: Send + 'static> Listener for EdgeListener<C> {
    type Conn = C;

    async fn accept(&self) -> Result<C> {
        self.base.accept().await
    }

    async fn close(&self) -> Result<()> {
        if !self.base.mark_closed() {
            return Ok(());
        }

        let conn_id = self.conn.id();
        debug!(conn_id, session = %self.token, "removing listener for session");
        self.sessions.remove(&self.token);

        let unbound = self.unbind().await;
        if let Err(err) = &unbound {
            error!(conn_id, session = %self.token, error = %err, "unable to unbind session");
        }
        if let Err(err) = self.conn.close().await {
            error!(conn_id, session = %self.token, error = %err, "unable to close conn");
        }
        unbound
    }

    fn addr(&self) -> ListenerAddr {
        self.base.addr()
    }

    fn is_closed(&self) -> bool {
        self.base.is_closed()
    }

    async fn update_cost(&self, cost: u16) -> Result<()> {
        self.update_bind(Some(cost), None).await
    }

    async fn update_precedence(&self, precedence: Precedence) -> Result<()> {
        self.update_bind(None, Some(precedence)).await
    }

    async fn update_cost_and_precedence(&self, cost: u16, precedence: Precedence) -> Result<()> {
        self.update_bind(Some(cost), Some(precedence)).await
    }
}

/// Listeners hosted over one physical connection, keyed by session token.
pub struct SessionTable<C> {
    hosting: DashMap<String, Weak<EdgeListener<C>>>,
}

impl<C: Send + 'static> SessionTable<C> {
    pub fn new() -> Self {
        Self {
            hosting: DashMap::new(),
        }
    }

    pub fn register(&self, token: &str, listener: &Arc<EdgeListener<C>>) {
        self.hosting
            .insert(token.to_string(), Arc::downgrade(listener));
    }

    pub fn remove(&self, token: &str) {
        self.hosting.remove(token);
    }

    pub fn get(&self, token: &str) -> Option<Arc<EdgeListener<C>>> {
        self.hosting.get(token).and_then(|entry| entry.upgrade())
    }

    /// Route an incoming connection to the listener hosting `token`.
    pub async fn deliver(&self, token: &str, conn: C) -> Result<()> {
        let listener = self
            .get(token)
            .ok_or_else(|| EdgeError::UnknownSession(token.to_string()))?;
        listener.deliver(conn).await
    }

    pub fn len(&self) -> usize {
        self.hosting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosting.is_empty()
    }
}

impl<C: Send + 'static> Default for SessionTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
