use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::control::Precedence;
use crate::error::{condense, EdgeError, Result};
use crate::listener::{BaseListener, Listener, ListenerAddr};

/// A child of a [`MultiListener`]: any listener yielding the same connection type.
pub type ChildListener<C> = Arc<dyn Listener<Conn = C>>;

/// Called with the full child list whenever membership changes.
pub type ConnectionChangeHandler<C> = Arc<dyn Fn(Vec<ChildListener<C>>) + Send + Sync>;

/// One logical listener over several redundant per-router listeners.
///
/// Connections accepted by any child are forwarded to [`MultiListener::accept`].
/// Updates are broadcast to every child and close tears all of them down.
pub struct MultiListener<C: Send + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: Send + 'static> Clone for MultiListener<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<C: Send + 'static> {
    base: BaseListener<C>,
    children: Mutex<Vec<ChildListener<C>>>,
    handler: RwLock<Option<ConnectionChangeHandler<C>>>,
    torn_down: AtomicBool,
}

impl<C: Send + 'static> MultiListener<C> {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                base: BaseListener::new(service_name),
                children: Mutex::new(Vec::new()),
                handler: RwLock::new(None),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        self.shared.base.service_name()
    }

    /// Register `child` and start forwarding its connections.
    ///
    /// `on_closed` runs once the child stops accepting and has been removed.
    /// Children added after close are ignored.
    pub async fn add_listener<F>(&self, child: ChildListener<C>, on_closed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut children = self.shared.children.lock().await;
        if self.shared.is_shut() {
            warn!(
                service = self.service_name(),
                "multi-listener is closed, ignoring new child"
            );
            return;
        }
        if children.iter().any(|known| same_listener(known, &child)) {
            debug!(service = self.service_name(), "child listener already registered");
            return;
        }
        children.push(Arc::clone(&child));
        self.shared.notify(&children);
        drop(children);

        tokio::spawn(forward(Arc::clone(&self.shared), child, on_closed));
    }

    /// Snapshot of the current children.
    pub async fn listeners(&self) -> Vec<ChildListener<C>> {
        self.shared.children.lock().await.clone()
    }

    /// Replace the membership callback. The callback runs on its own task.
    pub fn set_connection_change_handler<F>(&self, handler: F)
    where
        F: Fn(Vec<ChildListener<C>>) + Send + Sync + 'static,
    {
        *self
            .shared
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }

    pub fn connection_change_handler(&self) -> Option<ConnectionChangeHandler<C>> {
        self.shared.handler()
    }

    /// Close because of an unrecoverable session error. The next accept
    /// reports `err`; children are not closed here.
    pub fn close_with_error(&self, err: EdgeError) {
        self.shared.base.record_error(err);
        self.shared.base.mark_closed();
    }

    async fn broadcast(&self, update: BindUpdate) -> Result<()> {
        let children = self.shared.children.lock().await;
        let mut errors = Vec::new();
        for child in children.iter() {
            let result = match update {
                BindUpdate::Cost(cost) => child.update_cost(cost).await,
                BindUpdate::Precedence(precedence) => child.update_precedence(precedence).await,
                BindUpdate::Both(cost, precedence) => {
                    child.update_cost_and_precedence(cost, precedence).await
                }
            };
            if let Err(err) = result {
                errors.push(err);
            }
        }
        condense(errors)
    }
}

#[derive(Clone, Copy)]
enum BindUpdate {
    Cost(u16),
    Precedence(Precedence),
    Both(u16, Precedence),
}

impl<C: Send + 'static> Shared<C> {
    fn is_shut(&self) -> bool {
        self.base.is_closed() || self.torn_down.load(Ordering::Acquire)
    }

    fn handler(&self) -> Option<ConnectionChangeHandler<C>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify(&self, children: &[ChildListener<C>]) {
        if let Some(handler) = self.handler() {
            let children = children.to_vec();
            tokio::spawn(async move { handler(children) });
        }
    }

    async fn remove(&self, child: &ChildListener<C>) {
        let mut children = self.children.lock().await;
        let before = children.len();
        children.retain(|known| !same_listener(known, child));
        if children.len() != before {
            self.notify(&children);
        }
    }
}

async fn forward<C, F>(shared: Arc<Shared<C>>, child: ChildListener<C>, on_closed: F)
where
    C: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let addr = child.addr();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shared.base.closed() => break,
            accepted = child.accept() => accepted,
        };
        match accepted {
            Ok(conn) => {
                if shared.base.offer(conn).await.is_err() {
                    debug!(service = %addr, "multi-listener closed, dropping accepted connection");
                    break;
                }
            }
            Err(err) => {
                debug!(service = %addr, error = %err, "child listener stopped accepting");
                break;
            }
        }
    }

    if let Err(err) = child.close().await {
        error!(service = %addr, error = %err, "failure closing child listener");
    }
    shared.remove(&child).await;
    on_closed();
}

fn same_listener<C: Send + 'static>(a: &ChildListener<C>, b: &ChildListener<C>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[async_trait]
impl<C: Send + 'static> Listener for MultiListener<C> {
    type Conn = C;

    async fn accept(&self) -> Result<C> {
        self.shared.base.accept().await
    }

    /// Close every child, returning their errors condensed in child order.
    async fn close(&self) -> Result<()> {
        if self.shared.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut children = self.shared.children.lock().await;
        let mut errors = Vec::new();
        for child in children.iter() {
            if let Err(err) = child.close().await {
                errors.push(err);
            }
        }
        children.clear();
        drop(children);

        self.shared.base.mark_closed();
        debug!(service = self.service_name(), "multi-listener closed");
        condense(errors)
    }

    fn addr(&self) -> ListenerAddr {
        self.shared.base.addr()
    }

    fn is_closed(&self) -> bool {
        self.shared.is_shut()
    }

    async fn update_cost(&self, cost: u16) -> Result<()> {
        self.broadcast(BindUpdate::Cost(cost)).await
    }

    async fn update_precedence(&self, precedence: Precedence) -> Result<()> {
        self.broadcast(BindUpdate::Precedence(precedence)).await
    }

    async fn update_cost_and_precedence(&self, cost: u16, precedence: Precedence) -> Result<()> {
        self.broadcast(BindUpdate::Both(cost, precedence)).await
    }
}
