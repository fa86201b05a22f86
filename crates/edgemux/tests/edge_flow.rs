//! End-to-end flows over an in-memory router connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edgemux::edge::{
    EdgeConn, EdgeError, EdgeListener, Listener, ListenerConfig, MsgChannelConfig, MsgMux,
    MultiListener, MuxConfig, Precedence, SessionTable, UnbindRequest, UpdateBindRequest,
};
use edgemux::frame::{Message, DATA, STATE_CLOSED, UNBIND, UPDATE_BIND};
use edgemux::transport::{Channel, ChannelConfig, FramedChannel, Priority, ReceiveHandler};
use tokio::sync::mpsc;

const BOUND: Duration = Duration::from_secs(2);

/// Router end of the link: records every frame the client sends.
struct Router {
    frames: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl ReceiveHandler for Router {
    async fn handle_receive(&self, msg: Message) {
        let _ = self.frames.send(msg);
    }

    async fn handle_close(&self) {}
}

struct Link {
    client: Arc<FramedChannel>,
    mux: MsgMux,
    router: Arc<FramedChannel>,
    frames: mpsc::UnboundedReceiver<Message>,
}

impl Link {
    fn new(label: &str) -> Self {
        let (client_io, router_io) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (router_read, router_write) = tokio::io::split(router_io);

        let mux = MsgMux::new(MuxConfig::default());
        let client = FramedChannel::spawn(
            client_read,
            client_write,
            Arc::new(mux.clone()),
            ChannelConfig {
                label: label.to_string(),
                ..ChannelConfig::default()
            },
        );

        let (tx, frames) = mpsc::unbounded_channel();
        let router = FramedChannel::spawn(
            router_read,
            router_write,
            Arc::new(Router { frames: tx }),
            ChannelConfig::default(),
        );

        Self {
            client,
            mux,
            router,
            frames,
        }
    }

    async fn connect(&self, conn_id: u32, service: &str) -> Arc<EdgeConn> {
        EdgeConn::connect(
            self.client.clone(),
            &self.mux,
            conn_id,
            service,
            MsgChannelConfig::default(),
        )
        .await
        .expect("edge connection should register")
    }

    async fn next_frame(&mut self) -> Message {
        tokio::time::timeout(BOUND, self.frames.recv())
            .await
            .expect("router should receive a frame")
            .expect("router link open")
    }
}

#[tokio::test]
async fn data_flows_both_ways_over_one_router_connection() {
    let mut link = Link::new("router-a");
    let first = link.connect(1, "echo").await;
    let second = link.connect(2, "echo").await;

    first.write(b"hello").await.expect("write should succeed");
    second.write(b"other").await.expect("write should succeed");
    first.write(b"again").await.expect("write should succeed");

    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = link.next_frame().await;
        assert_eq!(frame.content_type, DATA);
        seen.push((
            frame.conn_id().expect("conn id"),
            frame.seq().expect("seq").expect("seq present"),
            frame.body.clone(),
        ));
    }
    assert_eq!(
        seen,
        vec![
            (1, 1, Bytes::from_static(b"hello")),
            (2, 1, Bytes::from_static(b"other")),
            (1, 2, Bytes::from_static(b"again")),
        ]
    );

    link.router
        .send_and_sync(
            Message::data(2, 1, Bytes::from_static(b"reply")),
            Priority::Standard,
        )
        .expect("router send")
        .wait()
        .await
        .expect("router send confirmed");
    let event = tokio::time::timeout(BOUND, second.recv())
        .await
        .expect("reply should arrive")
        .expect("recv should succeed");
    assert_eq!(event.conn_id, 2);
    assert_eq!(event.msg.body.as_ref(), b"reply");
}

#[tokio::test]
async fn closing_connection_sends_state_closed() {
    let mut link = Link::new("router-a");
    let conn = link.connect(4, "echo").await;

    conn.write(b"bye").await.expect("write should succeed");
    conn.close().await.expect("close should succeed");

    assert_eq!(link.next_frame().await.content_type, DATA);
    let closed = link.next_frame().await;
    assert_eq!(closed.content_type, STATE_CLOSED);
    assert_eq!(closed.conn_id().expect("conn id"), 4);
    assert_eq!(closed.seq().expect("seq"), Some(2));
}

#[tokio::test]
async fn losing_router_closes_its_connections() {
    let link = Link::new("router-a");
    let conn = link.connect(9, "echo").await;

    link.router.close();
    tokio::time::timeout(BOUND, link.mux.closed())
        .await
        .expect("mux should close when the router goes away");

    assert!(conn.is_closed());
    assert!(link.client.is_closed());
    assert!(conn.write(b"late").await.is_err());
}

#[tokio::test]
async fn multi_listener_spans_redundant_routers() {
    let mut a = Link::new("router-a");
    let mut b = Link::new("router-b");
    let sessions_a = Arc::new(SessionTable::<String>::new());
    let sessions_b = Arc::new(SessionTable::<String>::new());

    let listener_a = EdgeListener::new(
        a.connect(1, "billing").await,
        "session-a",
        sessions_a.clone(),
        ListenerConfig::default(),
    );
    let listener_b = EdgeListener::new(
        b.connect(1, "billing").await,
        "session-b",
        sessions_b.clone(),
        ListenerConfig::default(),
    );

    let multi = MultiListener::<String>::new("billing");
    multi.add_listener(listener_a.clone(), || {}).await;
    multi.add_listener(listener_b.clone(), || {}).await;
    assert_eq!(multi.listeners().await.len(), 2);

    sessions_b
        .deliver("session-b", "dialer-1".to_string())
        .await
        .expect("session should be hosted");
    let accepted = tokio::time::timeout(BOUND, multi.accept())
        .await
        .expect("accept should complete")
        .expect("accept should succeed");
    assert_eq!(accepted, "dialer-1");

    multi
        .update_cost_and_precedence(12, Precedence::Required)
        .await
        .expect("broadcast should succeed");
    for (link, token) in [(&mut a, "session-a"), (&mut b, "session-b")] {
        let frame = link.next_frame().await;
        assert_eq!(frame.content_type, UPDATE_BIND);
        let update = UpdateBindRequest::from_message(&frame).expect("update body");
        assert_eq!(update, UpdateBindRequest::new(token, Some(12), Some(Precedence::Required)));
    }

    multi.close().await.expect("close should succeed");
    for (link, token) in [(&mut a, "session-a"), (&mut b, "session-b")] {
        let unbind = link.next_frame().await;
        assert_eq!(unbind.content_type, UNBIND);
        assert_eq!(
            UnbindRequest::from_message(&unbind).expect("unbind body").token,
            token
        );
        assert_eq!(link.next_frame().await.content_type, STATE_CLOSED);
    }

    assert!(sessions_a.is_empty() && sessions_b.is_empty());
    assert!(matches!(
        tokio::time::timeout(BOUND, multi.accept())
            .await
            .expect("accept should return after close"),
        Err(EdgeError::ListenerClosed)
    ));
}
