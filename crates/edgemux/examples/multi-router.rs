//! Host one service through two simulated routers and fail over between them.
//!
//! Run with:
//!   cargo run --example multi-router --features logging
//!
//! Set `EDGEMUX_TRACE_ENABLED=true` to stamp and log trace ids on every frame.

use std::sync::Arc;

use async_trait::async_trait;
use edgemux::edge::{
    EdgeConn, EdgeListener, Listener, ListenerConfig, MsgChannelConfig, MsgMux, MultiListener,
    MuxConfig, Precedence, SessionTable,
};
use edgemux::frame::Message;
use edgemux::logging::{init_logging, LogFormat, LogLevel};
use edgemux::transport::{ChannelConfig, FramedChannel, ReceiveHandler};

/// Stand-in for a router: prints every control frame it receives.
struct Router {
    name: &'static str,
}

#[async_trait]
impl ReceiveHandler for Router {
    async fn handle_receive(&self, msg: Message) {
        eprintln!(
            "[{}] {} conn={:?} body={}",
            self.name,
            msg.content_type_name(),
            msg.conn_id().ok(),
            String::from_utf8_lossy(&msg.body)
        );
    }

    async fn handle_close(&self) {
        eprintln!("[{}] client disconnected", self.name);
    }
}

struct Hosted {
    listener: Arc<EdgeListener<String>>,
    sessions: Arc<SessionTable<String>>,
    _router: Arc<FramedChannel>,
}

async fn host_on_router(
    name: &'static str,
    token: &str,
) -> Result<Hosted, Box<dyn std::error::Error>> {
    let (client_io, router_io) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (router_read, router_write) = tokio::io::split(router_io);

    let router = FramedChannel::spawn(
        router_read,
        router_write,
        Arc::new(Router { name }),
        ChannelConfig::default(),
    );

    let mux = MsgMux::new(MuxConfig::default());
    let channel = FramedChannel::spawn(
        client_read,
        client_write,
        Arc::new(mux.clone()),
        ChannelConfig {
            label: name.to_string(),
            ..ChannelConfig::default()
        },
    );

    let conn = EdgeConn::connect(channel, &mux, 1, "billing", MsgChannelConfig::default()).await?;
    let sessions = Arc::new(SessionTable::new());
    let listener = EdgeListener::new(conn, token, sessions.clone(), ListenerConfig::default());
    Ok(Hosted {
        listener,
        sessions,
        _router: router,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Text, LogLevel::Debug);

    let east = host_on_router("router-east", "session-east").await?;
    let west = host_on_router("router-west", "session-west").await?;

    let multi = MultiListener::<String>::new("billing");
    multi.set_connection_change_handler(|children| {
        eprintln!("billing is now hosted on {} router(s)", children.len());
    });
    multi
        .add_listener(east.listener.clone(), || eprintln!("lost router-east"))
        .await;
    multi
        .add_listener(west.listener.clone(), || eprintln!("lost router-west"))
        .await;

    multi.update_cost_and_precedence(10, Precedence::Required).await?;

    east.sessions
        .deliver("session-east", "dialer via east".to_string())
        .await?;
    eprintln!("accepted: {}", multi.accept().await?);

    // Router east goes away; its listener closes and west keeps serving.
    east.listener.close().await?;
    west.sessions
        .deliver("session-west", "dialer via west".to_string())
        .await?;
    eprintln!("accepted: {}", multi.accept().await?);

    multi.close().await?;
    eprintln!("multi-listener closed: {}", multi.is_closed());
    Ok(())
}
