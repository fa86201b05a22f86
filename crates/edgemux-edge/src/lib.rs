//! Client-side edge connection layer.
//!
//! Many logical connections share one physical router connection:
//! - [`MsgMux`] routes inbound frames to the [`MsgSink`] registered for the
//!   frame's connection id, from a single dispatch task.
//! - [`MsgChannel`] frames and sequences outbound writes for one logical
//!   connection and waits for the transport to confirm each send.
//! - [`EdgeListener`] hosts a service over one router connection;
//!   [`MultiListener`] fans several of them into one fail-over listener.

pub mod config;
pub mod conn;
pub mod control;
pub mod error;
pub mod listener;
pub mod msg_channel;
pub mod multi_listener;
pub mod mux;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{trace_enabled, ListenerConfig, MsgChannelConfig, MuxConfig, TRACE_ENV_VAR};
pub use conn::EdgeConn;
pub use control::{Precedence, UnbindRequest, UpdateBindRequest};
pub use error::{condense, EdgeError, MultipleErrors, Result};
pub use listener::{EdgeListener, Listener, ListenerAddr, SessionTable};
pub use msg_channel::MsgChannel;
pub use multi_listener::{ChildListener, ConnectionChangeHandler, MultiListener};
pub use mux::{MsgEvent, MsgMux, MsgSink};
