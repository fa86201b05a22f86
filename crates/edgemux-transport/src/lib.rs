//! Physical connection layer for edge routers.
//!
//! One [`Channel`] wraps one transport connection to a router and is shared
//! by every logical connection multiplexed over it:
//! - Outbound frames are queued per [`Priority`] and flushed by a single
//!   writer task; callers get a [`SendCompletion`] that resolves once the
//!   frame has been handed to the transport.
//! - Inbound frames are decoded by a reader task and handed to a
//!   [`ReceiveHandler`].
//!
//! Establishing the underlying stream (TCP, TLS) is left to the caller; any
//! `AsyncRead`/`AsyncWrite` pair will do.

pub mod addr;
pub mod error;
pub mod framed;
pub mod traits;

pub use addr::{
    install_edge_address_parser, parse_address, register_address_parser, Address,
    AddressParser, EdgeAddressParser, TlsAddressParser,
};
pub use error::{Result, TransportError};
pub use framed::{ChannelConfig, FramedChannel};
pub use traits::{Channel, Priority, ReceiveHandler, SendCompletion};
