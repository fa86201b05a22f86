//! Framed edge messages for multiplexed overlay connections.
//!
//! Every message on a physical router connection is framed with:
//! - A 2-byte magic number ("EM") for stream synchronization
//! - A 4-byte little-endian content type
//! - 4-byte little-endian header-block and body lengths
//!
//! Logical connections are identified by the connection id header; each
//! logical connection orders its frames with the sequence header.

pub mod codec;
pub mod content;
pub mod error;
pub mod message;
pub mod sequence;

pub use codec::{decode_message, encode_message, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
#[cfg(feature = "async")]
pub use codec::MessageCodec;
pub use content::{DATA, STATE_CLOSED, UNBIND, UPDATE_BIND};
pub use error::{FrameError, Result};
pub use message::{Message, CONN_ID_HEADER, SEQ_HEADER, UUID_HEADER};
pub use sequence::Sequence;
