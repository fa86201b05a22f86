use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Frame header: magic (2) + content type (4) + headers length (4) + body length (4).
pub const HEADER_SIZE: usize = 14;

/// Magic bytes: "EM" (0x45 0x4D).
pub const MAGIC: [u8; 2] = [0x45, 0x4D];

/// Default maximum size of the header block plus body: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Per-header overhead inside the header block: key (4) + length (4).
const HEADER_ENTRY_OVERHEAD: usize = 8;

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬──────────────┬─────────────┬───────────┬──────────────┬────────┐
/// │ Magic     │ Content type │ Headers len │ Body len  │ Headers      │ Body   │
/// │ "EM" (2B) │ (4B LE)      │ (4B LE)     │ (4B LE)   │ key,len,val* │        │
/// └───────────┴──────────────┴─────────────┴───────────┴──────────────┴────────┘
/// ```
/// Each header entry is a 4-byte LE key, a 4-byte LE value length and the value.
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    let headers_len: usize = msg
        .headers
        .values()
        .map(|value| HEADER_ENTRY_OVERHEAD + value.len())
        .sum();
    let payload = headers_len + msg.body.len();
    if headers_len > u32::MAX as usize || msg.body.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload,
            max: u32::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + payload);
    dst.put_slice(&MAGIC);
    dst.put_u32_le(msg.content_type);
    dst.put_u32_le(headers_len as u32);
    dst.put_u32_le(msg.body.len() as u32);
    for (key, value) in &msg.headers {
        dst.put_u32_le(*key);
        dst.put_u32_le(value.len() as u32);
        dst.put_slice(value);
    }
    dst.put_slice(&msg.body);
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let content_type = read_u32(&src[2..6]);
    let headers_len = read_u32(&src[6..10]) as usize;
    let body_len = read_u32(&src[10..14]) as usize;

    let payload = headers_len.saturating_add(body_len);
    if payload > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let header_block = src.split_to(headers_len).freeze();
    let body = src.split_to(body_len).freeze();
    let headers = decode_headers(header_block)?;

    Ok(Some(Message {
        content_type,
        headers,
        body,
    }))
}

fn decode_headers(mut block: Bytes) -> Result<BTreeMap<u32, Bytes>> {
    let mut headers = BTreeMap::new();
    while block.has_remaining() {
        if block.remaining() < HEADER_ENTRY_OVERHEAD {
            return Err(FrameError::MalformedHeaders("truncated header entry"));
        }
        let key = block.get_u32_le();
        let len = block.get_u32_le() as usize;
        if block.remaining() < len {
            return Err(FrameError::MalformedHeaders("header value overruns block"));
        }
        headers.insert(key, block.split_to(len));
    }
    Ok(headers)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum header block plus body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// `tokio_util` codec over the edge wire format.
#[cfg(feature = "async")]
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
}

#[cfg(feature = "async")]
impl MessageCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        decode_message(src, self.config.max_payload_size)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        let size: usize = msg.body.len()
            + msg
                .headers
                .values()
                .map(|value| HEADER_ENTRY_OVERHEAD + value.len())
                .sum::<usize>();
        if size > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }
        encode_message(&msg, dst)
    }
}
