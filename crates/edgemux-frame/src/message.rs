use std::collections::BTreeMap;

use bytes::Bytes;

use crate::content::{content_type_name, DATA};
use crate::error::{FrameError, Result};

/// Header carrying the logical connection id (u32 LE).
pub const CONN_ID_HEADER: u32 = 1000;

/// Header carrying the per-connection sequence number (u32 LE).
pub const SEQ_HEADER: u32 = 1001;

/// Header carrying the trace correlation id (16 raw bytes).
pub const UUID_HEADER: u32 = 1002;

/// A framed message: content type, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the body carries, see [`crate::content`].
    pub content_type: u32,
    /// Header map, ordered by key so encoding is deterministic.
    pub headers: BTreeMap<u32, Bytes>,
    /// The message body.
    pub body: Bytes,
}

impl Message {
    /// Create a message without headers.
    pub fn new(content_type: u32, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Create a data message for a logical connection.
    pub fn data(conn_id: u32, seq: u32, data: impl Into<Bytes>) -> Self {
        let mut msg = Self::new(DATA, data);
        msg.put_u32_header(CONN_ID_HEADER, conn_id);
        msg.put_u32_header(SEQ_HEADER, seq);
        msg
    }

    /// Human-readable content type name.
    pub fn content_type_name(&self) -> &'static str {
        content_type_name(self.content_type)
    }

    pub fn put_header(&mut self, key: u32, value: impl Into<Bytes>) {
        self.headers.insert(key, value.into());
    }

    pub fn put_u32_header(&mut self, key: u32, value: u32) {
        self.headers
            .insert(key, Bytes::copy_from_slice(&value.to_le_bytes()));
    }

    pub fn header(&self, key: u32) -> Option<&Bytes> {
        self.headers.get(&key)
    }

    pub fn has_header(&self, key: u32) -> bool {
        self.headers.contains_key(&key)
    }

    /// Read a u32 header. `Ok(None)` when absent, an error when malformed.
    pub fn u32_header(&self, key: u32) -> Result<Option<u32>> {
        let Some(value) = self.headers.get(&key) else {
            return Ok(None);
        };
        let raw: [u8; 4] = value
            .as_ref()
            .try_into()
            .map_err(|_| FrameError::InvalidHeader {
                key,
                len: value.len(),
                expected: 4,
            })?;
        Ok(Some(u32::from_le_bytes(raw)))
    }

    /// The logical connection id; required on every edge frame.
    pub fn conn_id(&self) -> Result<u32> {
        self.u32_header(CONN_ID_HEADER)?
            .ok_or(FrameError::MissingHeader(CONN_ID_HEADER))
    }

    /// The per-connection sequence number, if the frame carries one.
    pub fn seq(&self) -> Result<Option<u32>> {
        self.u32_header(SEQ_HEADER)
    }

    /// The trace correlation id, if the frame carries one.
    pub fn trace_id(&self) -> Option<&Bytes> {
        self.headers.get(&UUID_HEADER)
    }
}
