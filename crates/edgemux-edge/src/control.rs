use bytes::Bytes;
use edgemux_frame::{Message, CONN_ID_HEADER, STATE_CLOSED, UNBIND, UPDATE_BIND};
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, Result};

/// How strongly the router should prefer a hosting binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    #[default]
    Default,
    Required,
    Failed,
}

/// UNBIND body: stop hosting the session identified by `token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbindRequest {
    pub token: String,
}

/// UPDATE_BIND body: new cost and/or precedence for a hosted session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBindRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<Precedence>,
}

impl UnbindRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn to_message(&self, conn_id: u32) -> Result<Message> {
        json_message(UNBIND, conn_id, self)
    }

    pub fn from_message(msg: &Message) -> Result<Self> {
        from_json_message(UNBIND, msg)
    }
}

impl UpdateBindRequest {
    pub fn new(token: impl Into<String>, cost: Option<u16>, precedence: Option<Precedence>) -> Self {
        Self {
            token: token.into(),
            cost,
            precedence,
        }
    }

    pub fn to_message(&self, conn_id: u32) -> Result<Message> {
        json_message(UPDATE_BIND, conn_id, self)
    }

    pub fn from_message(msg: &Message) -> Result<Self> {
        from_json_message(UPDATE_BIND, msg)
    }
}

/// STATE_CLOSED frame announcing that a logical connection is going away.
pub fn state_closed(conn_id: u32) -> Message {
    let mut msg = Message::new(STATE_CLOSED, Bytes::new());
    msg.put_u32_header(CONN_ID_HEADER, conn_id);
    msg
}

fn json_message<T: Serialize>(content_type: u32, conn_id: u32, body: &T) -> Result<Message> {
    let mut msg = Message::new(content_type, serde_json::to_vec(body)?);
    msg.put_u32_header(CONN_ID_HEADER, conn_id);
    Ok(msg)
}

fn from_json_message<T: for<'de> Deserialize<'de>>(content_type: u32, msg: &Message) -> Result<T> {
    if msg.content_type != content_type {
        return Err(EdgeError::UnexpectedContentType {
            expected: content_type,
            actual: msg.content_type,
        });
    }
    Ok(serde_json::from_slice(&msg.body)?)
}
