//! Wire protocol for the remote vault.
//!
//! Every message is one frame: a 4-byte big-endian length followed by that
//! many bytes of JSON. Three message shapes:
//!
//! ```text
//! {"type":"call",   "id":7, "target":3, "method":"get", "args":["label"]}
//! {"type":"return", "id":7, "payload":{"type":"plain","value":"savings"}}
//! {"type":"throw",  "id":7, "payload":{"kind":"state","message":"..."}}
//! ```
//!
//! `target` names a vault instance on the server; calls without one go to
//! the factory. Replies carry the id of the call they answer.

use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{ErrorKind, Result, VaultError};
use crate::vault::entry::{SecretHandle, VaultValue};

/// Frames larger than this are treated as a protocol error.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Call {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<u64>,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Return {
        id: u64,
        payload: Value,
    },
    Throw {
        id: u64,
        payload: RemoteError,
    },
}

impl Message {
    pub fn id(&self) -> u64 {
        match self {
            Self::Call { id, .. } | Self::Return { id, .. } | Self::Throw { id, .. } => *id,
        }
    }

    /// Wipe the strings a call or return carries, once it has been sent.
    pub fn scrub(&mut self) {
        match self {
            Self::Call { args, .. } => args.iter_mut().for_each(scrub),
            Self::Return { payload, .. } => scrub(payload),
            Self::Throw { .. } => {}
        }
    }
}

/// Zeroize every string inside `value`, then leave it `null`.
pub fn scrub(value: &mut Value) {
    match value {
        Value::String(text) => text.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(scrub),
        Value::Object(map) => map.values_mut().for_each(scrub),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    *value = Value::Null;
}

/// An error as it travels in a `throw` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&VaultError> for RemoteError {
    fn from(error: &VaultError) -> Self {
        Self {
            kind: error.kind(),
            message: error.detail(),
        }
    }
}

impl From<RemoteError> for VaultError {
    fn from(error: RemoteError) -> Self {
        VaultError::from_remote(error.kind, error.message)
    }
}

/// How a [`VaultValue`] crosses the wire. Handles travel only as their
/// public descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireValue {
    Plain { value: Value },
    Handle { kind: String, public: Value },
    Unsupported { key: String },
}

impl From<&VaultValue> for WireValue {
    fn from(value: &VaultValue) -> Self {
        match value {
            VaultValue::Plain(value) => Self::Plain {
                value: value.clone(),
            },
            VaultValue::Handle(handle) => Self::Handle {
                kind: handle.kind().to_string(),
                public: handle.public(),
            },
            VaultValue::Unsupported { key } => Self::Unsupported { key: key.clone() },
        }
    }
}

impl From<WireValue> for VaultValue {
    fn from(value: WireValue) -> Self {
        match value {
            WireValue::Plain { value } => VaultValue::Plain(value),
            WireValue::Handle { kind, public } => {
                VaultValue::Handle(Arc::new(RemoteHandle { kind, public }))
            }
            WireValue::Unsupported { key } => VaultValue::Unsupported { key },
        }
    }
}

/// Client-side stand-in for a handle that lives in the remote engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHandle {
    pub kind: String,
    pub public: Value,
}

impl SecretHandle for RemoteHandle {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn public(&self) -> Value {
        self.public.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Write one length-prefixed frame and flush.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, message: &Message) -> Result<()> {
    let body = Zeroizing::new(
        serde_json::to_vec(message).map_err(|e| VaultError::Serialization(format!("frame: {e}")))?,
    );
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| {
            VaultError::Protocol(format!("frame of {} bytes is too large", body.len()))
        })?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Message>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == IoErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(VaultError::Protocol(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_LEN}-byte limit"
        )));
    }

    let mut body = Zeroizing::new(vec![0u8; len as usize]);
    reader.read_exact(&mut body)?;
    serde_json::from_slice(&body)
        .map(Some)
        .map_err(|e| VaultError::Protocol(format!("malformed frame: {e}")))
}
