//! Client and server ends of a vault channel.
//!
//! Both ends handle one call at a time, in order. On the server this is
//! the [`serve`] loop; on the client every call holds the connection lock
//! for its whole round trip.
//!
//! The client fails closed: a `throw` reply revokes the endpoint that
//! made the call, and anything that desynchronizes the stream (I/O
//! failure, malformed frame, mismatched id) revokes the whole
//! connection. Revoked endpoints refuse further calls with
//! [`VaultError::Revoked`].

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::protocol::{read_frame, write_frame, Message, RemoteError};
use crate::errors::{ErrorKind, Result, VaultError};
use crate::revocable::{Revoke, Revoker};

/// Server-side dispatch.
pub trait CallHandler {
    /// Handle one call. `target` is `None` for factory calls.
    fn handle_call(&mut self, target: Option<u64>, method: &str, args: Vec<Value>) -> Result<Value>;
}

/// Answer calls from `reader` until the peer closes the stream.
///
/// Handler errors, and panics, become `throw` replies; only transport
/// failures end the loop early.
pub fn serve<R, W, H>(mut reader: R, mut writer: W, handler: &mut H) -> Result<()>
where
    R: Read,
    W: Write,
    H: CallHandler + ?Sized,
{
    while let Some(message) = read_frame(&mut reader)? {
        let (id, target, method, args) = match message {
            Message::Call {
                id,
                target,
                method,
                args,
            } => (id, target, method, args),
            reply => {
                return Err(VaultError::Protocol(format!(
                    "expected a call, got reply {}",
                    reply.id()
                )))
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            handler.handle_call(target, &method, args)
        }))
        .unwrap_or_else(|_| {
            warn!(method = %method, "call handler panicked");
            Err(VaultError::Remote {
                kind: ErrorKind::Internal,
                message: format!("handler for '{method}' panicked"),
            })
        });

        let mut reply = match outcome {
            Ok(payload) => Message::Return { id, payload },
            Err(e) => {
                debug!(method = %method, error = %e, "call failed");
                Message::Throw {
                    id,
                    payload: RemoteError::from(&e),
                }
            }
        };
        let written = write_frame(&mut writer, &reply);
        reply.scrub();
        written?;
    }
    Ok(())
}

struct Channel {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    next_id: u64,
}

/// Client end of one stream. Clones share the stream.
#[derive(Clone)]
pub struct Connection {
    channel: Arc<Mutex<Channel>>,
    revoker: Revoker,
}

impl Connection {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            channel: Arc::new(Mutex::new(Channel {
                reader: Box::new(reader),
                writer: Box::new(writer),
                next_id: 1,
            })),
            revoker: Revoker::new(),
        }
    }

    /// One round trip. The outer error is local (revoked, transport,
    /// desync); the inner one is the server's `throw`.
    fn round_trip(
        &self,
        target: Option<u64>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<std::result::Result<Value, RemoteError>> {
        self.revoker.check()?;
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| VaultError::State("connection lock poisoned".into()))?;

        let id = channel.next_id;
        channel.next_id += 1;
        let mut call = Message::Call {
            id,
            target,
            method: method.to_string(),
            args,
        };

        let channel = &mut *channel;
        let reply = write_frame(&mut channel.writer, &call)
            .and_then(|()| read_frame(&mut channel.reader));
        call.scrub();

        match reply {
            Ok(Some(Message::Return { id: reply_id, payload })) if reply_id == id => Ok(Ok(payload)),
            Ok(Some(Message::Throw { id: reply_id, payload })) if reply_id == id => Ok(Err(payload)),
            Ok(Some(other)) => {
                warn!(expected = id, got = other.id(), "reply out of sequence; closing connection");
                self.revoker.revoke();
                Err(VaultError::Protocol(format!(
                    "expected reply to call {id}, got message {}",
                    other.id()
                )))
            }
            Ok(None) => {
                warn!(method, "connection closed by peer");
                self.revoker.revoke();
                Err(VaultError::Protocol("connection closed by peer".into()))
            }
            Err(e) => {
                warn!(method, error = %e, "transport failure; closing connection");
                self.revoker.revoke();
                Err(e)
            }
        }
    }
}

impl Revoke for Connection {
    fn revoker(&self) -> &Revoker {
        &self.revoker
    }
}

/// A remote object: a connection plus the server-side instance it
/// addresses. Revoked when the connection is.
pub struct Endpoint {
    connection: Connection,
    target: Option<u64>,
    revoker: Revoker,
}

impl Endpoint {
    pub fn new(connection: Connection, target: Option<u64>) -> Self {
        let revoker = connection.revoker.child();
        Self {
            connection,
            target,
            revoker,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn target(&self) -> Option<u64> {
        self.target
    }

    /// Call `method`; a `throw` reply revokes this endpoint.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.revoker.check()?;
        match self.connection.round_trip(self.target, method, args)? {
            Ok(payload) => Ok(payload),
            Err(remote) => {
                debug!(method, kind = ?remote.kind, "remote call threw; revoking endpoint");
                self.revoker.revoke();
                Err(remote.into())
            }
        }
    }

    /// [`call`](Self::call) and decode the payload. A payload of the
    /// wrong shape also revokes the endpoint.
    pub fn call_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let payload = self.call(method, args)?;
        serde_json::from_value(payload).map_err(|e| {
            self.revoker.revoke();
            VaultError::Protocol(format!("unexpected reply to '{method}': {e}"))
        })
    }
}

impl Revoke for Endpoint {
    fn revoker(&self) -> &Revoker {
        &self.revoker
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("target", &self.target)
            .field("revoked", &self.revoker.is_revoked())
            .finish_non_exhaustive()
    }
}
