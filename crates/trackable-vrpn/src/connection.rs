//! Client side of one VRPN TCP session.
//!
//! [`Connection::open`] connects, swaps cookies with the server and announces
//! the local sender and message types.  After that the connection is driven
//! from outside: [`Connection::receive`] waits for the socket to become
//! readable and decodes whatever arrived, [`Connection::drain`] does the same
//! without waiting.  Control messages are consumed here; only data messages
//! with resolved sender/type names are handed back.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use trackable_types::{ConnectionDescriptor, TrackableError};

use crate::codec::{
    self, COOKIE_LEN, DISCONNECT_MESSAGE, Frame, LOG_DESCRIPTION, SENDER_DESCRIPTION,
    TYPE_DESCRIPTION, UDP_DESCRIPTION,
};

const READ_CHUNK: usize = 4096;

/// Most bytes one `drain` pulls off the socket.  A peer that never stops
/// sending must not keep a pump from returning to the executor.
const DRAIN_BUDGET: usize = 16 * READ_CHUNK;

/// A data message with its ids resolved to names.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl Message {
    pub fn is(&self, sender: &str, kind: &str) -> bool {
        self.sender == sender && self.kind == kind
    }
}

/// An open, handshaken VRPN session.  Dropping it closes the socket.
pub struct Connection {
    address: String,
    stream: TcpStream,
    read_buf: Vec<u8>,
    remote_senders: HashMap<i32, String>,
    remote_types: HashMap<i32, String>,
    closed: bool,
    // Last drain stopped on the byte budget, not on an empty socket.
    saturated: bool,
}

impl Connection {
    /// Connect to `descriptor`, exchange cookies and describe the local
    /// sender (the device name) plus every entry of `local_types`.
    ///
    /// Connecting and the cookie exchange are each bounded by
    /// `connect_timeout`.
    ///
    /// # Errors
    ///
    /// * [`TrackableError::ConnectionFailed`] – bad port, unreachable host,
    ///   refused connection, or no answer in time.
    /// * [`TrackableError::Protocol`] – the peer is not a compatible VRPN
    ///   server.
    pub async fn open(
        descriptor: &ConnectionDescriptor,
        local_types: &[&str],
        connect_timeout: Duration,
    ) -> Result<Self, TrackableError> {
        let address = descriptor.address();
        let port = descriptor.port_number()?;
        let failed = |details: String| TrackableError::ConnectionFailed {
            address: address.clone(),
            details,
        };

        let connect = TcpStream::connect((descriptor.host.as_str(), port));
        let mut stream = match timeout(connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(_) => return Err(failed(format!("no answer within {connect_timeout:?}"))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(address = %address, error = %e, "could not disable Nagle");
        }

        match timeout(connect_timeout, exchange_cookies(&mut stream)).await {
            Ok(result) => result.map_err(|e| match e {
                TrackableError::Protocol(_) => e,
                other => failed(other.to_string()),
            })?,
            Err(_) => return Err(failed(format!("no cookie within {connect_timeout:?}"))),
        }

        let mut connection = Self {
            address,
            stream,
            read_buf: Vec::with_capacity(READ_CHUNK),
            remote_senders: HashMap::new(),
            remote_types: HashMap::new(),
            closed: false,
            saturated: false,
        };
        connection.announce(&descriptor.device, local_types).await?;
        info!(address = %connection.address, "vrpn connection established");
        Ok(connection)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait until the socket is readable, then [`drain`][Self::drain] it.
    ///
    /// Cancel safe: nothing is consumed until the socket reports readiness.
    pub async fn receive(&mut self) -> Result<Vec<Message>, TrackableError> {
        if self.closed {
            return Err(self.closed_error());
        }
        if self.saturated {
            tokio::task::yield_now().await;
        }
        self.stream
            .readable()
            .await
            .map_err(|e| self.io_error(e))?;
        self.drain()
    }

    /// Read what the socket has buffered, up to a fixed byte budget, without
    /// waiting, and decode every complete frame.
    ///
    /// If the server closed the session, data messages that arrived before
    /// the close are still returned; the next call fails.
    ///
    /// # Errors
    ///
    /// [`TrackableError::ConnectionFailed`] once the server has gone away,
    /// [`TrackableError::Protocol`] for malformed frames.
    pub fn drain(&mut self) -> Result<Vec<Message>, TrackableError> {
        if self.closed {
            return Err(self.closed_error());
        }

        let mut chunk = [0u8; READ_CHUNK];
        let mut budget = DRAIN_BUDGET;
        self.saturated = false;
        while budget > 0 {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    debug!(address = %self.address, "server closed the connection");
                    self.closed = true;
                    break;
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    budget = budget.saturating_sub(n);
                    self.saturated = budget == 0;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(self.io_error(e));
                }
            }
        }

        let messages = self.decode_buffered()?;
        if self.closed && messages.is_empty() {
            return Err(self.closed_error());
        }
        Ok(messages)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn announce(&mut self, device: &str, local_types: &[&str]) -> Result<(), TrackableError> {
        let mut out = codec::description_frame(SENDER_DESCRIPTION, 0, device).encode();
        for (id, name) in local_types.iter().enumerate() {
            out.extend(codec::description_frame(TYPE_DESCRIPTION, id as i32, name).encode());
        }
        self.stream
            .write_all(&out)
            .await
            .map_err(|e| self.io_error(e))
    }

    fn decode_buffered(&mut self) -> Result<Vec<Message>, TrackableError> {
        let mut messages = Vec::new();
        let mut offset = 0;
        while let Some((frame, used)) = Frame::decode(&self.read_buf[offset..])? {
            offset += used;
            if let Some(message) = self.handle_frame(frame)? {
                messages.push(message);
            }
            if self.closed {
                break;
            }
        }
        self.read_buf.drain(..offset);
        Ok(messages)
    }

    fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>, TrackableError> {
        match frame.msg_type {
            SENDER_DESCRIPTION => {
                let name = codec::decode_description(&frame.body)?;
                debug!(id = frame.sender, name = %name, "peer sender described");
                self.remote_senders.insert(frame.sender, name);
                Ok(None)
            }
            TYPE_DESCRIPTION => {
                let name = codec::decode_description(&frame.body)?;
                debug!(id = frame.sender, name = %name, "peer type described");
                self.remote_types.insert(frame.sender, name);
                Ok(None)
            }
            UDP_DESCRIPTION | LOG_DESCRIPTION => Ok(None),
            DISCONNECT_MESSAGE => {
                debug!(address = %self.address, "server sent disconnect");
                self.closed = true;
                Ok(None)
            }
            t if t < 0 => {
                debug!(msg_type = t, "ignoring unknown control message");
                Ok(None)
            }
            t => {
                let (Some(sender), Some(kind)) = (
                    self.remote_senders.get(&frame.sender),
                    self.remote_types.get(&t),
                ) else {
                    warn!(
                        sender = frame.sender,
                        msg_type = t,
                        "dropping message with undescribed sender or type"
                    );
                    return Ok(None);
                };
                Ok(Some(Message {
                    sender: sender.clone(),
                    kind: kind.clone(),
                    timestamp: frame.timestamp,
                    body: frame.body,
                }))
            }
        }
    }

    fn io_error(&self, e: std::io::Error) -> TrackableError {
        TrackableError::ConnectionFailed {
            address: self.address.clone(),
            details: e.to_string(),
        }
    }

    fn closed_error(&self) -> TrackableError {
        TrackableError::ConnectionFailed {
            address: self.address.clone(),
            details: "server closed the connection".to_string(),
        }
    }
}

/// Write our cookie, then read and verify the peer's.
pub(crate) async fn exchange_cookies(stream: &mut TcpStream) -> Result<(), TrackableError> {
    let io = |e: std::io::Error| TrackableError::Protocol(format!("cookie exchange: {e}"));
    stream.write_all(&codec::encode_cookie()).await.map_err(io)?;
    let mut peer = [0u8; COOKIE_LEN];
    stream.read_exact(&mut peer).await.map_err(io)?;
    codec::check_cookie(&peer)
}
