//! Blocking websocket protocol engine.
//!
//! Wraps a single already-upgraded byte stream and exposes a message level
//! API on top of the two frame primitives [`Websocket::read_frame`] and
//! [`Websocket::write_frame`]. The HTTP upgrade handshake and transport
//! bring-up are the caller's job, the engine is handed a stream on which the
//! `101 Switching Protocols` exchange has already completed.
//!
//! Control frames are handled inside the receive loop: pings are answered
//! with an echoing pong, pongs are discarded, a close frame transitions the
//! connection to its closed state and surfaces as [`Event::Closed`].
//!
//! Message fragmentation is not implemented. Frames with the FIN bit clear
//! or a continuation opcode are rejected with [`Error::Unsupported`] rather
//! than reassembled, peers that fragment messages cannot be served.
//!
//! ## Examples
//!
//! Drive a websocket over an upgraded stream.
//! ```no_run
//! use std::net::TcpStream;
//! use framesock::ws::{Event, IntoWebsocket, Role};
//!
//! let stream = TcpStream::connect("192.168.4.1:8266").unwrap();
//! // ... perform the HTTP upgrade handshake on `stream` here ...
//! let mut ws = stream.into_websocket(Role::Client);
//!
//! ws.send_text("{\"cmd\":\"status\"}").unwrap();
//! loop {
//!     match ws.recv().unwrap() {
//!         Some(Event::Text(body)) => println!("{body}"),
//!         Some(Event::Closed { code, reason }) => {
//!             println!("peer closed: {code:?} {reason}");
//!             break;
//!         }
//!         Some(Event::Binary(_)) | None => {}
//!     }
//! }
//! ```

use std::io::{Read, Write};

use log::{debug, trace, warn};

// re-export
pub use crate::ws::error::Error;
pub use crate::ws::protocol::{CloseCode, OpCode};

pub mod decoder;
pub mod encoder;
mod error;
pub mod protocol;

/// One discrete unit of the wire protocol. Transient, constructed and
/// consumed within a single read or write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// Raw opcode bits as read off the wire, validated during dispatch.
    pub op_code: u8,
    pub payload: Vec<u8>,
}

/// Which side of the connection this endpoint plays. Clients mask outgoing
/// frames, servers never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    const fn masks_frames(self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Outgoing application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

/// Application level result of [`Websocket::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Text(String),
    Binary(Vec<u8>),
    /// The peer has sent a close frame and the websocket has been closed as a
    /// result. Status code and reason are parsed out of the frame payload
    /// when present.
    Closed { code: Option<u16>, reason: String },
}

#[derive(Debug)]
enum State<S> {
    Open(S),
    Closed,
}

/// Websocket connection that owns the underlying stream.
///
/// Not internally synchronised, one thread of control per connection. All
/// operations block, bounded waits belong to the transport (for example a
/// read timeout on the socket), which surfaces here as a no-data signal.
#[derive(Debug)]
pub struct Websocket<S> {
    state: State<S>,
    role: Role,
}

impl<S> Websocket<S> {
    pub const fn new(stream: S, role: Role) -> Self {
        Self {
            state: State::Open(stream),
            role,
        }
    }

    /// Checks if the websocket is still open. Turns false after a [`close`],
    /// a close frame from the peer or a transport failure.
    ///
    /// [`close`]: Websocket::close
    pub const fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    fn stream(&mut self) -> Result<&mut S, Error> {
        match &mut self.state {
            State::Open(stream) => Ok(stream),
            State::Closed => Err(Error::InvalidState),
        }
    }

    /// Dropping the stream releases the transport.
    fn release(&mut self) {
        self.state = State::Closed;
    }
}

impl<S: Read + Write> Websocket<S> {
    /// Reads the next frame from the transport, blocking until it is
    /// complete.
    ///
    /// A frame too large to buffer is not surfaced as a fault. The connection
    /// is closed with [`CloseCode::MessageTooBig`] and the frame is reported
    /// as an empty close frame, callers observe a normal close signal.
    pub fn read_frame(&mut self) -> Result<Frame, Error> {
        match decoder::read_frame(self.stream()?) {
            Ok(frame) => Ok(frame),
            Err(Error::PayloadTooLarge(length)) => {
                warn!("cannot buffer frame of {length} bytes, closing");
                let _ = self.close_with(CloseCode::MessageTooBig, "");
                Ok(Frame {
                    fin: true,
                    op_code: OpCode::Close as u8,
                    payload: Vec::new(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Writes a single complete frame, masking the payload when this endpoint
    /// plays the client role.
    pub fn write_frame(&mut self, op_code: OpCode, payload: &[u8]) -> Result<(), Error> {
        let mask = self.role.masks_frames();
        encoder::write_frame(self.stream()?, op_code, payload, mask)
    }

    /// Returns the next application message, transparently answering pings
    /// and discarding pongs along the way.
    ///
    /// `Ok(None)` means the stream had nothing to process right now, not a
    /// failure. A close frame from the peer yields [`Event::Closed`] and the
    /// websocket transitions to its closed state. May block through multiple
    /// control frame exchanges before yielding.
    pub fn recv(&mut self) -> Result<Option<Event>, Error> {
        if !self.is_open() {
            return Err(Error::InvalidState);
        }
        loop {
            let frame = match self.read_frame() {
                Ok(frame) => frame,
                Err(Error::NoData) => return Ok(None),
                Err(Error::ConnectionClosed) => {
                    self.release();
                    return Err(Error::ConnectionClosed);
                }
                Err(err) => return Err(err),
            };

            if !frame.fin {
                return Err(Error::Unsupported("fragmented frame"));
            }

            match OpCode::from_u8(frame.op_code) {
                Some(OpCode::Text) => return Ok(Some(Event::Text(String::from_utf8(frame.payload)?))),
                Some(OpCode::Binary) => return Ok(Some(Event::Binary(frame.payload))),
                Some(OpCode::Close) => {
                    let (code, reason) = parse_close_payload(&frame.payload);
                    debug!("peer sent close frame: code {code:?}, reason {reason:?}");
                    self.release();
                    return Ok(Some(Event::Closed { code, reason }));
                }
                Some(OpCode::Pong) => {
                    trace!("discarding pong frame");
                }
                Some(OpCode::Ping) => {
                    trace!("answering ping with pong");
                    self.write_frame(OpCode::Pong, &frame.payload)?;
                }
                Some(OpCode::Continuation) => return Err(Error::Unsupported("continuation frame")),
                None => return Err(Error::Protocol("reserved opcode")),
            }
        }
    }

    /// Sends one application message.
    pub fn send(&mut self, message: Message) -> Result<(), Error> {
        match message {
            Message::Text(body) => self.send_text(&body),
            Message::Binary(body) => self.send_binary(&body),
        }
    }

    #[inline]
    pub fn send_text(&mut self, body: &str) -> Result<(), Error> {
        self.write_frame(OpCode::Text, body.as_bytes())
    }

    #[inline]
    pub fn send_binary(&mut self, body: &[u8]) -> Result<(), Error> {
        self.write_frame(OpCode::Binary, body)
    }

    /// Gracefully shuts the connection down with [`CloseCode::Normal`].
    pub fn close(&mut self) -> Result<(), Error> {
        self.close_with(CloseCode::Normal, "")
    }

    /// Writes a close frame carrying `code` and `reason`, then releases the
    /// transport. Idempotent, a second call is a no-op that writes nothing.
    ///
    /// The state transitions to closed even when the close frame cannot be
    /// written, the write error is still reported to the caller.
    pub fn close_with(&mut self, code: CloseCode, reason: &str) -> Result<(), Error> {
        if !self.is_open() {
            return Ok(());
        }
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&u16::from(code).to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        let result = self.write_frame(OpCode::Close, &payload);
        self.release();
        result
    }
}

fn parse_close_payload(payload: &[u8]) -> (Option<u16>, String) {
    match payload.split_at_checked(2) {
        Some((code, reason)) => (
            Some(u16::from_be_bytes([code[0], code[1]])),
            String::from_utf8_lossy(reason).into_owned(),
        ),
        None => (None, String::new()),
    }
}

pub trait IntoWebsocket {
    fn into_websocket(self, role: Role) -> Websocket<Self>
    where
        Self: Sized;
}

impl<T> IntoWebsocket for T
where
    T: Read + Write,
{
    fn into_websocket(self, role: Role) -> Websocket<Self>
    where
        Self: Sized,
    {
        Websocket::new(self, role)
    }
}
