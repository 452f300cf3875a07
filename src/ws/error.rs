use std::io;
use std::io::ErrorKind::Other;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The stream had nothing to offer before the first header byte. This is
    /// transient, try again later.
    #[error("no data available on the stream")]
    NoData,
    /// The transport terminated mid frame. The websocket is closed and can be
    /// dropped.
    #[error("the transport stream terminated unexpectedly")]
    ConnectionClosed,
    #[error("unsupported websocket feature: {0}")]
    Unsupported(&'static str),
    #[error("websocket protocol error: {0}")]
    Protocol(&'static str),
    #[error("text frame payload is not valid UTF-8: {0}")]
    InvalidPayload(#[from] FromUtf8Error),
    #[error("operation attempted on a closed websocket")]
    InvalidState,
    #[error("payload length {0} cannot be encoded in a frame header")]
    InvalidFrameLength(u64),
    /// Raised by the raw decoder when a payload cannot be buffered.
    /// [`Websocket::read_frame`](crate::ws::Websocket::read_frame) downgrades
    /// it to a graceful close instead of surfacing it.
    #[error("frame payload of {0} bytes cannot be buffered")]
    PayloadTooLarge(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        io::Error::new(Other, value)
    }
}
