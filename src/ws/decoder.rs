use std::io::ErrorKind::{TimedOut, UnexpectedEof, WouldBlock};
use std::io::Read;

use crate::ws::{protocol, Error, Frame};

/// Reads exactly one frame from the stream, blocking until header and payload
/// are complete.
///
/// Returns [`Error::NoData`] when the stream yields nothing before the first
/// header byte (clean end of stream, or a `WouldBlock`/`TimedOut` from a
/// caller configured read timeout) and [`Error::ConnectionClosed`] when the
/// stream terminates mid frame. The opcode is returned raw, validation
/// happens during dispatch.
pub fn read_frame<S: Read>(stream: &mut S) -> Result<Frame, Error> {
    let mut header = [0u8; 2];
    let n = match stream.read(&mut header) {
        Ok(n) => n,
        Err(err) if matches!(err.kind(), WouldBlock | TimedOut) => return Err(Error::NoData),
        Err(err) => return Err(err.into()),
    };
    if n == 0 {
        return Err(Error::NoData);
    }
    read_exact(stream, &mut header[n..])?;

    // Byte 1: FIN(1) RSV(3) OPCODE(4), RSV bits ignored
    let fin = header[0] & protocol::FIN_MASK != 0;
    let op_code = header[0] & protocol::OP_CODE_MASK;

    // Byte 2: MASK(1) LENGTH(7)
    let masked = header[1] & protocol::MASK_MASK != 0;
    let payload_length = match header[1] & protocol::PAYLOAD_LENGTH_MASK {
        126 => {
            let mut bytes = [0u8; 2];
            read_exact(stream, &mut bytes)?;
            u16::from_be_bytes(bytes) as u64
        }
        127 => {
            let mut bytes = [0u8; 8];
            read_exact(stream, &mut bytes)?;
            u64::from_be_bytes(bytes)
        }
        length => length as u64,
    };

    // servers never set the mask bit but must still parse the key when present
    let mask_key = if masked {
        let mut key = [0u8; 4];
        read_exact(stream, &mut key)?;
        Some(key)
    } else {
        None
    };

    let mut payload = alloc_payload(payload_length)?;
    read_exact(stream, &mut payload)?;

    if let Some(key) = mask_key {
        protocol::apply_mask(&mut payload, key);
    }

    Ok(Frame { fin, op_code, payload })
}

/// Fallible payload buffer allocation so an oversized frame surfaces as
/// [`Error::PayloadTooLarge`] instead of aborting the host.
fn alloc_payload(length: u64) -> Result<Vec<u8>, Error> {
    let len = usize::try_from(length).map_err(|_| Error::PayloadTooLarge(length))?;
    let mut payload = Vec::new();
    payload.try_reserve_exact(len).map_err(|_| Error::PayloadTooLarge(length))?;
    payload.resize(len, 0);
    Ok(payload)
}

fn read_exact<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<(), Error> {
    stream.read_exact(buf).map_err(|err| match err.kind() {
        UnexpectedEof => Error::ConnectionClosed,
        _ => Error::Io(err),
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::io::Cursor;

    use super::*;
    use crate::ws::protocol::OpCode;

    const TEXT: u8 = OpCode::Text as u8;
    const BINARY: u8 = OpCode::Binary as u8;

    #[test]
    fn should_read_short_unmasked_frame() {
        let mut stream = Cursor::new([&[0x81, 0x05][..], b"hello"].concat());

        let frame = read_frame(&mut stream).unwrap();

        assert!(frame.fin);
        assert_eq!(TEXT, frame.op_code);
        assert_eq!(b"hello", frame.payload.as_slice());
    }

    #[test]
    fn should_read_extended_16_bit_length() {
        let body = vec![0xABu8; 300];
        let mut wire = vec![0x82, 126, 0x01, 0x2C]; // 300 big endian
        wire.extend_from_slice(&body);
        let mut stream = Cursor::new(wire);

        let frame = read_frame(&mut stream).unwrap();

        assert_eq!(BINARY, frame.op_code);
        assert_eq!(body, frame.payload);
    }

    #[test]
    fn should_read_extended_64_bit_length() {
        let body = vec![0x42u8; 70_000];
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&70_000u64.to_be_bytes());
        wire.extend_from_slice(&body);
        let mut stream = Cursor::new(wire);

        let frame = read_frame(&mut stream).unwrap();

        assert_eq!(70_000, frame.payload.len());
        assert_eq!(body, frame.payload);
    }

    #[test]
    fn should_unmask_masked_payload() {
        let key = [0x11u8, 0x22, 0x33, 0x44];
        let mut body = b"masked payload".to_vec();
        protocol::apply_mask(&mut body, key);
        let mut wire = vec![0x81, 0x80 | 14];
        wire.extend_from_slice(&key);
        wire.extend_from_slice(&body);
        let mut stream = Cursor::new(wire);

        let frame = read_frame(&mut stream).unwrap();

        assert_eq!(b"masked payload", frame.payload.as_slice());
    }

    #[test]
    fn should_keep_fragmented_flag() {
        let mut stream = Cursor::new(vec![0x01, 0x00]); // fin clear, text, empty

        let frame = read_frame(&mut stream).unwrap();

        assert!(!frame.fin);
        assert_eq!(TEXT, frame.op_code);
    }

    #[test]
    fn should_signal_no_data_on_empty_stream() {
        let mut stream = Cursor::new(Vec::new());

        assert!(matches!(read_frame(&mut stream), Err(Error::NoData)));
    }

    #[test]
    fn should_signal_no_data_on_read_timeout() {
        struct TimedOutStream;

        impl io::Read for TimedOutStream {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::TimedOut))
            }
        }

        assert!(matches!(read_frame(&mut TimedOutStream), Err(Error::NoData)));
    }

    #[test]
    fn should_fail_when_stream_terminates_mid_frame() {
        // header promises 5 payload bytes, stream carries 2
        let mut stream = Cursor::new(vec![0x81, 0x05, b'h', b'i']);

        assert!(matches!(read_frame(&mut stream), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn should_reject_unbufferable_payload_length() {
        let mut wire = vec![0x82, 127];
        wire.extend_from_slice(&protocol::MAX_PAYLOAD_LENGTH.to_be_bytes());
        let mut stream = Cursor::new(wire);

        assert!(matches!(
            read_frame(&mut stream),
            Err(Error::PayloadTooLarge(length)) if length == protocol::MAX_PAYLOAD_LENGTH
        ));
    }

    #[test]
    fn mask_is_an_involution() {
        let original = b"the quick brown fox".to_vec();
        let key = [0xDE, 0xAD, 0xBE, 0xEF];

        let mut masked = original.clone();
        protocol::apply_mask(&mut masked, key);
        assert_ne!(original, masked);

        protocol::apply_mask(&mut masked, key);
        assert_eq!(original, masked);
    }
}
