use std::io::Write;

use rand::Rng;
use smallvec::SmallVec;

use crate::ws::protocol::{self, OpCode};
use crate::ws::Error;

// 2 base header bytes + 8 byte extended length + 4 byte mask key
type Header = SmallVec<[u8; 14]>;

/// Serialises and writes exactly one complete frame. Frames are never
/// fragmented, the FIN bit is always set.
///
/// When `mask` is set (client role) the payload is XOR-ed with a fresh 4 byte
/// key before transmission. The key only has to vary per frame, it is a
/// protocol compliance requirement and not a security boundary.
pub fn write_frame<S: Write>(stream: &mut S, op_code: OpCode, payload: &[u8], mask: bool) -> Result<(), Error> {
    let key = mask.then(|| rand::rng().random::<[u8; 4]>());
    write_frame_with_key(stream, op_code, payload, key)
}

pub(crate) fn write_frame_with_key<S: Write>(
    stream: &mut S,
    op_code: OpCode,
    payload: &[u8],
    key: Option<[u8; 4]>,
) -> Result<(), Error> {
    let mut header = Header::new();
    header.push(protocol::FIN_MASK | op_code as u8);

    let length = payload.len() as u64;
    let mask_bit = if key.is_some() { protocol::MASK_MASK } else { 0 };
    match length {
        0..=125 => header.push(mask_bit | length as u8),
        126..=0xFFFF => {
            header.push(mask_bit | 126);
            header.extend_from_slice(&(length as u16).to_be_bytes());
        }
        _ if length <= protocol::MAX_PAYLOAD_LENGTH => {
            header.push(mask_bit | 127);
            header.extend_from_slice(&length.to_be_bytes());
        }
        _ => return Err(Error::InvalidFrameLength(length)),
    }

    match key {
        Some(key) => {
            header.extend_from_slice(&key);
            stream.write_all(&header)?;
            let mut masked = payload.to_vec();
            protocol::apply_mask(&mut masked, key);
            stream.write_all(&masked)?;
        }
        None => {
            stream.write_all(&header)?;
            stream.write_all(payload)?;
        }
    }
    stream.flush()?;
    Ok(())
}
