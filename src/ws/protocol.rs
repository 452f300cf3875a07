pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV_MASK: u8 = 0b0111_0000;
pub const OP_CODE_MASK: u8 = 0b0000_1111;
pub const MASK_MASK: u8 = 0b1000_0000;
pub const PAYLOAD_LENGTH_MASK: u8 = 0b0111_1111;

/// Largest payload length encodable in the 8 byte extended length field. RFC
/// 6455 requires the most significant bit of that field to be zero.
pub const MAX_PAYLOAD_LENGTH: u64 = i64::MAX as u64;

/// 4 bit frame type tag. Values `0x3..=0x7` and `0xB..=0xF` are reserved and
/// rejected during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// Control frames are handled inside the receive loop and never surfaced
    /// as application messages.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// Status codes carried in the first two bytes of a close frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    Normal = 1000,
    GoingAway = 1001,
    ProtocolError = 1002,
    UnsupportedData = 1003,
    InvalidPayload = 1007,
    PolicyViolation = 1008,
    MessageTooBig = 1009,
    MissingExtension = 1010,
    InternalError = 1011,
}

impl CloseCode {
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::ProtocolError),
            1003 => Some(Self::UnsupportedData),
            1007 => Some(Self::InvalidPayload),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1010 => Some(Self::MissingExtension),
            1011 => Some(Self::InternalError),
            _ => None,
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

/// XOR the payload with the 4 byte masking key. The operation is its own
/// inverse, the same call masks and unmasks.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}
