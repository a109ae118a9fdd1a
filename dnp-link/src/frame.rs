//! Link frame structure and encoding/decoding
//!
//! A frame is a ten byte header (start bytes, length, control, destination,
//! source and a header CRC) followed by up to 250 bytes of user data split
//! into blocks of 16 bytes, each block carrying its own CRC.

use crate::crc::{self, CrcCalc};
use crate::error::{DnpError, DnpResult};
use bytes::Bytes;
use std::fmt;

/// Frame start bytes
pub const START: [u8; 2] = [0x05, 0x64];

/// Header length including its CRC
pub const HEADER_SIZE: usize = 10;

/// Maximum user data bytes in one frame
pub const MAX_USER_DATA: usize = 250;

/// User data bytes covered by one block CRC
pub const BLOCK_SIZE: usize = 16;

/// Largest encoded frame
pub const MAX_FRAME_SIZE: usize = 292;

/// Lowest broadcast destination address
pub const BROADCAST_MIN: u16 = 0xFFFD;

const DIR: u8 = 0x80;
const PRM: u8 = 0x40;
const FCB: u8 = 0x20;
const FCV: u8 = 0x10;
const FUNC_MASK: u8 = 0x0F;

/// Link function code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkFunction {
    // Primary to secondary
    ResetLinkStates,
    TestLinkStates,
    ConfirmedUserData,
    UnconfirmedUserData,
    RequestLinkStatus,
    // Secondary to primary
    Ack,
    Nack,
    LinkStatus,
    NotSupported,
}

impl LinkFunction {
    /// Get the function from the control byte
    pub fn from_control_byte(control: u8) -> Option<Self> {
        let primary = control & PRM != 0;
        match (primary, control & FUNC_MASK) {
            (true, 0) => Some(LinkFunction::ResetLinkStates),
            (true, 2) => Some(LinkFunction::TestLinkStates),
            (true, 3) => Some(LinkFunction::ConfirmedUserData),
            (true, 4) => Some(LinkFunction::UnconfirmedUserData),
            (true, 9) => Some(LinkFunction::RequestLinkStatus),
            (false, 0) => Some(LinkFunction::Ack),
            (false, 1) => Some(LinkFunction::Nack),
            (false, 11) => Some(LinkFunction::LinkStatus),
            (false, 15) => Some(LinkFunction::NotSupported),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            LinkFunction::ResetLinkStates => 0,
            LinkFunction::TestLinkStates => 2,
            LinkFunction::ConfirmedUserData => 3,
            LinkFunction::UnconfirmedUserData => 4,
            LinkFunction::RequestLinkStatus => 9,
            LinkFunction::Ack => 0,
            LinkFunction::Nack => 1,
            LinkFunction::LinkStatus => 11,
            LinkFunction::NotSupported => 15,
        }
    }

    /// Whether the function is sent by the primary station
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            LinkFunction::ResetLinkStates
                | LinkFunction::TestLinkStates
                | LinkFunction::ConfirmedUserData
                | LinkFunction::UnconfirmedUserData
                | LinkFunction::RequestLinkStatus
        )
    }

    /// Whether frames with this function carry user data
    pub fn carries_data(&self) -> bool {
        matches!(
            self,
            LinkFunction::ConfirmedUserData | LinkFunction::UnconfirmedUserData
        )
    }
}

/// Decoded link frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    function: LinkFunction,
    from_master: bool,
    fcb: bool,
    fcv: bool,
    destination: u16,
    source: u16,
    user_data: Bytes,
}

impl LinkFrame {
    /// Create a frame without user data
    pub fn new(function: LinkFunction, from_master: bool, destination: u16, source: u16) -> Self {
        Self {
            function,
            from_master,
            fcb: false,
            fcv: false,
            destination,
            source,
            user_data: Bytes::new(),
        }
    }

    /// Create an unconfirmed user data frame
    pub fn unconfirmed(
        from_master: bool,
        destination: u16,
        source: u16,
        user_data: impl Into<Bytes>,
    ) -> Self {
        Self {
            user_data: user_data.into(),
            ..Self::new(LinkFunction::UnconfirmedUserData, from_master, destination, source)
        }
    }

    /// Create a confirmed user data frame
    pub fn confirmed(
        from_master: bool,
        fcb: bool,
        destination: u16,
        source: u16,
        user_data: impl Into<Bytes>,
    ) -> Self {
        Self {
            fcb,
            fcv: true,
            user_data: user_data.into(),
            ..Self::new(LinkFunction::ConfirmedUserData, from_master, destination, source)
        }
    }

    pub fn function(&self) -> LinkFunction {
        self.function
    }

    pub fn is_from_master(&self) -> bool {
        self.from_master
    }

    pub fn fcb(&self) -> bool {
        self.fcb
    }

    pub fn fcv(&self) -> bool {
        self.fcv
    }

    pub fn destination(&self) -> u16 {
        self.destination
    }

    pub fn source(&self) -> u16 {
        self.source
    }

    pub fn user_data(&self) -> &Bytes {
        &self.user_data
    }

    /// Whether the destination is one of the broadcast addresses
    pub fn is_broadcast(&self) -> bool {
        self.destination >= BROADCAST_MIN
    }

    fn control_byte(&self) -> u8 {
        let mut control = self.function.code();
        if self.from_master {
            control |= DIR;
        }
        if self.function.is_primary() {
            control |= PRM;
            if self.fcb {
                control |= FCB;
            }
            if self.fcv {
                control |= FCV;
            }
        }
        control
    }

    /// Encode the frame with all CRCs
    pub fn encode(&self) -> DnpResult<Bytes> {
        let n = self.user_data.len();
        if n > MAX_USER_DATA {
            return Err(DnpError::InvalidData(format!(
                "User data too long: {} bytes, max {}",
                n, MAX_USER_DATA
            )));
        }

        let mut out = Vec::with_capacity(frame_size(n));
        let dest = self.destination.to_le_bytes();
        let src = self.source.to_le_bytes();
        let header = [
            START[0],
            START[1],
            (5 + n) as u8,
            self.control_byte(),
            dest[0],
            dest[1],
            src[0],
            src[1],
        ];
        crc::append_crc(&header, &mut out);
        for block in self.user_data.chunks(BLOCK_SIZE) {
            crc::append_crc(block, &mut out);
        }
        Ok(Bytes::from(out))
    }

    /// Decode a complete frame, verifying every CRC
    pub fn decode(bytes: &[u8]) -> DnpResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DnpError::FrameInvalid(format!(
                "Frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..2] != START {
            return Err(DnpError::FrameInvalid(format!(
                "Bad start bytes: {:02X} {:02X}",
                bytes[0], bytes[1]
            )));
        }
        let length = bytes[2] as usize;
        if length < 5 {
            return Err(DnpError::FrameInvalid(format!("Bad length field: {}", length)));
        }
        let n = length - 5;
        let expected = frame_size(n);
        if bytes.len() != expected {
            return Err(DnpError::FrameInvalid(format!(
                "Frame size mismatch: got {}, length field implies {}",
                bytes.len(),
                expected
            )));
        }
        crc::validate(&bytes[..HEADER_SIZE])?;

        let control = bytes[3];
        let function = LinkFunction::from_control_byte(control).ok_or_else(|| {
            DnpError::FrameInvalid(format!("Unknown control byte: 0x{:02X}", control))
        })?;

        let mut user_data = Vec::with_capacity(n);
        for block in bytes[HEADER_SIZE..].chunks(BLOCK_SIZE + 2) {
            crc::validate(block)?;
            user_data.extend_from_slice(&block[..block.len() - 2]);
        }

        let primary = control & PRM != 0;
        Ok(Self {
            function,
            from_master: control & DIR != 0,
            fcb: primary && control & FCB != 0,
            fcv: primary && control & FCV != 0,
            destination: u16::from_le_bytes([bytes[4], bytes[5]]),
            source: u16::from_le_bytes([bytes[6], bytes[7]]),
            user_data: Bytes::from(user_data),
        })
    }
}

impl fmt::Display for LinkFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} -> {} ({} bytes)",
            self.function,
            self.source,
            self.destination,
            self.user_data.len()
        )
    }
}

/// Encoded size of a frame carrying `user_data_len` bytes
pub fn frame_size(user_data_len: usize) -> usize {
    HEADER_SIZE + user_data_len + 2 * user_data_len.div_ceil(BLOCK_SIZE)
}

/// Compute the header CRC for a header slice of eight bytes
pub(crate) fn header_crc_ok(header: &[u8]) -> bool {
    if header.len() < HEADER_SIZE {
        return false;
    }
    let mut calc = CrcCalc::new();
    calc.update_bytes(&header[..8]);
    calc.value_bytes() == [header[8], header[9]]
}
