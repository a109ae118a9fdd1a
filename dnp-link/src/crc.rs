//! CRC-16/DNP calculation for link frames

use crate::error::{DnpError, DnpResult};

/// Bit-reversed 0x3D65
const KEY: u16 = 0xA6BC;

/// Precomputed CRC table
static CRC_TABLE: once_cell::sync::Lazy<[u16; 256]> = once_cell::sync::Lazy::new(|| {
    let mut table = [0u16; 256];
    for b in 0..=0xFF {
        let mut v = b as u16;
        for _ in 0..8 {
            if (v & 1) == 1 {
                v = (v >> 1) ^ KEY;
            } else {
                v >>= 1;
            }
        }
        table[b as usize] = v;
    }
    table
});

/// CRC-16/DNP calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct CrcCalc {
    crc: u16,
}

impl CrcCalc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the CRC with a single byte
    pub fn update(&mut self, data: u8) {
        self.crc = (self.crc >> 8) ^ CRC_TABLE[((self.crc ^ data as u16) & 0xFF) as usize];
    }

    /// Update the CRC with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Final CRC value
    pub fn value(&self) -> u16 {
        !self.crc
    }

    /// CRC as transmitted (little-endian)
    pub fn value_bytes(&self) -> [u8; 2] {
        self.value().to_le_bytes()
    }
}

/// Compute the CRC of a block
pub fn crc(data: &[u8]) -> u16 {
    let mut calc = CrcCalc::new();
    calc.update_bytes(data);
    calc.value()
}

/// Append the CRC of `data` to `out`
pub fn append_crc(data: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(data);
    out.extend_from_slice(&crc(data).to_le_bytes());
}

/// Validate a block followed by its two CRC bytes
pub fn validate(block_with_crc: &[u8]) -> DnpResult<()> {
    if block_with_crc.len() < 2 {
        return Err(DnpError::FrameInvalid("Block too short for CRC".to_string()));
    }
    let (data, tail) = block_with_crc.split_at(block_with_crc.len() - 2);
    let expected = crc(data);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    if expected != received {
        Err(DnpError::FrameInvalid(format!(
            "CRC has wrong value: 0x{:04X}, expected 0x{:04X}",
            received, expected
        )))
    } else {
        Ok(())
    }
}
