//! Streaming link frame decoder
//!
//! Bytes arrive from the physical layer in arbitrary chunks. The decoder
//! buffers them, hunts for the start bytes and hands out complete frames.
//! After a header or block CRC failure it skips one byte and resynchronizes
//! on the next start sequence.

use crate::error::{DnpError, DnpResult};
use crate::frame::{self, LinkFrame, HEADER_SIZE, START};
use bytes::{Buf, BytesMut};

/// Streaming frame decoder
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    discarded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of bytes skipped while hunting for frames
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Drop all buffered bytes, e.g. after the line was closed
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Take the next frame out of the buffer
    ///
    /// Returns `None` when more bytes are needed. A returned error means
    /// a malformed frame was skipped; call again to continue.
    pub fn poll(&mut self) -> Option<DnpResult<LinkFrame>> {
        if !self.sync() || self.buffer.len() < HEADER_SIZE {
            return None;
        }

        if !frame::header_crc_ok(&self.buffer[..HEADER_SIZE]) {
            self.skip(1);
            return Some(Err(DnpError::FrameInvalid(
                "Header CRC has wrong value".to_string(),
            )));
        }

        let length = self.buffer[2] as usize;
        if length < 5 {
            self.skip(1);
            return Some(Err(DnpError::FrameInvalid(format!(
                "Bad length field: {}",
                length
            ))));
        }

        let size = frame::frame_size(length - 5);
        if self.buffer.len() < size {
            return None;
        }

        let result = LinkFrame::decode(&self.buffer[..size]);
        match &result {
            Ok(_) => self.buffer.advance(size),
            Err(_) => self.skip(1),
        }
        Some(result)
    }

    /// Discard bytes up to the next start sequence
    ///
    /// Returns `false` when no complete start sequence is buffered.
    fn sync(&mut self) -> bool {
        match self.buffer.windows(2).position(|w| w == START) {
            Some(pos) => {
                self.skip(pos);
                true
            }
            None => {
                // Keep a trailing first start byte, its partner may follow.
                let keep = usize::from(self.buffer.last() == Some(&START[0]));
                let drop = self.buffer.len() - keep;
                self.skip(drop);
                false
            }
        }
    }

    fn skip(&mut self, n: usize) {
        self.buffer.advance(n);
        self.discarded += n as u64;
    }
}
