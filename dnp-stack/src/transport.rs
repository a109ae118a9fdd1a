//! Transport function: segmentation and reassembly of application fragments

use bytes::Bytes;
use dnp_core::{DnpError, DnpResult, Logger};

/// Final segment of a fragment
pub const FIN: u8 = 0x80;
/// First segment of a fragment
pub const FIR: u8 = 0x40;
const SEQ_MASK: u8 = 0x3F;

/// Largest payload carried by one segment
pub const MAX_SEGMENT_PAYLOAD: usize = 249;

#[derive(Debug)]
struct Reassembly {
    buffer: Vec<u8>,
    next_seq: u8,
}

/// Segments outbound fragments and reassembles inbound ones
#[derive(Debug)]
pub struct TransportLayer {
    max_fragment_size: usize,
    tx_seq: u8,
    rx: Option<Reassembly>,
    logger: Logger,
}

impl TransportLayer {
    pub fn new(max_fragment_size: usize, logger: Logger) -> Self {
        Self {
            max_fragment_size,
            tx_seq: 0,
            rx: None,
            logger,
        }
    }

    /// Drop any partially received fragment
    pub fn reset(&mut self) {
        self.rx = None;
    }

    /// Split `apdu` into segments ready for the link layer
    pub fn segment(&mut self, apdu: &[u8]) -> DnpResult<Vec<Bytes>> {
        if apdu.is_empty() {
            return Err(DnpError::InvalidData("Empty fragment".to_string()));
        }
        if apdu.len() > self.max_fragment_size {
            return Err(DnpError::InvalidData(format!(
                "Fragment too large: {} bytes, max {}",
                apdu.len(),
                self.max_fragment_size
            )));
        }

        let count = apdu.len().div_ceil(MAX_SEGMENT_PAYLOAD);
        let mut segments = Vec::with_capacity(count);
        for (i, chunk) in apdu.chunks(MAX_SEGMENT_PAYLOAD).enumerate() {
            let mut header = self.tx_seq & SEQ_MASK;
            if i == 0 {
                header |= FIR;
            }
            if i + 1 == count {
                header |= FIN;
            }
            self.tx_seq = (self.tx_seq + 1) & SEQ_MASK;

            let mut segment = Vec::with_capacity(chunk.len() + 1);
            segment.push(header);
            segment.extend_from_slice(chunk);
            segments.push(Bytes::from(segment));
        }
        Ok(segments)
    }

    /// Feed one received segment, returning a fragment once complete
    pub fn on_segment(&mut self, tpdu: &[u8]) -> Option<Bytes> {
        let Some((&header, payload)) = tpdu.split_first() else {
            self.logger.warn(format_args!("empty segment discarded"));
            return None;
        };
        let seq = header & SEQ_MASK;

        if header & FIR != 0 {
            if self.rx.is_some() {
                self.logger
                    .warn(format_args!("incomplete fragment discarded by new FIR"));
            }
            self.rx = Some(Reassembly {
                buffer: Vec::new(),
                next_seq: seq,
            });
        }

        let Some(rx) = self.rx.as_mut() else {
            self.logger
                .debug(format_args!("segment {} without FIR discarded", seq));
            return None;
        };
        if rx.next_seq != seq {
            self.logger.warn(format_args!(
                "bad segment sequence: got {}, expected {}",
                seq, rx.next_seq
            ));
            self.rx = None;
            return None;
        }
        if rx.buffer.len() + payload.len() > self.max_fragment_size {
            self.logger
                .warn(format_args!("reassembled fragment too large, discarded"));
            self.rx = None;
            return None;
        }

        rx.buffer.extend_from_slice(payload);
        rx.next_seq = (seq + 1) & SEQ_MASK;

        if header & FIN != 0 {
            self.rx.take().map(|rx| Bytes::from(rx.buffer))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> TransportLayer {
        TransportLayer::new(2048, Logger::default())
    }

    #[test]
    fn test_single_segment() {
        let mut tx = layer();
        let segments = tx.segment(&[0xC0, 0x01, 0x3C]).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0][0], FIR | FIN);

        let mut rx = layer();
        assert_eq!(
            rx.on_segment(&segments[0]).unwrap().as_ref(),
            &[0xC0, 0x01, 0x3C]
        );
    }

    #[test]
    fn test_multi_segment_reassembly() {
        let apdu: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut tx = layer();
        let segments = tx.segment(&apdu).unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0][0], FIR);
        assert_eq!(segments[1][0], 1);
        assert_eq!(segments[2][0], FIN | 2);
        assert_eq!(segments[0].len(), MAX_SEGMENT_PAYLOAD + 1);

        let mut rx = layer();
        assert!(rx.on_segment(&segments[0]).is_none());
        assert!(rx.on_segment(&segments[1]).is_none());
        assert_eq!(rx.on_segment(&segments[2]).unwrap().as_ref(), apdu.as_slice());
    }

    #[test]
    fn test_sequence_wraps() {
        let mut tx = layer();
        for _ in 0..63 {
            tx.segment(&[1]).unwrap();
        }
        assert_eq!(tx.segment(&[1]).unwrap()[0][0], FIR | FIN | 63);
        assert_eq!(tx.segment(&[1]).unwrap()[0][0], FIR | FIN);
    }

    #[test]
    fn test_out_of_sequence_is_discarded() {
        let apdu = vec![0u8; 300];
        let segments = layer().segment(&apdu).unwrap();
        let mut rx = layer();
        assert!(rx.on_segment(&segments[0]).is_none());
        // Duplicate of the first segment's sequence without FIR
        let mut bad = segments[1].to_vec();
        bad[0] = FIN;
        assert!(rx.on_segment(&bad).is_none());
        assert!(rx.on_segment(&segments[1]).is_none());
    }

    #[test]
    fn test_missing_fir_is_discarded() {
        let mut rx = layer();
        assert!(rx.on_segment(&[FIN | 5, 0xAA]).is_none());
        assert!(rx.on_segment(&[]).is_none());
    }

    #[test]
    fn test_size_limits() {
        let mut small = TransportLayer::new(10, Logger::default());
        assert!(small.segment(&[0u8; 11]).is_err());
        assert!(small.segment(&[]).is_err());

        let mut rx = TransportLayer::new(10, Logger::default());
        let mut big = vec![FIR | FIN];
        big.extend_from_slice(&[0u8; 11]);
        assert!(rx.on_segment(&big).is_none());
    }
}
