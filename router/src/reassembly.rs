//! Reassembles whole MySQL packets out of an arbitrarily-chunked byte
//! stream, carrying any leftover prefix across calls in `residual`.
//!
//! Mirrors the framing read by `PacketChannel::read_packet` in the
//! connection layer this crate replaces, generalized to work over
//! pre-buffered chains instead of a live socket.

use std::collections::VecDeque;

use crate::codec::extract_uint;

/// Header size of a MySQL client packet: 3-byte length + 1-byte sequence id.
const PACKET_HEADER_LEN: usize = 4;

#[derive(Debug, Default)]
pub struct Reassembler {
    /// Bytes carried over from the previous delivery that form a strict
    /// prefix of the next, not-yet-complete packet.
    residual: Vec<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self { residual: Vec::new() }
    }

    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    /// Feed a chain of buffer segments (as delivered by the connection
    /// layer) and extract every whole packet that can be formed. Any
    /// trailing bytes that do not yet amount to a full packet are saved
    /// into `residual` for the next call.
    pub fn feed(&mut self, chain: &[Vec<u8>]) -> Vec<Vec<u8>> {
        let mut joined = std::mem::take(&mut self.residual);
        for seg in chain {
            joined.extend_from_slice(seg);
        }

        let mut packets = Vec::new();
        let mut cursor = 0usize;

        loop {
            let remaining = joined.len() - cursor;
            if remaining < PACKET_HEADER_LEN {
                break;
            }

            let payload_len =
                extract_uint(&joined[cursor..cursor + 3], 24).expect("3 bytes available") as usize;
            let target_len = payload_len + PACKET_HEADER_LEN;

            if remaining < target_len {
                // Reassembly stall: not enough bytes yet, not an error.
                break;
            }

            packets.push(joined[cursor..cursor + target_len].to_vec());
            cursor += target_len;
        }

        self.residual = joined[cursor..].to_vec();
        packets
    }
}

/// Turn a byte slice into a `VecDeque`-backed chain of segments of the
/// given sizes, for tests that need to exercise arbitrary fragmentation.
#[cfg(test)]
pub(crate) fn chunk(bytes: &[u8], sizes: &[usize]) -> VecDeque<Vec<u8>> {
    let mut out = VecDeque::new();
    let mut offset = 0;
    for &size in sizes {
        out.push_back(bytes[offset..offset + size].to_vec());
        offset += size;
    }
    assert_eq!(offset, bytes.len(), "chunk sizes must cover the whole input");
    out
}
