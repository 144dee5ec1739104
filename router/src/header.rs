//! Parses the framing of a single master response: the 4-byte MySQL
//! packet header plus, when the response carries a binlog event, the
//! 19-byte replication event header that follows it.
//!
//! Grounded on the `nom`-combinator style of `Header::parse_v4_header` in
//! the binlog event layer this crate replaces.

use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::IResult;

use common::err::decode_error::Needed;
use common::err::{CResult, ReError};

use crate::event_type::LOG_EVENT_ARTIFICIAL_F;

/// The framing of one inbound packet plus, for data packets, the binlog
/// event header it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationHeader {
    pub payload_len: u32,
    pub seqno: u8,
    /// 0 for an ordinary data packet, non-zero for a MySQL error packet.
    pub ok: u8,
    pub timestamp: u32,
    pub event_type: u8,
    pub server_id: u32,
    pub event_size: u32,
    pub next_pos: u32,
    pub flags: u16,
}

impl ReplicationHeader {
    pub fn is_artificial(&self) -> bool {
        self.flags & LOG_EVENT_ARTIFICIAL_F != 0
    }

    /// Offset, from the start of this packet, to the raw event bytes
    /// (skipping the 4-byte packet framing and the 1-byte OK marker).
    pub const EVENT_BODY_OFFSET: usize = 5;
}

fn parse_framing(input: &[u8]) -> IResult<&[u8], (u32, u8)> {
    let (input, len_lo) = le_u16(input)?;
    let (input, len_hi) = le_u8(input)?;
    let payload_len = (len_lo as u32) | ((len_hi as u32) << 16);
    let (input, seqno) = le_u8(input)?;
    Ok((input, (payload_len, seqno)))
}

fn parse_event_header(input: &[u8]) -> IResult<&[u8], (u32, u8, u32, u32, u32, u16)> {
    let (input, timestamp) = le_u32(input)?;
    let (input, event_type) = le_u8(input)?;
    let (input, server_id) = le_u32(input)?;
    let (input, event_size) = le_u32(input)?;
    let (input, next_pos) = le_u32(input)?;
    let (input, flags) = le_u16(input)?;
    Ok((input, (timestamp, event_type, server_id, event_size, next_pos, flags)))
}

/// Parse a full MySQL packet known to carry a binlog event (i.e. the
/// router is in `BINLOGDUMP` state). `packet` must be at least 4 + 1 + 19
/// bytes long for a data packet; a non-zero OK byte (error packet) is
/// reported with the timestamp/event fields zeroed.
pub fn parse_replication_header(packet: &[u8]) -> CResult<ReplicationHeader> {
    let (rest, (payload_len, seqno)) = parse_framing(packet)
        .map_err(|_| ReError::Incomplete(Needed::NoEnoughData))?;

    let (rest, ok) = nom::number::complete::le_u8::<_, nom::error::Error<&[u8]>>(rest)
        .map_err(|_| ReError::Incomplete(Needed::NoEnoughData))?;

    if ok != 0 {
        return Ok(ReplicationHeader {
            payload_len,
            seqno,
            ok,
            timestamp: 0,
            event_type: 0,
            server_id: 0,
            event_size: 0,
            next_pos: 0,
            flags: 0,
        });
    }

    let (_, (timestamp, event_type, server_id, event_size, next_pos, flags)) =
        parse_event_header(rest).map_err(|_| ReError::Incomplete(Needed::NoEnoughData))?;

    Ok(ReplicationHeader {
        payload_len,
        seqno,
        ok,
        timestamp,
        event_type,
        server_id,
        event_size,
        next_pos,
        flags,
    })
}

/// The human-readable error message of an error packet begins at offset
/// +6 from the start of the MySQL packet (4-byte framing + 2-byte error
/// code), per the MySQL error packet layout.
pub fn error_message(packet: &[u8]) -> String {
    if packet.len() <= 7 {
        return String::new();
    }
    String::from_utf8_lossy(&packet[7..]).into_owned()
}

/// The 2-byte error code of an error packet, immediately after the OK
/// marker byte.
pub fn error_code(packet: &[u8]) -> CResult<u16> {
    if packet.len() < 7 {
        return Err(ReError::Incomplete(Needed::NoEnoughData));
    }
    crate::codec::extract_uint(&packet[5..7], 16).map(|v| v as u16)
}

#[cfg(test)]
mod test {
    use super::*;

    fn data_packet(event_type: u8, event_size: u32, next_pos: u32, flags: u16) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.push(0u8); // ok
        payload.extend_from_slice(&0u32.to_le_bytes()); // timestamp
        payload.push(event_type);
        payload.extend_from_slice(&7u32.to_le_bytes()); // server_id
        payload.extend_from_slice(&event_size.to_le_bytes());
        payload.extend_from_slice(&next_pos.to_le_bytes());
        payload.extend_from_slice(&flags.to_le_bytes());

        let mut packet = Vec::new();
        crate::codec::encode_uint(&mut packet, payload.len() as u32, 24).unwrap();
        packet.push(0); // seqno
        packet.extend_from_slice(&payload);
        packet
    }

    #[test]
    fn parses_ordinary_event_header() {
        let packet = data_packet(crate::event_type::ROTATE_EVENT, 50, 1050, 0);
        let hdr = parse_replication_header(&packet).unwrap();
        assert_eq!(hdr.ok, 0);
        assert_eq!(hdr.event_type, crate::event_type::ROTATE_EVENT);
        assert_eq!(hdr.event_size, 50);
        assert_eq!(hdr.next_pos, 1050);
        assert!(!hdr.is_artificial());
    }

    #[test]
    fn detects_artificial_flag() {
        let packet = data_packet(crate::event_type::FORMAT_DESCRIPTION_EVENT, 10, 0, 0x20);
        let hdr = parse_replication_header(&packet).unwrap();
        assert!(hdr.is_artificial());
    }

    #[test]
    fn error_packet_exposes_code_and_message() {
        let mut payload = vec![0xffu8];
        payload.extend_from_slice(&1193u16.to_le_bytes());
        payload.extend_from_slice(b"Unknown system variable");
        let mut packet = Vec::new();
        crate::codec::encode_uint(&mut packet, payload.len() as u32, 24).unwrap();
        packet.push(0);
        packet.extend_from_slice(&payload);

        let hdr = parse_replication_header(&packet).unwrap();
        assert_eq!(hdr.ok, 0xff);
        assert_eq!(error_code(&packet).unwrap(), 1193);
        assert_eq!(error_message(&packet), "Unknown system variable");
    }
}
