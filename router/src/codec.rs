//! Little-endian integer codec and outbound MySQL command packet builders.
//!
//! A MySQL client packet is a 3-byte little-endian payload length, a 1-byte
//! sequence id, then the payload. This module builds the three outbound
//! commands the master state machine (`state`) needs: `COM_QUERY`,
//! `COM_REGISTER_SLAVE` and `COM_BINLOG_DUMP`.

use std::io::Cursor;

use byteorder::{LittleEndian, WriteBytesExt};

use common::err::CResult;

pub const COM_QUERY: u8 = 0x03;
pub const COM_REGISTER_SLAVE: u8 = 0x15;
pub const COM_BINLOG_DUMP: u8 = 0x12;

/// Fixed width of the binlog filename field carried in a `COM_BINLOG_DUMP`
/// payload, null-padded.
pub const BINLOG_FNAMELEN: usize = 40;

/// Write `value`'s low `bits` bits to `dst`, least-significant byte first.
/// `bits` must be one of 8, 16, 24, 32.
pub fn encode_uint(dst: &mut Vec<u8>, value: u32, bits: u8) -> CResult<()> {
    let mut cursor = Cursor::new(Vec::with_capacity(4));
    match bits {
        8 => cursor.write_u8(value as u8)?,
        16 => cursor.write_u16::<LittleEndian>(value as u16)?,
        24 => cursor.write_u24::<LittleEndian>(value)?,
        32 => cursor.write_u32::<LittleEndian>(value)?,
        _ => return Err(common::err::ReError::BUG(format!("unsupported width: {bits}"))),
    }
    dst.extend_from_slice(cursor.get_ref());
    Ok(())
}

/// Inverse of `encode_uint`: read `bits` bits (LE) from the front of `src`.
pub fn extract_uint(src: &[u8], bits: u8) -> CResult<u32> {
    let need = (bits as usize) / 8;
    if src.len() < need {
        return Err(common::err::ReError::Incomplete(
            common::err::decode_error::Needed::NoEnoughData,
        ));
    }
    let mut value: u32 = 0;
    for i in 0..need {
        value |= (src[i] as u32) << (8 * i);
    }
    Ok(value)
}

fn with_framing(seqno: u8, payload: Vec<u8>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(payload.len() + 4);
    encode_uint(&mut packet, payload.len() as u32, 24).expect("24-bit width is valid");
    packet.push(seqno);
    packet.extend_from_slice(&payload);
    packet
}

/// Build a `COM_QUERY` packet. Sequence id is always 0: it is the first
/// packet of a new command phase.
pub fn build_query(sql: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(sql.len() + 1);
    payload.push(COM_QUERY);
    payload.extend_from_slice(sql.as_bytes());
    with_framing(0, payload)
}

/// Build a `COM_REGISTER_SLAVE` packet.
pub fn build_register_slave(server_id: u32, master_id: u32, port: u16) -> CResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(18);
    payload.push(COM_REGISTER_SLAVE);
    encode_uint(&mut payload, server_id, 32)?;
    payload.push(0); // hostname_len
    payload.push(0); // user_len
    payload.push(0); // pass_len
    encode_uint(&mut payload, port as u32, 16)?;
    encode_uint(&mut payload, 0, 32)?; // rank, unused
    encode_uint(&mut payload, master_id, 32)?;
    Ok(with_framing(0, payload))
}

/// Build a `COM_BINLOG_DUMP` packet requesting the stream start at
/// `binlog_name`/`position`. The filename is null-padded to
/// `BINLOG_FNAMELEN` bytes per the protocol.
pub fn build_binlog_dump(server_id: u32, binlog_name: &str, position: u32) -> CResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(1 + 4 + 2 + 4 + BINLOG_FNAMELEN);
    payload.push(COM_BINLOG_DUMP);
    encode_uint(&mut payload, position, 32)?;
    encode_uint(&mut payload, 0, 16)?; // flags
    encode_uint(&mut payload, server_id, 32)?;

    let name_bytes = binlog_name.as_bytes();
    if name_bytes.len() >= BINLOG_FNAMELEN {
        return Err(common::err::ReError::Error(format!(
            "binlog name too long: {binlog_name}"
        )));
    }
    payload.extend_from_slice(name_bytes);
    payload.resize(payload.len() + (BINLOG_FNAMELEN - name_bytes.len()), 0);

    Ok(with_framing(0, payload))
}
