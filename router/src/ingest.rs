//! Binlog ingest: classifies each streamed event, persists it to the
//! local binlog file, handles rotate events, and triggers fan-out.
//!
//! Grounded on `Segment::append`/`write_flush` (append-then-flush) and
//! `SegmentManager::create_next_segment` (close current, open next) in
//! the relay-log storage layer this crate's persistence replaces.

use tracing::{info, warn};

use crate::event_type::{FORMAT_DESCRIPTION_EVENT, HEARTBEAT_EVENT, ROTATE_EVENT};
use crate::header::parse_replication_header;
use crate::instance::RouterInstance;

/// Parse the rotate event payload (after the 19-byte event header):
/// an 8-byte little-endian position followed by the new file name.
fn parse_rotate_payload(event_body: &[u8]) -> Option<(u64, String)> {
    if event_body.len() < 8 {
        return None;
    }
    let mut pos_bytes = [0u8; 8];
    pos_bytes.copy_from_slice(&event_body[0..8]);
    let position = u64::from_le_bytes(pos_bytes);
    let name = String::from_utf8_lossy(&event_body[8..]).into_owned();
    Some((position, name))
}

pub fn ingest_one(instance: &RouterInstance, packet: &[u8]) {
    let hdr = match parse_replication_header(packet) {
        Ok(h) => h,
        Err(e) => {
            warn!(instance = %instance.name, "failed to parse event header: {e}");
            instance.with_core(|core| core.stats.n_errors += 1);
            return;
        }
    };

    if hdr.ok != 0 {
        instance.with_core(|core| core.stats.n_errors += 1);
        return;
    }

    let event_body_start = crate::header::ReplicationHeader::EVENT_BODY_OFFSET;
    let event_body: &[u8] = if packet.len() >= event_body_start + 19 {
        &packet[event_body_start + 19..]
    } else {
        &[]
    };

    instance.with_core(|core| {
        core.stats.n_binlogs += 1;
        core.stats.record_event_type(hdr.event_type);
    });

    // Fake FDE: synthesized, never written, never fanned out. Keep a fresh
    // copy (event_size bytes from the MySQL packet, past the OK byte) so
    // it can be replayed verbatim to a newly attaching slave.
    if hdr.event_type == FORMAT_DESCRIPTION_EVENT && hdr.next_pos == 0 {
        let body_end = (event_body_start + hdr.event_size as usize).min(packet.len());
        let fde_payload = packet.get(event_body_start..body_end).unwrap_or(&[]).to_vec();
        instance.with_core(|core| {
            core.stats.n_fakeevents += 1;
            core.saved_fde = Some(fde_payload);
        });
        info!(instance = %instance.name, "received fake FDE, not persisted");
        return;
    }

    if hdr.event_type == HEARTBEAT_EVENT {
        return;
    }

    let raw_event = &packet[event_body_start..];
    let artificial = hdr.is_artificial();

    if !artificial {
        instance.with_core(|core| {
            if let Err(e) = core.file.append(raw_event) {
                warn!(instance = %instance.name, "failed to append event: {e}");
            }
        });
    }

    if hdr.event_type == ROTATE_EVENT {
        if let Some((position, name)) = parse_rotate_payload(event_body) {
            handle_rotate(instance, &name, position);
        }
    }

    if !artificial {
        crate::fanout::distribute(instance, &hdr, raw_event);
    }

    instance.with_core(|core| {
        let _ = core.file.flush();
    });
}

fn handle_rotate(instance: &RouterInstance, new_name: &str, position: u64) {
    let changed = instance.with_core(|core| {
        if core.binlog_name == new_name {
            return false;
        }
        core.binlog_name = new_name.to_string();
        core.binlog_position = position;
        core.stats.n_rotates += 1;
        if let Err(e) = core.file.rotate(new_name, position) {
            warn!(instance = %instance.name, "failed to rotate local binlog file: {e}");
        }
        true
    });

    if changed {
        info!(instance = %instance.name, new_name, position, "rotated to new binlog file");
    }
}
