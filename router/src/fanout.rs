//! Slave fan-out: for each registered downstream replica whose replication
//! position exactly matches the just-ingested event, synthesize a MySQL
//! packet carrying the event and hand it to that slave's connection. A
//! matched slave that just received a rotate event also gets its
//! rotate hook fired, so its own file tracking moves in step.

use tracing::warn;

use crate::event_type::ROTATE_EVENT;
use crate::header::ReplicationHeader;
use crate::instance::RouterInstance;

/// Build the outbound packet a slave receives for one event: 3-byte
/// length, 1-byte per-slave sequence id, 1-byte OK marker, then the raw
/// event bytes.
fn build_slave_packet(seqno: u8, raw_event: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(raw_event.len() + 5);
    crate::codec::encode_uint(&mut packet, (raw_event.len() + 1) as u32, 24)
        .expect("24-bit width always fits a single event's length");
    packet.push(seqno);
    packet.push(0); // ok
    packet.extend_from_slice(raw_event);
    packet
}

pub fn distribute(instance: &RouterInstance, hdr: &ReplicationHeader, raw_event: &[u8]) {
    let expected_pos = (hdr.next_pos as u64).saturating_sub(hdr.event_size as u64);

    instance.with_core(|core| {
        for slave in core.slaves.iter_mut() {
            if slave.binlog_pos != expected_pos {
                continue;
            }

            let seqno = slave.next_seqno();
            let packet = build_slave_packet(seqno, raw_event);
            if let Err(e) = slave.write(&packet) {
                warn!(instance = %instance.name, "failed to write to slave: {e}");
                continue;
            }
            slave.binlog_pos = hdr.next_pos as u64;

            if hdr.event_type == ROTATE_EVENT {
                if let Err(e) = slave.rotate_hook(raw_event) {
                    warn!(instance = %instance.name, "failed to notify slave of rotate: {e}");
                }
            }
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::conn::{BinlogFile, MasterConn, SlaveConn};
    use crate::instance::{RouterInstance, SlaveEntry};
    use common::err::CResult;
    use std::sync::{Arc, Mutex};

    #[test]
    fn packet_framing_is_length_seqno_ok_then_event() {
        let packet = build_slave_packet(3, b"abc");
        assert_eq!(crate::codec::extract_uint(&packet[0..3], 24).unwrap(), 4);
        assert_eq!(packet[3], 3);
        assert_eq!(packet[4], 0);
        assert_eq!(&packet[5..], b"abc");
    }

    struct NullMaster;
    impl MasterConn for NullMaster {
        fn write(&mut self, _b: &[u8]) -> CResult<()> { Ok(()) }
        fn close(&mut self) {}
    }
    struct NullFile;
    impl BinlogFile for NullFile {
        fn append(&mut self, _b: &[u8]) -> CResult<()> { Ok(()) }
        fn rotate(&mut self, _n: &str, _p: u64) -> CResult<()> { Ok(()) }
        fn flush(&mut self) -> CResult<()> { Ok(()) }
    }

    #[derive(Default)]
    struct RecordingSlave {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        rotate_hooked: Arc<Mutex<bool>>,
    }
    impl SlaveConn for RecordingSlave {
        fn write(&mut self, buffer: &[u8]) -> CResult<()> {
            self.written.lock().unwrap().push(buffer.to_vec());
            Ok(())
        }
        fn rotate_hook(&mut self, _raw: &[u8]) -> CResult<()> {
            // A rotate hook fired before the packet is written would leave
            // `written` empty at this point; assert the ordering here.
            assert!(!self.written.lock().unwrap().is_empty());
            *self.rotate_hooked.lock().unwrap() = true;
            Ok(())
        }
    }

    fn make_instance() -> RouterInstance {
        RouterInstance::new(
            "svc", 7, 1, "uuid-1", "mysql-bin.000001", 4,
            Box::new(NullMaster), Box::new(NullFile),
        )
    }

    #[test]
    fn rotate_hook_fires_only_for_matched_slave_after_write() {
        let instance = make_instance();

        let matched_written = Arc::new(Mutex::new(Vec::new()));
        let matched_hooked = Arc::new(Mutex::new(false));
        let unmatched_written = Arc::new(Mutex::new(Vec::new()));
        let unmatched_hooked = Arc::new(Mutex::new(false));

        instance.add_slave(SlaveEntry::new(
            Box::new(RecordingSlave {
                written: Arc::clone(&matched_written),
                rotate_hooked: Arc::clone(&matched_hooked),
            }),
            1000,
        ));
        instance.add_slave(SlaveEntry::new(
            Box::new(RecordingSlave {
                written: Arc::clone(&unmatched_written),
                rotate_hooked: Arc::clone(&unmatched_hooked),
            }),
            999,
        ));

        let hdr = ReplicationHeader {
            payload_len: 0,
            seqno: 0,
            ok: 0,
            timestamp: 0,
            event_type: ROTATE_EVENT,
            server_id: 7,
            event_size: 50,
            next_pos: 1050,
            flags: 0,
        };
        distribute(&instance, &hdr, &[0u8; 50]);

        assert_eq!(matched_written.lock().unwrap().len(), 1);
        assert!(*matched_hooked.lock().unwrap());
        assert_eq!(unmatched_written.lock().unwrap().len(), 0);
        assert!(!*unmatched_hooked.lock().unwrap());
    }

    #[test]
    fn rotate_hook_is_not_fired_for_ordinary_events() {
        let instance = make_instance();

        let written = Arc::new(Mutex::new(Vec::new()));
        let hooked = Arc::new(Mutex::new(false));
        instance.add_slave(SlaveEntry::new(
            Box::new(RecordingSlave { written: Arc::clone(&written), rotate_hooked: Arc::clone(&hooked) }),
            1000,
        ));

        let hdr = ReplicationHeader {
            payload_len: 0,
            seqno: 0,
            ok: 0,
            timestamp: 0,
            event_type: crate::event_type::QUERY_EVENT,
            server_id: 7,
            event_size: 50,
            next_pos: 1050,
            flags: 0,
        };
        distribute(&instance, &hdr, &[0u8; 50]);

        assert_eq!(written.lock().unwrap().len(), 1);
        assert!(!*hooked.lock().unwrap());
    }
}
