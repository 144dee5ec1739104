//! `RouterInstance`: the data model for one configured replication
//! service, one router maintaining one master connection and fanning
//! out to many registered slaves.
//!
//! Grounded on `BinlogOptions` (replication position fields) and
//! `RelayLogServerMachine`'s lock-protected-collection style.

use std::sync::Mutex;

use tracing::{debug, info};

use common::err::CResult;

use crate::conn::{BinlogFile, CredentialsProducer, MasterConn, SlaveConn};
use crate::gate::Gate;
use crate::reassembly::Reassembler;
use crate::state::MasterStateMachine;
use crate::stats::Stats;

/// One downstream replica currently being served.
pub struct SlaveEntry {
    pub binlog_pos: u64,
    pub seqno: u8,
    conn: Box<dyn SlaveConn>,
}

impl SlaveEntry {
    pub fn new(conn: Box<dyn SlaveConn>, starting_pos: u64) -> Self {
        SlaveEntry { binlog_pos: starting_pos, seqno: 0, conn }
    }

    pub fn write(&mut self, buffer: &[u8]) -> CResult<()> {
        self.conn.write(buffer)
    }

    pub fn rotate_hook(&mut self, raw_rotate_payload: &[u8]) -> CResult<()> {
        self.conn.rotate_hook(raw_rotate_payload)
    }

    /// Next sequence id to stamp on an outbound packet, wrapping modulo 256.
    pub fn next_seqno(&mut self) -> u8 {
        let s = self.seqno;
        self.seqno = self.seqno.wrapping_add(1);
        s
    }
}

/// Everything the single-threaded pipeline touches: only ever accessed
/// from inside the gate's critical section, so a plain `Mutex` (no
/// contention in practice) is enough.
pub struct RouterCore {
    pub state_machine: MasterStateMachine,
    pub reassembler: Reassembler,
    pub binlog_name: String,
    pub binlog_position: u64,
    pub master: Box<dyn MasterConn>,
    pub file: Box<dyn BinlogFile>,
    pub stats: Stats,
    pub slaves: Vec<SlaveEntry>,
    /// Session authentication blob from `CredentialsProducer`, carried
    /// opaquely: never inspected here, only held for reuse by the
    /// surrounding service/session plumbing.
    pub credentials: Option<Vec<u8>>,
    /// Most recent fake (synthetic) Format Description Event payload, kept
    /// so it can be replayed to a newly attaching slave. Overwritten, never
    /// appended to, each time a fresh fake FDE arrives.
    pub saved_fde: Option<Vec<u8>>,
}

pub struct RouterInstance {
    pub server_id: u32,
    pub uuid: String,
    pub name: String,
    gate: Gate,
    core: Mutex<RouterCore>,
}

impl RouterInstance {
    pub fn new(
        name: impl Into<String>,
        server_id: u32,
        master_id: u32,
        uuid: impl Into<String>,
        binlog_name: impl Into<String>,
        binlog_position: u64,
        master: Box<dyn MasterConn>,
        file: Box<dyn BinlogFile>,
    ) -> Self {
        let uuid = uuid.into();
        let core = RouterCore {
            state_machine: MasterStateMachine::new(server_id, master_id, uuid.clone()),
            reassembler: Reassembler::new(),
            binlog_name: binlog_name.into(),
            binlog_position,
            master,
            file,
            stats: Stats::default(),
            slaves: Vec::new(),
            credentials: None,
            saved_fde: None,
        };

        RouterInstance {
            server_id,
            uuid,
            name: name.into(),
            gate: Gate::new(),
            core: Mutex::new(core),
        }
    }

    /// Kick off the handshake by sending the first probe.
    pub fn start(&self) -> CResult<()> {
        let mut core = self.core.lock().unwrap();
        let packet = core.state_machine.start();
        info!(instance = %self.name, "sending initial probe");
        core.master.write(&packet)
    }

    /// Register that a buffer chain arrived from the master's connection.
    /// Serializes processing through the gate: if another caller is
    /// already inside the pipeline, this queues and returns immediately.
    pub fn on_master_data(&self, chain: Vec<Vec<u8>>) {
        // Only the thread that wins the gate actually reassembles; the
        // raw chain is carried opaquely through the queue and flattened
        // once it's this caller's turn, matching the arrival order.
        let mut joined = Vec::new();
        for seg in chain {
            joined.extend_from_slice(&seg);
        }

        self.gate.on_arrival(joined, |buffer| {
            self.process_one(buffer);
        });
    }

    fn process_one(&self, buffer: Vec<u8>) {
        let packets = {
            let mut core = self.core.lock().unwrap();
            core.reassembler.feed(&[buffer])
        };

        for packet in packets {
            let is_streaming = {
                let core = self.core.lock().unwrap();
                core.state_machine.state().is_streaming()
            };

            if is_streaming {
                crate::ingest::ingest_one(self, &packet);
            } else {
                self.drive_handshake(&packet);
            }
        }
    }

    fn drive_handshake(&self, packet: &[u8]) {
        use crate::state::StepOutcome;

        let mut core = self.core.lock().unwrap();
        let binlog_name = core.binlog_name.clone();
        let binlog_position = core.binlog_position as u32;
        let outcome = core.state_machine.on_response(&binlog_name, binlog_position, packet);
        match outcome {
            StepOutcome::Send(next) => {
                debug!(instance = %self.name, state = core.state_machine.state().name(), "advancing handshake");
                let _ = core.master.write(&next);
            }
            StepOutcome::EnteredStreaming => {
                info!(instance = %self.name, "entered streaming state");
            }
            StepOutcome::Dropped => {
                core.stats.n_errors += 1;
            }
        }
    }

    pub fn with_core<R>(&self, f: impl FnOnce(&mut RouterCore) -> R) -> R {
        let mut core = self.core.lock().unwrap();
        f(&mut core)
    }

    pub fn add_slave(&self, slave: SlaveEntry) {
        let mut core = self.core.lock().unwrap();
        core.slaves.push(slave);
    }

    /// Produce and store the session authentication blob this instance
    /// carries opaquely for the surrounding plumbing's reuse.
    pub fn adopt_credentials(&self, producer: &dyn CredentialsProducer) -> CResult<()> {
        let blob = producer.produce()?;
        let mut core = self.core.lock().unwrap();
        core.credentials = Some(blob);
        Ok(())
    }

    pub fn credentials(&self) -> Option<Vec<u8>> {
        self.core.lock().unwrap().credentials.clone()
    }

    /// Fetch a previously-saved handshake response buffer (e.g.
    /// `"server_id"`, `"set_names_ack"`) so a newly attaching slave can be
    /// replayed the same server fingerprint this router observed.
    pub fn saved_handshake(&self, key: &str) -> Option<Vec<u8>> {
        self.core.lock().unwrap().state_machine.saved(key).map(|v| v.to_vec())
    }

    /// The most recently observed fake FDE payload, if any, for replay to
    /// a newly attaching slave.
    pub fn saved_fde(&self) -> Option<Vec<u8>> {
        self.core.lock().unwrap().saved_fde.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::err::CResult;

    struct NullMaster;
    impl MasterConn for NullMaster {
        fn write(&mut self, _buffer: &[u8]) -> CResult<()> { Ok(()) }
        fn close(&mut self) {}
    }
    struct NullFile;
    impl BinlogFile for NullFile {
        fn append(&mut self, _b: &[u8]) -> CResult<()> { Ok(()) }
        fn rotate(&mut self, _n: &str, _p: u64) -> CResult<()> { Ok(()) }
        fn flush(&mut self) -> CResult<()> { Ok(()) }
    }
    struct FakeCredentials;
    impl CredentialsProducer for FakeCredentials {
        fn produce(&self) -> CResult<Vec<u8>> {
            Ok(b"user\0db\0sha1pass".to_vec())
        }
    }

    fn make_instance() -> RouterInstance {
        RouterInstance::new(
            "svc", 7, 1, "uuid-1", "mysql-bin.000001", 4,
            Box::new(NullMaster), Box::new(NullFile),
        )
    }

    #[test]
    fn credentials_are_carried_opaquely_once_adopted() {
        let instance = make_instance();
        assert!(instance.credentials().is_none());
        instance.adopt_credentials(&FakeCredentials).unwrap();
        assert_eq!(instance.credentials(), Some(b"user\0db\0sha1pass".to_vec()));
    }

    #[test]
    fn saved_handshake_responses_are_retrievable_by_key() {
        let instance = make_instance();
        // Before any handshake step, nothing is saved under an arbitrary key.
        assert!(instance.saved_handshake("server_id").is_none());

        instance.start().unwrap();
        let mut response = Vec::new();
        crate::codec::encode_uint(&mut response, 4, 24).unwrap();
        response.push(0);
        response.extend_from_slice(&[0u8, 1, 2, 3]);
        // First response (to the TIMESTAMP probe) is discarded and moves to
        // SERVERID; the second (to the SERVER_ID probe) is what gets saved.
        instance.on_master_data(vec![response.clone()]);
        instance.on_master_data(vec![response]);

        assert!(instance.saved_handshake("server_id").is_some());
    }
}
