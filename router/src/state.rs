//! The master-side client state machine: drives the handshake,
//! session-variable negotiation and slave registration that precede a
//! streaming binlog dump.
//!
//! Grounded on the negotiation sequence in `IBinlogConnection::binlog()`
//! (adjust_starting_position / set_master_heartbeat / set_master_binlog_checksum),
//! generalized to the full probe sequence this crate's protocol contract
//! requires, and on `Connection::do_handshake`'s state-by-state style.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use crate::codec::{build_binlog_dump, build_query, build_register_slave};
use crate::header::{error_code, error_message, parse_replication_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Authenticated,
    Timestamp,
    ServerId,
    HbPeriod,
    Chksum1,
    Chksum2,
    GtidMode,
    MUuid,
    SUuid,
    Latin1,
    Register,
    BinlogDump,
}

impl MasterState {
    pub fn name(&self) -> &'static str {
        match self {
            MasterState::Authenticated => "AUTHENTICATED",
            MasterState::Timestamp => "TIMESTAMP",
            MasterState::ServerId => "SERVERID",
            MasterState::HbPeriod => "HBPERIOD",
            MasterState::Chksum1 => "CHKSUM1",
            MasterState::Chksum2 => "CHKSUM2",
            MasterState::GtidMode => "GTIDMODE",
            MasterState::MUuid => "MUUID",
            MasterState::SUuid => "SUUID",
            MasterState::Latin1 => "LATIN1",
            MasterState::Register => "REGISTER",
            MasterState::BinlogDump => "BINLOGDUMP",
        }
    }

    /// True once the state machine has transitioned into the terminal,
    /// streaming state; from here on responses are routed to ingest.
    pub fn is_streaming(&self) -> bool {
        matches!(self, MasterState::BinlogDump)
    }
}

/// What the caller must do after feeding a response into the state
/// machine.
pub enum StepOutcome {
    /// Write this outbound packet to the master and await its response.
    Send(Vec<u8>),
    /// The state machine has reached `BINLOGDUMP`; no further probes are
    /// sent. Subsequent responses should go to `ingest`.
    EnteredStreaming,
    /// The master returned an error packet, or the state was otherwise
    /// unusable; already logged. The caller should drop the buffer and
    /// release the gate. No reconnection is attempted here.
    Dropped,
}

pub struct MasterStateMachine {
    state: MasterState,
    saved: HashMap<&'static str, Vec<u8>>,
    server_id: u32,
    master_id: u32,
    uuid: String,
}

impl MasterStateMachine {
    pub fn new(server_id: u32, master_id: u32, uuid: String) -> Self {
        MasterStateMachine {
            state: MasterState::Authenticated,
            saved: HashMap::new(),
            server_id,
            master_id,
            uuid,
        }
    }

    pub fn state(&self) -> MasterState {
        self.state
    }

    pub fn saved(&self, key: &str) -> Option<&[u8]> {
        self.saved.get(key).map(|v| v.as_slice())
    }

    /// Kick off the sequence: send the first probe from `AUTHENTICATED` and
    /// advance to `TIMESTAMP` so the probe's response is routed correctly.
    pub fn start(&mut self) -> Vec<u8> {
        debug!("master state machine starting from {}", self.state.name());
        self.state = MasterState::Timestamp;
        build_query("SELECT UNIX_TIMESTAMP()")
    }

    #[cfg(test)]
    pub fn force_streaming(&mut self) {
        self.state = MasterState::BinlogDump;
    }

    /// Feed the master's response to the most recently sent probe and
    /// produce the next step.
    pub fn on_response(&mut self, binlog_name: &str, binlog_position: u32, response: &[u8]) -> StepOutcome {
        match parse_replication_header(response) {
            Ok(hdr) if hdr.ok != 0 => {
                error!(
                    state = self.state.name(),
                    code = error_code(response).unwrap_or(0),
                    message = %error_message(response),
                    "master returned an error packet"
                );
                StepOutcome::Dropped
            }
            _ => self.advance(binlog_name, binlog_position, response),
        }
    }

    fn advance(&mut self, binlog_name: &str, binlog_position: u32, response: &[u8]) -> StepOutcome {
        match self.state {
            MasterState::Authenticated => {
                warn!("response received while not yet past AUTHENTICATED; dropping");
                StepOutcome::Dropped
            }
            MasterState::Timestamp => {
                // Discarded per the probe sequence.
                self.state = MasterState::ServerId;
                StepOutcome::Send(build_query("SHOW VARIABLES LIKE 'SERVER_ID'"))
            }
            MasterState::ServerId => {
                self.saved.insert("server_id", response.to_vec());
                self.state = MasterState::HbPeriod;
                StepOutcome::Send(build_query(
                    "SET @master_heartbeat_period = 1799999979520",
                ))
            }
            MasterState::HbPeriod => {
                self.saved.insert("heartbeat_period", response.to_vec());
                self.state = MasterState::Chksum1;
                StepOutcome::Send(build_query(
                    "SET @master_binlog_checksum = @@global.binlog_checksum",
                ))
            }
            MasterState::Chksum1 => {
                self.saved.insert("binlog_checksum_set", response.to_vec());
                self.state = MasterState::Chksum2;
                StepOutcome::Send(build_query("SELECT @master_binlog_checksum"))
            }
            MasterState::Chksum2 => {
                self.saved.insert("master_binlog_checksum", response.to_vec());
                self.state = MasterState::GtidMode;
                StepOutcome::Send(build_query("SELECT @@GLOBAL.GTID_MODE"))
            }
            MasterState::GtidMode => {
                self.saved.insert("gtid_mode", response.to_vec());
                self.state = MasterState::MUuid;
                StepOutcome::Send(build_query("SHOW VARIABLES LIKE 'SERVER_UUID'"))
            }
            MasterState::MUuid => {
                self.saved.insert("server_uuid", response.to_vec());
                self.state = MasterState::SUuid;
                StepOutcome::Send(build_query(&format!("SET @slave_uuid='{}'", self.uuid)))
            }
            MasterState::SUuid => {
                self.saved.insert("slave_uuid_ack", response.to_vec());
                self.state = MasterState::Latin1;
                StepOutcome::Send(build_query("SET NAMES latin1"))
            }
            MasterState::Latin1 => {
                self.saved.insert("set_names_ack", response.to_vec());
                self.state = MasterState::Register;
                match build_register_slave(self.server_id, self.master_id, 0) {
                    Ok(packet) => StepOutcome::Send(packet),
                    Err(e) => {
                        error!("failed to build register-slave packet: {e}");
                        StepOutcome::Dropped
                    }
                }
            }
            MasterState::Register => {
                self.saved.insert("register_ack", response.to_vec());
                self.state = MasterState::BinlogDump;
                match build_binlog_dump(self.server_id, binlog_name, binlog_position) {
                    Ok(packet) => StepOutcome::Send(packet),
                    Err(e) => {
                        error!("failed to build binlog-dump packet: {e}");
                        StepOutcome::Dropped
                    }
                }
            }
            MasterState::BinlogDump => StepOutcome::EnteredStreaming,
        }
    }
}
