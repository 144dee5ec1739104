//! Contracts for the collaborators this crate treats as external: the
//! socket to the master, the local binlog file, and each downstream
//! slave's connection. None of them are implemented here, callers supply
//! their own, in the style of `connection::conn::connection::IConnection`.

use common::err::CResult;

/// A connection to the upstream master. The router writes outbound
/// command packets through it and never reads directly: inbound bytes
/// are delivered to the router by the caller via `MasterChannel::gate`.
pub trait MasterConn: Send {
    fn write(&mut self, buffer: &[u8]) -> CResult<()>;
    fn close(&mut self);
}

/// The local on-disk binlog file the router persists ingested events to.
pub trait BinlogFile: Send {
    fn append(&mut self, bytes: &[u8]) -> CResult<()>;
    /// Close the current file and open `name` at `pos`.
    fn rotate(&mut self, name: &str, pos: u64) -> CResult<()>;
    fn flush(&mut self) -> CResult<()>;
}

/// A downstream replica's connection, as seen by the fan-out distributor.
pub trait SlaveConn: Send {
    fn write(&mut self, buffer: &[u8]) -> CResult<()>;
    /// Notify the slave-side file tracking that a rotate occurred, so its
    /// own bookkeeping advances in step with the router's.
    fn rotate_hook(&mut self, raw_rotate_payload: &[u8]) -> CResult<()>;
}

/// Produces the session authentication blob (`user`, `db`, SHA-1'd
/// password) the router carries opaquely; never inspected here.
pub trait CredentialsProducer: Send {
    fn produce(&self) -> CResult<Vec<u8>>;
}
