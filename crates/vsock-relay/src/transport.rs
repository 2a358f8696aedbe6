//! Transport abstractions for the relay
//!
//! A `Listener` yields exactly one `Connection` per session. Connections use
//! `&self` receivers: stream sockets support one concurrent reader and one
//! concurrent writer, so the inbound and outbound relay tasks can share a
//! single handle without locking.

use std::io;
use vsock_relay_core::Result;

/// A listening endpoint that accepts guest connections
pub trait Listener: Send + 'static {
    type Conn: Connection;

    /// Block until a peer connects
    fn accept(&self) -> Result<Self::Conn>;

    /// Human-readable endpoint address for logs
    fn describe(&self) -> String;
}

/// An accepted byte stream
pub trait Connection: Send + Sync + 'static {
    /// Receive into `buf`; `Ok(0)` means the peer closed its end
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send some prefix of `buf`, returning how many bytes went out
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Shut down both directions, waking any blocked `recv`
    fn shutdown(&self) -> io::Result<()>;
}

/// Send the whole chunk, retrying on short writes and `EINTR`
pub fn send_all<C: Connection + ?Sized>(conn: &C, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match conn.send(data) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection accepted zero bytes",
                ));
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
