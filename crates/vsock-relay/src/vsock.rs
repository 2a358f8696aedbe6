//! AF_VSOCK transport
//!
//! Host side of the hypervisor socket. The listener binds `(cid, port)`,
//! normally `(VMADDR_CID_ANY, 1234)`, and the guest counterpart connects
//! back to it after launch.

use crate::transport::{Connection, Listener};
use nix::sys::socket::{
    AddressFamily, Backlog, MsgFlags, Shutdown, SockFlag, SockType, VsockAddr, accept4, bind,
    getpeername, listen, recv, send, shutdown, socket,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::{debug, info};
use vsock_relay_core::{BridgeError, Result};

/// Listening vsock endpoint
pub struct VsockListener {
    fd: OwnedFd,
    cid: u32,
    port: u32,
}

impl VsockListener {
    /// Create, bind and listen. Each failing step maps to its own setup error.
    pub fn bind(cid: u32, port: u32, backlog: u32) -> Result<Self> {
        let fd = socket(
            AddressFamily::Vsock,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| BridgeError::Socket(format!("AF_VSOCK socket: {}", e)))?;

        let addr = VsockAddr::new(cid, port);
        bind(fd.as_raw_fd(), &addr)
            .map_err(|e| BridgeError::Bind(format!("vsock {}:{}: {}", cid_label(cid), port, e)))?;

        let backlog = i32::try_from(backlog)
            .ok()
            .and_then(|b| Backlog::new(b).ok())
            .ok_or_else(|| BridgeError::Listen(format!("invalid backlog {}", backlog)))?;
        listen(&fd, backlog).map_err(|e| BridgeError::Listen(e.to_string()))?;

        info!("Listening on vsock {}:{}", cid_label(cid), port);
        Ok(Self { fd, cid, port })
    }
}

impl Listener for VsockListener {
    type Conn = VsockStream;

    fn accept(&self) -> Result<VsockStream> {
        let raw = loop {
            match accept4(self.fd.as_raw_fd(), SockFlag::SOCK_CLOEXEC) {
                Ok(raw) => break raw,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(BridgeError::Accept(e.to_string())),
            }
        };
        // SAFETY: accept4 returned a fresh descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        match getpeername::<VsockAddr>(fd.as_raw_fd()) {
            Ok(peer) => info!("Guest connected from cid {} port {}", peer.cid(), peer.port()),
            Err(e) => debug!("Guest connected (peer address unavailable: {})", e),
        }

        Ok(VsockStream { fd })
    }

    fn describe(&self) -> String {
        format!("vsock://{}:{}", cid_label(self.cid), self.port)
    }
}

/// Accepted vsock stream
pub struct VsockStream {
    fd: OwnedFd,
}

impl Connection for VsockStream {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        recv(self.fd.as_raw_fd(), buf, MsgFlags::empty()).map_err(io::Error::from)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        send(self.fd.as_raw_fd(), buf, MsgFlags::MSG_NOSIGNAL).map_err(io::Error::from)
    }

    fn shutdown(&self) -> io::Result<()> {
        shutdown(self.fd.as_raw_fd(), Shutdown::Both).map_err(io::Error::from)
    }
}

fn cid_label(cid: u32) -> String {
    if cid == libc::VMADDR_CID_ANY {
        "any".to_string()
    } else {
        cid.to_string()
    }
}
