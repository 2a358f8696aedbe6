//! Unix socket transport
//!
//! Same contract as the vsock endpoint, over a filesystem socket. Used to run
//! the relay without a hypervisor (local development, tests).

use crate::transport::{Connection, Listener};
use nix::sys::socket::{AddressFamily, Backlog, SockFlag, SockType, UnixAddr, bind, listen, socket};
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener as StdUnixListener, UnixStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vsock_relay_core::{BridgeError, Result};

/// Listening Unix socket; the socket file is removed on drop
pub struct UnixListener {
    inner: StdUnixListener,
    path: PathBuf,
}

impl UnixListener {
    /// Create, bind and listen. Binding an existing path fails with `Bind`.
    pub fn bind(path: impl AsRef<Path>, backlog: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let fd = socket(
            AddressFamily::Unix,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|e| BridgeError::Socket(format!("AF_UNIX socket: {}", e)))?;

        let addr = UnixAddr::new(path.as_path())
            .map_err(|e| BridgeError::Bind(format!("{}: {}", path.display(), e)))?;
        bind(fd.as_raw_fd(), &addr)
            .map_err(|e| BridgeError::Bind(format!("{}: {}", path.display(), e)))?;

        let backlog = i32::try_from(backlog)
            .ok()
            .and_then(|b| Backlog::new(b).ok())
            .ok_or_else(|| BridgeError::Listen(format!("invalid backlog {}", backlog)))?;
        if let Err(e) = listen(&fd, backlog) {
            let _ = std::fs::remove_file(&path);
            return Err(BridgeError::Listen(e.to_string()));
        }

        info!("Listening on unix socket {}", path.display());
        Ok(Self {
            inner: StdUnixListener::from(fd),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Listener for UnixListener {
    type Conn = UnixStream;

    fn accept(&self) -> Result<UnixStream> {
        loop {
            match self.inner.accept() {
                Ok((stream, _addr)) => {
                    info!("Client connected on {}", self.path.display());
                    return Ok(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(BridgeError::Accept(e.to_string())),
            }
        }
    }

    fn describe(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}

impl Drop for UnixListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

impl Connection for UnixStream {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream: &UnixStream = self;
        stream.read(buf)
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let mut stream: &UnixStream = self;
        stream.write(buf)
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
}
