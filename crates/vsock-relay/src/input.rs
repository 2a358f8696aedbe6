//! Readiness-based input for the outbound relay
//!
//! The outbound task must notice a cleared connection-active flag even when
//! no input ever arrives, so it never blocks on a read. It waits for
//! readability with `poll(2)` bounded by the polling interval, then reads
//! straight from the descriptor. Reading the raw descriptor (not a buffered
//! `Stdin`) keeps readiness and available data in agreement.

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::time::Duration;

/// Source of bytes for the host→guest direction
pub trait InputSource: Send + 'static {
    /// Wait at most `timeout` for input and read it.
    ///
    /// `Ok(None)`: nothing became readable. `Ok(Some(0))`: end of input.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;
}

/// Input read from an owned descriptor after `poll(2)` reports it readable
pub struct PollInput {
    fd: OwnedFd,
}

impl PollInput {
    pub fn new(fd: impl Into<OwnedFd>) -> Self {
        Self { fd: fd.into() }
    }

    /// Duplicate of the process's standard input
    pub fn stdin() -> io::Result<Self> {
        let fd = io::stdin().as_fd().try_clone_to_owned()?;
        Ok(Self { fd })
    }
}

impl InputSource for PollInput {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        // POLLHUP without POLLIN still means read() will report EOF
        let ready = fds[0]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR));
        if !ready {
            return Ok(None);
        }

        match nix::unistd::read(self.fd.as_raw_fd(), buf) {
            Ok(n) => Ok(Some(n)),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    #[test]
    fn test_times_out_without_input() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(ours);
        let mut buf = [0u8; 16];

        let start = Instant::now();
        let got = input
            .read_timeout(&mut buf, Duration::from_millis(30))
            .unwrap();
        assert_eq!(got, None);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_reads_available_bytes() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(ours);
        theirs.write_all(b"ping\n").unwrap();

        let mut buf = [0u8; 16];
        let got = input
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(got, Some(5));
        assert_eq!(&buf[..5], b"ping\n");
    }

    #[test]
    fn test_reports_end_of_input() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(ours);
        drop(theirs);

        let mut buf = [0u8; 16];
        let got = input
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(got, Some(0));
    }

    #[test]
    fn test_chunk_bounded_by_buffer() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(ours);
        theirs.write_all(b"abcdefgh").unwrap();

        let mut buf = [0u8; 3];
        let got = input
            .read_timeout(&mut buf, Duration::from_millis(500))
            .unwrap();
        assert_eq!(got, Some(3));
        assert_eq!(&buf, b"abc");
    }
}
