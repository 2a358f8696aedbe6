//! Relay loops
//!
//! Two loops copy raw bytes, one per direction, each on its own thread:
//! - outbound (host→guest): input source → connection
//! - inbound (guest→host): connection → output sink
//!
//! Only the inbound loop may clear the connection-active flag, and only when
//! the peer closes its end. Everything else just stops the loop that hit it.

use crate::input::InputSource;
use crate::transport::{Connection, send_all};
use std::io::{self, Write};
use tracing::{debug, error, info};
use vsock_relay_core::{ConnectionActive, RelayConfig};

/// Why a relay loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Peer closed its end (receive returned 0)
    PeerClosed,
    /// Connection-active flag was cleared
    Deactivated,
    /// Input source reached end of file
    InputClosed,
    /// Sending to the connection failed
    SendFailed,
    /// Receiving from the connection failed
    RecvFailed,
    /// Writing to the output sink failed
    OutputFailed,
    /// Reading the input source failed
    InputFailed,
    /// The relay thread panicked or was cancelled
    Aborted,
}

/// Outcome of one relay loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    /// Bytes copied before the loop stopped
    pub bytes: u64,
    pub end: RelayEnd,
}

impl RelayReport {
    fn new(bytes: u64, end: RelayEnd) -> Self {
        Self { bytes, end }
    }
}

/// Forward input to the connection while the flag is set.
///
/// Each chunk read is sent unmodified. A send failure stops this loop but
/// leaves the flag alone; the session still ends on the inbound side.
pub fn relay_outbound<I, C>(
    input: &mut I,
    conn: &C,
    active: &ConnectionActive,
    config: &RelayConfig,
) -> RelayReport
where
    I: InputSource + ?Sized,
    C: Connection + ?Sized,
{
    let mut buf = vec![0u8; config.buffer_size];
    let interval = config.poll_interval();
    let mut total = 0u64;

    while active.is_active() {
        match input.read_timeout(&mut buf, interval) {
            Ok(None) => continue,
            Ok(Some(0)) => {
                info!("Input closed after {} bytes", total);
                return RelayReport::new(total, RelayEnd::InputClosed);
            }
            Ok(Some(n)) => {
                if let Err(e) = send_all(conn, &buf[..n]) {
                    error!("send: {}", e);
                    return RelayReport::new(total, RelayEnd::SendFailed);
                }
                total += n as u64;
                debug!("[Host→Guest] {} bytes", n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("input read: {}", e);
                return RelayReport::new(total, RelayEnd::InputFailed);
            }
        }
    }

    debug!("Outbound relay stopping, {} bytes sent", total);
    RelayReport::new(total, RelayEnd::Deactivated)
}

/// Copy everything received on the connection to `output` while the flag is set.
///
/// A zero-byte receive means the guest closed its end: the flag is cleared
/// and the loop stops. A receive error stops the loop without touching the
/// flag; the coordinator clears it afterwards.
pub fn relay_inbound<C, W>(
    conn: &C,
    output: &mut W,
    active: &ConnectionActive,
    config: &RelayConfig,
) -> RelayReport
where
    C: Connection + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; config.buffer_size];
    let mut total = 0u64;

    while active.is_active() {
        match conn.recv(&mut buf) {
            Ok(0) => {
                info!("Guest disconnected after {} bytes", total);
                active.deactivate();
                return RelayReport::new(total, RelayEnd::PeerClosed);
            }
            Ok(n) => {
                if let Err(e) = output.write_all(&buf[..n]).and_then(|_| output.flush()) {
                    error!("output write: {}", e);
                    return RelayReport::new(total, RelayEnd::OutputFailed);
                }
                total += n as u64;
                debug!("[Guest→Host] {} bytes", n);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("recv: {}", e);
                return RelayReport::new(total, RelayEnd::RecvFailed);
            }
        }
    }

    debug!("Inbound relay stopping, {} bytes received", total);
    RelayReport::new(total, RelayEnd::Deactivated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::PollInput;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    fn fast() -> RelayConfig {
        RelayConfig {
            buffer_size: 1024,
            poll_interval_ms: 10,
        }
    }

    /// Connection whose sends always fail
    struct Broken;

    impl Connection for Broken {
        fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::ConnectionReset))
        }

        fn send(&self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn shutdown(&self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Sink that rejects every write
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_inbound_copies_until_peer_close() {
        let (conn, mut guest) = UnixStream::pair().unwrap();
        let active = ConnectionActive::new();

        guest.write_all(b"hello\n").unwrap();
        guest.write_all(b"second line\n").unwrap();
        drop(guest);

        let mut out = Vec::new();
        let report = relay_inbound(&conn, &mut out, &active, &fast());

        assert_eq!(out, b"hello\nsecond line\n");
        assert_eq!(report, RelayReport::new(18, RelayEnd::PeerClosed));
        assert!(!active.is_active());
    }

    #[test]
    fn test_inbound_preserves_order_across_small_buffer() {
        let (conn, mut guest) = UnixStream::pair().unwrap();
        let active = ConnectionActive::new();
        let payload: Vec<u8> = (0..=255u8).cycle().take(5000).collect();

        let writer = {
            let payload = payload.clone();
            thread::spawn(move || guest.write_all(&payload).unwrap())
        };

        let config = RelayConfig {
            buffer_size: 7,
            ..fast()
        };
        let mut out = Vec::new();
        let report = relay_inbound(&conn, &mut out, &active, &config);
        writer.join().unwrap();

        assert_eq!(out, payload);
        assert_eq!(report.end, RelayEnd::PeerClosed);
    }

    #[test]
    fn test_inbound_recv_error_leaves_flag_set() {
        let active = ConnectionActive::new();
        let mut out = Vec::new();

        let report = relay_inbound(&Broken, &mut out, &active, &fast());

        assert_eq!(report.end, RelayEnd::RecvFailed);
        assert!(active.is_active());
    }

    #[test]
    fn test_inbound_output_failure_stops() {
        let (conn, mut guest) = UnixStream::pair().unwrap();
        let active = ConnectionActive::new();
        guest.write_all(b"data").unwrap();

        let report = relay_inbound(&conn, &mut FullDisk, &active, &fast());

        assert_eq!(report, RelayReport::new(0, RelayEnd::OutputFailed));
        assert!(active.is_active());
    }

    #[test]
    fn test_inbound_tripped_flag_skips_recv() {
        let (conn, mut guest) = UnixStream::pair().unwrap();
        guest.write_all(b"unread").unwrap();

        let mut out = Vec::new();
        let report = relay_inbound(&conn, &mut out, &ConnectionActive::tripped(), &fast());

        assert_eq!(report, RelayReport::new(0, RelayEnd::Deactivated));
        assert!(out.is_empty());
    }

    #[test]
    fn test_outbound_forwards_input_in_order() {
        let (conn, mut guest) = UnixStream::pair().unwrap();
        let (input_end, mut feeder) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(input_end);
        let active = ConnectionActive::new();

        feeder.write_all(b"ping\n").unwrap();
        feeder.write_all(b"pong\n").unwrap();
        drop(feeder);

        let report = relay_outbound(&mut input, &conn, &active, &fast());
        assert_eq!(report, RelayReport::new(10, RelayEnd::InputClosed));
        assert!(active.is_active());

        drop(conn);
        let mut received = Vec::new();
        guest.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"ping\npong\n");
    }

    #[test]
    fn test_outbound_stops_within_poll_interval() {
        let (conn, _guest) = UnixStream::pair().unwrap();
        let (input_end, _feeder) = UnixStream::pair().unwrap();
        let active = ConnectionActive::new();

        let handle = {
            let active = active.clone();
            thread::spawn(move || {
                let mut input = PollInput::new(input_end);
                relay_outbound(&mut input, &conn, &active, &fast())
            })
        };

        thread::sleep(Duration::from_millis(30));
        let flipped_at = Instant::now();
        active.deactivate();
        let report = handle.join().unwrap();

        assert_eq!(report.end, RelayEnd::Deactivated);
        assert!(flipped_at.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_outbound_send_failure_leaves_flag_set() {
        let (input_end, mut feeder) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(input_end);
        let active = ConnectionActive::new();
        feeder.write_all(b"lost").unwrap();

        let report = relay_outbound(&mut input, &Broken, &active, &fast());

        assert_eq!(report, RelayReport::new(0, RelayEnd::SendFailed));
        assert!(active.is_active());
    }

    #[test]
    fn test_outbound_tripped_flag_returns_immediately() {
        let (conn, _guest) = UnixStream::pair().unwrap();
        let (input_end, mut feeder) = UnixStream::pair().unwrap();
        let mut input = PollInput::new(input_end);
        feeder.write_all(b"never sent").unwrap();

        let report = relay_outbound(&mut input, &conn, &ConnectionActive::tripped(), &fast());
        assert_eq!(report, RelayReport::new(0, RelayEnd::Deactivated));
    }

    #[test]
    fn test_both_directions_share_one_connection() {
        let (conn, guest) = UnixStream::pair().unwrap();
        let conn = Arc::new(conn);
        let (input_end, mut feeder) = UnixStream::pair().unwrap();
        let active = ConnectionActive::new();
        let output = Arc::new(Mutex::new(Vec::new()));

        let outbound = {
            let (conn, active) = (conn.clone(), active.clone());
            thread::spawn(move || {
                let mut input = PollInput::new(input_end);
                relay_outbound(&mut input, &*conn, &active, &fast())
            })
        };
        let inbound = {
            let (conn, active, output) = (conn.clone(), active.clone(), output.clone());
            thread::spawn(move || {
                let mut sink = Vec::new();
                let report = relay_inbound(&*conn, &mut sink, &active, &fast());
                output.lock().unwrap().extend(sink);
                report
            })
        };

        // Guest echoes one line back, then closes
        feeder.write_all(b"echo me\n").unwrap();
        let mut guest = guest;
        let mut line = [0u8; 8];
        guest.read_exact(&mut line).unwrap();
        guest.write_all(&line).unwrap();
        drop(guest);

        let inbound = inbound.join().unwrap();
        let outbound = outbound.join().unwrap();

        assert_eq!(inbound.end, RelayEnd::PeerClosed);
        assert_eq!(outbound.end, RelayEnd::Deactivated);
        assert_eq!(outbound.bytes, 8);
        assert_eq!(output.lock().unwrap().as_slice(), b"echo me\n");
    }
}
