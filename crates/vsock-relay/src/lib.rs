//! Host-side relay between standard I/O and a guest VM
//!
//! This crate provides:
//! - Listening endpoints (AF_VSOCK, and Unix sockets for local use)
//! - Readiness-based input polling
//! - The host→guest and guest→host relay loops
//! - Guest orchestration (launch / shutdown actions)
//! - The session coordinator tying them together

pub mod input;
pub mod orchestrator;
pub mod relay;
pub mod session;
pub mod transport;
pub mod unix;
#[cfg(target_os = "linux")]
pub mod vsock;

pub use input::{InputSource, PollInput};
pub use orchestrator::{GuestOrchestrator, ShellOrchestrator};
pub use relay::{RelayEnd, RelayReport, relay_inbound, relay_outbound};
pub use session::{BridgeSession, SessionReport, run_bridge};
pub use transport::{Connection, Listener};
