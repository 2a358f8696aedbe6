//! Session coordinator
//!
//! Control flow for one guest session:
//! launch → accept → spawn relay pair → join inbound → clear flag →
//! join outbound → close connection → close endpoint → shutdown guest.
//!
//! The inbound relay is the authority on when the session is over. An
//! outbound failure only stops host→guest forwarding; the session keeps
//! running until the guest closes (or the inbound side fails).

#[cfg(target_os = "linux")]
use crate::vsock::VsockListener;
use crate::input::InputSource;
use crate::orchestrator::GuestOrchestrator;
use crate::relay::{RelayEnd, RelayReport, relay_inbound, relay_outbound};
use crate::transport::{Connection, Listener};
use crate::unix::UnixListener;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use vsock_relay_core::{BridgeConfig, BridgeError, ConnectionActive, RelayConfig, Result, TransportConfig};

/// Outcome of a completed session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Host→guest relay
    pub outbound: RelayReport,
    /// Guest→host relay
    pub inbound: RelayReport,
    /// Whether a stop request closed the connection
    pub cancelled: bool,
}

/// One single-shot bridge session over a bound endpoint
pub struct BridgeSession<L: Listener, O: GuestOrchestrator> {
    listener: L,
    orchestrator: O,
    launch_id: String,
    relay: RelayConfig,
}

impl<L: Listener, O: GuestOrchestrator> BridgeSession<L, O> {
    pub fn new(listener: L, orchestrator: O, launch_id: impl Into<String>, relay: RelayConfig) -> Self {
        Self {
            listener,
            orchestrator,
            launch_id: launch_id.into(),
            relay,
        }
    }

    /// Run the session to completion.
    ///
    /// `input` feeds the guest, `output` receives everything the guest
    /// sends. When `cancel` resolves the connection is shut down, which the
    /// inbound relay observes as a peer close.
    pub async fn run<I, W, F>(self, input: I, output: W, cancel: F) -> Result<SessionReport>
    where
        I: InputSource,
        W: Write + Send + 'static,
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            orchestrator,
            launch_id,
            relay,
        } = self;
        let endpoint = listener.describe();

        if let Err(e) = orchestrator.launch(&launch_id).await {
            warn!("Guest launch action failed: {}", e);
        }

        info!("Waiting for guest on {}", endpoint);
        let (listener, accepted) = tokio::task::spawn_blocking(move || {
            let accepted = listener.accept();
            (listener, accepted)
        })
        .await
        .map_err(|e| BridgeError::Accept(format!("accept task failed: {}", e)))?;
        let conn = Arc::new(accepted?);

        let active = ConnectionActive::new();

        let outbound = {
            let (conn, active, relay) = (conn.clone(), active.clone(), relay.clone());
            tokio::task::spawn_blocking(move || {
                let mut input = input;
                relay_outbound(&mut input, &*conn, &active, &relay)
            })
        };
        let mut inbound = {
            let (conn, active, relay) = (conn.clone(), active.clone(), relay.clone());
            tokio::task::spawn_blocking(move || {
                let mut output = output;
                relay_inbound(&*conn, &mut output, &active, &relay)
            })
        };
        info!("Relaying {} <-> stdio", endpoint);

        tokio::pin!(cancel);
        let mut cancelled = false;
        let inbound = tokio::select! {
            biased;
            joined = &mut inbound => joined,
            _ = &mut cancel => {
                cancelled = true;
                warn!("Stop requested, closing guest connection");
                if let Err(e) = conn.shutdown() {
                    debug!("Connection shutdown: {}", e);
                }
                inbound.await
            }
        };
        let inbound = joined_report("inbound", inbound);

        // Idempotent: the inbound relay clears it itself on a peer close
        if active.deactivate() {
            debug!("Connection-active flag cleared by coordinator");
        }
        let outbound = joined_report("outbound", outbound.await);

        drop(conn);
        info!(
            "Connection closed ({} bytes to guest, {} bytes from guest)",
            outbound.bytes, inbound.bytes
        );
        drop(listener);
        debug!("Endpoint {} closed", endpoint);

        if let Err(e) = orchestrator.shutdown().await {
            warn!("Guest shutdown action failed: {}", e);
        }

        Ok(SessionReport {
            outbound,
            inbound,
            cancelled,
        })
    }
}

fn joined_report(direction: &str, joined: std::result::Result<RelayReport, JoinError>) -> RelayReport {
    joined.unwrap_or_else(|e| {
        error!("{} relay aborted: {}", direction, e);
        RelayReport {
            bytes: 0,
            end: RelayEnd::Aborted,
        }
    })
}

/// Bind the configured endpoint and run one session on it.
///
/// Setup failures (socket, bind, listen, accept) are returned as errors; a
/// bind failure returns before any orchestration action runs.
pub async fn run_bridge<O, I, W, F>(
    config: &BridgeConfig,
    orchestrator: O,
    input: I,
    output: W,
    cancel: F,
) -> Result<SessionReport>
where
    O: GuestOrchestrator,
    I: InputSource,
    W: Write + Send + 'static,
    F: Future<Output = ()>,
{
    config.validate()?;
    let launch_id = config.guest.launch_id.clone();

    match &config.transport {
        TransportConfig::Vsock { cid, port } => {
            #[cfg(target_os = "linux")]
            {
                let listener = VsockListener::bind(*cid, *port, config.backlog)?;
                BridgeSession::new(listener, orchestrator, launch_id, config.relay.clone())
                    .run(input, output, cancel)
                    .await
            }
            #[cfg(not(target_os = "linux"))]
            {
                let _ = (cid, port, orchestrator, input, output, cancel, launch_id);
                Err(BridgeError::Unsupported(
                    "AF_VSOCK is only available on Linux hosts".into(),
                ))
            }
        }
        TransportConfig::Unix { path } => {
            let listener = UnixListener::bind(path, config.backlog)?;
            BridgeSession::new(listener, orchestrator, launch_id, config.relay.clone())
                .run(input, output, cancel)
                .await
        }
    }
}
