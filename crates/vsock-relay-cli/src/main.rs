//! vsock-relay: host-side bridge to a guest VM
//!
//! Listens on a vsock port, asks the guest to launch its counterpart, then
//! relays stdin to the guest and the guest's output to stdout until the
//! guest disconnects. Finally asks the guest to shut down.
//!
//! Logs go to stderr; stdout carries relayed bytes only.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vsock_relay::{PollInput, ShellOrchestrator, run_bridge};
use vsock_relay_core::config::{CID_ANY, DEFAULT_VSOCK_PORT};
use vsock_relay_core::{BridgeConfig, GuestConfig, TransportConfig};

#[derive(Debug, Parser)]
#[command(name = "vsock-relay", version, about = "Relay stdio to a guest VM over vsock")]
struct Args {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// vsock port to listen on
    #[arg(short, long)]
    port: Option<u32>,

    /// vsock CID to bind (default: any)
    #[arg(long)]
    cid: Option<u32>,

    /// Listen on a Unix socket instead of vsock
    #[arg(long, conflicts_with_all = ["port", "cid"])]
    unix: Option<PathBuf>,

    /// Shell command that launches the guest counterpart ({id} is substituted)
    #[arg(long)]
    launch_command: Option<String>,

    /// Identifier passed to the guest counterpart
    #[arg(long)]
    launch_id: Option<String>,

    /// Shell command that shuts the guest down
    #[arg(long)]
    shutdown_command: Option<String>,

    /// Run neither the launch nor the shutdown action
    #[arg(long)]
    no_orchestrate: bool,

    /// Input polling interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Relay buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(path) = self.unix {
            config.transport = TransportConfig::Unix { path };
        } else if self.port.is_some() || self.cid.is_some() {
            let (cid, port) = match config.transport {
                TransportConfig::Vsock { cid, port } => (cid, port),
                TransportConfig::Unix { .. } => (CID_ANY, DEFAULT_VSOCK_PORT),
            };
            config.transport = TransportConfig::Vsock {
                cid: self.cid.unwrap_or(cid),
                port: self.port.unwrap_or(port),
            };
        }

        if self.no_orchestrate {
            config.guest = GuestConfig::disabled();
        } else {
            if let Some(cmd) = self.launch_command {
                config.guest.launch_command = Some(cmd);
            }
            if let Some(id) = self.launch_id {
                config.guest.launch_id = id;
            }
            if let Some(cmd) = self.shutdown_command {
                config.guest.shutdown_command = Some(cmd);
            }
        }

        if let Some(ms) = self.poll_interval_ms {
            config.relay.poll_interval_ms = ms;
        }
        if let Some(size) = self.buffer_size {
            config.relay.buffer_size = size;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    let config = args.into_config()?;
    info!("vsock-relay starting: {:?}", config.transport);

    let orchestrator = ShellOrchestrator::new(config.guest.clone());
    let input = PollInput::stdin().context("duplicating stdin")?;
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler: never cancel
            std::future::pending::<()>().await;
        }
    };

    let report = run_bridge(&config, orchestrator, input, std::io::stdout(), cancel).await?;

    info!(
        "Session finished: inbound {:?}, outbound {:?}",
        report.inbound.end, report.outbound.end
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BridgeConfig {
        let mut argv = vec!["vsock-relay"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap().into_config().unwrap()
    }

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = parse(&[]);
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_port_override_keeps_any_cid() {
        let config = parse(&["--port", "5005"]);
        assert_eq!(
            config.transport,
            TransportConfig::Vsock {
                cid: CID_ANY,
                port: 5005
            }
        );
    }

    #[test]
    fn test_unix_transport_and_no_orchestrate() {
        let config = parse(&["--unix", "/tmp/relay.sock", "--no-orchestrate"]);
        assert_eq!(
            config.transport,
            TransportConfig::Unix {
                path: PathBuf::from("/tmp/relay.sock")
            }
        );
        assert_eq!(config.guest, GuestConfig::disabled());
    }

    #[test]
    fn test_guest_overrides() {
        let config = parse(&[
            "--launch-command",
            "virsh start td && ssh td './ta {id}'",
            "--launch-id",
            "7",
            "--poll-interval-ms",
            "25",
        ]);
        assert_eq!(
            config.guest.render_launch(&config.guest.launch_id).as_deref(),
            Some("virsh start td && ssh td './ta 7'")
        );
        assert_eq!(config.relay.poll_interval_ms, 25);
    }

    #[test]
    fn test_unix_conflicts_with_port() {
        let result = Args::try_parse_from(["vsock-relay", "--unix", "/tmp/a.sock", "--port", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let args = Args::try_parse_from(["vsock-relay", "--buffer-size", "0"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
