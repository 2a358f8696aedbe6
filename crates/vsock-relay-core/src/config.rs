//! Bridge configuration
//!
//! Defaults reproduce the reference deployment: vsock port 1234 on any CID,
//! guest reached over `ssh -p 10022 root@localhost`.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known vsock port the guest counterpart connects back to
pub const DEFAULT_VSOCK_PORT: u32 = 1234;

/// `VMADDR_CID_ANY`
pub const CID_ANY: u32 = u32::MAX;

/// Placeholder in the launch command replaced by the launch identifier
pub const LAUNCH_ID_PLACEHOLDER: &str = "{id}";

fn default_cid() -> u32 {
    CID_ANY
}

fn default_port() -> u32 {
    DEFAULT_VSOCK_PORT
}

/// Listening endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// AF_VSOCK stream socket
    Vsock {
        #[serde(default = "default_cid")]
        cid: u32,
        #[serde(default = "default_port")]
        port: u32,
    },
    /// Unix-domain stream socket (local development)
    Unix { path: PathBuf },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Vsock {
            cid: CID_ANY,
            port: DEFAULT_VSOCK_PORT,
        }
    }
}

/// Relay loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Per-task buffer capacity in bytes
    pub buffer_size: usize,
    /// Upper bound on how long the outbound task waits for input
    /// before re-checking the connection-active flag
    pub poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            poll_interval_ms: 100,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Guest orchestration actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    /// Shell command that starts the guest counterpart (`{id}` is substituted)
    pub launch_command: Option<String>,
    /// Identifier handed to the guest counterpart
    pub launch_id: String,
    /// Shell command that shuts the guest down
    pub shutdown_command: Option<String>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            launch_command: Some("ssh -p 10022 root@localhost './ta {id}'".to_string()),
            launch_id: "40".to_string(),
            shutdown_command: Some("ssh -p 10022 root@localhost 'shutdown -h now'".to_string()),
        }
    }
}

impl GuestConfig {
    /// Configuration that runs no orchestration actions
    pub fn disabled() -> Self {
        Self {
            launch_command: None,
            launch_id: String::new(),
            shutdown_command: None,
        }
    }

    /// Launch command with the identifier substituted
    pub fn render_launch(&self, identifier: &str) -> Option<String> {
        self.launch_command
            .as_ref()
            .map(|cmd| cmd.replace(LAUNCH_ID_PLACEHOLDER, identifier))
    }
}

/// Top-level bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub transport: TransportConfig,
    /// Listen backlog (a single client is expected)
    pub backlog: u32,
    pub relay: RelayConfig,
    pub guest: GuestConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            backlog: 1,
            relay: RelayConfig::default(),
            guest: GuestConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: BridgeConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.relay.buffer_size == 0 {
            return Err(BridgeError::Config("buffer_size must be non-zero".into()));
        }
        if self.relay.poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.backlog == 0 {
            return Err(BridgeError::Config("backlog must be non-zero".into()));
        }
        if let TransportConfig::Unix { path } = &self.transport {
            if path.as_os_str().is_empty() {
                return Err(BridgeError::Config("unix socket path is empty".into()));
            }
        }
        Ok(())
    }
}
