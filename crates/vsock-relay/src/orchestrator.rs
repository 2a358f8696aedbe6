//! Guest orchestration
//!
//! The bridge starts the guest counterpart before accepting and shuts the
//! guest down after teardown. Both actions are fire-and-forget from the
//! session's point of view: failures are reported, never fatal.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};
use vsock_relay_core::{BridgeError, GuestConfig, Result};

/// Capability to start and stop the guest environment
#[async_trait]
pub trait GuestOrchestrator: Send + Sync + 'static {
    /// Ask the guest to launch its counterpart, which then connects back
    async fn launch(&self, identifier: &str) -> Result<()>;

    /// Ask the guest environment to shut down
    async fn shutdown(&self) -> Result<()>;
}

#[async_trait]
impl<T: GuestOrchestrator + ?Sized> GuestOrchestrator for Arc<T> {
    async fn launch(&self, identifier: &str) -> Result<()> {
        (**self).launch(identifier).await
    }

    async fn shutdown(&self) -> Result<()> {
        (**self).shutdown().await
    }
}

/// Runs the configured launch/shutdown commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellOrchestrator {
    config: GuestConfig,
}

impl ShellOrchestrator {
    pub fn new(config: GuestConfig) -> Self {
        Self { config }
    }

    async fn run(&self, action: &str, command: Option<String>) -> Result<()> {
        let Some(command) = command else {
            debug!("No {} command configured, skipping", action);
            return Ok(());
        };

        info!("Running guest {} action: {}", action, command);

        // stdin is the relay source; never let the action consume it
        let status = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| BridgeError::Orchestration(format!("{} `{}`: {}", action, command, e)))?;

        if status.success() {
            debug!("Guest {} action finished", action);
            Ok(())
        } else {
            Err(BridgeError::Orchestration(format!(
                "{} `{}` exited with {}",
                action, command, status
            )))
        }
    }
}

#[async_trait]
impl GuestOrchestrator for ShellOrchestrator {
    async fn launch(&self, identifier: &str) -> Result<()> {
        self.run("launch", self.config.render_launch(identifier))
            .await
    }

    async fn shutdown(&self) -> Result<()> {
        self.run("shutdown", self.config.shutdown_command.clone())
            .await
    }
}
