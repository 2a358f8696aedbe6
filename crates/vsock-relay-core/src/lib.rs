//! # vsock-relay-core
//!
//! Core types shared by the vsock relay crates:
//! - Error taxonomy (setup, orchestration, relay)
//! - Bridge configuration
//! - The connection-active flag shared by the relay tasks

pub mod active;
pub mod config;
pub mod error;

pub use active::ConnectionActive;
pub use config::{BridgeConfig, GuestConfig, RelayConfig, TransportConfig};
pub use error::{BridgeError, Result};
