//! # RemoSerial Relay Library
//!
//! This crate drives a serial device attached to a remote host over TCP,
//! optionally sealing every message with the hybrid cipher from the
//! [`protocol`] crate.
//!
//! ## Overview
//!
//! - **Serial Bridge**: open, write one line, read one line, close
//! - **Command Router**: answers `GET_PORTS`, `OPEN_CONNECTION`,
//!   `CLOSE_CONNECTION` and `CHECK`
//! - **Connection Listener**: the accepting role, one peer at a time
//! - **Reconnect Loop**: the dialling role, one turn per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │   Reconnect Loop     │ ─── TCP ──────▶ │ Connection Listener  │
//! │ (agent / requester)  │                 │ (serve / issue)      │
//! └──────────┬───────────┘                 └──────────┬───────────┘
//!            │            Connection + Channel         │
//!            ▼                                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Command Router                           │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │        Host (discovery,      │          Serial Bridge           │
//! │        status, link)         │    (exclusive, one line/turn)    │
//! └──────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relay::{CommandRouter, Config, Listener, SerialBridge, SystemHost};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let router = CommandRouter::new(
//!         Arc::new(SystemHost::new()),
//!         Arc::new(SerialBridge::new(config.bridge_options())),
//!     );
//!
//!     let listener = Listener::bind(config.listener_options()).await?;
//!     let mode = config
//!         .serve_mode()
//!         .ok_or_else(|| anyhow::anyhow!("bridge mode needs a device"))?;
//!     listener.serve(&router, &mode).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`events`]: Progress events
//! - [`host`]: Device discovery, status and link liveness
//! - [`network`]: Listener and reconnect loop
//! - [`router`]: Command dispatch
//! - [`serial`]: Serial Bridge

pub mod config;
pub mod events;
pub mod host;
pub mod network;
pub mod router;
pub mod serial;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;
pub use events::{CloseReason, RelayEvent};
pub use host::{Host, SystemHost};
pub use network::{
    CheckPoller, Listener, ListenerOptions, LoopExit, ReconnectLoop, ReconnectOptions, ServeMode,
    SingleRequest, Turn, TurnRole,
};
pub use router::{CommandRouter, RouterError, RouterResult};
pub use serial::{BridgeError, BridgeOptions, PortOpener, SerialBridge, SerialIo, SystemPorts};
