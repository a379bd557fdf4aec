//! Command router for dispatching decoded requests to their handlers.
//!
//! This module provides the `CommandRouter` struct that receives decoded
//! [`Command`]s and answers each one with a response command, consulting the
//! [`Host`] for discovery and status and the [`SerialBridge`] for devices.

use std::sync::{Arc, Mutex};

use protocol::{Command, STATUS_OK};
use tracing::{debug, info, warn};

use crate::host::Host;
use crate::serial::{BridgeError, SerialBridge};

/// Result type for router operations.
pub type RouterResult = Result<Command, RouterError>;

/// Errors that can occur during command routing.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Serial device error.
    #[error("{0}")]
    Device(#[from] BridgeError),

    /// Message that is not a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RouterError {
    /// Convert the error to the notice sent back to the peer.
    pub fn to_notice(&self) -> Command {
        Command::error_notice(self.to_string())
    }
}

/// Routes requests for one device host.
///
/// The router remembers which device was opened last so that `Check` can
/// report on it. Only one association exists at a time.
pub struct CommandRouter {
    host: Arc<dyn Host>,
    bridge: Arc<SerialBridge>,
    active_device: Mutex<Option<String>>,
}

impl CommandRouter {
    /// Create a new router.
    pub fn new(host: Arc<dyn Host>, bridge: Arc<SerialBridge>) -> Self {
        Self {
            host,
            bridge,
            active_device: Mutex::new(None),
        }
    }

    /// The Serial Bridge used by this router.
    pub fn bridge(&self) -> &Arc<SerialBridge> {
        &self.bridge
    }

    /// The currently associated device, if any.
    pub fn active_device(&self) -> Option<String> {
        self.active_device
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn set_active_device(&self, device: Option<String>) {
        if let Ok(mut guard) = self.active_device.lock() {
            *guard = device;
        }
    }

    /// Route a command to its handler.
    pub async fn route(&self, command: Command) -> RouterResult {
        debug!(command = command.name(), "Routing command");

        match command {
            Command::ListPorts => Ok(self.handle_list_ports()),
            Command::OpenConnection { device_id } => self.handle_open(device_id).await,
            Command::CloseConnection => Ok(self.handle_close()),
            Command::Check => Ok(self.handle_check()),
            Command::ErrorNotice { message } => {
                warn!(%message, "Received error from peer");
                Err(RouterError::InvalidRequest(
                    "error notice is not a request".to_string(),
                ))
            }
            other => Err(RouterError::InvalidRequest(format!(
                "{} is not a request",
                other.name()
            ))),
        }
    }

    /// Route a command and turn any failure into an error notice.
    pub async fn dispatch(&self, command: Command) -> Command {
        match self.route(command).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Request failed");
                e.to_notice()
            }
        }
    }

    fn handle_list_ports(&self) -> Command {
        let devices = self.host.list_devices();
        debug!(count = devices.len(), "Listed devices");
        Command::Ports { devices }
    }

    async fn handle_open(&self, device_id: String) -> RouterResult {
        self.bridge.probe(&device_id).await?;
        info!(device = %device_id, "Device associated");
        self.set_active_device(Some(device_id));
        Ok(Command::OpenConnectionStatus(STATUS_OK.to_string()))
    }

    fn handle_close(&self) -> Command {
        if let Some(device) = self.active_device() {
            info!(device = %device, "Device released");
        }
        self.set_active_device(None);
        Command::CloseConnectionStatus(STATUS_OK.to_string())
    }

    fn handle_check(&self) -> Command {
        let active = self.active_device();
        Command::CheckStatus(self.host.status(active.as_deref()))
    }
}
