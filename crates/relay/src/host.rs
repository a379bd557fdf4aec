//! Host-side collaborators: device discovery, service status and link liveness.
//!
//! Platform heuristics live behind the [`Host`] trait so the listener and
//! router can be driven by a fake in tests.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

/// Information the relay needs from the machine it runs on.
pub trait Host: Send + Sync {
    /// Device identifiers currently present, in discovery order.
    fn list_devices(&self) -> Vec<String>;

    /// Liveness text for a `Check` request.
    ///
    /// The default reports the active device followed by a newline while it
    /// is still present, and an empty string once it is gone or none is
    /// active.
    fn status(&self, active: Option<&str>) -> String {
        match active {
            Some(device) if self.list_devices().iter().any(|d| d == device) => {
                format!("{}\n", device)
            }
            _ => String::new(),
        }
    }

    /// Whether the network link on `interface` is up.
    fn link_up(&self, interface: &str) -> bool;
}

/// The real machine: serial ports from the OS, carrier state from sysfs.
#[derive(Debug, Clone)]
pub struct SystemHost {
    sysfs_net: PathBuf,
}

impl SystemHost {
    /// Create a host reading link state from `/sys/class/net`.
    pub fn new() -> Self {
        Self::with_sysfs_root("/sys/class/net")
    }

    /// Create a host reading link state below another directory.
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_net: root.into(),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn list_devices(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|port| port.port_name).collect(),
            Err(e) => {
                warn!(error = %e, "Serial port enumeration failed");
                Vec::new()
            }
        }
    }

    fn link_up(&self, interface: &str) -> bool {
        let path = self.sysfs_net.join(interface).join("carrier");
        match fs::read_to_string(&path) {
            Ok(contents) => contents.trim() != "0",
            // Missing or unreadable carrier files do not stop the loop.
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Carrier state unavailable");
                true
            }
        }
    }
}
