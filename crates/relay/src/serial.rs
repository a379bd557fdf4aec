//! Serial Bridge: one request, one line of response.
//!
//! Every transaction opens the device, writes the payload followed by a
//! newline, reads a single line and closes the device again. The device is
//! never held between transactions and at most one transaction runs at a
//! time.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Returned in place of an empty device reply.
pub const NULL_SENTINEL: &[u8] = b"null";

/// Upper bound on a reply line.
const MAX_LINE: usize = 64 * 1024;

/// Serial device errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The device could not be opened.
    #[error("could not open port {device}: {message}")]
    Open { device: String, message: String },

    /// Writing to or reading from the device failed.
    #[error("I/O error on {device}: {message}")]
    Io { device: String, message: String },
}

impl BridgeError {
    /// The device the error refers to.
    pub fn device(&self) -> &str {
        match self {
            BridgeError::Open { device, .. } | BridgeError::Io { device, .. } => device,
        }
    }
}

/// Line settings for opening a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Line speed.
    pub baud_rate: u32,
    /// How long to wait for the reply line.
    pub read_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// An open device.
pub trait SerialIo: Read + Write + Send {}

impl<T: Read + Write + Send> SerialIo for T {}

/// Opens devices by identifier.
pub trait PortOpener: Send + Sync {
    /// Open `device`. Reads on the returned handle must time out after
    /// `options.read_timeout`.
    fn open(&self, device: &str, options: &BridgeOptions) -> Result<Box<dyn SerialIo>, BridgeError>;
}

/// Opens real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    fn open(&self, device: &str, options: &BridgeOptions) -> Result<Box<dyn SerialIo>, BridgeError> {
        let port = serialport::new(device, options.baud_rate)
            .timeout(options.read_timeout)
            .open()
            .map_err(|e| BridgeError::Open {
                device: device.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(port))
    }
}

/// Exclusive access to serial devices.
pub struct SerialBridge {
    opener: Arc<dyn PortOpener>,
    options: BridgeOptions,
    lock: Arc<Mutex<()>>,
}

impl SerialBridge {
    /// Create a bridge over real serial ports.
    pub fn new(options: BridgeOptions) -> Self {
        Self::with_opener(Arc::new(SystemPorts), options)
    }

    /// Create a bridge with a custom opener.
    pub fn with_opener(opener: Arc<dyn PortOpener>, options: BridgeOptions) -> Self {
        Self {
            opener,
            options,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write `payload` plus a newline to `device` and return one reply line.
    ///
    /// The line terminator is stripped. An empty reply becomes
    /// [`NULL_SENTINEL`].
    pub async fn transact(&self, device: &str, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let payload = payload.to_vec();
        self.run_exclusive(device, move |port, device| {
            exchange_line(port, device, &payload)
        })
        .await
    }

    /// Open and immediately close `device` to check that it is usable.
    pub async fn probe(&self, device: &str) -> Result<(), BridgeError> {
        self.run_exclusive(device, |_, _| Ok(())).await
    }

    async fn run_exclusive<T, F>(&self, device: &str, op: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialIo, &str) -> Result<T, BridgeError> + Send + 'static,
    {
        // The guard moves into the blocking task so the device stays
        // exclusive until the handle is dropped, even if the caller goes away.
        let guard = self.lock.clone().lock_owned().await;
        let opener = self.opener.clone();
        let options = self.options.clone();
        let device = device.to_string();
        let task_device = device.clone();

        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut port = opener.open(&task_device, &options)?;
            debug!(device = %task_device, "Device opened");
            let result = op(port.as_mut(), &task_device);
            drop(port);
            debug!(device = %task_device, "Device closed");
            result
        })
        .await;

        match result {
            Ok(result) => result,
            Err(e) => Err(BridgeError::Io {
                device,
                message: format!("transaction aborted: {}", e),
            }),
        }
    }
}

fn exchange_line(port: &mut dyn SerialIo, device: &str, payload: &[u8]) -> Result<Vec<u8>, BridgeError> {
    let io_error = |e: io::Error| BridgeError::Io {
        device: device.to_string(),
        message: e.to_string(),
    };

    let mut request = Vec::with_capacity(payload.len() + 1);
    request.extend_from_slice(payload);
    request.push(b'\n');
    port.write_all(&request).map_err(io_error)?;
    port.flush().map_err(io_error)?;

    let mut line = read_line(port).map_err(io_error)?;
    while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
        line.pop();
    }

    if line.is_empty() {
        debug!(device = %device, "Device returned nothing");
        return Ok(NULL_SENTINEL.to_vec());
    }
    Ok(line)
}

/// Read until a newline, a read timeout or end of stream.
fn read_line(port: &mut dyn SerialIo) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match port.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let data = &chunk[..n];
                if let Some(pos) = data.iter().position(|b| *b == b'\n') {
                    line.extend_from_slice(&data[..=pos]);
                    break;
                }
                line.extend_from_slice(data);
                if line.len() >= MAX_LINE {
                    warn!(len = line.len(), "Reply line truncated");
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(line)
}
