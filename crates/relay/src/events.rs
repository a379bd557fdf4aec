//! Progress events for front ends.
//!
//! Listeners and reconnect loops publish [`RelayEvent`]s on a broadcast
//! channel. The `Display` form is the progress string shown to users.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;

/// Capacity of event channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Single-shot exchange finished.
    Completed,
    /// Peer closed the socket.
    PeerClosed,
    /// Too many consecutive empty reads.
    Idle,
    /// Protocol or transport failure.
    Failed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Completed => f.write_str("completed"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::Idle => f.write_str("idle timeout"),
            CloseReason::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Events emitted by listeners and reconnect loops.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Listener bound and waiting.
    Listening { addr: SocketAddr },
    /// Listener gave up waiting for a peer.
    ListenerStopped,
    /// A peer connected.
    PeerConnected { peer: SocketAddr },
    /// Key exchange finished.
    HandshakeComplete { peer: SocketAddr },
    /// A request was answered.
    CommandHandled { command: &'static str },
    /// A device transaction failed.
    DeviceError { device: String, message: String },
    /// A connection ended.
    PeerDisconnected { peer: SocketAddr, reason: CloseReason },
    /// Dialling the control endpoint.
    Connecting { host: String, port: u16 },
    /// An attempt failed and will be retried.
    RetryScheduled { error: String, backoff: Duration },
    /// The network link is down; the loop stops.
    LinkDown { interface: String },
    /// Check polling: the remote service is still running.
    ServiceOngoing,
    /// Check polling: the remote service has finished.
    ServiceEnded,
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::Listening { addr } => write!(f, "Waiting for connection on {}...", addr),
            RelayEvent::ListenerStopped => f.write_str("No connection received, stopping."),
            RelayEvent::PeerConnected { peer } => write!(f, "Connected to {}", peer),
            RelayEvent::HandshakeComplete { peer } => {
                write!(f, "Keys exchanged with {}", peer)
            }
            RelayEvent::CommandHandled { command } => write!(f, "Handled {}", command),
            RelayEvent::DeviceError { device, message } => {
                write!(f, "Device {} failed: {}", device, message)
            }
            RelayEvent::PeerDisconnected { peer, reason } => {
                write!(f, "Connection with {} ended ({})", peer, reason)
            }
            RelayEvent::Connecting { host, port } => write!(f, "Connecting to {}:{}...", host, port),
            RelayEvent::RetryScheduled { error, backoff } => {
                write!(f, "{}; retrying in {}s", error, backoff.as_secs_f32())
            }
            RelayEvent::LinkDown { interface } => write!(f, "Link {} is down, stopping.", interface),
            RelayEvent::ServiceOngoing => f.write_str("Service ongoing..."),
            RelayEvent::ServiceEnded => f.write_str("Service ended."),
        }
    }
}

/// Create an event channel sender.
pub fn channel() -> broadcast::Sender<RelayEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Publish an event, ignoring the absence of subscribers.
pub(crate) fn emit(tx: &broadcast::Sender<RelayEvent>, event: RelayEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_strings() {
        assert_eq!(RelayEvent::ServiceOngoing.to_string(), "Service ongoing...");
        assert_eq!(RelayEvent::ServiceEnded.to_string(), "Service ended.");
        assert_eq!(
            RelayEvent::Connecting {
                host: "10.8.0.1".to_string(),
                port: 65001
            }
            .to_string(),
            "Connecting to 10.8.0.1:65001..."
        );
        assert_eq!(
            RelayEvent::RetryScheduled {
                error: "connection refused".to_string(),
                backoff: Duration::from_secs(2)
            }
            .to_string(),
            "connection refused; retrying in 2s"
        );
    }

    #[test]
    fn test_disconnect_reason_display() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let event = RelayEvent::PeerDisconnected {
            peer,
            reason: CloseReason::Idle,
        };
        assert_eq!(
            event.to_string(),
            "Connection with 127.0.0.1:4000 ended (idle timeout)"
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let tx = channel();
        emit(&tx, RelayEvent::ServiceEnded);

        let mut rx = tx.subscribe();
        emit(&tx, RelayEvent::ServiceOngoing);
        assert_eq!(rx.recv().await.unwrap(), RelayEvent::ServiceOngoing);
    }
}
