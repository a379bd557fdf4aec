//! Reconnect Loop: the dialling role.
//!
//! Each iteration checks the link, connects, optionally exchanges keys,
//! performs exactly one request/response turn and closes. Failed attempts are
//! retried after a fixed backoff; a down link ends the loop.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use protocol::{Command, ProtocolError, Result};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::Connection;
use crate::events::{self, RelayEvent};
use crate::host::Host;
use crate::router::CommandRouter;

/// Runtime settings for a reconnect loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOptions {
    /// Host to dial.
    pub host: String,
    /// Port to dial.
    pub port: u16,
    /// Bound on the TCP connect.
    pub connect_timeout: Duration,
    /// Bound on each reply.
    pub read_timeout: Duration,
    /// Pause after a failed attempt.
    pub retry_backoff: Duration,
    /// Bytes per read.
    pub recv_buffer: usize,
    /// Perform the key exchange.
    pub protected: bool,
    /// Interface whose carrier gates the loop.
    pub link_interface: Option<String>,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::config::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(2),
            recv_buffer: 1024,
            protected: false,
            link_interface: Some(crate::config::DEFAULT_LINK_INTERFACE.to_string()),
        }
    }
}

/// The requesting side of a turn.
pub trait Turn: Send {
    /// The request to send on the next connection.
    fn next_request(&mut self) -> Command;

    /// Inspect the answer. `Continue` carries the pause before the next turn.
    fn on_response(&mut self, response: &Command) -> ControlFlow<(), Duration>;
}

/// Send one request and stop at the first answer.
#[derive(Debug, Clone)]
pub struct SingleRequest {
    request: Command,
}

impl SingleRequest {
    pub fn new(request: Command) -> Self {
        Self { request }
    }
}

impl Turn for SingleRequest {
    fn next_request(&mut self) -> Command {
        self.request.clone()
    }

    fn on_response(&mut self, _response: &Command) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Poll `Check` until the status text is empty.
pub struct CheckPoller {
    interval: Duration,
    event_tx: broadcast::Sender<RelayEvent>,
}

impl CheckPoller {
    /// Poll every `interval`, reporting progress on `event_tx`.
    pub fn new(interval: Duration, event_tx: broadcast::Sender<RelayEvent>) -> Self {
        Self { interval, event_tx }
    }
}

impl Turn for CheckPoller {
    fn next_request(&mut self) -> Command {
        Command::Check
    }

    fn on_response(&mut self, response: &Command) -> ControlFlow<(), Duration> {
        match response {
            Command::CheckStatus(status) if !status.is_empty() => {
                events::emit(&self.event_tx, RelayEvent::ServiceOngoing);
                ControlFlow::Continue(self.interval)
            }
            Command::CheckStatus(_) => {
                events::emit(&self.event_tx, RelayEvent::ServiceEnded);
                ControlFlow::Break(())
            }
            _ => ControlFlow::Break(()),
        }
    }
}

/// What the loop does on each connection.
pub enum TurnRole {
    /// Receive a request, dispatch it locally, reply.
    Agent(Arc<CommandRouter>),
    /// Send a request, receive the answer.
    Requester(Box<dyn Turn>),
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// A requester turn finished with this answer.
    Finished(Command),
    /// The link check reported the interface down.
    LinkDown,
    /// The shutdown token was cancelled.
    Cancelled,
}

enum TurnOutcome {
    Done(Command),
    Again(Duration),
}

/// Dials the control endpoint until told to stop.
pub struct ReconnectLoop {
    options: ReconnectOptions,
    host: Arc<dyn Host>,
    event_tx: broadcast::Sender<RelayEvent>,
    shutdown_token: CancellationToken,
}

impl ReconnectLoop {
    /// Create a loop.
    pub fn new(options: ReconnectOptions, host: Arc<dyn Host>) -> Self {
        Self {
            options,
            host,
            event_tx: events::channel(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.event_tx.subscribe()
    }

    /// Sender for turns that report their own progress.
    pub fn event_sender(&self) -> broadcast::Sender<RelayEvent> {
        self.event_tx.clone()
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until a requester turn finishes, the link goes down or the loop
    /// is cancelled.
    pub async fn run(&self, role: &mut TurnRole) -> LoopExit {
        loop {
            if self.shutdown_token.is_cancelled() {
                return LoopExit::Cancelled;
            }

            if let Some(interface) = &self.options.link_interface {
                if !self.host.link_up(interface) {
                    warn!(interface = %interface, "Link down, stopping");
                    events::emit(
                        &self.event_tx,
                        RelayEvent::LinkDown {
                            interface: interface.clone(),
                        },
                    );
                    return LoopExit::LinkDown;
                }
            }

            events::emit(
                &self.event_tx,
                RelayEvent::Connecting {
                    host: self.options.host.clone(),
                    port: self.options.port,
                },
            );

            let attempt = tokio::select! {
                _ = self.shutdown_token.cancelled() => return LoopExit::Cancelled,
                attempt = self.attempt(role) => attempt,
            };

            let pause = match attempt {
                Ok(TurnOutcome::Done(response)) => return LoopExit::Finished(response),
                Ok(TurnOutcome::Again(pause)) => pause,
                Err(e) => {
                    if e.is_transport() {
                        info!(error = %e, "Attempt failed");
                    } else if matches!(e, ProtocolError::Authentication(_)) {
                        error!(error = %e, "Reply failed authentication");
                    } else {
                        warn!(error = %e, "Turn failed");
                    }
                    events::emit(
                        &self.event_tx,
                        RelayEvent::RetryScheduled {
                            error: e.to_string(),
                            backoff: self.options.retry_backoff,
                        },
                    );
                    self.options.retry_backoff
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => return LoopExit::Cancelled,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
    }

    async fn attempt(&self, role: &mut TurnRole) -> Result<TurnOutcome> {
        let target = (self.options.host.as_str(), self.options.port);
        let stream = tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| {
                ProtocolError::Timeout(format!(
                    "connect to {}:{} timed out",
                    self.options.host, self.options.port
                ))
            })??;
        let peer = stream.peer_addr()?;
        debug!(peer = %peer, "Connected");

        let mut conn = Connection::new(stream, peer, self.options.recv_buffer);
        let outcome = self.turn(&mut conn, role).await;
        conn.close().await;
        outcome
    }

    async fn turn(&self, conn: &mut Connection, role: &mut TurnRole) -> Result<TurnOutcome> {
        if self.options.protected {
            conn.initiate_handshake(self.options.read_timeout).await?;
            debug!(peer = %conn.peer(), "Handshake complete");
        } else {
            conn.mark_ready();
        }

        match role {
            TurnRole::Agent(router) => {
                let data = conn.receive_within(self.options.read_timeout).await?;
                let response = match conn.open_command(&data) {
                    Ok(command) => router.dispatch(command).await,
                    Err(e) if e.is_recoverable() => {
                        warn!(error = %e, "Unrecognised command");
                        Command::error_notice(e.to_string())
                    }
                    Err(e) => return Err(e),
                };
                conn.send_command(&response).await?;
                Ok(TurnOutcome::Again(Duration::ZERO))
            }
            TurnRole::Requester(turn) => {
                let request = turn.next_request();
                conn.send_command(&request).await?;

                let response = loop {
                    let data = conn.receive_within(self.options.read_timeout).await?;
                    match conn.open_command(&data) {
                        Ok(response) if response.answers(&request) => break response,
                        Ok(other) => debug!(response = other.name(), "Skipping unrelated message"),
                        Err(e) if e.is_recoverable() => {
                            debug!(error = %e, "Skipping unrecognised message")
                        }
                        Err(e) => return Err(e),
                    }
                };

                match turn.on_response(&response) {
                    ControlFlow::Break(()) => Ok(TurnOutcome::Done(response)),
                    ControlFlow::Continue(pause) => Ok(TurnOutcome::Again(pause)),
                }
            }
        }
    }
}
