//! Connection Listener: the accepting role.
//!
//! A listener is a single-shot service instance. It serves one peer at a
//! time and stops for good once no peer connects within the accept timeout;
//! callers restart it if they want to keep listening.

use std::net::SocketAddr;
use std::time::Duration;

use protocol::{Command, ProtocolError, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ReadOutcome};
use crate::events::{self, CloseReason, RelayEvent};
use crate::router::{CommandRouter, RouterError};

/// Runtime settings for a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Address to bind.
    pub bind_address: String,
    /// Port to bind. 0 picks a free port.
    pub port: u16,
    /// How long to wait for a peer before the listener stops.
    pub accept_timeout: Duration,
    /// Deadline of each read on an accepted connection.
    pub read_timeout: Duration,
    /// Empty reads tolerated in a row before the connection is closed.
    pub idle_limit: u32,
    /// Bytes per read.
    pub recv_buffer: usize,
    /// Require the key exchange.
    pub protected: bool,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::config::DEFAULT_PORT,
            accept_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_millis(500),
            idle_limit: 10,
            recv_buffer: 1024,
            protected: false,
        }
    }
}

/// What accepted connections are used for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeMode {
    /// Decode and dispatch commands. Without `keep_open` the connection is
    /// closed after the first response.
    Command { keep_open: bool },
    /// Forward every payload to `device` and send back its reply line.
    Bridge { device: String },
}

/// A bound listener.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: ListenerOptions,
    event_tx: broadcast::Sender<RelayEvent>,
    shutdown_token: CancellationToken,
}

impl Listener {
    /// Bind the listening socket.
    pub async fn bind(options: ListenerOptions) -> Result<Self> {
        let listener =
            TcpListener::bind((options.bind_address.as_str(), options.port)).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, protected = options.protected, "Listener bound");

        Ok(Self {
            listener,
            local_addr,
            options,
            event_tx: events::channel(),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.event_tx.subscribe()
    }

    /// Token that stops the listener when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Wait for the next peer. None means the accept timeout elapsed or the
    /// listener was shut down.
    async fn accept_peer(&self) -> Result<Option<Connection>> {
        events::emit(
            &self.event_tx,
            RelayEvent::Listening {
                addr: self.local_addr,
            },
        );

        let accepted = tokio::select! {
            _ = self.shutdown_token.cancelled() => return Ok(None),
            accepted = tokio::time::timeout(self.options.accept_timeout, self.listener.accept()) => accepted,
        };

        match accepted {
            Ok(Ok((stream, peer))) => {
                info!(peer = %peer, "Peer connected");
                events::emit(&self.event_tx, RelayEvent::PeerConnected { peer });
                Ok(Some(Connection::new(stream, peer, self.options.recv_buffer)))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                info!(
                    timeout_secs = self.options.accept_timeout.as_secs(),
                    "No peer connected, stopping listener"
                );
                events::emit(&self.event_tx, RelayEvent::ListenerStopped);
                Ok(None)
            }
        }
    }

    async fn finish(&self, conn: Connection, reason: CloseReason) {
        let peer = conn.peer();
        conn.close().await;
        info!(peer = %peer, reason = %reason, "Connection closed");
        events::emit(&self.event_tx, RelayEvent::PeerDisconnected { peer, reason });
    }

    /// Serve peers one after another until the accept timeout elapses.
    ///
    /// Connection-level failures close that connection only.
    pub async fn serve(&self, router: &CommandRouter, mode: &ServeMode) -> Result<()> {
        info!(addr = %self.local_addr, ?mode, "Serving");

        loop {
            let Some(mut conn) = self.accept_peer().await? else {
                return Ok(());
            };

            let result = tokio::select! {
                _ = self.shutdown_token.cancelled() => Ok(CloseReason::Failed("listener shut down".to_string())),
                result = self.serve_connection(&mut conn, router, mode) => result,
            };

            let reason = match result {
                Ok(reason) => reason,
                Err(e) => {
                    log_connection_error(&e);
                    CloseReason::Failed(e.to_string())
                }
            };
            self.finish(conn, reason).await;

            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }
        }
    }

    async fn establish(&self, conn: &mut Connection) -> Result<()> {
        if self.options.protected {
            conn.accept_handshake(self.options.read_timeout, self.options.idle_limit)
                .await?;
            info!(peer = %conn.peer(), "Handshake complete");
            events::emit(
                &self.event_tx,
                RelayEvent::HandshakeComplete { peer: conn.peer() },
            );
        } else {
            conn.mark_ready();
        }
        Ok(())
    }

    async fn serve_connection(
        &self,
        conn: &mut Connection,
        router: &CommandRouter,
        mode: &ServeMode,
    ) -> Result<CloseReason> {
        self.establish(conn).await?;

        loop {
            let data = match conn
                .receive(self.options.read_timeout, self.options.idle_limit)
                .await?
            {
                ReadOutcome::Data(data) => data,
                ReadOutcome::Idle => return Ok(CloseReason::Idle),
                ReadOutcome::Closed => return Ok(CloseReason::PeerClosed),
            };
            debug!(peer = %conn.peer(), len = data.len(), "Received message");

            match mode {
                ServeMode::Command { keep_open } => {
                    let response = match conn.open_command(&data) {
                        Ok(command) => {
                            let name = command.name();
                            let response = router.dispatch(command).await;
                            events::emit(&self.event_tx, RelayEvent::CommandHandled { command: name });
                            response
                        }
                        Err(e) if e.is_recoverable() => {
                            warn!(peer = %conn.peer(), error = %e, "Unrecognised command");
                            Command::error_notice(e.to_string())
                        }
                        Err(e) => return Err(e),
                    };
                    conn.send_command(&response).await?;

                    if !keep_open {
                        return Ok(CloseReason::Completed);
                    }
                }
                ServeMode::Bridge { device } => {
                    let payload = conn.open(&data)?;
                    let reply = match router.bridge().transact(device, &payload).await {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(device = %device, error = %e, "Device transaction failed");
                            events::emit(
                                &self.event_tx,
                                RelayEvent::DeviceError {
                                    device: device.clone(),
                                    message: e.to_string(),
                                },
                            );
                            RouterError::from(e).to_notice().encode()?
                        }
                    };
                    conn.send_bytes(&reply).await?;
                }
            }
        }
    }

    /// Wait for one peer, send it `command` and return its answer.
    ///
    /// Messages that do not answer `command` are skipped. The wait for the
    /// answer follows the same idle rules as [`Listener::serve`].
    ///
    /// Cancelling the shutdown token aborts the wait with
    /// [`ProtocolError::ConnectionClosed`].
    pub async fn issue(&self, command: &Command) -> Result<Command> {
        let Some(mut conn) = self.accept_peer().await? else {
            if self.shutdown_token.is_cancelled() {
                return Err(shut_down());
            }
            return Err(ProtocolError::Timeout(format!(
                "no peer connected within {:?}",
                self.options.accept_timeout
            )));
        };

        let result = tokio::select! {
            _ = self.shutdown_token.cancelled() => Err(shut_down()),
            result = self.issue_on(&mut conn, command) => result,
        };
        let reason = match &result {
            Ok(_) => CloseReason::Completed,
            Err(e) => {
                log_connection_error(e);
                CloseReason::Failed(e.to_string())
            }
        };
        self.finish(conn, reason).await;
        result
    }

    async fn issue_on(&self, conn: &mut Connection, command: &Command) -> Result<Command> {
        self.establish(conn).await?;
        conn.send_command(command).await?;

        loop {
            let data = match conn
                .receive(self.options.read_timeout, self.options.idle_limit)
                .await?
            {
                ReadOutcome::Data(data) => data,
                ReadOutcome::Idle => {
                    return Err(ProtocolError::Timeout(format!(
                        "no answer to {} from {}",
                        command.name(),
                        conn.peer()
                    )))
                }
                ReadOutcome::Closed => {
                    return Err(ProtocolError::ConnectionClosed(format!(
                        "{} closed before answering",
                        conn.peer()
                    )))
                }
            };

            match conn.open_command(&data) {
                Ok(response) if response.answers(command) => {
                    events::emit(
                        &self.event_tx,
                        RelayEvent::CommandHandled {
                            command: command.name(),
                        },
                    );
                    return Ok(response);
                }
                Ok(other) => debug!(response = other.name(), "Skipping unrelated message"),
                Err(e) if e.is_recoverable() => debug!(error = %e, "Skipping unrecognised message"),
                Err(e) => return Err(e),
            }
        }
    }
}

fn shut_down() -> ProtocolError {
    ProtocolError::ConnectionClosed("listener shut down".to_string())
}

fn log_connection_error(e: &ProtocolError) {
    match e {
        ProtocolError::Authentication(_) => {
            error!(error = %e, "Message failed authentication, connection dropped")
        }
        e if e.is_transport() => info!(error = %e, "Connection lost"),
        _ => warn!(error = %e, "Connection closed after protocol error"),
    }
}
