//! One TCP connection and its protocol state.
//!
//! There is no framing on the wire: each socket read of up to
//! `recv_buffer` bytes is taken as one complete message, and each message is
//! written with a single `write_all`.

use std::net::SocketAddr;
use std::time::Duration;

use protocol::{
    rejection, Command, ConnectionState, Initiator, ProtocolError, Responder, Result,
    SecureChannel,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Result of waiting for a message.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One message.
    Data(Vec<u8>),
    /// The idle limit was exceeded without receiving anything.
    Idle,
    /// The peer closed the socket.
    Closed,
}

/// How payloads are protected on a ready connection.
#[derive(Debug)]
pub enum Channel {
    /// Plain YAML over an already trusted path.
    Plain,
    /// Sealed envelopes after a key exchange.
    Secure(SecureChannel),
}

impl Channel {
    /// Unwrap a received payload.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Channel::Plain => Ok(data.to_vec()),
            Channel::Secure(channel) => channel.open(data),
        }
    }

    /// Wrap a payload for sending.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Channel::Plain => Ok(plaintext.to_vec()),
            Channel::Secure(channel) => channel.seal(plaintext),
        }
    }

    /// Whether payloads are sealed.
    pub fn is_protected(&self) -> bool {
        matches!(self, Channel::Secure(_))
    }
}

/// An open connection with its lifecycle state.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    recv_buffer: usize,
    channel: Channel,
    state: ConnectionState,
}

impl Connection {
    /// Wrap an established stream.
    pub fn new(stream: TcpStream, peer: SocketAddr, recv_buffer: usize) -> Self {
        Self {
            stream,
            peer,
            recv_buffer,
            channel: Channel::Plain,
            state: ConnectionState::Idle,
        }
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(peer = %self.peer, from = %self.state, to = %next, "Connection state changed");
        self.state = next;
    }

    /// Use the connection without a key exchange.
    pub fn mark_ready(&mut self) {
        self.channel = Channel::Plain;
        self.transition(ConnectionState::Ready);
    }

    /// Wait for one message.
    ///
    /// Each read waits at most `per_read`. A read that times out counts as
    /// one empty read; once more than `idle_limit` empty reads happen in a
    /// row the wait ends with [`ReadOutcome::Idle`].
    pub async fn receive(&mut self, per_read: Duration, idle_limit: u32) -> Result<ReadOutcome> {
        let mut buf = vec![0u8; self.recv_buffer];
        let mut idle_count: u32 = 0;

        loop {
            match tokio::time::timeout(per_read, self.stream.read(&mut buf)).await {
                Err(_) => {
                    idle_count += 1;
                    if idle_count > idle_limit {
                        debug!(peer = %self.peer, idle_count, "Idle limit exceeded");
                        return Ok(ReadOutcome::Idle);
                    }
                }
                Ok(Ok(0)) => return Ok(ReadOutcome::Closed),
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    return Ok(ReadOutcome::Data(buf));
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Wait for one message under a single deadline.
    pub async fn receive_within(&mut self, deadline: Duration) -> Result<Vec<u8>> {
        match self.receive(deadline, 0).await? {
            ReadOutcome::Data(data) => Ok(data),
            ReadOutcome::Idle => Err(ProtocolError::Timeout(format!(
                "no reply from {} within {:?}",
                self.peer, deadline
            ))),
            ReadOutcome::Closed => Err(ProtocolError::ConnectionClosed(format!(
                "{} closed the connection",
                self.peer
            ))),
        }
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.recv_buffer {
            warn!(
                peer = %self.peer,
                len = data.len(),
                recv_buffer = self.recv_buffer,
                "Message larger than one read; the peer may truncate it"
            );
        }
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Act as the accepting side of the key exchange.
    ///
    /// A bad announcement is answered with the matching error notice before
    /// the error is returned.
    pub async fn accept_handshake(&mut self, per_read: Duration, idle_limit: u32) -> Result<()> {
        self.transition(ConnectionState::AwaitingPeerKey);

        let hello = match self.receive(per_read, idle_limit).await? {
            ReadOutcome::Data(data) => data,
            ReadOutcome::Idle => {
                return Err(ProtocolError::Timeout(
                    "no public key received".to_string(),
                ))
            }
            ReadOutcome::Closed => {
                return Err(ProtocolError::ConnectionClosed(
                    "peer closed during handshake".to_string(),
                ))
            }
        };

        let responder = tokio::task::spawn_blocking(Responder::generate)
            .await
            .map_err(|e| ProtocolError::HandshakeFailed(format!("key generation aborted: {}", e)))??;

        match responder.accept(&hello) {
            Ok((channel, reply)) => {
                self.write_raw(&reply).await?;
                self.channel = Channel::Secure(channel);
                self.transition(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                let notice = rejection(&e).encode()?;
                self.write_raw(&notice).await?;
                Err(e)
            }
        }
    }

    /// Act as the connecting side of the key exchange.
    pub async fn initiate_handshake(&mut self, deadline: Duration) -> Result<()> {
        self.transition(ConnectionState::AwaitingPeerKey);

        let initiator = tokio::task::spawn_blocking(Initiator::generate)
            .await
            .map_err(|e| ProtocolError::HandshakeFailed(format!("key generation aborted: {}", e)))??;

        self.write_raw(&initiator.hello()?).await?;
        let reply = self.receive_within(deadline).await?;
        let channel = initiator.complete(&reply)?;

        self.channel = Channel::Secure(channel);
        self.transition(ConnectionState::Ready);
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state.can_dispatch() {
            Ok(())
        } else {
            Err(ProtocolError::HandshakeIncomplete)
        }
    }

    /// Unwrap a received payload.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        self.channel.open(data)
    }

    /// Unwrap and decode a received command.
    pub fn open_command(&self, data: &[u8]) -> Result<Command> {
        Command::decode(&self.open(data)?)
    }

    /// Wrap and send a raw payload.
    pub async fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        let data = self.channel.seal(payload)?;
        self.write_raw(&data).await
    }

    /// Encode, wrap and send a command.
    pub async fn send_command(&mut self, command: &Command) -> Result<()> {
        debug!(
            peer = %self.peer,
            command = command.name(),
            protected = self.channel.is_protected(),
            "Sending"
        );
        self.send_bytes(&command.encode()?).await
    }

    /// Shut the socket down.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
        self.transition(ConnectionState::Closed);
    }
}
