//! Public key exchange for the protected variant.
//!
//! The connecting side announces its public key in plaintext. The accepting
//! side imports it and answers with its own public key, already sealed for
//! the initiator. After that both sides hold a [`SecureChannel`] and every
//! message is an independently keyed envelope.
//!
//! ```text
//! Initiator                                Responder
//!    |  {pubkey: <A>}            (plain)       |
//!    | --------------------------------------> |
//!    |  envelope_A({pubkey: <B>})              |
//!    | <-------------------------------------- |
//!    |  envelope_B(request)                    |
//!    | --------------------------------------> |
//!    |  envelope_A(response)                   |
//!    | <-------------------------------------- |
//! ```
//!
//! Commands can only be sealed through a [`SecureChannel`], which is only
//! produced by a completed exchange.

use crate::crypto::{KeyPair, PeerPublicKey};
use crate::envelope;
use crate::error::{ProtocolError, Result};
use crate::messages::{Command, WRONG_MESSAGE_FORMAT, WRONG_RSA_KEY};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, nothing exchanged yet.
    Idle,
    /// Protected variant: waiting for the peer's public key.
    AwaitingPeerKey,
    /// Commands may be exchanged.
    Ready,
    /// Socket closed.
    Closed,
}

impl ConnectionState {
    /// Returns true if commands may be dispatched in this state.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::AwaitingPeerKey => "awaiting-peer-key",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Connecting side of the exchange.
#[derive(Debug)]
pub struct Initiator {
    keypair: KeyPair,
}

impl Initiator {
    /// Start an exchange with an existing keypair.
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Start an exchange with a freshly generated keypair.
    pub fn generate() -> Result<Self> {
        Ok(Self::new(KeyPair::generate()?))
    }

    /// The plaintext public key announcement to send first.
    pub fn hello(&self) -> Result<Vec<u8>> {
        announce(&self.keypair)
    }

    /// Consume the responder's reply and finish the exchange.
    ///
    /// An error notice from the responder is surfaced as
    /// [`ProtocolError::HandshakeFailed`] carrying the notice text.
    pub fn complete(self, reply: &[u8]) -> Result<SecureChannel> {
        let plaintext = match envelope::decode(reply, &self.keypair) {
            Ok(plaintext) => plaintext,
            // Rejections are sent unprotected.
            Err(e) => match Command::decode(reply) {
                Ok(Command::ErrorNotice { message }) => {
                    return Err(ProtocolError::HandshakeFailed(message))
                }
                _ => return Err(e),
            },
        };

        match Command::decode(&plaintext)? {
            Command::PublicKeyAnnounce { key } => {
                let peer = PeerPublicKey::from_pem(&key)?;
                Ok(SecureChannel::new(self.keypair, peer))
            }
            Command::ErrorNotice { message } => Err(ProtocolError::HandshakeFailed(message)),
            other => Err(ProtocolError::HandshakeFailed(format!(
                "expected public key, got {}",
                other.name()
            ))),
        }
    }
}

/// Accepting side of the exchange.
#[derive(Debug)]
pub struct Responder {
    keypair: KeyPair,
}

impl Responder {
    /// Start an exchange with an existing keypair.
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Start an exchange with a freshly generated keypair.
    pub fn generate() -> Result<Self> {
        Ok(Self::new(KeyPair::generate()?))
    }

    /// Consume the initiator's announcement.
    ///
    /// Returns the channel and the sealed reply to send back. On error the
    /// caller should send [`rejection`] for the error and close.
    pub fn accept(self, hello: &[u8]) -> Result<(SecureChannel, Vec<u8>)> {
        let key = match Command::decode(hello) {
            Ok(Command::PublicKeyAnnounce { key }) => key,
            Ok(other) => {
                return Err(ProtocolError::HandshakeFailed(format!(
                    "expected public key, got {}",
                    other.name()
                )))
            }
            Err(e) => return Err(ProtocolError::HandshakeFailed(e.to_string())),
        };
        let peer = PeerPublicKey::from_pem(&key)?;
        let reply = envelope::encode(&announce(&self.keypair)?, &peer)?;
        Ok((SecureChannel::new(self.keypair, peer), reply))
    }
}

/// The notice a responder sends back when [`Responder::accept`] fails.
pub fn rejection(error: &ProtocolError) -> Command {
    match error {
        ProtocolError::InvalidPublicKey(_) => Command::error_notice(WRONG_RSA_KEY),
        _ => Command::error_notice(WRONG_MESSAGE_FORMAT),
    }
}

fn announce(keypair: &KeyPair) -> Result<Vec<u8>> {
    Command::PublicKeyAnnounce {
        key: keypair.public_key().to_pem()?,
    }
    .encode()
}

/// Established protected channel: own keypair plus the peer's public key.
#[derive(Debug, Clone)]
pub struct SecureChannel {
    keypair: KeyPair,
    peer: PeerPublicKey,
}

impl SecureChannel {
    fn new(keypair: KeyPair, peer: PeerPublicKey) -> Self {
        Self { keypair, peer }
    }

    /// The counterpart's public key.
    pub fn peer_key(&self) -> &PeerPublicKey {
        &self.peer
    }

    /// Seal a plaintext for the peer under a fresh session key.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        envelope::encode(plaintext, &self.peer)
    }

    /// Open an envelope addressed to us.
    pub fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        envelope::decode(data, &self.keypair)
    }

    /// Seal a command.
    pub fn seal_command(&self, command: &Command) -> Result<Vec<u8>> {
        self.seal(&command.encode()?)
    }

    /// Open and decode a command.
    pub fn open_command(&self, data: &[u8]) -> Result<Command> {
        Command::decode(&self.open(data)?)
    }
}
