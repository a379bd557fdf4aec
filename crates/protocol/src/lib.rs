//! # RemoSerial Protocol Library
//!
//! Wire protocol and cryptographic primitives for driving a serial device
//! attached to a remote host.
//!
//! ## Overview
//!
//! - **Command Protocol**: the closed request/response vocabulary, encoded as
//!   a flat YAML mapping with exactly one recognised key
//! - **Hybrid Cipher**: RSA-2048 keypairs, with every message sealed under a
//!   fresh AES-128-EAX key wrapped by the recipient's public key
//! - **Envelope Codec**: the on-wire layout of a sealed message
//! - **Handshake**: the public key exchange that yields a [`SecureChannel`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             Command (YAML)              │  msg / comPorts / check / ...
//! ├─────────────────────────────────────────┤
//! │        Hybrid Cipher (optional)         │  RSA-OAEP + AES-EAX per message
//! ├─────────────────────────────────────────┤
//! │            Envelope layout              │  key || nonce || tag || data
//! ├─────────────────────────────────────────┤
//! │                  TCP                    │  one read = one message
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Command, Initiator, Responder};
//!
//! let initiator = Initiator::generate().unwrap();
//! let responder = Responder::generate().unwrap();
//!
//! let hello = initiator.hello().unwrap();
//! let (server, reply) = responder.accept(&hello).unwrap();
//! let client = initiator.complete(&reply).unwrap();
//!
//! let request = client.seal_command(&Command::ListPorts).unwrap();
//! assert_eq!(server.open_command(&request).unwrap(), Command::ListPorts);
//! ```
//!
//! ## Modules
//!
//! - [`crypto`]: Keypairs and per-message protection
//! - [`envelope`]: Sealed frame layout and codec
//! - [`messages`]: Command vocabulary
//! - [`handshake`]: Public key exchange and connection state
//! - [`error`]: Error types

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod messages;

pub use crypto::{
    protect, unprotect, KeyPair, PeerPublicKey, NONCE_LENGTH, RSA_KEY_BITS, SESSION_KEY_LENGTH,
    TAG_LENGTH,
};
pub use envelope::Envelope;
pub use error::{ProtocolError, Result};
pub use handshake::{rejection, ConnectionState, Initiator, Responder, SecureChannel};
pub use messages::{Command, STATUS_OK, WRONG_MESSAGE_FORMAT, WRONG_RSA_KEY};
