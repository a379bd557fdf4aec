//! Network module for the two connection roles.
//!
//! - [`listener`]: the accepting side, serving commands or bridging a device
//! - [`reconnect`]: the dialling side, retrying one turn per connection
//!
//! Both share [`connection::Connection`], which owns the socket, the
//! optional [`protocol::SecureChannel`] and the [`protocol::ConnectionState`].

pub mod connection;
pub mod listener;
pub mod reconnect;

// Re-export key types
pub use connection::{Channel, Connection, ReadOutcome};
pub use listener::{Listener, ListenerOptions, ServeMode};
pub use reconnect::{
    CheckPoller, LoopExit, ReconnectLoop, ReconnectOptions, SingleRequest, Turn, TurnRole,
};
