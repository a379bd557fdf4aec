//! Command vocabulary exchanged between the control endpoint and the device host.
//!
//! On the wire every message is a flat YAML mapping holding exactly one
//! recognised key (`msg` may carry an auxiliary `comPort`). Inside the crate
//! the mapping is decoded once into [`Command`] and never looked up by string
//! again.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Status token returned by successful open and close requests.
pub const STATUS_OK: &str = "OK";

/// Notice sent when the first handshake message is not a public key.
pub const WRONG_MESSAGE_FORMAT: &str = "Wrong message format";

/// Notice sent when the announced public key cannot be imported.
pub const WRONG_RSA_KEY: &str = "Wrong RSA key";

// Request tokens carried under `msg`.
const GET_PORTS: &str = "GET_PORTS";
const OPEN_CONNECTION: &str = "OPEN_CONNECTION";
const CLOSE_CONNECTION: &str = "CLOSE_CONNECTION";
const CHECK: &str = "CHECK";

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Requests
    /// Enumerate device identifiers on the host.
    ListPorts,
    /// Make `device_id` the active device for this host.
    OpenConnection {
        /// Device identifier, e.g. `/dev/ttyUSB0`.
        device_id: String,
    },
    /// Drop the active device association.
    CloseConnection,
    /// Ask for the liveness status text.
    Check,

    // Responses
    /// Ordered list of device identifiers.
    Ports {
        /// Device identifiers in discovery order.
        devices: Vec<String>,
    },
    /// Status token answering [`Command::OpenConnection`].
    OpenConnectionStatus(String),
    /// Status token answering [`Command::CloseConnection`].
    CloseConnectionStatus(String),
    /// Opaque status text answering [`Command::Check`]. Empty means finished.
    CheckStatus(String),

    // Handshake and errors
    /// PEM-encoded public key, only valid during the handshake.
    PublicKeyAnnounce {
        /// SPKI PEM text.
        key: String,
    },
    /// Diagnostic returned instead of a regular response.
    ErrorNotice {
        /// Human-readable diagnostic.
        message: String,
    },
}

/// Flat wire mapping. Every field is optional so that presence can be counted.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
    #[serde(rename = "comPort", default, skip_serializing_if = "Option::is_none")]
    com_port: Option<String>,
    #[serde(rename = "comPorts", default, skip_serializing_if = "Option::is_none")]
    com_ports: Option<Vec<String>>,
    #[serde(
        rename = "openConnection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    open_connection: Option<String>,
    #[serde(
        rename = "closeConnection",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    close_connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WireMessage {
    fn recognised_keys(&self) -> usize {
        [
            self.msg.is_some(),
            self.com_ports.is_some(),
            self.open_connection.is_some(),
            self.close_connection.is_some(),
            self.check.is_some(),
            self.pubkey.is_some(),
            self.error.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

impl Command {
    /// Create an error notice.
    pub fn error_notice(message: impl Into<String>) -> Self {
        Command::ErrorNotice {
            message: message.into(),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ListPorts => "list_ports",
            Command::OpenConnection { .. } => "open_connection",
            Command::CloseConnection => "close_connection",
            Command::Check => "check",
            Command::Ports { .. } => "ports",
            Command::OpenConnectionStatus(_) => "open_connection_status",
            Command::CloseConnectionStatus(_) => "close_connection_status",
            Command::CheckStatus(_) => "check_status",
            Command::PublicKeyAnnounce { .. } => "public_key_announce",
            Command::ErrorNotice { .. } => "error_notice",
        }
    }

    /// Returns true for commands a control endpoint sends to a device host.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Command::ListPorts
                | Command::OpenConnection { .. }
                | Command::CloseConnection
                | Command::Check
        )
    }

    /// Returns true if `self` is an acceptable answer to `request`.
    ///
    /// An [`Command::ErrorNotice`] answers any request.
    pub fn answers(&self, request: &Command) -> bool {
        matches!(
            (request, self),
            (_, Command::ErrorNotice { .. })
                | (Command::ListPorts, Command::Ports { .. })
                | (
                    Command::OpenConnection { .. },
                    Command::OpenConnectionStatus(_)
                )
                | (Command::CloseConnection, Command::CloseConnectionStatus(_))
                | (Command::Check, Command::CheckStatus(_))
        )
    }

    /// Encode as a YAML mapping.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut wire = WireMessage::default();
        match self {
            Command::ListPorts => wire.msg = Some(GET_PORTS.to_string()),
            Command::OpenConnection { device_id } => {
                wire.msg = Some(OPEN_CONNECTION.to_string());
                wire.com_port = Some(device_id.clone());
            }
            Command::CloseConnection => wire.msg = Some(CLOSE_CONNECTION.to_string()),
            Command::Check => wire.msg = Some(CHECK.to_string()),
            Command::Ports { devices } => wire.com_ports = Some(devices.clone()),
            Command::OpenConnectionStatus(status) => wire.open_connection = Some(status.clone()),
            Command::CloseConnectionStatus(status) => {
                wire.close_connection = Some(status.clone())
            }
            Command::CheckStatus(status) => wire.check = Some(status.clone()),
            Command::PublicKeyAnnounce { key } => wire.pubkey = Some(key.clone()),
            Command::ErrorNotice { message } => wire.error = Some(message.clone()),
        }
        Ok(serde_yaml::to_string(&wire)?.into_bytes())
    }

    /// Decode a YAML mapping.
    ///
    /// Input that is not a UTF-8 YAML mapping fails with
    /// [`ProtocolError::Format`]. A mapping with no recognised key, several
    /// recognised keys or an unknown request token fails with
    /// [`ProtocolError::UnknownCommand`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ProtocolError::Format(format!("message is not UTF-8: {}", e)))?;
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        if !value.is_mapping() {
            return Err(ProtocolError::Format(
                "message is not a mapping".to_string(),
            ));
        }
        let wire: WireMessage = serde_yaml::from_value(value)?;

        match wire.recognised_keys() {
            0 => {
                return Err(ProtocolError::UnknownCommand(
                    "no recognised key".to_string(),
                ))
            }
            1 => {}
            n => {
                return Err(ProtocolError::UnknownCommand(format!(
                    "{} recognised keys, expected exactly one",
                    n
                )))
            }
        }

        if let Some(token) = wire.msg {
            return match token.as_str() {
                GET_PORTS => Ok(Command::ListPorts),
                OPEN_CONNECTION => match wire.com_port {
                    Some(device_id) => Ok(Command::OpenConnection { device_id }),
                    None => Err(ProtocolError::UnknownCommand(
                        "OPEN_CONNECTION without comPort".to_string(),
                    )),
                },
                CLOSE_CONNECTION => Ok(Command::CloseConnection),
                CHECK => Ok(Command::Check),
                other => Err(ProtocolError::UnknownCommand(format!("msg: {}", other))),
            };
        }

        let command = if let Some(devices) = wire.com_ports {
            Command::Ports { devices }
        } else if let Some(status) = wire.open_connection {
            Command::OpenConnectionStatus(status)
        } else if let Some(status) = wire.close_connection {
            Command::CloseConnectionStatus(status)
        } else if let Some(status) = wire.check {
            Command::CheckStatus(status)
        } else if let Some(key) = wire.pubkey {
            Command::PublicKeyAnnounce { key }
        } else if let Some(message) = wire.error {
            Command::ErrorNotice { message }
        } else {
            return Err(ProtocolError::UnknownCommand(
                "no recognised key".to_string(),
            ));
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Command> {
        vec![
            Command::ListPorts,
            Command::OpenConnection {
                device_id: "/dev/ttyUSB0".to_string(),
            },
            Command::CloseConnection,
            Command::Check,
            Command::Ports {
                devices: vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()],
            },
            Command::Ports { devices: vec![] },
            Command::OpenConnectionStatus(STATUS_OK.to_string()),
            Command::CloseConnectionStatus(STATUS_OK.to_string()),
            Command::CheckStatus("/dev/ttyUSB0\n".to_string()),
            Command::CheckStatus(String::new()),
            Command::PublicKeyAnnounce {
                key: "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n".to_string(),
            },
            Command::error_notice("could not open port /dev/ttyUSB9"),
        ]
    }

    #[test]
    fn test_every_variant_survives_the_wire() {
        for command in all_variants() {
            let bytes = command.encode().unwrap();
            assert_eq!(Command::decode(&bytes).unwrap(), command, "{:?}", command);
        }
    }

    #[test]
    fn test_encode_get_ports_wire_text() {
        let bytes = Command::ListPorts.encode().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "msg: GET_PORTS\n");
    }

    #[test]
    fn test_encode_open_connection_wire_text() {
        let bytes = Command::OpenConnection {
            device_id: "COM3".to_string(),
        }
        .encode()
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "msg: OPEN_CONNECTION\ncomPort: COM3\n"
        );
    }

    #[test]
    fn test_decode_flow_style_mapping() {
        let command = Command::decode(b"{msg: OPEN_CONNECTION, comPort: /dev/ttyUSB0}").unwrap();
        assert_eq!(
            command,
            Command::OpenConnection {
                device_id: "/dev/ttyUSB0".to_string()
            }
        );
    }

    #[test]
    fn test_decode_ports_response() {
        let command = Command::decode(b"comPorts:\n- /dev/ttyUSB0\n- /dev/ttyUSB1\n").unwrap();
        assert_eq!(
            command,
            Command::Ports {
                devices: vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()]
            }
        );
    }

    #[test]
    fn test_decode_empty_mapping_is_unknown() {
        let err = Command::decode(b"{}").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(_)));
    }

    #[test]
    fn test_decode_unrecognised_key_is_unknown() {
        let err = Command::decode(b"reboot: now\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(_)));
    }

    #[test]
    fn test_decode_unknown_token_is_unknown() {
        let err = Command::decode(b"msg: REBOOT\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(ref m) if m.contains("REBOOT")));
    }

    #[test]
    fn test_decode_two_keys_is_unknown() {
        let err = Command::decode(b"msg: CHECK\ncheck: ''\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(_)));
    }

    #[test]
    fn test_decode_open_without_port_is_unknown() {
        let err = Command::decode(b"msg: OPEN_CONNECTION\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(_)));
    }

    #[test]
    fn test_decode_port_without_msg_is_unknown() {
        let err = Command::decode(b"comPort: /dev/ttyUSB0\n").unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(_)));
    }

    #[test]
    fn test_decode_scalar_is_format_error() {
        let err = Command::decode(b"just some text").unwrap_err();
        assert!(matches!(err, ProtocolError::Format(_)));
    }

    #[test]
    fn test_decode_invalid_utf8_is_format_error() {
        let err = Command::decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::Format(_)));
    }

    #[test]
    fn test_decode_broken_yaml_is_format_error() {
        let err = Command::decode(b"{msg: GET_PORTS").unwrap_err();
        assert!(matches!(err, ProtocolError::Format(_)));
    }

    #[test]
    fn test_is_request() {
        assert!(Command::ListPorts.is_request());
        assert!(Command::Check.is_request());
        assert!(!Command::CheckStatus(String::new()).is_request());
        assert!(!Command::error_notice("x").is_request());
    }

    #[test]
    fn test_answers() {
        let ports = Command::Ports { devices: vec![] };
        assert!(ports.answers(&Command::ListPorts));
        assert!(!ports.answers(&Command::Check));
        assert!(Command::CheckStatus(String::new()).answers(&Command::Check));
        assert!(Command::error_notice("busy").answers(&Command::CloseConnection));
        assert!(!Command::ListPorts.answers(&Command::ListPorts));
    }
}
