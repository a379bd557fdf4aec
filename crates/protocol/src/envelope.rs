//! Envelope codec for protected messages.
//!
//! # Frame Format
//!
//! Each protected message is the concatenation of:
//! - K bytes: session key wrapped with the recipient's RSA key (K = modulus length)
//! - 16 bytes: EAX nonce
//! - 16 bytes: EAX authentication tag
//! - N bytes: ciphertext
//!
//! There are no delimiters or length prefixes. The receiver splits the
//! buffer using its own modulus length, so every peer in a deployment must
//! use the same key size.

use crate::crypto::{self, KeyPair, PeerPublicKey, NONCE_LENGTH, TAG_LENGTH};
use crate::error::{ProtocolError, Result};

/// A parsed protected frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Session key wrapped for the recipient.
    pub wrapped_key: Vec<u8>,
    /// EAX nonce.
    pub nonce: [u8; NONCE_LENGTH],
    /// EAX authentication tag.
    pub tag: [u8; TAG_LENGTH],
    /// Encrypted payload.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Smallest valid frame for a receiver with the given modulus length.
    pub fn min_frame_size(modulus_len: usize) -> usize {
        modulus_len + NONCE_LENGTH + TAG_LENGTH
    }

    /// Splits a received buffer into its fields.
    pub fn parse(data: &[u8], modulus_len: usize) -> Result<Self> {
        let min = Self::min_frame_size(modulus_len);
        if data.len() < min {
            return Err(ProtocolError::FrameTooShort {
                size: data.len(),
                min,
            });
        }

        let (wrapped_key, rest) = data.split_at(modulus_len);
        let (nonce, rest) = rest.split_at(NONCE_LENGTH);
        let (tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        nonce_bytes.copy_from_slice(nonce);
        let mut tag_bytes = [0u8; TAG_LENGTH];
        tag_bytes.copy_from_slice(tag);

        Ok(Self {
            wrapped_key: wrapped_key.to_vec(),
            nonce: nonce_bytes,
            tag: tag_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Serializes the envelope as `wrapped_key || nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(
            self.wrapped_key.len() + NONCE_LENGTH + TAG_LENGTH + self.ciphertext.len(),
        );
        output.extend_from_slice(&self.wrapped_key);
        output.extend_from_slice(&self.nonce);
        output.extend_from_slice(&self.tag);
        output.extend_from_slice(&self.ciphertext);
        output
    }
}

/// Seals `plaintext` for `recipient` and returns the wire bytes.
pub fn encode(plaintext: &[u8], recipient: &PeerPublicKey) -> Result<Vec<u8>> {
    crypto::protect(plaintext, recipient).map(|envelope| envelope.to_bytes())
}

/// Parses wire bytes addressed to `own` and returns the verified plaintext.
pub fn decode(data: &[u8], own: &KeyPair) -> Result<Vec<u8>> {
    let envelope = Envelope::parse(data, own.modulus_len())?;
    crypto::unprotect(&envelope, own)
}
