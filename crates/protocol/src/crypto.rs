//! Key material and the per-message hybrid cipher.
//!
//! Each side of a protected connection generates an RSA keypair, publishes
//! the public half during the handshake, and from then on every message is
//! sealed under a fresh AES-128 key that is wrapped for the recipient with
//! RSA-OAEP. No symmetric key outlives the message it protects.

use aes::Aes128;
use eax::aead::{generic_array::GenericArray, AeadInPlace, KeyInit};
use eax::Eax;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

/// Modulus size of generated keys. Both peers must agree on it out of band.
pub const RSA_KEY_BITS: usize = 2048;

/// Length of the per-message AES key in bytes.
pub const SESSION_KEY_LENGTH: usize = 16;

/// Length of the EAX nonce in bytes.
pub const NONCE_LENGTH: usize = 16;

/// Length of the EAX authentication tag in bytes.
pub const TAG_LENGTH: usize = 16;

/// AES-128 in EAX mode with a 16-byte nonce and 16-byte tag.
type SessionCipher = Eax<Aes128>;

fn oaep() -> Oaep {
    Oaep::new::<Sha1>()
}

/// The local keypair for one connection attempt.
///
/// The private half never leaves the process; only [`KeyPair::public_key`]
/// is ever transmitted.
#[derive(Clone)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: PeerPublicKey,
}

impl KeyPair {
    /// Generates a new keypair with the deployment modulus size.
    pub fn generate() -> Result<Self> {
        Self::generate_with_bits(RSA_KEY_BITS)
    }

    /// Generates a new keypair with an explicit modulus size.
    pub fn generate_with_bits(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ProtocolError::Encryption(format!("key generation failed: {}", e)))?;
        let public_key = PeerPublicKey {
            key: RsaPublicKey::from(&private_key),
        };

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Returns the public half, suitable for announcing to a peer.
    pub fn public_key(&self) -> &PeerPublicKey {
        &self.public_key
    }

    /// Returns the modulus length in bytes, which is also the wrapped-key
    /// length of every envelope addressed to this keypair.
    pub fn modulus_len(&self) -> usize {
        self.private_key.size()
    }

    /// Recovers a session key wrapped for this keypair.
    fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        self.private_key
            .decrypt(oaep(), wrapped)
            .map_err(|e| ProtocolError::Authentication(format!("key unwrap failed: {}", e)))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("modulus_bits", &(self.modulus_len() * 8))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// The counterpart's public key, known only after a completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPublicKey {
    key: RsaPublicKey,
}

impl PeerPublicKey {
    /// Parses a PEM public key.
    ///
    /// Accepts SubjectPublicKeyInfo (`BEGIN PUBLIC KEY`) and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) encodings.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Encodes the key as a SubjectPublicKeyInfo PEM string.
    pub fn to_pem(&self) -> Result<String> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::InvalidPublicKey(e.to_string()))
    }

    /// Returns the modulus length in bytes.
    pub fn modulus_len(&self) -> usize {
        self.key.size()
    }

    fn wrap_key(&self, session_key: &[u8]) -> Result<Vec<u8>> {
        self.key
            .encrypt(&mut OsRng, oaep(), session_key)
            .map_err(|e| ProtocolError::Encryption(format!("key wrap failed: {}", e)))
    }
}

/// Seals `plaintext` for the holder of `peer`'s private key.
///
/// A fresh session key and nonce are drawn for every call, so sealing the
/// same plaintext twice never yields the same envelope.
pub fn protect(plaintext: &[u8], peer: &PeerPublicKey) -> Result<Envelope> {
    let mut session_key = [0u8; SESSION_KEY_LENGTH];
    let mut nonce = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut session_key);
    OsRng.fill_bytes(&mut nonce);

    let cipher = SessionCipher::new_from_slice(&session_key)
        .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut ciphertext)
        .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

    let wrapped_key = peer.wrap_key(&session_key)?;

    let mut tag_bytes = [0u8; TAG_LENGTH];
    tag_bytes.copy_from_slice(&tag);

    Ok(Envelope {
        wrapped_key,
        nonce,
        tag: tag_bytes,
        ciphertext,
    })
}

/// Opens an envelope addressed to `own`.
///
/// Fails with [`ProtocolError::Format`] when the wrapped key does not match
/// the receiver's modulus length, and with [`ProtocolError::Authentication`]
/// when the key cannot be unwrapped or the tag does not verify.
pub fn unprotect(envelope: &Envelope, own: &KeyPair) -> Result<Vec<u8>> {
    if envelope.wrapped_key.len() != own.modulus_len() {
        return Err(ProtocolError::Format(format!(
            "wrapped key is {} bytes, receiver modulus is {} bytes",
            envelope.wrapped_key.len(),
            own.modulus_len()
        )));
    }

    let session_key = own.unwrap_key(&envelope.wrapped_key)?;
    let cipher = SessionCipher::new_from_slice(&session_key)
        .map_err(|e| ProtocolError::Authentication(format!("bad session key: {}", e)))?;

    let mut plaintext = envelope.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(&envelope.nonce),
            b"",
            &mut plaintext,
            GenericArray::from_slice(&envelope.tag),
        )
        .map_err(|_| ProtocolError::Authentication("tag verification failed".to_string()))?;

    Ok(plaintext)
}
