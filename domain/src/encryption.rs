//! AES-256-GCM encryption of relayed events.
//!
//! Every event is sealed with a fresh random nonce and shipped to clients as an
//! [`EncryptedFrame`]: `nonce || ciphertext || tag`, base64url encoded for text
//! transports. The key is the raw 32 bytes of the `SECRET_KEY` setting, loaded
//! once at startup.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE as BASE64_URL, Engine};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Required length of the secret key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// 12-byte nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// 16-byte authentication tag appended by AES-GCM
pub const TAG_SIZE: usize = 16;

/// Errors that can occur during encryption/decryption operations
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Invalid secret key: must be exactly 32 bytes, got {0}")]
    InvalidKey(usize),

    #[error("Failed to generate a random nonce: {0}")]
    NonceGeneration(#[from] rand::Error),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or key is incorrect")]
    DecryptionFailed,

    #[error("Frame too short - expected at least 28 bytes (nonce and tag), got {0}")]
    FrameTooShort(usize),

    #[error("Failed to decode base64url frame: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),
}

/// The process-wide symmetric key. Immutable once constructed and never printed.
pub struct SecretKey(Secret<[u8; KEY_SIZE]>);

impl SecretKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKey(bytes.len()))?;
        Ok(Self(Secret::new(key)))
    }
}

impl FromStr for SecretKey {
    type Err = EncryptionError;

    /// Uses the UTF-8 bytes of `s` verbatim; no hex or base64 decoding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// A sealed event: `nonce || ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame(Vec<u8>);

impl EncryptedFrame {
    /// Encodes the frame with the URL-safe base64 alphabet (padded).
    pub fn encode(&self) -> String {
        BASE64_URL.encode(&self.0)
    }

    /// Decodes a base64url frame and checks it is long enough to hold a nonce and tag.
    pub fn decode(encoded: &str) -> Result<Self, EncryptionError> {
        Self::from_bytes(BASE64_URL.decode(encoded)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, EncryptionError> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(EncryptionError::FrameTooShort(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn nonce(&self) -> &[u8] {
        &self.0[..NONCE_SIZE]
    }

    /// Ciphertext followed by the authentication tag.
    pub fn sealed(&self) -> &[u8] {
        &self.0[NONCE_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// AES-256-GCM keyed by the relay's [`SecretKey`]. Safe to share between tasks.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256Gcm,
}

impl Cipher {
    pub fn new(key: &SecretKey) -> Self {
        Self {
            aead: Aes256Gcm::new(key.0.expose_secret().into()),
        }
    }

    /// Encrypts `plaintext` with a fresh random nonce and no associated data.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedFrame, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut nonce_bytes)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + sealed.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend(sealed);

        Ok(EncryptedFrame(combined))
    }

    /// Encrypts and base64url encodes in one step, as sent over SSE and the push hub.
    pub fn encrypt_encoded(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
        Ok(self.encrypt(plaintext)?.encode())
    }

    /// Opens a frame produced by [`Cipher::encrypt`].
    ///
    /// The relay never decrypts; this is the reference procedure clients follow.
    pub fn decrypt(&self, frame: &EncryptedFrame) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Nonce::from_slice(frame.nonce());
        self.aead
            .decrypt(nonce, frame.sealed())
            .map_err(|_| EncryptionError::DecryptionFailed)
    }

    pub fn decrypt_encoded(&self, encoded: &str) -> Result<Vec<u8>, EncryptionError> {
        self.decrypt(&EncryptedFrame::decode(encoded)?)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}
