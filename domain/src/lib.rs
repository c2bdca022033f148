//! Domain types shared by every transport of the relay: the cipher that seals
//! events and the error tree the web layer translates into HTTP responses.

pub mod encryption;
pub mod error;

pub use encryption::{Cipher, EncryptedFrame, EncryptionError, SecretKey};
