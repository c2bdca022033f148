//! Error types for the `domain` layer.
use crate::encryption::EncryptionError;
use std::error::Error as StdError;
use std::fmt;

/// Top-level domain error type.
/// Errors are modeled as a tree with `domain::error::Error` at the root holding an
/// `error_kind` that says which layer the failure belongs to, and an optional `source`
/// holding the original error. `web` only looks at the `error_kind` to pick an HTTP
/// status code, so lower layers stay free to define their own error detail.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: DomainErrorKind,
}

/// Enum representing the major categories of errors that can occur in the `domain` layer.
#[derive(Debug, PartialEq)]
pub enum DomainErrorKind {
    Internal(InternalErrorKind),
    External(ExternalErrorKind),
}

/// Failures caused by the relay itself.
#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    Config,
    Encryption,
}

/// Failures caused by whoever is talking to the relay.
#[derive(Debug, PartialEq)]
pub enum ExternalErrorKind {
    /// The inbound request could not be read (truncated body, over the size limit, ...)
    Request,
}

impl Error {
    pub fn invalid_request(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error {
            source: Some(source.into()),
            error_kind: DomainErrorKind::External(ExternalErrorKind::Request),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Domain Error: {:?}: {source}", self.error_kind),
            None => write!(f, "Domain Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<EncryptionError> for Error {
    fn from(err: EncryptionError) -> Self {
        let error_kind = match err {
            EncryptionError::InvalidKey(_) => DomainErrorKind::Internal(InternalErrorKind::Config),
            _ => DomainErrorKind::Internal(InternalErrorKind::Encryption),
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_maps_to_config_error() {
        let err: Error = EncryptionError::InvalidKey(5).into();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Config)
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_cipher_failures_map_to_encryption_error() {
        let err: Error = EncryptionError::DecryptionFailed.into();
        assert_eq!(
            err.error_kind,
            DomainErrorKind::Internal(InternalErrorKind::Encryption)
        );
    }

    #[test]
    fn test_invalid_request_is_external() {
        let err = Error::invalid_request("body stream ended early");
        assert_eq!(
            err.error_kind,
            DomainErrorKind::External(ExternalErrorKind::Request)
        );
        assert!(err.to_string().contains("body stream ended early"));
    }
}
