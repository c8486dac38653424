//! Protocol error types and error kinds.

use std::fmt;
use thiserror::Error;

/// Errors raised while decrypting, parsing or encrypting vote blocks.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("block size mismatch: expected {expected} bytes, got {actual}")]
    BlockSize { expected: usize, actual: usize },

    #[error("unable to decrypt vote block: {0}")]
    Decrypt(rsa::Error),

    #[error("invalid UTF-8 in vote payload")]
    InvalidUtf8,

    #[error("invalid magic: expected 'VOTE', got {0:?}")]
    InvalidMagic(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("empty field: {0}")]
    EmptyField(&'static str),

    #[error("field {0} contains a line break")]
    FieldContainsNewline(&'static str),

    #[error("vote payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unable to encrypt vote block: {0}")]
    Encrypt(rsa::Error),

    #[error("invalid key encoding: {0}")]
    KeyEncoding(String),

    #[error("invalid greeting: {0:?}")]
    InvalidGreeting(String),
}

impl ProtocolError {
    /// Returns the kind of failure, used to tell undecryptable traffic
    /// apart from decryptable but malformed traffic.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::BlockSize { .. } | ProtocolError::Decrypt(_) => ErrorKind::Decrypt,
            ProtocolError::InvalidUtf8
            | ProtocolError::InvalidMagic(_)
            | ProtocolError::MissingField(_)
            | ProtocolError::EmptyField(_)
            | ProtocolError::FieldContainsNewline(_)
            | ProtocolError::PayloadTooLarge { .. }
            | ProtocolError::InvalidGreeting(_) => ErrorKind::Malformed,
            ProtocolError::Encrypt(_) | ProtocolError::KeyEncoding(_) => ErrorKind::Crypto,
        }
    }
}

/// Coarse classification of protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The block could not be decrypted with the private key.
    Decrypt,
    /// The block decrypted but does not hold a well-formed vote.
    Malformed,
    /// Key material or the encryption primitive failed.
    Crypto,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Decrypt => write!(f, "DECRYPT"),
            ErrorKind::Malformed => write!(f, "MALFORMED"),
            ErrorKind::Crypto => write!(f, "CRYPTO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProtocolError::BlockSize {
                expected: 256,
                actual: 12
            }
            .kind(),
            ErrorKind::Decrypt
        );
        assert_eq!(
            ProtocolError::Decrypt(rsa::Error::Decryption).kind(),
            ErrorKind::Decrypt
        );
        assert_eq!(
            ProtocolError::InvalidMagic("NOTVOTE".to_string()).kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            ProtocolError::MissingField("timestamp").kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            ProtocolError::KeyEncoding("bad".to_string()).kind(),
            ErrorKind::Crypto
        );
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::Decrypt), "DECRYPT");
        assert_eq!(format!("{}", ErrorKind::Malformed), "MALFORMED");
        assert_eq!(format!("{}", ErrorKind::Crypto), "CRYPTO");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::BlockSize {
            expected: 256,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("256") && msg.contains("100"));

        let err = ProtocolError::InvalidMagic("NOTVOTE".to_string());
        assert!(err.to_string().contains("NOTVOTE"));

        let err = ProtocolError::EmptyField("username");
        assert!(err.to_string().contains("username"));

        let err = ProtocolError::PayloadTooLarge { size: 300, max: 245 };
        assert!(err.to_string().contains("245"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }
}
