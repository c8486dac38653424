//! # votifier-protocol
//!
//! Wire protocol implementation for votifier.
//!
//! A vote service connects over TCP, reads a single greeting line and sends
//! exactly one RSA-encrypted block. The block's plaintext is:
//!
//! ```text
//! VOTE\n<serviceName>\n<username>\n<address>\n<timestamp>\n
//! ```
//!
//! This crate provides:
//! - The decoded [`Vote`] value
//! - Block decryption, parsing and encryption ([`VoteDecoder`], [`VoteEncoder`])
//! - Text encoding of RSA keys as exchanged with vote services
//! - The greeting line and protocol error kinds

pub mod codec;
pub mod error;
pub mod key;
pub mod vote;

pub use codec::{VoteDecoder, VoteEncoder};
pub use error::{ErrorKind, ProtocolError};
pub use vote::Vote;

/// Version advertised in the greeting line.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix of the greeting line sent by the server.
pub const GREETING_PREFIX: &str = "VOTIFIER ";

/// Magic literal opening every vote plaintext.
pub const VOTE_MAGIC: &str = "VOTE";

/// Default port for the vote receiver.
pub const DEFAULT_PORT: u16 = 8192;

/// Default RSA modulus size in bits.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Bytes of PKCS#1 v1.5 padding overhead per block.
pub const PKCS1_PADDING_OVERHEAD: usize = 11;

/// Returns the greeting line, including the trailing newline.
pub fn greeting() -> String {
    format!("{}{}\n", GREETING_PREFIX, VERSION)
}

/// Parses a greeting line and returns the advertised version.
pub fn parse_greeting(line: &str) -> Result<&str, ProtocolError> {
    let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
    match line.strip_prefix(GREETING_PREFIX) {
        Some(version) if !version.is_empty() => Ok(version),
        _ => Err(ProtocolError::InvalidGreeting(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_format() {
        let line = greeting();
        assert!(line.starts_with("VOTIFIER "));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_parse_greeting() {
        assert_eq!(parse_greeting(&greeting()).unwrap(), VERSION);
        assert_eq!(parse_greeting("VOTIFIER 1.9\r\n").unwrap(), "1.9");
        assert_eq!(parse_greeting("VOTIFIER 2.0").unwrap(), "2.0");
    }

    #[test]
    fn test_parse_greeting_rejects_other_services() {
        assert!(matches!(
            parse_greeting("SSH-2.0-OpenSSH\n"),
            Err(ProtocolError::InvalidGreeting(_))
        ));
        assert!(parse_greeting("VOTIFIER \n").is_err());
        assert!(parse_greeting("").is_err());
    }
}
