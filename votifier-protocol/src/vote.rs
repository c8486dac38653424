//! The decoded vote record and its plaintext layout.

use crate::error::ProtocolError;
use crate::VOTE_MAGIC;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A vote notification as sent by a vote listing service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Name of the service the vote was cast on.
    pub service_name: String,
    /// Identifier of the voter.
    pub username: String,
    /// Address reported by the service (not the TCP peer).
    pub address: String,
    /// Timestamp as supplied by the service, passed through unparsed.
    #[serde(rename = "timeStamp")]
    pub timestamp: String,
}

impl Vote {
    /// Field names in wire order, after the magic.
    pub const FIELDS: [&'static str; 4] = ["serviceName", "username", "address", "timestamp"];

    pub fn new(
        service_name: impl Into<String>,
        username: impl Into<String>,
        address: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            username: username.into(),
            address: address.into(),
            timestamp: timestamp.into(),
        }
    }

    fn values(&self) -> [&str; 4] {
        [
            &self.service_name,
            &self.username,
            &self.address,
            &self.timestamp,
        ]
    }

    /// Parses a decrypted plaintext.
    ///
    /// Bytes after the fifth line are ignored, and the final newline may be
    /// missing.
    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(plaintext).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut lines = text.split('\n');

        let magic = lines.next().unwrap_or_default();
        if magic != VOTE_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic.to_string()));
        }

        let mut values: [&str; 4] = [""; 4];
        for (slot, name) in values.iter_mut().zip(Self::FIELDS) {
            let value = lines.next().ok_or(ProtocolError::MissingField(name))?;
            if value.is_empty() {
                return Err(ProtocolError::EmptyField(name));
            }
            *slot = value;
        }

        let [service_name, username, address, timestamp] = values;
        Ok(Self::new(service_name, username, address, timestamp))
    }

    /// Serializes the vote into its plaintext form.
    pub fn to_plaintext(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = String::with_capacity(
            VOTE_MAGIC.len() + 5 + self.values().iter().map(|v| v.len()).sum::<usize>(),
        );
        out.push_str(VOTE_MAGIC);
        out.push('\n');
        for (value, name) in self.values().into_iter().zip(Self::FIELDS) {
            if value.is_empty() {
                return Err(ProtocolError::EmptyField(name));
            }
            if value.contains('\n') {
                return Err(ProtocolError::FieldContainsNewline(name));
            }
            out.push_str(value);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vote (from:{} username:{} address:{} timeStamp:{})",
            self.service_name, self.username, self.address, self.timestamp
        )
    }
}
