//! Encoder and decoder for RSA-encrypted vote blocks.
//!
//! Blocks use PKCS#1 v1.5 encryption padding, so one block is exactly as
//! long as the key modulus and carries at most `modulus - 11` bytes of
//! plaintext. Padding is randomized: encrypting the same vote twice yields
//! different blocks.

use crate::error::ProtocolError;
use crate::vote::Vote;
use crate::PKCS1_PADDING_OVERHEAD;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Decrypts and parses vote blocks with the receiver's private key.
#[derive(Clone)]
pub struct VoteDecoder {
    key: RsaPrivateKey,
}

impl VoteDecoder {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Number of bytes in one encrypted block.
    pub fn block_size(&self) -> usize {
        self.key.size()
    }

    /// Applies the RSA decryption transform to one block.
    pub fn decrypt(&self, block: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let expected = self.block_size();
        if block.len() != expected {
            return Err(ProtocolError::BlockSize {
                expected,
                actual: block.len(),
            });
        }
        self.key
            .decrypt(Pkcs1v15Encrypt, block)
            .map_err(ProtocolError::Decrypt)
    }

    /// Parses a decrypted plaintext into a vote.
    pub fn parse(plaintext: &[u8]) -> Result<Vote, ProtocolError> {
        Vote::from_plaintext(plaintext)
    }

    /// Decrypts then parses one block.
    pub fn decode(&self, block: &[u8]) -> Result<Vote, ProtocolError> {
        let plaintext = self.decrypt(block)?;
        Self::parse(&plaintext)
    }
}

impl std::fmt::Debug for VoteDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteDecoder")
            .field("block_size", &self.block_size())
            .finish_non_exhaustive()
    }
}

/// Serializes and encrypts votes with a receiver's public key.
#[derive(Debug, Clone)]
pub struct VoteEncoder {
    key: RsaPublicKey,
}

impl VoteEncoder {
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Number of bytes in one encrypted block.
    pub fn block_size(&self) -> usize {
        self.key.size()
    }

    /// Largest plaintext that fits in one block.
    pub fn max_plaintext(&self) -> usize {
        self.block_size().saturating_sub(PKCS1_PADDING_OVERHEAD)
    }

    /// Serializes the vote and encrypts it with fresh random padding.
    pub fn encrypt(&self, vote: &Vote) -> Result<Vec<u8>, ProtocolError> {
        let plaintext = vote.to_plaintext()?;
        let max = self.max_plaintext();
        if plaintext.len() > max {
            return Err(ProtocolError::PayloadTooLarge {
                size: plaintext.len(),
                max,
            });
        }
        self.key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, &plaintext)
            .map_err(ProtocolError::Encrypt)
    }
}
