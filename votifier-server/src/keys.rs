//! RSA key pair generation, persistence and loading.
//!
//! Keys live in two files under the key directory:
//! - `public.key`: base64 of the X.509 SubjectPublicKeyInfo DER encoding
//! - `private.key`: base64 of the PKCS#8 DER encoding
//!
//! Each file is written to a temporary sibling, synced and renamed into
//! place. The private key is renamed first; a crash between the two renames
//! leaves a lone private key, which [`KeyStore::load`] and
//! [`KeyStore::load_or_generate`] reject instead of treating as valid.

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use votifier_protocol::key::{decode_base64, encode_private_key, encode_public_key};
use votifier_protocol::{VoteDecoder, VoteEncoder};

/// File name of the persisted public key.
pub const PUBLIC_KEY_FILE: &str = "public.key";

/// File name of the persisted private key.
pub const PRIVATE_KEY_FILE: &str = "private.key";

/// Errors from key generation, persistence and loading.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("key file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("incomplete key pair in {}: {missing} is missing", .dir.display())]
    Incomplete { dir: PathBuf, missing: &'static str },

    #[error("malformed key file {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid key in {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("key generation failed: {0}")]
    Generate(rsa::Error),

    #[error("key encoding failed: {0}")]
    Encode(String),

    #[error("public key does not match private key")]
    Mismatch,
}

impl KeyStoreError {
    /// Returns whether the failure came from key material rather than file access.
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            KeyStoreError::InvalidKey { .. }
                | KeyStoreError::Generate(_)
                | KeyStoreError::Encode(_)
                | KeyStoreError::Mismatch
        )
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        KeyStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An RSA key pair. Immutable once created.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate(bits: usize) -> Result<Self, KeyStoreError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits).map_err(KeyStoreError::Generate)?;
        Ok(Self::from_private(private))
    }

    /// Builds a key pair from a private key, deriving the public half.
    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    fn from_parts(private: RsaPrivateKey, public: RsaPublicKey) -> Result<Self, KeyStoreError> {
        if RsaPublicKey::from(&private) != public {
            return Err(KeyStoreError::Mismatch);
        }
        Ok(Self { private, public })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }

    /// Returns a decoder for blocks sent to this key.
    pub fn decoder(&self) -> VoteDecoder {
        VoteDecoder::new(self.private.clone())
    }

    /// Returns an encoder producing blocks for this key.
    pub fn encoder(&self) -> VoteEncoder {
        VoteEncoder::new(self.public.clone())
    }

    /// Public key in the text form given to vote listing sites.
    pub fn public_key_base64(&self) -> Result<String, KeyStoreError> {
        encode_public_key(&self.public).map_err(|e| KeyStoreError::Encode(e.to_string()))
    }

    /// SHA-256 of the public key DER, as lowercase hex.
    pub fn fingerprint(&self) -> Result<String, KeyStoreError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| KeyStoreError::Encode(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Directory holding one persisted key pair.
#[derive(Debug, Clone)]
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    /// Returns whether both key files are present.
    pub fn exists(&self) -> bool {
        self.public_key_path().is_file() && self.private_key_path().is_file()
    }

    /// Writes both halves of the key pair.
    pub fn persist(&self, pair: &KeyPair) -> Result<(), KeyStoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| KeyStoreError::io(&self.dir, e))?;

        let private_text =
            encode_private_key(&pair.private).map_err(|e| KeyStoreError::Encode(e.to_string()))?;
        let public_text = pair.public_key_base64()?;

        write_atomic(&self.private_key_path(), private_text.as_bytes(), true)?;
        write_atomic(&self.public_key_path(), public_text.as_bytes(), false)?;
        sync_dir(&self.dir);

        tracing::debug!("Persisted key pair to {}", self.dir.display());
        Ok(())
    }

    /// Reads both halves of the key pair back.
    pub fn load(&self) -> Result<KeyPair, KeyStoreError> {
        let public_path = self.public_key_path();
        let private_path = self.private_key_path();

        let public_der = read_key_file(&public_path)?;
        let private_der = read_key_file(&private_path)?;

        let public =
            RsaPublicKey::from_public_key_der(&public_der).map_err(|e| KeyStoreError::InvalidKey {
                path: public_path,
                reason: e.to_string(),
            })?;
        let private =
            RsaPrivateKey::from_pkcs8_der(&private_der).map_err(|e| KeyStoreError::InvalidKey {
                path: private_path,
                reason: e.to_string(),
            })?;

        KeyPair::from_parts(private, public)
    }

    /// Loads the key pair, generating and persisting one on first run.
    ///
    /// Fails without touching the directory if only one of the two files
    /// exists.
    pub fn load_or_generate(&self, bits: usize) -> Result<KeyPair, KeyStoreError> {
        let has_public = self.public_key_path().exists();
        let has_private = self.private_key_path().exists();

        match (has_public, has_private) {
            (true, true) => self.load(),
            (false, false) => {
                tracing::info!(
                    "No RSA key pair found, generating a {}-bit pair in {}",
                    bits,
                    self.dir.display()
                );
                let pair = KeyPair::generate(bits)?;
                self.persist(&pair)?;
                Ok(pair)
            }
            (true, false) => Err(KeyStoreError::Incomplete {
                dir: self.dir.clone(),
                missing: PRIVATE_KEY_FILE,
            }),
            (false, true) => Err(KeyStoreError::Incomplete {
                dir: self.dir.clone(),
                missing: PUBLIC_KEY_FILE,
            }),
        }
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyStoreError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => KeyStoreError::Missing(path.to_path_buf()),
        _ => KeyStoreError::io(path, e),
    })?;
    decode_base64(&text).map_err(|e| KeyStoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_atomic(path: &Path, contents: &[u8], secret: bool) -> Result<(), KeyStoreError> {
    let tmp = path.with_extension("key.tmp");

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if secret {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = secret;

    let mut file = options.open(&tmp).map_err(|e| KeyStoreError::io(&tmp, e))?;
    file.write_all(contents).map_err(|e| KeyStoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| KeyStoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| KeyStoreError::io(path, e))
}

/// Best effort: make the renames durable.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
