//! Text encoding of RSA keys.
//!
//! Vote listing sites are configured with the receiver's public key as a
//! single base64 string of its X.509 SubjectPublicKeyInfo DER encoding. The
//! private key uses the same scheme over PKCS#8 DER. Whitespace inside the
//! text is ignored so keys pasted with line breaks still decode.

use crate::error::ProtocolError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// Encodes a public key as base64 SubjectPublicKeyInfo DER.
pub fn encode_public_key(key: &RsaPublicKey) -> Result<String, ProtocolError> {
    let der = key
        .to_public_key_der()
        .map_err(|e| ProtocolError::KeyEncoding(e.to_string()))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Decodes a public key from base64 SubjectPublicKeyInfo DER.
pub fn decode_public_key(text: &str) -> Result<RsaPublicKey, ProtocolError> {
    let der = decode_base64(text)?;
    RsaPublicKey::from_public_key_der(&der).map_err(|e| ProtocolError::KeyEncoding(e.to_string()))
}

/// Encodes a private key as base64 PKCS#8 DER.
pub fn encode_private_key(key: &RsaPrivateKey) -> Result<String, ProtocolError> {
    let der = key
        .to_pkcs8_der()
        .map_err(|e| ProtocolError::KeyEncoding(e.to_string()))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Decodes a private key from base64 PKCS#8 DER.
pub fn decode_private_key(text: &str) -> Result<RsaPrivateKey, ProtocolError> {
    let der = decode_base64(text)?;
    RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| ProtocolError::KeyEncoding(e.to_string()))
}

/// Decodes base64 text, skipping any whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ProtocolError::KeyEncoding(format!("invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_key_text_roundtrip() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);

        let public_text = encode_public_key(&public).unwrap();
        let private_text = encode_private_key(&private).unwrap();
        assert!(!public_text.contains('\n'));

        assert_eq!(decode_public_key(&public_text).unwrap(), public);
        let decoded = decode_private_key(&private_text).unwrap();
        assert_eq!(RsaPublicKey::from(&decoded), public);
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = RsaPublicKey::from(&private);
        let text = encode_public_key(&public).unwrap();

        let wrapped: String = text
            .as_bytes()
            .chunks(64)
            .map(|chunk| format!("{}\n", std::str::from_utf8(chunk).unwrap()))
            .collect();
        assert_eq!(decode_public_key(&wrapped).unwrap(), public);
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let err = decode_public_key("not base64 at all!!").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_decode_rejects_non_key_der() {
        let text = STANDARD.encode(b"definitely not DER");
        assert!(matches!(
            decode_private_key(&text),
            Err(ProtocolError::KeyEncoding(_))
        ));
        assert!(matches!(
            decode_public_key(&text),
            Err(ProtocolError::KeyEncoding(_))
        ));
    }
}
