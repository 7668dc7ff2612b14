//! PEM encoding for X25519 public keys
//!
//! The helper process announces its public key by printing a PEM block to
//! stdout, mixed in with whatever else it logs. The functions here therefore
//! scan blocks out of arbitrary surrounding text rather than requiring a
//! clean PEM document.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use x25519_dalek::PublicKey;

use crate::error::CryptoError;

/// Opening marker of a public key block.
pub const BEGIN_MARKER: &str = "-----BEGIN PUBLIC KEY-----";

/// Closing marker of a public key block.
pub const END_MARKER: &str = "-----END PUBLIC KEY-----";

/// RFC 8410 SubjectPublicKeyInfo prefix for an X25519 public key.
const SPKI_PREFIX: [u8; 12] =
    [0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x03, 0x21, 0x00];

/// Maximum characters per base64 line in an encoded block.
const PEM_LINE_WIDTH: usize = 64;

/// Encode a public key as a PEM `PUBLIC KEY` block.
///
/// The body is the RFC 8410 SubjectPublicKeyInfo encoding, so the output is
/// readable by standard tooling as well as [`parse_public_key`].
pub fn encode_public_key(key: &PublicKey) -> String {
    let mut der = Vec::with_capacity(SPKI_PREFIX.len() + 32);
    der.extend_from_slice(&SPKI_PREFIX);
    der.extend_from_slice(key.as_bytes());

    let body = BASE64.encode(&der);
    let mut out = String::with_capacity(BEGIN_MARKER.len() + END_MARKER.len() + body.len() + 4);
    out.push_str(BEGIN_MARKER);
    out.push('\n');
    for chunk in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        let Ok(line) = core::str::from_utf8(chunk) else {
            unreachable!("base64 output is ASCII");
        };
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(END_MARKER);
    out
}

/// Find the first complete PEM public key block inside `text`.
///
/// Returns the block including both markers, or `None` when no complete
/// block is present. Text before, between, and after the markers is ignored.
pub fn find_block(text: &str) -> Option<&str> {
    let start = text.find(BEGIN_MARKER)?;
    let rest = &text[start..];
    let end = rest.find(END_MARKER)?;
    Some(&rest[..end + END_MARKER.len()])
}

/// Parse a PEM public key block into an X25519 public key.
///
/// Accepts both raw 32-byte bodies and RFC 8410 SubjectPublicKeyInfo
/// encodings.
pub fn parse_public_key(block: &str) -> Result<PublicKey, CryptoError> {
    let inner = block
        .trim()
        .strip_prefix(BEGIN_MARKER)
        .and_then(|rest| rest.strip_suffix(END_MARKER))
        .ok_or_else(|| CryptoError::InvalidPem { reason: "missing PEM markers".to_string() })?;

    let body: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    let der = BASE64
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::InvalidPem { reason: format!("base64 decode: {e}") })?;

    key_from_der(&der)
}

/// Decode a bare base64 public key.
///
/// This is the single-line form used for bearer tokens and command-line
/// arguments.
pub fn decode_base64_key(text: &str) -> Result<PublicKey, CryptoError> {
    let raw = BASE64
        .decode(text.trim().as_bytes())
        .map_err(|e| CryptoError::InvalidKey { reason: format!("base64 decode: {e}") })?;
    key_from_der(&raw)
}

fn key_from_der(der: &[u8]) -> Result<PublicKey, CryptoError> {
    let raw = if der.len() == 32 {
        der
    } else if der.len() == SPKI_PREFIX.len() + 32 && der[..SPKI_PREFIX.len()] == SPKI_PREFIX {
        &der[SPKI_PREFIX.len()..]
    } else {
        return Err(CryptoError::InvalidKey {
            reason: format!("unexpected key length {}", der.len()),
        });
    };

    let Ok(bytes) = <[u8; 32]>::try_from(raw) else {
        unreachable!("length checked above");
    };
    Ok(PublicKey::from(bytes))
}

#[cfg(test)]
mod tests {
    use x25519_dalek::StaticSecret;

    use super::*;

    fn test_key(seed: u8) -> PublicKey {
        PublicKey::from(&StaticSecret::from([seed; 32]))
    }

    #[test]
    fn encode_parse_roundtrip() {
        let key = test_key(7);
        let block = encode_public_key(&key);
        let parsed = parse_public_key(&block).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn encoded_block_has_markers() {
        let block = encode_public_key(&test_key(1));
        assert!(block.starts_with(BEGIN_MARKER));
        assert!(block.ends_with(END_MARKER));
    }

    #[test]
    fn find_block_inside_noise() {
        let key = test_key(3);
        let block = encode_public_key(&key);
        let text = format!("starting up...\nlistening on 8573\n{block}\nready\n");

        let found = find_block(&text).unwrap();
        assert_eq!(found, block);
        assert_eq!(parse_public_key(found).unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn find_block_requires_both_markers() {
        assert!(find_block("no pem here").is_none());
        assert!(find_block(BEGIN_MARKER).is_none());
        assert!(find_block("-----BEGIN PUBLIC KEY-----\nQUJD\n").is_none());
    }

    #[test]
    fn find_block_returns_first_of_many() {
        let first = encode_public_key(&test_key(4));
        let second = encode_public_key(&test_key(5));
        let text = format!("{first}\n{second}");

        assert_eq!(find_block(&text).unwrap(), first);
    }

    #[test]
    fn parse_accepts_raw_32_byte_body() {
        let key = test_key(9);
        let body = BASE64.encode(key.as_bytes());
        let block = format!("{BEGIN_MARKER}\n{body}\n{END_MARKER}");

        let parsed = parse_public_key(&block).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn parse_rejects_bad_base64() {
        let block = format!("{BEGIN_MARKER}\n!!!not base64!!!\n{END_MARKER}");
        let result = parse_public_key(&block);
        assert!(matches!(result, Err(CryptoError::InvalidPem { .. })));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        let body = BASE64.encode([0u8; 16]);
        let block = format!("{BEGIN_MARKER}\n{body}\n{END_MARKER}");
        let result = parse_public_key(&block);
        assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn decode_base64_key_roundtrip() {
        let key = test_key(11);
        let encoded = BASE64.encode(key.as_bytes());
        let decoded = decode_base64_key(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn decode_base64_key_tolerates_surrounding_whitespace() {
        let key = test_key(12);
        let encoded = format!("  {}\n", BASE64.encode(key.as_bytes()));
        let decoded = decode_base64_key(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), key.as_bytes());
    }
}
