//! Session state for sealing and opening channel messages

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{error::CryptoError, pem};

/// Label mixed into HKDF expansion for domain separation.
const KDF_LABEL: &[u8] = b"tether key exchange v1";

/// Size of the per-message HKDF salt (bytes).
pub const KDF_NONCE_SIZE: usize = 32;

/// Size of the AES-GCM nonce (bytes).
pub const AEAD_NONCE_SIZE: usize = 12;

/// Hash family used for HKDF expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Suite {
    /// HKDF-SHA256, the default pairing.
    #[default]
    Sha256,
    /// HKDF-SHA384.
    Sha384,
    /// HKDF-SHA512.
    Sha512,
}

/// Builds a fresh [`Session`] at the start of each supervision cycle.
pub type SessionFactory = Arc<dyn Fn() -> Result<Session, CryptoError> + Send + Sync>;

/// A factory producing random X25519 sessions with the given suite.
pub fn suite_factory(suite: Suite) -> SessionFactory {
    Arc::new(move || Ok(Session::generate(suite)))
}

/// A sealed message as carried on the wire.
///
/// Binary fields are base64 strings in the JSON encoding. `additional_data`
/// travels in the clear but is covered by the GCM authentication tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedMessage {
    /// Per-message HKDF salt.
    #[serde(with = "base64_bytes")]
    pub kdf_nonce: Vec<u8>,
    /// AES-GCM nonce.
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Ciphertext including the 16-byte GCM tag.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    /// Authenticated plaintext metadata (a timestamp in practice).
    pub additional_data: String,
}

/// One end of a key-exchange pairing.
///
/// Holds the local X25519 identity for the lifetime of a supervision cycle.
/// The peer's key arrives later: as a command-line bearer token on the
/// helper side, or scanned out of helper stdout on the supervisor side.
/// Until then, sealing and opening fail with
/// [`CryptoError::MissingExternalKey`].
pub struct Session {
    suite: Suite,
    secret: StaticSecret,
    public: PublicKey,
    external: Option<PublicKey>,
    shared: Option<Zeroizing<[u8; 32]>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("suite", &self.suite)
            .field("public", &BASE64.encode(self.public.as_bytes()))
            .field("paired", &self.shared.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Generate a session with a fresh random identity.
    pub fn generate(suite: Suite) -> Self {
        Self::from_secret(suite, StaticSecret::random_from_rng(OsRng))
    }

    /// Build a session from existing secret material.
    ///
    /// Exists for deterministic tests; production callers should prefer
    /// [`Session::generate`].
    pub fn from_secret_bytes(suite: Suite, secret: [u8; 32]) -> Self {
        Self::from_secret(suite, StaticSecret::from(secret))
    }

    fn from_secret(suite: Suite, secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        Self { suite, secret, public, external: None, shared: None }
    }

    /// The suite this session derives message keys with.
    pub fn suite(&self) -> Suite {
        self.suite
    }

    /// The local public key as single-line base64.
    ///
    /// This form doubles as the bearer token handed to the helper process.
    pub fn local_public_key(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// The local public key as a PEM block.
    pub fn public_key_pem(&self) -> String {
        pem::encode_public_key(&self.public)
    }

    /// The peer's public key, if one has been installed.
    pub fn external_public_key(&self) -> Option<&PublicKey> {
        self.external.as_ref()
    }

    /// Whether the peer's public key has been learned yet.
    pub fn is_paired(&self) -> bool {
        self.shared.is_some()
    }

    /// Install the peer's public key from text.
    ///
    /// Accepts either a PEM block (anywhere inside `text`) or bare base64.
    /// Replaces any previously installed peer key; messages sealed under the
    /// old pairing will no longer open.
    pub fn set_external_public_key(&mut self, text: &str) -> Result<(), CryptoError> {
        let key = if text.contains(pem::BEGIN_MARKER) {
            let block = pem::find_block(text).ok_or_else(|| CryptoError::InvalidPem {
                reason: "incomplete PEM block".to_string(),
            })?;
            pem::parse_public_key(block)?
        } else {
            pem::decode_base64_key(text)?
        };
        self.set_external_key(key)
    }

    /// Install the peer's public key directly.
    ///
    /// Rejects keys whose Diffie-Hellman output is non-contributory, leaving
    /// any previous pairing untouched.
    pub fn set_external_key(&mut self, key: PublicKey) -> Result<(), CryptoError> {
        let shared = self.secret.diffie_hellman(&key);
        if !shared.was_contributory() {
            return Err(CryptoError::WeakExternalKey);
        }
        self.external = Some(key);
        self.shared = Some(Zeroizing::new(*shared.as_bytes()));
        Ok(())
    }

    /// Seal `plaintext` with fresh random nonces.
    pub fn seal(
        &self,
        plaintext: &[u8],
        additional_data: &str,
    ) -> Result<SealedMessage, CryptoError> {
        let mut kdf_nonce = [0u8; KDF_NONCE_SIZE];
        let mut nonce = [0u8; AEAD_NONCE_SIZE];
        OsRng.fill_bytes(&mut kdf_nonce);
        OsRng.fill_bytes(&mut nonce);
        self.seal_with_nonces(plaintext, additional_data, kdf_nonce, nonce)
    }

    /// Seal `plaintext` with caller-provided nonces.
    ///
    /// Nonces must never repeat for the same pairing. Exists for
    /// deterministic tests; production callers go through [`Session::seal`].
    pub fn seal_with_nonces(
        &self,
        plaintext: &[u8],
        additional_data: &str,
        kdf_nonce: [u8; KDF_NONCE_SIZE],
        nonce: [u8; AEAD_NONCE_SIZE],
    ) -> Result<SealedMessage, CryptoError> {
        let key = self.derive_key(&kdf_nonce)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let payload = Payload { msg: plaintext, aad: additional_data.as_bytes() };

        let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), payload) else {
            unreachable!("AES-GCM encryption cannot fail with valid inputs");
        };

        Ok(SealedMessage {
            kdf_nonce: kdf_nonce.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
            additional_data: additional_data.to_string(),
        })
    }

    /// Open a sealed message, verifying ciphertext and additional data.
    ///
    /// # Errors
    ///
    /// - `MissingExternalKey`: no pairing has been established
    /// - `DecryptionFailed`: wrong pairing, tampered ciphertext, or tampered
    ///   additional data
    pub fn open(&self, sealed: &SealedMessage) -> Result<Vec<u8>, CryptoError> {
        if sealed.nonce.len() != AEAD_NONCE_SIZE {
            return Err(CryptoError::DecryptionFailed {
                reason: format!("nonce length {} is not {AEAD_NONCE_SIZE}", sealed.nonce.len()),
            });
        }

        let key = self.derive_key(&sealed.kdf_nonce)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
        let payload =
            Payload { msg: sealed.ciphertext.as_slice(), aad: sealed.additional_data.as_bytes() };

        cipher.decrypt(Nonce::from_slice(&sealed.nonce), payload).map_err(|_| {
            CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
        })
    }

    fn derive_key(&self, kdf_nonce: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let shared = self.shared.as_ref().ok_or(CryptoError::MissingExternalKey)?;
        let mut key = Zeroizing::new([0u8; 32]);

        let expanded = match self.suite {
            Suite::Sha256 => Hkdf::<Sha256>::new(Some(kdf_nonce), shared.as_slice())
                .expand(KDF_LABEL, key.as_mut_slice()),
            Suite::Sha384 => Hkdf::<Sha384>::new(Some(kdf_nonce), shared.as_slice())
                .expand(KDF_LABEL, key.as_mut_slice()),
            Suite::Sha512 => Hkdf::<Sha512>::new(Some(kdf_nonce), shared.as_slice())
                .expand(KDF_LABEL, key.as_mut_slice()),
        };
        let Ok(()) = expanded else {
            unreachable!("32 bytes is a valid HKDF output length");
        };

        Ok(key)
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
    }
}
