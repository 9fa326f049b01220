//! Field-level encryption for stored provider credentials.
//!
//! Each secret is sealed with AES-256-GCM under the process-wide key using a
//! fresh 16-byte nonce, and serialized as an envelope string:
//!
//! ```text
//! <nonce_hex>:<auth_tag_hex>:<ciphertext_hex>
//! ```
//!
//! The key is immutable after startup, so a single `FieldCipher` is shared
//! between handlers without synchronization.

use std::collections::BTreeMap;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce, Tag};
use once_cell::sync::Lazy;
use regex::Regex;

/// AES-256-GCM with a 128-bit nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// Shortest possible envelope: two 32-char hex groups, two colons, empty ciphertext
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN * 2 + TAG_LEN * 2 + 2;

static ENVELOPE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]+:[0-9a-fA-F]+:[0-9a-fA-F]*$").expect("envelope regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailure,

    #[error("encryption failed")]
    EncryptionFailure,

    #[error("decrypted value is not valid UTF-8")]
    InvalidPlaintext,
}

/// Returns true if the value has the three-part hex shape of an envelope
/// and is long enough to carry a full nonce and tag. Does not decrypt.
pub fn looks_like_envelope(value: &str) -> bool {
    value.len() >= MIN_ENVELOPE_LEN && ENVELOPE_SHAPE.is_match(value)
}

#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm16,
}

impl FieldCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm16>::from_slice(key);
        Self {
            cipher: Aes256Gcm16::new(key),
        }
    }

    /// Encrypt a UTF-8 string. Two calls with the same input yield different envelopes.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm16::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailure)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let parts: Vec<&str> = envelope.split(':').collect();
        if parts.len() != 3 {
            return Err(CryptoError::MalformedEnvelope(format!(
                "expected 3 components, found {}",
                parts.len()
            )));
        }

        let nonce_bytes = decode_component("nonce", parts[0])?;
        let tag_bytes = decode_component("tag", parts[1])?;
        let mut buffer = decode_component("ciphertext", parts[2])?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "nonce must be {} bytes, found {}",
                NONCE_LEN,
                nonce_bytes.len()
            )));
        }
        if tag_bytes.len() != TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "tag must be {} bytes, found {}",
                TAG_LEN,
                tag_bytes.len()
            )));
        }

        let nonce = Nonce::<U16>::from_slice(&nonce_bytes);
        let tag = Tag::<U16>::from_slice(&tag_bytes);
        self.cipher
            .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
            .map_err(|_| CryptoError::AuthenticationFailure)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::InvalidPlaintext)
    }

    /// Encrypt the named fields of a credential map in place. Fields not
    /// listed, or not present, are left untouched.
    pub fn encrypt_fields(
        &self,
        fields: &mut BTreeMap<String, String>,
        names: &[&str],
    ) -> Result<(), CryptoError> {
        for name in names {
            if let Some(value) = fields.get_mut(*name) {
                *value = self.encrypt(value)?;
            }
        }
        Ok(())
    }

    /// Decrypt the named fields, reporting the outcome per field. Never fails
    /// as a whole; the caller decides whether a partial result is usable.
    pub fn decrypt_fields(
        &self,
        fields: &BTreeMap<String, String>,
        names: &[&str],
    ) -> DecryptedFields {
        let mut outcomes = BTreeMap::new();
        for name in names {
            if let Some(value) = fields.get(*name) {
                let outcome = match self.decrypt(value) {
                    Ok(plain) => FieldDecryption::Decrypted(plain),
                    Err(e) => FieldDecryption::Failed(e),
                };
                outcomes.insert(name.to_string(), outcome);
            }
        }
        DecryptedFields {
            source: fields.clone(),
            outcomes,
        }
    }
}

fn decode_component(which: &str, hex_str: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(hex_str)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("{} is not valid hex: {}", which, e)))
}

/// Outcome of decrypting one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDecryption {
    Decrypted(String),
    Failed(CryptoError),
}

/// Per-field decryption results alongside the source map they came from
#[derive(Debug, Clone)]
pub struct DecryptedFields {
    source: BTreeMap<String, String>,
    outcomes: BTreeMap<String, FieldDecryption>,
}

impl DecryptedFields {
    /// The decrypted value of a field, if it was present and decrypted cleanly
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.outcomes.get(name) {
            Some(FieldDecryption::Decrypted(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &CryptoError)> {
        self.outcomes.iter().filter_map(|(k, v)| match v {
            FieldDecryption::Failed(e) => Some((k.as_str(), e)),
            FieldDecryption::Decrypted(_) => None,
        })
    }

    /// Collapse into a plain map. Fields that failed to decrypt keep their
    /// stored ciphertext and are logged, so the rest of the map stays usable.
    #[allow(dead_code)]
    pub fn into_lenient_map(self) -> BTreeMap<String, String> {
        let mut map = self.source;
        for (name, outcome) in self.outcomes {
            match outcome {
                FieldDecryption::Decrypted(plain) => {
                    map.insert(name, plain);
                }
                FieldDecryption::Failed(e) => {
                    log::warn!("[VAULT] Could not decrypt field '{}', leaving stored value: {}", name, e);
                }
            }
        }
        map
    }
}
