// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-field authenticated encryption.
//!
//! Each leaf is sealed independently with AES-256-GCM under a fresh random
//! 96-bit nonce. The nonce, ciphertext and tag are stored side by side and
//! serialized as base64 strings:
//!
//! ```json
//! { "nonce": "...", "value": "...", "tag": "..." }
//! ```
//!
//! Opening a field verifies the tag before any plaintext is released. A wrong
//! key, a malformed key and tampered data all surface as the same
//! [`CipherError`] kinds to callers outside this module.

use std::fmt;

use base64ct::{Base64Url, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// Length of a raw key in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// The supplied key is not 32 URL-safe base64 encoded bytes.
    #[error("key is not a valid secret key")]
    InvalidKey,

    /// Tag verification failed: wrong key or modified data.
    #[error("integrity check failed")]
    Integrity,

    /// The system random source failed.
    #[error("random number generator failure")]
    Rng,
}

// =============================================================================
// Secret Key
// =============================================================================

/// A 256-bit symmetric key.
///
/// The only recovery path for stored secrets. Never logged: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    /// Generate a fresh key from the system random source.
    pub fn generate() -> Result<Self, CipherError> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| CipherError::Rng)?;
        Ok(Self(bytes))
    }

    /// Decode a key from its URL-safe base64 form.
    pub fn parse(encoded: &str) -> Result<Self, CipherError> {
        let bytes = Base64Url::decode_vec(encoded.trim()).map_err(|_| CipherError::InvalidKey)?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CipherError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// URL-safe base64 form, as shown to the operator.
    pub fn encode(&self) -> String {
        Base64Url::encode_string(&self.0)
    }

    fn aead_key(&self) -> Result<LessSafeKey, CipherError> {
        UnboundKey::new(&AES_256_GCM, &self.0)
            .map(LessSafeKey::new)
            .map_err(|_| CipherError::InvalidKey)
    }

    /// Seal one UTF-8 value under a fresh nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, CipherError> {
        let key = self.aead_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Rng)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CipherError::Integrity)?;

        Ok(EncryptedField {
            nonce: nonce_bytes.to_vec(),
            ciphertext: in_out,
            tag: tag.as_ref().to_vec(),
        })
    }

    /// Verify and open one field. No plaintext is returned unless the tag matches.
    pub fn decrypt(&self, field: &EncryptedField) -> Result<String, CipherError> {
        let key = self.aead_key()?;

        if field.tag.len() != AES_256_GCM.tag_len() {
            return Err(CipherError::Integrity);
        }
        let nonce =
            Nonce::try_assume_unique_for_key(&field.nonce).map_err(|_| CipherError::Integrity)?;

        let mut in_out = Vec::with_capacity(field.ciphertext.len() + field.tag.len());
        in_out.extend_from_slice(&field.ciphertext);
        in_out.extend_from_slice(&field.tag);

        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CipherError::Integrity)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Integrity)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

// =============================================================================
// Encrypted Field
// =============================================================================

/// One encrypted leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedField {
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(rename = "value", with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub tag: Vec<u8>,
}

mod base64_bytes {
    use base64ct::{Base64, Encoding};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Base64::encode_string(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Base64::decode_vec(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_round_trip_through_text() {
        let key = SecretKey::generate().unwrap();
        let encoded = key.encode();
        assert_eq!(encoded.len(), 44);
        assert_eq!(SecretKey::parse(&encoded).unwrap(), key);
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_eq!(SecretKey::parse("not base64!"), Err(CipherError::InvalidKey));
        // 16 bytes: valid base64, wrong length.
        assert_eq!(
            SecretKey::parse("AAAAAAAAAAAAAAAAAAAAAA=="),
            Err(CipherError::InvalidKey)
        );
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = SecretKey::generate().unwrap();
        assert_eq!(format!("{key:?}"), "SecretKey(<redacted>)");
    }

    #[test]
    fn encrypt_then_decrypt_returns_plaintext() {
        let key = SecretKey::generate().unwrap();
        let field = key.encrypt("hunter2 ✓").unwrap();
        assert_eq!(field.nonce.len(), NONCE_LEN);
        assert_eq!(field.tag.len(), 16);
        assert_eq!(key.decrypt(&field).unwrap(), "hunter2 ✓");
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = SecretKey::generate().unwrap();
        let a = key.encrypt("same").unwrap();
        let b = key.encrypt("same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails_integrity() {
        let key = SecretKey::generate().unwrap();
        let other = SecretKey::generate().unwrap();
        let field = key.encrypt("secret").unwrap();
        assert_eq!(other.decrypt(&field), Err(CipherError::Integrity));
    }

    #[test]
    fn any_mutation_fails_integrity() {
        let key = SecretKey::generate().unwrap();
        let field = key.encrypt("secret").unwrap();

        let mut tampered = field.clone();
        tampered.ciphertext[0] ^= 0x01;
        assert_eq!(key.decrypt(&tampered), Err(CipherError::Integrity));

        let mut tampered = field.clone();
        tampered.tag[15] ^= 0x80;
        assert_eq!(key.decrypt(&tampered), Err(CipherError::Integrity));

        let mut tampered = field.clone();
        tampered.nonce[0] ^= 0x01;
        assert_eq!(key.decrypt(&tampered), Err(CipherError::Integrity));

        let mut truncated = field.clone();
        truncated.nonce.pop();
        assert_eq!(key.decrypt(&truncated), Err(CipherError::Integrity));

        let mut short_tag = field;
        short_tag.tag.truncate(8);
        assert_eq!(key.decrypt(&short_tag), Err(CipherError::Integrity));
    }

    #[test]
    fn field_serializes_as_base64_strings() {
        let key = SecretKey::generate().unwrap();
        let field = key.encrypt("secret").unwrap();

        let json = serde_json::to_value(&field).unwrap();
        assert!(json["nonce"].is_string());
        assert!(json["value"].is_string());
        assert!(json["tag"].is_string());

        let back: EncryptedField = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }
}
