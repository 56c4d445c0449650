//! AES-256-GCM encryption of stored mail passwords.
//!
//! Every secret gets its own random 16-byte IV; the IV and the detached
//! 16-byte authentication tag are persisted next to the ciphertext and are
//! required verbatim for decryption.

use aes_gcm::{
    aead::{consts::U16, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm, Key, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),
    #[error("malformed encrypted value: {0}")]
    Malformed(&'static str),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: authentication tag mismatch")]
    Decrypt,
    #[error("decrypted value is not valid UTF-8")]
    Utf8,
}

/// Hex-encoded output of [`CredentialCipher::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm16,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm16::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Accepts 64 hex characters or standard base64; either must decode to 32 bytes.
    pub fn from_encoded_key(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        let bytes = if encoded.len() == KEY_LEN * 2 && encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(encoded).map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        } else {
            BASE64
                .decode(encoded)
                .map_err(|_| CryptoError::InvalidKey("not valid hex or base64".into()))?
        };
        Self::from_key_bytes(&bytes)
    }

    /// Random key that only lives as long as the process.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self {
            cipher: Aes256Gcm16::new(Key::<Aes256Gcm16>::from_slice(&key)),
        }
    }

    /// Builds the cipher from deployment configuration, falling back to an
    /// ephemeral key when none is configured.
    pub fn from_config(encoded: Option<&str>) -> Result<Self, CryptoError> {
        match encoded {
            Some(key) => Self::from_encoded_key(key),
            None => {
                warn!(
                    "EMAIL_CREDENTIALS_KEY is not set; using a random key for this process. \
                     Stored email credentials will be unrecoverable after a restart. \
                     Do not run like this in production."
                );
                Ok(Self::ephemeral())
            }
        }
    }

    /// Returns `None` for empty input.
    pub fn encrypt(&self, plaintext: &str) -> Result<Option<EncryptedSecret>, CryptoError> {
        if plaintext.is_empty() {
            return Ok(None);
        }

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(Some(EncryptedSecret {
            ciphertext: hex::encode(&buffer),
            iv: hex::encode(iv),
            auth_tag: hex::encode(tag),
        }))
    }

    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String, CryptoError> {
        let iv = hex::decode(&secret.iv).map_err(|_| CryptoError::Malformed("iv is not hex"))?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::Malformed("iv must be 16 bytes"));
        }
        let tag = hex::decode(&secret.auth_tag)
            .map_err(|_| CryptoError::Malformed("authTag is not hex"))?;
        if tag.len() != TAG_LEN {
            return Err(CryptoError::Malformed("authTag must be 16 bytes"));
        }
        let mut buffer = hex::decode(&secret.ciphertext)
            .map_err(|_| CryptoError::Malformed("ciphertext is not hex"))?;

        self.cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Decrypt)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::Utf8)
    }
}

#[cfg(test)]
mod crypto_tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_key_bytes(&[7u8; KEY_LEN]).expect("valid key")
    }

    fn flip_hex_bit(hex_str: &str, byte: usize) -> String {
        let mut bytes = hex::decode(hex_str).unwrap();
        bytes[byte] ^= 0x01;
        hex::encode(bytes)
    }

    #[test]
    fn roundtrip_various_strings() {
        let c = cipher();
        let long = "x".repeat(4096);
        for s in ["secret123", "p", "пароль with spaces", "emoji 🔐 ok", long.as_str()] {
            let enc = c.encrypt(s).unwrap().expect("non-empty input");
            assert_eq!(c.decrypt(&enc).unwrap(), s);
        }
    }

    #[test]
    fn empty_input_is_a_noop() {
        assert!(cipher().encrypt("").unwrap().is_none());
    }

    #[test]
    fn iv_and_ciphertext_differ_per_call() {
        let c = cipher();
        let a = c.encrypt("same plaintext").unwrap().unwrap();
        let b = c.encrypt("same plaintext").unwrap().unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_eq!(hex::decode(&a.iv).unwrap().len(), IV_LEN);
        assert_eq!(hex::decode(&a.auth_tag).unwrap().len(), TAG_LEN);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let c = cipher();
        let enc = c.encrypt("secret123").unwrap().unwrap();
        let len = hex::decode(&enc.ciphertext).unwrap().len();
        for i in 0..len {
            let tampered = EncryptedSecret {
                ciphertext: flip_hex_bit(&enc.ciphertext, i),
                ..enc.clone()
            };
            assert!(matches!(c.decrypt(&tampered), Err(CryptoError::Decrypt)));
        }
    }

    #[test]
    fn tampered_tag_fails_closed() {
        let c = cipher();
        let enc = c.encrypt("secret123").unwrap().unwrap();
        for i in 0..TAG_LEN {
            let tampered = EncryptedSecret {
                auth_tag: flip_hex_bit(&enc.auth_tag, i),
                ..enc.clone()
            };
            assert!(matches!(c.decrypt(&tampered), Err(CryptoError::Decrypt)));
        }
    }

    #[test]
    fn decrypt_uses_the_stored_iv() {
        let c = cipher();
        let enc = c.encrypt("secret123").unwrap().unwrap();
        let other = c.encrypt("secret123").unwrap().unwrap();
        let swapped = EncryptedSecret {
            iv: other.iv,
            ..enc
        };
        assert!(c.decrypt(&swapped).is_err());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let enc = cipher().encrypt("secret123").unwrap().unwrap();
        let other = CredentialCipher::from_key_bytes(&[8u8; KEY_LEN]).unwrap();
        assert!(matches!(other.decrypt(&enc), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let c = cipher();
        let enc = c.encrypt("secret123").unwrap().unwrap();
        let bad_iv = EncryptedSecret { iv: "zz".into(), ..enc.clone() };
        assert!(matches!(c.decrypt(&bad_iv), Err(CryptoError::Malformed(_))));
        let short_iv = EncryptedSecret { iv: "00112233".into(), ..enc.clone() };
        assert!(matches!(c.decrypt(&short_iv), Err(CryptoError::Malformed(_))));
        let short_tag = EncryptedSecret { auth_tag: "0011".into(), ..enc };
        assert!(matches!(c.decrypt(&short_tag), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn key_accepts_hex_and_base64() {
        let raw = [42u8; KEY_LEN];
        let from_hex = CredentialCipher::from_encoded_key(&hex::encode(raw)).unwrap();
        let from_b64 = CredentialCipher::from_encoded_key(&BASE64.encode(raw)).unwrap();
        let enc = from_hex.encrypt("shared").unwrap().unwrap();
        assert_eq!(from_b64.decrypt(&enc).unwrap(), "shared");
    }

    #[test]
    fn key_length_is_strict() {
        assert!(matches!(
            CredentialCipher::from_encoded_key(&hex::encode([1u8; 16])),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            CredentialCipher::from_encoded_key(&BASE64.encode([1u8; 31])),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(CredentialCipher::from_encoded_key("not a key at all!").is_err());
    }

    #[test]
    fn missing_key_falls_back_to_ephemeral() {
        let c = CredentialCipher::from_config(None).unwrap();
        let enc = c.encrypt("temp").unwrap().unwrap();
        assert_eq!(c.decrypt(&enc).unwrap(), "temp");
        assert!(CredentialCipher::ephemeral().decrypt(&enc).is_err());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, logs.text())
    }

    #[test]
    fn missing_key_logs_a_warning() {
        let (cipher, logs) = with_captured_logs(|| CredentialCipher::from_config(None));
        assert!(cipher.is_ok());
        assert!(logs.contains("WARN"));
        assert!(logs.contains("EMAIL_CREDENTIALS_KEY is not set"));
    }

    #[test]
    fn configured_key_logs_nothing() {
        let key = hex::encode([9u8; KEY_LEN]);
        let (cipher, logs) = with_captured_logs(|| CredentialCipher::from_config(Some(&key)));
        assert!(cipher.is_ok());
        assert!(!logs.contains("EMAIL_CREDENTIALS_KEY is not set"));
    }

    #[test]
    fn serialized_field_names() {
        let enc = cipher().encrypt("secret123").unwrap().unwrap();
        let json = serde_json::to_value(&enc).unwrap();
        assert!(json.get("ciphertext").is_some());
        assert!(json.get("iv").is_some());
        assert!(json.get("authTag").is_some());
    }
}
