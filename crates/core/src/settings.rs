//! `getSetting` lookup: character secrets, then character settings, then
//! process environment. Secret values may be marked encrypted; decryption
//! happens transparently here, keyed by `RUNTIME_SECRET_SALT`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;

use crate::error::ConfigError;

/// A value marked as encrypted carries its nonce alongside the ciphertext,
/// both base64-encoded, joined by `:`.
const ENCRYPTED_PREFIX: &str = "enc:";

#[derive(Debug, Clone, Default)]
pub struct SettingsSource {
    pub secrets: HashMap<String, String>,
    pub settings: HashMap<String, String>,
}

pub struct SettingsResolver {
    character: SettingsSource,
    salt: Option<Vec<u8>>,
}

impl SettingsResolver {
    pub fn new(character: SettingsSource) -> Self {
        let salt = std::env::var("RUNTIME_SECRET_SALT").ok().map(|s| s.into_bytes());
        Self { character, salt }
    }

    /// For tests that don't want to depend on process environment state.
    pub fn with_salt(character: SettingsSource, salt: Vec<u8>) -> Self {
        Self { character, salt: Some(salt) }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        if let Some(raw) = self.character.secrets.get(key) {
            return self.decrypt_if_needed(key, raw).map(Some);
        }
        if let Some(raw) = self.character.settings.get(key) {
            return self.decrypt_if_needed(key, raw).map(Some);
        }
        if let Ok(raw) = std::env::var(key) {
            return self.decrypt_if_needed(key, &raw).map(Some);
        }
        Ok(None)
    }

    pub fn get_required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)?.ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
    }

    fn decrypt_if_needed(&self, key: &str, raw: &str) -> Result<String, ConfigError> {
        let Some(encoded) = raw.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(raw.to_string());
        };

        let salt = self.salt.as_ref().ok_or_else(|| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: "RUNTIME_SECRET_SALT is not set".to_string(),
        })?;

        let (nonce_b64, ciphertext_b64) = encoded.split_once(':').ok_or_else(|| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: "malformed encrypted value, expected nonce:ciphertext".to_string(),
        })?;

        let nonce_bytes = BASE64.decode(nonce_b64).map_err(|e| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let key_material = derive_key(salt);
        let cipher_key = Key::<Aes256Gcm>::from_slice(&key_material);
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: "AES-GCM decryption failed".to_string(),
        })?;

        String::from_utf8(plaintext).map_err(|e| ConfigError::DecryptionFailed {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Stretches `RUNTIME_SECRET_SALT` into a 32-byte AES key via SHA-256. The
/// salt is already a high-entropy deployment secret rather than a
/// user-chosen password, so a plain digest is appropriate here; Argon2 is
/// reserved for the password-hashing path elsewhere in the stack.
fn derive_key(salt: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"runtime-core-settings-key-v1");
    hasher.update(salt);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypt_for_test(salt: &[u8], plaintext: &str) -> String {
        let key_material = derive_key(salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_material));
        let nonce_bytes = [7u8; 12];
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, plaintext.as_bytes()).unwrap();
        format!("{ENCRYPTED_PREFIX}{}:{}", BASE64.encode(nonce_bytes), BASE64.encode(ciphertext))
    }

    #[test]
    fn resolution_order_prefers_secrets_over_settings_over_env() {
        let mut source = SettingsSource::default();
        source.secrets.insert("KEY".into(), "from-secret".into());
        source.settings.insert("KEY".into(), "from-setting".into());
        std::env::set_var("RUNTIME_TEST_KEY_ORDER", "from-env");

        let resolver = SettingsResolver::with_salt(source, b"test-salt".to_vec());
        assert_eq!(resolver.get("KEY").unwrap(), Some("from-secret".to_string()));
    }

    #[test]
    fn falls_back_to_settings_then_env() {
        let mut source = SettingsSource::default();
        source.settings.insert("ONLY_SETTING".into(), "setting-value".into());
        let resolver = SettingsResolver::with_salt(source, b"salt".to_vec());
        assert_eq!(resolver.get("ONLY_SETTING").unwrap(), Some("setting-value".to_string()));

        std::env::set_var("RUNTIME_TEST_ENV_ONLY", "env-value");
        let resolver = SettingsResolver::with_salt(SettingsSource::default(), b"salt".to_vec());
        assert_eq!(resolver.get("RUNTIME_TEST_ENV_ONLY").unwrap(), Some("env-value".to_string()));
    }

    #[test]
    fn missing_required_setting_errors() {
        let resolver = SettingsResolver::with_salt(SettingsSource::default(), b"salt".to_vec());
        let err = resolver.get_required("RUNTIME_TEST_DEFINITELY_MISSING").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(_)));
    }

    #[test]
    fn encrypted_secret_decrypts_transparently() {
        let salt = b"shared-salt".to_vec();
        let mut source = SettingsSource::default();
        source.secrets.insert("API_KEY".into(), encrypt_for_test(&salt, "sk-test-value"));

        let resolver = SettingsResolver::with_salt(source, salt);
        assert_eq!(resolver.get("API_KEY").unwrap(), Some("sk-test-value".to_string()));
    }

    #[test]
    fn decryption_without_salt_fails_explicitly() {
        let salt = b"shared-salt".to_vec();
        let mut source = SettingsSource::default();
        source.secrets.insert("API_KEY".into(), encrypt_for_test(&salt, "sk-test-value"));

        let resolver = SettingsResolver { character: source, salt: None };
        let err = resolver.get("API_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::DecryptionFailed { .. }));
    }
}
