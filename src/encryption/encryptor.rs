use std::sync::Arc;

use zeroize::Zeroizing;

use super::{EncryptedValue, EncryptionKeySet};
use crate::error::{Result, StrongboxError};

/// Seals new values under the active key and opens stored values under
/// whichever key their identity names.
#[derive(Clone)]
pub struct Encryptor {
    keys: Arc<EncryptionKeySet>,
}

impl Encryptor {
    pub fn new(keys: Arc<EncryptionKeySet>) -> Self {
        Self { keys }
    }

    pub fn key_set(&self) -> &Arc<EncryptionKeySet> {
        &self.keys
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedValue> {
        let (identity, proxy) = self.keys.active_key();
        let (ciphertext, nonce) = proxy.encrypt(plaintext.as_bytes())?;
        Ok(EncryptedValue {
            encryption_key_uuid: identity,
            encrypted_value: ciphertext,
            nonce,
        })
    }

    pub fn decrypt(&self, value: &EncryptedValue) -> Result<Zeroizing<String>> {
        let proxy = self.keys.key_for(&value.encryption_key_uuid)?;
        let plaintext = proxy.decrypt(&value.encrypted_value, &value.nonce)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| StrongboxError::Decryption("stored value is not valid UTF-8".into()))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}
