pub mod crypto;
pub mod encryptor;
pub mod key_proxy;
pub mod key_set;

use std::fmt;

use crate::types::*;

pub use encryptor::Encryptor;
pub use key_proxy::{ExternalKeyProxy, KeyManagementClient, KeyProxy, PasswordKeyProxy};
pub use key_set::EncryptionKeySet;

/// Plaintext every canary is sealed over.
pub const CANARY_VALUE: &str = "strongbox-encryption-key-canary";

/// Ciphertext plus the identity of the master key that produced it.
///
/// Owns its buffers; constructing from borrowed slices copies them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue {
    pub encryption_key_uuid: Uuid,
    pub encrypted_value: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl EncryptedValue {
    pub fn new(encryption_key_uuid: Uuid, encrypted_value: &[u8], nonce: &[u8]) -> Self {
        Self {
            encryption_key_uuid,
            encrypted_value: encrypted_value.to_vec(),
            nonce: nonce.to_vec(),
        }
    }
}

impl fmt::Debug for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedValue")
            .field("encryption_key_uuid", &self.encryption_key_uuid)
            .field("encrypted_value", &format_args!("<{} bytes>", self.encrypted_value.len()))
            .field("nonce", &format_args!("<{} bytes>", self.nonce.len()))
            .finish()
    }
}
