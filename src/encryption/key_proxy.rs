//! Master-key variants behind a single encrypt/decrypt capability.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use super::crypto::{self, KEY_SIZE};
use crate::error::{Result, StrongboxError};

/// One master key. Implementations must be authenticated: a modified
/// ciphertext or nonce fails decryption instead of yielding garbage.
pub trait KeyProxy: Send + Sync {
    /// Encrypt under this key. Returns (ciphertext, nonce).
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>>;

    /// Non-secret label for logs.
    fn describe(&self) -> String;
}

/// Key derived from a configured passphrase and the salt stored in its canary.
pub struct PasswordKeyProxy {
    key: Zeroizing<[u8; KEY_SIZE]>,
    salt: Vec<u8>,
}

impl PasswordKeyProxy {
    pub fn derive(passphrase: &SecretString, salt: &[u8]) -> Result<Self> {
        let key = crypto::derive_key(passphrase.expose_secret().as_bytes(), salt)?;
        Ok(Self {
            key,
            salt: salt.to_vec(),
        })
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

impl KeyProxy for PasswordKeyProxy {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        crypto::seal(&self.key, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        crypto::open(&self.key, ciphertext, nonce)
    }

    fn describe(&self) -> String {
        "password-derived".to_string()
    }
}

impl fmt::Debug for PasswordKeyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordKeyProxy").finish_non_exhaustive()
    }
}

/// Boundary to a hardware-backed or remote key-management service.
///
/// Calls may block for an unbounded time; [`ExternalKeyProxy`] bounds them.
/// Transient unavailability should be reported as a retryable
/// [`StrongboxError::EncryptionProvider`], a rejected ciphertext as
/// [`StrongboxError::Decryption`].
pub trait KeyManagementClient: Send + Sync + 'static {
    fn encrypt(&self, key_label: &str, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    fn decrypt(&self, key_label: &str, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>>;
}

/// Master key held by an external key-management service.
#[derive(Clone)]
pub struct ExternalKeyProxy {
    client: Arc<dyn KeyManagementClient>,
    key_label: String,
    timeout: Duration,
}

impl ExternalKeyProxy {
    pub fn new(client: Arc<dyn KeyManagementClient>, key_label: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            key_label: key_label.into(),
            timeout,
        }
    }

    pub fn key_label(&self) -> &str {
        &self.key_label
    }

    /// Run one provider call on a worker thread and wait at most `timeout`.
    /// A call that outlives the timeout finishes in the background and its
    /// result is discarded.
    fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KeyManagementClient, &str) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let client = Arc::clone(&self.client);
        let label = self.key_label.clone();

        thread::Builder::new()
            .name("strongbox-kms".into())
            .spawn(move || {
                let _ = tx.send(f(client.as_ref(), &label));
            })
            .map_err(|e| StrongboxError::EncryptionProvider {
                message: format!("cannot start {operation} call: {e}"),
                retryable: true,
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(key_label = %self.key_label, operation, timeout = ?self.timeout, "key provider call timed out");
                Err(StrongboxError::EncryptionProvider {
                    message: format!(
                        "{operation} with key '{}' timed out after {:?}",
                        self.key_label, self.timeout
                    ),
                    retryable: true,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(StrongboxError::EncryptionProvider {
                message: format!("{operation} with key '{}' aborted", self.key_label),
                retryable: true,
            }),
        }
    }
}

impl KeyProxy for ExternalKeyProxy {
    fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let plaintext = Zeroizing::new(plaintext.to_vec());
        self.call("encrypt", move |client, label| client.encrypt(label, &plaintext))
    }

    fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let ciphertext = ciphertext.to_vec();
        let nonce = nonce.to_vec();
        self.call("decrypt", move |client, label| {
            client.decrypt(label, &ciphertext, &nonce).map(Zeroizing::new)
        })
    }

    fn describe(&self) -> String {
        format!("external({})", self.key_label)
    }
}

impl fmt::Debug for ExternalKeyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalKeyProxy")
            .field("key_label", &self.key_label)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
