use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Result, StrongboxError};

/// Size of master keys in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the salt stored with a password-derived key's canary.
pub const SALT_SIZE: usize = 32;

/// Generate a random master key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());
    key
}

/// Generate a random salt for password-based key derivation.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a master key from a passphrase and salt using Argon2id.
pub fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    Argon2::default()
        .hash_password_into(passphrase, salt, key.as_mut())
        .map_err(|e| StrongboxError::EncryptionProvider {
            message: format!("key derivation failed: {e}"),
            retryable: false,
        })?;
    Ok(key)
}

/// Encrypt with AES-256-GCM under a fresh random nonce. Returns (ciphertext, nonce).
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| StrongboxError::EncryptionProvider {
            message: format!("encryption failed: {e}"),
            retryable: false,
        })?;

    Ok((ciphertext, nonce.to_vec()))
}

/// Decrypt and authenticate. Any change to ciphertext or nonce fails here.
pub fn open(key: &[u8; KEY_SIZE], ciphertext: &[u8], nonce: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if nonce.len() != NONCE_SIZE {
        return Err(StrongboxError::Decryption(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| StrongboxError::Decryption("authentication tag mismatch".into()))?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = generate_key();
        let (ciphertext, nonce) = seal(&key, b"super secret value").unwrap();
        assert_eq!(nonce.len(), NONCE_SIZE);
        assert_eq!(open(&key, &ciphertext, &nonce).unwrap().as_slice(), b"super secret value");
    }

    #[test]
    fn encryption_is_not_deterministic() {
        let key = generate_key();
        let (first, _) = seal(&key, b"same").unwrap();
        let (second, _) = seal(&key, b"same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_key();
        let (mut ciphertext, nonce) = seal(&key, b"secret").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(matches!(
            open(&key, &ciphertext, &nonce),
            Err(StrongboxError::Decryption(_))
        ));
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = generate_key();
        let (ciphertext, mut nonce) = seal(&key, b"secret").unwrap();
        nonce[3] ^= 0x01;
        assert!(open(&key, &ciphertext, &nonce).is_err());
        assert!(open(&key, &ciphertext, &nonce[..8]).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let (ciphertext, nonce) = seal(&generate_key(), b"secret").unwrap();
        assert!(open(&generate_key(), &ciphertext, &nonce).is_err());
    }

    #[test]
    fn derivation_is_deterministic_per_salt() {
        let salt = generate_salt();
        let a = derive_key(b"correct-horse-battery-staple", &salt).unwrap();
        let b = derive_key(b"correct-horse-battery-staple", &salt).unwrap();
        let c = derive_key(b"correct-horse-battery-staple", &generate_salt()).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), c.as_slice());
    }
}
