use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;

use super::crypto;
use super::key_proxy::{ExternalKeyProxy, KeyManagementClient, KeyProxy, PasswordKeyProxy};
use super::CANARY_VALUE;
use crate::config::{KeyConfig, KeyProvider};
use crate::datastore::{CanaryRecord, Datastore};
use crate::error::{Result, StrongboxError};
use crate::types::*;

/// The configured master keys, each identified by the uuid of the canary it
/// opens. Built once at startup and read-only afterwards.
pub struct EncryptionKeySet {
    keys: BTreeMap<Uuid, Arc<dyn KeyProxy>>,
    active: Uuid,
}

impl EncryptionKeySet {
    pub fn new(keys: BTreeMap<Uuid, Arc<dyn KeyProxy>>, active: Uuid) -> Result<Self> {
        if !keys.contains_key(&active) {
            return Err(StrongboxError::Config(format!(
                "active key {active} is not part of the key set"
            )));
        }
        Ok(Self { keys, active })
    }

    /// Map every configured key to a canary, creating one for the active key
    /// if none of the stored canaries opens under it.
    pub fn initialize(
        configs: &[KeyConfig],
        kms: Option<Arc<dyn KeyManagementClient>>,
        datastore: &Datastore,
    ) -> Result<Self> {
        let canaries: Vec<CanaryRecord> = datastore.read(|state| Ok(state.canaries().cloned().collect()))?;

        let mut keys: BTreeMap<Uuid, Arc<dyn KeyProxy>> = BTreeMap::new();
        let mut active = None;
        let mut created = Vec::new();

        for (index, config) in configs.iter().enumerate() {
            let matched = match config.provider {
                KeyProvider::Password => match_password_key(config, index, &canaries)?,
                KeyProvider::External => match_external_key(config, index, kms.as_ref(), &canaries)?,
            };

            let (uuid, proxy) = match matched {
                Some(found) => found,
                None if config.active => {
                    let (canary, proxy) = create_canary(config, index, kms.as_ref())?;
                    let uuid = canary.uuid;
                    tracing::info!(key = index, canary = %uuid, "created canary for new active key");
                    created.push(canary);
                    (uuid, proxy)
                }
                None => {
                    tracing::warn!(key = index, "configured key matches no stored canary and is not active; skipping");
                    continue;
                }
            };

            if keys.contains_key(&uuid) {
                return Err(StrongboxError::Config(format!(
                    "encryption key #{index} duplicates another configured key (canary {uuid})"
                )));
            }
            tracing::info!(key = index, canary = %uuid, provider = %proxy.describe(), active = config.active, "mapped encryption key");
            if config.active {
                active = Some(uuid);
            }
            keys.insert(uuid, proxy);
        }

        if !created.is_empty() {
            datastore.transaction(|state| {
                for canary in created {
                    state.insert_canary(canary);
                }
                Ok(())
            })?;
        }

        let active = active.ok_or_else(|| StrongboxError::Config("no active encryption key configured".into()))?;
        Self::new(keys, active)
    }

    pub fn active_key(&self) -> (Uuid, &Arc<dyn KeyProxy>) {
        // `new` guarantees the active uuid is present.
        (self.active, &self.keys[&self.active])
    }

    pub fn active_identity(&self) -> Uuid {
        self.active
    }

    pub fn key_for(&self, identity: &Uuid) -> Result<&Arc<dyn KeyProxy>> {
        self.keys
            .get(identity)
            .ok_or(StrongboxError::KeyNotFound(*identity))
    }

    pub fn identities(&self) -> BTreeSet<Uuid> {
        self.keys.keys().copied().collect()
    }

    /// Configured keys other than the active one; what rotation drains.
    pub fn inactive_identities(&self) -> BTreeSet<Uuid> {
        self.keys
            .keys()
            .filter(|uuid| **uuid != self.active)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for EncryptionKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKeySet")
            .field("identities", &self.keys.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .finish()
    }
}

fn opens_canary(proxy: &dyn KeyProxy, canary: &CanaryRecord) -> Result<bool> {
    match proxy.decrypt(&canary.encrypted_value, &canary.nonce) {
        Ok(plaintext) => Ok(plaintext.as_slice().ct_eq(CANARY_VALUE.as_bytes()).into()),
        Err(StrongboxError::Decryption(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn match_password_key(
    config: &KeyConfig,
    index: usize,
    canaries: &[CanaryRecord],
) -> Result<Option<(Uuid, Arc<dyn KeyProxy>)>> {
    let passphrase = config
        .passphrase
        .as_ref()
        .ok_or_else(|| StrongboxError::Config(format!("encryption key #{index}: passphrase is required")))?;

    for canary in canaries {
        let Some(salt) = &canary.salt else { continue };
        let proxy = PasswordKeyProxy::derive(passphrase, salt)?;
        if opens_canary(&proxy, canary)? {
            return Ok(Some((canary.uuid, Arc::new(proxy))));
        }
    }
    Ok(None)
}

fn external_proxy(
    config: &KeyConfig,
    index: usize,
    kms: Option<&Arc<dyn KeyManagementClient>>,
) -> Result<ExternalKeyProxy> {
    let client = kms.ok_or_else(|| {
        StrongboxError::Config(format!(
            "encryption key #{index} uses the external provider but no key-management client is available"
        ))
    })?;
    let label = config
        .key_label
        .as_deref()
        .ok_or_else(|| StrongboxError::Config(format!("encryption key #{index}: key_label is required")))?;
    Ok(ExternalKeyProxy::new(
        Arc::clone(client),
        label,
        Duration::from_millis(config.timeout_ms),
    ))
}

fn match_external_key(
    config: &KeyConfig,
    index: usize,
    kms: Option<&Arc<dyn KeyManagementClient>>,
    canaries: &[CanaryRecord],
) -> Result<Option<(Uuid, Arc<dyn KeyProxy>)>> {
    let proxy = external_proxy(config, index, kms)?;
    for canary in canaries.iter().filter(|c| c.salt.is_none()) {
        if opens_canary(&proxy, canary)? {
            return Ok(Some((canary.uuid, Arc::new(proxy))));
        }
    }
    Ok(None)
}

fn create_canary(
    config: &KeyConfig,
    index: usize,
    kms: Option<&Arc<dyn KeyManagementClient>>,
) -> Result<(CanaryRecord, Arc<dyn KeyProxy>)> {
    let (proxy, salt): (Arc<dyn KeyProxy>, Option<Vec<u8>>) = match config.provider {
        KeyProvider::Password => {
            let passphrase = config.passphrase.as_ref().ok_or_else(|| {
                StrongboxError::Config(format!("encryption key #{index}: passphrase is required"))
            })?;
            let salt = crypto::generate_salt();
            (Arc::new(PasswordKeyProxy::derive(passphrase, &salt)?), Some(salt))
        }
        KeyProvider::External => (Arc::new(external_proxy(config, index, kms)?), None),
    };

    let (encrypted_value, nonce) = proxy.encrypt(CANARY_VALUE.as_bytes())?;
    let canary = CanaryRecord {
        uuid: Uuid::new_v4(),
        encrypted_value,
        nonce,
        salt,
    };
    Ok((canary, proxy))
}
