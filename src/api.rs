//! High-level programmatic API for the credential store.
//!
//! [`Strongbox`] wires the datastore, key set, permission checks, generators,
//! rotation and regeneration together and is the caller boundary: every
//! credential-data operation collapses "not found" and "not allowed" into the
//! same error before it leaves this module. ACL management does not.

use std::fs;
use std::sync::atomic::AtomicBool;

use crate::auth::UserContext;
use crate::config::Config;
use crate::credential::{
    CredentialGenerationService, CredentialValue, CredentialVersion, CredentialWrite, FoundCredential,
    GenerateRequest, VersionedCredentialStore, WriteMode,
};
use crate::datastore::Datastore;
use crate::encryption::{EncryptionKeySet, Encryptor, KeyManagementClient};
use crate::error::{Result, StrongboxError};
use crate::permission::{
    PermissionCheckingService, PermissionEntry, PermissionOperation, PermissionRequest, PermissionService,
};
use crate::regeneration::RegenerationEngine;
use crate::rotation::{BatchOutcome, DecryptableDataDetector, RotationEngine, RotationReport};
use crate::types::*;

/// Which master keys are configured and how much data each one holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStatus {
    pub active: Uuid,
    pub configured: Vec<Uuid>,
    /// Stored values per key identity, including identities no longer configured.
    pub values_by_key: BTreeMap<Uuid, u64>,
    /// Values sealed under a configured key that is not active.
    pub pending_rotation: u64,
}

pub struct StrongboxBuilder {
    config: Config,
    kms: Option<Arc<dyn KeyManagementClient>>,
    clock: Arc<dyn Clock>,
    datastore: Option<Arc<Datastore>>,
}

impl StrongboxBuilder {
    /// Client for keys with `provider = "external"`.
    pub fn kms(mut self, client: Arc<dyn KeyManagementClient>) -> Self {
        self.kms = Some(client);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use this datastore instead of the one named in `[store]`.
    pub fn datastore(mut self, datastore: Arc<Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    /// Validate the config, map keys to canaries, refuse a key set that reads
    /// none of the stored data, then ensure bootstrap ACLs.
    pub fn build(self) -> Result<Strongbox> {
        let config = self.config;
        config.validate()?;

        let datastore = match self.datastore {
            Some(datastore) => datastore,
            None => Arc::new(open_datastore(&config)?),
        };

        let keys = Arc::new(EncryptionKeySet::initialize(
            &config.encryption.keys,
            self.kms,
            &datastore,
        )?);
        DecryptableDataDetector::new(datastore.clone(), keys.clone()).check()?;

        let checker = PermissionCheckingService::new(datastore.clone(), config.permissions.enforce);
        let permissions = PermissionService::new(datastore.clone(), checker.clone());
        permissions.bootstrap(&config.permissions.bootstrap)?;

        let encryptor = Encryptor::new(keys.clone());
        let store = VersionedCredentialStore::new(datastore.clone(), encryptor.clone(), checker, self.clock.clone());
        let generation = CredentialGenerationService::new(store);
        let regeneration = RegenerationEngine::new(generation.clone());
        let rotation = RotationEngine::new(datastore.clone(), encryptor, config.rotation.batch_size, self.clock);

        let strongbox = Strongbox {
            datastore,
            keys,
            generation,
            regeneration,
            permissions,
            rotation,
        };

        if config.rotation.on_startup {
            strongbox.rotate_all(&AtomicBool::new(false))?;
        }
        tracing::info!(
            keys = strongbox.keys.len(),
            active = %strongbox.keys.active_identity(),
            enforce_permissions = config.permissions.enforce,
            "strongbox ready"
        );
        Ok(strongbox)
    }
}

fn open_datastore(config: &Config) -> Result<Datastore> {
    if config.store.memory {
        return Ok(Datastore::in_memory());
    }
    let path = config.store.resolved_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Datastore::open(&path)
}

/// Programmatic access to the store. Cheap to share behind an `Arc`.
pub struct Strongbox {
    datastore: Arc<Datastore>,
    keys: Arc<EncryptionKeySet>,
    generation: CredentialGenerationService,
    regeneration: RegenerationEngine,
    permissions: PermissionService,
    rotation: RotationEngine,
}

impl Strongbox {
    pub fn builder(config: Config) -> StrongboxBuilder {
        StrongboxBuilder {
            config,
            kms: None,
            clock: Arc::new(SystemClock),
            datastore: None,
        }
    }

    /// Open with the system clock and no external key service.
    pub fn open(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    fn store(&self) -> &VersionedCredentialStore {
        self.generation.store()
    }

    // -- credentials ---------------------------------------------------------

    /// Store a value under `name`.
    pub fn set(
        &self,
        ctx: &UserContext,
        name: &str,
        value: CredentialValue,
        mode: WriteMode,
    ) -> Result<CredentialVersion> {
        self.write(ctx, CredentialWrite::new(name, value, mode))
    }

    /// Store a value, optionally granting ACL entries in the same transaction.
    pub fn write(&self, ctx: &UserContext, write: CredentialWrite) -> Result<CredentialVersion> {
        concealed(self.store().write(ctx.actor(), write))
    }

    pub fn generate(&self, ctx: &UserContext, request: GenerateRequest) -> Result<CredentialVersion> {
        concealed(self.generation.generate(ctx.actor(), request))
    }

    pub fn find_all_by_name(&self, ctx: &UserContext, name: &str) -> Result<Vec<CredentialVersion>> {
        concealed(self.store().find_all_by_name(ctx.actor(), name))
    }

    pub fn find_n_by_name(&self, ctx: &UserContext, name: &str, n: i64) -> Result<Vec<CredentialVersion>> {
        concealed(self.store().find_n_by_name(ctx.actor(), name, n))
    }

    pub fn find_active_by_name(&self, ctx: &UserContext, name: &str) -> Result<Vec<CredentialVersion>> {
        concealed(self.store().find_active_by_name(ctx.actor(), name))
    }

    pub fn find_by_uuid(&self, ctx: &UserContext, uuid: Uuid) -> Result<CredentialVersion> {
        concealed(self.store().find_by_uuid(ctx.actor(), uuid))
    }

    /// Remove a credential with all its versions and ACL entries. Returns
    /// `false` if the name did not exist.
    pub fn delete(&self, ctx: &UserContext, name: &str) -> Result<bool> {
        concealed(self.store().delete(ctx.actor(), name))
    }

    pub fn find_by_path(&self, ctx: &UserContext, path: &str) -> Result<Vec<FoundCredential>> {
        concealed(self.store().find_by_path(ctx.actor(), path))
    }

    pub fn update_transitional_version(&self, ctx: &UserContext, name: &str, version: Option<Uuid>) -> Result<()> {
        concealed(self.store().update_transitional_version(ctx.actor(), name, version))
    }

    pub fn regenerate(&self, ctx: &UserContext, name: &str) -> Result<CredentialVersion> {
        concealed(self.regeneration.regenerate(ctx.actor(), name))
    }

    pub fn bulk_regenerate(&self, ctx: &UserContext, signed_by: &str) -> Result<BTreeSet<String>> {
        concealed(self.regeneration.bulk_regenerate(ctx.actor(), signed_by))
    }

    // -- permissions ---------------------------------------------------------

    pub fn has_permission(&self, ctx: &UserContext, path: &str, operation: PermissionOperation) -> Result<bool> {
        self.permissions
            .checker()
            .has_permission(ctx.actor(), &crate::permission::normalize_path(path), operation)
    }

    pub fn save_permissions(
        &self,
        ctx: &UserContext,
        path: &str,
        requests: &[PermissionRequest],
    ) -> Result<Vec<PermissionEntry>> {
        self.permissions.save_permissions(ctx.actor(), path, requests)
    }

    pub fn patch_permission(
        &self,
        ctx: &UserContext,
        uuid: Uuid,
        operations: &BTreeSet<PermissionOperation>,
    ) -> Result<PermissionEntry> {
        self.permissions.patch_permission(ctx.actor(), uuid, operations)
    }

    pub fn delete_permission(&self, ctx: &UserContext, path: &str, actor: &str) -> Result<PermissionEntry> {
        self.permissions.delete_permission(ctx.actor(), path, actor)
    }

    pub fn get_all_permissions(&self, ctx: &UserContext, path: &str) -> Result<Vec<PermissionEntry>> {
        self.permissions.get_all_permissions(ctx.actor(), path)
    }

    pub fn find_permission(&self, ctx: &UserContext, path: &str, actor: &str) -> Result<PermissionEntry> {
        self.permissions.find_by_path_and_actor(ctx.actor(), path, actor)
    }

    // -- keys ----------------------------------------------------------------

    /// Re-run the startup decryptability check.
    pub fn check(&self) -> Result<()> {
        DecryptableDataDetector::new(self.datastore.clone(), self.keys.clone()).check()
    }

    pub fn rotate_batch(&self) -> Result<BatchOutcome> {
        self.rotation.rotate_batch(&mut BTreeSet::new())
    }

    pub fn rotate_all(&self, cancel: &AtomicBool) -> Result<RotationReport> {
        self.rotation.rotate_all(cancel)
    }

    pub fn key_status(&self) -> Result<KeyStatus> {
        let values_by_key = self.datastore.read(|state| Ok(state.value_count_by_key()))?;
        Ok(KeyStatus {
            active: self.keys.active_identity(),
            configured: self.keys.identities().into_iter().collect(),
            values_by_key,
            pending_rotation: self.rotation.remaining()?,
        })
    }
}

fn concealed<T>(result: Result<T>) -> Result<T> {
    result.map_err(StrongboxError::conceal_access)
}
