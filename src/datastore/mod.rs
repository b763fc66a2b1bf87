//! Persisted records and the transactional unit of work around them.
//!
//! All reads and writes go through [`Datastore::read`] or
//! [`Datastore::transaction`]. A transaction works on a private copy of the
//! state and publishes it only when the closure succeeds and, for a
//! file-backed store, the new image is on disk. Readers never observe a
//! half-applied operation.

pub mod file;
pub mod records;

use std::sync::{Mutex, MutexGuard};

use crate::credential::CredentialType;
use crate::encryption::EncryptedValue;
use crate::error::{Result, StrongboxError};
use crate::permission::PermissionEntry;
use crate::types::*;

pub use records::{
    CanaryRecord, CertificateMetadata, CredentialRecord, CredentialVersionRecord, EncryptedValueRecord,
    VersionMetadata,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    credentials: BTreeMap<Uuid, CredentialRecord>,
    versions: BTreeMap<Uuid, CredentialVersionRecord>,
    encrypted_values: BTreeMap<Uuid, EncryptedValueRecord>,
    canaries: BTreeMap<Uuid, CanaryRecord>,
    permissions: BTreeMap<Uuid, PermissionEntry>,
    next_sequence: u64,
    #[serde(skip)]
    names: BTreeMap<String, Uuid>,
}

impl StoreState {
    pub(crate) fn rebuild_indexes(&mut self) {
        self.names = self
            .credentials
            .values()
            .map(|c| (c.name.clone(), c.uuid))
            .collect();
    }

    // -- credentials ---------------------------------------------------------

    pub fn credential_by_name(&self, name: &str) -> Option<&CredentialRecord> {
        self.names.get(name).and_then(|uuid| self.credentials.get(uuid))
    }

    pub fn credential(&self, uuid: &Uuid) -> Option<&CredentialRecord> {
        self.credentials.get(uuid)
    }

    /// Credentials whose name equals `path` or sits below it, in name order.
    pub fn credentials_under<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a CredentialRecord> + 'a {
        let prefix = path.trim_end_matches('/');
        self.names
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(name, _)| name.starts_with(prefix))
            .filter(move |(name, _)| {
                prefix.is_empty() || name.len() == prefix.len() || name[prefix.len()..].starts_with('/')
            })
            .filter_map(|(_, uuid)| self.credentials.get(uuid))
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn insert_credential(
        &mut self,
        name: &str,
        credential_type: CredentialType,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let uuid = Uuid::new_v4();
        self.credentials.insert(
            uuid,
            CredentialRecord {
                uuid,
                name: name.to_string(),
                credential_type,
                created_at,
                versions: Vec::new(),
            },
        );
        self.names.insert(name.to_string(), uuid);
        uuid
    }

    /// Remove a credential with its versions, their values and the ACL
    /// entries stored for its path. Returns false if the name is unknown.
    pub fn delete_credential(&mut self, name: &str) -> bool {
        let Some(uuid) = self.names.remove(name) else {
            return false;
        };
        let Some(credential) = self.credentials.remove(&uuid) else {
            return false;
        };

        for version_uuid in &credential.versions {
            if let Some(version) = self.versions.remove(version_uuid) {
                self.encrypted_values.remove(&version.encrypted_value_uuid);
            }
        }
        self.permissions.retain(|_, entry| entry.path != credential.name);
        true
    }

    // -- versions ------------------------------------------------------------

    pub fn version(&self, uuid: &Uuid) -> Option<&CredentialVersionRecord> {
        self.versions.get(uuid)
    }

    /// Versions of a credential, newest first. Equal timestamps fall back to
    /// insertion order.
    pub fn versions_of(&self, credential: &CredentialRecord) -> Vec<&CredentialVersionRecord> {
        let mut versions: Vec<&CredentialVersionRecord> = credential
            .versions
            .iter()
            .filter_map(|uuid| self.versions.get(uuid))
            .collect();
        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });
        versions
    }

    /// Newest version that is not a certificate's transitional version.
    pub fn current_version(&self, credential: &CredentialRecord) -> Option<&CredentialVersionRecord> {
        credential
            .versions
            .iter()
            .filter_map(|uuid| self.versions.get(uuid))
            .filter(|v| !v.metadata.is_transitional())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)))
    }

    pub fn append_version(
        &mut self,
        credential_uuid: Uuid,
        credential_type: CredentialType,
        created_at: DateTime<Utc>,
        value: EncryptedValue,
        metadata: VersionMetadata,
    ) -> Result<CredentialVersionRecord> {
        let credential = self
            .credentials
            .get_mut(&credential_uuid)
            .ok_or_else(|| StrongboxError::NotFound(format!("credential {credential_uuid}")))?;

        let value_uuid = Uuid::new_v4();
        self.encrypted_values.insert(
            value_uuid,
            EncryptedValueRecord {
                uuid: value_uuid,
                value,
                updated_at: created_at,
            },
        );

        let record = CredentialVersionRecord {
            uuid: Uuid::new_v4(),
            credential_uuid,
            credential_type,
            created_at,
            sequence: self.next_sequence,
            encrypted_value_uuid: value_uuid,
            metadata,
        };
        self.next_sequence += 1;
        credential.versions.push(record.uuid);
        self.versions.insert(record.uuid, record.clone());
        Ok(record)
    }

    pub fn version_metadata_mut(&mut self, uuid: &Uuid) -> Option<&mut VersionMetadata> {
        self.versions.get_mut(uuid).map(|v| &mut v.metadata)
    }

    /// Current certificate versions whose signing CA is `ca_name`.
    pub fn certificates_signed_by(&self, ca_name: &str) -> Vec<&CredentialRecord> {
        self.credentials
            .values()
            .filter(|c| c.credential_type == CredentialType::Certificate && c.name != ca_name)
            .filter(|c| {
                self.current_version(c)
                    .and_then(|v| v.metadata.certificate.as_ref())
                    .and_then(|m| m.ca_name.as_deref())
                    == Some(ca_name)
            })
            .collect()
    }

    // -- encrypted values ----------------------------------------------------

    pub fn encrypted_value(&self, uuid: &Uuid) -> Option<&EncryptedValueRecord> {
        self.encrypted_values.get(uuid)
    }

    pub fn value_count(&self) -> u64 {
        self.encrypted_values.len() as u64
    }

    pub fn value_count_with_keys(&self, keys: &BTreeSet<Uuid>) -> u64 {
        self.encrypted_values
            .values()
            .filter(|r| keys.contains(&r.value.encryption_key_uuid))
            .count() as u64
    }

    /// Count per key identity.
    pub fn value_count_by_key(&self) -> BTreeMap<Uuid, u64> {
        let mut counts = BTreeMap::new();
        for record in self.encrypted_values.values() {
            *counts.entry(record.value.encryption_key_uuid).or_insert(0) += 1;
        }
        counts
    }

    /// Up to `limit` values sealed under one of `keys`, cloned out of the
    /// store. Value uuids in `skip` are passed over.
    pub fn values_encrypted_with(
        &self,
        keys: &BTreeSet<Uuid>,
        skip: &BTreeSet<Uuid>,
        limit: usize,
    ) -> Vec<EncryptedValueRecord> {
        self.encrypted_values
            .values()
            .filter(|r| keys.contains(&r.value.encryption_key_uuid) && !skip.contains(&r.uuid))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Replace a value only if it still holds `expected`. Returns whether it did.
    pub fn replace_value_if_unchanged(
        &mut self,
        uuid: &Uuid,
        expected: &EncryptedValue,
        replacement: EncryptedValue,
        now: DateTime<Utc>,
    ) -> bool {
        match self.encrypted_values.get_mut(uuid) {
            Some(record) if &record.value == expected => {
                record.value = replacement;
                record.updated_at = now;
                true
            }
            _ => false,
        }
    }

    // -- canaries ------------------------------------------------------------

    pub fn canaries(&self) -> impl Iterator<Item = &CanaryRecord> {
        self.canaries.values()
    }

    pub fn insert_canary(&mut self, canary: CanaryRecord) {
        self.canaries.insert(canary.uuid, canary);
    }

    // -- permissions ---------------------------------------------------------

    pub fn permission(&self, uuid: &Uuid) -> Option<&PermissionEntry> {
        self.permissions.get(uuid)
    }

    pub fn permission_for(&self, path: &str, actor: &str) -> Option<&PermissionEntry> {
        self.permissions
            .values()
            .find(|e| e.path == path && e.actor == actor)
    }

    pub fn permissions_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a PermissionEntry> + 'a {
        self.permissions.values().filter(move |e| e.path == path)
    }

    pub fn permissions_for_actor<'a>(&'a self, actor: &'a str) -> impl Iterator<Item = &'a PermissionEntry> + 'a {
        self.permissions.values().filter(move |e| e.actor == actor)
    }

    /// Insert or replace the entry for (entry.path, entry.actor). An existing
    /// entry keeps its uuid.
    pub fn upsert_permission(&mut self, mut entry: PermissionEntry) -> PermissionEntry {
        if let Some(existing) = self.permission_for(&entry.path, &entry.actor) {
            entry.uuid = existing.uuid;
        }
        self.permissions.insert(entry.uuid, entry.clone());
        entry
    }

    /// Add operations to the (path, actor) entry, creating it if needed.
    pub fn merge_permission(
        &mut self,
        path: &str,
        actor: &str,
        operations: &BTreeSet<crate::permission::PermissionOperation>,
    ) -> PermissionEntry {
        let mut entry = self.permission_for(path, actor).cloned().unwrap_or_else(|| PermissionEntry {
            uuid: Uuid::new_v4(),
            path: path.to_string(),
            actor: actor.to_string(),
            operations: BTreeSet::new(),
        });
        entry.operations.extend(operations.iter().copied());
        self.permissions.insert(entry.uuid, entry.clone());
        entry
    }

    pub fn delete_permission(&mut self, path: &str, actor: &str) -> bool {
        let uuid = self.permission_for(path, actor).map(|e| e.uuid);
        uuid.and_then(|u| self.permissions.remove(&u)).is_some()
    }
}

/// Shared handle to the persisted state.
pub struct Datastore {
    state: Mutex<StoreState>,
    file: Option<PathBuf>,
}

impl Datastore {
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            file: None,
        }
    }

    /// Open a file-backed store, starting empty if the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            file::load(path)?
        } else {
            StoreState::default()
        };
        tracing::debug!(path = %path.display(), credentials = state.credential_count(), "opened datastore");
        Ok(Self {
            state: Mutex::new(state),
            file: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> Result<T>) -> Result<T> {
        let guard = self.lock()?;
        f(&guard)
    }

    /// Run `f` as one unit of work: all of its changes are published, or none.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let result = f(&mut working)?;
        if let Some(path) = &self.file {
            file::save(path, &working)?;
        }
        *guard = working;
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| StrongboxError::Other("datastore lock poisoned".into()))
    }
}
