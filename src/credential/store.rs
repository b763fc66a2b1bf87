//! Append-only, permission-checked version history per credential name.
//!
//! Every operation parses the name, then checks the actor's permission for
//! the implied operation, and only then looks at what is stored. Ciphertext
//! is copied out under the datastore lock and decrypted after it is released,
//! except for the decrypt-and-compare of a CONVERGE write, which has to be
//! consistent with the append that may follow it.

use std::sync::Arc;

use super::{CredentialName, CredentialType, CredentialValue, CredentialVersion, CredentialWrite, FoundCredential, WriteMode};
use crate::datastore::{CertificateMetadata, CredentialVersionRecord, Datastore, StoreState, VersionMetadata};
use crate::encryption::{EncryptedValue, Encryptor};
use crate::error::{Result, StrongboxError};
use crate::generator::certificate::read_certificate;
use crate::generator::GenerationParameters;
use crate::permission::service::{apply_requests, validate_requests};
use crate::permission::{PermissionCheckingService, PermissionOperation};
use crate::types::*;

/// A version copied out of the store, still encrypted.
struct SealedVersion {
    name: String,
    record: CredentialVersionRecord,
    value: EncryptedValue,
}

enum WriteOutcome {
    Existing(SealedVersion),
    Created(CredentialVersionRecord),
}

#[derive(Clone)]
pub struct VersionedCredentialStore {
    datastore: Arc<Datastore>,
    encryptor: Encryptor,
    permissions: PermissionCheckingService,
    clock: Arc<dyn Clock>,
}

impl VersionedCredentialStore {
    pub fn new(
        datastore: Arc<Datastore>,
        encryptor: Encryptor,
        permissions: PermissionCheckingService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            datastore,
            encryptor,
            permissions,
            clock,
        }
    }

    pub fn permissions(&self) -> &PermissionCheckingService {
        &self.permissions
    }

    /// Every version, newest first. Unknown names give an empty list.
    pub fn find_all_by_name(&self, actor: &str, name: &str) -> Result<Vec<CredentialVersion>> {
        let name = CredentialName::parse(name)?;
        self.permissions
            .require(actor, name.as_str(), PermissionOperation::Read)?;

        let sealed = self.datastore.read(|state| {
            let Some(credential) = state.credential_by_name(name.as_str()) else {
                return Ok(Vec::new());
            };
            state
                .versions_of(credential)
                .into_iter()
                .map(|record| seal(state, &credential.name, record))
                .collect()
        })?;
        self.open_all(sealed)
    }

    /// The `n` most recent versions.
    pub fn find_n_by_name(&self, actor: &str, name: &str, n: i64) -> Result<Vec<CredentialVersion>> {
        let name = CredentialName::parse(name)?;
        self.permissions
            .require(actor, name.as_str(), PermissionOperation::Read)?;
        if n <= 0 {
            return Err(StrongboxError::InvalidQueryParameter {
                name: "versions".into(),
                value: n.to_string(),
            });
        }

        let limit = usize::try_from(n).unwrap_or(usize::MAX);
        let sealed = self.datastore.read(|state| {
            let Some(credential) = state.credential_by_name(name.as_str()) else {
                return Ok(Vec::new());
            };
            state
                .versions_of(credential)
                .into_iter()
                .take(limit)
                .map(|record| seal(state, &credential.name, record))
                .collect()
        })?;
        self.open_all(sealed)
    }

    /// The current version; for a certificate mid-rotation, also its
    /// transitional version.
    pub fn find_active_by_name(&self, actor: &str, name: &str) -> Result<Vec<CredentialVersion>> {
        let name = CredentialName::parse(name)?;
        self.permissions
            .require(actor, name.as_str(), PermissionOperation::Read)?;

        let sealed = self.datastore.read(|state| {
            let Some(credential) = state.credential_by_name(name.as_str()) else {
                return Ok(Vec::new());
            };
            let mut active = Vec::with_capacity(2);
            if let Some(current) = state.current_version(credential) {
                active.push(seal(state, &credential.name, current)?);
            }
            if credential.credential_type == CredentialType::Certificate {
                let transitional = state
                    .versions_of(credential)
                    .into_iter()
                    .find(|v| v.metadata.is_transitional());
                if let Some(record) = transitional {
                    active.push(seal(state, &credential.name, record)?);
                }
            }
            Ok(active)
        })?;
        self.open_all(sealed)
    }

    pub fn find_by_uuid(&self, actor: &str, uuid: Uuid) -> Result<CredentialVersion> {
        let sealed = self.datastore.read(|state| {
            let record = state.version(&uuid).ok_or_else(|| version_not_found(uuid))?;
            let credential = state
                .credential(&record.credential_uuid)
                .ok_or_else(|| version_not_found(uuid))?;
            self.permissions
                .require_in(state, actor, &credential.name, PermissionOperation::Read)?;
            seal(state, &credential.name, record)
        })?;
        self.open(sealed)
    }

    /// Append a version according to `write.mode`. Creating a name needs
    /// WRITE on it like any other write; grants riding along need WRITE_ACL.
    pub fn write(&self, actor: &str, write: CredentialWrite) -> Result<CredentialVersion> {
        let CredentialWrite {
            name,
            value,
            mode,
            generation_parameters,
            signed_by,
            additional_permissions,
        } = write;
        let name = CredentialName::parse(&name)?;
        // Refuse early so unauthorized callers never reach hashing or the key provider.
        self.permissions
            .require(actor, name.as_str(), PermissionOperation::Write)?;
        let value = prepare_value(value)?;
        let credential_type = value.credential_type();
        if let Some(params) = &generation_parameters {
            if params.credential_type() != credential_type {
                return Err(StrongboxError::Validation(format!(
                    "generation parameters for {} cannot describe a {credential_type} value",
                    params.credential_type()
                )));
            }
        }
        if !additional_permissions.is_empty() {
            validate_requests(actor, &additional_permissions)?;
        }

        let metadata = VersionMetadata {
            certificate: certificate_metadata(name.as_str(), &value, generation_parameters.as_ref(), signed_by)?,
            generation_parameters: generation_parameters.clone(),
        };
        let encrypted = self.encryptor.encrypt(&value.to_plaintext()?)?;
        let now = self.clock.now();

        let outcome = self.datastore.transaction(|state| {
            self.permissions
                .require_in(state, actor, name.as_str(), PermissionOperation::Write)?;
            if !additional_permissions.is_empty() {
                self.permissions
                    .require_in(state, actor, name.as_str(), PermissionOperation::WriteAcl)?;
            }

            let existing = state.credential_by_name(name.as_str()).cloned();
            if let Some(credential) = &existing {
                if credential.credential_type != credential_type {
                    return Err(StrongboxError::TypeMismatch {
                        name: credential.name.clone(),
                        existing: credential.credential_type,
                        requested: credential_type,
                    });
                }
                if let Some(current) = state.current_version(credential) {
                    let keep = match mode {
                        WriteMode::Overwrite => false,
                        WriteMode::NoOverwrite => true,
                        WriteMode::Converge => {
                            self.converges(state, current, &value, generation_parameters.as_ref(), signed_by)?
                        }
                    };
                    if keep {
                        return Ok(WriteOutcome::Existing(seal(state, &credential.name, current)?));
                    }
                }
            }

            let credential_uuid = match &existing {
                Some(credential) => credential.uuid,
                None => state.insert_credential(name.as_str(), credential_type, now),
            };
            let record = state.append_version(credential_uuid, credential_type, now, encrypted, metadata)?;
            apply_requests(state, name.as_str(), &additional_permissions);
            Ok(WriteOutcome::Created(record))
        })?;

        match outcome {
            WriteOutcome::Existing(sealed) => {
                tracing::debug!(name = %name, mode = %mode, "kept existing version");
                self.open(sealed)
            }
            WriteOutcome::Created(record) => {
                tracing::debug!(name = %name, version = %record.uuid, "appended version");
                Ok(CredentialVersion {
                    uuid: record.uuid,
                    name: name.into_string(),
                    credential_type,
                    created_at: record.created_at,
                    value,
                    metadata: record.metadata,
                })
            }
        }
    }

    /// The current version, when a generated write in `mode` with these
    /// parameters would keep it. Checked under WRITE, so generation can be
    /// skipped before any key material is produced.
    pub fn keeps_current(
        &self,
        actor: &str,
        name: &str,
        mode: WriteMode,
        parameters: &GenerationParameters,
        signed_by: Option<Uuid>,
    ) -> Result<Option<CredentialVersion>> {
        let name = CredentialName::parse(name)?;
        self.permissions
            .require(actor, name.as_str(), PermissionOperation::Write)?;
        if mode == WriteMode::Overwrite {
            return Ok(None);
        }

        let sealed = self.datastore.read(|state| {
            let Some(credential) = state.credential_by_name(name.as_str()) else {
                return Ok(None);
            };
            if credential.credential_type != parameters.credential_type() {
                return Err(StrongboxError::TypeMismatch {
                    name: credential.name.clone(),
                    existing: credential.credential_type,
                    requested: parameters.credential_type(),
                });
            }
            let Some(current) = state.current_version(credential) else {
                return Ok(None);
            };
            let keep = mode == WriteMode::NoOverwrite || {
                let stored_signer = current.metadata.certificate.as_ref().and_then(|c| c.signed_by_version);
                current.metadata.generation_parameters.as_ref() == Some(parameters) && stored_signer == signed_by
            };
            if keep {
                seal(state, &credential.name, current).map(Some)
            } else {
                Ok(None)
            }
        })?;
        sealed.map(|s| self.open(s)).transpose()
    }

    /// Whether a CONVERGE write matches the current version closely enough
    /// to keep it. Generated values compare parameters (and the signing CA
    /// version); set values compare decrypted plaintext.
    fn converges(
        &self,
        state: &StoreState,
        current: &CredentialVersionRecord,
        value: &CredentialValue,
        requested: Option<&GenerationParameters>,
        signed_by: Option<Uuid>,
    ) -> Result<bool> {
        if let Some(requested) = requested {
            let stored_signer = current
                .metadata
                .certificate
                .as_ref()
                .and_then(|c| c.signed_by_version);
            return Ok(current.metadata.generation_parameters.as_ref() == Some(requested)
                && stored_signer == signed_by);
        }

        let stored = state
            .encrypted_value(&current.encrypted_value_uuid)
            .ok_or_else(|| StrongboxError::Other(format!("version {} has no stored value", current.uuid)))?;
        let plaintext = self.encryptor.decrypt(&stored.value)?;
        let stored_value = CredentialValue::from_json(current.credential_type, &plaintext)?;
        Ok(stored_value.converges_with(value))
    }

    /// Remove a credential with all versions and ACL entries on its path.
    /// Returns false if the name did not exist.
    pub fn delete(&self, actor: &str, name: &str) -> Result<bool> {
        let name = CredentialName::parse(name)?;
        let deleted = self.datastore.transaction(|state| {
            self.permissions
                .require_in(state, actor, name.as_str(), PermissionOperation::Delete)?;
            Ok(state.delete_credential(name.as_str()))
        })?;
        if deleted {
            tracing::debug!(name = %name, "deleted credential");
        }
        Ok(deleted)
    }

    /// Credentials at or below `path` the actor may read, newest first.
    pub fn find_by_path(&self, actor: &str, path: &str) -> Result<Vec<FoundCredential>> {
        let prefix = match path.trim() {
            "" | "/" => "/".to_string(),
            other => CredentialName::parse(other.trim_end_matches('/'))?.into_string(),
        };

        let mut found = self.datastore.read(|state| {
            Ok(state
                .credentials_under(&prefix)
                .filter(|c| {
                    self.permissions
                        .has_permission_in(state, actor, &c.name, PermissionOperation::Read)
                })
                .filter_map(|c| {
                    state.current_version(c).map(|v| FoundCredential {
                        name: c.name.clone(),
                        version_created_at: v.created_at,
                    })
                })
                .collect::<Vec<_>>())
        })?;
        found.sort_by(|a, b| {
            b.version_created_at
                .cmp(&a.version_created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(found)
    }

    /// Mark `version` as the certificate's transitional version, or clear it.
    /// The current version cannot be marked; the certificate must keep one.
    pub fn update_transitional_version(&self, actor: &str, name: &str, version: Option<Uuid>) -> Result<()> {
        let name = CredentialName::parse(name)?;
        self.datastore.transaction(|state| {
            self.permissions
                .require_in(state, actor, name.as_str(), PermissionOperation::Write)?;
            let credential = state
                .credential_by_name(name.as_str())
                .cloned()
                .ok_or_else(|| StrongboxError::NotFound(format!("credential {name}")))?;
            if credential.credential_type != CredentialType::Certificate {
                return Err(StrongboxError::Validation(
                    "Transitional versions are only supported for certificates".into(),
                ));
            }
            if let Some(uuid) = version {
                if !credential.versions.contains(&uuid) {
                    return Err(StrongboxError::Validation(format!(
                        "Version {uuid} does not belong to {name}"
                    )));
                }
                if state.current_version(&credential).map(|v| v.uuid) == Some(uuid) {
                    return Err(StrongboxError::Validation(format!(
                        "Version {uuid} is the current version of {name} and cannot be transitional"
                    )));
                }
            }

            for uuid in &credential.versions {
                if let Some(metadata) = state.version_metadata_mut(uuid) {
                    let certificate = metadata.certificate.get_or_insert_with(CertificateMetadata::default);
                    certificate.transitional = Some(*uuid) == version;
                }
            }
            Ok(())
        })
    }

    /// Names of certificates whose current version was signed by `ca_name`.
    pub fn certificates_signed_by(&self, actor: &str, ca_name: &str) -> Result<Vec<String>> {
        let ca_name = CredentialName::parse(ca_name)?;
        self.permissions
            .require(actor, ca_name.as_str(), PermissionOperation::Read)?;
        self.datastore.read(|state| {
            Ok(state
                .certificates_signed_by(ca_name.as_str())
                .into_iter()
                .map(|c| c.name.clone())
                .collect())
        })
    }

    fn open(&self, sealed: SealedVersion) -> Result<CredentialVersion> {
        let plaintext = self.encryptor.decrypt(&sealed.value)?;
        let value = CredentialValue::from_json(sealed.record.credential_type, &plaintext)?;
        Ok(CredentialVersion {
            uuid: sealed.record.uuid,
            name: sealed.name,
            credential_type: sealed.record.credential_type,
            created_at: sealed.record.created_at,
            value,
            metadata: sealed.record.metadata,
        })
    }

    fn open_all(&self, sealed: Vec<SealedVersion>) -> Result<Vec<CredentialVersion>> {
        sealed.into_iter().map(|s| self.open(s)).collect()
    }
}

fn seal(state: &StoreState, name: &str, record: &CredentialVersionRecord) -> Result<SealedVersion> {
    let value = state
        .encrypted_value(&record.encrypted_value_uuid)
        .ok_or_else(|| StrongboxError::Other(format!("version {} has no stored value", record.uuid)))?;
    Ok(SealedVersion {
        name: name.to_string(),
        record: record.clone(),
        value: value.value.clone(),
    })
}

fn version_not_found(uuid: Uuid) -> StrongboxError {
    StrongboxError::NotFound(format!("credential version {uuid}"))
}

/// Validate and fill derived fields.
fn prepare_value(value: CredentialValue) -> Result<CredentialValue> {
    value.validate()?;
    Ok(match value {
        CredentialValue::User(user) => CredentialValue::User(user.with_hash()?),
        CredentialValue::Ssh(ssh) => CredentialValue::Ssh(ssh.with_fingerprint()),
        other => other,
    })
}

fn certificate_metadata(
    name: &str,
    value: &CredentialValue,
    params: Option<&GenerationParameters>,
    signed_by: Option<Uuid>,
) -> Result<Option<CertificateMetadata>> {
    let CredentialValue::Certificate(certificate) = value else {
        return Ok(None);
    };
    let facts = read_certificate(&certificate.certificate)?;
    Ok(Some(CertificateMetadata {
        ca_name: params
            .and_then(GenerationParameters::certificate)
            .and_then(|p| p.ca_name.clone())
            .or_else(|| facts.self_signed.then(|| name.to_string())),
        signed_by_version: signed_by,
        self_signed: facts.self_signed,
        is_ca: facts.is_ca,
        transitional: false,
        expiry: facts.expiry,
    }))
}
