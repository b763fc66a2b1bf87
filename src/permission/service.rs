//! ACL management. Every mutation is itself gated by WRITE_ACL on the
//! target path, reads by READ_ACL.

use std::sync::Arc;

use super::{PermissionCheckingService, PermissionEntry, PermissionOperation, WILDCARD_SUFFIX};
use crate::config::PermissionBootstrap;
use crate::credential::CredentialName;
use crate::datastore::{Datastore, StoreState};
use crate::error::{Result, StrongboxError};
use crate::types::*;

/// One actor's operations to grant on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub actor: String,
    pub operations: BTreeSet<PermissionOperation>,
}

impl PermissionRequest {
    pub fn new(actor: impl Into<String>, operations: impl IntoIterator<Item = PermissionOperation>) -> Self {
        Self {
            actor: actor.into(),
            operations: operations.into_iter().collect(),
        }
    }
}

#[derive(Clone)]
pub struct PermissionService {
    datastore: Arc<Datastore>,
    checker: PermissionCheckingService,
}

impl PermissionService {
    pub fn new(datastore: Arc<Datastore>, checker: PermissionCheckingService) -> Self {
        Self { datastore, checker }
    }

    pub fn checker(&self) -> &PermissionCheckingService {
        &self.checker
    }

    /// Merge the requested operations into the entries at `path`.
    pub fn save_permissions(
        &self,
        caller: &str,
        path: &str,
        requests: &[PermissionRequest],
    ) -> Result<Vec<PermissionEntry>> {
        let path = acl_path(path)?;
        validate_requests(caller, requests)?;

        self.datastore.transaction(|state| {
            self.checker
                .require_in(state, caller, &path, PermissionOperation::WriteAcl)?;
            Ok(apply_requests(state, &path, requests))
        })
    }

    /// Replace the operations of an existing entry.
    pub fn patch_permission(
        &self,
        caller: &str,
        uuid: Uuid,
        operations: &BTreeSet<PermissionOperation>,
    ) -> Result<PermissionEntry> {
        if operations.is_empty() {
            return Err(empty_operations());
        }

        self.datastore.transaction(|state| {
            let mut entry = state
                .permission(&uuid)
                .cloned()
                .ok_or_else(|| StrongboxError::NotFound(format!("No permission with uuid {uuid}")))?;
            self.checker
                .require_in(state, caller, &entry.path, PermissionOperation::WriteAcl)?;
            if entry.actor == caller {
                return Err(self_modification());
            }
            entry.operations = operations.clone();
            Ok(state.upsert_permission(entry))
        })
    }

    pub fn delete_permission(&self, caller: &str, path: &str, actor: &str) -> Result<PermissionEntry> {
        let path = acl_path(path)?;
        if actor == caller {
            return Err(self_modification());
        }

        self.datastore.transaction(|state| {
            self.checker
                .require_in(state, caller, &path, PermissionOperation::WriteAcl)?;
            let entry = state.permission_for(&path, actor).cloned().ok_or_else(|| {
                StrongboxError::NotFound(format!("No permission for actor '{actor}' on '{path}'"))
            })?;
            state.delete_permission(&path, actor);
            Ok(entry)
        })
    }

    pub fn get_all_permissions(&self, caller: &str, path: &str) -> Result<Vec<PermissionEntry>> {
        let path = acl_path(path)?;
        self.checker
            .require(caller, &path, PermissionOperation::ReadAcl)?;
        self.checker.get_all_permissions(&path)
    }

    pub fn find_by_path_and_actor(&self, caller: &str, path: &str, actor: &str) -> Result<PermissionEntry> {
        let path = acl_path(path)?;
        self.checker
            .require(caller, &path, PermissionOperation::ReadAcl)?;
        self.checker
            .find_by_path_and_actor(&path, actor)?
            .ok_or_else(|| StrongboxError::NotFound(format!("No permission for actor '{actor}' on '{path}'")))
    }

    /// Ensure the configured entries exist. Operations are merged into any
    /// entry already present, never removed.
    pub fn bootstrap(&self, entries: &[PermissionBootstrap]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let prepared = entries
            .iter()
            .map(|entry| {
                let operations: BTreeSet<PermissionOperation> = entry.operations.iter().copied().collect();
                if operations.is_empty() {
                    return Err(empty_operations());
                }
                Ok((acl_path(&entry.path)?, &entry.actors, operations))
            })
            .collect::<Result<Vec<_>>>()?;

        self.datastore.transaction(|state| {
            for (path, actors, operations) in &prepared {
                for actor in actors.iter() {
                    state.merge_permission(path, actor, operations);
                }
            }
            Ok(())
        })?;
        tracing::info!(entries = prepared.len(), "bootstrap permissions ensured");
        Ok(())
    }
}

/// Apply write-time grants inside an open transaction. The caller has
/// already been checked for WRITE_ACL.
pub(crate) fn apply_requests(
    state: &mut StoreState,
    path: &str,
    requests: &[PermissionRequest],
) -> Vec<PermissionEntry> {
    requests
        .iter()
        .map(|request| state.merge_permission(path, &request.actor, &request.operations))
        .collect()
}

pub(crate) fn validate_requests(caller: &str, requests: &[PermissionRequest]) -> Result<()> {
    for request in requests {
        if request.actor.trim().is_empty() {
            return Err(StrongboxError::Validation("A permission entry must name an actor".into()));
        }
        if request.operations.is_empty() {
            return Err(empty_operations());
        }
        if request.actor == caller {
            return Err(self_modification());
        }
    }
    Ok(())
}

/// Credential-name rules, plus an optional trailing `/*`.
pub fn acl_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed == "*" || trimmed == WILDCARD_SUFFIX {
        return Ok(WILDCARD_SUFFIX.to_string());
    }
    match trimmed.strip_suffix(WILDCARD_SUFFIX) {
        Some(prefix) => Ok(format!("{}{WILDCARD_SUFFIX}", CredentialName::parse(prefix)?)),
        None => Ok(CredentialName::parse(trimmed)?.into_string()),
    }
}

fn empty_operations() -> StrongboxError {
    StrongboxError::Validation("A permission entry must include at least one operation".into())
}

fn self_modification() -> StrongboxError {
    StrongboxError::Validation("Modification of access control for the authenticated user is not allowed".into())
}
