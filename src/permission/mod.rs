pub mod service;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::datastore::{Datastore, StoreState};
use crate::error::{Result, StrongboxError};
use crate::types::*;

pub use service::{PermissionRequest, PermissionService};

/// Suffix marking a stored path as covering everything beneath it.
pub const WILDCARD_SUFFIX: &str = "/*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOperation {
    Read,
    Write,
    Delete,
    ReadAcl,
    WriteAcl,
}

impl PermissionOperation {
    pub const ALL: [PermissionOperation; 5] = [
        PermissionOperation::Read,
        PermissionOperation::Write,
        PermissionOperation::Delete,
        PermissionOperation::ReadAcl,
        PermissionOperation::WriteAcl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionOperation::Read => "read",
            PermissionOperation::Write => "write",
            PermissionOperation::Delete => "delete",
            PermissionOperation::ReadAcl => "read_acl",
            PermissionOperation::WriteAcl => "write_acl",
        }
    }
}

impl fmt::Display for PermissionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionOperation {
    type Err = StrongboxError;

    fn from_str(s: &str) -> Result<Self> {
        PermissionOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| StrongboxError::Validation(format!("The provided operation is not supported: {s}")))
    }
}

/// One ACL row. At most one entry exists per (path, actor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub uuid: Uuid,
    pub path: String,
    pub actor: String,
    pub operations: BTreeSet<PermissionOperation>,
}

impl PermissionEntry {
    /// Whether this entry applies to `path`: an exact match, or an explicit
    /// `/*` entry whose prefix contains it.
    pub fn covers(&self, path: &str) -> bool {
        if self.path == path {
            return true;
        }
        match self.path.strip_suffix('*') {
            Some(prefix) if self.path.ends_with(WILDCARD_SUFFIX) => path.starts_with(prefix),
            _ => false,
        }
    }
}

/// Ensure a single leading separator.
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Answers "may this actor do this to this path" from stored ACL entries.
#[derive(Clone)]
pub struct PermissionCheckingService {
    datastore: Arc<Datastore>,
    enforce: bool,
}

impl PermissionCheckingService {
    pub fn new(datastore: Arc<Datastore>, enforce: bool) -> Self {
        Self { datastore, enforce }
    }

    pub fn enforcing(&self) -> bool {
        self.enforce
    }

    pub fn has_permission(&self, actor: &str, path: &str, operation: PermissionOperation) -> Result<bool> {
        if !self.enforce {
            return Ok(true);
        }
        let path = normalize_path(path);
        self.datastore
            .read(|state| Ok(Self::allows(state, actor, &path, operation)))
    }

    /// Same check against a state already held by the caller, for use inside
    /// a transaction.
    pub fn has_permission_in(
        &self,
        state: &StoreState,
        actor: &str,
        path: &str,
        operation: PermissionOperation,
    ) -> bool {
        !self.enforce || Self::allows(state, actor, &normalize_path(path), operation)
    }

    /// `Ok(())` or the `PermissionDenied` error naming what was refused.
    pub fn require(&self, actor: &str, path: &str, operation: PermissionOperation) -> Result<()> {
        if self.has_permission(actor, path, operation)? {
            Ok(())
        } else {
            Err(denied(actor, path, operation))
        }
    }

    pub fn require_in(
        &self,
        state: &StoreState,
        actor: &str,
        path: &str,
        operation: PermissionOperation,
    ) -> Result<()> {
        if self.has_permission_in(state, actor, path, operation) {
            Ok(())
        } else {
            Err(denied(actor, path, operation))
        }
    }

    pub fn find_by_path_and_actor(&self, path: &str, actor: &str) -> Result<Option<PermissionEntry>> {
        let path = normalize_path(path);
        self.datastore
            .read(|state| Ok(state.permission_for(&path, actor).cloned()))
    }

    /// Entries stored for exactly this path.
    pub fn get_all_permissions(&self, path: &str) -> Result<Vec<PermissionEntry>> {
        let path = normalize_path(path);
        self.datastore
            .read(|state| Ok(state.permissions_at(&path).cloned().collect()))
    }

    fn allows(state: &StoreState, actor: &str, path: &str, operation: PermissionOperation) -> bool {
        state
            .permissions_for_actor(actor)
            .any(|entry| entry.covers(path) && entry.operations.contains(&operation))
    }
}

pub(crate) fn denied(actor: &str, path: &str, operation: PermissionOperation) -> StrongboxError {
    StrongboxError::PermissionDenied {
        actor: actor.to_string(),
        path: normalize_path(path),
        operation,
    }
}
