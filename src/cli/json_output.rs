use serde::Serialize;

use strongbox::credential::{CredentialVersion, FoundCredential};
use strongbox::permission::PermissionEntry;

/// JSON response for `strongbox get --json`.
#[derive(Serialize)]
pub struct GetResponse {
    pub data: Vec<CredentialVersion>,
}

/// JSON response for `strongbox set --json`. The value is not echoed.
#[derive(Serialize)]
pub struct WriteResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub version_created_at: String,
}

impl From<&CredentialVersion> for WriteResponse {
    fn from(version: &CredentialVersion) -> Self {
        Self {
            id: version.uuid.to_string(),
            name: version.name.clone(),
            credential_type: version.credential_type.to_string(),
            version_created_at: version.created_at.to_rfc3339(),
        }
    }
}

/// JSON response for `strongbox find --json`.
#[derive(Serialize)]
pub struct FindResponse {
    pub credentials: Vec<FoundCredential>,
}

/// JSON response for `strongbox bulk-regenerate --json`.
#[derive(Serialize)]
pub struct BulkRegenerateResponse {
    pub regenerated_credentials: Vec<String>,
}

/// JSON response for `strongbox delete --json`.
#[derive(Serialize)]
pub struct DeleteResponse {
    pub name: String,
    pub deleted: bool,
}

/// JSON response for `strongbox permission list --json`.
#[derive(Serialize)]
pub struct PermissionListResponse {
    pub path: String,
    pub permissions: Vec<PermissionEntry>,
}
