//! Credentials: names, typed values and the versioned store that holds them.

pub mod generate;
pub mod name;
pub mod store;
pub mod value;

use std::fmt;
use std::str::FromStr;

use crate::datastore::VersionMetadata;
use crate::error::{Result, StrongboxError};
use crate::generator::GenerationParameters;
use crate::permission::PermissionRequest;
use crate::types::*;

pub use generate::{CredentialGenerationService, GenerateRequest};
pub use name::CredentialName;
pub use store::VersionedCredentialStore;
pub use value::{
    CertificateCredentialValue, CredentialType, CredentialValue, RsaCredentialValue, SshCredentialValue,
    UserCredentialValue,
};

/// One decrypted version as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialVersion {
    #[serde(rename = "id")]
    pub uuid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    #[serde(rename = "version_created_at")]
    pub created_at: DateTime<Utc>,
    pub value: CredentialValue,
    #[serde(skip_serializing_if = "is_default_metadata")]
    pub metadata: VersionMetadata,
}

fn is_default_metadata(metadata: &VersionMetadata) -> bool {
    *metadata == VersionMetadata::default()
}

impl CredentialVersion {
    pub fn generation_parameters(&self) -> Option<&GenerationParameters> {
        self.metadata.generation_parameters.as_ref()
    }

    pub fn is_transitional(&self) -> bool {
        self.metadata.is_transitional()
    }
}

/// What to do when the name already has a current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Keep the existing version.
    NoOverwrite,
    /// Always append.
    #[default]
    Overwrite,
    /// Append only if the value (or generation parameters) changed.
    Converge,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::NoOverwrite => "no-overwrite",
            WriteMode::Overwrite => "overwrite",
            WriteMode::Converge => "converge",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = StrongboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no-overwrite" | "no_overwrite" => Ok(WriteMode::NoOverwrite),
            "overwrite" => Ok(WriteMode::Overwrite),
            "converge" => Ok(WriteMode::Converge),
            other => Err(StrongboxError::Validation(format!(
                "The mode '{other}' is not supported. Valid values include 'no-overwrite', 'overwrite' and 'converge'."
            ))),
        }
    }
}

/// A value to store under a name.
#[derive(Debug, Clone)]
pub struct CredentialWrite {
    pub name: String,
    pub value: CredentialValue,
    pub mode: WriteMode,
    /// Parameters the value was generated from, kept for regeneration.
    pub generation_parameters: Option<GenerationParameters>,
    /// CA version that signed a generated certificate.
    pub signed_by: Option<Uuid>,
    /// Grants applied to the path in the same transaction as the write.
    pub additional_permissions: Vec<PermissionRequest>,
}

impl CredentialWrite {
    pub fn new(name: impl Into<String>, value: CredentialValue, mode: WriteMode) -> Self {
        Self {
            name: name.into(),
            value,
            mode,
            generation_parameters: None,
            signed_by: None,
            additional_permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<PermissionRequest>) -> Self {
        self.additional_permissions = permissions;
        self
    }
}

/// A credential visible under a path, as `find` lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundCredential {
    pub name: String,
    pub version_created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mode_parses_cli_spelling() {
        assert_eq!("no-overwrite".parse::<WriteMode>().unwrap(), WriteMode::NoOverwrite);
        assert_eq!("converge".parse::<WriteMode>().unwrap(), WriteMode::Converge);
        assert!("replace".parse::<WriteMode>().is_err());
        assert_eq!(WriteMode::default(), WriteMode::Overwrite);
    }

    #[test]
    fn version_serializes_with_public_field_names() {
        let version = CredentialVersion {
            uuid: Uuid::nil(),
            name: "/a".into(),
            credential_type: CredentialType::Password,
            created_at: Utc::now(),
            value: CredentialValue::Password("pw".into()),
            metadata: VersionMetadata::default(),
        };
        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json["type"], "password");
        assert_eq!(json["value"], "pw");
        assert!(json.get("metadata").is_none());
        assert!(json.get("version_created_at").is_some());
    }
}
