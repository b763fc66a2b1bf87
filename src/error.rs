use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::credential::CredentialType;
use crate::permission::PermissionOperation;

/// Message returned for both unknown credentials and denied credential access.
pub const CONCEALED_ACCESS_MESSAGE: &str = "The request could not be completed because the credential does not exist or you do not have sufficient authorization.";

#[derive(Error, Debug)]
pub enum StrongboxError {
    #[error("Invalid credential name: {0}")]
    InvalidName(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Permission denied: '{actor}' may not {operation} '{path}'")]
    PermissionDenied {
        actor: String,
        path: String,
        operation: PermissionOperation,
    },

    #[error("Encryption key {0} is not configured; the stored value cannot be decrypted")]
    KeyNotFound(Uuid),

    #[error("The credential type cannot be modified: '{name}' is {existing}, request was {requested}")]
    TypeMismatch {
        name: String,
        existing: CredentialType,
        requested: CredentialType,
    },

    #[error("Invalid query parameter: {name}={value}")]
    InvalidQueryParameter { name: String, value: String },

    #[error("Encryption provider error: {message}")]
    EncryptionProvider { message: String, retryable: bool },

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Credential generation failed: {0}")]
    Generation(String),

    #[error("The encryption keys provided cannot decrypt any of the {total} value(s) in the store. Please make sure you've provided the necessary encryption keys.")]
    UnrecoverableKeySet { total: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl StrongboxError {
    /// Collapse "does not exist" and "not allowed" into one caller-visible error.
    ///
    /// Applied at the boundary of every credential-data operation so a caller
    /// cannot probe for the existence of names it has no access to. ACL
    /// management keeps the distinct `PermissionDenied`.
    pub fn conceal_access(self) -> Self {
        match self {
            StrongboxError::PermissionDenied { .. } | StrongboxError::NotFound(_) => {
                StrongboxError::NotFound(CONCEALED_ACCESS_MESSAGE.to_string())
            }
            other => other,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrongboxError::EncryptionProvider {
                retryable: true,
                ..
            }
        )
    }

    /// Return a typed exit code for this error category.
    pub fn exit_code(&self) -> i32 {
        match self {
            StrongboxError::InvalidName(_) => 2,
            StrongboxError::Validation(_) => 2,
            StrongboxError::NotFound(_) => 3,
            StrongboxError::PermissionDenied { .. } => 4,
            StrongboxError::KeyNotFound(_) => 5,
            StrongboxError::TypeMismatch { .. } => 2,
            StrongboxError::InvalidQueryParameter { .. } => 2,
            StrongboxError::EncryptionProvider { .. } => 6,
            StrongboxError::Decryption(_) => 5,
            StrongboxError::Generation(_) => 1,
            StrongboxError::UnrecoverableKeySet { .. } => 7,
            StrongboxError::Config(_) => 7,
            StrongboxError::Serialization(_) => 1,
            StrongboxError::Io(_) => 1,
            StrongboxError::Other(_) => 1,
        }
    }

    /// Return a string error code identifier.
    pub fn error_code(&self) -> &'static str {
        match self {
            StrongboxError::InvalidName(_) => "invalid_name",
            StrongboxError::Validation(_) => "validation_error",
            StrongboxError::NotFound(_) => "not_found",
            StrongboxError::PermissionDenied { .. } => "permission_denied",
            StrongboxError::KeyNotFound(_) => "key_not_found",
            StrongboxError::TypeMismatch { .. } => "type_mismatch",
            StrongboxError::InvalidQueryParameter { .. } => "invalid_query_parameter",
            StrongboxError::EncryptionProvider { .. } => "encryption_provider_error",
            StrongboxError::Decryption(_) => "decryption_error",
            StrongboxError::Generation(_) => "generation_error",
            StrongboxError::UnrecoverableKeySet { .. } => "unrecoverable_key_set",
            StrongboxError::Config(_) => "config_error",
            StrongboxError::Serialization(_) => "serialization_error",
            StrongboxError::Io(_) => "io_error",
            StrongboxError::Other(_) => "error",
        }
    }
}

/// JSON error response for --json mode.
#[derive(Serialize)]
pub struct JsonError {
    pub error: JsonErrorDetail,
}

#[derive(Serialize)]
pub struct JsonErrorDetail {
    pub code: String,
    pub message: String,
    pub exit_code: i32,
    pub retryable: bool,
}

impl JsonError {
    pub fn from_error(e: &StrongboxError) -> Self {
        Self {
            error: JsonErrorDetail {
                code: e.error_code().to_string(),
                message: e.to_string(),
                exit_code: e.exit_code(),
                retryable: e.is_retryable(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, StrongboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_and_not_found_conceal_to_the_same_message() {
        let denied = StrongboxError::PermissionDenied {
            actor: "uaa-user:alice".into(),
            path: "/secret".into(),
            operation: PermissionOperation::Read,
        }
        .conceal_access();
        let missing = StrongboxError::NotFound("no credential named /secret".into()).conceal_access();

        assert_eq!(denied.to_string(), missing.to_string());
        assert_eq!(denied.error_code(), "not_found");
    }

    #[test]
    fn key_not_found_is_not_concealed() {
        let err = StrongboxError::KeyNotFound(Uuid::nil()).conceal_access();
        assert!(matches!(err, StrongboxError::KeyNotFound(_)));
    }

    #[test]
    fn only_transient_provider_errors_are_retryable() {
        let transient = StrongboxError::EncryptionProvider {
            message: "timed out".into(),
            retryable: true,
        };
        let permanent = StrongboxError::EncryptionProvider {
            message: "bad key".into(),
            retryable: false,
        };
        assert!(transient.is_retryable());
        assert!(!permanent.is_retryable());
        assert!(!StrongboxError::Decryption("tag mismatch".into()).is_retryable());
    }
}
