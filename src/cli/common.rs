use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use strongbox::config::Config;
use strongbox::credential::{CredentialType, CredentialValue, WriteMode};
use strongbox::error::{Result, StrongboxError};
use strongbox::permission::PermissionOperation;

/// Load the config named by `--config`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) if !path.exists() => Err(StrongboxError::Config(format!(
            "config file {} does not exist",
            path.display()
        ))),
        Some(path) => Config::load(path),
        None => Config::load(&Config::default_path()),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string(value).map_err(|e| StrongboxError::Serialization(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}

/// Read all of stdin, minus the trailing newline `echo` adds.
pub fn read_stdin() -> Result<Zeroizing<String>> {
    let mut value = Zeroizing::new(String::new());
    io::stdin()
        .read_to_string(&mut value)
        .map_err(|e| StrongboxError::Other(format!("Failed to read from stdin: {}", e)))?;
    let trimmed = value.trim_end_matches('\n').len();
    value.truncate(trimmed);
    Ok(value)
}

/// Build a value of `credential_type` from stdin input. String types take
/// the input verbatim; structured types expect a JSON object.
pub fn parse_value(credential_type: CredentialType, input: &str) -> Result<CredentialValue> {
    match credential_type {
        CredentialType::Value => Ok(CredentialValue::Value(input.to_string())),
        CredentialType::Password => Ok(CredentialValue::Password(input.to_string())),
        other => CredentialValue::from_json(other, input),
    }
}

/// Text rendering of a value: plain strings as-is, the rest as pretty JSON.
pub fn render_value(value: &CredentialValue) -> Result<Zeroizing<String>> {
    match value {
        CredentialValue::Value(s) | CredentialValue::Password(s) => Ok(Zeroizing::new(s.clone())),
        other => serde_json::to_string_pretty(other)
            .map(Zeroizing::new)
            .map_err(|e| StrongboxError::Serialization(e.to_string())),
    }
}

pub fn parse_mode(mode: &str) -> Result<WriteMode> {
    mode.parse()
}

pub fn parse_operations(operations: &[String]) -> Result<Vec<PermissionOperation>> {
    operations.iter().map(|op| op.trim().parse()).collect()
}

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| StrongboxError::InvalidQueryParameter {
        name: "id".into(),
        value: raw.to_string(),
    })
}
