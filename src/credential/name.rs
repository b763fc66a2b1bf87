use std::fmt;

use crate::error::{Result, StrongboxError};

pub const MAX_NAME_LENGTH: usize = 1024;

const ALLOWED_PUNCTUATION: &[char] = &['_', '-', '.', '/', ':', '(', ')', '[', ']', '+'];

/// A validated credential name with exactly one leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CredentialName(String);

impl CredentialName {
    /// Normalize and validate. `foo` and `/foo` name the same credential.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw == "/" {
            return Err(StrongboxError::InvalidName(
                "A credential name must be provided".into(),
            ));
        }

        let name = if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{raw}")
        };

        if name.contains("//") {
            return Err(StrongboxError::InvalidName(format!(
                "'{raw}' must not contain consecutive slashes"
            )));
        }
        if name.ends_with('/') {
            return Err(StrongboxError::InvalidName(format!(
                "'{raw}' must not end with a slash"
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || ALLOWED_PUNCTUATION.contains(c)))
        {
            return Err(StrongboxError::InvalidName(format!(
                "'{raw}' contains '{bad}'; only alphanumeric characters and _-./:()[]+ are allowed"
            )));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(StrongboxError::InvalidName(format!(
                "names may be at most {MAX_NAME_LENGTH} characters"
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CredentialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CredentialName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_added() {
        assert_eq!(CredentialName::parse("foo").unwrap(), CredentialName::parse("/foo").unwrap());
        assert_eq!(CredentialName::parse("a/b/c").unwrap().as_str(), "/a/b/c");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "/", "//foo", "foo/", "/a//b", "has space", "back\\slash", "star*", "/ünï"] {
            assert!(
                matches!(CredentialName::parse(bad), Err(StrongboxError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn accepts_allowed_punctuation() {
        let name = CredentialName::parse("/deploy-1/job_2/v1.0:(blue)[x]+").unwrap();
        assert_eq!(name.as_str(), "/deploy-1/job_2/v1.0:(blue)[x]+");
    }

    #[test]
    fn enforces_max_length() {
        let exact = format!("/{}", "a".repeat(MAX_NAME_LENGTH - 1));
        assert!(CredentialName::parse(&exact).is_ok());
        let over = format!("/{}", "a".repeat(MAX_NAME_LENGTH));
        assert!(CredentialName::parse(&over).is_err());
    }
}
