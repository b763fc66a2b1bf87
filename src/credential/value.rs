use std::fmt;
use std::str::FromStr;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, StrongboxError};
use crate::generator::rsa_keys;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Value,
    Json,
    Password,
    User,
    Ssh,
    Rsa,
    Certificate,
}

impl CredentialType {
    pub const ALL: [CredentialType; 7] = [
        CredentialType::Value,
        CredentialType::Json,
        CredentialType::Password,
        CredentialType::User,
        CredentialType::Ssh,
        CredentialType::Rsa,
        CredentialType::Certificate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Value => "value",
            CredentialType::Json => "json",
            CredentialType::Password => "password",
            CredentialType::User => "user",
            CredentialType::Ssh => "ssh",
            CredentialType::Rsa => "rsa",
            CredentialType::Certificate => "certificate",
        }
    }

    /// Types with a generator.
    pub fn is_generatable(&self) -> bool {
        !matches!(self, CredentialType::Value | CredentialType::Json)
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = StrongboxError;

    fn from_str(s: &str) -> Result<Self> {
        CredentialType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                StrongboxError::Validation(format!(
                    "The request does not include a valid type. Valid values include 'value', 'json', 'password', 'user', 'ssh', 'rsa' and 'certificate'. Got '{s}'"
                ))
            })
    }
}

/// A decrypted credential value. Serializes as the bare inner value.
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CredentialValue {
    Value(String),
    Json(serde_json::Value),
    Password(String),
    User(UserCredentialValue),
    Ssh(SshCredentialValue),
    Rsa(RsaCredentialValue),
    Certificate(CertificateCredentialValue),
}

impl CredentialValue {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialValue::Value(_) => CredentialType::Value,
            CredentialValue::Json(_) => CredentialType::Json,
            CredentialValue::Password(_) => CredentialType::Password,
            CredentialValue::User(_) => CredentialType::User,
            CredentialValue::Ssh(_) => CredentialType::Ssh,
            CredentialValue::Rsa(_) => CredentialType::Rsa,
            CredentialValue::Certificate(_) => CredentialType::Certificate,
        }
    }

    /// Parse a value of the given type from its JSON form.
    pub fn from_json(credential_type: CredentialType, json: &str) -> Result<Self> {
        let value = match credential_type {
            CredentialType::Value => CredentialValue::Value(parse(json)?),
            CredentialType::Json => CredentialValue::Json(parse(json)?),
            CredentialType::Password => CredentialValue::Password(parse(json)?),
            CredentialType::User => CredentialValue::User(parse(json)?),
            CredentialType::Ssh => CredentialValue::Ssh(parse(json)?),
            CredentialType::Rsa => CredentialValue::Rsa(parse(json)?),
            CredentialType::Certificate => CredentialValue::Certificate(parse(json)?),
        };
        Ok(value)
    }

    /// The string that gets encrypted.
    pub fn to_plaintext(&self) -> Result<Zeroizing<String>> {
        serde_json::to_string(self)
            .map(Zeroizing::new)
            .map_err(|e| StrongboxError::Serialization(e.to_string()))
    }

    /// Reject values that are empty or malformed for their type.
    pub fn validate(&self) -> Result<()> {
        match self {
            CredentialValue::Value(v) | CredentialValue::Password(v) if v.is_empty() => Err(
                StrongboxError::Validation("A non-empty value must be specified for the credential".into()),
            ),
            CredentialValue::Json(v) if !v.is_object() => Err(StrongboxError::Validation(
                "Value must be a JSON object".into(),
            )),
            CredentialValue::User(user) if user.password.is_empty() => Err(StrongboxError::Validation(
                "A password must be specified for a user credential".into(),
            )),
            CredentialValue::Ssh(ssh) if ssh.public_key.is_empty() && ssh.private_key.is_empty() => Err(
                StrongboxError::Validation("At least one of public_key or private_key must be specified".into()),
            ),
            CredentialValue::Rsa(rsa) if rsa.public_key.is_empty() && rsa.private_key.is_empty() => Err(
                StrongboxError::Validation("At least one of public_key or private_key must be specified".into()),
            ),
            CredentialValue::Certificate(cert) if cert.certificate.is_empty() => Err(StrongboxError::Validation(
                "A certificate must be specified".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Whether writing `other` over `self` would change nothing a consumer
    /// can observe. Derived fields (password hash, fingerprint) are ignored.
    pub fn converges_with(&self, other: &CredentialValue) -> bool {
        match (self, other) {
            (CredentialValue::User(a), CredentialValue::User(b)) => {
                a.username == b.username && a.password == b.password
            }
            (CredentialValue::Ssh(a), CredentialValue::Ssh(b)) => {
                a.public_key == b.public_key && a.private_key == b.private_key
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialValue::{}(<redacted>)", self.credential_type())
    }
}

fn parse<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| StrongboxError::Validation(format!("Invalid credential value: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct UserCredentialValue {
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    /// Argon2 PHC string over `password`; recomputed with a fresh salt on every write.
    #[serde(default)]
    pub password_hash: String,
}

impl UserCredentialValue {
    pub fn new(username: Option<String>, password: String) -> Result<Self> {
        let password_hash = hash_password(&password)?;
        Ok(Self {
            username,
            password,
            password_hash,
        })
    }

    /// Fill in the hash for values supplied without one.
    pub fn with_hash(mut self) -> Result<Self> {
        if self.password_hash.is_empty() {
            self.password_hash = hash_password(&self.password)?;
        }
        Ok(self)
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|hash| Argon2::default().verify_password(candidate.as_bytes(), &hash).is_ok())
            .unwrap_or(false)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StrongboxError::Generation(format!("password hashing failed: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SshCredentialValue {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub public_key_fingerprint: Option<String>,
}

impl SshCredentialValue {
    pub fn new(public_key: String, private_key: String) -> Self {
        let public_key_fingerprint = rsa_keys::ssh_fingerprint(&public_key).ok();
        Self {
            public_key,
            private_key,
            public_key_fingerprint,
        }
    }

    /// Fill in the fingerprint when the public key is parseable.
    pub fn with_fingerprint(mut self) -> Self {
        if self.public_key_fingerprint.is_none() {
            self.public_key_fingerprint = rsa_keys::ssh_fingerprint(&self.public_key).ok();
        }
        self
    }

    /// Comment suffix of the public key line, if any.
    pub fn comment(&self) -> Option<&str> {
        self.public_key
            .splitn(3, ' ')
            .nth(2)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RsaCredentialValue {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CertificateCredentialValue {
    #[serde(default)]
    pub ca: Option<String>,
    pub certificate: String,
    #[serde(default)]
    pub private_key: Option<String>,
}
