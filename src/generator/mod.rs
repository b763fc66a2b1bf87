//! Credential generators, one per generatable type, selected by type tag.

pub mod certificate;
pub mod password;
pub mod rsa_keys;

use crate::credential::{CredentialType, CredentialValue};
use crate::error::{Result, StrongboxError};
use crate::types::*;

pub use certificate::{
    AlternativeName, CertificateAuthority, CertificateGenerationParameters, CertificateGenerator,
    CertificateRequestParameters, DistinguishedName, ExtendedKeyUsage, KeyUsage,
};
pub use password::{PasswordGenerator, StringGenerationParameters, UserGenerator};
pub use rsa_keys::{RsaGenerationParameters, RsaGenerator, SshGenerationParameters, SshGenerator};

/// Parameters a value was (or will be) generated from. Stored with the
/// version so the credential can be regenerated later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationParameters {
    Password(StringGenerationParameters),
    User(StringGenerationParameters),
    Ssh(SshGenerationParameters),
    Rsa(RsaGenerationParameters),
    Certificate(CertificateGenerationParameters),
}

impl GenerationParameters {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            GenerationParameters::Password(_) => CredentialType::Password,
            GenerationParameters::User(_) => CredentialType::User,
            GenerationParameters::Ssh(_) => CredentialType::Ssh,
            GenerationParameters::Rsa(_) => CredentialType::Rsa,
            GenerationParameters::Certificate(_) => CredentialType::Certificate,
        }
    }

    /// Validate and bring into canonical form (clamped lengths, defaults
    /// filled). Equality of normalized parameters decides convergence.
    pub fn normalized(self) -> Result<Self> {
        Ok(match self {
            GenerationParameters::Password(p) => GenerationParameters::Password(p.normalized()?),
            GenerationParameters::User(p) => GenerationParameters::User(p.normalized()?),
            GenerationParameters::Ssh(p) => GenerationParameters::Ssh(p.validated()?),
            GenerationParameters::Rsa(p) => GenerationParameters::Rsa(p.validated()?),
            GenerationParameters::Certificate(p) => GenerationParameters::Certificate(p),
        })
    }

    pub fn certificate(&self) -> Option<&CertificateGenerationParameters> {
        match self {
            GenerationParameters::Certificate(p) => Some(p),
            _ => None,
        }
    }
}

/// Everything a generator needs for one value.
pub struct GenerationRequest<'a> {
    pub parameters: &'a GenerationParameters,
    /// Signing CA, for certificates that are not self-signed.
    pub signer: Option<&'a CertificateAuthority>,
}

pub trait CredentialGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<CredentialValue>;
}

static PASSWORD: PasswordGenerator = PasswordGenerator;
static USER: UserGenerator = UserGenerator;
static SSH: SshGenerator = SshGenerator;
static RSA: RsaGenerator = RsaGenerator;
static CERTIFICATE: CertificateGenerator = CertificateGenerator;

/// The generator for a credential type.
pub fn generator_for(credential_type: CredentialType) -> Result<&'static dyn CredentialGenerator> {
    match credential_type {
        CredentialType::Password => Ok(&PASSWORD),
        CredentialType::User => Ok(&USER),
        CredentialType::Ssh => Ok(&SSH),
        CredentialType::Rsa => Ok(&RSA),
        CredentialType::Certificate => Ok(&CERTIFICATE),
        CredentialType::Value | CredentialType::Json => Err(StrongboxError::Validation(format!(
            "Credentials of type '{credential_type}' cannot be generated"
        ))),
    }
}

pub(crate) fn mismatched(expected: CredentialType, parameters: &GenerationParameters) -> StrongboxError {
    StrongboxError::Generation(format!(
        "{expected} generator received {} parameters",
        parameters.credential_type()
    ))
}
