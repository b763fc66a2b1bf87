use crate::credential::CredentialType;
use crate::encryption::EncryptedValue;
use crate::generator::GenerationParameters;
use crate::types::*;

/// Identity for a credential name. Versions hang off it in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub uuid: Uuid,
    pub name: String,
    pub credential_type: CredentialType,
    pub created_at: DateTime<Utc>,
    pub versions: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialVersionRecord {
    pub uuid: Uuid,
    pub credential_uuid: Uuid,
    pub credential_type: CredentialType,
    pub created_at: DateTime<Utc>,
    /// Store-wide insertion counter; breaks ties between equal timestamps.
    pub sequence: u64,
    pub encrypted_value_uuid: Uuid,
    #[serde(default)]
    pub metadata: VersionMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Parameters the value was generated from. Absent for values set directly.
    pub generation_parameters: Option<GenerationParameters>,
    pub certificate: Option<CertificateMetadata>,
}

impl VersionMetadata {
    pub fn is_transitional(&self) -> bool {
        self.certificate.as_ref().is_some_and(|c| c.transitional)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    /// Normalized name of the signing CA credential. A self-signed
    /// certificate names itself.
    pub ca_name: Option<String>,
    /// Version of the CA that signed this certificate.
    pub signed_by_version: Option<Uuid>,
    pub self_signed: bool,
    pub is_ca: bool,
    pub transitional: bool,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedValueRecord {
    pub uuid: Uuid,
    pub value: EncryptedValue,
    pub updated_at: DateTime<Utc>,
}

/// Marker ciphertext over [`crate::encryption::CANARY_VALUE`]. Its uuid is the
/// identity of the master key that can open it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryRecord {
    pub uuid: Uuid,
    pub encrypted_value: Vec<u8>,
    pub nonce: Vec<u8>,
    /// Key-derivation salt, for password-derived keys only.
    pub salt: Option<Vec<u8>>,
}
