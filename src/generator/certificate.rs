//! X.509 certificate generation.
//!
//! Raw request fields are validated into [`CertificateGenerationParameters`],
//! which is what gets stored with the version and compared on converge and
//! regeneration. Keys are RSA (from the `rsa` crate) and certificates are
//! built and signed with `rcgen`; facts about existing certificates are read
//! back with `x509-parser`.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType,
    SerialNumber,
};
use x509_parser::prelude::{FromDer, X509Certificate};
use zeroize::Zeroizing;

use super::rsa_keys::{self, DEFAULT_KEY_LENGTH};
use super::{mismatched, CredentialGenerator, GenerationParameters, GenerationRequest};
use crate::credential::{CertificateCredentialValue, CredentialName, CredentialType, CredentialValue};
use crate::error::{Result, StrongboxError};
use crate::types::*;

pub const DEFAULT_DURATION_DAYS: u32 = 365;
pub const MAX_DURATION_DAYS: u32 = 3650;
pub const MAX_COMMON_NAME_LENGTH: usize = 64;

// -- distinguished name ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnAttribute {
    Locality,
    Organization,
    State,
    Country,
    OrganizationalUnit,
    CommonName,
}

impl DnAttribute {
    pub fn label(&self) -> &'static str {
        match self {
            DnAttribute::Locality => "L",
            DnAttribute::Organization => "O",
            DnAttribute::State => "ST",
            DnAttribute::Country => "C",
            DnAttribute::OrganizationalUnit => "OU",
            DnAttribute::CommonName => "CN",
        }
    }

    fn dn_type(&self) -> DnType {
        match self {
            DnAttribute::Locality => DnType::LocalityName,
            DnAttribute::Organization => DnType::OrganizationName,
            DnAttribute::State => DnType::StateOrProvinceName,
            DnAttribute::Country => DnType::CountryName,
            DnAttribute::OrganizationalUnit => DnType::OrganizationalUnitName,
            DnAttribute::CommonName => DnType::CommonName,
        }
    }
}

/// Subject name as an ordered list of RDNs.
///
/// Equality is semantic: values compare case-insensitively with whitespace
/// runs collapsed, and a name equals its own reversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistinguishedName {
    rdns: Vec<(DnAttribute, String)>,
}

impl DistinguishedName {
    /// Build from request fields in the fixed order L, O, ST, C, OU, CN.
    pub fn from_request(request: &CertificateRequestParameters) -> Self {
        let fields = [
            (DnAttribute::Locality, &request.locality),
            (DnAttribute::Organization, &request.organization),
            (DnAttribute::State, &request.state),
            (DnAttribute::Country, &request.country),
            (DnAttribute::OrganizationalUnit, &request.organization_unit),
            (DnAttribute::CommonName, &request.common_name),
        ];
        let rdns = fields
            .into_iter()
            .filter_map(|(attr, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (attr, v.to_string()))
            })
            .collect();
        Self { rdns }
    }

    pub fn rdns(&self) -> &[(DnAttribute, String)] {
        &self.rdns
    }

    pub fn get(&self, attribute: DnAttribute) -> Option<&str> {
        self.rdns
            .iter()
            .find(|(attr, _)| *attr == attribute)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    fn canonical(&self) -> Vec<(DnAttribute, String)> {
        self.rdns
            .iter()
            .map(|(attr, value)| {
                let folded = value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
                (*attr, folded)
            })
            .collect()
    }

    fn to_rcgen(&self) -> rcgen::DistinguishedName {
        let mut dn = rcgen::DistinguishedName::new();
        for (attr, value) in &self.rdns {
            dn.push(attr.dn_type(), value.as_str());
        }
        dn
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        let mine = self.canonical();
        let theirs = other.canonical();
        mine == theirs || mine.iter().eq(theirs.iter().rev())
    }
}

impl Eq for DistinguishedName {}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attr, value)) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=", attr.label())?;
            for c in value.chars() {
                if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

// -- subject alternative names -----------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AlternativeName {
    Dns(String),
    Ip(IpAddr),
}

impl AlternativeName {
    /// IP literals become IP entries, everything else must be a DNS name
    /// (optionally with a leading `*.` wildcard label).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Ok(ip) = raw.parse::<IpAddr>() {
            return Ok(AlternativeName::Ip(ip));
        }

        let name = raw.to_ascii_lowercase();
        let labels = name.strip_prefix("*.").unwrap_or(&name);
        let valid = !labels.is_empty()
            && name.len() <= 253
            && labels.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            });
        if valid {
            Ok(AlternativeName::Dns(name))
        } else {
            Err(StrongboxError::Validation(format!(
                "The provided alternative name '{raw}' is not a valid DNS name or IP address"
            )))
        }
    }

    fn to_rcgen(&self) -> Result<SanType> {
        match self {
            AlternativeName::Dns(name) => Ok(SanType::DnsName(
                name.clone()
                    .try_into()
                    .map_err(|e| StrongboxError::Generation(format!("invalid DNS SAN: {e}")))?,
            )),
            AlternativeName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
        }
    }
}

impl TryFrom<String> for AlternativeName {
    type Error = StrongboxError;

    fn try_from(raw: String) -> Result<Self> {
        AlternativeName::parse(&raw)
    }
}

impl From<AlternativeName> for String {
    fn from(name: AlternativeName) -> String {
        name.to_string()
    }
}

impl fmt::Display for AlternativeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlternativeName::Dns(name) => f.write_str(name),
            AlternativeName::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

// -- key usage ---------------------------------------------------------------

/// Key-usage flags as a bitmask in the KeyUsage BIT STRING layout
/// (digitalSignature is bit 7, decipherOnly bit 15).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyUsage(u16);

impl KeyUsage {
    pub const DIGITAL_SIGNATURE: u16 = 1 << 7;
    pub const NON_REPUDIATION: u16 = 1 << 6;
    pub const KEY_ENCIPHERMENT: u16 = 1 << 5;
    pub const DATA_ENCIPHERMENT: u16 = 1 << 4;
    pub const KEY_AGREEMENT: u16 = 1 << 3;
    pub const KEY_CERT_SIGN: u16 = 1 << 2;
    pub const CRL_SIGN: u16 = 1 << 1;
    pub const ENCIPHER_ONLY: u16 = 1;
    pub const DECIPHER_ONLY: u16 = 1 << 15;

    const FLAGS: [(&'static str, u16); 9] = [
        ("digital_signature", Self::DIGITAL_SIGNATURE),
        ("non_repudiation", Self::NON_REPUDIATION),
        ("key_encipherment", Self::KEY_ENCIPHERMENT),
        ("data_encipherment", Self::DATA_ENCIPHERMENT),
        ("key_agreement", Self::KEY_AGREEMENT),
        ("key_cert_sign", Self::KEY_CERT_SIGN),
        ("crl_sign", Self::CRL_SIGN),
        ("encipher_only", Self::ENCIPHER_ONLY),
        ("decipher_only", Self::DECIPHER_ONLY),
    ];

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut bits = 0;
        for name in names {
            let name = name.as_ref();
            let (_, flag) = Self::FLAGS.iter().find(|(n, _)| *n == name).ok_or_else(|| {
                StrongboxError::Validation(format!(
                    "The provided key usage '{name}' is not supported. Valid values include 'digital_signature', 'non_repudiation', 'key_encipherment', 'data_encipherment', 'key_agreement', 'key_cert_sign', 'crl_sign', 'encipher_only' and 'decipher_only'."
                ))
            })?;
            bits |= flag;
        }
        Ok(Self(bits))
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::FLAGS
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }

    fn to_rcgen(self) -> Vec<KeyUsagePurpose> {
        let mut purposes = Vec::new();
        let table = [
            (Self::DIGITAL_SIGNATURE, KeyUsagePurpose::DigitalSignature),
            (Self::NON_REPUDIATION, KeyUsagePurpose::ContentCommitment),
            (Self::KEY_ENCIPHERMENT, KeyUsagePurpose::KeyEncipherment),
            (Self::DATA_ENCIPHERMENT, KeyUsagePurpose::DataEncipherment),
            (Self::KEY_AGREEMENT, KeyUsagePurpose::KeyAgreement),
            (Self::KEY_CERT_SIGN, KeyUsagePurpose::KeyCertSign),
            (Self::CRL_SIGN, KeyUsagePurpose::CrlSign),
            (Self::ENCIPHER_ONLY, KeyUsagePurpose::EncipherOnly),
            (Self::DECIPHER_ONLY, KeyUsagePurpose::DecipherOnly),
        ];
        for (flag, purpose) in table {
            if self.contains(flag) {
                purposes.push(purpose);
            }
        }
        purposes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    Timestamping,
}

impl ExtendedKeyUsage {
    pub const ALL: [ExtendedKeyUsage; 5] = [
        ExtendedKeyUsage::ServerAuth,
        ExtendedKeyUsage::ClientAuth,
        ExtendedKeyUsage::CodeSigning,
        ExtendedKeyUsage::EmailProtection,
        ExtendedKeyUsage::Timestamping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtendedKeyUsage::ServerAuth => "server_auth",
            ExtendedKeyUsage::ClientAuth => "client_auth",
            ExtendedKeyUsage::CodeSigning => "code_signing",
            ExtendedKeyUsage::EmailProtection => "email_protection",
            ExtendedKeyUsage::Timestamping => "timestamping",
        }
    }

    fn to_rcgen(self) -> ExtendedKeyUsagePurpose {
        match self {
            ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            ExtendedKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            ExtendedKeyUsage::Timestamping => ExtendedKeyUsagePurpose::TimeStamping,
        }
    }
}

impl FromStr for ExtendedKeyUsage {
    type Err = StrongboxError;

    fn from_str(s: &str) -> Result<Self> {
        ExtendedKeyUsage::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| {
                StrongboxError::Validation(format!(
                    "The provided extended key usage '{s}' is not supported. Valid values include 'server_auth', 'client_auth', 'code_signing', 'email_protection' and 'timestamping'."
                ))
            })
    }
}

impl fmt::Display for ExtendedKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- parameters --------------------------------------------------------------

/// Certificate request as a caller supplies it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateRequestParameters {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub alternative_names: Vec<String>,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub key_length: Option<usize>,
    pub duration: Option<u32>,
    /// Name of the CA credential that signs this certificate.
    pub ca: Option<String>,
    pub self_sign: bool,
    pub is_ca: bool,
}

impl CertificateRequestParameters {
    pub fn validate(&self) -> Result<CertificateGenerationParameters> {
        let subject = DistinguishedName::from_request(self);
        if subject.is_empty() {
            return Err(StrongboxError::Validation(
                "You must provide at least one of common_name, organization, organization_unit, locality, state or country.".into(),
            ));
        }
        if subject
            .get(DnAttribute::CommonName)
            .is_some_and(|cn| cn.chars().count() > MAX_COMMON_NAME_LENGTH)
        {
            return Err(StrongboxError::Validation(format!(
                "The common name must be {MAX_COMMON_NAME_LENGTH} characters or fewer."
            )));
        }

        let ca_name = self
            .ca
            .as_deref()
            .filter(|ca| !ca.is_empty())
            .map(CredentialName::parse)
            .transpose()?
            .map(CredentialName::into_string);

        if self.self_sign && ca_name.is_some() {
            return Err(StrongboxError::Validation(
                "A certificate cannot be both self-signed and signed by a CA.".into(),
            ));
        }
        if !self.self_sign && !self.is_ca && ca_name.is_none() {
            return Err(StrongboxError::Validation(
                "You must provide a signing CA (ca), or request a self-signed or CA certificate.".into(),
            ));
        }

        let key_length = self.key_length.unwrap_or(DEFAULT_KEY_LENGTH);
        rsa_keys::validate_key_length(key_length)?;

        let duration_days = self.duration.unwrap_or(DEFAULT_DURATION_DAYS);
        if !(1..=MAX_DURATION_DAYS).contains(&duration_days) {
            return Err(StrongboxError::Validation(format!(
                "The provided duration must be between 1 and {MAX_DURATION_DAYS} days."
            )));
        }

        let alternative_names = self
            .alternative_names
            .iter()
            .map(|name| AlternativeName::parse(name))
            .collect::<Result<Vec<_>>>()?;

        let key_usage = KeyUsage::from_names(&self.key_usage)?;

        let mut extended_key_usage = Vec::new();
        for name in &self.extended_key_usage {
            let purpose: ExtendedKeyUsage = name.parse()?;
            if !extended_key_usage.contains(&purpose) {
                extended_key_usage.push(purpose);
            }
        }

        let self_signed = self.self_sign || (self.is_ca && ca_name.is_none());

        Ok(CertificateGenerationParameters {
            subject,
            alternative_names,
            key_usage,
            extended_key_usage,
            key_length,
            duration_days,
            ca_name,
            self_signed,
            is_ca: self.is_ca,
        })
    }
}

/// Validated certificate parameters, stored with generated versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateGenerationParameters {
    pub subject: DistinguishedName,
    #[serde(default)]
    pub alternative_names: Vec<AlternativeName>,
    #[serde(default)]
    pub key_usage: KeyUsage,
    #[serde(default)]
    pub extended_key_usage: Vec<ExtendedKeyUsage>,
    pub key_length: usize,
    pub duration_days: u32,
    pub ca_name: Option<String>,
    pub self_signed: bool,
    pub is_ca: bool,
}

impl PartialEq for CertificateGenerationParameters {
    /// Representation-only differences do not count: RDN spelling, SAN and
    /// extended-key-usage order. A missing CA name on either side matches.
    fn eq(&self, other: &Self) -> bool {
        let sans = |p: &Self| p.alternative_names.iter().cloned().collect::<BTreeSet<_>>();
        let ekus = |p: &Self| p.extended_key_usage.iter().copied().collect::<BTreeSet<_>>();
        let ca_matches = match (&self.ca_name, &other.ca_name) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };

        self.subject == other.subject
            && sans(self) == sans(other)
            && self.key_usage == other.key_usage
            && ekus(self) == ekus(other)
            && self.key_length == other.key_length
            && self.duration_days == other.duration_days
            && self.self_signed == other.self_signed
            && self.is_ca == other.is_ca
            && ca_matches
    }
}

/// The CA credential version that signs a certificate.
#[derive(Clone)]
pub struct CertificateAuthority {
    pub name: String,
    pub version_uuid: Uuid,
    pub certificate: String,
    pub private_key: Zeroizing<String>,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("name", &self.name)
            .field("version_uuid", &self.version_uuid)
            .finish_non_exhaustive()
    }
}

// -- generation --------------------------------------------------------------

pub struct CertificateGenerator;

impl CredentialGenerator for CertificateGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<CredentialValue> {
        let GenerationParameters::Certificate(params) = request.parameters else {
            return Err(mismatched(CredentialType::Certificate, request.parameters));
        };
        generate_certificate(params, request.signer).map(CredentialValue::Certificate)
    }
}

fn rcgen_error(e: rcgen::Error) -> StrongboxError {
    StrongboxError::Generation(e.to_string())
}

/// Positive, non-zero 128-bit serial.
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] &= 0x7f;
    bytes[0] |= 0x01;
    SerialNumber::from_slice(&bytes)
}

/// rcgen key pair from a stored private key. RSA PKCS#1 keys are rewrapped
/// as PKCS#8 first; other PKCS#8 keys are taken as they are.
fn signing_key(pem: &str) -> Result<KeyPair> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        let key = rsa_keys::parse_private_key(pem)?;
        let pkcs8 = rsa_keys::private_key_pkcs8_pem(&key)?;
        KeyPair::from_pem_and_sign_algo(&pkcs8, &rcgen::PKCS_RSA_SHA256).map_err(rcgen_error)
    } else {
        KeyPair::from_pem(pem).map_err(rcgen_error)
    }
}

fn certificate_params(params: &CertificateGenerationParameters) -> Result<CertificateParams> {
    let mut cert = CertificateParams::default();
    cert.distinguished_name = params.subject.to_rcgen();
    cert.subject_alt_names = params
        .alternative_names
        .iter()
        .map(AlternativeName::to_rcgen)
        .collect::<Result<Vec<_>>>()?;
    cert.key_usages = params.key_usage.to_rcgen();
    cert.extended_key_usages = params
        .extended_key_usage
        .iter()
        .map(|e| e.to_rcgen())
        .collect();
    cert.is_ca = if params.is_ca {
        IsCa::Ca(BasicConstraints::Unconstrained)
    } else {
        IsCa::ExplicitNoCa
    };

    let now = time::OffsetDateTime::now_utc();
    cert.not_before = now;
    cert.not_after = now + time::Duration::days(i64::from(params.duration_days));
    cert.serial_number = Some(random_serial());
    Ok(cert)
}

/// Generate a key pair and a certificate for it, self-signed or signed by `signer`.
pub fn generate_certificate(
    params: &CertificateGenerationParameters,
    signer: Option<&CertificateAuthority>,
) -> Result<CertificateCredentialValue> {
    let private_key = rsa_keys::generate_private_key(params.key_length)?;
    let key_pair = KeyPair::from_pem_and_sign_algo(
        &rsa_keys::private_key_pkcs8_pem(&private_key)?,
        &rcgen::PKCS_RSA_SHA256,
    )
    .map_err(rcgen_error)?;

    let mut cert_params = certificate_params(params)?;

    let (certificate, ca) = if params.self_signed {
        let cert = cert_params.self_signed(&key_pair).map_err(rcgen_error)?;
        let pem = cert.pem();
        (pem.clone(), pem)
    } else {
        let signer = signer.ok_or_else(|| {
            StrongboxError::Generation("a CA-signed certificate needs its signing CA".into())
        })?;
        let issuer_key = signing_key(&signer.private_key)?;
        let issuer = CertificateParams::from_ca_cert_pem(&signer.certificate)
            .map_err(rcgen_error)?
            .self_signed(&issuer_key)
            .map_err(rcgen_error)?;
        cert_params.use_authority_key_identifier_extension = true;
        let cert = cert_params
            .signed_by(&key_pair, &issuer, &issuer_key)
            .map_err(rcgen_error)?;
        (cert.pem(), signer.certificate.clone())
    };

    Ok(CertificateCredentialValue {
        ca: Some(ca),
        certificate,
        private_key: Some(rsa_keys::private_key_pem(&private_key)?.to_string()),
    })
}

/// What the store records about a certificate it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub is_ca: bool,
    pub self_signed: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub key_usage_bits: Option<u16>,
}

/// Parse a PEM certificate.
pub fn read_certificate(pem: &str) -> Result<CertificateFacts> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| StrongboxError::Validation(format!("The provided certificate is not valid PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| StrongboxError::Validation(format!("The provided certificate is not a valid X.509 certificate: {e}")))?;

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false);
    let expiry = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0);

    // x509-parser numbers the flags from digitalSignature = bit 0; store the
    // BIT STRING layout used by `KeyUsage`.
    let key_usage_bits = cert.key_usage().ok().flatten().map(|ku| {
        let flags = ku.value.flags;
        let mut bits = 0u16;
        for i in 0..8 {
            if flags & (1 << i) != 0 {
                bits |= 1 << (7 - i);
            }
        }
        if flags & (1 << 8) != 0 {
            bits |= KeyUsage::DECIPHER_ONLY;
        }
        bits
    });

    Ok(CertificateFacts {
        is_ca,
        self_signed: cert.subject() == cert.issuer(),
        expiry,
        key_usage_bits,
    })
}
