use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use super::{mismatched, CredentialGenerator, GenerationParameters, GenerationRequest};
use crate::credential::{CredentialType, CredentialValue, UserCredentialValue};
use crate::error::{Result, StrongboxError};
use crate::types::*;

pub const DEFAULT_LENGTH: usize = 30;
pub const MIN_LENGTH: usize = 4;
pub const MAX_LENGTH: usize = 200;

/// Length of generated usernames.
pub const USERNAME_LENGTH: usize = 20;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Character-class policy for passwords and user credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringGenerationParameters {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default)]
    pub exclude_lower: bool,
    #[serde(default)]
    pub exclude_upper: bool,
    #[serde(default)]
    pub exclude_number: bool,
    #[serde(default)]
    pub include_special: bool,
    /// Fixed username for user credentials; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn default_length() -> usize {
    DEFAULT_LENGTH
}

impl Default for StringGenerationParameters {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            exclude_lower: false,
            exclude_upper: false,
            exclude_number: false,
            include_special: false,
            username: None,
        }
    }
}

impl StringGenerationParameters {
    /// Lengths outside the accepted range fall back to the default rather
    /// than failing.
    pub fn normalized(mut self) -> Result<Self> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&self.length) {
            self.length = DEFAULT_LENGTH;
        }
        if self.excludes_all_charsets() {
            return Err(StrongboxError::Validation(
                "The combination of parameters in the request is not allowed. Please validate your input and retry your request.".into(),
            ));
        }
        Ok(self)
    }

    pub fn excludes_all_charsets(&self) -> bool {
        self.exclude_lower && self.exclude_upper && self.exclude_number && !self.include_special
    }

    fn charsets(&self) -> Vec<&'static [u8]> {
        let mut sets = Vec::with_capacity(4);
        if !self.exclude_lower {
            sets.push(LOWER);
        }
        if !self.exclude_upper {
            sets.push(UPPER);
        }
        if !self.exclude_number {
            sets.push(DIGITS);
        }
        if self.include_special {
            sets.push(SPECIAL);
        }
        sets
    }
}

/// Random string with at least one character from every included class.
pub fn generate_string(params: &StringGenerationParameters) -> Result<String> {
    let params = params.clone().normalized()?;
    let sets = params.charsets();
    let pool: Vec<u8> = sets.iter().flat_map(|s| s.iter().copied()).collect();

    let mut rng = OsRng;
    let mut chars = Vec::with_capacity(params.length);
    for set in &sets {
        if let Some(c) = set.choose(&mut rng) {
            chars.push(*c);
        }
    }
    while chars.len() < params.length {
        if let Some(c) = pool.choose(&mut rng) {
            chars.push(*c);
        }
    }
    chars.shuffle(&mut rng);

    String::from_utf8(chars).map_err(|e| StrongboxError::Generation(e.to_string()))
}

pub struct PasswordGenerator;

impl CredentialGenerator for PasswordGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<CredentialValue> {
        let GenerationParameters::Password(params) = request.parameters else {
            return Err(mismatched(CredentialType::Password, request.parameters));
        };
        Ok(CredentialValue::Password(generate_string(params)?))
    }
}

pub struct UserGenerator;

impl CredentialGenerator for UserGenerator {
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<CredentialValue> {
        let GenerationParameters::User(params) = request.parameters else {
            return Err(mismatched(CredentialType::User, request.parameters));
        };
        let username = match &params.username {
            Some(name) => name.clone(),
            None => generate_string(&StringGenerationParameters {
                length: USERNAME_LENGTH,
                exclude_number: true,
                ..StringGenerationParameters::default()
            })?,
        };
        let password = generate_string(params)?;
        Ok(CredentialValue::User(UserCredentialValue::new(Some(username), password)?))
    }
}
