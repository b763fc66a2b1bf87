use strongbox::api::Strongbox;
use strongbox::auth::UserContext;
use strongbox::credential::{CredentialType, GenerateRequest};
use strongbox::error::{Result, StrongboxError};
use strongbox::generator::{
    CertificateRequestParameters, GenerationParameters, RsaGenerationParameters, SshGenerationParameters,
    StringGenerationParameters,
};
use strongbox::generator::rsa_keys::DEFAULT_KEY_LENGTH;

use crate::cli::common::parse_mode;
use crate::cli::credential::print_generated;
use crate::cli::GenerateArgs;

pub fn run(strongbox: &Strongbox, ctx: &UserContext, args: &GenerateArgs, json: bool) -> Result<()> {
    let parameters = parameters(args)?;
    let request = GenerateRequest::new(args.name.clone(), parameters, parse_mode(&args.mode)?);
    let version = strongbox.generate(ctx, request)?;
    print_generated(&version, json)
}

/// Map the flags for `--type` onto generation parameters.
pub fn parameters(args: &GenerateArgs) -> Result<GenerationParameters> {
    let credential_type: CredentialType = args.credential_type.parse()?;
    let parameters = match credential_type {
        CredentialType::Password => GenerationParameters::Password(string_parameters(args, None)),
        CredentialType::User => GenerationParameters::User(string_parameters(args, args.username.clone())),
        CredentialType::Ssh => GenerationParameters::Ssh(SshGenerationParameters {
            key_length: args.key_length.unwrap_or(DEFAULT_KEY_LENGTH),
            ssh_comment: args.ssh_comment.clone(),
        }),
        CredentialType::Rsa => GenerationParameters::Rsa(RsaGenerationParameters {
            key_length: args.key_length.unwrap_or(DEFAULT_KEY_LENGTH),
        }),
        CredentialType::Certificate => {
            let request = CertificateRequestParameters {
                common_name: args.common_name.clone(),
                organization: args.organization.clone(),
                organization_unit: args.organization_unit.clone(),
                locality: args.locality.clone(),
                state: args.state.clone(),
                country: args.country.clone(),
                alternative_names: args.alternative_names.clone(),
                key_usage: args.key_usage.clone(),
                extended_key_usage: args.extended_key_usage.clone(),
                key_length: args.key_length,
                duration: args.duration,
                ca: args.ca.clone(),
                self_sign: args.self_sign,
                is_ca: args.is_ca,
            };
            GenerationParameters::Certificate(request.validate()?)
        }
        CredentialType::Value | CredentialType::Json => {
            return Err(StrongboxError::Validation(format!(
                "Credentials of type '{credential_type}' cannot be generated"
            )))
        }
    };
    Ok(parameters)
}

fn string_parameters(args: &GenerateArgs, username: Option<String>) -> StringGenerationParameters {
    StringGenerationParameters {
        length: args.length.unwrap_or(StringGenerationParameters::default().length),
        exclude_lower: args.exclude_lower,
        exclude_upper: args.exclude_upper,
        exclude_number: args.exclude_number,
        include_special: args.include_special,
        username,
    }
}
