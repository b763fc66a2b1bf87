//! Regeneration: rebuild a generation request from what is stored for a
//! credential and write the result as a new version.

use crate::credential::{
    CredentialGenerationService, CredentialName, CredentialType, CredentialValue, CredentialVersion, GenerateRequest,
    WriteMode,
};
use crate::error::{Result, StrongboxError};
use crate::generator::rsa_keys::key_length_of;
use crate::generator::{GenerationParameters, RsaGenerationParameters, SshGenerationParameters};
use crate::permission::PermissionOperation;
use crate::types::*;

const STATICALLY_SET: &str =
    "The credential could not be regenerated because the value was statically set. Only generated credentials may be regenerated.";

#[derive(Clone)]
pub struct RegenerationEngine {
    generation: CredentialGenerationService,
}

impl RegenerationEngine {
    pub fn new(generation: CredentialGenerationService) -> Self {
        Self { generation }
    }

    /// Generate a new version of `name` from its stored parameters. Needs
    /// READ and WRITE on the name.
    pub fn regenerate(&self, actor: &str, name: &str) -> Result<CredentialVersion> {
        let name = CredentialName::parse(name)?;
        let current = self.current(actor, name.as_str())?;
        let parameters = regeneration_parameters(&current)?;
        tracing::debug!(name = %name, credential_type = %current.credential_type, "regenerating");
        self.generation
            .generate(actor, GenerateRequest::new(name.into_string(), parameters, WriteMode::Overwrite))
    }

    /// Regenerate every certificate signed by `signed_by`, then everything
    /// signed by any regenerated CA in turn. Returns the regenerated names.
    ///
    /// Every target is read, permission-checked and given its parameters
    /// before the first version is written, so a denied or non-regeneratable
    /// certificate anywhere in the tree leaves the whole tree untouched. A
    /// failure while writing (the key provider going away, say) keeps the
    /// versions already written; the names that made it are logged.
    pub fn bulk_regenerate(&self, actor: &str, signed_by: &str) -> Result<BTreeSet<String>> {
        let root = CredentialName::parse(signed_by)?.into_string();
        let plan = self.plan(actor, &root)?;

        let mut regenerated = BTreeSet::new();
        for (name, parameters) in plan {
            let request = GenerateRequest::new(name.clone(), parameters, WriteMode::Overwrite);
            if let Err(e) = self.generation.generate(actor, request) {
                tracing::warn!(ca = %root, failed = %name, done = ?regenerated, "bulk regeneration stopped");
                return Err(e);
            }
            regenerated.insert(name);
        }

        tracing::info!(ca = %root, regenerated = regenerated.len(), "bulk regeneration finished");
        Ok(regenerated)
    }

    /// Certificates below `root` with the parameters to regenerate them
    /// with. A CA always comes before the certificates it signs.
    fn plan(&self, actor: &str, root: &str) -> Result<Vec<(String, GenerationParameters)>> {
        let store = self.generation.store();
        let mut plan: Vec<(String, GenerationParameters)> = Vec::new();
        let mut visited = BTreeSet::new();
        let mut pending = vec![root.to_string()];

        while let Some(ca_name) = pending.pop() {
            if !visited.insert(ca_name.clone()) {
                continue;
            }
            for name in store.certificates_signed_by(actor, &ca_name)? {
                if plan.iter().any(|(planned, _)| *planned == name) {
                    continue;
                }
                let current = self.current(actor, &name)?;
                store
                    .permissions()
                    .require(actor, &name, PermissionOperation::Write)?;
                let parameters = regeneration_parameters(&current)?;
                if current.metadata.certificate.as_ref().is_some_and(|c| c.is_ca) {
                    pending.push(name.clone());
                }
                plan.push((name, parameters));
            }
        }
        Ok(plan)
    }

    fn current(&self, actor: &str, name: &str) -> Result<CredentialVersion> {
        self.generation
            .store()
            .find_active_by_name(actor, name)?
            .into_iter()
            .find(|v| !v.is_transitional())
            .ok_or_else(|| StrongboxError::NotFound(format!("credential {name}")))
    }
}

/// Parameters to regenerate `current` with. Keys set without parameters are
/// regenerated at their existing length; other set values cannot be.
fn regeneration_parameters(current: &CredentialVersion) -> Result<GenerationParameters> {
    if !current.credential_type.is_generatable() {
        return Err(StrongboxError::Validation(format!(
            "Credentials of type '{}' cannot be regenerated",
            current.credential_type
        )));
    }

    if let Some(parameters) = current.generation_parameters() {
        return Ok(match (parameters, &current.value) {
            (GenerationParameters::User(params), CredentialValue::User(user)) if params.username.is_none() => {
                let mut params = params.clone();
                params.username = user.username.clone();
                GenerationParameters::User(params)
            }
            (parameters, _) => parameters.clone(),
        });
    }

    match (&current.credential_type, &current.value) {
        (CredentialType::Ssh, CredentialValue::Ssh(ssh)) => Ok(GenerationParameters::Ssh(SshGenerationParameters {
            key_length: key_length_of(&ssh.private_key)?,
            ssh_comment: ssh.comment().map(str::to_string),
        })),
        (CredentialType::Rsa, CredentialValue::Rsa(rsa)) => Ok(GenerationParameters::Rsa(RsaGenerationParameters {
            key_length: key_length_of(&rsa.private_key)?,
        })),
        _ => Err(StrongboxError::Validation(STATICALLY_SET.into())),
    }
}
