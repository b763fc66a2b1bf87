//! Generate a value from parameters and store it as a new version.

use zeroize::Zeroizing;

use super::{CredentialName, CredentialValue, CredentialVersion, CredentialWrite, VersionedCredentialStore, WriteMode};
use crate::error::{Result, StrongboxError};
use crate::generator::certificate::read_certificate;
use crate::generator::{generator_for, CertificateAuthority, GenerationParameters, GenerationRequest};
use crate::permission::{PermissionOperation, PermissionRequest};
use crate::types::*;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub name: String,
    pub parameters: GenerationParameters,
    pub mode: WriteMode,
    pub additional_permissions: Vec<PermissionRequest>,
}

impl GenerateRequest {
    pub fn new(name: impl Into<String>, parameters: GenerationParameters, mode: WriteMode) -> Self {
        Self {
            name: name.into(),
            parameters,
            mode,
            additional_permissions: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialGenerationService {
    store: VersionedCredentialStore,
}

impl CredentialGenerationService {
    pub fn new(store: VersionedCredentialStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &VersionedCredentialStore {
        &self.store
    }

    pub fn generate(&self, actor: &str, request: GenerateRequest) -> Result<CredentialVersion> {
        let name = CredentialName::parse(&request.name)?;
        self.store
            .permissions()
            .require(actor, name.as_str(), PermissionOperation::Write)?;
        let parameters = request.parameters.normalized()?;

        let signer = match parameters.certificate() {
            Some(cert) if !cert.self_signed => match &cert.ca_name {
                Some(ca_name) => Some(self.resolve_signer(actor, ca_name)?),
                None => None,
            },
            _ => None,
        };
        let signed_by = signer.as_ref().map(|s| s.version_uuid);

        if let Some(existing) = self
            .store
            .keeps_current(actor, name.as_str(), request.mode, &parameters, signed_by)?
        {
            tracing::debug!(name = %name, mode = %request.mode, "generation skipped, current version kept");
            return Ok(existing);
        }

        let value = generator_for(parameters.credential_type())?.generate(&GenerationRequest {
            parameters: &parameters,
            signer: signer.as_ref(),
        })?;
        tracing::debug!(name = %name, credential_type = %parameters.credential_type(), "generated value");

        self.store.write(
            actor,
            CredentialWrite {
                name: name.into_string(),
                value,
                mode: request.mode,
                generation_parameters: Some(parameters),
                signed_by,
                additional_permissions: request.additional_permissions,
            },
        )
    }

    /// The current version of a CA credential, usable for signing. Needs
    /// READ on the CA.
    pub fn resolve_signer(&self, actor: &str, ca_name: &str) -> Result<CertificateAuthority> {
        let current = self
            .store
            .find_active_by_name(actor, ca_name)?
            .into_iter()
            .find(|v| !v.is_transitional())
            .ok_or_else(|| StrongboxError::NotFound(format!("CA {ca_name}")))?;

        let CredentialValue::Certificate(ca) = &current.value else {
            return Err(StrongboxError::Validation(format!(
                "The provided CA '{}' is a {} credential, not a certificate",
                current.name, current.credential_type
            )));
        };
        let private_key = ca
            .private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                StrongboxError::Validation(format!("The provided CA '{}' does not have a private key", current.name))
            })?;
        if !read_certificate(&ca.certificate)?.is_ca {
            return Err(StrongboxError::Validation(format!(
                "The provided certificate '{}' is not a CA",
                current.name
            )));
        }

        Ok(CertificateAuthority {
            name: current.name.clone(),
            version_uuid: current.uuid,
            certificate: ca.certificate.clone(),
            private_key: Zeroizing::new(private_key.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyConfig;
    use crate::datastore::Datastore;
    use crate::encryption::{EncryptionKeySet, Encryptor};
    use crate::generator::{
        CertificateRequestParameters, RsaGenerationParameters, SshGenerationParameters, StringGenerationParameters,
    };
    use crate::permission::{PermissionCheckingService, PermissionOperation};

    const ADMIN: &str = "uaa-client:admin";

    fn service() -> CredentialGenerationService {
        service_on(Arc::new(Datastore::in_memory()))
    }

    fn service_on(datastore: Arc<Datastore>) -> CredentialGenerationService {
        let keys = EncryptionKeySet::initialize(
            &[KeyConfig::password("correct-horse-battery-staple", true)],
            None,
            &datastore,
        )
        .unwrap();
        datastore
            .transaction(|state| {
                state.merge_permission("/*", ADMIN, &PermissionOperation::ALL.into());
                Ok(())
            })
            .unwrap();
        let permissions = PermissionCheckingService::new(datastore.clone(), true);
        CredentialGenerationService::new(VersionedCredentialStore::new(
            datastore,
            Encryptor::new(Arc::new(keys)),
            permissions,
            Arc::new(SystemClock),
        ))
    }

    fn cert_params(request: CertificateRequestParameters) -> GenerationParameters {
        GenerationParameters::Certificate(request.validate().unwrap())
    }

    #[test]
    fn generated_password_is_stored_with_parameters() {
        let service = service();
        let version = service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/db/password",
                    GenerationParameters::Password(StringGenerationParameters {
                        length: 3,
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();

        let CredentialValue::Password(password) = &version.value else { panic!("expected password") };
        assert_eq!(password.len(), 30);
        let Some(GenerationParameters::Password(stored)) = version.generation_parameters() else {
            panic!("expected stored parameters")
        };
        assert_eq!(stored.length, 30, "parameters are stored normalized");
    }

    #[test]
    fn no_overwrite_and_converge_skip_generation() {
        let service = service();
        let params = GenerationParameters::Rsa(RsaGenerationParameters::default());
        let first = service
            .generate(ADMIN, GenerateRequest::new("/rsa", params.clone(), WriteMode::Converge))
            .unwrap();
        let second = service
            .generate(ADMIN, GenerateRequest::new("/rsa", params.clone(), WriteMode::Converge))
            .unwrap();
        let third = service
            .generate(ADMIN, GenerateRequest::new("/rsa", params, WriteMode::NoOverwrite))
            .unwrap();
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(first.uuid, third.uuid);

        let changed = service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/rsa",
                    GenerationParameters::Rsa(RsaGenerationParameters { key_length: 3072 }),
                    WriteMode::Converge,
                ),
            )
            .unwrap();
        assert_ne!(changed.uuid, first.uuid);
    }

    #[test]
    fn generating_over_a_different_type_is_rejected() {
        let service = service();
        service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/key",
                    GenerationParameters::Ssh(SshGenerationParameters::default()),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();
        let err = service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/key",
                    GenerationParameters::Password(StringGenerationParameters::default()),
                    WriteMode::Converge,
                ),
            )
            .unwrap_err();
        assert!(matches!(err, StrongboxError::TypeMismatch { .. }));
    }

    #[test]
    fn ca_signed_certificate_records_its_signer() {
        let service = service();
        let root = service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/pki/root",
                    cert_params(CertificateRequestParameters {
                        common_name: Some("root".into()),
                        is_ca: true,
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();

        let leaf = service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/pki/leaf",
                    cert_params(CertificateRequestParameters {
                        common_name: Some("leaf".into()),
                        ca: Some("pki/root".into()),
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();

        let metadata = leaf.metadata.certificate.clone().unwrap();
        assert_eq!(metadata.ca_name.as_deref(), Some("/pki/root"));
        assert_eq!(metadata.signed_by_version, Some(root.uuid));
        assert!(!metadata.self_signed);
        assert!(!metadata.is_ca);

        let CredentialValue::Certificate(root_cert) = &root.value else { panic!() };
        let CredentialValue::Certificate(leaf_cert) = &leaf.value else { panic!() };
        assert_eq!(leaf_cert.ca, Some(root_cert.certificate.clone()));

        assert_eq!(
            service.store().certificates_signed_by(ADMIN, "/pki/root").unwrap(),
            vec!["/pki/leaf".to_string()]
        );
    }

    #[test]
    fn signer_must_be_a_ca_with_a_key() {
        let service = service();
        service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/pki/not-a-ca",
                    cert_params(CertificateRequestParameters {
                        common_name: Some("plain".into()),
                        self_sign: true,
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();
        service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/pw",
                    GenerationParameters::Password(StringGenerationParameters::default()),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap();

        for ca in ["/pki/not-a-ca", "/pw"] {
            let err = service.resolve_signer(ADMIN, ca).unwrap_err();
            assert!(matches!(err, StrongboxError::Validation(_)), "{ca}: {err}");
        }
        assert!(matches!(
            service.resolve_signer(ADMIN, "/pki/missing"),
            Err(StrongboxError::NotFound(_))
        ));
    }

    fn root_ca(service: &CredentialGenerationService) -> CredentialVersion {
        service
            .generate(
                ADMIN,
                GenerateRequest::new(
                    "/pki/root",
                    cert_params(CertificateRequestParameters {
                        common_name: Some("root".into()),
                        is_ca: true,
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap()
    }

    fn active_versions(service: &CredentialGenerationService, name: &str) -> Vec<(Uuid, bool)> {
        service
            .store()
            .find_active_by_name(ADMIN, name)
            .unwrap()
            .iter()
            .map(|v| (v.uuid, v.is_transitional()))
            .collect()
    }

    #[test]
    fn transitional_version_is_listed_after_current() {
        let service = service();
        let old = root_ca(&service);
        let new = root_ca(&service);

        service
            .store()
            .update_transitional_version(ADMIN, "/pki/root", Some(old.uuid))
            .unwrap();
        assert_eq!(
            active_versions(&service, "/pki/root"),
            vec![(new.uuid, false), (old.uuid, true)]
        );
        assert_eq!(service.resolve_signer(ADMIN, "/pki/root").unwrap().version_uuid, new.uuid);

        service
            .store()
            .update_transitional_version(ADMIN, "/pki/root", None)
            .unwrap();
        assert_eq!(active_versions(&service, "/pki/root"), vec![(new.uuid, false)]);
    }

    #[test]
    fn current_version_cannot_become_transitional() {
        let service = service();
        let root = root_ca(&service);

        assert!(matches!(
            service
                .store()
                .update_transitional_version(ADMIN, "/pki/root", Some(root.uuid)),
            Err(StrongboxError::Validation(_))
        ));
        assert_eq!(active_versions(&service, "/pki/root"), vec![(root.uuid, false)]);
        assert_eq!(service.resolve_signer(ADMIN, "/pki/root").unwrap().version_uuid, root.uuid);
    }

    #[test]
    fn self_signed_certificate_names_itself_as_ca() {
        let service = service();
        let root = root_ca(&service);

        let metadata = root.metadata.certificate.unwrap();
        assert!(metadata.self_signed);
        assert_eq!(metadata.ca_name.as_deref(), Some("/pki/root"));
        assert!(service
            .store()
            .certificates_signed_by(ADMIN, "/pki/root")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unauthorized_generate_is_refused_before_resolving_the_ca() {
        let datastore = Arc::new(Datastore::in_memory());
        datastore
            .transaction(|state| {
                state.merge_permission("/pki/*", "uaa-user:mallory", &[PermissionOperation::Read].into());
                Ok(())
            })
            .unwrap();
        let service = service_on(datastore);
        let err = service
            .generate(
                "uaa-user:mallory",
                GenerateRequest::new(
                    "/pki/leaf",
                    cert_params(CertificateRequestParameters {
                        common_name: Some("leaf".into()),
                        ca: Some("/pki/missing".into()),
                        ..Default::default()
                    }),
                    WriteMode::Overwrite,
                ),
            )
            .unwrap_err();
        assert!(matches!(err, StrongboxError::PermissionDenied { .. }), "{err}");
    }
}
