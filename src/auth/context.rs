/// The identity a request is evaluated for.
///
/// Actor identifiers are opaque strings produced by the authentication layer,
/// e.g. `uaa-user:4b9a…` or `mtls-app:0f3c…`. The core only compares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    actor: String,
    /// How the actor was established, for diagnostics only.
    pub method: AuthMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Asserted by the embedding service after it authenticated the caller.
    Trusted,
    /// Taken from the environment of the local CLI.
    Environment,
}

impl UserContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            method: AuthMethod::Trusted,
        }
    }

    pub fn from_environment(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            method: AuthMethod::Environment,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}
