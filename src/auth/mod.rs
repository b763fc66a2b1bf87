pub mod context;

use std::env;

use crate::error::{Result, StrongboxError};
pub use context::{AuthMethod, UserContext};

const STRONGBOX_ACTOR_ENV: &str = "STRONGBOX_ACTOR";

/// Resolve the acting identity. Tries in order:
/// 1. An explicitly supplied actor
/// 2. STRONGBOX_ACTOR env var
pub fn resolve_actor(explicit: Option<&str>) -> Result<UserContext> {
    if let Some(actor) = explicit {
        return validate_actor(actor).map(UserContext::new);
    }

    if let Ok(actor) = env::var(STRONGBOX_ACTOR_ENV) {
        return validate_actor(&actor).map(UserContext::from_environment);
    }

    Err(StrongboxError::Validation(
        "No actor provided. Pass --actor or set STRONGBOX_ACTOR.".into(),
    ))
}

fn validate_actor(actor: &str) -> Result<String> {
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(StrongboxError::Validation("actor must not be empty".into()));
    }
    Ok(actor.to_string())
}
