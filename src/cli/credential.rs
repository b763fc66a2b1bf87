use strongbox::api::Strongbox;
use strongbox::auth::UserContext;
use strongbox::credential::{CredentialType, CredentialVersion};
use strongbox::error::{Result, StrongboxError, CONCEALED_ACCESS_MESSAGE};

use crate::cli::common::{parse_mode, parse_uuid, parse_value, print_json, read_stdin, render_value};
use crate::cli::json_output::{
    BulkRegenerateResponse, DeleteResponse, FindResponse, GetResponse, WriteResponse,
};

pub fn set(strongbox: &Strongbox, ctx: &UserContext, name: &str, credential_type: &str, mode: &str, json: bool) -> Result<()> {
    let credential_type: CredentialType = credential_type.parse()?;
    let mode = parse_mode(mode)?;
    let input = read_stdin()?;
    let value = parse_value(credential_type, &input)?;

    let version = strongbox.set(ctx, name, value, mode)?;
    if json {
        print_json(&WriteResponse::from(&version))
    } else {
        eprintln!("Credential '{}' stored (version {}).", version.name, version.uuid);
        Ok(())
    }
}

pub fn get(
    strongbox: &Strongbox,
    ctx: &UserContext,
    name: Option<&str>,
    versions: Option<i64>,
    current: bool,
    id: Option<&str>,
    json: bool,
) -> Result<()> {
    let found = match (name, id) {
        (_, Some(id)) => vec![strongbox.find_by_uuid(ctx, parse_uuid(id)?)?],
        (Some(name), None) if current => strongbox.find_active_by_name(ctx, name)?,
        (Some(name), None) => match versions {
            Some(n) => strongbox.find_n_by_name(ctx, name, n)?,
            None => strongbox.find_active_by_name(ctx, name)?.into_iter().take(1).collect(),
        },
        (None, None) => {
            return Err(StrongboxError::Validation("A credential name or --id is required".into()))
        }
    };
    if found.is_empty() {
        return Err(StrongboxError::NotFound(CONCEALED_ACCESS_MESSAGE.into()));
    }

    if json {
        return print_json(&GetResponse { data: found });
    }
    print_versions(&found)
}

pub fn find(strongbox: &Strongbox, ctx: &UserContext, path: &str, json: bool) -> Result<()> {
    let credentials = strongbox.find_by_path(ctx, path)?;
    if json {
        return print_json(&FindResponse { credentials });
    }
    for credential in &credentials {
        println!("{}", credential.name);
    }
    Ok(())
}

pub fn delete(strongbox: &Strongbox, ctx: &UserContext, name: &str, json: bool) -> Result<()> {
    if !strongbox.delete(ctx, name)? {
        return Err(StrongboxError::NotFound(CONCEALED_ACCESS_MESSAGE.into()));
    }
    if json {
        print_json(&DeleteResponse {
            name: name.to_string(),
            deleted: true,
        })
    } else {
        eprintln!("Credential '{}' deleted.", name);
        Ok(())
    }
}

pub fn regenerate(strongbox: &Strongbox, ctx: &UserContext, name: &str, json: bool) -> Result<()> {
    let version = strongbox.regenerate(ctx, name)?;
    print_generated(&version, json)
}

pub fn bulk_regenerate(strongbox: &Strongbox, ctx: &UserContext, ca: &str, json: bool) -> Result<()> {
    let regenerated = strongbox.bulk_regenerate(ctx, ca)?;
    if json {
        return print_json(&BulkRegenerateResponse {
            regenerated_credentials: regenerated.into_iter().collect(),
        });
    }
    for name in &regenerated {
        println!("{name}");
    }
    eprintln!("{} credential(s) regenerated.", regenerated.len());
    Ok(())
}

/// Output for a freshly generated version: the whole version as JSON, or
/// the value as text.
pub fn print_generated(version: &CredentialVersion, json: bool) -> Result<()> {
    if json {
        return print_json(version);
    }
    println!("{}", render_value(&version.value)?.as_str());
    eprintln!(
        "Generated {} '{}' (version {}).",
        version.credential_type, version.name, version.uuid
    );
    Ok(())
}

fn print_versions(versions: &[CredentialVersion]) -> Result<()> {
    if let [only] = versions {
        print!("{}", render_value(&only.value)?.as_str());
        return Ok(());
    }
    for version in versions {
        println!("{} {}", version.uuid, version.created_at.to_rfc3339());
        println!("{}", render_value(&version.value)?.as_str());
    }
    Ok(())
}
