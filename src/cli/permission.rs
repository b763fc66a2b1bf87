use std::collections::BTreeSet;

use strongbox::api::Strongbox;
use strongbox::auth::UserContext;
use strongbox::error::Result;
use strongbox::permission::{PermissionEntry, PermissionRequest};

use crate::cli::common::{parse_operations, parse_uuid, print_json};
use crate::cli::json_output::PermissionListResponse;
use crate::cli::PermissionCommands;

pub fn run(strongbox: &Strongbox, ctx: &UserContext, cmd: &PermissionCommands, json: bool) -> Result<()> {
    match cmd {
        PermissionCommands::Grant {
            path,
            grantee,
            operations,
        } => {
            let request = PermissionRequest::new(grantee.clone(), parse_operations(operations)?);
            let entries = strongbox.save_permissions(ctx, path, &[request])?;
            if json {
                return print_json(&entries);
            }
            for entry in &entries {
                eprintln!("Granted {} on '{}' to '{}'.", operations_label(entry), entry.path, entry.actor);
            }
            Ok(())
        }
        PermissionCommands::Update { id, operations } => {
            let operations: BTreeSet<_> = parse_operations(operations)?.into_iter().collect();
            let entry = strongbox.patch_permission(ctx, parse_uuid(id)?, &operations)?;
            if json {
                return print_json(&entry);
            }
            eprintln!("'{}' on '{}' now has {}.", entry.actor, entry.path, operations_label(&entry));
            Ok(())
        }
        PermissionCommands::List { path, grantee } => {
            let permissions = match grantee {
                Some(actor) => vec![strongbox.find_permission(ctx, path, actor)?],
                None => strongbox.get_all_permissions(ctx, path)?,
            };
            if json {
                return print_json(&PermissionListResponse {
                    path: path.clone(),
                    permissions,
                });
            }
            for entry in &permissions {
                println!("{}\t{}\t{}", entry.uuid, entry.actor, operations_label(entry));
            }
            Ok(())
        }
        PermissionCommands::Revoke { path, grantee } => {
            let entry = strongbox.delete_permission(ctx, path, grantee)?;
            if json {
                return print_json(&entry);
            }
            eprintln!("Revoked '{}' on '{}'.", entry.actor, entry.path);
            Ok(())
        }
    }
}

fn operations_label(entry: &PermissionEntry) -> String {
    entry
        .operations
        .iter()
        .map(|op| op.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
