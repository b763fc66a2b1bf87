pub mod common;
pub mod credential;
pub mod generate;
pub mod json_output;
pub mod keys;
pub mod permission;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "strongbox",
    version,
    about = "Versioned credential store with envelope encryption and path-scoped ACLs"
)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Identity to act as (falls back to STRONGBOX_ACTOR)
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Config file (default: $STRONGBOX_CONFIG or ~/.strongbox/strongbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the configured keys and show how stored values are distributed over them
    Check,

    /// Store a credential (reads the value from stdin)
    Set {
        /// Credential name
        name: String,
        /// value, json, password, user, ssh, rsa or certificate
        #[arg(long = "type", default_value = "value")]
        credential_type: String,
        /// no-overwrite, overwrite or converge
        #[arg(long, default_value = "overwrite")]
        mode: String,
    },

    /// Generate a credential from parameters
    Generate(GenerateArgs),

    /// Show a credential
    Get {
        /// Credential name
        #[arg(required_unless_present = "id")]
        name: Option<String>,
        /// Show the N most recent versions
        #[arg(long, conflicts_with_all = ["current", "id"])]
        versions: Option<i64>,
        /// Show the current version, plus the transitional one for certificates
        #[arg(long, conflicts_with = "id")]
        current: bool,
        /// Show one version by its id
        #[arg(long, conflicts_with = "name")]
        id: Option<String>,
    },

    /// List credentials at or below a path
    Find {
        /// Path prefix
        #[arg(default_value = "/")]
        path: String,
    },

    /// Delete a credential with all of its versions
    Delete {
        /// Credential name
        name: String,
    },

    /// Generate a new version from the stored generation parameters
    Regenerate {
        /// Credential name
        name: String,
    },

    /// Regenerate every certificate signed by a CA
    BulkRegenerate {
        /// Name of the signing CA credential
        ca: String,
    },

    /// Re-encrypt values sealed under inactive keys with the active key
    RotateKeys,

    /// Manage access control entries
    Permission {
        #[command(subcommand)]
        command: PermissionCommands,
    },
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Credential name
    pub name: String,
    /// password, user, ssh, rsa or certificate
    #[arg(long = "type")]
    pub credential_type: String,
    /// no-overwrite, overwrite or converge
    #[arg(long, default_value = "overwrite")]
    pub mode: String,

    // password / user
    /// Password length
    #[arg(long)]
    pub length: Option<usize>,
    #[arg(long)]
    pub exclude_lower: bool,
    #[arg(long)]
    pub exclude_upper: bool,
    #[arg(long)]
    pub exclude_number: bool,
    #[arg(long)]
    pub include_special: bool,
    /// Fixed username for a user credential
    #[arg(long)]
    pub username: Option<String>,

    // ssh / rsa / certificate
    /// RSA key length: 2048, 3072 or 4096
    #[arg(long)]
    pub key_length: Option<usize>,
    /// Comment appended to the SSH public key
    #[arg(long)]
    pub ssh_comment: Option<String>,

    // certificate
    #[arg(long)]
    pub common_name: Option<String>,
    #[arg(long)]
    pub organization: Option<String>,
    #[arg(long)]
    pub organization_unit: Option<String>,
    #[arg(long)]
    pub locality: Option<String>,
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    /// Subject alternative name (DNS name or IP address), repeatable
    #[arg(long = "alternative-name")]
    pub alternative_names: Vec<String>,
    /// Key usage flag, repeatable or comma separated
    #[arg(long, value_delimiter = ',')]
    pub key_usage: Vec<String>,
    /// Extended key usage purpose, repeatable or comma separated
    #[arg(long, value_delimiter = ',')]
    pub extended_key_usage: Vec<String>,
    /// Validity in days
    #[arg(long)]
    pub duration: Option<u32>,
    /// Name of the CA credential to sign with
    #[arg(long)]
    pub ca: Option<String>,
    #[arg(long)]
    pub self_sign: bool,
    #[arg(long)]
    pub is_ca: bool,
}

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// Grant operations on a path to an actor
    Grant {
        /// Credential name, or a prefix ending in /*
        path: String,
        /// Actor receiving the grant
        #[arg(long)]
        grantee: String,
        /// read, write, delete, read_acl, write_acl
        #[arg(long, required = true, value_delimiter = ',')]
        operations: Vec<String>,
    },
    /// Replace the operations of an existing entry
    Update {
        /// Entry id
        id: String,
        #[arg(long, required = true, value_delimiter = ',')]
        operations: Vec<String>,
    },
    /// List the entries on a path
    List {
        path: String,
        /// Only the entry for this actor
        #[arg(long)]
        grantee: Option<String>,
    },
    /// Remove an actor's entry from a path
    Revoke {
        path: String,
        #[arg(long)]
        grantee: String,
    },
}
