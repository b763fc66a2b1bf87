mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use strongbox::api::Strongbox;
use strongbox::auth;
use strongbox::error::{JsonError, Result};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        if cli.json {
            match serde_json::to_string(&JsonError::from_error(&e)) {
                Ok(rendered) => eprintln!("{rendered}"),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli::common::load_config(cli.config.as_deref())?;
    strongbox::logging::init(&config.logging.level);
    let strongbox = Strongbox::open(config)?;
    let json = cli.json;
    let ctx = || auth::resolve_actor(cli.actor.as_deref());

    match &cli.command {
        Commands::Check => cli::keys::check(&strongbox, json),

        Commands::RotateKeys => cli::keys::rotate(&strongbox, json),

        Commands::Set {
            name,
            credential_type,
            mode,
        } => cli::credential::set(&strongbox, &ctx()?, name, credential_type, mode, json),

        Commands::Generate(args) => cli::generate::run(&strongbox, &ctx()?, args, json),

        Commands::Get {
            name,
            versions,
            current,
            id,
        } => cli::credential::get(
            &strongbox,
            &ctx()?,
            name.as_deref(),
            *versions,
            *current,
            id.as_deref(),
            json,
        ),

        Commands::Find { path } => cli::credential::find(&strongbox, &ctx()?, path, json),

        Commands::Delete { name } => cli::credential::delete(&strongbox, &ctx()?, name, json),

        Commands::Regenerate { name } => cli::credential::regenerate(&strongbox, &ctx()?, name, json),

        Commands::BulkRegenerate { ca } => cli::credential::bulk_regenerate(&strongbox, &ctx()?, ca, json),

        Commands::Permission { command } => cli::permission::run(&strongbox, &ctx()?, command, json),
    }
}
