//! schemaforge - derive JSON Schema from Pydantic-style model source
//!
//! Thin binary entry point: parse flags, load configuration, run one command
//! and write exactly one JSON document to stdout.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use schemaforge_core::ForgeResult;

mod cli;
mod main_helpers;

use cli::{Cli, Commands, Emission};

fn main() -> ExitCode {
    let args = Cli::parse();

    // RUST_LOG takes precedence over the config file.
    let env_tracing = main_helpers::initialize_tracing().unwrap_or(false);

    let emission = run(&args, env_tracing).unwrap_or_else(|err| {
        tracing::error!(error = %format!("{err:#}"), "schemaforge failed");
        let result = ForgeResult::failure(format!("{err:#}"));
        Emission::new(result.render(args.pretty), false)
    });

    if let Err(err) = main_helpers::write_payload(&emission.body) {
        tracing::error!(error = %err, "failed to emit result");
        return ExitCode::FAILURE;
    }
    if emission.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(args: &Cli, env_tracing: bool) -> Result<Emission> {
    let config = match main_helpers::load_config(args) {
        Ok(config) => config,
        Err(err) => {
            if !env_tracing {
                main_helpers::initialize_default_error_tracing().ok();
            }
            return Err(err);
        }
    };

    if !env_tracing {
        if config.debug.enable_tracing {
            main_helpers::initialize_tracing_from_config(&config)?;
        } else {
            main_helpers::initialize_default_error_tracing()?;
        }
    }

    match &args.command {
        Some(Commands::Check) => cli::handle_check_command(&config),
        Some(Commands::Schema { target }) => {
            cli::handle_schema_command(*target, config.output.pretty)
        }
        None => cli::handle_convert_command(&config, args.input.as_deref()),
    }
}
