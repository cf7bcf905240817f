use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use schemaforge_config::constants::files;
use schemaforge_config::{ConfigBuilder, ForgeConfig};

use crate::cli::Cli;

/// Explicit config file from `--config`, falling back to `SCHEMAFORGE_CONFIG`.
pub(crate) fn resolve_config_path(args: &Cli) -> Option<PathBuf> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }
    std::env::var(files::CONFIG_PATH_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Load layered configuration and apply the command-line flags on top.
pub(crate) fn load_config(args: &Cli) -> Result<ForgeConfig> {
    let mut builder = ConfigBuilder::new();
    if let Some(path) = resolve_config_path(args) {
        builder = builder.config_file(path);
    }
    if let Some(model) = &args.model {
        builder = builder.cli_override("selection.model", toml::Value::String(model.clone()));
    }
    if args.pretty {
        builder = builder.cli_override("output.pretty", toml::Value::Boolean(true));
    }
    if args.strip_root_title {
        builder = builder.cli_override("output.strip_root_title", toml::Value::Boolean(true));
    }
    let manager = builder.build()?;
    if let Some(path) = manager.config_path() {
        tracing::debug!(path = %path.display(), "using configuration file");
    }

    let mut config = manager.into_config();
    if !args.allow_module.is_empty() {
        // Extends whatever the config files listed.
        config
            .sandbox
            .extra_allowed_modules
            .extend(args.allow_module.iter().cloned());
        config
            .validate()
            .context("Configuration failed validation after --allow-module")?;
    }
    Ok(config)
}

/// Write the single stdout payload.
pub(crate) fn write_payload(body: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{body}").context("Failed to write result to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Honour `RUST_LOG` when it is set. Returns whether a subscriber was installed.
pub(crate) fn initialize_tracing() -> Result<bool> {
    use tracing_subscriber::prelude::*;

    if std::env::var("RUST_LOG").is_err() {
        return Ok(false);
    }

    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; skipping env tracing setup");
    }

    Ok(true)
}

/// Only errors reach stderr when neither `RUST_LOG` nor the config enables tracing.
pub(crate) fn initialize_default_error_tracing() -> Result<()> {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::new("error");
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    if let Err(err) = init_result {
        tracing::warn!(
            error = %err,
            "tracing already initialized; skipping default error tracing setup"
        );
    }

    Ok(())
}

pub(crate) fn initialize_tracing_from_config(config: &ForgeConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let debug_cfg = &config.debug;
    let filter_str = debug_cfg.filter_directive();
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter_str)
        .with_context(|| format!("Invalid trace filter `{filter_str}`"))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true);

    let init_result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    match init_result {
        Ok(()) => {
            tracing::info!(
                "Debug tracing enabled: filter={}, level={}",
                filter_str,
                debug_cfg.trace_level
            );
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                "tracing already initialized; skipping config tracing setup"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn explicit_flag_wins_over_environment() {
        let args = Cli::parse_from(["schemaforge", "--config", "custom.toml"]);
        assert_eq!(resolve_config_path(&args), Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn allow_module_is_repeatable() {
        let args = Cli::parse_from([
            "schemaforge",
            "--allow-module",
            "json",
            "--allow-module",
            "collections",
            "--model",
            "User",
        ]);
        assert_eq!(args.allow_module, vec!["json", "collections"]);
        assert_eq!(args.model.as_deref(), Some("User"));
        assert!(args.command.is_none());
    }
}
