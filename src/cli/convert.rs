use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use schemaforge_config::ForgeConfig;
use schemaforge_core::{ForgeResult, Pipeline};

use super::Emission;

/// Read the source once, run the pipeline and package the outcome.
pub fn handle_convert_command(config: &ForgeConfig, input: Option<&Path>) -> Result<Emission> {
    let source = read_source(input)?;
    tracing::debug!(bytes = source.len(), "source read");

    let pipeline = Pipeline::from_config(config);
    let mut result = ForgeResult::from_outcome(pipeline.run(&source));
    if config.output.strip_root_title {
        result = result.strip_root_title();
    }
    if let ForgeResult::Failure(payload) = &result {
        tracing::warn!(error = %payload.error, "conversion failed");
    }
    Ok(Emission::new(
        result.render(config.output.pretty),
        result.is_success(),
    ))
}

fn read_source(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read source from stdin")?;
            Ok(buffer)
        }
    }
}
