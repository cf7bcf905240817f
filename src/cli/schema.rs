use anyhow::{Context, Result};
use schemaforge_config::ForgeConfig;
use schemaforge_core::ForgeResult;

use super::{Emission, SchemaTarget};

pub fn handle_schema_command(target: SchemaTarget, pretty: bool) -> Result<Emission> {
    let schema = match target {
        SchemaTarget::Output => schemars::schema_for!(ForgeResult),
        SchemaTarget::Config => schemars::schema_for!(ForgeConfig),
    };
    let body = if pretty {
        serde_json::to_string_pretty(&schema)
    } else {
        serde_json::to_string(&schema)
    }
    .context("Failed to serialize JSON Schema")?;
    Ok(Emission::new(body, true))
}
