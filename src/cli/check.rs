use anyhow::Result;
use schemaforge_config::ForgeConfig;
use schemaforge_core::{ForgeResult, Pipeline};
use serde::Serialize;

use super::Emission;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    ok: bool,
    /// Modules loaded while seeding.
    modules: Vec<String>,
    allowed_modules: Vec<String>,
}

/// Seed an execution environment under `config` without running any source.
pub fn handle_check_command(config: &ForgeConfig) -> Result<Emission> {
    let pipeline = Pipeline::from_config(config);
    match pipeline.check_environment() {
        Ok(modules) => {
            let report = CheckReport {
                ok: true,
                modules,
                allowed_modules: pipeline.policy().allowed_modules(),
            };
            let body = if config.output.pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            Ok(Emission::new(body, true))
        }
        Err(err) => {
            tracing::error!(kind = %err.kind(), error = %err, "environment check failed");
            let result = ForgeResult::from(&err);
            Ok(Emission::new(result.render(config.output.pretty), false))
        }
    }
}
