use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debug::DebugConfig;
use crate::limits::LimitsConfig;
use crate::root::{OutputConfig, SelectionConfig};
use crate::sandbox::SandboxConfig;

/// Main configuration structure for schemaforge
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ForgeConfig {
    /// Import allowlist for executed source
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Interpreter budgets
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Model selection when several models are declared
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Payload rendering
    #[serde(default)]
    pub output: OutputConfig,

    /// Debug and tracing settings
    #[serde(default)]
    pub debug: DebugConfig,
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        self.sandbox
            .validate()
            .context("Invalid sandbox configuration")?;
        self.limits
            .validate()
            .context("Invalid limits configuration")?;
        self.selection
            .validate()
            .context("Invalid selection configuration")?;
        Ok(())
    }
}
