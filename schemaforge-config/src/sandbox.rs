//! Import allowlist settings for the restricted execution environment

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Modules the declarative source may import when no configuration overrides
/// the list.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "pydantic",
    "typing",
    "typing_extensions",
    "datetime",
    "enum",
    "decimal",
    "uuid",
    "annotated_types",
    "collections.abc",
];

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Module names (top-level or full dotted path) that executed code may import
    #[serde(default = "default_allowed_modules")]
    pub allowed_modules: Vec<String>,

    /// Extra modules appended to `allowed_modules`, typically from `--allow-module`
    #[serde(default)]
    pub extra_allowed_modules: Vec<String>,
}

fn default_allowed_modules() -> Vec<String> {
    DEFAULT_ALLOWED_MODULES
        .iter()
        .map(|module| (*module).to_string())
        .collect()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_modules: default_allowed_modules(),
            extra_allowed_modules: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// The effective allowlist: configured modules followed by extras, without
    /// duplicates.
    pub fn effective_allowlist(&self) -> Vec<String> {
        let mut modules: Vec<String> =
            Vec::with_capacity(self.allowed_modules.len() + self.extra_allowed_modules.len());
        for module in self
            .allowed_modules
            .iter()
            .chain(self.extra_allowed_modules.iter())
        {
            let trimmed = module.trim();
            if !modules.iter().any(|existing| existing == trimmed) {
                modules.push(trimmed.to_string());
            }
        }
        modules
    }

    pub fn validate(&self) -> Result<()> {
        let modules = self.effective_allowlist();
        ensure!(
            !modules.is_empty(),
            "sandbox.allowed_modules must list at least one module"
        );
        for module in &modules {
            ensure!(
                is_dotted_identifier(module),
                "sandbox.allowed_modules entry `{module}` is not a valid module path"
            );
        }
        Ok(())
    }
}

/// Returns true for `name` or `pkg.sub.name` where every segment is an identifier.
pub fn is_dotted_identifier(value: &str) -> bool {
    !value.is_empty() && value.split('.').all(is_identifier)
}

pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {
            chars.all(|ch| ch == '_' || ch.is_alphanumeric())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_allowlist() {
        let config = SandboxConfig::default();
        assert_eq!(config.allowed_modules.len(), DEFAULT_ALLOWED_MODULES.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn extras_are_appended_once() {
        let config = SandboxConfig {
            allowed_modules: vec!["pydantic".into(), "typing".into()],
            extra_allowed_modules: vec!["typing".into(), " json ".into()],
        };
        assert_eq!(
            config.effective_allowlist(),
            vec!["pydantic".to_string(), "typing".into(), "json".into()]
        );
    }

    #[test]
    fn rejects_malformed_module_names() {
        let config = SandboxConfig {
            allowed_modules: vec!["os.path".into(), "bad-name".into()],
            extra_allowed_modules: Vec::new(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bad-name"));
    }

    #[test]
    fn rejects_empty_allowlist() {
        let config = SandboxConfig {
            allowed_modules: Vec::new(),
            extra_allowed_modules: Vec::new(),
        };
        assert!(config.validate().is_err());
    }
}
