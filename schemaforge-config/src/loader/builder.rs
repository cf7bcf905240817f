use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource};
use crate::loader::manager::{ConfigManager, SearchPaths};

/// Builder for creating a [`ConfigManager`] with custom overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    workspace: Option<PathBuf>,
    config_file: Option<PathBuf>,
    search_paths: Option<SearchPaths>,
    cli_overrides: Vec<(String, toml::Value)>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workspace directory.
    pub fn workspace(mut self, path: PathBuf) -> Self {
        self.workspace = Some(path);
        self
    }

    /// Use a specific configuration file instead of the workspace file.
    pub fn config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    /// Replace the user-level search paths.
    pub fn search_paths(mut self, paths: SearchPaths) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// Add a CLI override (e.g., "selection.model", "User").
    pub fn cli_override(mut self, key: impl Into<String>, value: toml::Value) -> Self {
        self.cli_overrides.push((key.into(), value));
        self
    }

    /// Build the [`ConfigManager`].
    pub fn build(self) -> Result<ConfigManager> {
        let workspace = match self.workspace {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to resolve working directory")?,
        };
        let search_paths = self.search_paths.unwrap_or_default();

        let mut manager =
            ConfigManager::load_with(&workspace, self.config_file.as_deref(), &search_paths)?;

        if !self.cli_overrides.is_empty() {
            let mut runtime_toml = toml::Table::new();
            for (key, value) in self.cli_overrides {
                insert_dotted_key(&mut runtime_toml, &key, value);
            }

            manager.layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Runtime,
                toml::Value::Table(runtime_toml),
            ));
            manager
                .reevaluate()
                .context("Configuration failed validation after runtime overrides")?;
        }

        Ok(manager)
    }
}

fn insert_dotted_key(table: &mut toml::Table, key: &str, value: toml::Value) {
    match key.split_once('.') {
        None => {
            table.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(inner) = entry {
                insert_dotted_key(inner, rest, value);
            }
        }
    }
}
