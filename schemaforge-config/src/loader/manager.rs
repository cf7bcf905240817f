use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::constants::files;
use crate::loader::config::ForgeConfig;
use crate::loader::layers::{ConfigLayerEntry, ConfigLayerSource, ConfigLayerStack};

/// Locations searched for user-level configuration.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    pub user_files: Vec<PathBuf>,
}

impl Default for SearchPaths {
    fn default() -> Self {
        let user_files = dirs::config_dir()
            .map(|dir| {
                vec![
                    dir.join(files::USER_CONFIG_DIR)
                        .join(files::CONFIG_FILE_NAME),
                ]
            })
            .unwrap_or_default();
        Self { user_files }
    }
}

impl SearchPaths {
    /// Skip user-level configuration entirely.
    pub fn none() -> Self {
        Self {
            user_files: Vec::new(),
        }
    }
}

/// Configuration manager for loading and validating configurations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub(crate) config: ForgeConfig,
    config_path: Option<PathBuf>,
    pub(crate) layer_stack: ConfigLayerStack,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(config_path) = std::env::var(files::CONFIG_PATH_ENV_VAR) {
            let trimmed = config_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_file(trimmed).with_context(|| {
                    format!(
                        "Failed to load configuration from {}={}",
                        files::CONFIG_PATH_ENV_VAR,
                        trimmed
                    )
                });
            }
        }

        if let Ok(workspace_path) = std::env::var(files::WORKSPACE_ENV_VAR) {
            let trimmed = workspace_path.trim();
            if !trimmed.is_empty() {
                return Self::load_from_workspace(trimmed);
            }
        }

        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Load configuration from a specific workspace
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(workspace.as_ref(), None, &SearchPaths::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let workspace = path.parent().unwrap_or_else(|| Path::new("."));
        Self::load_with(workspace, Some(path), &SearchPaths::default())
    }

    pub(crate) fn load_with(
        workspace: &Path,
        explicit: Option<&Path>,
        search: &SearchPaths,
    ) -> Result<Self> {
        let mut layer_stack = ConfigLayerStack::default();

        // 1. User config
        for user_path in &search.user_files {
            if user_path.exists() {
                let toml = Self::load_toml_from_file(user_path)?;
                layer_stack.push(ConfigLayerEntry::new(
                    ConfigLayerSource::User {
                        file: user_path.clone(),
                    },
                    toml,
                ));
            }
        }

        // 2. Explicit file replaces the workspace file
        if let Some(path) = explicit {
            let toml = Self::load_toml_from_file(path)?;
            layer_stack.push(ConfigLayerEntry::new(
                ConfigLayerSource::Explicit {
                    file: path.to_path_buf(),
                },
                toml,
            ));
        } else {
            let workspace_config_path = workspace.join(files::CONFIG_FILE_NAME);
            if workspace_config_path.exists() {
                let toml = Self::load_toml_from_file(&workspace_config_path)?;
                layer_stack.push(ConfigLayerEntry::new(
                    ConfigLayerSource::Workspace {
                        file: workspace_config_path,
                    },
                    toml,
                ));
            }
        }

        if layer_stack.layers().is_empty() {
            let config = ForgeConfig::default();
            config
                .validate()
                .context("Default configuration failed validation")?;
            tracing::debug!("no configuration files found; using defaults");
            return Ok(Self {
                config,
                config_path: None,
                layer_stack,
            });
        }

        let config_path = layer_stack
            .layers()
            .last()
            .and_then(|layer| layer.source.file().cloned());

        let mut manager = Self {
            config: ForgeConfig::default(),
            config_path,
            layer_stack,
        };
        manager.reevaluate()?;
        tracing::debug!(
            layers = manager.layer_stack.layers().len(),
            path = ?manager.config_path,
            "configuration loaded"
        );
        Ok(manager)
    }

    /// Rebuild the effective config from the layer stack and validate it.
    pub(crate) fn reevaluate(&mut self) -> Result<()> {
        let effective_toml = self.layer_stack.effective_config();
        let config: ForgeConfig = effective_toml
            .try_into()
            .context("Failed to deserialize effective configuration")?;
        config
            .validate()
            .context("Configuration failed validation")?;
        self.config = config;
        Ok(())
    }

    fn load_toml_from_file(path: &Path) -> Result<toml::Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(value)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Consume the manager, keeping only the effective configuration
    pub fn into_config(self) -> ForgeConfig {
        self.config
    }

    /// Get the configuration file path (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Get the configuration layer stack
    pub fn layer_stack(&self) -> &ConfigLayerStack {
        &self.layer_stack
    }
}
