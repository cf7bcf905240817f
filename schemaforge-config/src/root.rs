use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::sandbox::is_identifier;

/// Which declared model becomes the schema root.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Name of the model to derive. When unset the last declared model wins.
    #[serde(default)]
    pub model: Option<String>,
}

impl SelectionConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            ensure!(
                is_identifier(model),
                "selection.model `{model}` is not a valid class name"
            );
        }
        Ok(())
    }
}

/// Result payload rendering.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Pretty-print the JSON payload
    #[serde(default)]
    pub pretty: bool,

    /// Drop the generated `title` from the schema root
    #[serde(default)]
    pub strip_root_title: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_accepts_class_names() {
        let config = SelectionConfig {
            model: Some("UserProfile".into()),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn selection_rejects_expressions() {
        let config = SelectionConfig {
            model: Some("User()".into()),
        };
        assert!(config.validate().is_err());
    }
}
