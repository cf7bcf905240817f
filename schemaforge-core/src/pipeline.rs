//! Execute → discover → select → derive.

use std::sync::Arc;

use schemaforge_config::{ForgeConfig, LimitsConfig};

use crate::environment::ExecutionEnvironment;
use crate::error::ForgeError;
use crate::policy::{AllowlistPolicy, ImportPolicy};
use crate::registry::{DiscoveredModel, ModelRegistry};
use crate::schema;

/// The outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub schema: serde_json::Value,
    pub model_name: String,
    /// Every discovered model, in discovery order.
    pub all_models: Vec<String>,
}

/// One configured conversion. Cheap to clone and safe to share across
/// threads; every [`Pipeline::run`] builds its own interpreter.
#[derive(Debug, Clone)]
pub struct Pipeline {
    policy: Arc<dyn ImportPolicy>,
    limits: LimitsConfig,
    model: Option<String>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Arc::new(AllowlistPolicy::standard()))
    }
}

impl Pipeline {
    pub fn new(policy: Arc<dyn ImportPolicy>) -> Self {
        Self {
            policy,
            limits: LimitsConfig::default(),
            model: None,
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        let policy = AllowlistPolicy::new(config.sandbox.effective_allowlist());
        Self::new(Arc::new(policy))
            .with_limits(config.limits.clone())
            .with_model(config.selection.model.clone())
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Derive the named model instead of the last declared one.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn policy(&self) -> &Arc<dyn ImportPolicy> {
        &self.policy
    }

    /// Seed an environment without running any source. Returns the modules
    /// that seeding loaded.
    pub fn check_environment(&self) -> Result<Vec<String>, ForgeError> {
        let env = ExecutionEnvironment::new(Arc::clone(&self.policy), &self.limits)?;
        Ok(env.loaded_modules())
    }

    pub fn run(&self, source: &str) -> Result<Extraction, ForgeError> {
        let result = self.run_stages(source);
        if let Err(err) = &result {
            tracing::debug!(kind = %err.kind(), error = %err, "pipeline failed");
        }
        result
    }

    fn run_stages(&self, source: &str) -> Result<Extraction, ForgeError> {
        if source.trim().is_empty() {
            return Err(ForgeError::EmptyInput);
        }

        let mut env = ExecutionEnvironment::new(Arc::clone(&self.policy), &self.limits)?;
        let mut registry = ModelRegistry::new();
        env.execute(source, &mut registry)?;
        tracing::debug!(
            stage = "execute",
            classes = registry.len(),
            steps = env.interpreter().budget().steps_taken(),
            "source executed"
        );

        let models = registry.discover(env.namespace());
        tracing::debug!(stage = "discover", models = models.len(), "models discovered");
        let selected = self.select(&models)?;
        if models.len() > 1 {
            tracing::info!(
                selected = %selected.name,
                count = models.len(),
                "multiple models found; using {}",
                selected.name
            );
        }

        let schema = schema::model_json_schema(&selected.model, env.interpreter()).map_err(
            |err| ForgeError::SchemaDerivationFailed {
                model: selected.name.clone(),
                message: err.to_string(),
            },
        )?;
        tracing::debug!(stage = "derive", model = %selected.name, "schema derived");

        Ok(Extraction {
            schema,
            model_name: selected.name.clone(),
            all_models: models.iter().map(|model| model.name.clone()).collect(),
        })
    }

    fn select<'m>(&self, models: &'m [DiscoveredModel]) -> Result<&'m DiscoveredModel, ForgeError> {
        match &self.model {
            Some(requested) => models
                .iter()
                .find(|model| model.name == *requested)
                .ok_or_else(|| ForgeError::ModelNotDeclared {
                    requested: requested.clone(),
                    declared: models.iter().map(|model| model.name.clone()).collect(),
                }),
            None => models.last().ok_or(ForgeError::NoModelFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn name_and_age_example() {
        let extraction = Pipeline::default()
            .run("from pydantic import BaseModel\nclass User(BaseModel):\n    name: str\n    age: int\n")
            .unwrap();
        assert_eq!(extraction.model_name, "User");
        assert_eq!(extraction.all_models, vec!["User"]);
        assert_eq!(
            extraction.schema,
            json!({
                "properties": {
                    "name": {"title": "Name", "type": "string"},
                    "age": {"title": "Age", "type": "integer"}
                },
                "required": ["name", "age"],
                "title": "User",
                "type": "object"
            })
        );
    }

    #[test]
    fn explicit_selection() {
        let source = "class A(BaseModel):\n    x: int\nclass B(BaseModel):\n    y: int\n";
        let extraction = Pipeline::default()
            .with_model(Some("A".into()))
            .run(source)
            .unwrap();
        assert_eq!(extraction.model_name, "A");
        assert_eq!(extraction.all_models, vec!["A", "B"]);

        let err = Pipeline::default()
            .with_model(Some("C".into()))
            .run(source)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoModelFound);
    }

    #[test]
    fn functions_only_finds_nothing() {
        let err = Pipeline::default()
            .run("def helper(x):\n    return x\n")
            .unwrap_err();
        assert_eq!(err, ForgeError::NoModelFound);
    }

    #[test]
    fn derivation_failures_name_the_model() {
        let err = Pipeline::default()
            .run("from typing import Callable\nclass Hook(BaseModel):\n    run: Callable[[int], int]\n")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaDerivationFailed);
        assert_eq!(
            err.to_string(),
            "Failed to generate JSON Schema from Hook: Cannot generate a JsonSchema for core_schema.CallableSchema"
        );
    }

    #[test]
    fn environment_check_lists_modules() {
        let modules = Pipeline::default().check_environment().unwrap();
        assert!(modules.contains(&"pydantic".to_string()));
        assert!(modules.contains(&"typing".to_string()));
    }
}
