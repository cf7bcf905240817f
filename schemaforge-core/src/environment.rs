//! The restricted execution environment: a seeded namespace plus the
//! interpreter that runs one source text in it.

use std::sync::Arc;

use schemaforge_config::LimitsConfig;

use crate::error::ForgeError;
use crate::interpreter::{DeclarationObserver, ExecError, Interpreter, Namespace, Value};
use crate::policy::ImportPolicy;

/// Names bound before the source runs, grouped by the module they come from.
pub const SEEDED_NAMES: &[(&str, &[&str])] = &[
    ("pydantic", &["BaseModel", "Field"]),
    (
        "typing",
        &[
            "Optional",
            "List",
            "Dict",
            "Set",
            "Tuple",
            "Union",
            "Literal",
            "Annotated",
            "Any",
            "ClassVar",
            "Type",
        ],
    ),
    ("enum", &["Enum"]),
    ("datetime", &["datetime", "date", "time", "timedelta"]),
    ("decimal", &["Decimal"]),
    ("uuid", &["UUID"]),
];

/// Modules bound under their own name as well.
const SEEDED_MODULES: &[&str] = &["pydantic", "typing"];

pub struct ExecutionEnvironment {
    interpreter: Interpreter,
}

impl std::fmt::Debug for ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEnvironment")
            .field("names", &self.interpreter.globals().len())
            .finish()
    }
}

impl ExecutionEnvironment {
    /// Build an interpreter for `policy` and seed its namespace.
    ///
    /// Seeding imports through the same policy as user code. A failure here
    /// means the environment itself is unusable and is never reported as an
    /// error in the source.
    pub fn new(policy: Arc<dyn ImportPolicy>, limits: &LimitsConfig) -> Result<Self, ForgeError> {
        let mut interpreter = Interpreter::new(policy, limits);
        seed(&mut interpreter).map_err(|err| {
            tracing::error!(error = %err, "failed to seed the execution namespace");
            ForgeError::EnvironmentUnavailable(err.to_string())
        })?;
        tracing::debug!(
            names = interpreter.globals().len(),
            "execution namespace seeded"
        );
        Ok(Self { interpreter })
    }

    /// Run `source` in the seeded namespace, reporting class declarations to
    /// `observer`.
    pub fn execute(
        &mut self,
        source: &str,
        observer: &mut dyn DeclarationObserver,
    ) -> Result<(), ForgeError> {
        if source.trim().is_empty() {
            return Err(ForgeError::EmptyInput);
        }
        self.interpreter
            .execute(source, observer)
            .map_err(ForgeError::from_execution)
    }

    pub fn namespace(&self) -> &Namespace {
        self.interpreter.globals()
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Modules loaded so far, seeding included.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.interpreter.loader().loaded_names()
    }
}

fn seed(interpreter: &mut Interpreter) -> Result<(), ExecError> {
    for (module_name, names) in SEEDED_NAMES {
        let module = interpreter.import_module(module_name)?;
        if SEEDED_MODULES.contains(module_name) {
            interpreter.bind(*module_name, Value::Module(std::rc::Rc::clone(&module)));
        }
        for name in *names {
            let value = module.get(name).ok_or_else(|| {
                ExecError::import_error(format!("cannot import name '{name}' from '{module_name}'"))
            })?;
            interpreter.bind(*name, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;
    use crate::policy::AllowlistPolicy;

    fn environment(modules: &[&str]) -> Result<ExecutionEnvironment, ForgeError> {
        ExecutionEnvironment::new(
            Arc::new(AllowlistPolicy::new(modules.iter().copied())),
            &LimitsConfig::default(),
        )
    }

    #[test]
    fn seeds_the_documented_names() {
        let env = environment(schemaforge_config::DEFAULT_ALLOWED_MODULES).unwrap();
        for name in [
            "pydantic",
            "BaseModel",
            "Field",
            "typing",
            "Optional",
            "Type",
            "Enum",
            "timedelta",
            "Decimal",
            "UUID",
        ] {
            assert!(env.namespace().contains_key(name), "missing {name}");
        }
        assert!(env.loaded_modules().contains(&"annotated_types".to_string()));
    }

    #[test]
    fn seeding_respects_the_policy() {
        let err = environment(&["typing"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EnvironmentUnavailable);
        assert_eq!(
            err.to_string(),
            "Failed to import pydantic: Import of 'pydantic' is not allowed. Only pydantic, typing, and standard lib types are permitted.. Ensure pydantic>=2 is installed."
        );
    }

    #[test]
    fn blank_source_is_rejected_before_execution() {
        let mut env = environment(schemaforge_config::DEFAULT_ALLOWED_MODULES).unwrap();
        let err = env.execute("  \n\t", &mut ()).unwrap_err();
        assert_eq!(err, ForgeError::EmptyInput);
    }

    #[test]
    fn seeded_names_are_usable_without_imports() {
        let mut env = environment(schemaforge_config::DEFAULT_ALLOWED_MODULES).unwrap();
        env.execute(
            "class User(BaseModel):\n    tags: List[str] = Field(default_factory=list)\n",
            &mut (),
        )
        .unwrap();
        assert!(matches!(env.namespace().get("User"), Some(Value::Model(_))));
    }
}
