//! A restricted interpreter for declarative model source.
//!
//! Only the statement forms that model files actually use are executed:
//! imports, class and function definitions, assignments, conditionals and a
//! few expression statements. Function bodies are parsed but never run, every
//! import goes through the [`ImportPolicy`] handed to the interpreter, and
//! each evaluation step is charged against a [`Budget`] so hostile input
//! terminates with an error instead of hanging the process.

pub mod budget;
pub mod builtins;
pub mod classes;
mod eval;
pub mod fields;
pub mod modules;
mod ops;
pub mod text;
pub mod typing;
pub mod value;

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use schemaforge_config::LimitsConfig;

use crate::policy::{ImportDenied, ImportPolicy};
use crate::schema::types::{ForwardError, ForwardResolver};
use crate::syntax::{SyntaxError, SyntaxErrorKind, parse_expression, parse_module};

pub use budget::{Budget, BudgetExceeded};
pub use builtins::CallArgs;
pub use modules::{ModuleLoader, Roots};
pub use value::{Module, Namespace, Value};

use eval::Scope;
use value::ExceptionKind;

/// An exception raised by executed code, identified by its class name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RaisedError {
    pub class: String,
    pub message: String,
    /// Source line of the statement that raised, when known.
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    ImportDenied(#[from] ImportDenied),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error(transparent)]
    Raised(#[from] RaisedError),
}

impl ExecError {
    pub fn raise(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Raised(RaisedError {
            class: class.into(),
            message: message.into(),
            line: None,
        })
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raise("ValueError", message)
    }

    pub fn key_error(key: &Value) -> Self {
        Self::raise("KeyError", key.repr())
    }

    pub fn name_error(name: &str) -> Self {
        Self::raise("NameError", format!("name '{name}' is not defined"))
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::raise("AttributeError", message)
    }

    pub fn import_error(message: impl Into<String>) -> Self {
        Self::raise("ImportError", message)
    }

    pub fn module_not_found(name: &str) -> Self {
        Self::raise("ModuleNotFoundError", format!("No module named '{name}'"))
    }

    /// Errors pydantic reports as `PydanticUserError`.
    pub fn user_error(message: impl Into<String>) -> Self {
        Self::raise("PydanticUserError", message)
    }

    /// Attach a source line if none is recorded yet.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::Raised(mut raised) => {
                raised.line.get_or_insert(line);
                Self::Raised(raised)
            }
            other => other,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Raised(raised) => raised.line,
            _ => None,
        }
    }

    pub fn class_name(&self) -> &str {
        match self {
            Self::ImportDenied(_) => "ImportError",
            Self::Budget(_) => "BudgetExceeded",
            Self::Raised(raised) => &raised.class,
        }
    }

    /// Whether the error is an instance of the named exception class.
    pub fn is_class(&self, name: &str) -> bool {
        let class = self.class_name();
        if class == name {
            return true;
        }
        let lookup = |wanted: &str| {
            ExceptionKind::ALL
                .iter()
                .copied()
                .find(|kind| kind.name() == wanted)
        };
        match (lookup(class), lookup(name)) {
            (Some(actual), Some(expected)) => actual.is_subclass_of(expected),
            _ => false,
        }
    }

    /// The name a `NameError` complains about.
    pub fn undefined_name(&self) -> Option<String> {
        match self {
            Self::Raised(raised) if raised.class == "NameError" => raised
                .message
                .strip_prefix("name '")
                .and_then(|rest| rest.strip_suffix("' is not defined"))
                .map(str::to_string),
            _ => None,
        }
    }
}

impl From<SyntaxError> for ExecError {
    fn from(err: SyntaxError) -> Self {
        if let SyntaxErrorKind::NestingLimit(limit) = err.kind {
            return Self::Budget(BudgetExceeded::Nesting(limit));
        }
        Self::Raised(RaisedError {
            class: err.class_name().to_string(),
            message: err.to_string(),
            line: Some(err.line),
        })
    }
}

/// Notified of every class statement executed at module level, in order.
pub trait DeclarationObserver {
    fn class_declared(&mut self, name: &str, value: &Value, line: usize);
}

/// Observer that ignores declarations.
impl DeclarationObserver for () {
    fn class_declared(&mut self, _name: &str, _value: &Value, _line: usize) {}
}

#[derive(Debug)]
pub struct Interpreter {
    loader: ModuleLoader,
    budget: Budget,
    globals: Namespace,
    builtins: Namespace,
    next_class_id: Cell<u64>,
}

impl Interpreter {
    pub fn new(policy: Arc<dyn ImportPolicy>, limits: &LimitsConfig) -> Self {
        Self {
            loader: ModuleLoader::new(policy),
            budget: Budget::new(limits),
            globals: Namespace::new(),
            builtins: builtins::builtin_namespace(),
            next_class_id: Cell::new(Roots::RESERVED_IDS),
        }
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn roots(&self) -> &Roots {
        self.loader.roots()
    }

    pub fn globals(&self) -> &Namespace {
        &self.globals
    }

    /// Bind a name in the module namespace before execution.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Import through the policy, as an `import` statement would.
    pub fn import_module(&self, name: &str) -> Result<Rc<Module>, ExecError> {
        self.loader.import(name)
    }

    pub(crate) fn next_class_id(&self) -> u64 {
        let id = self.next_class_id.get();
        self.next_class_id.set(id + 1);
        id
    }

    /// Parse and run `source` in the module namespace.
    pub fn execute(
        &mut self,
        source: &str,
        observer: &mut dyn DeclarationObserver,
    ) -> Result<(), ExecError> {
        self.budget.restart();
        self.budget.check_source(source)?;
        let module = parse_module(source, self.budget.limits().max_nesting_depth)?;
        tracing::debug!(statements = module.body.len(), "executing module");
        let mut scope = Scope::Module;
        for stmt in &module.body {
            self.exec_stmt(stmt, &mut scope, observer)?;
        }
        self.budget.check_deadline()?;
        tracing::debug!(
            steps = self.budget.steps_taken(),
            elapsed_ms = u64::try_from(self.budget.elapsed().as_millis()).unwrap_or(u64::MAX),
            "module executed"
        );
        Ok(())
    }

    /// Call any callable value.
    pub fn call(&self, callee: &Value, args: CallArgs) -> Result<Value, ExecError> {
        self.call_value(callee, args)
    }

    pub fn get_attr(&self, object: &Value, name: &str) -> Result<Value, ExecError> {
        self.attribute(object, name)
    }
}

impl ForwardResolver for Interpreter {
    fn resolve_forward(
        &self,
        text: &str,
        owner_name: &str,
        owner: Option<&Value>,
    ) -> Result<Value, ForwardError> {
        let expr = parse_expression(text, self.budget.limits().max_nesting_depth)
            .map_err(|err| ForwardError::Failed(err.into()))?;
        let scope = Scope::Forward { owner_name, owner };
        self.eval(&expr, &scope).map_err(|err| match err.undefined_name() {
            Some(name) => ForwardError::Undefined(name),
            None => ForwardError::Failed(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowlistPolicy;

    fn interpreter() -> Interpreter {
        Interpreter::new(
            Arc::new(AllowlistPolicy::standard()),
            &LimitsConfig::default(),
        )
    }

    #[test]
    fn syntax_errors_keep_python_wording() {
        let mut interp = interpreter();
        let err = interp.execute("class :\n", &mut ()).unwrap_err();
        assert_eq!(err.class_name(), "SyntaxError");
        assert!(err.to_string().contains("(<string>, line 1)"));
    }

    #[test]
    fn undefined_names_are_recognised() {
        let err = ExecError::name_error("Missing");
        assert_eq!(err.undefined_name().as_deref(), Some("Missing"));
        assert!(ExecError::type_error("x").undefined_name().is_none());
    }

    #[test]
    fn exception_hierarchy_is_respected() {
        let err = ExecError::module_not_found("os");
        assert!(err.is_class("ImportError"));
        assert!(err.is_class("Exception"));
        assert!(!err.is_class("ValueError"));
    }

    #[test]
    fn forward_references_resolve_against_globals() {
        let mut interp = interpreter();
        interp
            .execute("from typing import List\nAlias = List[int]\n", &mut ())
            .unwrap();
        let value = interp.resolve_forward("Alias", "Owner", None).unwrap();
        assert!(matches!(value, Value::Generic(_)));
        assert!(matches!(
            interp.resolve_forward("Owner", "Owner", None),
            Err(ForwardError::Undefined(name)) if name == "Owner"
        ));
    }

    #[test]
    fn step_budget_stops_runaway_source() {
        let limits = LimitsConfig {
            max_steps: 50,
            ..LimitsConfig::default()
        };
        let mut interp = Interpreter::new(Arc::new(AllowlistPolicy::standard()), &limits);
        let source = "x = [1] * 10\n".repeat(40);
        let err = interp.execute(&source, &mut ()).unwrap_err();
        assert!(matches!(err, ExecError::Budget(BudgetExceeded::Steps(50))));
    }
}
