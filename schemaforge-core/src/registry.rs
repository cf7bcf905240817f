//! Model discovery over the post-execution namespace.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::interpreter::classes::ModelClass;
use crate::interpreter::{DeclarationObserver, Namespace, Value};

/// A model found after execution.
#[derive(Debug, Clone)]
pub struct DiscoveredModel {
    /// The namespace name the model is bound to. An alias such as
    /// `Main = User` is discovered under `Main`.
    pub name: String,
    pub model: Rc<ModelClass>,
    /// Zero-based position in discovery order.
    pub order: usize,
    pub line: usize,
}

/// Module-level class declarations, keyed by name.
///
/// A name declared again keeps its first position and takes the latest line,
/// the same way rebinding a namespace entry keeps its slot.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    declarations: IndexMap<String, usize>,
}

impl DeclarationObserver for ModelRegistry {
    fn class_declared(&mut self, name: &str, _value: &Value, line: usize) {
        self.declarations.insert(name.to_string(), line);
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Every public binding in `namespace` whose value is a model subclass,
    /// in namespace order.
    pub fn discover(&self, namespace: &Namespace) -> Vec<DiscoveredModel> {
        let mut found = Vec::new();
        for (name, value) in namespace {
            if name.starts_with('_') {
                continue;
            }
            let Value::Model(model) = value else {
                continue;
            };
            if model.is_root {
                continue;
            }
            let line = match self.declarations.get(name) {
                Some(line) => *line,
                None => {
                    tracing::debug!(
                        name = %name,
                        model = %model.name,
                        "model bound under a name it was not declared with"
                    );
                    model.line
                }
            };
            found.push(DiscoveredModel {
                name: name.clone(),
                model: Rc::clone(model),
                order: found.len(),
                line,
            });
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use schemaforge_config::LimitsConfig;

    use super::*;
    use crate::interpreter::Interpreter;
    use crate::policy::AllowlistPolicy;

    fn discover(source: &str) -> Vec<String> {
        let mut interp = Interpreter::new(
            Arc::new(AllowlistPolicy::standard()),
            &LimitsConfig::default(),
        );
        let mut registry = ModelRegistry::new();
        interp.execute(source, &mut registry).unwrap();
        registry
            .discover(interp.globals())
            .into_iter()
            .map(|model| model.name)
            .collect()
    }

    #[test]
    fn models_in_declaration_order() {
        let names = discover(
            "from pydantic import BaseModel\nclass A(BaseModel):\n    x: int\nclass B(BaseModel):\n    y: str\n",
        );
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn redeclaration_keeps_the_first_position() {
        let names = discover(
            "from pydantic import BaseModel\nclass A(BaseModel):\n    x: int\nclass B(BaseModel):\n    y: str\nclass A(BaseModel):\n    z: int\n",
        );
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn aliases_are_discovered_under_their_own_name() {
        let names = discover(
            "from pydantic import BaseModel\nclass User(BaseModel):\n    x: int\nMain = User\n_Private = User\nBase = BaseModel\n",
        );
        assert_eq!(names, vec!["User", "Main"]);
    }

    #[test]
    fn private_enums_and_rebound_names_are_skipped() {
        let names = discover(
            "from pydantic import BaseModel\nfrom enum import Enum\nclass _Hidden(BaseModel):\n    x: int\nclass Color(Enum):\n    RED = 1\nclass Gone(BaseModel):\n    x: int\nGone = 3\nclass Kept(BaseModel):\n    x: int\n",
        );
        assert_eq!(names, vec!["Kept"]);
    }

    #[test]
    fn nested_classes_are_not_discovered() {
        let names = discover(
            "from pydantic import BaseModel\nclass Outer(BaseModel):\n    class Inner(BaseModel):\n        x: int\n    inner: Inner\n",
        );
        assert_eq!(names, vec!["Outer"]);
    }
}
