//! Import policy applied to every module load performed by executed source.

use rustc_hash::FxHashSet;
use std::fmt;

use schemaforge_config::DEFAULT_ALLOWED_MODULES;

/// Raised when executed code asks for a module outside the allowlist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Import of '{module}' is not allowed. Only pydantic, typing, and standard lib types are permitted."
)]
pub struct ImportDenied {
    pub module: String,
}

/// Decides whether a dotted module path may be imported.
///
/// An instance is handed to each interpreter when it is built, so separate
/// executions never share or mutate a common hook.
pub trait ImportPolicy: Send + Sync + fmt::Debug {
    fn check(&self, module: &str) -> Result<(), ImportDenied>;

    /// Module names the policy was configured with, for diagnostics.
    fn allowed_modules(&self) -> Vec<String>;
}

/// Accepts a path when its top-level segment or the full dotted path is listed.
#[derive(Debug, Clone)]
pub struct AllowlistPolicy {
    ordered: Vec<String>,
    lookup: FxHashSet<String>,
}

impl AllowlistPolicy {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut lookup = FxHashSet::default();
        for module in modules {
            let module = module.into();
            if lookup.insert(module.clone()) {
                ordered.push(module);
            }
        }
        Self { ordered, lookup }
    }

    /// The allowlist used when nothing is configured.
    pub fn standard() -> Self {
        Self::new(DEFAULT_ALLOWED_MODULES.iter().copied())
    }

    pub fn permits(&self, module: &str) -> bool {
        let top_level = module.split('.').next().unwrap_or(module);
        self.lookup.contains(top_level) || self.lookup.contains(module)
    }
}

impl Default for AllowlistPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl ImportPolicy for AllowlistPolicy {
    fn check(&self, module: &str) -> Result<(), ImportDenied> {
        if self.permits(module) {
            Ok(())
        } else {
            tracing::debug!(module, "import rejected by allowlist");
            Err(ImportDenied {
                module: module.to_string(),
            })
        }
    }

    fn allowed_modules(&self) -> Vec<String> {
        self.ordered.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_segment_grants_submodules() {
        let policy = AllowlistPolicy::new(["pydantic"]);
        assert!(policy.check("pydantic").is_ok());
        assert!(policy.check("pydantic.fields").is_ok());
    }

    #[test]
    fn full_path_grants_only_that_path() {
        let policy = AllowlistPolicy::standard();
        assert!(policy.check("collections.abc").is_ok());
        let err = policy.check("collections").unwrap_err();
        assert_eq!(err.module, "collections");
    }

    #[test]
    fn denial_message_names_the_module() {
        let policy = AllowlistPolicy::standard();
        let err = policy.check("os.path").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Import of 'os.path' is not allowed. Only pydantic, typing, and standard lib types are permitted."
        );
    }

    #[test]
    fn duplicates_are_collapsed() {
        let policy = AllowlistPolicy::new(["typing", "typing", "enum"]);
        assert_eq!(policy.allowed_modules(), vec!["typing", "enum"]);
    }
}
