//! Pipeline errors and their user-visible messages.

use serde::Serialize;

use crate::interpreter::ExecError;
use crate::policy::ImportDenied;

/// Stable classification of a [`ForgeError`], used in logs and by callers
/// that branch on the failure stage.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyInput,
    EnvironmentUnavailable,
    ImportDenied,
    ExecutionFailed,
    NoModelFound,
    SchemaDerivationFailed,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::EnvironmentUnavailable => "environment_unavailable",
            Self::ImportDenied => "import_denied",
            Self::ExecutionFailed => "execution_failed",
            Self::NoModelFound => "no_model_found",
            Self::SchemaDerivationFailed => "schema_derivation_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForgeError {
    #[error("No input provided")]
    EmptyInput,

    #[error("Failed to import pydantic: {0}. Ensure pydantic>=2 is installed.")]
    EnvironmentUnavailable(String),

    #[error("Failed to execute Pydantic code: {0}")]
    ImportDenied(#[source] ImportDenied),

    #[error("Failed to execute Pydantic code: {message}")]
    ExecutionFailed {
        /// Exception class raised by the source, e.g. `NameError`.
        class: String,
        message: String,
        line: Option<usize>,
    },

    #[error("No BaseModel subclass found in the provided code.")]
    NoModelFound,

    #[error(
        "Model '{requested}' not found in the provided code. Declared models: {}",
        format_declared(.declared)
    )]
    ModelNotDeclared {
        requested: String,
        declared: Vec<String>,
    },

    #[error("Failed to generate JSON Schema from {model}: {message}")]
    SchemaDerivationFailed { model: String, message: String },
}

fn format_declared(declared: &[String]) -> String {
    if declared.is_empty() {
        "(none)".to_string()
    } else {
        declared.join(", ")
    }
}

impl ForgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput => ErrorKind::EmptyInput,
            Self::EnvironmentUnavailable(_) => ErrorKind::EnvironmentUnavailable,
            Self::ImportDenied(_) => ErrorKind::ImportDenied,
            Self::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            Self::NoModelFound | Self::ModelNotDeclared { .. } => ErrorKind::NoModelFound,
            Self::SchemaDerivationFailed { .. } => ErrorKind::SchemaDerivationFailed,
        }
    }

    /// Classify an error raised while executing user source.
    pub fn from_execution(err: ExecError) -> Self {
        match err {
            ExecError::ImportDenied(denied) => Self::ImportDenied(denied),
            other => Self::ExecutionFailed {
                class: other.class_name().to_string(),
                line: other.line(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn import_denials_keep_the_guard_message() {
        let err = ForgeError::from_execution(ExecError::ImportDenied(ImportDenied {
            module: "os".into(),
        }));
        assert_eq!(err.kind(), ErrorKind::ImportDenied);
        assert_eq!(
            err.to_string(),
            "Failed to execute Pydantic code: Import of 'os' is not allowed. Only pydantic, typing, and standard lib types are permitted."
        );
    }

    #[test]
    fn raised_errors_become_execution_failures() {
        let err = ForgeError::from_execution(ExecError::name_error("Missing").at_line(3));
        assert_eq!(
            err,
            ForgeError::ExecutionFailed {
                class: "NameError".into(),
                message: "name 'Missing' is not defined".into(),
                line: Some(3),
            }
        );
        assert_eq!(
            err.to_string(),
            "Failed to execute Pydantic code: name 'Missing' is not defined"
        );
    }

    #[test]
    fn explicit_selection_lists_declared_models() {
        let err = ForgeError::ModelNotDeclared {
            requested: "Order".into(),
            declared: vec!["User".into(), "Address".into()],
        };
        assert_eq!(err.kind(), ErrorKind::NoModelFound);
        assert_eq!(
            err.to_string(),
            "Model 'Order' not found in the provided code. Declared models: User, Address"
        );
    }
}
