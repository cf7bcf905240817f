//! The single JSON document written for every run.
//!
//! Success is `{"schema": …, "modelName": …, "allModels": […]}` and failure
//! is `{"error": "…"}`. The two shapes never mix, and the process exit code
//! follows the shape: 0 for success, 1 for failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ForgeError;
use crate::pipeline::Extraction;

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPayload {
    pub schema: Value,
    pub model_name: String,
    pub all_models: Vec<String>,
}

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForgeResult {
    Success(SchemaPayload),
    Failure(ErrorPayload),
}

impl From<Extraction> for ForgeResult {
    fn from(extraction: Extraction) -> Self {
        Self::Success(SchemaPayload {
            schema: extraction.schema,
            model_name: extraction.model_name,
            all_models: extraction.all_models,
        })
    }
}

impl From<&ForgeError> for ForgeResult {
    fn from(err: &ForgeError) -> Self {
        Self::failure(err.to_string())
    }
}

impl ForgeResult {
    pub fn from_outcome(outcome: Result<Extraction, ForgeError>) -> Self {
        match outcome {
            Ok(extraction) => extraction.into(),
            Err(err) => (&err).into(),
        }
    }

    /// A failure document carrying `message` verbatim.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(ErrorPayload {
            error: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Drop the top-level `title` of a successful schema. Titles inside
    /// `$defs` and properties are kept.
    pub fn strip_root_title(mut self) -> Self {
        if let Self::Success(payload) = &mut self
            && let Value::Object(map) = &mut payload.schema
        {
            map.shift_remove("title");
        }
        self
    }

    pub fn render(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        // Serializing a tree of strings and JSON values cannot fail; keep
        // the protocol intact if it ever does.
        rendered.unwrap_or_else(|err| {
            let fallback = serde_json::json!({ "error": err.to_string() });
            fallback.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn extraction() -> Extraction {
        Extraction {
            schema: json!({"properties": {}, "title": "User", "type": "object"}),
            model_name: "User".into(),
            all_models: vec!["Address".into(), "User".into()],
        }
    }

    #[test]
    fn success_uses_camel_case_keys() {
        let result = ForgeResult::from_outcome(Ok(extraction()));
        assert_eq!(result.exit_code(), 0);
        assert_eq!(
            result.render(false),
            r#"{"schema":{"properties":{},"title":"User","type":"object"},"modelName":"User","allModels":["Address","User"]}"#
        );
    }

    #[test]
    fn failure_has_only_the_error_key() {
        let result = ForgeResult::from_outcome(Err(ForgeError::EmptyInput));
        assert_eq!(result.exit_code(), 1);
        let value: Value = serde_json::from_str(&result.render(true)).unwrap();
        assert_eq!(value, json!({"error": "No input provided"}));
    }

    #[test]
    fn documents_parse_back_into_the_right_shape() {
        let parsed: ForgeResult = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(parsed, ForgeResult::failure("boom"));
        let parsed: ForgeResult =
            serde_json::from_str(&ForgeResult::from(extraction()).render(false)).unwrap();
        assert!(parsed.is_success());
    }

    #[test]
    fn stripping_the_root_title_keeps_nested_titles() {
        let mut extraction = extraction();
        extraction.schema = json!({
            "$defs": {"Address": {"title": "Address", "type": "object"}},
            "title": "User",
            "type": "object"
        });
        let ForgeResult::Success(payload) = ForgeResult::from(extraction).strip_root_title() else {
            panic!("expected success");
        };
        assert_eq!(
            payload.schema,
            json!({"$defs": {"Address": {"title": "Address", "type": "object"}}, "type": "object"})
        );
    }
}
