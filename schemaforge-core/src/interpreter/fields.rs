//! Field metadata: `Field(...)` results and annotated-types constraints.

use std::fmt::Write as _;
use std::rc::Rc;

use super::ExecError;
use super::builtins::CallArgs;
use super::value::{Value, float_repr};

/// Numeric bound carried by `gt`, `ge`, `lt`, `le` and `multiple_of`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(Self::Int(i128::from(*flag))),
            Value::Int(int) => Some(Self::Int(*int)),
            Value::Float(float) => Some(Self::Float(*float)),
            Value::Decimal(text) => text.parse::<f64>().ok().map(Self::Float),
            _ => None,
        }
    }

    pub fn to_json(self) -> serde_json::Value {
        match self {
            Self::Int(int) => int_to_json(int),
            Self::Float(float) => serde_json::Number::from_f64(float)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        }
    }

    fn repr(self) -> String {
        match self {
            Self::Int(int) => int.to_string(),
            Self::Float(float) => float_repr(float),
        }
    }
}

/// JSON number for an int. Values outside the 64-bit ranges keep every digit.
pub fn int_to_json(int: i128) -> serde_json::Value {
    if let Ok(small) = i64::try_from(int) {
        return serde_json::Value::from(small);
    }
    if let Ok(unsigned) = u64::try_from(int) {
        return serde_json::Value::from(unsigned);
    }
    serde_json::from_str::<serde_json::Number>(&int.to_string())
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub gt: Option<Number>,
    pub ge: Option<Number>,
    pub lt: Option<Number>,
    pub le: Option<Number>,
    pub multiple_of: Option<Number>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Overlay `other` on top of `self`; values set in `other` win.
    pub fn merge(&mut self, other: &Constraints) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        overlay!(gt, ge, lt, le, multiple_of, min_length, max_length, pattern);
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        let numbers = [
            ("gt", self.gt),
            ("ge", self.ge),
            ("lt", self.lt),
            ("le", self.le),
            ("multiple_of", self.multiple_of),
        ];
        for (name, number) in numbers {
            if let Some(number) = number {
                entries.push((name, number.repr()));
            }
        }
        if let Some(min) = self.min_length {
            entries.push(("min_length", min.to_string()));
        }
        if let Some(max) = self.max_length {
            entries.push(("max_length", max.to_string()));
        }
        if let Some(pattern) = &self.pattern {
            entries.push(("pattern", super::value::str_repr(pattern)));
        }
        entries
    }

    /// Read the constraint keywords shared by `Field` and the `con*` helpers.
    pub(crate) fn take_from(args: &mut CallArgs, func: &str) -> Result<Self, ExecError> {
        let mut constraints = Self::default();
        for (name, slot) in [
            ("gt", &mut constraints.gt),
            ("ge", &mut constraints.ge),
            ("lt", &mut constraints.lt),
            ("le", &mut constraints.le),
            ("multiple_of", &mut constraints.multiple_of),
        ] {
            if let Some(value) = args.take_keyword(name).filter(|v| !matches!(v, Value::None)) {
                let number = Number::from_value(&value).ok_or_else(|| {
                    ExecError::type_error(format!(
                        "{func}() argument '{name}' must be a number, not '{}'",
                        value.type_name()
                    ))
                })?;
                *slot = Some(number);
            }
        }
        for (name, slot) in [
            ("min_length", &mut constraints.min_length),
            ("max_length", &mut constraints.max_length),
        ] {
            if let Some(value) = args.take_keyword(name).filter(|v| !matches!(v, Value::None)) {
                *slot = Some(length_argument(func, name, &value)?);
            }
        }
        if let Some(value) = args.take_keyword("pattern").filter(|v| !matches!(v, Value::None)) {
            let Value::Str(pattern) = value else {
                return Err(ExecError::type_error(format!(
                    "{func}() argument 'pattern' must be str, not '{}'",
                    value.type_name()
                )));
            };
            constraints.pattern = Some(pattern.to_string());
        }
        Ok(constraints)
    }
}

pub(crate) fn length_argument(func: &str, name: &str, value: &Value) -> Result<u64, ExecError> {
    match value {
        Value::Int(int) if *int >= 0 => u64::try_from(*int).map_err(|_| {
            ExecError::raise(
                "OverflowError",
                format!("{func}() argument '{name}' is too large"),
            )
        }),
        Value::Int(_) => Err(ExecError::value_error(format!(
            "{func}() argument '{name}' must be non-negative"
        ))),
        other => Err(ExecError::type_error(format!(
            "{func}() argument '{name}' must be int, not '{}'",
            other.type_name()
        ))),
    }
}

/// An annotated-types marker such as `Gt(5)` or the metadata behind
/// `conint(...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintMeta {
    pub name: &'static str,
    pub constraints: Constraints,
}

impl ConstraintMeta {
    pub fn new(name: &'static str, constraints: Constraints) -> Self {
        Self { name, constraints }
    }

    pub fn repr(&self) -> String {
        let body = self
            .constraints
            .entries()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({body})", self.name)
    }
}

/// The result of `Field(...)`, merged with any `Annotated` metadata.
#[derive(Debug, Clone, Default)]
pub struct FieldInfo {
    pub default: Option<Value>,
    pub default_factory: Option<Value>,
    pub alias: Option<String>,
    pub validation_alias: Option<String>,
    pub serialization_alias: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub examples: Option<Value>,
    pub deprecated: Option<Value>,
    pub json_schema_extra: Option<Value>,
    pub constraints: Constraints,
}

/// Accepted by `Field` but without influence on the generated schema.
const IGNORED_FIELD_KEYWORDS: &[&str] = &[
    "alias_priority",
    "field_title_generator",
    "exclude",
    "include",
    "discriminator",
    "frozen",
    "validate_default",
    "repr",
    "init",
    "init_var",
    "kw_only",
    "strict",
    "coerce_numbers_to_str",
    "allow_inf_nan",
    "max_digits",
    "decimal_places",
    "union_mode",
    "fail_fast",
];

impl FieldInfo {
    pub fn with_default(default: Value) -> Self {
        Self {
            default: Some(default),
            ..Self::default()
        }
    }

    /// Build a `FieldInfo` from the arguments of a `Field(...)` call.
    pub(crate) fn from_call(mut args: CallArgs) -> Result<Self, ExecError> {
        if args.positional.len() > 1 {
            return Err(ExecError::type_error(format!(
                "Field() takes from 0 to 1 positional arguments but {} were given",
                args.positional.len()
            )));
        }
        let default = match args.positional.pop() {
            Some(value) => Some(value),
            None => args.take_keyword("default"),
        };
        let default = default.filter(|value| !matches!(value, Value::Ellipsis));
        let default_factory = args
            .take_keyword("default_factory")
            .filter(|value| !matches!(value, Value::None));
        if default.is_some() && default_factory.is_some() {
            return Err(ExecError::type_error(
                "cannot specify both default and default_factory",
            ));
        }

        let alias = optional_string(&mut args, "alias")?;
        let validation_alias = optional_string(&mut args, "validation_alias")?;
        let serialization_alias = optional_string(&mut args, "serialization_alias")?;
        let title = optional_string(&mut args, "title")?;
        let description = optional_string(&mut args, "description")?;
        let examples = args.take_keyword("examples").filter(is_set);
        let deprecated = args.take_keyword("deprecated").filter(is_set);
        let mut json_schema_extra = args.take_keyword("json_schema_extra").filter(is_set);

        if args.take_keyword("const").is_some_and(|v| is_set(&v)) {
            return Err(ExecError::user_error(
                "`const` is removed, use `Literal` instead",
            ));
        }
        if args.take_keyword("regex").is_some_and(|v| is_set(&v)) {
            return Err(ExecError::user_error(
                "`regex` is removed. use `pattern` instead",
            ));
        }
        if args.take_keyword("unique_items").is_some_and(|v| is_set(&v)) {
            return Err(ExecError::user_error(
                "`unique_items` is removed, use `Set` instead(this feature is discussed in https://github.com/pydantic/pydantic-core/issues/296)",
            ));
        }
        let min_items = args.take_keyword("min_items").filter(is_set);
        let max_items = args.take_keyword("max_items").filter(is_set);
        if args.take_keyword("allow_mutation").is_some() {
            tracing::warn!("`allow_mutation` is deprecated, use `frozen` instead");
        }

        let mut constraints = Constraints::take_from(&mut args, "Field")?;
        if let Some(value) = min_items {
            tracing::warn!("`min_items` is deprecated, use `min_length` instead");
            if constraints.min_length.is_none() {
                constraints.min_length = Some(length_argument("Field", "min_items", &value)?);
            }
        }
        if let Some(value) = max_items {
            tracing::warn!("`max_items` is deprecated, use `max_length` instead");
            if constraints.max_length.is_none() {
                constraints.max_length = Some(length_argument("Field", "max_items", &value)?);
            }
        }

        for name in IGNORED_FIELD_KEYWORDS {
            if let Some(value) = args.take_keyword(name)
                && matches!(*name, "max_digits" | "decimal_places")
                && is_set(&value)
            {
                tracing::debug!(
                    keyword = name,
                    value = %value.repr(),
                    "decimal precision is validated at runtime only; not reflected in the schema"
                );
            }
        }

        let extra = std::mem::take(&mut args.keywords);
        if !extra.is_empty() {
            let keys = extra
                .iter()
                .map(|(key, _)| format!("'{key}'"))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                keys = %keys,
                "extra keyword arguments on `Field` are deprecated; use `json_schema_extra` instead"
            );
            if json_schema_extra.is_none() {
                json_schema_extra = Some(Value::dict(
                    extra
                        .into_iter()
                        .map(|(key, value)| (Value::str(key), value))
                        .collect(),
                ));
            }
        }

        Ok(Self {
            validation_alias: validation_alias.or_else(|| alias.clone()),
            default,
            default_factory,
            alias,
            serialization_alias,
            title,
            description,
            examples,
            deprecated,
            json_schema_extra,
            constraints,
        })
    }

    /// Overlay `other` on top of `self`, as when several `Field` markers
    /// annotate one attribute.
    pub fn merge(&mut self, other: &FieldInfo) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        overlay!(
            alias,
            validation_alias,
            serialization_alias,
            title,
            description,
            examples,
            deprecated,
            json_schema_extra
        );
        if other.default.is_some() || other.default_factory.is_some() {
            self.default = other.default.clone();
            self.default_factory = other.default_factory.clone();
        }
        self.constraints.merge(&other.constraints);
    }

    pub fn merge_constraints(&mut self, constraints: &Constraints) {
        self.constraints.merge(constraints);
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && self.default_factory.is_none()
    }

    /// Whether the info changes anything beyond the default value.
    pub fn has_schema_metadata(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.examples.is_some()
            || self.deprecated.is_some()
            || self.json_schema_extra.is_some()
            || !self.constraints.is_empty()
    }

    pub fn repr(&self) -> String {
        let mut out = format!(
            "FieldInfo(annotation=NoneType, required={}",
            if self.is_required() { "True" } else { "False" }
        );
        if let Some(default) = &self.default {
            let _ = write!(out, ", default={}", default.repr());
        }
        if let Some(alias) = &self.alias {
            let _ = write!(out, ", alias='{alias}'");
        }
        if let Some(description) = &self.description {
            let _ = write!(out, ", description='{description}'");
        }
        let metadata = self.constraints.entries();
        if !metadata.is_empty() {
            let body = metadata
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, ", metadata=[{body}]");
        }
        out.push(')');
        out
    }
}

impl From<FieldInfo> for Value {
    fn from(info: FieldInfo) -> Self {
        Value::FieldInfo(Rc::new(info))
    }
}

fn is_set(value: &Value) -> bool {
    !matches!(value, Value::None)
}

fn optional_string(args: &mut CallArgs, name: &str) -> Result<Option<String>, ExecError> {
    match args.take_keyword(name) {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(text)) => Ok(Some(text.to_string())),
        // AliasPath / AliasChoices and friends only matter for validation.
        Some(_) if name.ends_with("alias") => Ok(None),
        Some(other) => Err(ExecError::type_error(format!(
            "Field() argument '{name}' must be str, not '{}'",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(positional: Vec<Value>, keywords: Vec<(&str, Value)>) -> Result<FieldInfo, ExecError> {
        FieldInfo::from_call(CallArgs::new(
            positional,
            keywords
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        ))
    }

    #[test]
    fn ellipsis_default_means_required() {
        let info = call(vec![Value::Ellipsis], vec![]).unwrap();
        assert!(info.is_required());
    }

    #[test]
    fn alias_becomes_validation_alias() {
        let info = call(vec![], vec![("alias", Value::str("userName"))]).unwrap();
        assert_eq!(info.validation_alias.as_deref(), Some("userName"));
    }

    #[test]
    fn default_and_factory_conflict() {
        let err = call(
            vec![Value::Int(1)],
            vec![("default_factory", Value::Type(super::super::value::BuiltinType::List))],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cannot specify both default and default_factory");
    }

    #[test]
    fn legacy_item_bounds_map_to_lengths() {
        let info = call(vec![], vec![("min_items", Value::Int(1)), ("max_items", Value::Int(3))])
            .unwrap();
        assert_eq!(info.constraints.min_length, Some(1));
        assert_eq!(info.constraints.max_length, Some(3));
    }

    #[test]
    fn removed_keywords_fail() {
        let err = call(vec![], vec![("regex", Value::str("^a$"))]).unwrap_err();
        assert_eq!(err.to_string(), "`regex` is removed. use `pattern` instead");
    }

    #[test]
    fn unknown_keywords_become_schema_extra() {
        let info = call(vec![], vec![("example", Value::Int(3))]).unwrap();
        let Some(Value::Dict(entries)) = info.json_schema_extra else {
            panic!("expected dict extra");
        };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn later_metadata_wins() {
        let mut base = call(vec![], vec![("gt", Value::Int(0)), ("description", Value::str("a"))])
            .unwrap();
        let overlay = call(vec![], vec![("gt", Value::Int(5))]).unwrap();
        base.merge(&overlay);
        assert_eq!(base.constraints.gt, Some(Number::Int(5)));
        assert_eq!(base.description.as_deref(), Some("a"));
    }

    #[test]
    fn wide_ints_render_every_digit() {
        assert_eq!(int_to_json(-3), serde_json::json!(-3));
        assert_eq!(int_to_json(i128::from(u64::MAX)).to_string(), "18446744073709551615");
        assert_eq!(int_to_json(1 << 64).to_string(), "18446744073709551616");
        assert_eq!(
            int_to_json(-99_999_999_999_999_999_999_999).to_string(),
            "-99999999999999999999999"
        );
    }

    #[test]
    fn decimal_precision_is_accepted() {
        let info = call(
            vec![],
            vec![("max_digits", Value::Int(5)), ("decimal_places", Value::Int(2))],
        )
        .unwrap();
        assert_eq!(info.constraints, Constraints::default());
        assert!(info.json_schema_extra.is_none());
    }
}
