//! Annotation values reduced to structural type expressions.
//!
//! Model fields keep their annotations as interpreter values. Before a schema
//! can be derived each annotation is converted into a [`TypeExpr`], resolving
//! string (forward) annotations through a [`ForwardResolver`] on the way.

use std::rc::Rc;

use crate::interpreter::classes::{EnumClass, ModelClass, peel_annotated};
use crate::interpreter::fields::FieldInfo;
use crate::interpreter::typing;
use crate::interpreter::value::{BuiltinType, GenericAlias, SpecialForm, Value};
use crate::interpreter::ExecError;

/// Nested string annotations deeper than this are treated as a cycle.
const MAX_FORWARD_DEPTH: usize = 32;

/// Evaluates a string annotation in the namespace it was declared in.
pub trait ForwardResolver {
    /// `owner_name` refers to `owner`; while the owner is still being built
    /// (`owner` is `None`) the name is undefined.
    fn resolve_forward(
        &self,
        text: &str,
        owner_name: &str,
        owner: Option<&Value>,
    ) -> Result<Value, ForwardError>;
}

#[derive(Debug)]
pub enum ForwardError {
    /// A name in the annotation is not bound yet.
    Undefined(String),
    Failed(ExecError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("name '{0}' is not defined")]
    Undefined(String),
    #[error(transparent)]
    Invalid(ExecError),
}

impl From<ForwardError> for ConvertError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::Undefined(name) => Self::Undefined(name),
            ForwardError::Failed(err) => Self::Invalid(err),
        }
    }
}

/// Structural view of an annotation.
#[derive(Debug, Clone)]
pub enum TypeExpr {
    Any,
    Null,
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    DateTime,
    Date,
    Time,
    TimeDelta,
    Decimal,
    Uuid,
    Url { max_length: Option<u64> },
    Secret,
    List(Box<TypeExpr>),
    Set(Box<TypeExpr>),
    /// Fixed-length tuple, one type per position.
    Tuple(Vec<TypeExpr>),
    /// `tuple[T, ...]`
    Variadic(Box<TypeExpr>),
    Dict(Box<TypeExpr>, Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Literal(Vec<Value>),
    Model(Rc<ModelClass>),
    Enum(Rc<EnumClass>),
    /// `Annotated[T, ...]` in a nested position.
    Constrained(Box<TypeExpr>, Box<FieldInfo>),
    /// Valid for validation but without a JSON Schema form.
    Unsupported(String),
}

impl TypeExpr {
    /// The referenced model or enum, looking through `Optional` and
    /// annotation metadata.
    pub fn is_reference(&self) -> bool {
        match self {
            Self::Model(_) | Self::Enum(_) => true,
            Self::Constrained(inner, _) => inner.is_reference(),
            Self::Union(members) => {
                let mut non_null = members.iter().filter(|member| !matches!(member, Self::Null));
                match (non_null.next(), non_null.next()) {
                    (Some(only), None) => members.len() == 2 && only.is_reference(),
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

fn schema_generation_error(value: &Value) -> ExecError {
    ExecError::raise(
        "PydanticSchemaGenerationError",
        format!(
            "Unable to generate pydantic-core schema for {}. Set `arbitrary_types_allowed=True` in the model_config to ignore this error or implement `__get_pydantic_core_schema__` on your type to fully support it.",
            value.repr()
        ),
    )
}

fn bare_form_error(form: SpecialForm) -> ExecError {
    ExecError::user_error(format!(
        "Plain {} is not valid as type argument",
        form.qualified()
    ))
}

fn builtin(ty: BuiltinType) -> TypeExpr {
    match ty {
        BuiltinType::Str | BuiltinType::StrictStr => TypeExpr::Str,
        BuiltinType::Int | BuiltinType::StrictInt => TypeExpr::Int,
        BuiltinType::Float | BuiltinType::StrictFloat => TypeExpr::Float,
        BuiltinType::Bool | BuiltinType::StrictBool => TypeExpr::Bool,
        BuiltinType::Bytes => TypeExpr::Bytes,
        BuiltinType::List => TypeExpr::List(Box::new(TypeExpr::Any)),
        BuiltinType::Dict => TypeExpr::Dict(Box::new(TypeExpr::Any), Box::new(TypeExpr::Any)),
        BuiltinType::Set | BuiltinType::FrozenSet => TypeExpr::Set(Box::new(TypeExpr::Any)),
        BuiltinType::Tuple => TypeExpr::Variadic(Box::new(TypeExpr::Any)),
        BuiltinType::Object => TypeExpr::Any,
        BuiltinType::Type => TypeExpr::Unsupported("core_schema.IsSubclassSchema".to_string()),
        BuiltinType::NoneType => TypeExpr::Null,
        BuiltinType::DateTime => TypeExpr::DateTime,
        BuiltinType::Date => TypeExpr::Date,
        BuiltinType::Time => TypeExpr::Time,
        BuiltinType::TimeDelta => TypeExpr::TimeDelta,
        BuiltinType::Decimal => TypeExpr::Decimal,
        BuiltinType::Uuid => TypeExpr::Uuid,
        BuiltinType::HttpUrl => TypeExpr::Url {
            max_length: Some(2083),
        },
        BuiltinType::AnyUrl => TypeExpr::Url { max_length: None },
        BuiltinType::SecretStr => TypeExpr::Secret,
    }
}

/// Converts annotations declared inside one model.
pub struct TypeResolver<'a> {
    forward: &'a dyn ForwardResolver,
    owner_name: &'a str,
    owner: Option<&'a Value>,
    arbitrary_types_allowed: bool,
}

impl<'a> TypeResolver<'a> {
    pub fn new(
        forward: &'a dyn ForwardResolver,
        owner_name: &'a str,
        owner: Option<&'a Value>,
        arbitrary_types_allowed: bool,
    ) -> Self {
        Self {
            forward,
            owner_name,
            owner,
            arbitrary_types_allowed,
        }
    }

    /// Validate an annotation at class creation.
    ///
    /// Returns the annotation with its string parts resolved when any were,
    /// or `None` when it is already usable as-is.
    pub fn check(&self, annotation: &Value) -> Result<Option<Value>, ConvertError> {
        let resolved = self.resolve(annotation, 0)?;
        self.convert(resolved.as_ref().unwrap_or(annotation))?;
        Ok(resolved)
    }

    pub fn convert(&self, annotation: &Value) -> Result<TypeExpr, ConvertError> {
        self.convert_at(annotation, 0)
    }

    fn forward(&self, text: &str, depth: usize) -> Result<Value, ConvertError> {
        if depth >= MAX_FORWARD_DEPTH {
            return Err(ConvertError::Invalid(ExecError::raise(
                "RecursionError",
                format!("maximum recursion depth exceeded while resolving '{text}'"),
            )));
        }
        Ok(self
            .forward
            .resolve_forward(text, self.owner_name, self.owner)?)
    }

    /// Replace string annotations by what they name.
    fn resolve(&self, annotation: &Value, depth: usize) -> Result<Option<Value>, ConvertError> {
        match annotation {
            Value::Str(text) => {
                let value = self.forward(text, depth)?;
                Ok(Some(self.resolve(&value, depth + 1)?.unwrap_or(value)))
            }
            Value::Generic(alias) if alias.origin != SpecialForm::Literal => {
                let resolvable = match alias.origin {
                    SpecialForm::Annotated => alias.args.len().min(1),
                    _ => alias.args.len(),
                };
                let mut changed = false;
                let mut args = Vec::with_capacity(alias.args.len());
                for (index, arg) in alias.args.iter().enumerate() {
                    let resolved = if index < resolvable {
                        self.resolve(arg, depth)?
                    } else {
                        None
                    };
                    changed |= resolved.is_some();
                    args.push(resolved.unwrap_or_else(|| arg.clone()));
                }
                if !changed {
                    return Ok(None);
                }
                Ok(Some(match alias.origin {
                    SpecialForm::Union => typing::union(args, alias.builtin_spelling),
                    origin => Value::Generic(Rc::new(GenericAlias {
                        origin,
                        args,
                        builtin_spelling: alias.builtin_spelling,
                    })),
                }))
            }
            _ => Ok(None),
        }
    }

    fn arg(
        &self,
        alias: &GenericAlias,
        index: usize,
        depth: usize,
    ) -> Result<TypeExpr, ConvertError> {
        match alias.args.get(index) {
            Some(arg) => self.convert_at(arg, depth),
            None => Ok(TypeExpr::Any),
        }
    }

    fn convert_generic(
        &self,
        alias: &GenericAlias,
        depth: usize,
    ) -> Result<TypeExpr, ConvertError> {
        let expr = match alias.origin {
            SpecialForm::List | SpecialForm::Sequence | SpecialForm::Iterable => {
                TypeExpr::List(Box::new(self.arg(alias, 0, depth)?))
            }
            SpecialForm::Set | SpecialForm::FrozenSet | SpecialForm::AbstractSet => {
                TypeExpr::Set(Box::new(self.arg(alias, 0, depth)?))
            }
            SpecialForm::Dict | SpecialForm::Mapping => TypeExpr::Dict(
                Box::new(self.arg(alias, 0, depth)?),
                Box::new(self.arg(alias, 1, depth)?),
            ),
            SpecialForm::Tuple => match alias.args.as_slice() {
                [item, Value::Ellipsis] => {
                    TypeExpr::Variadic(Box::new(self.convert_at(item, depth)?))
                }
                items => TypeExpr::Tuple(
                    items
                        .iter()
                        .map(|item| self.convert_at(item, depth))
                        .collect::<Result<_, _>>()?,
                ),
            },
            SpecialForm::Union | SpecialForm::Optional => {
                let mut members = Vec::with_capacity(alias.args.len());
                for arg in &alias.args {
                    match self.convert_at(arg, depth)? {
                        TypeExpr::Union(inner) => members.extend(inner),
                        member => members.push(member),
                    }
                }
                TypeExpr::Union(members)
            }
            SpecialForm::Literal => TypeExpr::Literal(alias.args.clone()),
            SpecialForm::Annotated => {
                let (inner, info) = peel_annotated(&Value::Generic(Rc::new(alias.clone())));
                let inner = self.convert_at(&inner, depth)?;
                match info {
                    Some(info) if info.has_schema_metadata() => {
                        TypeExpr::Constrained(Box::new(inner), Box::new(info))
                    }
                    _ => inner,
                }
            }
            SpecialForm::Type => TypeExpr::Unsupported(format!(
                "core_schema.IsSubclassSchema ({})",
                alias.args.first().map(Value::repr).unwrap_or_default()
            )),
            SpecialForm::Callable => {
                TypeExpr::Unsupported("core_schema.CallableSchema".to_string())
            }
            SpecialForm::ClassVar => {
                return Err(ConvertError::Invalid(ExecError::user_error(format!(
                    "{} is not valid as type argument",
                    Value::Generic(Rc::new(alias.clone())).repr()
                ))));
            }
            SpecialForm::Any => TypeExpr::Any,
        };
        Ok(expr)
    }

    fn convert_at(&self, annotation: &Value, depth: usize) -> Result<TypeExpr, ConvertError> {
        let expr = match annotation {
            Value::None => TypeExpr::Null,
            Value::Type(ty) => builtin(*ty),
            Value::Special(form) => match form {
                SpecialForm::Any => TypeExpr::Any,
                SpecialForm::List | SpecialForm::Sequence | SpecialForm::Iterable => {
                    TypeExpr::List(Box::new(TypeExpr::Any))
                }
                SpecialForm::Dict | SpecialForm::Mapping => {
                    TypeExpr::Dict(Box::new(TypeExpr::Any), Box::new(TypeExpr::Any))
                }
                SpecialForm::Set | SpecialForm::FrozenSet | SpecialForm::AbstractSet => {
                    TypeExpr::Set(Box::new(TypeExpr::Any))
                }
                SpecialForm::Tuple => TypeExpr::Variadic(Box::new(TypeExpr::Any)),
                SpecialForm::Type => {
                    TypeExpr::Unsupported("core_schema.IsSubclassSchema".to_string())
                }
                SpecialForm::Callable => {
                    TypeExpr::Unsupported("core_schema.CallableSchema".to_string())
                }
                SpecialForm::Optional
                | SpecialForm::Union
                | SpecialForm::Literal
                | SpecialForm::Annotated
                | SpecialForm::ClassVar => {
                    return Err(ConvertError::Invalid(bare_form_error(*form)));
                }
            },
            Value::Generic(alias) => self.convert_generic(alias, depth)?,
            Value::Model(model) => TypeExpr::Model(Rc::clone(model)),
            Value::Enum(class) if class.is_root => TypeExpr::Unsupported(format!(
                "core_schema.IsInstanceSchema (<enum '{}'>)",
                class.name
            )),
            Value::Enum(class) => TypeExpr::Enum(Rc::clone(class)),
            Value::Str(text) => {
                let value = self.forward(text, depth)?;
                return self.convert_at(&value, depth + 1);
            }
            Value::Class(_) | Value::ExceptionType(_) if self.arbitrary_types_allowed => {
                TypeExpr::Unsupported(format!(
                    "core_schema.IsInstanceSchema ({})",
                    annotation.repr()
                ))
            }
            other => return Err(ConvertError::Invalid(schema_generation_error(other))),
        };
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolves a fixed set of names.
    struct Names(Vec<(&'static str, Value)>);

    impl ForwardResolver for Names {
        fn resolve_forward(
            &self,
            text: &str,
            owner_name: &str,
            owner: Option<&Value>,
        ) -> Result<Value, ForwardError> {
            if text == owner_name {
                return owner
                    .cloned()
                    .ok_or_else(|| ForwardError::Undefined(text.to_string()));
            }
            self.0
                .iter()
                .find(|(name, _)| *name == text)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| ForwardError::Undefined(text.to_string()))
        }
    }

    fn generic(origin: SpecialForm, args: Vec<Value>) -> Value {
        Value::Generic(Rc::new(GenericAlias {
            origin,
            args,
            builtin_spelling: false,
        }))
    }

    #[test]
    fn strings_resolve_inside_generics() {
        let names = Names(vec![("Alias", Value::Type(BuiltinType::Int))]);
        let resolver = TypeResolver::new(&names, "Owner", None, false);
        let annotation = generic(SpecialForm::List, vec![Value::str("Alias")]);
        let resolved = resolver.check(&annotation).unwrap().unwrap();
        let Value::Generic(alias) = resolved else {
            panic!("expected a generic");
        };
        assert!(matches!(alias.args.first(), Some(Value::Type(BuiltinType::Int))));
    }

    #[test]
    fn owner_is_undefined_while_building() {
        let names = Names(Vec::new());
        let resolver = TypeResolver::new(&names, "Node", None, false);
        let annotation = generic(SpecialForm::List, vec![Value::str("Node")]);
        assert!(matches!(
            resolver.check(&annotation),
            Err(ConvertError::Undefined(name)) if name == "Node"
        ));
    }

    #[test]
    fn literal_strings_are_values() {
        let names = Names(Vec::new());
        let resolver = TypeResolver::new(&names, "Owner", None, false);
        let annotation = generic(SpecialForm::Literal, vec![Value::str("a"), Value::str("b")]);
        assert!(resolver.check(&annotation).unwrap().is_none());
        assert!(matches!(
            resolver.convert(&annotation).unwrap(),
            TypeExpr::Literal(values) if values.len() == 2
        ));
    }

    #[test]
    fn self_referencing_strings_stop() {
        let names = Names(vec![("Loop", Value::str("Loop"))]);
        let resolver = TypeResolver::new(&names, "Owner", None, false);
        let err = resolver.convert(&Value::str("Loop")).unwrap_err();
        assert!(err.to_string().contains("maximum recursion depth"));
    }

    #[test]
    fn optional_reference_is_detected() {
        let names = Names(Vec::new());
        let resolver = TypeResolver::new(&names, "Owner", None, false);
        let annotation = generic(
            SpecialForm::Union,
            vec![Value::Type(BuiltinType::Str), Value::None],
        );
        let expr = resolver.convert(&annotation).unwrap();
        assert!(matches!(&expr, TypeExpr::Union(members) if members.len() == 2));
        assert!(!expr.is_reference());
    }

    #[test]
    fn non_types_are_rejected() {
        let names = Names(Vec::new());
        let resolver = TypeResolver::new(&names, "Owner", None, false);
        let err = resolver.convert(&Value::Int(3)).unwrap_err();
        assert!(err.to_string().starts_with("Unable to generate pydantic-core schema for 3."));
    }
}
