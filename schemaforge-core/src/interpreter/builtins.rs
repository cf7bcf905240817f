//! Callable builtins: Python builtins, pydantic helpers and module functions.

use std::cmp::Ordering;
use std::rc::Rc;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use super::classes::{DecoratorKind, DecoratorValue};
use super::fields::{ConstraintMeta, Constraints, FieldInfo, Number, length_argument};
use super::ops;
use super::text;
use super::typing;
use super::value::{
    BoundMethod, BuiltinType, ExceptionKind, ExceptionValue, Namespace, Sentinel, SpecialForm,
    Value, dedup_values, py_eq,
};
use super::{ExecError, Interpreter};

/// Arguments of a call, keywords in source order.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub fn positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(key, _)| key == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Positional argument `index`, or the keyword `name`.
    pub fn take(&mut self, index: usize, name: &str) -> Option<Value> {
        match self.positional.get(index) {
            Some(value) => Some(value.clone()),
            None => self.take_keyword(name),
        }
    }

    pub fn reject_keywords(&self, func: &str) -> Result<(), ExecError> {
        match self.keywords.first() {
            Some((key, _)) => Err(ExecError::type_error(format!(
                "{func}() got an unexpected keyword argument '{key}'"
            ))),
            None => Ok(()),
        }
    }

    pub fn expect_count(&self, func: &str, min: usize, max: usize) -> Result<(), ExecError> {
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else if given < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            let bound = if given < min { min } else { max };
            let plural = if bound == 1 { "" } else { "s" };
            return Err(ExecError::type_error(format!(
                "{func}() takes {expected} argument{plural} ({given} given)"
            )));
        }
        Ok(())
    }
}

/// annotated-types markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Gt,
    Ge,
    Lt,
    Le,
    MultipleOf,
    MinLen,
    MaxLen,
    Len,
    Interval,
}

impl ConstraintKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gt => "Gt",
            Self::Ge => "Ge",
            Self::Lt => "Lt",
            Self::Le => "Le",
            Self::MultipleOf => "MultipleOf",
            Self::MinLen => "MinLen",
            Self::MaxLen => "MaxLen",
            Self::Len => "Len",
            Self::Interval => "Interval",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Len,
    Repr,
    IsInstance,
    IsSubclass,
    Min,
    Max,
    Abs,
    Sorted,
    GetAttr,
    HasAttr,
    Callable,
    Round,
    Any,
    All,
    Range,
    ClassMethod,
    StaticMethod,
    Property,
    Field,
    ConfigDict,
    PrivateAttr,
    FieldValidator,
    ModelValidator,
    Validator,
    RootValidator,
    ComputedField,
    FieldSerializer,
    ModelSerializer,
    ConInt,
    ConFloat,
    ConStr,
    ConList,
    ConSet,
    ConBytes,
    ConDecimal,
    ToCamel,
    ToPascal,
    ToSnake,
    Constraint(ConstraintKind),
    Auto,
    Unique,
    NewType,
    Uuid4,
    Now,
    UtcNow,
    Today,
    FromIsoFormat(BuiltinType),
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Len => "len",
            Self::Repr => "repr",
            Self::IsInstance => "isinstance",
            Self::IsSubclass => "issubclass",
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Sorted => "sorted",
            Self::GetAttr => "getattr",
            Self::HasAttr => "hasattr",
            Self::Callable => "callable",
            Self::Round => "round",
            Self::Any => "any",
            Self::All => "all",
            Self::Range => "range",
            Self::ClassMethod => "classmethod",
            Self::StaticMethod => "staticmethod",
            Self::Property => "property",
            Self::Field => "Field",
            Self::ConfigDict => "ConfigDict",
            Self::PrivateAttr => "PrivateAttr",
            Self::FieldValidator => "field_validator",
            Self::ModelValidator => "model_validator",
            Self::Validator => "validator",
            Self::RootValidator => "root_validator",
            Self::ComputedField => "computed_field",
            Self::FieldSerializer => "field_serializer",
            Self::ModelSerializer => "model_serializer",
            Self::ConInt => "conint",
            Self::ConFloat => "confloat",
            Self::ConStr => "constr",
            Self::ConList => "conlist",
            Self::ConSet => "conset",
            Self::ConBytes => "conbytes",
            Self::ConDecimal => "condecimal",
            Self::ToCamel => "to_camel",
            Self::ToPascal => "to_pascal",
            Self::ToSnake => "to_snake",
            Self::Constraint(kind) => kind.name(),
            Self::Auto => "auto",
            Self::Unique => "unique",
            Self::NewType => "NewType",
            Self::Uuid4 => "uuid4",
            Self::Now => "now",
            Self::UtcNow => "utcnow",
            Self::Today => "today",
            Self::FromIsoFormat(_) => "fromisoformat",
        }
    }
}

/// Names visible in every scope without an import.
pub fn builtin_namespace() -> Namespace {
    let mut names = Namespace::new();
    for ty in [
        BuiltinType::Str,
        BuiltinType::Int,
        BuiltinType::Float,
        BuiltinType::Bool,
        BuiltinType::Bytes,
        BuiltinType::List,
        BuiltinType::Dict,
        BuiltinType::Set,
        BuiltinType::FrozenSet,
        BuiltinType::Tuple,
        BuiltinType::Object,
        BuiltinType::Type,
    ] {
        names.insert(ty.name().to_string(), Value::Type(ty));
    }
    for builtin in [
        Builtin::Print,
        Builtin::Len,
        Builtin::Repr,
        Builtin::IsInstance,
        Builtin::IsSubclass,
        Builtin::Min,
        Builtin::Max,
        Builtin::Abs,
        Builtin::Sorted,
        Builtin::GetAttr,
        Builtin::HasAttr,
        Builtin::Callable,
        Builtin::Round,
        Builtin::Any,
        Builtin::All,
        Builtin::Range,
        Builtin::ClassMethod,
        Builtin::StaticMethod,
        Builtin::Property,
    ] {
        names.insert(builtin.name().to_string(), Value::Builtin(builtin));
    }
    for kind in ExceptionKind::ALL {
        names.insert(kind.name().to_string(), Value::ExceptionType(*kind));
    }
    names.insert("Ellipsis".to_string(), Value::Ellipsis);
    names.insert("__name__".to_string(), Value::str("__main__"));
    names
}

/// Elements produced by iterating `value`.
pub fn iterate(value: &Value) -> Result<Vec<Value>, ExecError> {
    match value {
        Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
            Ok(items.to_vec())
        }
        Value::Dict(entries) => Ok(entries.iter().map(|(key, _)| key.clone()).collect()),
        Value::Str(text) => Ok(text.chars().map(|ch| Value::str(ch.to_string())).collect()),
        Value::Bytes(bytes) => Ok(bytes
            .iter()
            .map(|byte| Value::Int(i128::from(*byte)))
            .collect()),
        Value::Enum(class) => Ok(class.members.iter().cloned().map(Value::EnumMember).collect()),
        other => Err(ExecError::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// `type(value)` for the values that have a first-class type.
fn type_of(value: &Value) -> Result<Value, ExecError> {
    let ty = match value {
        Value::None => BuiltinType::NoneType,
        Value::Bool(_) => BuiltinType::Bool,
        Value::Int(_) => BuiltinType::Int,
        Value::Float(_) => BuiltinType::Float,
        Value::Str(_) => BuiltinType::Str,
        Value::Bytes(_) => BuiltinType::Bytes,
        Value::List(_) => BuiltinType::List,
        Value::Tuple(_) => BuiltinType::Tuple,
        Value::Set(_) => BuiltinType::Set,
        Value::FrozenSet(_) => BuiltinType::FrozenSet,
        Value::Dict(_) => BuiltinType::Dict,
        Value::Decimal(_) => BuiltinType::Decimal,
        Value::Uuid(_) => BuiltinType::Uuid,
        Value::Date(_) => BuiltinType::Date,
        Value::DateTime(_) => BuiltinType::DateTime,
        Value::Time(_) => BuiltinType::Time,
        Value::TimeDelta(_) => BuiltinType::TimeDelta,
        Value::Type(_) | Value::Class(_) | Value::ExceptionType(_) => BuiltinType::Type,
        Value::Instance(instance) => return Ok(Value::Model(Rc::clone(&instance.class))),
        Value::Exception(exc) => return Ok(Value::ExceptionType(exc.kind)),
        other => {
            return Err(ExecError::type_error(format!(
                "type() of '{}' values is not supported",
                other.type_name()
            )));
        }
    };
    Ok(Value::Type(ty))
}

fn is_instance(value: &Value, class: &Value) -> Result<bool, ExecError> {
    use BuiltinType as T;
    Ok(match class {
        Value::Tuple(options) => {
            for option in options.iter() {
                if is_instance(value, option)? {
                    return Ok(true);
                }
            }
            false
        }
        Value::Type(ty) => match (ty, value) {
            (T::Object, _) => true,
            (T::Int, Value::Int(_) | Value::Bool(_)) => true,
            (T::Int, Value::EnumMember(member)) => {
                matches!(member.value, Value::Int(_)) && member.mixin_value
            }
            (T::Str, Value::EnumMember(member)) => {
                matches!(member.value, Value::Str(_)) && member.mixin_value
            }
            (T::Date, Value::DateTime(_)) => true,
            (T::Type, other) => {
                other.is_type_like()
                    && !matches!(other, Value::None | Value::Special(_) | Value::Generic(_))
            }
            (ty, other) => type_of(other).is_ok_and(|found| py_eq(&found, &Value::Type(*ty))),
        },
        Value::Model(model) => match value {
            Value::Instance(instance) => instance.class.is_subclass_of(model),
            _ => false,
        },
        Value::Enum(class) => match value {
            Value::EnumMember(member) => member.owner_id == class.id || class.is_root,
            _ => false,
        },
        Value::ExceptionType(kind) => match value {
            Value::Exception(exc) => exc.kind.is_subclass_of(*kind),
            _ => false,
        },
        Value::Class(_) => false,
        Value::Special(_) | Value::Generic(_) => {
            return Err(ExecError::type_error(format!(
                "Subscripted generics cannot be used with class and instance checks: {}",
                class.repr()
            )));
        }
        other => {
            return Err(ExecError::type_error(format!(
                "isinstance() arg 2 must be a type, a tuple of types, or a union, not {}",
                other.type_name()
            )));
        }
    })
}

fn is_subclass(class: &Value, base: &Value) -> Result<bool, ExecError> {
    Ok(match (class, base) {
        (_, Value::Tuple(options)) => {
            for option in options.iter() {
                if is_subclass(class, option)? {
                    return Ok(true);
                }
            }
            false
        }
        (_, Value::Type(BuiltinType::Object)) => class.is_type_like(),
        (Value::Model(child), Value::Model(parent)) => child.is_subclass_of(parent),
        (Value::Enum(child), Value::Enum(parent)) => child.is_subclass_of(parent),
        (Value::Class(child), Value::Class(parent)) => child.is_subclass_of(parent),
        (Value::ExceptionType(child), Value::ExceptionType(parent)) => {
            child.is_subclass_of(*parent)
        }
        (Value::Type(BuiltinType::Bool), Value::Type(BuiltinType::Int)) => true,
        (Value::Type(a), Value::Type(b)) => a == b,
        (
            Value::Model(_)
            | Value::Enum(_)
            | Value::Class(_)
            | Value::ExceptionType(_)
            | Value::Type(_),
            _,
        ) => false,
        (other, _) => {
            return Err(ExecError::type_error(format!(
                "issubclass() arg 1 must be a class, not {}",
                other.repr()
            )));
        }
    })
}

fn extreme(interp: &Interpreter, mut args: CallArgs, builtin: Builtin) -> Result<Value, ExecError> {
    let default = args.take_keyword("default");
    args.reject_keywords(builtin.name())?;
    let items = match args.positional.as_slice() {
        [] => {
            return Err(ExecError::type_error(format!(
                "{} expected at least 1 argument, got 0",
                builtin.name()
            )));
        }
        [single] => iterate(single)?,
        _ => args.positional,
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return default.ok_or_else(|| {
            ExecError::value_error(format!("{}() iterable argument is empty", builtin.name()))
        });
    };
    for item in iter {
        interp.budget().tick()?;
        let ordering = ops::order(&item, &best)?;
        let replace = match builtin {
            Builtin::Min => ordering == Ordering::Less,
            _ => ordering == Ordering::Greater,
        };
        if replace {
            best = item;
        }
    }
    Ok(best)
}

fn sorted(interp: &Interpreter, mut args: CallArgs) -> Result<Value, ExecError> {
    let reverse = args.take_keyword("reverse").is_some_and(|flag| flag.is_truthy());
    if args.take_keyword("key").is_some_and(|key| !matches!(key, Value::None)) {
        return Err(ExecError::type_error(
            "sorted() with a key function is not supported",
        ));
    }
    args.reject_keywords("sorted")?;
    args.expect_count("sorted", 1, 1)?;
    let mut items = iterate(args.positional.first().unwrap_or(&Value::None))?;
    // Insertion sort keeps comparison errors observable and the sort stable.
    for index in 1..items.len() {
        let mut position = index;
        while position > 0 {
            interp.budget().tick()?;
            let (Some(left), Some(right)) = (items.get(position - 1), items.get(position)) else {
                break;
            };
            let ordering = ops::order(left, right)?;
            let out_of_place = if reverse {
                ordering == Ordering::Less
            } else {
                ordering == Ordering::Greater
            };
            if !out_of_place {
                break;
            }
            items.swap(position - 1, position);
            position -= 1;
        }
    }
    Ok(Value::list(items))
}

fn round(args: &CallArgs) -> Result<Value, ExecError> {
    args.expect_count("round", 1, 2)?;
    let digits = match args.positional.get(1) {
        None | Some(Value::None) => None,
        Some(Value::Int(digits)) => Some(*digits),
        Some(other) => {
            return Err(ExecError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            )));
        }
    };
    match (args.positional.first(), digits) {
        (Some(Value::Int(int)), _) => Ok(Value::Int(*int)),
        (Some(Value::Bool(flag)), _) => Ok(Value::Int(i128::from(*flag))),
        #[allow(clippy::cast_possible_truncation)]
        (Some(Value::Float(float)), None) if float.is_finite() => {
            Ok(Value::Int(float.round_ties_even() as i128))
        }
        (Some(Value::Float(float)), Some(digits)) => {
            let exponent = i32::try_from(digits.clamp(-308, 308)).unwrap_or(0);
            let scale = 10f64.powi(exponent);
            Ok(Value::Float((float * scale).round_ties_even() / scale))
        }
        (Some(other), _) => Err(ExecError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
        (None, _) => Err(ExecError::type_error("round() missing required argument 'number'")),
    }
}

fn range(interp: &Interpreter, args: &CallArgs) -> Result<Value, ExecError> {
    args.reject_keywords("range")?;
    args.expect_count("range", 1, 3)?;
    let mut bounds = Vec::with_capacity(3);
    for value in &args.positional {
        match value {
            Value::Int(int) => bounds.push(*int),
            Value::Bool(flag) => bounds.push(i128::from(*flag)),
            other => {
                return Err(ExecError::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    other.type_name()
                )));
            }
        }
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => (0, 0, 1),
    };
    if step == 0 {
        return Err(ExecError::value_error("range() arg 3 must not be zero"));
    }
    let span = stop.saturating_sub(start);
    let count = if (span > 0) == (step > 0) && span != 0 {
        span.unsigned_abs().div_ceil(step.unsigned_abs())
    } else {
        0
    };
    interp
        .budget()
        .check_size(usize::try_from(count).unwrap_or(usize::MAX))?;
    let mut items = Vec::new();
    let mut current = start;
    for _ in 0..count {
        items.push(Value::Int(current));
        current = current.saturating_add(step);
    }
    Ok(Value::list(items))
}

fn field_names(builtin: Builtin, args: &CallArgs) -> Result<Vec<String>, ExecError> {
    if matches!(args.positional.first(), Some(Value::Function(_) | Value::Decorator(_))) {
        let message = match builtin {
            Builtin::Validator => {
                "validators should be used with fields and keyword arguments, not bare. E.g. usage should be `@validator('<field_name>', ...)`"
                    .to_string()
            }
            other => format!(
                "`@{name}` should be used with fields and keyword arguments, not bare. E.g. usage should be `@{name}('<field_name>', ...)`",
                name = other.name()
            ),
        };
        return Err(ExecError::user_error(message));
    }
    if args.positional.is_empty() {
        return Err(ExecError::type_error(format!(
            "{}() missing 1 required positional argument: 'field'",
            builtin.name()
        )));
    }
    let mut names = Vec::with_capacity(args.positional.len());
    for value in &args.positional {
        match value {
            Value::Str(name) => names.push(name.to_string()),
            Value::List(items) | Value::Tuple(items) => {
                for item in items.iter() {
                    match item {
                        Value::Str(name) => names.push(name.to_string()),
                        _ => return Err(non_string_field(builtin)),
                    }
                }
            }
            _ => return Err(non_string_field(builtin)),
        }
    }
    Ok(names)
}

fn non_string_field(builtin: Builtin) -> ExecError {
    ExecError::user_error(format!(
        "`@{}` fields should be passed as separate string args. E.g. usage should be `@validator('<field_name_1>', '<field_name_2>', ...)`",
        builtin.name()
    ))
}

fn check_fields_flag(args: &mut CallArgs) -> Option<bool> {
    args.take_keyword("check_fields")
        .filter(|value| !matches!(value, Value::None))
        .map(|value| value.is_truthy())
}

fn decorator_factory(kind: DecoratorKind) -> Value {
    Value::Decorator(Rc::new(DecoratorValue::factory(kind)))
}

fn decorator_applied(kind: DecoratorKind, target: Value) -> Value {
    Value::Decorator(Rc::new(DecoratorValue::applied(kind, target)))
}

fn annotated(inner: Value, name: &'static str, constraints: Constraints) -> Value {
    if constraints.is_empty() {
        return inner;
    }
    Value::Generic(Rc::new(super::value::GenericAlias {
        origin: SpecialForm::Annotated,
        args: vec![
            inner,
            Value::Constraint(Rc::new(ConstraintMeta::new(name, constraints))),
        ],
        builtin_spelling: false,
    }))
}

fn constrained(builtin: Builtin, mut args: CallArgs) -> Result<Value, ExecError> {
    let name = builtin.name();
    let inner = match builtin {
        Builtin::ConInt => Value::Type(BuiltinType::Int),
        Builtin::ConFloat => Value::Type(BuiltinType::Float),
        Builtin::ConStr => Value::Type(BuiltinType::Str),
        Builtin::ConBytes => Value::Type(BuiltinType::Bytes),
        Builtin::ConDecimal => Value::Type(BuiltinType::Decimal),
        Builtin::ConList | Builtin::ConSet => {
            let item = args
                .take(0, "item_type")
                .ok_or_else(|| {
                    ExecError::type_error(format!(
                        "{name}() missing 1 required positional argument: 'item_type'"
                    ))
                })?;
            if !args.positional.is_empty() {
                args.positional.remove(0);
            }
            let origin = if builtin == Builtin::ConList {
                SpecialForm::List
            } else {
                SpecialForm::Set
            };
            typing::parameterize(origin, &item, false)?
        }
        _ => Value::Type(BuiltinType::Object),
    };
    if !args.positional.is_empty() {
        return Err(ExecError::type_error(format!(
            "{name}() takes 0 positional arguments but {} were given",
            args.positional.len()
        )));
    }
    if args.take_keyword("unique_items").is_some_and(|value| value.is_truthy()) {
        return Err(ExecError::user_error(
            "`unique_items` is removed, use `Set` instead(this feature is discussed in https://github.com/pydantic/pydantic-core/issues/296)",
        ));
    }
    for ignored in [
        "strict",
        "strip_whitespace",
        "to_upper",
        "to_lower",
        "allow_inf_nan",
        "max_digits",
        "decimal_places",
    ] {
        if let Some(value) = args.take_keyword(ignored)
            && matches!(ignored, "max_digits" | "decimal_places")
            && !matches!(value, Value::None)
        {
            tracing::debug!(
                keyword = ignored,
                value = %value.repr(),
                "decimal precision is validated at runtime only; not reflected in the schema"
            );
        }
    }
    let constraints = Constraints::take_from(&mut args, name)?;
    args.reject_keywords(name)?;
    Ok(annotated(inner, "Interval", constraints))
}

fn constraint_marker(kind: ConstraintKind, mut args: CallArgs) -> Result<Value, ExecError> {
    let name = kind.name();
    let mut constraints = Constraints::default();
    let number = |value: Option<Value>, keyword: &str| -> Result<Option<Number>, ExecError> {
        match value {
            None | Some(Value::None) => Ok(None),
            Some(value) => Number::from_value(&value).map(Some).ok_or_else(|| {
                ExecError::type_error(format!(
                    "{name}() argument '{keyword}' must be a number, not '{}'",
                    value.type_name()
                ))
            }),
        }
    };
    match kind {
        ConstraintKind::Gt => constraints.gt = number(args.take(0, "gt"), "gt")?,
        ConstraintKind::Ge => constraints.ge = number(args.take(0, "ge"), "ge")?,
        ConstraintKind::Lt => constraints.lt = number(args.take(0, "lt"), "lt")?,
        ConstraintKind::Le => constraints.le = number(args.take(0, "le"), "le")?,
        ConstraintKind::MultipleOf => {
            constraints.multiple_of = number(args.take(0, "multiple_of"), "multiple_of")?;
        }
        ConstraintKind::MinLen => {
            let value = args.take(0, "min_length").unwrap_or(Value::Int(0));
            constraints.min_length = Some(length_argument(name, "min_length", &value)?);
        }
        ConstraintKind::MaxLen => {
            let value = args.take(0, "max_length").ok_or_else(|| {
                ExecError::type_error(format!(
                    "{name}() missing 1 required positional argument: 'max_length'"
                ))
            })?;
            constraints.max_length = Some(length_argument(name, "max_length", &value)?);
        }
        ConstraintKind::Len => {
            let min = args.take(0, "min_length").unwrap_or(Value::Int(0));
            constraints.min_length = Some(length_argument(name, "min_length", &min)?);
            if let Some(max) = args.take(1, "max_length").filter(|v| !matches!(v, Value::None)) {
                constraints.max_length = Some(length_argument(name, "max_length", &max)?);
            }
        }
        ConstraintKind::Interval => {
            constraints.gt = number(args.take(0, "gt"), "gt")?;
            constraints.ge = number(args.take(1, "ge"), "ge")?;
            constraints.lt = number(args.take(2, "lt"), "lt")?;
            constraints.le = number(args.take(3, "le"), "le")?;
        }
    }
    Ok(Value::Constraint(Rc::new(ConstraintMeta::new(name, constraints))))
}

fn string_argument(func: &str, args: &CallArgs) -> Result<String, ExecError> {
    args.reject_keywords(func)?;
    args.expect_count(func, 1, 1)?;
    match args.positional.first() {
        Some(Value::Str(text)) => Ok(text.to_string()),
        Some(other) => Err(ExecError::type_error(format!(
            "{func}() argument must be str, not '{}'",
            other.type_name()
        ))),
        None => Err(ExecError::type_error(format!("{func}() missing 1 required argument"))),
    }
}

pub(crate) fn parse_iso(ty: BuiltinType, text: &str) -> Result<Value, ExecError> {
    let invalid = || ExecError::value_error(format!("Invalid isoformat string: '{text}'"));
    match ty {
        BuiltinType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| invalid()),
        BuiltinType::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .map(Value::Time)
            .map_err(|_| invalid()),
        _ => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
            .or_else(|_| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(|date| date.and_time(NaiveTime::MIN))
            })
            .map(Value::DateTime)
            .map_err(|_| invalid()),
    }
}

pub(crate) fn call_builtin(
    interp: &Interpreter,
    builtin: Builtin,
    mut args: CallArgs,
) -> Result<Value, ExecError> {
    match builtin {
        Builtin::Print => {
            let sep = args
                .take_keyword("sep")
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_else(|| " ".to_string());
            let _ = args.take_keyword("end");
            let _ = args.take_keyword("flush");
            let line = args
                .positional
                .iter()
                .map(Value::to_str)
                .collect::<Vec<_>>()
                .join(&sep);
            tracing::debug!(target: "schemaforge::print", "{line}");
            Ok(Value::None)
        }
        Builtin::Len => {
            args.reject_keywords("len")?;
            args.expect_count("len", 1, 1)?;
            let len = match args.positional.first().unwrap_or(&Value::None) {
                Value::Str(text) => text.chars().count(),
                Value::Bytes(bytes) => bytes.len(),
                Value::List(items)
                | Value::Tuple(items)
                | Value::Set(items)
                | Value::FrozenSet(items) => items.len(),
                Value::Dict(entries) => entries.len(),
                Value::Enum(class) => class.members.len(),
                other => {
                    return Err(ExecError::type_error(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::Int(i128::try_from(len).unwrap_or(i128::MAX)))
        }
        Builtin::Repr => {
            args.expect_count("repr", 1, 1)?;
            Ok(Value::str(args.positional.first().map(Value::repr).unwrap_or_default()))
        }
        Builtin::IsInstance => {
            args.expect_count("isinstance", 2, 2)?;
            let (Some(value), Some(class)) = (args.positional.first(), args.positional.get(1))
            else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(is_instance(value, class)?))
        }
        Builtin::IsSubclass => {
            args.expect_count("issubclass", 2, 2)?;
            let (Some(class), Some(base)) = (args.positional.first(), args.positional.get(1)) else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(is_subclass(class, base)?))
        }
        Builtin::Min | Builtin::Max => extreme(interp, args, builtin),
        Builtin::Abs => {
            args.expect_count("abs", 1, 1)?;
            match args.positional.first().unwrap_or(&Value::None) {
                Value::Int(int) => int
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| ExecError::raise("OverflowError", "integer overflow")),
                Value::Bool(flag) => Ok(Value::Int(i128::from(*flag))),
                Value::Float(float) => Ok(Value::Float(float.abs())),
                other => Err(ExecError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Sorted => sorted(interp, args),
        Builtin::GetAttr | Builtin::HasAttr => {
            let (min, max) = if builtin == Builtin::GetAttr { (2, 3) } else { (2, 2) };
            args.expect_count(builtin.name(), min, max)?;
            let object = args.positional.first().cloned().unwrap_or(Value::None);
            let Some(Value::Str(name)) = args.positional.get(1) else {
                return Err(ExecError::type_error("attribute name must be string"));
            };
            match interp.get_attr(&object, name) {
                Ok(value) if builtin == Builtin::GetAttr => Ok(value),
                Ok(_) => Ok(Value::Bool(true)),
                Err(err) if err.is_class("AttributeError") => {
                    match (builtin, args.positional.get(2)) {
                        (Builtin::HasAttr, _) => Ok(Value::Bool(false)),
                        (_, Some(default)) => Ok(default.clone()),
                        _ => Err(err),
                    }
                }
                Err(err) => Err(err),
            }
        }
        Builtin::Callable => {
            args.expect_count("callable", 1, 1)?;
            let callable = matches!(
                args.positional.first(),
                Some(
                    Value::Builtin(_)
                        | Value::BoundMethod(_)
                        | Value::Function(_)
                        | Value::Type(_)
                        | Value::Model(_)
                        | Value::Enum(_)
                        | Value::Class(_)
                        | Value::ExceptionType(_)
                )
            );
            Ok(Value::Bool(callable))
        }
        Builtin::Round => round(&args),
        Builtin::Any | Builtin::All => {
            args.expect_count(builtin.name(), 1, 1)?;
            let items = iterate(args.positional.first().unwrap_or(&Value::None))?;
            let result = if builtin == Builtin::Any {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        Builtin::Range => range(interp, &args),
        Builtin::ClassMethod | Builtin::StaticMethod | Builtin::Property => {
            args.reject_keywords(builtin.name())?;
            args.expect_count(builtin.name(), 1, 1)?;
            let kind = match builtin {
                Builtin::ClassMethod => DecoratorKind::ClassMethod,
                Builtin::StaticMethod => DecoratorKind::StaticMethod,
                _ => DecoratorKind::Property,
            };
            let target = args.positional.pop().unwrap_or(Value::None);
            Ok(decorator_applied(kind, target))
        }
        Builtin::Field => Ok(FieldInfo::from_call(args)?.into()),
        Builtin::ConfigDict => {
            if !args.positional.is_empty() {
                return Err(ExecError::type_error(format!(
                    "ConfigDict() takes 0 positional arguments but {} were given",
                    args.positional.len()
                )));
            }
            Ok(Value::dict(
                args.keywords
                    .into_iter()
                    .map(|(key, value)| (Value::str(key), value))
                    .collect(),
            ))
        }
        Builtin::PrivateAttr => Ok(Value::Sentinel(Sentinel::PrivateAttr)),
        Builtin::FieldValidator | Builtin::Validator | Builtin::FieldSerializer => {
            let check_fields = check_fields_flag(&mut args);
            let fields = field_names(builtin, &args)?;
            let kind = match builtin {
                Builtin::FieldValidator => DecoratorKind::FieldValidator {
                    fields,
                    check_fields,
                },
                Builtin::Validator => {
                    tracing::warn!(
                        "Pydantic V1 style `@validator` validators are deprecated. You should migrate to Pydantic V2 style `@field_validator` validators"
                    );
                    DecoratorKind::Validator {
                        fields,
                        check_fields,
                    }
                }
                _ => DecoratorKind::FieldSerializer {
                    fields,
                    check_fields,
                },
            };
            Ok(decorator_factory(kind))
        }
        Builtin::ModelValidator => {
            if !args.positional.is_empty() {
                return Err(ExecError::type_error(format!(
                    "model_validator() takes 0 positional arguments but {} were given",
                    args.positional.len()
                )));
            }
            if args.take_keyword("mode").is_none() {
                return Err(ExecError::type_error(
                    "model_validator() missing 1 required keyword-only argument: 'mode'",
                ));
            }
            Ok(decorator_factory(DecoratorKind::ModelValidator))
        }
        Builtin::RootValidator => {
            if let Some(target) = args.positional.pop() {
                return Err(ExecError::user_error(format!(
                    "If you use `@root_validator` with pre=False (the default) you MUST specify `skip_on_failure=True`. Note that `@root_validator` is deprecated and should be replaced with `@model_validator`. (got {})",
                    target.repr()
                )));
            }
            let pre = args.take_keyword("pre").is_some_and(|flag| flag.is_truthy());
            let skip = args
                .take_keyword("skip_on_failure")
                .is_some_and(|flag| flag.is_truthy());
            if !pre && !skip {
                return Err(ExecError::user_error(
                    "If you use `@root_validator` with pre=False (the default) you MUST specify `skip_on_failure=True`. Note that `@root_validator` is deprecated and should be replaced with `@model_validator`.",
                ));
            }
            Ok(decorator_factory(DecoratorKind::RootValidator))
        }
        Builtin::ComputedField | Builtin::ModelSerializer => {
            let kind = if builtin == Builtin::ComputedField {
                DecoratorKind::ComputedField
            } else {
                DecoratorKind::ModelSerializer
            };
            match args.positional.pop() {
                Some(target) => Ok(decorator_applied(kind, target)),
                None => Ok(decorator_factory(kind)),
            }
        }
        Builtin::ConInt
        | Builtin::ConFloat
        | Builtin::ConStr
        | Builtin::ConList
        | Builtin::ConSet
        | Builtin::ConBytes
        | Builtin::ConDecimal => constrained(builtin, args),
        Builtin::ToCamel => Ok(Value::str(text::to_camel(&string_argument("to_camel", &args)?))),
        Builtin::ToPascal => Ok(Value::str(text::to_pascal(&string_argument("to_pascal", &args)?))),
        Builtin::ToSnake => Ok(Value::str(text::to_snake(&string_argument("to_snake", &args)?))),
        Builtin::Constraint(kind) => constraint_marker(kind, args),
        Builtin::Auto => {
            args.expect_count("auto", 0, 0)?;
            Ok(Value::Sentinel(Sentinel::Auto))
        }
        Builtin::Unique => {
            args.expect_count("unique", 1, 1)?;
            Ok(args.positional.pop().unwrap_or(Value::None))
        }
        Builtin::NewType => {
            args.expect_count("NewType", 2, 2)?;
            Ok(args.positional.pop().unwrap_or(Value::None))
        }
        Builtin::Uuid4 => {
            args.expect_count("uuid4", 0, 0)?;
            Ok(Value::Uuid(uuid::Uuid::new_v4()))
        }
        Builtin::Now => Ok(Value::DateTime(Local::now().naive_local())),
        Builtin::UtcNow => Ok(Value::DateTime(Utc::now().naive_utc())),
        Builtin::Today => Ok(Value::Date(Local::now().date_naive())),
        Builtin::FromIsoFormat(ty) => {
            let text = string_argument("fromisoformat", &args)?;
            parse_iso(ty, &text)
        }
    }
}

fn int_argument(func: &str, value: Option<&Value>, default: i128) -> Result<i128, ExecError> {
    match value {
        None => Ok(default),
        Some(Value::Int(int)) => Ok(*int),
        Some(Value::Bool(flag)) => Ok(i128::from(*flag)),
        Some(other) => Err(ExecError::type_error(format!(
            "{func}() argument must be int, not '{}'",
            other.type_name()
        ))),
    }
}

fn u32_component(func: &str, value: Option<&Value>, default: i128) -> Result<u32, ExecError> {
    let int = int_argument(func, value, default)?;
    u32::try_from(int)
        .map_err(|_| ExecError::value_error(format!("{func}() component out of range: {int}")))
}

fn float_argument(func: &str, value: &Value) -> Result<f64, ExecError> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Int(int) => Ok(*int as f64),
        Value::Bool(flag) => Ok(f64::from(u8::from(*flag))),
        Value::Float(float) => Ok(*float),
        other => Err(ExecError::type_error(format!(
            "unsupported type for {func} component: {}",
            other.type_name()
        ))),
    }
}

fn is_decimal_literal(text: &str) -> bool {
    let text = text.trim();
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if matches!(
        unsigned.to_ascii_lowercase().as_str(),
        "nan" | "snan" | "inf" | "infinity"
    ) {
        return true;
    }
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };
    let mut digits = 0;
    let mut dots = 0;
    for ch in mantissa.chars() {
        match ch {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            '_' => {}
            _ => return false,
        }
    }
    let exponent_ok = exponent.is_none_or(|exp| {
        let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        !exp.is_empty() && exp.chars().all(|ch| ch.is_ascii_digit())
    });
    digits > 0 && dots <= 1 && exponent_ok
}

fn timedelta(args: &mut CallArgs) -> Result<Value, ExecError> {
    const UNITS: [(&str, f64); 7] = [
        ("days", 86_400_000_000.0),
        ("seconds", 1_000_000.0),
        ("microseconds", 1.0),
        ("milliseconds", 1_000.0),
        ("minutes", 60_000_000.0),
        ("hours", 3_600_000_000.0),
        ("weeks", 604_800_000_000.0),
    ];
    if args.positional.len() > UNITS.len() {
        return Err(ExecError::type_error(format!(
            "timedelta() takes at most 7 arguments ({} given)",
            args.positional.len()
        )));
    }
    let mut micros = 0f64;
    for (index, (unit, scale)) in UNITS.iter().enumerate() {
        if let Some(value) = args.take(index, unit) {
            micros += float_argument("timedelta", &value)? * scale;
        }
    }
    args.reject_keywords("timedelta")?;
    if !micros.is_finite() || micros.abs() > 9.0e18 {
        return Err(ExecError::raise("OverflowError", "timedelta value out of range"));
    }
    #[allow(clippy::cast_possible_truncation)]
    let micros = micros.round_ties_even() as i64;
    Ok(Value::TimeDelta(TimeDelta::microseconds(micros)))
}

/// Calling a builtin type, e.g. `int("3")` or `datetime(2024, 1, 1)`.
pub(crate) fn construct(
    interp: &Interpreter,
    ty: BuiltinType,
    mut args: CallArgs,
) -> Result<Value, ExecError> {
    use BuiltinType as T;
    let name = ty.name();
    match ty {
        T::Str | T::StrictStr | T::SecretStr | T::HttpUrl | T::AnyUrl => {
            args.reject_keywords(name)?;
            args.expect_count(name, 0, 1)?;
            Ok(Value::str(
                args.positional.first().map(Value::to_str).unwrap_or_default(),
            ))
        }
        T::Int | T::StrictInt => {
            args.reject_keywords(name)?;
            args.expect_count(name, 0, 1)?;
            match args.positional.first() {
                None => Ok(Value::Int(0)),
                Some(Value::Int(int)) => Ok(Value::Int(*int)),
                Some(Value::Bool(flag)) => Ok(Value::Int(i128::from(*flag))),
                Some(Value::Float(float)) if float.is_nan() => Err(ExecError::value_error(
                    "cannot convert float NaN to integer",
                )),
                Some(Value::Float(float)) if float.is_infinite() => Err(ExecError::raise(
                    "OverflowError",
                    "cannot convert float infinity to integer",
                )),
                #[allow(clippy::cast_possible_truncation)]
                Some(Value::Float(float)) => Ok(Value::Int(float.trunc() as i128)),
                Some(Value::Str(text)) => text
                    .trim()
                    .replace('_', "")
                    .parse::<i128>()
                    .map(Value::Int)
                    .map_err(|_| {
                        ExecError::value_error(format!(
                            "invalid literal for int() with base 10: {}",
                            super::value::str_repr(text)
                        ))
                    }),
                #[allow(clippy::cast_possible_truncation)]
                Some(Value::Decimal(text)) => text
                    .parse::<f64>()
                    .map(|float| Value::Int(float.trunc() as i128))
                    .map_err(|_| ExecError::value_error("cannot convert Decimal to integer")),
                Some(Value::EnumMember(member)) if member.mixin_value => {
                    construct(interp, ty, CallArgs::positional(vec![member.value.clone()]))
                }
                Some(other) => Err(ExecError::type_error(format!(
                    "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                    other.type_name()
                ))),
            }
        }
        T::Float | T::StrictFloat => {
            args.reject_keywords(name)?;
            args.expect_count(name, 0, 1)?;
            match args.positional.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(text)) => {
                    let trimmed = text.trim().to_ascii_lowercase();
                    let parsed = match trimmed.as_str() {
                        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
                        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                        "nan" | "+nan" | "-nan" => Some(f64::NAN),
                        other => other.replace('_', "").parse::<f64>().ok(),
                    };
                    parsed.map(Value::Float).ok_or_else(|| {
                        ExecError::value_error(format!(
                            "could not convert string to float: {}",
                            super::value::str_repr(text)
                        ))
                    })
                }
                Some(Value::Decimal(text)) => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| ExecError::value_error("could not convert Decimal to float")),
                Some(other) => float_argument("float", other).map(Value::Float),
            }
        }
        T::Bool | T::StrictBool => {
            args.expect_count(name, 0, 1)?;
            Ok(Value::Bool(args.positional.first().is_some_and(Value::is_truthy)))
        }
        T::Bytes => {
            let _ = args.take_keyword("encoding");
            args.reject_keywords(name)?;
            match args.positional.first() {
                None => Ok(Value::Bytes(Rc::from(Vec::new()))),
                Some(Value::Str(text)) => Ok(Value::Bytes(Rc::from(text.as_bytes()))),
                Some(Value::Bytes(bytes)) => Ok(Value::Bytes(Rc::clone(bytes))),
                Some(other) => {
                    let mut bytes = Vec::new();
                    for item in iterate(other)? {
                        match item {
                            Value::Int(int) => bytes.push(u8::try_from(int).map_err(|_| {
                                ExecError::value_error("bytes must be in range(0, 256)")
                            })?),
                            other => {
                                return Err(ExecError::type_error(format!(
                                    "'{}' object cannot be interpreted as an integer",
                                    other.type_name()
                                )));
                            }
                        }
                    }
                    Ok(Value::Bytes(Rc::from(bytes)))
                }
            }
        }
        T::List | T::Tuple | T::Set | T::FrozenSet => {
            args.reject_keywords(name)?;
            args.expect_count(name, 0, 1)?;
            let items = match args.positional.first() {
                Some(value) => iterate(value)?,
                None => Vec::new(),
            };
            Ok(match ty {
                T::List => Value::list(items),
                T::Tuple => Value::tuple(items),
                T::Set => Value::Set(Rc::new(dedup_values(items))),
                _ => Value::FrozenSet(Rc::new(dedup_values(items))),
            })
        }
        T::Dict => {
            args.expect_count(name, 0, 1)?;
            let mut entries: Vec<(Value, Value)> = match args.positional.first() {
                None => Vec::new(),
                Some(Value::Dict(entries)) => entries.to_vec(),
                Some(other) => {
                    let mut entries = Vec::new();
                    for pair in iterate(other)? {
                        let items = iterate(&pair)?;
                        let [key, value] = <[Value; 2]>::try_from(items).map_err(|items| {
                            ExecError::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                items.len()
                            ))
                        })?;
                        entries.push((key, value));
                    }
                    entries
                }
            };
            for (key, value) in args.keywords {
                ops::dict_insert(&mut entries, Value::str(key), value)?;
            }
            Ok(Value::dict(ops::dedup_entries(entries)?))
        }
        T::Type => {
            args.expect_count(name, 1, 1)?;
            type_of(args.positional.first().unwrap_or(&Value::None))
        }
        T::NoneType => Ok(Value::None),
        T::Object => Err(ExecError::type_error("object() instances are not supported")),
        T::DateTime => {
            let year = args.take(0, "year");
            let month = args.take(1, "month");
            let day = args.take(2, "day");
            let (Some(year), Some(month), Some(day)) = (year, month, day) else {
                return Err(ExecError::type_error(
                    "datetime() missing required argument 'year', 'month' or 'day'",
                ));
            };
            let hour = args.take(3, "hour");
            let minute = args.take(4, "minute");
            let second = args.take(5, "second");
            let micro = args.take(6, "microsecond");
            let _ = args.take_keyword("tzinfo");
            args.reject_keywords("datetime")?;
            let date = make_date(&year, &month, &day)?;
            let time = make_time(hour.as_ref(), minute.as_ref(), second.as_ref(), micro.as_ref())?;
            Ok(Value::DateTime(date.and_time(time)))
        }
        T::Date => {
            let year = args.take(0, "year");
            let month = args.take(1, "month");
            let day = args.take(2, "day");
            args.reject_keywords("date")?;
            let (Some(year), Some(month), Some(day)) = (year, month, day) else {
                return Err(ExecError::type_error(
                    "date() missing required argument 'year', 'month' or 'day'",
                ));
            };
            Ok(Value::Date(make_date(&year, &month, &day)?))
        }
        T::Time => {
            let hour = args.take(0, "hour");
            let minute = args.take(1, "minute");
            let second = args.take(2, "second");
            let micro = args.take(3, "microsecond");
            let _ = args.take_keyword("tzinfo");
            args.reject_keywords("time")?;
            Ok(Value::Time(make_time(
                hour.as_ref(),
                minute.as_ref(),
                second.as_ref(),
                micro.as_ref(),
            )?))
        }
        T::TimeDelta => timedelta(&mut args),
        T::Decimal => {
            args.reject_keywords(name)?;
            args.expect_count(name, 0, 1)?;
            match args.positional.first() {
                None => Ok(Value::Decimal(Rc::from("0"))),
                Some(Value::Str(text)) if is_decimal_literal(text) => {
                    Ok(Value::Decimal(Rc::from(text.trim().replace('_', ""))))
                }
                Some(Value::Str(text)) => Err(ExecError::raise(
                    "InvalidOperation",
                    format!(
                        "[<class 'decimal.ConversionSyntax'>] {}",
                        super::value::str_repr(text)
                    ),
                )),
                Some(Value::Int(int)) => Ok(Value::Decimal(Rc::from(int.to_string()))),
                Some(Value::Bool(flag)) => {
                    Ok(Value::Decimal(Rc::from(u8::from(*flag).to_string())))
                }
                Some(Value::Float(float)) => {
                    Ok(Value::Decimal(Rc::from(super::value::float_repr(*float))))
                }
                Some(Value::Decimal(text)) => Ok(Value::Decimal(Rc::clone(text))),
                Some(other) => Err(ExecError::type_error(format!(
                    "conversion from {} to Decimal is not supported",
                    other.type_name()
                ))),
            }
        }
        T::Uuid => {
            let text = args.take(0, "hex");
            args.reject_keywords(name)?;
            match text {
                Some(Value::Str(text)) => uuid::Uuid::parse_str(text.trim())
                    .map(Value::Uuid)
                    .map_err(|_| ExecError::value_error("badly formed hexadecimal UUID string")),
                Some(other) => Err(ExecError::type_error(format!(
                    "UUID() argument must be str, not '{}'",
                    other.type_name()
                ))),
                None => Err(ExecError::type_error(
                    "one of the hex, bytes, bytes_le, fields, or int arguments must be given",
                )),
            }
        }
    }
}

fn make_date(year: &Value, month: &Value, day: &Value) -> Result<NaiveDate, ExecError> {
    let year = i32::try_from(int_argument("date", Some(year), 1)?)
        .map_err(|_| ExecError::value_error("year is out of range"))?;
    let month = u32_component("date", Some(month), 1)?;
    let day = u32_component("date", Some(day), 1)?;
    if !(1..=12).contains(&month) {
        return Err(ExecError::value_error("month must be in 1..12"));
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ExecError::value_error("day is out of range for month"))
}

fn make_time(
    hour: Option<&Value>,
    minute: Option<&Value>,
    second: Option<&Value>,
    micro: Option<&Value>,
) -> Result<NaiveTime, ExecError> {
    let hour = u32_component("time", hour, 0)?;
    let minute = u32_component("time", minute, 0)?;
    let second = u32_component("time", second, 0)?;
    let micro = u32_component("time", micro, 0)?;
    if hour > 23 {
        return Err(ExecError::value_error("hour must be in 0..23"));
    }
    if minute > 59 {
        return Err(ExecError::value_error("minute must be in 0..59"));
    }
    if second > 59 {
        return Err(ExecError::value_error("second must be in 0..59"));
    }
    if micro > 999_999 {
        return Err(ExecError::value_error("microsecond must be in 0..999999"));
    }
    NaiveTime::from_hms_micro_opt(hour, minute, second, micro)
        .ok_or_else(|| ExecError::value_error("time is out of range"))
}

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "title",
    "capitalize",
    "replace",
    "startswith",
    "endswith",
    "split",
    "join",
    "format",
    "isdigit",
    "isalpha",
    "isidentifier",
];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "copy"];
const LIST_METHODS: &[&str] = &["copy", "count", "index"];

/// Bind a method on a plain value, if the value has one by that name.
pub(crate) fn method(receiver: &Value, name: &str) -> Option<Value> {
    let known = match receiver {
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::Dict(_) => DICT_METHODS.contains(&name),
        Value::List(_) | Value::Tuple(_) => {
            LIST_METHODS.contains(&name) && (name != "copy" || matches!(receiver, Value::List(_)))
        }
        Value::Date(_) | Value::DateTime(_) | Value::Time(_) => name == "isoformat",
        Value::TimeDelta(_) => name == "total_seconds",
        Value::Model(_) => matches!(name, "model_json_schema" | "model_rebuild"),
        Value::Instance(_) => name == "model_dump",
        _ => false,
    };
    known.then(|| {
        Value::BoundMethod(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            name: name.to_string(),
        }))
    })
}

fn strip_chars(args: &CallArgs, func: &str) -> Result<Option<Vec<char>>, ExecError> {
    args.expect_count(func, 0, 1)?;
    match args.positional.first() {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(chars)) => Ok(Some(chars.chars().collect())),
        Some(other) => Err(ExecError::type_error(format!(
            "{func} arg must be None or str, not {}",
            other.type_name()
        ))),
    }
}

fn affix_matches(
    args: &CallArgs,
    func: &str,
    test: impl Fn(&str) -> bool,
) -> Result<Value, ExecError> {
    args.expect_count(func, 1, 1)?;
    match args.positional.first() {
        Some(Value::Str(affix)) => Ok(Value::Bool(test(&**affix))),
        Some(Value::Tuple(options)) => {
            for option in options.iter() {
                match option {
                    Value::Str(affix) if test(&**affix) => return Ok(Value::Bool(true)),
                    Value::Str(_) => {}
                    other => {
                        return Err(ExecError::type_error(format!(
                            "tuple for {func} must only contain str, not {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::Bool(false))
        }
        Some(other) => Err(ExecError::type_error(format!(
            "{func} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
        None => Ok(Value::Bool(false)),
    }
}

fn str_method(
    interp: &Interpreter,
    text: &str,
    name: &str,
    args: CallArgs,
) -> Result<Value, ExecError> {
    if name != "format" {
        args.reject_keywords(name)?;
    }
    let result = match name {
        "upper" => Value::str(text.to_uppercase()),
        "lower" => Value::str(text.to_lowercase()),
        "title" => Value::str(text::py_title(text)),
        "capitalize" => Value::str(text::py_capitalize(text)),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&args, name)?;
            let matcher = |ch: char| match &chars {
                Some(set) => set.contains(&ch),
                None => ch.is_whitespace(),
            };
            Value::str(match name {
                "strip" => text.trim_matches(matcher),
                "lstrip" => text.trim_start_matches(matcher),
                _ => text.trim_end_matches(matcher),
            })
        }
        "replace" => {
            args.expect_count("replace", 2, 2)?;
            let (Some(Value::Str(old)), Some(Value::Str(new))) =
                (args.positional.first(), args.positional.get(1))
            else {
                return Err(ExecError::type_error("replace() arguments must be str"));
            };
            let replaced = text.replace(&**old, new);
            interp.budget().check_size(replaced.len())?;
            Value::str(replaced)
        }
        "startswith" => affix_matches(&args, "startswith", |affix| text.starts_with(affix))?,
        "endswith" => affix_matches(&args, "endswith", |affix| text.ends_with(affix))?,
        "split" => {
            args.expect_count("split", 0, 2)?;
            let parts: Vec<Value> = match args.positional.first() {
                None | Some(Value::None) => text.split_whitespace().map(Value::str).collect(),
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(ExecError::value_error("empty separator"));
                }
                Some(Value::Str(sep)) => text.split(&**sep).map(Value::str).collect(),
                Some(other) => {
                    return Err(ExecError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Value::list(parts)
        }
        "join" => {
            args.expect_count("join", 1, 1)?;
            let items = iterate(args.positional.first().unwrap_or(&Value::None))?;
            let mut pieces = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Str(piece) => pieces.push(piece.to_string()),
                    other => {
                        return Err(ExecError::type_error(format!(
                            "sequence item {index}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            let joined = pieces.join(text);
            interp.budget().check_size(joined.len())?;
            Value::str(joined)
        }
        "format" => Value::str(text::format_str(text, &args.positional, &args.keywords)?),
        "isdigit" => Value::Bool(!text.is_empty() && text.chars().all(|ch| ch.is_ascii_digit())),
        "isalpha" => Value::Bool(!text.is_empty() && text.chars().all(char::is_alphabetic)),
        "isidentifier" => Value::Bool(schemaforge_config::sandbox::is_identifier(text)),
        other => {
            return Err(ExecError::attribute_error(format!(
                "'str' object has no attribute '{other}'"
            )));
        }
    };
    Ok(result)
}

pub(crate) fn call_method(
    interp: &Interpreter,
    method: &BoundMethod,
    mut args: CallArgs,
) -> Result<Value, ExecError> {
    let name = method.name.as_str();
    match &method.receiver {
        Value::Str(text) => str_method(interp, text, name, args),
        Value::Dict(entries) => {
            args.reject_keywords(name)?;
            match name {
                "get" => {
                    args.expect_count("get", 1, 2)?;
                    let key = args.positional.first().unwrap_or(&Value::None);
                    Ok(entries
                        .iter()
                        .find(|(candidate, _)| py_eq(candidate, key))
                        .map(|(_, value)| value.clone())
                        .or_else(|| args.positional.get(1).cloned())
                        .unwrap_or(Value::None))
                }
                "keys" => Ok(Value::list(entries.iter().map(|(key, _)| key.clone()).collect())),
                "values" => Ok(Value::list(
                    entries.iter().map(|(_, value)| value.clone()).collect(),
                )),
                "items" => Ok(Value::list(
                    entries
                        .iter()
                        .map(|(key, value)| Value::tuple(vec![key.clone(), value.clone()]))
                        .collect(),
                )),
                _ => Ok(Value::dict(entries.to_vec())),
            }
        }
        Value::List(items) | Value::Tuple(items) => {
            args.reject_keywords(name)?;
            match name {
                "count" => {
                    args.expect_count("count", 1, 1)?;
                    let needle = args.positional.first().unwrap_or(&Value::None);
                    let count = items.iter().filter(|item| py_eq(item, needle)).count();
                    Ok(Value::Int(i128::try_from(count).unwrap_or(i128::MAX)))
                }
                "index" => {
                    args.expect_count("index", 1, 1)?;
                    let needle = args.positional.first().unwrap_or(&Value::None);
                    items
                        .iter()
                        .position(|item| py_eq(item, needle))
                        .map(|index| Value::Int(i128::try_from(index).unwrap_or(i128::MAX)))
                        .ok_or_else(|| {
                            ExecError::value_error(format!("{} is not in list", needle.repr()))
                        })
                }
                _ => Ok(Value::list(items.to_vec())),
            }
        }
        Value::Date(date) => Ok(Value::str(date.format("%Y-%m-%d").to_string())),
        Value::DateTime(datetime) => Ok(Value::str(super::value::iso_datetime(datetime, 'T'))),
        Value::Time(time) => Ok(Value::str(super::value::iso_time(time))),
        #[allow(clippy::cast_precision_loss)]
        Value::TimeDelta(delta) => Ok(Value::Float(
            delta.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000_000.0,
        )),
        Value::Model(model) => match name {
            "model_rebuild" => Ok(Value::None),
            _ => {
                let by_alias = args.take_keyword("by_alias").is_none_or(|flag| flag.is_truthy());
                if let Some(mode) = args.take_keyword("mode")
                    && mode.as_str() != Some("validation")
                {
                    tracing::warn!(
                        mode = %mode.repr(),
                        "only validation-mode schemas are generated"
                    );
                }
                let _ = args.take_keyword("ref_template");
                args.reject_keywords("model_json_schema")?;
                if !by_alias {
                    tracing::warn!("by_alias=False is ignored; schemas always use aliases");
                }
                let schema = crate::schema::model_json_schema(model, interp).map_err(|err| {
                    ExecError::raise("PydanticInvalidForJsonSchema", err.to_string())
                })?;
                Ok(crate::schema::defaults::json_to_value(&schema))
            }
        },
        Value::Instance(instance) => Ok(Value::dict(
            instance
                .values
                .iter()
                .map(|(key, value)| (Value::str(key), value.clone()))
                .collect(),
        )),
        other => Err(ExecError::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_literals() {
        assert!(is_decimal_literal("1.50"));
        assert!(is_decimal_literal("-3e10"));
        assert!(is_decimal_literal("NaN"));
        assert!(!is_decimal_literal("1.2.3"));
        assert!(!is_decimal_literal("abc"));
        assert!(!is_decimal_literal("."));
    }

    #[test]
    fn iso_parsing() {
        assert!(matches!(parse_iso(BuiltinType::Date, "2024-02-29"), Ok(Value::Date(_))));
        assert!(matches!(
            parse_iso(BuiltinType::DateTime, "2024-02-29T10:30:00"),
            Ok(Value::DateTime(_))
        ));
        assert!(parse_iso(BuiltinType::Date, "2023-02-29").is_err());
    }

    #[test]
    fn call_args_prefer_positional() {
        let mut args = CallArgs::new(vec![Value::Int(1)], vec![("b".into(), Value::Int(2))]);
        assert!(py_eq(&args.take(0, "a").unwrap(), &Value::Int(1)));
        assert!(py_eq(&args.take(1, "b").unwrap(), &Value::Int(2)));
        assert!(args.keywords.is_empty());
    }

    #[test]
    fn argument_count_messages() {
        let args = CallArgs::positional(vec![Value::Int(1), Value::Int(2)]);
        let err = args.expect_count("len", 1, 1).unwrap_err();
        assert_eq!(err.to_string(), "len() takes exactly 1 argument (2 given)");
    }
}
