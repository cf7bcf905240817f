//! Runtime values of the declarative interpreter.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use indexmap::IndexMap;

use super::builtins::Builtin;
use super::classes::{DecoratorValue, EnumClass, EnumMember, ModelClass, ModelInstance, PlainClass};
use super::fields::{ConstraintMeta, FieldInfo};

/// Insertion-ordered variable bindings.
pub type Namespace = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    List,
    Dict,
    Set,
    FrozenSet,
    Tuple,
    Object,
    Type,
    NoneType,
    DateTime,
    Date,
    Time,
    TimeDelta,
    Decimal,
    Uuid,
    HttpUrl,
    AnyUrl,
    SecretStr,
    StrictStr,
    StrictInt,
    StrictFloat,
    StrictBool,
}

impl BuiltinType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::FrozenSet => "frozenset",
            Self::Tuple => "tuple",
            Self::Object => "object",
            Self::Type => "type",
            Self::NoneType => "NoneType",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
            Self::TimeDelta => "timedelta",
            Self::Decimal => "Decimal",
            Self::Uuid => "UUID",
            Self::HttpUrl => "HttpUrl",
            Self::AnyUrl => "AnyUrl",
            Self::SecretStr => "SecretStr",
            Self::StrictStr => "StrictStr",
            Self::StrictInt => "StrictInt",
            Self::StrictFloat => "StrictFloat",
            Self::StrictBool => "StrictBool",
        }
    }

    fn module(self) -> Option<&'static str> {
        match self {
            Self::DateTime | Self::Date | Self::Time | Self::TimeDelta => Some("datetime"),
            Self::Decimal => Some("decimal"),
            Self::Uuid => Some("uuid"),
            Self::HttpUrl | Self::AnyUrl => Some("pydantic.networks"),
            Self::SecretStr
            | Self::StrictStr
            | Self::StrictInt
            | Self::StrictFloat
            | Self::StrictBool => Some("pydantic.types"),
            _ => None,
        }
    }

    pub fn repr(self) -> String {
        match self.module() {
            Some(module) => format!("<class '{module}.{}'>", self.name()),
            None => format!("<class '{}'>", self.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Any,
    Optional,
    Union,
    List,
    Dict,
    Set,
    FrozenSet,
    Tuple,
    Literal,
    Annotated,
    ClassVar,
    Type,
    Sequence,
    Mapping,
    Iterable,
    Callable,
    AbstractSet,
}

impl SpecialForm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "Any",
            Self::Optional => "Optional",
            Self::Union => "Union",
            Self::List => "List",
            Self::Dict => "Dict",
            Self::Set | Self::AbstractSet => "Set",
            Self::FrozenSet => "FrozenSet",
            Self::Tuple => "Tuple",
            Self::Literal => "Literal",
            Self::Annotated => "Annotated",
            Self::ClassVar => "ClassVar",
            Self::Type => "Type",
            Self::Sequence => "Sequence",
            Self::Mapping => "Mapping",
            Self::Iterable => "Iterable",
            Self::Callable => "Callable",
        }
    }

    /// Spelling of the matching builtin generic, if there is one.
    pub fn builtin_name(self) -> Option<&'static str> {
        match self {
            Self::List => Some("list"),
            Self::Dict => Some("dict"),
            Self::Set => Some("set"),
            Self::FrozenSet => Some("frozenset"),
            Self::Tuple => Some("tuple"),
            Self::Type => Some("type"),
            _ => None,
        }
    }

    pub fn qualified(self) -> String {
        format!("typing.{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct GenericAlias {
    pub origin: SpecialForm,
    pub args: Vec<Value>,
    /// `list[int]` rather than `typing.List[int]`.
    pub builtin_spelling: bool,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub attrs: RefCell<Namespace>,
}

impl Module {
    pub fn new(name: impl Into<String>, attrs: Namespace) -> Self {
        Self {
            name: name.into(),
            attrs: RefCell::new(attrs),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }
}

/// A `def` or `lambda` from the source. Its body is never run.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    BaseException,
    Exception,
    ValueError,
    TypeError,
    KeyError,
    IndexError,
    NameError,
    AttributeError,
    RuntimeError,
    ImportError,
    ModuleNotFoundError,
    NotImplementedError,
    AssertionError,
    ZeroDivisionError,
    OverflowError,
}

impl ExceptionKind {
    pub const ALL: &'static [Self] = &[
        Self::BaseException,
        Self::Exception,
        Self::ValueError,
        Self::TypeError,
        Self::KeyError,
        Self::IndexError,
        Self::NameError,
        Self::AttributeError,
        Self::RuntimeError,
        Self::ImportError,
        Self::ModuleNotFoundError,
        Self::NotImplementedError,
        Self::AssertionError,
        Self::ZeroDivisionError,
        Self::OverflowError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BaseException => "BaseException",
            Self::Exception => "Exception",
            Self::ValueError => "ValueError",
            Self::TypeError => "TypeError",
            Self::KeyError => "KeyError",
            Self::IndexError => "IndexError",
            Self::NameError => "NameError",
            Self::AttributeError => "AttributeError",
            Self::RuntimeError => "RuntimeError",
            Self::ImportError => "ImportError",
            Self::ModuleNotFoundError => "ModuleNotFoundError",
            Self::NotImplementedError => "NotImplementedError",
            Self::AssertionError => "AssertionError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::OverflowError => "OverflowError",
        }
    }

    pub fn parent(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::Exception => Some(Self::BaseException),
            Self::ModuleNotFoundError => Some(Self::ImportError),
            Self::NotImplementedError => Some(Self::RuntimeError),
            Self::KeyError | Self::IndexError => Some(Self::Exception),
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::Exception),
            _ => Some(Self::Exception),
        }
    }

    pub fn is_subclass_of(self, other: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

#[derive(Debug)]
pub struct ExceptionValue {
    pub kind: ExceptionKind,
    pub args: Vec<Value>,
}

impl ExceptionValue {
    /// What `str(exc)` shows.
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [only] if self.kind == ExceptionKind::KeyError => only.repr(),
            [only] => only.to_str(),
            many => tuple_repr(many),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// `enum.auto()`
    Auto,
    /// `pydantic.PrivateAttr(...)`
    PrivateAttr,
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Ellipsis,
    List(Rc<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Set(Rc<Vec<Value>>),
    FrozenSet(Rc<Vec<Value>>),
    Dict(Rc<Vec<(Value, Value)>>),
    Decimal(Rc<str>),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    TimeDelta(TimeDelta),
    Type(BuiltinType),
    Special(SpecialForm),
    Generic(Rc<GenericAlias>),
    Model(Rc<ModelClass>),
    Instance(Rc<ModelInstance>),
    Enum(Rc<EnumClass>),
    EnumMember(Rc<EnumMember>),
    Class(Rc<PlainClass>),
    Module(Rc<Module>),
    Builtin(Builtin),
    BoundMethod(Rc<BoundMethod>),
    Function(Rc<Function>),
    FieldInfo(Rc<FieldInfo>),
    Constraint(Rc<ConstraintMeta>),
    Decorator(Rc<DecoratorValue>),
    ExceptionType(ExceptionKind),
    Exception(Rc<ExceptionValue>),
    Sentinel(Sentinel),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Self::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(items))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    pub fn dict(entries: Vec<(Value, Value)>) -> Self {
        Self::Dict(Rc::new(entries))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(&**text),
            _ => None,
        }
    }

    /// Name used by `type(x).__name__` and in error messages.
    pub fn type_name(&self) -> String {
        let name = match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Ellipsis => "ellipsis",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Set(_) => "set",
            Self::FrozenSet(_) => "frozenset",
            Self::Dict(_) => "dict",
            Self::Decimal(_) => "Decimal",
            Self::Uuid(_) => "UUID",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Time(_) => "time",
            Self::TimeDelta(_) => "timedelta",
            Self::Type(_) | Self::ExceptionType(_) | Self::Class(_) => "type",
            Self::Model(_) => "ModelMetaclass",
            Self::Enum(_) => "EnumType",
            Self::Special(_) => "_SpecialForm",
            Self::Generic(_) => "_GenericAlias",
            Self::Instance(instance) => return instance.class.name.clone(),
            Self::EnumMember(member) => return member.owner_name.clone(),
            Self::Module(_) => "module",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::BoundMethod(_) => "method",
            Self::Function(_) | Self::Decorator(_) => "function",
            Self::FieldInfo(_) => "FieldInfo",
            Self::Constraint(meta) => return meta.name.to_string(),
            Self::Exception(exc) => exc.kind.name(),
            Self::Sentinel(Sentinel::Auto) => "auto",
            Self::Sentinel(Sentinel::PrivateAttr) => "ModelPrivateAttr",
        };
        name.to_string()
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Str(text) => !text.is_empty(),
            Self::Bytes(bytes) => !bytes.is_empty(),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) | Self::FrozenSet(items) => {
                !items.is_empty()
            }
            Self::Dict(entries) => !entries.is_empty(),
            Self::Decimal(text) => text.parse::<f64>().map_or(true, |value| value != 0.0),
            Self::TimeDelta(delta) => !delta.is_zero(),
            _ => true,
        }
    }

    /// Whether the value may be a dict key or set element.
    pub fn is_hashable(&self) -> bool {
        match self {
            Self::List(_) | Self::Dict(_) | Self::Set(_) | Self::Instance(_) => false,
            Self::Tuple(items) | Self::FrozenSet(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }

    /// Whether the value can stand in a type position (annotations, unions).
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            Self::None
                | Self::Type(_)
                | Self::Special(_)
                | Self::Generic(_)
                | Self::Model(_)
                | Self::Enum(_)
                | Self::Class(_)
                | Self::ExceptionType(_)
        )
    }

    pub fn repr(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => float_repr(*value),
            Self::Str(text) => str_repr(text),
            Self::Bytes(bytes) => bytes_repr(bytes),
            Self::Ellipsis => "Ellipsis".to_string(),
            Self::List(items) => format!("[{}]", join_reprs(items)),
            Self::Tuple(items) => tuple_repr(items),
            Self::Set(items) if items.is_empty() => "set()".to_string(),
            Self::Set(items) => format!("{{{}}}", join_reprs(items)),
            Self::FrozenSet(items) if items.is_empty() => "frozenset()".to_string(),
            Self::FrozenSet(items) => format!("frozenset({{{}}})", join_reprs(items)),
            Self::Dict(entries) => {
                let body = entries
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{body}}}")
            }
            Self::Decimal(text) => format!("Decimal('{text}')"),
            Self::Uuid(uuid) => format!("UUID('{uuid}')"),
            Self::Date(date) => format!(
                "datetime.date({}, {}, {})",
                chrono::Datelike::year(date),
                chrono::Datelike::month(date),
                chrono::Datelike::day(date)
            ),
            Self::DateTime(datetime) => {
                let date = datetime.date();
                let time = datetime.time();
                let mut out = format!(
                    "datetime.datetime({}, {}, {}, {}, {}",
                    chrono::Datelike::year(&date),
                    chrono::Datelike::month(&date),
                    chrono::Datelike::day(&date),
                    time.hour(),
                    time.minute()
                );
                let micros = time.nanosecond() / 1_000;
                if time.second() != 0 || micros != 0 {
                    let _ = write!(out, ", {}", time.second());
                }
                if micros != 0 {
                    let _ = write!(out, ", {micros}");
                }
                out.push(')');
                out
            }
            Self::Time(time) => format!("datetime.time({}, {})", time.hour(), time.minute()),
            Self::TimeDelta(delta) => {
                format!("datetime.timedelta(seconds={})", delta.num_seconds())
            }
            Self::Type(ty) => ty.repr(),
            Self::Special(form) => form.qualified(),
            Self::Generic(alias) => generic_repr(alias),
            Self::Model(model) => format!("<class '{}'>", model.name),
            Self::Instance(instance) => instance.repr(),
            Self::Enum(class) => format!("<enum '{}'>", class.name),
            Self::EnumMember(member) => {
                format!("<{}.{}: {}>", member.owner_name, member.name, member.value.repr())
            }
            Self::Class(class) => format!("<class '{}'>", class.name),
            Self::Module(module) => format!("<module '{}'>", module.name),
            Self::Builtin(builtin) => format!("<built-in function {}>", builtin.name()),
            Self::BoundMethod(method) => format!(
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            ),
            Self::Function(function) => format!("<function {}>", function.name),
            Self::Decorator(decorator) => decorator.repr(),
            Self::FieldInfo(info) => info.repr(),
            Self::Constraint(meta) => meta.repr(),
            Self::ExceptionType(kind) => format!("<class '{}'>", kind.name()),
            Self::Exception(exc) => format!("{}({})", exc.kind.name(), join_reprs(&exc.args)),
            Self::Sentinel(Sentinel::Auto) => "auto(_auto_null)".to_string(),
            Self::Sentinel(Sentinel::PrivateAttr) => "ModelPrivateAttr()".to_string(),
        }
    }

    /// What `str(value)` produces.
    pub fn to_str(&self) -> String {
        match self {
            Self::Str(text) => text.to_string(),
            Self::Decimal(text) => text.to_string(),
            Self::Uuid(uuid) => uuid.to_string(),
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::DateTime(datetime) => iso_datetime(datetime, ' '),
            Self::Time(time) => iso_time(time),
            Self::TimeDelta(delta) => timedelta_str(*delta),
            Self::EnumMember(member) if member.str_like => member.value.to_str(),
            Self::EnumMember(member) => format!("{}.{}", member.owner_name, member.name),
            Self::Exception(exc) => exc.message(),
            _ => self.repr(),
        }
    }
}

fn join_reprs(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

pub fn tuple_repr(items: &[Value]) -> String {
    match items {
        [only] => format!("({},)", only.repr()),
        _ => format!("({})", join_reprs(items)),
    }
}

fn generic_repr(alias: &GenericAlias) -> String {
    let head = match (alias.builtin_spelling, alias.origin.builtin_name()) {
        (true, Some(name)) => name.to_string(),
        _ => alias.origin.qualified(),
    };
    let args = alias
        .args
        .iter()
        .map(|arg| match arg {
            Value::Type(ty) => ty.name().to_string(),
            Value::Model(model) => model.name.clone(),
            Value::Enum(class) => class.name.clone(),
            Value::Class(class) => class.name.clone(),
            Value::Str(text) => format!("ForwardRef('{text}')"),
            Value::Ellipsis => "...".to_string(),
            other => other.repr(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{head}[{args}]")
}

/// Python's `repr(float)`.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let formatted = format!("{value:e}");
        let (mantissa, exponent) = formatted
            .split_once('e')
            .unwrap_or((formatted.as_str(), "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = u32::from(c);
                if code < 0x100 {
                    let _ = write!(out, "\\x{code:02x}");
                } else {
                    let _ = write!(out, "\\u{code:04x}");
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn bytes_repr(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\'' => out.push_str("\\'"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push('\'');
    out
}

pub fn iso_time(time: &NaiveTime) -> String {
    let micros = time.nanosecond() / 1_000;
    if micros == 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        format!("{}.{micros:06}", time.format("%H:%M:%S"))
    }
}

pub fn iso_datetime(datetime: &NaiveDateTime, separator: char) -> String {
    format!(
        "{}{separator}{}",
        datetime.date().format("%Y-%m-%d"),
        iso_time(&datetime.time())
    )
}

fn timedelta_str(delta: TimeDelta) -> String {
    let total_micros = delta.num_microseconds().unwrap_or(i64::MAX);
    let days = total_micros.div_euclid(86_400_000_000);
    let rest = total_micros.rem_euclid(86_400_000_000);
    let seconds = rest / 1_000_000;
    let micros = rest % 1_000_000;
    let mut out = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        let _ = write!(out, "{days} day{plural}, ");
    }
    let _ = write!(
        out,
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    );
    if micros != 0 {
        let _ = write!(out, ".{micros:06}");
    }
    out
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Int(int) => Some(*int as f64),
        Value::Bool(flag) => Some(f64::from(u8::from(*flag))),
        Value::Float(float) => Some(*float),
        _ => None,
    }
}

fn set_contains(items: &[Value], needle: &Value) -> bool {
    items.iter().any(|item| py_eq(item, needle))
}

/// Python `==`.
pub fn py_eq(left: &Value, right: &Value) -> bool {
    use Value as V;
    match (left, right) {
        (V::None, V::None) | (V::Ellipsis, V::Ellipsis) => true,
        (V::Int(a), V::Int(b)) => a == b,
        (V::Bool(a), V::Bool(b)) => a == b,
        (V::Int(_) | V::Bool(_) | V::Float(_), V::Int(_) | V::Bool(_) | V::Float(_)) => {
            match (as_number(left), as_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (V::Str(a), V::Str(b)) => a == b,
        (V::Bytes(a), V::Bytes(b)) => a == b,
        (V::List(a), V::List(b)) | (V::Tuple(a), V::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| py_eq(x, y))
        }
        (V::Set(a) | V::FrozenSet(a), V::Set(b) | V::FrozenSet(b)) => {
            a.len() == b.len() && a.iter().all(|item| set_contains(b, item))
        }
        (V::Dict(a), V::Dict(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.iter()
                        .find(|(other_key, _)| py_eq(key, other_key))
                        .is_some_and(|(_, other_value)| py_eq(value, other_value))
                })
        }
        (V::Decimal(a), V::Decimal(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => x == y,
            _ => a == b,
        },
        (V::Uuid(a), V::Uuid(b)) => a == b,
        (V::Date(a), V::Date(b)) => a == b,
        (V::DateTime(a), V::DateTime(b)) => a == b,
        (V::Time(a), V::Time(b)) => a == b,
        (V::TimeDelta(a), V::TimeDelta(b)) => a == b,
        (V::Type(a), V::Type(b)) => a == b,
        (V::Special(a), V::Special(b)) => a == b,
        (V::Generic(a), V::Generic(b)) => {
            a.origin == b.origin
                && a.args.len() == b.args.len()
                && a.args.iter().zip(b.args.iter()).all(|(x, y)| py_eq(x, y))
        }
        (V::Model(a), V::Model(b)) => Rc::ptr_eq(a, b),
        (V::Instance(a), V::Instance(b)) => {
            Rc::ptr_eq(&a.class, &b.class)
                && a.values.len() == b.values.len()
                && a.values.iter().all(|(name, value)| {
                    b.values.get(name).is_some_and(|other| py_eq(value, other))
                })
        }
        (V::Enum(a), V::Enum(b)) => Rc::ptr_eq(a, b),
        (V::EnumMember(a), V::EnumMember(b)) => Rc::ptr_eq(a, b),
        (V::EnumMember(member), other) | (other, V::EnumMember(member)) if member.mixin_value => {
            py_eq(&member.value, other)
        }
        (V::Class(a), V::Class(b)) => Rc::ptr_eq(a, b),
        (V::Module(a), V::Module(b)) => Rc::ptr_eq(a, b),
        (V::Function(a), V::Function(b)) => Rc::ptr_eq(a, b),
        (V::FieldInfo(a), V::FieldInfo(b)) => Rc::ptr_eq(a, b),
        (V::Constraint(a), V::Constraint(b)) => a.constraints == b.constraints,
        (V::Decorator(a), V::Decorator(b)) => Rc::ptr_eq(a, b),
        (V::Builtin(a), V::Builtin(b)) => a == b,
        (V::ExceptionType(a), V::ExceptionType(b)) => a == b,
        (V::Exception(a), V::Exception(b)) => Rc::ptr_eq(a, b),
        (V::Sentinel(a), V::Sentinel(b)) => a == b,
        _ => false,
    }
}

/// Python `is`.
pub fn py_is(left: &Value, right: &Value) -> bool {
    use Value as V;
    match (left, right) {
        (V::List(a), V::List(b))
        | (V::Tuple(a), V::Tuple(b))
        | (V::Set(a), V::Set(b))
        | (V::FrozenSet(a), V::FrozenSet(b)) => Rc::ptr_eq(a, b),
        (V::Dict(a), V::Dict(b)) => Rc::ptr_eq(a, b),
        (V::Instance(a), V::Instance(b)) => Rc::ptr_eq(a, b),
        (V::Float(a), V::Float(b)) => a.to_bits() == b.to_bits(),
        (V::Int(_), V::Int(_)) | (V::Bool(_), V::Bool(_)) | (V::Str(_), V::Str(_)) => {
            py_eq(left, right)
        }
        (V::EnumMember(a), V::EnumMember(b)) => Rc::ptr_eq(a, b),
        (V::EnumMember(_), _) | (_, V::EnumMember(_)) => false,
        (V::Int(_) | V::Bool(_) | V::Float(_), _) | (_, V::Int(_) | V::Bool(_) | V::Float(_)) => {
            false
        }
        _ => py_eq(left, right),
    }
}

/// Order-preserving dedup used for set construction.
pub fn dedup_values(items: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !set_contains(&unique, &item) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(-2.5), "-2.5");
    }

    #[test]
    fn str_repr_picks_quotes() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(py_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(py_eq(&Value::Bool(true), &Value::Int(1)));
        assert!(!py_eq(&Value::Int(1), &Value::str("1")));
    }

    #[test]
    fn containers_compare_structurally() {
        let left = Value::list(vec![Value::Int(1), Value::str("a")]);
        let right = Value::list(vec![Value::Int(1), Value::str("a")]);
        assert!(py_eq(&left, &right));
        assert!(!py_is(&left, &right));
        assert!(py_is(&left, &left.clone()));
    }

    #[test]
    fn tuple_repr_single_element() {
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
    }
}
