//! Class construction: data models, enumerations and plain classes.

use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use super::builtins::{Builtin, CallArgs};
use super::fields::FieldInfo;
use super::value::{BuiltinType, Namespace, Sentinel, SpecialForm, Value, py_eq};
use super::{ExecError, Interpreter};
use crate::schema::types::{ConvertError, TypeResolver};

/// Names bound while executing a class body.
#[derive(Debug, Default)]
pub struct ClassBody {
    pub namespace: Namespace,
    pub annotations: IndexMap<String, Value>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraMode {
    Allow,
    Ignore,
    Forbid,
}

impl ExtraMode {
    fn parse(value: &Value) -> Result<Option<Self>, ExecError> {
        match value {
            Value::None => Ok(None),
            Value::Str(text) => match &**text {
                "allow" => Ok(Some(Self::Allow)),
                "ignore" => Ok(Some(Self::Ignore)),
                "forbid" => Ok(Some(Self::Forbid)),
                _ => Err(invalid_extra()),
            },
            Value::EnumMember(member) => Self::parse(&member.value),
            _ => Err(invalid_extra()),
        }
    }
}

fn invalid_extra() -> ExecError {
    ExecError::raise(
        "SchemaError",
        "Invalid Schema: model.config.extra_fields_behavior: Input should be 'allow', 'forbid' or 'ignore'",
    )
}

/// Config keys that were renamed, with their current spelling.
const RENAMED_CONFIG_KEYS: &[(&str, &str)] = &[
    ("allow_population_by_field_name", "populate_by_name"),
    ("anystr_lower", "str_to_lower"),
    ("anystr_strip_whitespace", "str_strip_whitespace"),
    ("anystr_upper", "str_to_upper"),
    ("keep_untouched", "ignored_types"),
    ("max_anystr_length", "str_max_length"),
    ("min_anystr_length", "str_min_length"),
    ("orm_mode", "from_attributes"),
    ("schema_extra", "json_schema_extra"),
    ("validate_all", "validate_default"),
];

/// Effective model configuration after inheritance and overrides.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    pub entries: Vec<(String, Value)>,
    pub title: Option<String>,
    pub extra: Option<ExtraMode>,
    pub json_schema_extra: Option<Value>,
    pub arbitrary_types_allowed: bool,
    pub alias_generator: Option<Value>,
}

impl ModelConfig {
    fn from_entries(entries: Vec<(String, Value)>) -> Result<Self, ExecError> {
        let mut config = Self::default();
        for (key, value) in &entries {
            match key.as_str() {
                "title" => {
                    config.title = match value {
                        Value::None => None,
                        Value::Str(text) => Some(text.to_string()),
                        other => {
                            return Err(ExecError::type_error(format!(
                                "model_config['title'] must be str, not '{}'",
                                other.type_name()
                            )));
                        }
                    }
                }
                "extra" => config.extra = ExtraMode::parse(value)?,
                "json_schema_extra" => {
                    config.json_schema_extra =
                        Some(value.clone()).filter(|v| !matches!(v, Value::None));
                }
                "arbitrary_types_allowed" => config.arbitrary_types_allowed = value.is_truthy(),
                "alias_generator" => {
                    config.alias_generator =
                        Some(value.clone()).filter(|v| !matches!(v, Value::None));
                }
                _ => {}
            }
        }
        config.entries = entries;
        Ok(config)
    }

    /// Layer `overrides` on top of this config.
    fn extended(&self, overrides: Vec<(String, Value)>) -> Result<Self, ExecError> {
        let mut entries = self.entries.clone();
        for (key, value) in overrides {
            let key = match RENAMED_CONFIG_KEYS.iter().find(|(old, _)| *old == key) {
                Some((old, new)) => {
                    tracing::warn!("Valid config keys have changed: '{old}' has been renamed to '{new}'");
                    (*new).to_string()
                }
                None => key,
            };
            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Self::from_entries(entries)
    }

    pub fn to_value(&self) -> Value {
        Value::dict(
            self.entries
                .iter()
                .map(|(key, value)| (Value::str(key), value.clone()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ModelField {
    pub name: String,
    /// Annotation with `Annotated` metadata peeled into `info`.
    pub annotation: Value,
    pub info: FieldInfo,
}

impl ModelField {
    /// Key used for the property in validation-mode schemas.
    pub fn schema_key(&self) -> &str {
        self.info
            .validation_alias
            .as_deref()
            .or(self.info.alias.as_deref())
            .unwrap_or(&self.name)
    }
}

/// A `BaseModel` subclass, or `BaseModel` itself when `is_root` is set.
#[derive(Debug)]
pub struct ModelClass {
    pub id: u64,
    pub name: String,
    pub doc: Option<String>,
    pub is_root: bool,
    /// `RootModel` or one of its subclasses. Such a model has the single
    /// field `root` and its schema is that field's.
    pub root_model: bool,
    pub parents: Vec<Rc<ModelClass>>,
    pub fields: IndexMap<String, ModelField>,
    pub config: ModelConfig,
    pub attrs: Namespace,
    pub line: usize,
}

impl ModelClass {
    pub fn root(id: u64) -> Self {
        Self {
            id,
            name: "BaseModel".to_string(),
            doc: None,
            is_root: true,
            root_model: false,
            parents: Vec::new(),
            fields: IndexMap::new(),
            config: ModelConfig::default(),
            attrs: Namespace::new(),
            line: 0,
        }
    }

    /// `pydantic.RootModel`, unparameterized.
    pub fn root_model_base(id: u64, base_model: &Rc<ModelClass>) -> Self {
        Self {
            name: "RootModel".to_string(),
            root_model: true,
            parents: vec![Rc::clone(base_model)],
            ..Self::root(id)
        }
    }

    pub fn is_subclass_of(&self, other: &ModelClass) -> bool {
        self.id == other.id || self.parents.iter().any(|parent| parent.is_subclass_of(other))
    }

    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        self.attrs
            .get(name)
            .cloned()
            .or_else(|| self.parents.iter().find_map(|parent| parent.lookup_attr(name)))
    }
}

#[derive(Debug)]
pub struct ModelInstance {
    pub class: Rc<ModelClass>,
    pub values: IndexMap<String, Value>,
}

impl ModelInstance {
    pub fn repr(&self) -> String {
        let body = self
            .values
            .iter()
            .map(|(name, value)| format!("{name}={}", value.repr()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({body})", self.class.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumKind {
    Enum,
    IntEnum,
    StrEnum,
}

impl EnumKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Enum => "Enum",
            Self::IntEnum => "IntEnum",
            Self::StrEnum => "StrEnum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMixin {
    Str,
    Int,
}

#[derive(Debug)]
pub struct EnumClass {
    pub id: u64,
    pub name: String,
    pub doc: Option<String>,
    pub kind: EnumKind,
    pub mixin: Option<EnumMixin>,
    pub is_root: bool,
    pub parents: Vec<Rc<EnumClass>>,
    /// Canonical members in definition order.
    pub members: Vec<Rc<EnumMember>>,
    /// Every member name, aliases included.
    pub by_name: IndexMap<String, Rc<EnumMember>>,
    pub attrs: Namespace,
    pub line: usize,
}

impl EnumClass {
    pub fn root(id: u64, kind: EnumKind) -> Self {
        let mixin = match kind {
            EnumKind::Enum => None,
            EnumKind::IntEnum => Some(EnumMixin::Int),
            EnumKind::StrEnum => Some(EnumMixin::Str),
        };
        Self {
            id,
            name: kind.name().to_string(),
            doc: None,
            kind,
            mixin,
            is_root: true,
            parents: Vec::new(),
            members: Vec::new(),
            by_name: IndexMap::new(),
            attrs: Namespace::new(),
            line: 0,
        }
    }

    pub fn is_subclass_of(&self, other: &EnumClass) -> bool {
        self.id == other.id || self.parents.iter().any(|parent| parent.is_subclass_of(other))
    }

    pub fn member_by_value(&self, value: &Value) -> Option<Rc<EnumMember>> {
        self.members
            .iter()
            .find(|member| py_eq(&member.value, value))
            .cloned()
    }

    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        self.attrs
            .get(name)
            .cloned()
            .or_else(|| self.parents.iter().find_map(|parent| parent.lookup_attr(name)))
    }

    /// Look a member up by value, as `Color("red")` does.
    pub fn call(&self, args: &CallArgs) -> Result<Value, ExecError> {
        let [value] = args.positional.as_slice() else {
            return Err(ExecError::type_error(format!(
                "{}() takes exactly one argument ({} given)",
                self.name,
                args.positional.len()
            )));
        };
        if let Value::EnumMember(member) = value
            && member.owner_id == self.id
        {
            return Ok(value.clone());
        }
        self.member_by_value(value)
            .map(Value::EnumMember)
            .ok_or_else(|| {
                ExecError::value_error(format!("{} is not a valid {}", value.repr(), self.name))
            })
    }
}

#[derive(Debug)]
pub struct EnumMember {
    pub name: String,
    pub value: Value,
    pub owner_id: u64,
    pub owner_name: String,
    /// `str()` yields the value rather than `Owner.NAME`.
    pub str_like: bool,
    /// Equality compares the underlying value (int/str mixins).
    pub mixin_value: bool,
}

#[derive(Debug)]
pub struct PlainClass {
    pub id: u64,
    pub name: String,
    pub doc: Option<String>,
    pub bases: Vec<Value>,
    pub attrs: Namespace,
}

impl PlainClass {
    pub fn lookup_attr(&self, name: &str) -> Option<Value> {
        self.attrs.get(name).cloned().or_else(|| {
            self.bases.iter().find_map(|base| match base {
                Value::Class(class) => class.lookup_attr(name),
                _ => None,
            })
        })
    }

    pub fn is_subclass_of(&self, other: &PlainClass) -> bool {
        self.id == other.id
            || self.bases.iter().any(|base| match base {
                Value::Class(class) => class.is_subclass_of(other),
                _ => false,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoratorKind {
    FieldValidator {
        fields: Vec<String>,
        check_fields: Option<bool>,
    },
    Validator {
        fields: Vec<String>,
        check_fields: Option<bool>,
    },
    FieldSerializer {
        fields: Vec<String>,
        check_fields: Option<bool>,
    },
    ModelValidator,
    RootValidator,
    ModelSerializer,
    ComputedField,
    ClassMethod,
    StaticMethod,
    Property,
}

impl DecoratorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FieldValidator { .. } => "field_validator",
            Self::Validator { .. } => "validator",
            Self::FieldSerializer { .. } => "field_serializer",
            Self::ModelValidator => "model_validator",
            Self::RootValidator => "root_validator",
            Self::ModelSerializer => "model_serializer",
            Self::ComputedField => "computed_field",
            Self::ClassMethod => "classmethod",
            Self::StaticMethod => "staticmethod",
            Self::Property => "property",
        }
    }
}

/// A decorator, either still waiting for its function or already applied.
#[derive(Debug)]
pub struct DecoratorValue {
    pub kind: DecoratorKind,
    pub target: Option<Value>,
}

impl DecoratorValue {
    pub fn factory(kind: DecoratorKind) -> Self {
        Self { kind, target: None }
    }

    pub fn applied(kind: DecoratorKind, target: Value) -> Self {
        Self {
            kind,
            target: Some(target),
        }
    }

    /// Name of the innermost decorated function.
    pub fn function_name(&self) -> Option<String> {
        match self.target.as_ref()? {
            Value::Function(function) => Some(function.name.clone()),
            Value::Decorator(inner) => inner.function_name(),
            _ => None,
        }
    }

    /// Field names a decorator refers to, when they must exist on the model.
    fn checked_fields(&self) -> Option<&[String]> {
        match &self.kind {
            DecoratorKind::FieldValidator {
                fields,
                check_fields,
            }
            | DecoratorKind::Validator {
                fields,
                check_fields,
            }
            | DecoratorKind::FieldSerializer {
                fields,
                check_fields,
            } if *check_fields != Some(false) => Some(fields.as_slice()),
            _ => match self.target.as_ref()? {
                Value::Decorator(inner) => inner.checked_fields(),
                _ => None,
            },
        }
    }

    pub fn call(&self, args: CallArgs) -> Result<Value, ExecError> {
        if self.target.is_some() {
            return Err(ExecError::type_error(format!(
                "'{}' object is not callable",
                self.kind.name()
            )));
        }
        args.reject_keywords(self.kind.name())?;
        let [target] = <[Value; 1]>::try_from(args.positional).map_err(|given| {
            ExecError::type_error(format!(
                "{}() takes exactly one argument ({} given)",
                self.kind.name(),
                given.len()
            ))
        })?;
        Ok(Value::Decorator(Rc::new(Self::applied(
            self.kind.clone(),
            target,
        ))))
    }

    pub fn repr(&self) -> String {
        match self.function_name() {
            Some(name) => format!("<{} {name}>", self.kind.name()),
            None => format!("<{} decorator>", self.kind.name()),
        }
    }
}

/// Build the class produced by a `class` statement.
pub(crate) fn build_class(
    interp: &Interpreter,
    name: &str,
    bases: Vec<Value>,
    keywords: Vec<(String, Value)>,
    body: ClassBody,
    line: usize,
) -> Result<Value, ExecError> {
    for (index, base) in bases.iter().enumerate() {
        if bases
            .iter()
            .skip(index + 1)
            .any(|other| super::value::py_is(base, other))
        {
            return Err(ExecError::type_error(format!(
                "duplicate base class {}",
                class_display_name(base)
            )));
        }
    }
    let has_model = bases.iter().any(|base| matches!(base, Value::Model(_)));
    let has_enum = bases.iter().any(|base| matches!(base, Value::Enum(_)));
    match (has_model, has_enum) {
        (true, true) => Err(ExecError::type_error(
            "metaclass conflict: the metaclass of a derived class must be a (non-strict) subclass of the metaclasses of all its bases",
        )),
        (true, false) => build_model(interp, name, &bases, keywords, body, line),
        (false, true) => build_enum(interp, name, &bases, keywords, body, line),
        (false, false) => build_plain(interp, name, bases, keywords, body),
    }
}

fn class_display_name(value: &Value) -> String {
    match value {
        Value::Model(model) => model.name.clone(),
        Value::Enum(class) => class.name.clone(),
        Value::Class(class) => class.name.clone(),
        Value::Type(ty) => ty.name().to_string(),
        Value::ExceptionType(kind) => kind.name().to_string(),
        other => other.repr(),
    }
}

fn build_plain(
    interp: &Interpreter,
    name: &str,
    bases: Vec<Value>,
    keywords: Vec<(String, Value)>,
    body: ClassBody,
) -> Result<Value, ExecError> {
    if !keywords.is_empty() {
        return Err(ExecError::type_error(format!(
            "{name}.__init_subclass__() takes no keyword arguments"
        )));
    }
    for base in &bases {
        match base {
            Value::Class(_) | Value::Type(_) | Value::ExceptionType(_) => {}
            Value::Special(_) | Value::Generic(_) => {
                return Err(ExecError::type_error(format!(
                    "generic base classes such as {} are not supported",
                    base.repr()
                )));
            }
            other => {
                return Err(ExecError::type_error(format!(
                    "bases must be types, not '{}'",
                    other.type_name()
                )));
            }
        }
    }
    let mut attrs = body.namespace;
    if !body.annotations.is_empty() {
        let annotations = body
            .annotations
            .into_iter()
            .map(|(key, value)| (Value::str(key), value))
            .collect();
        attrs.insert("__annotations__".to_string(), Value::dict(annotations));
    }
    Ok(Value::Class(Rc::new(PlainClass {
        id: interp.next_class_id(),
        name: name.to_string(),
        doc: body.doc,
        bases,
        attrs,
    })))
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_classvar(annotation: &Value) -> bool {
    match annotation {
        Value::Special(SpecialForm::ClassVar) => true,
        Value::Generic(alias) => alias.origin == SpecialForm::ClassVar,
        Value::Str(text) => {
            let text = text.trim();
            text == "ClassVar"
                || text.starts_with("ClassVar[")
                || text.starts_with("typing.ClassVar")
        }
        _ => false,
    }
}

/// Values a model body may hold without an annotation.
fn is_ignored_attribute(value: &Value) -> bool {
    matches!(
        value,
        Value::Type(_)
            | Value::Model(_)
            | Value::Enum(_)
            | Value::Class(_)
            | Value::ExceptionType(_)
            | Value::Function(_)
            | Value::Decorator(_)
    )
}

/// Attribute names that a field would shadow on `BaseModel`.
const BASE_MODEL_ATTRIBUTES: &[&str] = &[
    "copy",
    "dict",
    "json",
    "schema",
    "schema_json",
    "construct",
    "validate",
    "parse_obj",
    "parse_raw",
    "parse_file",
    "from_orm",
    "update_forward_refs",
];

/// Split `Annotated[T, ...]` into `T` and the merged field metadata.
pub(crate) fn peel_annotated(annotation: &Value) -> (Value, Option<FieldInfo>) {
    let Value::Generic(alias) = annotation else {
        return (annotation.clone(), None);
    };
    if alias.origin != SpecialForm::Annotated {
        return (annotation.clone(), None);
    }
    let Some((inner, metadata)) = alias.args.split_first() else {
        return (annotation.clone(), None);
    };
    let mut info = FieldInfo::default();
    for item in metadata {
        match item {
            Value::FieldInfo(field) => info.merge(field),
            Value::Constraint(meta) => info.merge_constraints(&meta.constraints),
            _ => {}
        }
    }
    (inner.clone(), Some(info))
}

fn config_from_class(value: &Value) -> Option<Vec<(String, Value)>> {
    let Value::Class(class) = value else {
        return None;
    };
    Some(
        class
            .attrs
            .iter()
            .filter(|(key, _)| !is_dunder(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

fn config_from_dict(value: &Value) -> Result<Vec<(String, Value)>, ExecError> {
    let Value::Dict(entries) = value else {
        return Err(ExecError::type_error(format!(
            "model_config must be a dict, not '{}'",
            value.type_name()
        )));
    };
    entries
        .iter()
        .map(|(key, value)| match key {
            Value::Str(key) => Ok((key.to_string(), value.clone())),
            other => Err(ExecError::type_error(format!(
                "model_config keys must be str, not '{}'",
                other.type_name()
            ))),
        })
        .collect()
}

fn apply_alias_generator(
    interp: &Interpreter,
    generator: &Value,
    name: &str,
) -> Result<Option<String>, ExecError> {
    match generator {
        Value::Builtin(builtin @ (Builtin::ToCamel | Builtin::ToPascal | Builtin::ToSnake)) => {
            let alias = interp.call(
                &Value::Builtin(*builtin),
                CallArgs::positional(vec![Value::str(name)]),
            )?;
            Ok(alias.as_str().map(str::to_string))
        }
        other => {
            tracing::warn!(
                generator = %other.repr(),
                "alias_generator is not evaluated; field names are used as-is"
            );
            Ok(None)
        }
    }
}

fn build_model(
    interp: &Interpreter,
    name: &str,
    bases: &[Value],
    keywords: Vec<(String, Value)>,
    mut body: ClassBody,
    line: usize,
) -> Result<Value, ExecError> {
    let mut parents = Vec::new();
    for base in bases {
        match base {
            Value::Model(model) => parents.push(Rc::clone(model)),
            Value::Class(_) | Value::Type(BuiltinType::Object) => {}
            Value::Type(ty) => {
                return Err(ExecError::type_error(format!(
                    "multiple bases have instance lay-out conflict ({} and BaseModel)",
                    ty.name()
                )));
            }
            Value::Special(_) | Value::Generic(_) => {
                return Err(ExecError::type_error(format!(
                    "generic models are not supported: {} cannot be used as a base",
                    base.repr()
                )));
            }
            other => {
                return Err(ExecError::type_error(format!(
                    "bases must be types, not '{}'",
                    other.type_name()
                )));
            }
        }
    }

    // Config: parents in order, then the class body, then class keywords.
    let mut config = ModelConfig::default();
    for parent in &parents {
        config = config.extended(parent.config.entries.clone())?;
    }
    let body_config = body.namespace.shift_remove("model_config");
    let class_config = body.namespace.get("Config").and_then(config_from_class);
    match (body_config, class_config) {
        (Some(_), Some(_)) => {
            return Err(ExecError::user_error(
                "\"Config\" and \"model_config\" cannot be used together",
            ));
        }
        (Some(dict), None) => config = config.extended(config_from_dict(&dict)?)?,
        (None, Some(entries)) => {
            tracing::warn!(
                model = name,
                "Support for class-based `config` is deprecated, use ConfigDict instead."
            );
            body.namespace.shift_remove("Config");
            config = config.extended(entries)?;
        }
        (None, None) => {}
    }
    if !keywords.is_empty() {
        config = config.extended(keywords)?;
    }
    let root_model = parents.iter().any(|parent| parent.root_model);
    if root_model && config.extra.is_some() {
        return Err(ExecError::user_error(
            "`RootModel` does not support setting `model_config['extra']`",
        ));
    }

    // Inherited fields first, most distant base first.
    let mut fields: IndexMap<String, ModelField> = IndexMap::new();
    for parent in parents.iter().rev() {
        for (field_name, field) in &parent.fields {
            fields.insert(field_name.clone(), field.clone());
        }
    }
    let inherited: Vec<String> = fields.keys().cloned().collect();

    let resolver = TypeResolver::new(interp, name, None, config.arbitrary_types_allowed);
    for (field_name, annotation) in &body.annotations {
        if is_classvar(annotation) {
            continue;
        }
        if field_name.starts_with('_') {
            continue;
        }
        if BASE_MODEL_ATTRIBUTES.contains(&field_name.as_str()) {
            tracing::warn!(
                "Field name \"{field_name}\" in \"{name}\" shadows an attribute in parent \"BaseModel\""
            );
        }
        let (inner, annotated) = peel_annotated(annotation);
        let mut info = annotated.unwrap_or_default();
        match body.namespace.get(field_name) {
            Some(Value::FieldInfo(assigned)) => info.merge(assigned),
            Some(Value::Sentinel(Sentinel::PrivateAttr)) => {
                return Err(ExecError::raise(
                    "NameError",
                    format!(
                        "Private attributes must not use valid field names; use sunder names, e.g. '_{field_name}' or '__{field_name}__'"
                    ),
                ));
            }
            Some(default) => info.merge(&FieldInfo::with_default(default.clone())),
            None => {}
        }
        if info.alias.is_none()
            && let Some(generator) = &config.alias_generator
            && let Some(alias) = apply_alias_generator(interp, generator, field_name)?
        {
            info.validation_alias = Some(alias.clone());
            info.alias = Some(alias);
        }

        let annotation = match resolver.check(&inner) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => inner,
            Err(ConvertError::Undefined(missing)) => {
                tracing::debug!(
                    model = name,
                    field = %field_name,
                    missing = %missing,
                    "deferring forward reference"
                );
                inner
            }
            Err(ConvertError::Invalid(err)) => return Err(err),
        };
        fields.insert(
            field_name.clone(),
            ModelField {
                name: field_name.clone(),
                annotation,
                info,
            },
        );
    }

    for (attr, value) in &body.namespace {
        if is_dunder(attr) || attr.starts_with('_') || body.annotations.contains_key(attr) {
            continue;
        }
        if is_ignored_attribute(value) {
            continue;
        }
        if matches!(value, Value::Sentinel(Sentinel::PrivateAttr)) {
            return Err(ExecError::raise(
                "NameError",
                format!(
                    "Private attributes must not use valid field names; use sunder names, e.g. '_{attr}' or '__{attr}__'"
                ),
            ));
        }
        if inherited.contains(attr) {
            return Err(ExecError::user_error(format!(
                "Field '{attr}' defined on a base class was overridden by a non-annotated attribute. All field definitions, including overrides, require a type annotation."
            )));
        }
        if matches!(value, Value::FieldInfo(_)) {
            return Err(ExecError::user_error(format!(
                "Field '{attr}' requires a type annotation"
            )));
        }
        return Err(ExecError::user_error(format!(
            "A non-annotated attribute was detected: `{attr} = {}`. All model fields require a type annotation; if `{attr}` is not meant to be a field, you may be able to resolve this error by annotating it as a `ClassVar` or updating `model_config['ignored_types']`.",
            value.repr()
        )));
    }

    for value in body.namespace.values() {
        let Value::Decorator(decorator) = value else {
            continue;
        };
        let Some(checked) = decorator.checked_fields() else {
            continue;
        };
        let unknown = checked
            .iter()
            .any(|field| field != "*" && !fields.contains_key(field));
        if unknown {
            let function = decorator.function_name().unwrap_or_default();
            return Err(ExecError::user_error(format!(
                "Decorators defined with incorrect fields: {name}.{function} (use check_fields=False if you're inheriting from the model and intended this)"
            )));
        }
    }

    if root_model && let Some(other) = fields.keys().find(|field| *field != "root") {
        return Err(ExecError::user_error(format!(
            "`RootModel` only supports the `root` field; `{name}` also declares `{other}`"
        )));
    }

    let attrs: Namespace = body
        .namespace
        .into_iter()
        .filter(|(attr, _)| !fields.contains_key(attr))
        .collect();

    let model = ModelClass {
        id: interp.next_class_id(),
        name: name.to_string(),
        doc: body.doc,
        is_root: false,
        root_model,
        parents,
        fields,
        config,
        attrs,
        line,
    };
    tracing::debug!(model = name, fields = model.fields.len(), "model class created");
    Ok(Value::Model(Rc::new(model)))
}

/// `RootModel[T]`: an anonymous root model whose `root` field is `T`.
pub(crate) fn parameterize_root_model(
    interp: &Interpreter,
    base: &Rc<ModelClass>,
    root_type: &Value,
) -> Result<Value, ExecError> {
    let name = format!("{}[{}]", base.name, root_type.repr());
    let (inner, annotated) = peel_annotated(root_type);
    let resolver = TypeResolver::new(interp, &name, None, base.config.arbitrary_types_allowed);
    let annotation = match resolver.check(&inner) {
        Ok(Some(resolved)) => resolved,
        Ok(None) | Err(ConvertError::Undefined(_)) => inner,
        Err(ConvertError::Invalid(err)) => return Err(err),
    };
    let mut fields = IndexMap::new();
    fields.insert(
        "root".to_string(),
        ModelField {
            name: "root".to_string(),
            annotation,
            info: annotated.unwrap_or_default(),
        },
    );
    Ok(Value::Model(Rc::new(ModelClass {
        id: interp.next_class_id(),
        name,
        doc: None,
        is_root: false,
        root_model: true,
        parents: vec![Rc::clone(base)],
        fields,
        config: base.config.clone(),
        attrs: Namespace::new(),
        line: 0,
    })))
}

/// Instantiate a model from keyword arguments.
pub(crate) fn instantiate(
    interp: &Interpreter,
    model: &Rc<ModelClass>,
    mut args: CallArgs,
) -> Result<Value, ExecError> {
    if model.root_model
        && args.positional.len() == 1
        && let Some(root) = args.positional.pop()
    {
        args.keywords.push(("root".to_string(), root));
    }
    if !args.positional.is_empty() {
        return Err(ExecError::type_error(format!(
            "BaseModel.__init__() takes 1 positional argument but {} were given",
            args.positional.len() + 1
        )));
    }
    let mut values = IndexMap::new();
    let mut errors = Vec::new();
    for field in model.fields.values() {
        let key = field.schema_key().to_string();
        let supplied = args
            .take_keyword(&key)
            .or_else(|| args.take_keyword(&field.name));
        if let Some(value) = supplied {
            values.insert(field.name.clone(), value);
        } else if let Some(default) = &field.info.default {
            values.insert(field.name.clone(), default.clone());
        } else if let Some(factory) = &field.info.default_factory {
            if !matches!(factory, Value::Function(_)) {
                let produced = interp.call(factory, CallArgs::default())?;
                values.insert(field.name.clone(), produced);
            }
        } else {
            errors.push(format!("{key}\n  Field required"));
        }
    }
    for (key, value) in std::mem::take(&mut args.keywords) {
        match model.config.extra {
            Some(ExtraMode::Forbid) => {
                errors.push(format!("{key}\n  Extra inputs are not permitted"));
            }
            Some(ExtraMode::Allow) => {
                values.insert(key, value);
            }
            Some(ExtraMode::Ignore) | None => {}
        }
    }
    if !errors.is_empty() {
        let mut message = format!(
            "{} validation error{} for {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            model.name
        );
        for error in errors {
            let _ = write!(message, "\n{error}");
        }
        return Err(ExecError::raise("ValidationError", message));
    }
    Ok(Value::Instance(Rc::new(ModelInstance {
        class: Rc::clone(model),
        values,
    })))
}

fn next_auto_value(kind: EnumKind, name: &str, previous: &[Value]) -> Value {
    if kind == EnumKind::StrEnum {
        return Value::str(name.to_lowercase());
    }
    previous
        .iter()
        .rev()
        .find_map(|value| match value {
            Value::Int(int) => int.checked_add(1),
            Value::Bool(flag) => Some(i128::from(*flag) + 1),
            _ => None,
        })
        .map_or(Value::Int(1), Value::Int)
}

fn coerce_member_value(
    kind: EnumKind,
    mixin: Option<EnumMixin>,
    value: Value,
) -> Result<Value, ExecError> {
    match (kind, mixin) {
        (EnumKind::StrEnum, _) => match value {
            Value::Str(_) => Ok(value),
            other => Err(ExecError::type_error(format!("{} is not a string", other.repr()))),
        },
        (_, Some(EnumMixin::Int)) => match value {
            Value::Int(_) => Ok(value),
            Value::Bool(flag) => Ok(Value::Int(i128::from(flag))),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(float) if float.is_finite() => Ok(Value::Int(float.trunc() as i128)),
            Value::Str(text) => text
                .trim()
                .replace('_', "")
                .parse::<i128>()
                .map(Value::Int)
                .map_err(|_| {
                    ExecError::value_error(format!(
                        "invalid literal for int() with base 10: {}",
                        super::value::str_repr(&text)
                    ))
                }),
            other => Err(ExecError::type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))),
        },
        (_, Some(EnumMixin::Str)) => match value {
            Value::Str(_) => Ok(value),
            other => Ok(Value::str(other.to_str())),
        },
        (_, None) => Ok(value),
    }
}

fn is_member_candidate(name: &str, value: &Value) -> bool {
    let sunder = name.len() > 2 && name.starts_with('_') && name.ends_with('_');
    if is_dunder(name) || sunder || name.starts_with("__") {
        return false;
    }
    !matches!(
        value,
        Value::Function(_)
            | Value::Decorator(_)
            | Value::Type(_)
            | Value::Model(_)
            | Value::Enum(_)
            | Value::Class(_)
    )
}

fn build_enum(
    interp: &Interpreter,
    name: &str,
    bases: &[Value],
    keywords: Vec<(String, Value)>,
    body: ClassBody,
    line: usize,
) -> Result<Value, ExecError> {
    if !keywords.is_empty() {
        return Err(ExecError::type_error(format!(
            "{name}.__init_subclass__() takes no keyword arguments"
        )));
    }
    let mut kind = EnumKind::Enum;
    let mut mixin = None;
    let mut parents = Vec::new();
    for base in bases {
        match base {
            Value::Enum(parent) => {
                if !parent.members.is_empty() {
                    return Err(ExecError::type_error(format!(
                        "<enum '{name}'> cannot extend <enum '{}'>",
                        parent.name
                    )));
                }
                if parent.kind != EnumKind::Enum {
                    kind = parent.kind;
                }
                mixin = mixin.or(parent.mixin);
                parents.push(Rc::clone(parent));
            }
            Value::Type(BuiltinType::Str) => mixin = Some(EnumMixin::Str),
            Value::Type(BuiltinType::Int) => mixin = Some(EnumMixin::Int),
            Value::Type(BuiltinType::Object) | Value::Class(_) => {}
            other => {
                return Err(ExecError::type_error(format!(
                    "unsupported enum mixin {}",
                    class_display_name(other)
                )));
            }
        }
    }

    let id = interp.next_class_id();
    let str_like = matches!(kind, EnumKind::StrEnum | EnumKind::IntEnum);
    let mut members: Vec<Rc<EnumMember>> = Vec::new();
    let mut by_name: IndexMap<String, Rc<EnumMember>> = IndexMap::new();
    let mut seen_values: Vec<Value> = Vec::new();
    let mut attrs = Namespace::new();
    for (member_name, value) in body.namespace {
        if !is_member_candidate(&member_name, &value) {
            attrs.insert(member_name, value);
            continue;
        }
        let raw = match value {
            Value::Sentinel(Sentinel::Auto) => {
                let generated = next_auto_value(kind, &member_name, &seen_values);
                if kind != EnumKind::StrEnum && mixin == Some(EnumMixin::Str) {
                    Value::str(generated.to_str())
                } else {
                    generated
                }
            }
            other => other,
        };
        let value = coerce_member_value(kind, mixin, raw)?;
        seen_values.push(value.clone());
        if let Some(existing) = members.iter().find(|member| py_eq(&member.value, &value)) {
            by_name.insert(member_name, Rc::clone(existing));
            continue;
        }
        let member = Rc::new(EnumMember {
            name: member_name.clone(),
            value,
            owner_id: id,
            owner_name: name.to_string(),
            str_like,
            mixin_value: mixin.is_some(),
        });
        members.push(Rc::clone(&member));
        by_name.insert(member_name, member);
    }

    Ok(Value::Enum(Rc::new(EnumClass {
        id,
        name: name.to_string(),
        doc: body.doc,
        kind,
        mixin,
        is_root: false,
        parents,
        members,
        by_name,
        attrs,
        line,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_values_follow_the_last_integer() {
        assert!(py_eq(&next_auto_value(EnumKind::Enum, "A", &[]), &Value::Int(1)));
        assert!(py_eq(
            &next_auto_value(EnumKind::Enum, "B", &[Value::Int(1), Value::Int(5)]),
            &Value::Int(6)
        ));
        assert!(py_eq(
            &next_auto_value(EnumKind::StrEnum, "Red", &[]),
            &Value::str("red")
        ));
    }

    #[test]
    fn int_mixin_coerces_strings() {
        let value = coerce_member_value(EnumKind::IntEnum, Some(EnumMixin::Int), Value::str("7"))
            .unwrap();
        assert!(py_eq(&value, &Value::Int(7)));
        let err = coerce_member_value(EnumKind::IntEnum, Some(EnumMixin::Int), Value::str("x"))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid literal for int() with base 10: 'x'");
    }

    #[test]
    fn str_enum_rejects_non_strings() {
        let err = coerce_member_value(EnumKind::StrEnum, Some(EnumMixin::Str), Value::Int(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "1 is not a string");
    }

    #[test]
    fn classvar_annotations_are_detected() {
        assert!(is_classvar(&Value::Special(SpecialForm::ClassVar)));
        assert!(is_classvar(&Value::str("ClassVar[int]")));
        assert!(!is_classvar(&Value::Type(BuiltinType::Int)));
    }

    #[test]
    fn config_overrides_keep_key_order() {
        let base = ModelConfig::from_entries(vec![
            ("title".into(), Value::str("A")),
            ("extra".into(), Value::str("forbid")),
        ])
        .unwrap();
        let derived = base
            .extended(vec![("title".into(), Value::str("B"))])
            .unwrap();
        assert_eq!(derived.title.as_deref(), Some("B"));
        assert_eq!(derived.extra, Some(ExtraMode::Forbid));
        assert_eq!(derived.entries.first().map(|(key, _)| key.as_str()), Some("title"));
    }

    #[test]
    fn schema_extra_is_renamed() {
        let config = ModelConfig::default()
            .extended(vec![("schema_extra".into(), Value::dict(Vec::new()))])
            .unwrap();
        assert!(config.json_schema_extra.is_some());
    }

    #[test]
    fn invalid_extra_is_rejected() {
        let err = ModelConfig::from_entries(vec![("extra".into(), Value::str("maybe"))])
            .unwrap_err();
        assert!(err.to_string().contains("'allow', 'forbid' or 'ignore'"));
    }
}
