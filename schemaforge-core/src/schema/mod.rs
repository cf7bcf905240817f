//! JSON Schema derivation for declared models.
//!
//! Output follows the modeling library's validation-mode conventions: nested
//! models and enums live under `$defs` and are referenced with `$ref`, unions
//! become `anyOf`, field titles are generated from names, and every object is
//! key-sorted except `properties` and `default`.

pub mod defaults;
pub mod sort;
pub mod types;

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value as Json, json};

use crate::interpreter::ExecError;
use crate::interpreter::classes::{EnumClass, ExtraMode, ModelClass, ModelField};
use crate::interpreter::fields::{Constraints, FieldInfo};
use crate::interpreter::text::py_title;
use crate::interpreter::value::Value;

use self::types::{ConvertError, ForwardResolver, TypeExpr, TypeResolver};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error(
        "`{model}` is not fully defined; you should define `{missing}`, then call `{model}.model_rebuild()`."
    )]
    NotFullyDefined { model: String, missing: String },
    #[error("Cannot generate a JsonSchema for {0}")]
    Unsupported(String),
    #[error(transparent)]
    Invalid(#[from] ExecError),
}

/// Derive the validation-mode JSON Schema of `model`.
pub fn model_json_schema(
    model: &Rc<ModelClass>,
    resolver: &dyn ForwardResolver,
) -> Result<Json, SchemaError> {
    let mut generator = SchemaGenerator::new(resolver, &model.name);
    let schema = generator.generate(model)?;
    tracing::debug!(
        model = %model.name,
        definitions = generator.defs.len(),
        "schema generated"
    );
    Ok(sort::sort_schema(schema))
}

/// `inspect.cleandoc`: trim blank edges and the common indentation.
pub fn clean_doc(doc: &str) -> String {
    let expanded = doc.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();
    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut cleaned: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if index == 0 {
                line.trim_start().to_string()
            } else {
                line.get(margin..).unwrap_or("").trim_end().to_string()
            }
        })
        .collect();
    while cleaned.first().is_some_and(|line| line.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

/// `first_name` → `First Name`
fn title_from_name(name: &str) -> String {
    py_title(name).replace('_', " ").trim().to_string()
}

fn object(value: Json) -> Map<String, Json> {
    match value {
        Json::Object(map) => map,
        _ => Map::new(),
    }
}

/// JSON type name shared by every value, if any.
fn common_type(values: &[Json]) -> Option<&'static str> {
    let mut names = values.iter().map(|value| match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(number) if number.is_f64() => "number",
        Json::Number(_) => "integer",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    });
    let first = names.next()?;
    names.all(|name| name == first).then_some(first)
}

fn apply_constraints(schema: &mut Map<String, Json>, constraints: &Constraints, ty: &TypeExpr) {
    if constraints.is_empty() {
        return;
    }
    match ty {
        TypeExpr::Union(members) => {
            if let Some(Json::Array(branches)) = schema.get_mut("anyOf") {
                let targets = members.iter().filter(|member| !matches!(member, TypeExpr::Null));
                for (branch, member) in branches.iter_mut().zip(targets) {
                    if let Json::Object(branch) = branch {
                        apply_constraints(branch, constraints, member);
                    }
                }
            }
        }
        TypeExpr::Constrained(inner, _) => apply_constraints(schema, constraints, inner),
        TypeExpr::Decimal => {
            if let Some(Json::Array(branches)) = schema.get_mut("anyOf")
                && let Some(Json::Object(number)) = branches.first_mut()
            {
                apply_constraints(number, constraints, &TypeExpr::Float);
            }
        }
        TypeExpr::Int | TypeExpr::Float => {
            let bounds = [
                ("exclusiveMinimum", constraints.gt),
                ("minimum", constraints.ge),
                ("exclusiveMaximum", constraints.lt),
                ("maximum", constraints.le),
                ("multipleOf", constraints.multiple_of),
            ];
            for (key, bound) in bounds {
                if let Some(bound) = bound {
                    schema.insert(key.to_string(), bound.to_json());
                }
            }
        }
        TypeExpr::Str | TypeExpr::Bytes | TypeExpr::Url { .. } | TypeExpr::Secret => {
            if let Some(min) = constraints.min_length {
                schema.insert("minLength".to_string(), json!(min));
            }
            if let Some(max) = constraints.max_length {
                schema.insert("maxLength".to_string(), json!(max));
            }
            if let Some(pattern) = &constraints.pattern {
                schema.insert("pattern".to_string(), json!(pattern));
            }
        }
        TypeExpr::List(_) | TypeExpr::Set(_) | TypeExpr::Tuple(_) | TypeExpr::Variadic(_) => {
            if let Some(min) = constraints.min_length {
                schema.insert("minItems".to_string(), json!(min));
            }
            if let Some(max) = constraints.max_length {
                schema.insert("maxItems".to_string(), json!(max));
            }
        }
        TypeExpr::Dict(..) => {
            if let Some(min) = constraints.min_length {
                schema.insert("minProperties".to_string(), json!(min));
            }
            if let Some(max) = constraints.max_length {
                schema.insert("maxProperties".to_string(), json!(max));
            }
        }
        other => {
            tracing::debug!(?constraints, ty = ?other, "constraints do not apply to this type");
        }
    }
}

/// Merge a `json_schema_extra` dict into `schema`.
fn apply_extra(schema: &mut Map<String, Json>, extra: Option<&Value>, owner: &str) {
    let Some(extra) = extra else {
        return;
    };
    match defaults::to_json(extra) {
        Some(Json::Object(entries)) => schema.extend(entries),
        _ => tracing::warn!(
            owner,
            extra = %extra.repr(),
            "json_schema_extra must be a JSON-serialisable dict; ignoring it"
        ),
    }
}

struct SchemaGenerator<'a> {
    resolver: &'a dyn ForwardResolver,
    root_name: &'a str,
    defs: IndexMap<String, Json>,
    /// Class id → key under `$defs`.
    def_names: FxHashMap<u64, String>,
    referenced: FxHashSet<u64>,
}

impl<'a> SchemaGenerator<'a> {
    fn new(resolver: &'a dyn ForwardResolver, root_name: &'a str) -> Self {
        Self {
            resolver,
            root_name,
            defs: IndexMap::new(),
            def_names: FxHashMap::default(),
            referenced: FxHashSet::default(),
        }
    }

    /// Reserve a `$defs` key for a class. The flag is true on first sight.
    fn def_name(&mut self, id: u64, name: &str) -> (String, bool) {
        if let Some(existing) = self.def_names.get(&id) {
            return (existing.clone(), false);
        }
        let mut candidate = name.to_string();
        let mut suffix = 2;
        while self.def_names.values().any(|taken| *taken == candidate) {
            candidate = format!("{name}__{suffix}");
            suffix += 1;
        }
        self.def_names.insert(id, candidate.clone());
        (candidate, true)
    }

    fn reference(name: &str) -> Map<String, Json> {
        object(json!({ "$ref": format!("#/$defs/{name}") }))
    }

    fn generate(&mut self, root: &Rc<ModelClass>) -> Result<Json, SchemaError> {
        let (name, _) = self.def_name(root.id, &root.name);
        self.defs.insert(name.clone(), Json::Null);
        let schema = self.model_schema(root)?;
        if self.referenced.contains(&root.id) {
            self.defs.insert(name.clone(), Json::Object(schema));
            return Ok(json!({ "$defs": self.defs_object(), "$ref": format!("#/$defs/{name}") }));
        }
        self.defs.shift_remove(&name);
        let mut schema = schema;
        if !self.defs.is_empty() {
            schema.insert("$defs".to_string(), Json::Object(self.defs_object()));
        }
        Ok(Json::Object(schema))
    }

    fn defs_object(&self) -> Map<String, Json> {
        self.defs
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn model_ref(&mut self, model: &Rc<ModelClass>) -> Result<Map<String, Json>, SchemaError> {
        let (name, fresh) = self.def_name(model.id, &model.name);
        self.referenced.insert(model.id);
        if fresh {
            self.defs.insert(name.clone(), Json::Null);
            let schema = self.model_schema(model)?;
            self.defs.insert(name.clone(), Json::Object(schema));
        }
        Ok(Self::reference(&name))
    }

    fn enum_ref(&mut self, class: &Rc<EnumClass>) -> Map<String, Json> {
        let (name, fresh) = self.def_name(class.id, &class.name);
        if fresh {
            let values: Vec<Json> = class
                .members
                .iter()
                .map(|member| {
                    defaults::to_json(&member.value)
                        .unwrap_or_else(|| Json::String(member.value.to_str()))
                })
                .collect();
            let mut schema = Map::new();
            if let Some(ty) = common_type(&values) {
                schema.insert("type".to_string(), json!(ty));
            }
            schema.insert("enum".to_string(), Json::Array(values));
            schema.insert("title".to_string(), json!(class.name));
            if let Some(doc) = class.doc.as_deref().map(clean_doc).filter(|doc| !doc.is_empty()) {
                schema.insert("description".to_string(), json!(doc));
            }
            self.defs.insert(name.clone(), Json::Object(schema));
        }
        Self::reference(&name)
    }

    fn model_schema(&mut self, model: &Rc<ModelClass>) -> Result<Map<String, Json>, SchemaError> {
        let owner = Value::Model(Rc::clone(model));
        let resolver = TypeResolver::new(
            self.resolver,
            &model.name,
            Some(&owner),
            model.config.arbitrary_types_allowed,
        );
        let root_name = self.root_name;
        let convert = |field: &ModelField| {
            resolver.convert(&field.annotation).map_err(|err| match err {
                ConvertError::Undefined(missing) => SchemaError::NotFullyDefined {
                    model: root_name.to_string(),
                    missing,
                },
                ConvertError::Invalid(err) => SchemaError::Invalid(err),
            })
        };
        if model.root_model {
            let mut schema = match model.fields.get("root") {
                Some(field) => {
                    let ty = convert(field)?;
                    self.root_field_schema(field, &ty)?
                }
                None => Map::new(),
            };
            let title = model.config.title.clone().unwrap_or_else(|| model.name.clone());
            schema.insert("title".to_string(), json!(title));
            if let Some(doc) = model.doc.as_deref().map(clean_doc).filter(|doc| !doc.is_empty()) {
                schema.insert("description".to_string(), json!(doc));
            }
            apply_extra(&mut schema, model.config.json_schema_extra.as_ref(), &model.name);
            return Ok(schema);
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in model.fields.values() {
            let ty = convert(field)?;
            let schema = self.field_schema(field, &ty)?;
            let key = field.schema_key().to_string();
            if field.info.is_required() {
                required.push(Json::String(key.clone()));
            }
            properties.insert(key, Json::Object(schema));
        }

        let mut schema = Map::new();
        schema.insert("properties".to_string(), Json::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Json::Array(required));
        }
        let title = model.config.title.clone().unwrap_or_else(|| model.name.clone());
        schema.insert("title".to_string(), json!(title));
        schema.insert("type".to_string(), json!("object"));
        if let Some(doc) = model.doc.as_deref().map(clean_doc).filter(|doc| !doc.is_empty()) {
            schema.insert("description".to_string(), json!(doc));
        }
        match model.config.extra {
            Some(ExtraMode::Forbid) => {
                schema.insert("additionalProperties".to_string(), json!(false));
            }
            Some(ExtraMode::Allow) => {
                schema.insert("additionalProperties".to_string(), json!(true));
            }
            Some(ExtraMode::Ignore) | None => {}
        }
        apply_extra(&mut schema, model.config.json_schema_extra.as_ref(), &model.name);
        Ok(schema)
    }

    fn field_schema(
        &mut self,
        field: &ModelField,
        ty: &TypeExpr,
    ) -> Result<Map<String, Json>, SchemaError> {
        let info = &field.info;
        let mut schema = self.type_schema(ty)?;
        apply_constraints(&mut schema, &info.constraints, ty);
        Self::apply_metadata(&mut schema, info);
        if info.title.is_none() && !ty.is_reference() {
            schema.insert("title".to_string(), json!(title_from_name(field.schema_key())));
        }
        if let Some(default) = &info.default {
            match defaults::to_json(default) {
                Some(json) => {
                    schema.insert("default".to_string(), json);
                }
                None => tracing::warn!(
                    field = %field.name,
                    "Default value {} is not JSON serializable; excluding default from JSON schema",
                    default.repr()
                ),
            }
        }
        apply_extra(&mut schema, info.json_schema_extra.as_ref(), &field.name);
        Ok(schema)
    }

    /// The `root` field of a root model: its type schema without a field title.
    fn root_field_schema(
        &mut self,
        field: &ModelField,
        ty: &TypeExpr,
    ) -> Result<Map<String, Json>, SchemaError> {
        let info = &field.info;
        let mut schema = self.type_schema(ty)?;
        apply_constraints(&mut schema, &info.constraints, ty);
        Self::apply_metadata(&mut schema, info);
        if let Some(default) = info.default.as_ref().and_then(defaults::to_json) {
            schema.insert("default".to_string(), default);
        }
        Ok(schema)
    }

    /// Title, description, examples and deprecation from field metadata.
    fn apply_metadata(schema: &mut Map<String, Json>, info: &FieldInfo) {
        if let Some(title) = &info.title {
            schema.insert("title".to_string(), json!(title));
        }
        if let Some(description) = &info.description {
            schema.insert("description".to_string(), json!(description));
        }
        if let Some(examples) = &info.examples {
            match defaults::to_json(examples) {
                Some(json) => {
                    schema.insert("examples".to_string(), json);
                }
                None => tracing::warn!(
                    examples = %examples.repr(),
                    "examples are not JSON serializable"
                ),
            }
        }
        if info.deprecated.as_ref().is_some_and(Value::is_truthy) {
            schema.insert("deprecated".to_string(), json!(true));
        }
    }

    fn union_schema(&mut self, members: &[TypeExpr]) -> Result<Map<String, Json>, SchemaError> {
        let nullable = members.iter().any(|member| matches!(member, TypeExpr::Null));
        let mut branches = Vec::with_capacity(members.len());
        for member in members.iter().filter(|member| !matches!(member, TypeExpr::Null)) {
            let schema = self.type_schema(member)?;
            // Nested unions are flattened.
            match schema.get("anyOf") {
                Some(Json::Array(inner)) if schema.len() == 1 => {
                    branches.extend(inner.iter().cloned());
                }
                _ => branches.push(Json::Object(schema)),
            }
        }
        if nullable {
            branches.push(json!({ "type": "null" }));
        }
        match <[Json; 1]>::try_from(branches) {
            Ok([single]) => Ok(object(single)),
            Err(branches) => Ok(object(json!({ "anyOf": branches }))),
        }
    }

    fn dict_schema(
        &mut self,
        key: &TypeExpr,
        value: &TypeExpr,
    ) -> Result<Map<String, Json>, SchemaError> {
        let mut key_schema = self.type_schema(key)?;
        if let TypeExpr::Constrained(inner, info) = key {
            apply_constraints(&mut key_schema, &info.constraints, inner);
        }
        let value_schema = self.type_schema(value)?;
        let mut schema = Map::new();
        let key_pattern = if key_schema.contains_key("$ref") {
            None
        } else {
            key_schema.remove("title");
            key_schema.remove("pattern")
        };
        let value_json = if value_schema.is_empty() {
            json!(true)
        } else {
            Json::Object(value_schema)
        };
        match key_pattern {
            Some(Json::String(pattern)) => {
                let mut pattern_properties = Map::new();
                pattern_properties.insert(pattern, value_json);
                schema.insert("patternProperties".to_string(), Json::Object(pattern_properties));
            }
            _ => {
                schema.insert("additionalProperties".to_string(), value_json);
            }
        }
        let is_string_key = key_schema.get("type") == Some(&json!("string"));
        if (is_string_key && key_schema.len() > 1) || key_schema.contains_key("$ref") {
            key_schema.remove("type");
            schema.insert("propertyNames".to_string(), Json::Object(key_schema));
        }
        schema.insert("type".to_string(), json!("object"));
        Ok(schema)
    }

    fn type_schema(&mut self, ty: &TypeExpr) -> Result<Map<String, Json>, SchemaError> {
        let schema = match ty {
            TypeExpr::Any => Map::new(),
            TypeExpr::Null => object(json!({ "type": "null" })),
            TypeExpr::Str => object(json!({ "type": "string" })),
            TypeExpr::Int => object(json!({ "type": "integer" })),
            TypeExpr::Float => object(json!({ "type": "number" })),
            TypeExpr::Bool => object(json!({ "type": "boolean" })),
            TypeExpr::Bytes => object(json!({ "format": "binary", "type": "string" })),
            TypeExpr::DateTime => object(json!({ "format": "date-time", "type": "string" })),
            TypeExpr::Date => object(json!({ "format": "date", "type": "string" })),
            TypeExpr::Time => object(json!({ "format": "time", "type": "string" })),
            TypeExpr::TimeDelta => object(json!({ "format": "duration", "type": "string" })),
            TypeExpr::Decimal => {
                object(json!({ "anyOf": [{ "type": "number" }, { "type": "string" }] }))
            }
            TypeExpr::Uuid => object(json!({ "format": "uuid", "type": "string" })),
            TypeExpr::Url { max_length } => {
                let mut schema =
                    object(json!({ "format": "uri", "minLength": 1, "type": "string" }));
                if let Some(max) = max_length {
                    schema.insert("maxLength".to_string(), json!(max));
                }
                schema
            }
            TypeExpr::Secret => {
                object(json!({ "format": "password", "type": "string", "writeOnly": true }))
            }
            TypeExpr::List(item) | TypeExpr::Variadic(item) => {
                let items = self.type_schema(item)?;
                object(json!({ "items": items, "type": "array" }))
            }
            TypeExpr::Set(item) => {
                let items = self.type_schema(item)?;
                object(json!({ "items": items, "type": "array", "uniqueItems": true }))
            }
            TypeExpr::Tuple(items) => {
                let mut schema = Map::new();
                if !items.is_empty() {
                    let prefix = items
                        .iter()
                        .map(|item| self.type_schema(item).map(Json::Object))
                        .collect::<Result<Vec<_>, _>>()?;
                    schema.insert("prefixItems".to_string(), Json::Array(prefix));
                }
                schema.insert("maxItems".to_string(), json!(items.len()));
                schema.insert("minItems".to_string(), json!(items.len()));
                schema.insert("type".to_string(), json!("array"));
                schema
            }
            TypeExpr::Dict(key, value) => self.dict_schema(key, value)?,
            TypeExpr::Union(members) => self.union_schema(members)?,
            TypeExpr::Literal(values) => {
                let values: Vec<Json> = values
                    .iter()
                    .map(|value| {
                        defaults::to_json(value).ok_or_else(|| {
                            SchemaError::Unsupported(format!(
                                "core_schema.LiteralSchema ({})",
                                value.repr()
                            ))
                        })
                    })
                    .collect::<Result<_, _>>()?;
                let mut schema = Map::new();
                if let Some(ty) = common_type(&values) {
                    schema.insert("type".to_string(), json!(ty));
                }
                match <[Json; 1]>::try_from(values) {
                    Ok([single]) => {
                        schema.insert("const".to_string(), single);
                    }
                    Err(values) => {
                        schema.insert("enum".to_string(), Json::Array(values));
                    }
                }
                schema
            }
            TypeExpr::Model(model) => self.model_ref(model)?,
            TypeExpr::Enum(class) => self.enum_ref(class),
            TypeExpr::Constrained(inner, info) => {
                let mut schema = self.type_schema(inner)?;
                apply_constraints(&mut schema, &info.constraints, inner);
                Self::apply_metadata(&mut schema, info);
                schema
            }
            TypeExpr::Unsupported(what) => return Err(SchemaError::Unsupported(what.clone())),
        };
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docstrings_are_cleaned() {
        let doc = "\n    A user.\n\n    With details.\n    ";
        assert_eq!(clean_doc(doc), "A user.\n\nWith details.");
        assert_eq!(clean_doc("One line."), "One line.");
    }

    #[test]
    fn titles_come_from_names() {
        assert_eq!(title_from_name("first_name"), "First Name");
        assert_eq!(title_from_name("userID"), "Userid");
        assert_eq!(title_from_name("_x"), "X");
    }

    #[test]
    fn literal_types_must_agree() {
        assert_eq!(common_type(&[json!("a"), json!("b")]), Some("string"));
        assert_eq!(common_type(&[json!(1), json!(true)]), None);
        assert_eq!(common_type(&[json!(1.5)]), Some("number"));
    }
}
