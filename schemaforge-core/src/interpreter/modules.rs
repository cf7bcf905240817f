//! Built-in module catalog and the guarded loader that serves `import`.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::ExecError;
use super::builtins::{Builtin, ConstraintKind};
use super::classes::{EnumClass, EnumKind, ModelClass};
use super::fields::{ConstraintMeta, Constraints, Number};
use super::value::{BuiltinType, GenericAlias, Module, Namespace, SpecialForm, Value};
use crate::policy::ImportPolicy;

/// Base classes every execution shares: `BaseModel` and the enum roots.
#[derive(Debug, Clone)]
pub struct Roots {
    pub base_model: Rc<ModelClass>,
    pub root_model: Rc<ModelClass>,
    pub enum_base: Rc<EnumClass>,
    pub int_enum: Rc<EnumClass>,
    pub str_enum: Rc<EnumClass>,
}

impl Roots {
    /// Class ids below this value belong to the roots.
    pub const RESERVED_IDS: u64 = 5;

    pub fn new() -> Self {
        let base_model = Rc::new(ModelClass::root(0));
        Self {
            root_model: Rc::new(ModelClass::root_model_base(4, &base_model)),
            base_model,
            enum_base: Rc::new(EnumClass::root(1, EnumKind::Enum)),
            int_enum: Rc::new(EnumClass::root(2, EnumKind::IntEnum)),
            str_enum: Rc::new(EnumClass::root(3, EnumKind::StrEnum)),
        }
    }
}

impl Default for Roots {
    fn default() -> Self {
        Self::new()
    }
}

struct ModuleDef {
    name: &'static str,
    /// Modules this one imports while loading. Each goes through the policy.
    imports: &'static [&'static str],
    build: fn(&Roots) -> Namespace,
}

const CATALOG: &[ModuleDef] = &[
    ModuleDef {
        name: "typing",
        imports: &[],
        build: typing_namespace,
    },
    ModuleDef {
        name: "typing_extensions",
        imports: &["typing"],
        build: typing_namespace,
    },
    ModuleDef {
        name: "collections.abc",
        imports: &[],
        build: collections_abc_namespace,
    },
    ModuleDef {
        name: "datetime",
        imports: &[],
        build: datetime_namespace,
    },
    ModuleDef {
        name: "enum",
        imports: &[],
        build: enum_namespace,
    },
    ModuleDef {
        name: "decimal",
        imports: &[],
        build: decimal_namespace,
    },
    ModuleDef {
        name: "uuid",
        imports: &[],
        build: uuid_namespace,
    },
    ModuleDef {
        name: "annotated_types",
        imports: &["typing"],
        build: annotated_types_namespace,
    },
    ModuleDef {
        name: "pydantic",
        imports: &[
            "typing",
            "typing_extensions",
            "annotated_types",
            "datetime",
            "decimal",
            "uuid",
            "enum",
        ],
        build: pydantic_namespace,
    },
    ModuleDef {
        name: "pydantic.alias_generators",
        imports: &[],
        build: alias_generators_namespace,
    },
];

fn definition(name: &str) -> Option<&'static ModuleDef> {
    CATALOG.iter().find(|def| def.name == name)
}

fn is_package_prefix(name: &str) -> bool {
    CATALOG.iter().any(|def| {
        def.name
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('.'))
    })
}

fn insert_all(names: &mut Namespace, entries: impl IntoIterator<Item = (&'static str, Value)>) {
    for (name, value) in entries {
        names.insert(name.to_string(), value);
    }
}

fn typing_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    for form in [
        SpecialForm::Any,
        SpecialForm::Optional,
        SpecialForm::Union,
        SpecialForm::List,
        SpecialForm::Dict,
        SpecialForm::Set,
        SpecialForm::FrozenSet,
        SpecialForm::Tuple,
        SpecialForm::Literal,
        SpecialForm::Annotated,
        SpecialForm::ClassVar,
        SpecialForm::Type,
        SpecialForm::Sequence,
        SpecialForm::Mapping,
        SpecialForm::Iterable,
        SpecialForm::Callable,
    ] {
        names.insert(form.name().to_string(), Value::Special(form));
    }
    names.insert("AbstractSet".to_string(), Value::Special(SpecialForm::AbstractSet));
    insert_all(
        &mut names,
        [
            ("TYPE_CHECKING", Value::Bool(false)),
            ("NewType", Value::Builtin(Builtin::NewType)),
        ],
    );
    names
}

fn collections_abc_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("Sequence", Value::Special(SpecialForm::Sequence)),
            ("Mapping", Value::Special(SpecialForm::Mapping)),
            ("Iterable", Value::Special(SpecialForm::Iterable)),
            ("Callable", Value::Special(SpecialForm::Callable)),
            ("Set", Value::Special(SpecialForm::AbstractSet)),
        ],
    );
    names
}

fn datetime_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("datetime", Value::Type(BuiltinType::DateTime)),
            ("date", Value::Type(BuiltinType::Date)),
            ("time", Value::Type(BuiltinType::Time)),
            ("timedelta", Value::Type(BuiltinType::TimeDelta)),
        ],
    );
    names
}

fn enum_namespace(roots: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("Enum", Value::Enum(Rc::clone(&roots.enum_base))),
            ("IntEnum", Value::Enum(Rc::clone(&roots.int_enum))),
            ("StrEnum", Value::Enum(Rc::clone(&roots.str_enum))),
            ("auto", Value::Builtin(Builtin::Auto)),
            ("unique", Value::Builtin(Builtin::Unique)),
        ],
    );
    names
}

fn decimal_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    names.insert("Decimal".to_string(), Value::Type(BuiltinType::Decimal));
    names
}

fn uuid_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("UUID", Value::Type(BuiltinType::Uuid)),
            ("uuid4", Value::Builtin(Builtin::Uuid4)),
        ],
    );
    names
}

fn annotated_types_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    for kind in [
        ConstraintKind::Gt,
        ConstraintKind::Ge,
        ConstraintKind::Lt,
        ConstraintKind::Le,
        ConstraintKind::MultipleOf,
        ConstraintKind::MinLen,
        ConstraintKind::MaxLen,
        ConstraintKind::Len,
        ConstraintKind::Interval,
    ] {
        names.insert(kind.name().to_string(), Value::Builtin(Builtin::Constraint(kind)));
    }
    names
}

/// `Annotated[base, Kind(0)]`, the shape of pydantic's signed number aliases.
fn signed(base: BuiltinType, kind: ConstraintKind) -> Value {
    let zero = if base == BuiltinType::Int {
        Number::Int(0)
    } else {
        Number::Float(0.0)
    };
    let mut constraints = Constraints::default();
    match kind {
        ConstraintKind::Gt => constraints.gt = Some(zero),
        ConstraintKind::Ge => constraints.ge = Some(zero),
        ConstraintKind::Lt => constraints.lt = Some(zero),
        _ => constraints.le = Some(zero),
    }
    Value::Generic(Rc::new(GenericAlias {
        origin: SpecialForm::Annotated,
        args: vec![
            Value::Type(base),
            Value::Constraint(Rc::new(ConstraintMeta::new(kind.name(), constraints))),
        ],
        builtin_spelling: false,
    }))
}

fn pydantic_namespace(roots: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("BaseModel", Value::Model(Rc::clone(&roots.base_model))),
            ("RootModel", Value::Model(Rc::clone(&roots.root_model))),
            ("Field", Value::Builtin(Builtin::Field)),
            ("ConfigDict", Value::Builtin(Builtin::ConfigDict)),
            ("PrivateAttr", Value::Builtin(Builtin::PrivateAttr)),
            ("field_validator", Value::Builtin(Builtin::FieldValidator)),
            ("model_validator", Value::Builtin(Builtin::ModelValidator)),
            ("validator", Value::Builtin(Builtin::Validator)),
            ("root_validator", Value::Builtin(Builtin::RootValidator)),
            ("computed_field", Value::Builtin(Builtin::ComputedField)),
            ("field_serializer", Value::Builtin(Builtin::FieldSerializer)),
            ("model_serializer", Value::Builtin(Builtin::ModelSerializer)),
            ("conint", Value::Builtin(Builtin::ConInt)),
            ("confloat", Value::Builtin(Builtin::ConFloat)),
            ("constr", Value::Builtin(Builtin::ConStr)),
            ("conlist", Value::Builtin(Builtin::ConList)),
            ("conset", Value::Builtin(Builtin::ConSet)),
            ("conbytes", Value::Builtin(Builtin::ConBytes)),
            ("condecimal", Value::Builtin(Builtin::ConDecimal)),
            ("PositiveInt", signed(BuiltinType::Int, ConstraintKind::Gt)),
            ("NegativeInt", signed(BuiltinType::Int, ConstraintKind::Lt)),
            ("NonNegativeInt", signed(BuiltinType::Int, ConstraintKind::Ge)),
            ("NonPositiveInt", signed(BuiltinType::Int, ConstraintKind::Le)),
            ("PositiveFloat", signed(BuiltinType::Float, ConstraintKind::Gt)),
            ("NegativeFloat", signed(BuiltinType::Float, ConstraintKind::Lt)),
            ("NonNegativeFloat", signed(BuiltinType::Float, ConstraintKind::Ge)),
            ("NonPositiveFloat", signed(BuiltinType::Float, ConstraintKind::Le)),
            ("StrictStr", Value::Type(BuiltinType::StrictStr)),
            ("StrictInt", Value::Type(BuiltinType::StrictInt)),
            ("StrictFloat", Value::Type(BuiltinType::StrictFloat)),
            ("StrictBool", Value::Type(BuiltinType::StrictBool)),
            ("HttpUrl", Value::Type(BuiltinType::HttpUrl)),
            ("AnyUrl", Value::Type(BuiltinType::AnyUrl)),
            ("SecretStr", Value::Type(BuiltinType::SecretStr)),
        ],
    );
    names
}

fn alias_generators_namespace(_: &Roots) -> Namespace {
    let mut names = Namespace::new();
    insert_all(
        &mut names,
        [
            ("to_camel", Value::Builtin(Builtin::ToCamel)),
            ("to_pascal", Value::Builtin(Builtin::ToPascal)),
            ("to_snake", Value::Builtin(Builtin::ToSnake)),
        ],
    );
    names
}

/// Serves imports for one interpreter. Every request, including the imports a
/// catalog module performs while loading, is checked against the policy.
#[derive(Debug)]
pub struct ModuleLoader {
    policy: Arc<dyn ImportPolicy>,
    roots: Roots,
    cache: RefCell<FxHashMap<String, Rc<Module>>>,
}

impl ModuleLoader {
    pub fn new(policy: Arc<dyn ImportPolicy>) -> Self {
        Self {
            policy,
            roots: Roots::new(),
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn policy(&self) -> &Arc<dyn ImportPolicy> {
        &self.policy
    }

    /// Import `name` (possibly dotted) and return the leaf module.
    pub fn import(&self, name: &str) -> Result<Rc<Module>, ExecError> {
        self.policy.check(name)?;
        self.load(name)
    }

    /// The already-loaded module bound by `import a.b.c` (that is, `a`).
    pub fn loaded(&self, name: &str) -> Option<Rc<Module>> {
        self.cache.borrow().get(name).cloned()
    }

    /// Names of every module loaded so far, sorted.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    fn load(&self, name: &str) -> Result<Rc<Module>, ExecError> {
        if let Some(module) = self.loaded(name) {
            return Ok(module);
        }
        let parent = match name.rsplit_once('.') {
            Some((parent, _)) => Some(self.load_package(parent, name)?),
            None => None,
        };
        let def = definition(name).ok_or_else(|| ExecError::module_not_found(name))?;
        for dependency in def.imports {
            self.import(dependency)?;
        }
        let module = Rc::new(Module::new(name, (def.build)(&self.roots)));
        tracing::trace!(module = name, "module loaded");
        if let (Some(parent), Some((_, leaf))) = (parent, name.rsplit_once('.')) {
            parent
                .attrs
                .borrow_mut()
                .insert(leaf.to_string(), Value::Module(Rc::clone(&module)));
        }
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&module));
        Ok(module)
    }

    /// Parent packages are loaded without consulting the policy, so an
    /// allowlisted submodule does not require its parent to be listed.
    fn load_package(&self, package: &str, requested: &str) -> Result<Rc<Module>, ExecError> {
        if definition(package).is_some() {
            return self.load(package);
        }
        if let Some(module) = self.loaded(package) {
            return Ok(module);
        }
        if !is_package_prefix(package) {
            let missing = package.split('.').next().unwrap_or(package);
            return Err(ExecError::module_not_found(if is_package_prefix(missing)
                || definition(missing).is_some()
            {
                requested
            } else {
                missing
            }));
        }
        let grandparent = match package.rsplit_once('.') {
            Some((grandparent, _)) => Some(self.load_package(grandparent, requested)?),
            None => None,
        };
        let shell = Rc::new(Module::new(package, Namespace::new()));
        if let (Some(grandparent), Some((_, leaf))) = (grandparent, package.rsplit_once('.')) {
            grandparent
                .attrs
                .borrow_mut()
                .insert(leaf.to_string(), Value::Module(Rc::clone(&shell)));
        }
        self.cache
            .borrow_mut()
            .insert(package.to_string(), Rc::clone(&shell));
        Ok(shell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AllowlistPolicy;

    fn loader(modules: &[&str]) -> ModuleLoader {
        ModuleLoader::new(Arc::new(AllowlistPolicy::new(modules.iter().copied())))
    }

    #[test]
    fn pydantic_exports_base_model() {
        let loader = loader(schemaforge_config::DEFAULT_ALLOWED_MODULES);
        let module = loader.import("pydantic").unwrap();
        assert!(matches!(module.get("BaseModel"), Some(Value::Model(model)) if model.is_root));
        assert!(matches!(
            module.get("RootModel"),
            Some(Value::Model(model)) if model.is_root && model.root_model
        ));
    }

    #[test]
    fn transitive_imports_are_guarded() {
        let loader = loader(&["pydantic"]);
        let err = loader.import("pydantic").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Import of 'typing' is not allowed. Only pydantic, typing, and standard lib types are permitted."
        );
    }

    #[test]
    fn submodule_attaches_to_its_package() {
        let loader = loader(schemaforge_config::DEFAULT_ALLOWED_MODULES);
        loader.import("collections.abc").unwrap();
        let package = loader.loaded("collections").unwrap();
        assert!(matches!(package.get("abc"), Some(Value::Module(_))));
    }

    #[test]
    fn unknown_modules_are_reported() {
        let mut allowed = schemaforge_config::DEFAULT_ALLOWED_MODULES.to_vec();
        allowed.push("json");
        let loader = loader(&allowed);
        let err = loader.import("json").unwrap_err();
        assert_eq!(err.to_string(), "No module named 'json'");
        let err = loader.import("pydantic.nothing").unwrap_err();
        assert_eq!(err.to_string(), "No module named 'pydantic.nothing'");
    }

    #[test]
    fn modules_are_cached() {
        let loader = loader(schemaforge_config::DEFAULT_ALLOWED_MODULES);
        let first = loader.import("enum").unwrap();
        let second = loader.import("enum").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
