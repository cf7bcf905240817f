//! Statement execution and expression evaluation.

use std::rc::Rc;

use super::builtins::{self, Builtin, CallArgs};
use super::classes::{self, ClassBody};
use super::ops;
use super::typing;
use super::value::{BuiltinType, ExceptionValue, Function, SpecialForm, Value};
use super::{DeclarationObserver, ExecError, Interpreter};
use crate::syntax::ast::{
    BoolOp, ClassDef, Constant, Expr, ExprKind, FunctionDef, ImportTargets, Keyword, Stmt,
    StmtKind,
};

/// Where names are looked up and bound.
pub(crate) enum Scope<'a> {
    Module,
    Class(&'a mut ClassBody),
    /// Evaluating a string annotation. `owner_name` refers to `owner`, or is
    /// undefined while the owner is still being built.
    Forward {
        owner_name: &'a str,
        owner: Option<&'a Value>,
    },
}

fn constant(value: &Constant) -> Value {
    match value {
        Constant::None => Value::None,
        Constant::Bool(flag) => Value::Bool(*flag),
        Constant::Int(int) => Value::Int(*int),
        Constant::Float(float) => Value::Float(*float),
        Constant::Str(text) => Value::str(text),
        Constant::Bytes(bytes) => Value::Bytes(Rc::from(bytes.as_slice())),
        Constant::Ellipsis => Value::Ellipsis,
    }
}

fn docstring(body: &[Stmt]) -> Option<String> {
    match body.first().map(|stmt| &stmt.kind) {
        Some(StmtKind::Expr(Expr {
            kind: ExprKind::Constant(Constant::Str(text)),
            ..
        })) => Some(text.clone()),
        _ => None,
    }
}

fn index_of(len: usize, index: &Value, what: &str) -> Result<usize, ExecError> {
    let raw = match index {
        Value::Int(int) => *int,
        Value::Bool(flag) => i128::from(*flag),
        other => {
            return Err(ExecError::type_error(format!(
                "{what} indices must be integers or slices, not {}",
                other.type_name()
            )));
        }
    };
    let len_i = i128::try_from(len).unwrap_or(i128::MAX);
    let resolved = if raw < 0 { raw + len_i } else { raw };
    usize::try_from(resolved)
        .ok()
        .filter(|position| *position < len)
        .ok_or_else(|| ExecError::raise("IndexError", format!("{what} index out of range")))
}

impl Interpreter {
    fn lookup(&self, name: &str, scope: &Scope<'_>) -> Result<Value, ExecError> {
        match scope {
            Scope::Class(body) => {
                if let Some(value) = body.namespace.get(name) {
                    return Ok(value.clone());
                }
            }
            Scope::Forward { owner_name, owner } if *owner_name == name => {
                return owner.cloned().ok_or_else(|| ExecError::name_error(name));
            }
            _ => {}
        }
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .cloned()
            .ok_or_else(|| ExecError::name_error(name))
    }

    fn bind_name(&mut self, scope: &mut Scope<'_>, name: &str, value: Value) {
        match scope {
            Scope::Class(body) => {
                body.namespace.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn assign(
        &mut self,
        scope: &mut Scope<'_>,
        target: &Expr,
        value: Value,
    ) -> Result<(), ExecError> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.bind_name(scope, name, value);
                Ok(())
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => {
                let items = builtins::iterate(&value)?;
                if items.len() < targets.len() {
                    return Err(ExecError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(ExecError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(scope, target, item)?;
                }
                Ok(())
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                Err(ExecError::attribute_error(format!(
                    "'{}' object attribute '{attr}' is read-only",
                    object.type_name()
                )))
            }
            ExprKind::Subscript { value: object, .. } => {
                let object = self.eval(object, scope)?;
                Err(ExecError::type_error(format!(
                    "'{}' object does not support item assignment",
                    object.type_name()
                )))
            }
            _ => Err(ExecError::raise(
                "SyntaxError",
                "cannot assign to expression",
            )),
        }
    }

    pub(super) fn exec_stmt(
        &mut self,
        stmt: &Stmt,
        scope: &mut Scope<'_>,
        observer: &mut dyn DeclarationObserver,
    ) -> Result<(), ExecError> {
        self.budget.tick()?;
        self.exec_kind(stmt, scope, observer)
            .map_err(|err| err.at_line(stmt.line))
    }

    fn exec_kind(
        &mut self,
        stmt: &Stmt,
        scope: &mut Scope<'_>,
        observer: &mut dyn DeclarationObserver,
    ) -> Result<(), ExecError> {
        match &stmt.kind {
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let leaf = self.loader.import(&alias.name)?;
                    match &alias.asname {
                        Some(asname) => self.bind_name(scope, asname, Value::Module(leaf)),
                        None => {
                            let top = alias.name.split('.').next().unwrap_or(&alias.name);
                            let module = self.loader.loaded(top).unwrap_or(leaf);
                            self.bind_name(scope, top, Value::Module(module));
                        }
                    }
                }
                Ok(())
            }
            StmtKind::ImportFrom {
                module,
                level,
                names,
            } => {
                if *level > 0 {
                    return Err(ExecError::import_error(
                        "attempted relative import with no known parent package",
                    ));
                }
                let Some(module_name) = module else {
                    return Err(ExecError::import_error(
                        "attempted relative import with no known parent package",
                    ));
                };
                let module = self.loader.import(module_name)?;
                match names {
                    ImportTargets::Star => {
                        let exported: Vec<(String, Value)> = module
                            .attrs
                            .borrow()
                            .iter()
                            .filter(|(name, _)| !name.starts_with('_'))
                            .map(|(name, value)| (name.clone(), value.clone()))
                            .collect();
                        for (name, value) in exported {
                            self.bind_name(scope, &name, value);
                        }
                    }
                    ImportTargets::Names(aliases) => {
                        for alias in aliases {
                            let value = match module.get(&alias.name) {
                                Some(value) => value,
                                None => {
                                    let submodule = format!("{module_name}.{}", alias.name);
                                    self.loader
                                        .import(&submodule)
                                        .map(Value::Module)
                                        .map_err(|err| match err {
                                            ExecError::ImportDenied(_) => err,
                                            _ => ExecError::import_error(format!(
                                                "cannot import name '{}' from '{module_name}'",
                                                alias.name
                                            )),
                                        })?
                                }
                            };
                            let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                            self.bind_name(scope, bound, value);
                        }
                    }
                }
                Ok(())
            }
            StmtKind::ClassDef(def) => {
                let value = self.exec_class(def, stmt.line, &*scope, observer)?;
                self.bind_name(scope, &def.name, value.clone());
                if matches!(scope, Scope::Module) {
                    observer.class_declared(&def.name, &value, stmt.line);
                }
                Ok(())
            }
            StmtKind::FunctionDef(def) => {
                let value = self.exec_function(def, stmt.line, scope)?;
                self.bind_name(scope, &def.name, value);
                Ok(())
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(scope, target, value.clone())?;
                }
                Ok(())
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let annotation = self.eval(annotation, scope)?;
                let value = match value {
                    Some(expr) => Some(self.eval(expr, scope)?),
                    None => None,
                };
                if let (Scope::Class(body), ExprKind::Name(name)) = (&mut *scope, &target.kind) {
                    body.annotations.insert(name.clone(), annotation);
                }
                if let Some(value) = value {
                    self.assign(scope, target, value)?;
                }
                Ok(())
            }
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.is_truthy() {
                    body
                } else {
                    orelse
                };
                for inner in branch {
                    self.exec_stmt(inner, scope, observer)?;
                }
                Ok(())
            }
            StmtKind::Raise { exc, .. } => {
                let Some(exc) = exc else {
                    return Err(ExecError::raise(
                        "RuntimeError",
                        "No active exception to reraise",
                    ));
                };
                match self.eval(exc, scope)? {
                    Value::ExceptionType(kind) => Err(ExecError::raise(kind.name(), "")),
                    Value::Exception(exc) => Err(ExecError::raise(exc.kind.name(), exc.message())),
                    _ => Err(ExecError::type_error(
                        "exceptions must derive from BaseException",
                    )),
                }
            }
            StmtKind::Assert { test, msg } => {
                if self.eval(test, scope)?.is_truthy() {
                    return Ok(());
                }
                let message = match msg {
                    Some(expr) => self.eval(expr, scope)?.to_str(),
                    None => String::new(),
                };
                Err(ExecError::raise("AssertionError", message))
            }
        }
    }

    fn eval_keywords(
        &self,
        keywords: &[Keyword],
        scope: &Scope<'_>,
        func: &str,
    ) -> Result<Vec<(String, Value)>, ExecError> {
        let mut evaluated: Vec<(String, Value)> = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            if evaluated.iter().any(|(name, _)| *name == keyword.name) {
                return Err(ExecError::type_error(format!(
                    "{func}() got multiple values for keyword argument '{}'",
                    keyword.name
                )));
            }
            let value = self.eval(&keyword.value, scope)?;
            evaluated.push((keyword.name.clone(), value));
        }
        Ok(evaluated)
    }

    fn apply_decorators(
        &self,
        decorators: &[Value],
        mut value: Value,
    ) -> Result<Value, ExecError> {
        for decorator in decorators.iter().rev() {
            value = self.call_value(decorator, CallArgs::positional(vec![value]))?;
        }
        Ok(value)
    }

    fn exec_class(
        &mut self,
        def: &ClassDef,
        line: usize,
        outer: &Scope<'_>,
        observer: &mut dyn DeclarationObserver,
    ) -> Result<Value, ExecError> {
        // Decorators, then bases and keywords, then the body.
        let decorators = def
            .decorators
            .iter()
            .map(|expr| self.eval(expr, outer))
            .collect::<Result<Vec<_>, _>>()?;
        let bases = def
            .bases
            .iter()
            .map(|expr| self.eval(expr, outer))
            .collect::<Result<Vec<_>, _>>()?;
        let keywords = self.eval_keywords(&def.keywords, outer, &def.name)?;

        let mut body = ClassBody {
            doc: docstring(&def.body),
            ..ClassBody::default()
        };
        {
            let mut class_scope = Scope::Class(&mut body);
            for stmt in &def.body {
                self.exec_stmt(stmt, &mut class_scope, observer)?;
            }
        }
        let class = classes::build_class(self, &def.name, bases, keywords, body, line)?;
        self.apply_decorators(&decorators, class)
    }

    fn exec_function(
        &self,
        def: &FunctionDef,
        line: usize,
        scope: &Scope<'_>,
    ) -> Result<Value, ExecError> {
        let decorators = def
            .decorators
            .iter()
            .map(|expr| self.eval(expr, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let function = Value::Function(Rc::new(Function {
            name: def.name.clone(),
            params: def.params.clone(),
            line,
        }));
        self.apply_decorators(&decorators, function)
    }

    pub(super) fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value, ExecError> {
        self.budget.tick()?;
        let _depth = self.budget.descend()?;
        match &expr.kind {
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::Constant(value) => Ok(constant(value)),
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, scope)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, scope)?)),
            ExprKind::Set(items) => ops::make_set(self.eval_all(items, scope)?),
            ExprKind::Dict(pairs) => {
                self.budget
                    .check_size(pairs.len().saturating_mul(2 * size_of::<Value>()))?;
                let mut entries = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    ops::dict_insert(&mut entries, key, value)?;
                }
                Ok(Value::dict(entries))
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval(value, scope)?;
                self.attribute(&object, attr)
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                self.subscript(&object, &index)
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let callee = self.eval(func, scope)?;
                let positional = self.eval_all(args, scope)?;
                let keywords = self.eval_keywords(keywords, scope, &callable_name(&callee))?;
                self.call_value(&callee, CallArgs::new(positional, keywords))
            }
            ExprKind::BinOp { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::binary(&self.budget, *op, &left, &right)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand, scope)?;
                ops::unary(*op, &operand)
            }
            ExprKind::BoolOp { op, values } => {
                let mut result = Value::None;
                for value in values {
                    result = self.eval(value, scope)?;
                    let decided = match op {
                        BoolOp::And => !result.is_truthy(),
                        BoolOp::Or => result.is_truthy(),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(result)
            }
            ExprKind::Compare { left, comparisons } => {
                let mut left = self.eval(left, scope)?;
                for (op, right) in comparisons {
                    let right = self.eval(right, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::Lambda(def) => Ok(Value::Function(Rc::new(Function {
                name: def.name.clone(),
                params: def.params.clone(),
                line: expr.line,
            }))),
        }
    }

    fn eval_all(&self, exprs: &[Expr], scope: &Scope<'_>) -> Result<Vec<Value>, ExecError> {
        self.budget
            .check_size(exprs.len().saturating_mul(size_of::<Value>()))?;
        exprs.iter().map(|expr| self.eval(expr, scope)).collect()
    }

    pub(super) fn attribute(&self, object: &Value, name: &str) -> Result<Value, ExecError> {
        let missing_on_type = |type_name: &str| {
            ExecError::attribute_error(format!(
                "type object '{type_name}' has no attribute '{name}'"
            ))
        };
        let found = match object {
            Value::Module(module) => {
                return module.get(name).ok_or_else(|| {
                    ExecError::attribute_error(format!(
                        "module '{}' has no attribute '{name}'",
                        module.name
                    ))
                });
            }
            Value::Model(model) => match name {
                "__name__" | "__qualname__" => Some(Value::str(&model.name)),
                "__doc__" => Some(model.doc.as_deref().map_or(Value::None, Value::str)),
                "model_config" => Some(model.config.to_value()),
                "model_fields" => Some(Value::dict(
                    model
                        .fields
                        .iter()
                        .map(|(field, info)| {
                            (Value::str(field), Value::FieldInfo(Rc::new(info.info.clone())))
                        })
                        .collect(),
                )),
                _ => builtins::method(object, name).or_else(|| model.lookup_attr(name)),
            }
            .ok_or_else(|| missing_on_type(&model.name)),
            Value::Instance(instance) => instance
                .values
                .get(name)
                .cloned()
                .or_else(|| builtins::method(object, name))
                .or_else(|| instance.class.lookup_attr(name))
                .ok_or_else(|| {
                    ExecError::attribute_error(format!(
                        "'{}' object has no attribute '{name}'",
                        instance.class.name
                    ))
                }),
            Value::Enum(class) => match name {
                "__name__" | "__qualname__" => Some(Value::str(&class.name)),
                "__doc__" => Some(class.doc.as_deref().map_or(Value::None, Value::str)),
                "__members__" => Some(Value::dict(
                    class
                        .by_name
                        .iter()
                        .map(|(key, member)| {
                            (Value::str(key), Value::EnumMember(Rc::clone(member)))
                        })
                        .collect(),
                )),
                _ => class
                    .by_name
                    .get(name)
                    .map(|member| Value::EnumMember(Rc::clone(member)))
                    .or_else(|| class.lookup_attr(name)),
            }
            .ok_or_else(|| missing_on_type(&class.name)),
            Value::EnumMember(member) => match name {
                "name" | "_name_" => Ok(Value::str(&member.name)),
                "value" | "_value_" => Ok(member.value.clone()),
                _ if member.mixin_value => self.attribute(&member.value, name),
                _ => Err(ExecError::attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    member.owner_name
                ))),
            },
            Value::Class(class) => match name {
                "__name__" | "__qualname__" => Some(Value::str(&class.name)),
                "__doc__" => Some(class.doc.as_deref().map_or(Value::None, Value::str)),
                _ => class.lookup_attr(name),
            }
            .ok_or_else(|| missing_on_type(&class.name)),
            Value::Type(ty) => {
                let value = match (ty, name) {
                    (_, "__name__" | "__qualname__") => Some(Value::str(ty.name())),
                    (BuiltinType::DateTime, "now") => Some(Value::Builtin(Builtin::Now)),
                    (BuiltinType::DateTime, "utcnow") => Some(Value::Builtin(Builtin::UtcNow)),
                    (BuiltinType::DateTime | BuiltinType::Date, "today") => {
                        Some(Value::Builtin(Builtin::Today))
                    }
                    (
                        BuiltinType::DateTime | BuiltinType::Date | BuiltinType::Time,
                        "fromisoformat",
                    ) => {
                        Some(Value::Builtin(Builtin::FromIsoFormat(*ty)))
                    }
                    _ => None,
                };
                value.ok_or_else(|| missing_on_type(ty.name()))
            }
            Value::ExceptionType(kind) => match name {
                "__name__" | "__qualname__" => Ok(Value::str(kind.name())),
                _ => Err(missing_on_type(kind.name())),
            },
            Value::Exception(exc) if name == "args" => Ok(Value::tuple(exc.args.clone())),
            Value::Generic(alias) => match name {
                "__args__" => Ok(Value::tuple(alias.args.clone())),
                "__origin__" => Ok(Value::Special(alias.origin)),
                "__metadata__" if alias.origin == SpecialForm::Annotated => {
                    Ok(Value::tuple(alias.args.iter().skip(1).cloned().collect()))
                }
                _ => Err(ExecError::attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    object.type_name()
                ))),
            },
            Value::Date(date) => date_part(name, Some(*date), None),
            Value::DateTime(datetime) => {
                date_part(name, Some(datetime.date()), Some(datetime.time()))
            }
            Value::Time(time) => date_part(name, None, Some(*time)),
            Value::TimeDelta(delta) => {
                let micros = delta.num_microseconds().unwrap_or(i64::MAX);
                let seconds = micros.div_euclid(1_000_000);
                match name {
                    "days" => Ok(Value::Int(i128::from(seconds.div_euclid(86_400)))),
                    "seconds" => Ok(Value::Int(i128::from(seconds.rem_euclid(86_400)))),
                    "microseconds" => Ok(Value::Int(i128::from(micros.rem_euclid(1_000_000)))),
                    _ => Err(ExecError::attribute_error(format!(
                        "'timedelta' object has no attribute '{name}'"
                    ))),
                }
            }
            Value::FieldInfo(info) => Ok(match name {
                "default" => info.default.clone().unwrap_or(Value::Ellipsis),
                "default_factory" => info.default_factory.clone().unwrap_or(Value::None),
                "alias" => info.alias.as_deref().map_or(Value::None, Value::str),
                "title" => info.title.as_deref().map_or(Value::None, Value::str),
                "description" => info.description.as_deref().map_or(Value::None, Value::str),
                "examples" => info.examples.clone().unwrap_or(Value::None),
                _ => {
                    return Err(ExecError::attribute_error(format!(
                        "'FieldInfo' object has no attribute '{name}'"
                    )));
                }
            }),
            other => builtins::method(other, name).ok_or_else(|| {
                ExecError::attribute_error(format!(
                    "'{}' object has no attribute '{name}'",
                    other.type_name()
                ))
            }),
        };
        if found.is_err()
            && let Some(method) = builtins::method(object, name)
        {
            return Ok(method);
        }
        found
    }

    fn subscript(&self, object: &Value, index: &Value) -> Result<Value, ExecError> {
        let builtin_generic = |ty: &BuiltinType| match ty {
            BuiltinType::List => Some(SpecialForm::List),
            BuiltinType::Dict => Some(SpecialForm::Dict),
            BuiltinType::Set => Some(SpecialForm::Set),
            BuiltinType::FrozenSet => Some(SpecialForm::FrozenSet),
            BuiltinType::Tuple => Some(SpecialForm::Tuple),
            BuiltinType::Type => Some(SpecialForm::Type),
            _ => None,
        };
        match object {
            Value::Special(form) => typing::parameterize(*form, index, false),
            Value::Type(ty) => match builtin_generic(ty) {
                Some(form) => typing::parameterize(form, index, true),
                None => Err(ExecError::type_error(format!(
                    "type '{}' is not subscriptable",
                    ty.name()
                ))),
            },
            Value::Generic(_) => Err(ExecError::type_error(format!(
                "{} is not a generic class",
                object.repr()
            ))),
            Value::List(items) => {
                let position = index_of(items.len(), index, "list")?;
                Ok(items.get(position).cloned().unwrap_or(Value::None))
            }
            Value::Tuple(items) => {
                let position = index_of(items.len(), index, "tuple")?;
                Ok(items.get(position).cloned().unwrap_or(Value::None))
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let position = index_of(chars.len(), index, "string")?;
                Ok(chars
                    .get(position)
                    .map(|ch| Value::str(ch.to_string()))
                    .unwrap_or(Value::None))
            }
            Value::Bytes(bytes) => {
                let position = index_of(bytes.len(), index, "index")?;
                Ok(bytes
                    .get(position)
                    .map(|byte| Value::Int(i128::from(*byte)))
                    .unwrap_or(Value::None))
            }
            Value::Dict(entries) => {
                if !index.is_hashable() {
                    return Err(ExecError::type_error(format!(
                        "unhashable type: '{}'",
                        index.type_name()
                    )));
                }
                entries
                    .iter()
                    .find(|(key, _)| super::value::py_eq(key, index))
                    .map(|(_, value)| value.clone())
                    .ok_or_else(|| ExecError::key_error(index))
            }
            Value::Enum(class) => match index {
                Value::Str(name) => class
                    .by_name
                    .get(&**name)
                    .map(|member| Value::EnumMember(Rc::clone(member)))
                    .ok_or_else(|| ExecError::key_error(index)),
                _ => Err(ExecError::key_error(index)),
            },
            Value::Model(model) if model.is_root && model.root_model => {
                classes::parameterize_root_model(self, model, index)
            }
            Value::Model(model) => Err(ExecError::type_error(format!(
                "<class '{}'> cannot be parametrized because it does not inherit from typing.Generic",
                model.name
            ))),
            other => Err(ExecError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub(super) fn call_value(&self, callee: &Value, args: CallArgs) -> Result<Value, ExecError> {
        self.budget.tick()?;
        let _depth = self.budget.descend()?;
        match callee {
            Value::Builtin(builtin) => builtins::call_builtin(self, *builtin, args),
            Value::Type(ty) => builtins::construct(self, *ty, args),
            Value::Model(model) => classes::instantiate(self, model, args),
            Value::Enum(class) if class.is_root => Err(ExecError::type_error(format!(
                "the functional {} API is not supported; declare members in a class body",
                class.name
            ))),
            Value::Enum(class) => class.call(&args),
            Value::ExceptionType(kind) => {
                args.reject_keywords(kind.name())?;
                Ok(Value::Exception(Rc::new(ExceptionValue {
                    kind: *kind,
                    args: args.positional,
                })))
            }
            Value::Decorator(decorator) => decorator.call(args),
            Value::BoundMethod(method) => builtins::call_method(self, method, args),
            Value::Function(function) => Err(ExecError::type_error(format!(
                "calling '{}' is not supported: function bodies are not evaluated",
                function.name
            ))),
            Value::Class(class) => Err(ExecError::type_error(format!(
                "instances of plain class '{}' are not supported",
                class.name
            ))),
            other => Err(ExecError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

fn callable_name(value: &Value) -> String {
    match value {
        Value::Builtin(builtin) => builtin.name().to_string(),
        Value::Type(ty) => ty.name().to_string(),
        Value::Model(model) => model.name.clone(),
        Value::Enum(class) => class.name.clone(),
        Value::Function(function) => function.name.clone(),
        Value::BoundMethod(method) => method.name.clone(),
        Value::ExceptionType(kind) => kind.name().to_string(),
        other => other.type_name(),
    }
}

fn date_part(
    name: &str,
    date: Option<chrono::NaiveDate>,
    time: Option<chrono::NaiveTime>,
) -> Result<Value, ExecError> {
    use chrono::{Datelike, Timelike};
    let value = match (name, date, time) {
        ("year", Some(date), _) => Some(i128::from(date.year())),
        ("month", Some(date), _) => Some(i128::from(date.month())),
        ("day", Some(date), _) => Some(i128::from(date.day())),
        ("hour", _, Some(time)) => Some(i128::from(time.hour())),
        ("minute", _, Some(time)) => Some(i128::from(time.minute())),
        ("second", _, Some(time)) => Some(i128::from(time.second())),
        ("microsecond", _, Some(time)) => Some(i128::from(time.nanosecond() / 1_000)),
        _ => None,
    };
    value.map(Value::Int).ok_or_else(|| {
        let type_name = match (date, time) {
            (Some(_), Some(_)) => "datetime",
            (Some(_), None) => "date",
            _ => "time",
        };
        ExecError::attribute_error(format!("'{type_name}' object has no attribute '{name}'"))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use schemaforge_config::LimitsConfig;

    use super::*;
    use crate::policy::AllowlistPolicy;

    fn run(source: &str) -> Result<Interpreter, ExecError> {
        let mut interp = Interpreter::new(
            Arc::new(AllowlistPolicy::standard()),
            &LimitsConfig::default(),
        );
        interp.execute(source, &mut ())?;
        Ok(interp)
    }

    fn global(interp: &Interpreter, name: &str) -> Value {
        interp.globals().get(name).cloned().unwrap_or(Value::None)
    }

    #[test]
    fn arithmetic_and_containers() {
        let interp =
            run("a = 1 + 2 * 3\nb = [a, 'x'][1]\nc = {'k': a}['k']\nd = (1, 2)[-1]\n").unwrap();
        assert!(matches!(global(&interp, "a"), Value::Int(7)));
        assert_eq!(global(&interp, "b").as_str(), Some("x"));
        assert!(matches!(global(&interp, "c"), Value::Int(7)));
        assert!(matches!(global(&interp, "d"), Value::Int(2)));
    }

    #[test]
    fn tuple_unpacking() {
        let interp = run("a, b = 1, 2\n").unwrap();
        assert!(matches!(global(&interp, "b"), Value::Int(2)));
        let err = run("a, b = 1, 2, 3\n").err().unwrap();
        assert_eq!(err.to_string(), "too many values to unpack (expected 2)");
    }

    #[test]
    fn denied_import_stops_execution() {
        let err = run("import os\n").err().unwrap();
        assert!(matches!(err, ExecError::ImportDenied(_)));
    }

    #[test]
    fn import_binds_top_level_package() {
        let interp = run("import collections.abc\nS = collections.abc.Sequence\n").unwrap();
        assert!(matches!(global(&interp, "S"), Value::Special(SpecialForm::Sequence)));
    }

    #[test]
    fn missing_from_import_names_the_module() {
        let err = run("from typing import Nope\n").err().unwrap();
        assert_eq!(err.to_string(), "cannot import name 'Nope' from 'typing'");
    }

    #[test]
    fn relative_imports_are_rejected() {
        let err = run("from . import models\n").err().unwrap();
        assert_eq!(
            err.to_string(),
            "attempted relative import with no known parent package"
        );
    }

    #[test]
    fn conditionals_and_type_checking() {
        let interp = run(
            "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import os\nelse:\n    x = 1\n",
        )
        .unwrap();
        assert!(matches!(global(&interp, "x"), Value::Int(1)));
    }

    #[test]
    fn raise_reports_message() {
        let err = run("raise ValueError('boom')\n").err().unwrap();
        assert_eq!(err.class_name(), "ValueError");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn undefined_names() {
        let err = run("x = missing\n").err().unwrap();
        assert_eq!(err.to_string(), "name 'missing' is not defined");
    }

    #[test]
    fn function_bodies_are_not_called() {
        let err = run("def f():\n    return 1\nf()\n").err().unwrap();
        assert!(err.to_string().contains("function bodies are not evaluated"));
    }

    #[test]
    fn enum_members_by_name_and_value() {
        let interp = run(
            "from enum import Enum\nclass Color(Enum):\n    RED = 'r'\n    GREEN = 'g'\nc = Color('g')\nn = Color.RED.name\nv = Color['RED'].value\n",
        )
        .unwrap();
        assert!(matches!(
            global(&interp, "c"),
            Value::EnumMember(member) if member.name == "GREEN"
        ));
        assert_eq!(global(&interp, "n").as_str(), Some("RED"));
        assert_eq!(global(&interp, "v").as_str(), Some("r"));
    }

    #[test]
    fn class_scope_sees_its_own_names() {
        let interp = run(
            "from pydantic import BaseModel\nclass M(BaseModel):\n    LIMIT: int = 3\n    other: int = LIMIT * 2\n",
        )
        .unwrap();
        let Value::Model(model) = global(&interp, "M") else {
            panic!("expected a model");
        };
        let default = model.fields.get("other").and_then(|field| field.info.default.clone());
        assert!(matches!(default, Some(Value::Int(6))));
    }
}
