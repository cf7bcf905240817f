//! Subscription of typing special forms: `Optional[int]`, `dict[str, Any]`, ...

use std::rc::Rc;

use super::ExecError;
use super::value::{GenericAlias, SpecialForm, Value, py_eq, tuple_repr};

fn alias(origin: SpecialForm, args: Vec<Value>, builtin_spelling: bool) -> Value {
    Value::Generic(Rc::new(GenericAlias {
        origin,
        args,
        builtin_spelling,
    }))
}

fn nested_args(value: &Value, origin: SpecialForm) -> Option<&[Value]> {
    match value {
        Value::Generic(inner) if inner.origin == origin => Some(&inner.args),
        _ => None,
    }
}

/// Whether `value` may appear as a type argument.
fn is_type_argument(value: &Value) -> bool {
    value.is_type_like() || matches!(value, Value::Str(_))
}

fn check_types(form: SpecialForm, args: &[Value]) -> Result<(), ExecError> {
    for arg in args {
        if !is_type_argument(arg) {
            let message = match form {
                SpecialForm::Union | SpecialForm::Optional => {
                    format!("Union[arg, ...]: each arg must be a type. Got {}.", arg.repr())
                }
                _ => format!(
                    "Parameters to generic types must be types. Got {}.",
                    arg.repr()
                ),
            };
            return Err(ExecError::type_error(message));
        }
    }
    Ok(())
}

fn expect_arity(form: SpecialForm, args: &[Value], expected: usize) -> Result<(), ExecError> {
    if args.len() != expected {
        let direction = if args.len() > expected { "many" } else { "few" };
        return Err(ExecError::type_error(format!(
            "Too {direction} arguments for {}; actual {}, expected {expected}",
            form.qualified(),
            args.len()
        )));
    }
    Ok(())
}

/// Build a union, flattening nested unions and dropping duplicates.
pub fn union(members: Vec<Value>, builtin_spelling: bool) -> Value {
    let mut flat: Vec<Value> = Vec::with_capacity(members.len());
    for member in members {
        let expanded = match nested_args(&member, SpecialForm::Union) {
            Some(inner) => inner.to_vec(),
            None => vec![member],
        };
        for item in expanded {
            if !flat.iter().any(|existing| py_eq(existing, &item)) {
                flat.push(item);
            }
        }
    }
    match <[Value; 1]>::try_from(flat) {
        Ok([single]) => single,
        Err(flat) => alias(SpecialForm::Union, flat, builtin_spelling),
    }
}

fn literal_key_matches(left: &Value, right: &Value) -> bool {
    left.type_name() == right.type_name() && py_eq(left, right)
}

/// `form[index]`. A tuple index supplies several arguments.
pub fn parameterize(
    form: SpecialForm,
    index: &Value,
    builtin_spelling: bool,
) -> Result<Value, ExecError> {
    let args: Vec<Value> = match index {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    match form {
        SpecialForm::Any => Err(ExecError::type_error("typing.Any is not subscriptable")),
        SpecialForm::Optional => {
            if args.len() != 1 {
                return Err(ExecError::type_error(format!(
                    "Optional[t] requires a single type. Got {}.",
                    tuple_repr(&args)
                )));
            }
            check_types(form, &args)?;
            let mut members = args;
            members.push(Value::None);
            Ok(union(members, false))
        }
        SpecialForm::Union => {
            if args.is_empty() {
                return Err(ExecError::type_error("Cannot take a Union of no types."));
            }
            check_types(form, &args)?;
            Ok(union(args, false))
        }
        SpecialForm::List
        | SpecialForm::Set
        | SpecialForm::FrozenSet
        | SpecialForm::Sequence
        | SpecialForm::Iterable
        | SpecialForm::AbstractSet
        | SpecialForm::Type
        | SpecialForm::ClassVar => {
            expect_arity(form, &args, 1)?;
            check_types(form, &args)?;
            Ok(alias(form, args, builtin_spelling))
        }
        SpecialForm::Dict | SpecialForm::Mapping => {
            expect_arity(form, &args, 2)?;
            check_types(form, &args)?;
            Ok(alias(form, args, builtin_spelling))
        }
        SpecialForm::Tuple => {
            let args = match index {
                Value::Tuple(items) if items.is_empty() => Vec::new(),
                _ => args,
            };
            if let Some(position) = args.iter().position(|arg| matches!(arg, Value::Ellipsis))
                && (position != 1 || args.len() != 2)
            {
                return Err(ExecError::type_error(
                    "Tuple[t, ...]: t must be a type and '...' may only be the second argument.",
                ));
            }
            let types: Vec<Value> = args
                .iter()
                .filter(|arg| !matches!(arg, Value::Ellipsis))
                .cloned()
                .collect();
            check_types(form, &types)?;
            Ok(alias(form, args, builtin_spelling))
        }
        SpecialForm::Callable => {
            let [params, result] = <[Value; 2]>::try_from(args).map_err(|_| {
                ExecError::type_error(
                    "Callable must be used as Callable[[arg, ...], result].",
                )
            })?;
            if !matches!(params, Value::List(_) | Value::Ellipsis) {
                return Err(ExecError::type_error(format!(
                    "Callable[args, result]: args must be a list. Got {}",
                    params.repr()
                )));
            }
            check_types(form, std::slice::from_ref(&result))?;
            Ok(alias(form, vec![params, result], builtin_spelling))
        }
        SpecialForm::Literal => {
            let mut values: Vec<Value> = Vec::with_capacity(args.len());
            for arg in args {
                let expanded = match nested_args(&arg, SpecialForm::Literal) {
                    Some(inner) => inner.to_vec(),
                    None => vec![arg],
                };
                for value in expanded {
                    if !values.iter().any(|existing| literal_key_matches(existing, &value)) {
                        values.push(value);
                    }
                }
            }
            Ok(alias(form, values, false))
        }
        SpecialForm::Annotated => {
            if args.len() < 2 {
                return Err(ExecError::type_error(
                    "Annotated[...] should be used with at least two arguments (a type and an annotation).",
                ));
            }
            let mut args = args.into_iter();
            let mut flat = Vec::new();
            if let Some(first) = args.next() {
                check_types(form, std::slice::from_ref(&first))?;
                match nested_args(&first, SpecialForm::Annotated) {
                    Some(inner) => flat.extend(inner.iter().cloned()),
                    None => flat.push(first),
                }
            }
            flat.extend(args);
            Ok(alias(form, flat, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::BuiltinType;

    fn int() -> Value {
        Value::Type(BuiltinType::Int)
    }

    fn str_type() -> Value {
        Value::Type(BuiltinType::Str)
    }

    #[test]
    fn optional_adds_none() {
        let value = parameterize(SpecialForm::Optional, &int(), false).unwrap();
        let Value::Generic(alias) = value else {
            panic!("expected a union");
        };
        assert_eq!(alias.origin, SpecialForm::Union);
        assert_eq!(alias.args.len(), 2);
        assert!(matches!(alias.args.get(1), Some(Value::None)));
    }

    #[test]
    fn unions_flatten_and_collapse() {
        let inner = parameterize(
            SpecialForm::Union,
            &Value::tuple(vec![int(), str_type()]),
            false,
        )
        .unwrap();
        let outer = parameterize(
            SpecialForm::Union,
            &Value::tuple(vec![inner, int()]),
            false,
        )
        .unwrap();
        let Value::Generic(alias) = outer else {
            panic!("expected a union");
        };
        assert_eq!(alias.args.len(), 2);
        let single = parameterize(SpecialForm::Union, &Value::tuple(vec![int(), int()]), false)
            .unwrap();
        assert!(matches!(single, Value::Type(BuiltinType::Int)));
    }

    #[test]
    fn list_arity_is_checked() {
        let err = parameterize(
            SpecialForm::List,
            &Value::tuple(vec![int(), str_type()]),
            false,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Too many arguments for typing.List; actual 2, expected 1"
        );
    }

    #[test]
    fn literal_dedups_by_type() {
        let value = parameterize(
            SpecialForm::Literal,
            &Value::tuple(vec![Value::Int(1), Value::Bool(true), Value::Int(1)]),
            false,
        )
        .unwrap();
        let Value::Generic(alias) = value else {
            panic!("expected a literal");
        };
        assert_eq!(alias.args.len(), 2);
    }

    #[test]
    fn annotated_requires_metadata() {
        assert!(parameterize(SpecialForm::Annotated, &int(), false).is_err());
    }

    #[test]
    fn non_types_are_rejected() {
        let err = parameterize(SpecialForm::List, &Value::Int(3), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parameters to generic types must be types. Got 3."
        );
    }
}
