//! Operators: arithmetic, bitwise, comparisons and membership.

use std::cmp::Ordering;
use std::rc::Rc;

use chrono::TimeDelta;

use super::ExecError;
use super::budget::Budget;
use super::typing;
use super::value::{Value, dedup_values, py_eq, py_is};
use crate::syntax::ast::{BinOp, CmpOp, UnaryOp};

fn unsupported(op: &str, left: &Value, right: &Value) -> ExecError {
    ExecError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> ExecError {
    ExecError::raise("OverflowError", "integer overflow")
}

/// Integer view of ints and bools.
fn as_int(value: &Value) -> Option<i128> {
    match value {
        Value::Int(int) => Some(*int),
        Value::Bool(flag) => Some(i128::from(*flag)),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(float) => Some(*float),
        other => as_int(other).map(|int| int as f64),
    }
}

fn is_float_pair(left: &Value, right: &Value) -> bool {
    (matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)))
        && as_float(left).is_some()
        && as_float(right).is_some()
}

fn repeat<T: Clone>(
    budget: &Budget,
    items: &[T],
    count: i128,
    unit_bytes: usize,
) -> Result<Vec<T>, ExecError> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    budget.check_size(items.len().saturating_mul(count).saturating_mul(unit_bytes))?;
    let mut out = Vec::with_capacity(items.len().saturating_mul(count));
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn concat(budget: &Budget, left: &[Value], right: &[Value]) -> Result<Vec<Value>, ExecError> {
    budget.check_size((left.len() + right.len()).saturating_mul(size_of::<Value>()))?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    out.extend_from_slice(left);
    out.extend_from_slice(right);
    Ok(out)
}

fn floor_div(left: i128, right: i128) -> Result<i128, ExecError> {
    if right == 0 {
        return Err(ExecError::raise(
            "ZeroDivisionError",
            "integer division or modulo by zero",
        ));
    }
    let quotient = left.checked_div(right).ok_or_else(overflow)?;
    if (left % right != 0) && ((left < 0) != (right < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn floor_mod(left: i128, right: i128) -> Result<i128, ExecError> {
    if right == 0 {
        return Err(ExecError::raise(
            "ZeroDivisionError",
            "integer division or modulo by zero",
        ));
    }
    let remainder = left.checked_rem(right).ok_or_else(overflow)?;
    if remainder != 0 && ((remainder < 0) != (right < 0)) {
        Ok(remainder + right)
    } else {
        Ok(remainder)
    }
}

fn float_floor_mod(left: f64, right: f64) -> f64 {
    let remainder = left % right;
    if remainder != 0.0 && ((remainder < 0.0) != (right < 0.0)) {
        remainder + right
    } else {
        remainder
    }
}

fn int_pow(base: i128, exponent: i128) -> Result<Value, ExecError> {
    if exponent < 0 {
        #[allow(clippy::cast_precision_loss)]
        let base = base as f64;
        let exponent = i32::try_from(exponent).unwrap_or(i32::MIN);
        if base == 0.0 {
            return Err(ExecError::raise(
                "ZeroDivisionError",
                "0.0 cannot be raised to a negative power",
            ));
        }
        return Ok(Value::Float(base.powi(exponent)));
    }
    let exponent = u32::try_from(exponent).map_err(|_| overflow())?;
    base.checked_pow(exponent).map(Value::Int).ok_or_else(overflow)
}

fn merge_dicts(
    left: &[(Value, Value)],
    right: &[(Value, Value)],
) -> Result<Vec<(Value, Value)>, ExecError> {
    let mut entries = left.to_vec();
    for (key, value) in right {
        dict_insert(&mut entries, key.clone(), value.clone())?;
    }
    Ok(entries)
}

/// Insert or replace `key`, keeping the position of an existing key.
pub fn dict_insert(
    entries: &mut Vec<(Value, Value)>,
    key: Value,
    value: Value,
) -> Result<(), ExecError> {
    if !key.is_hashable() {
        return Err(ExecError::type_error(format!(
            "unhashable type: '{}'",
            key.type_name()
        )));
    }
    match entries.iter_mut().find(|(existing, _)| py_eq(existing, &key)) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
    Ok(())
}

/// Collapse repeated keys the way a dict display does: first position, last value.
pub fn dedup_entries(entries: Vec<(Value, Value)>) -> Result<Vec<(Value, Value)>, ExecError> {
    let mut out = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        dict_insert(&mut out, key, value)?;
    }
    Ok(out)
}

/// Build a set from arbitrary elements, rejecting unhashable ones.
pub fn make_set(items: Vec<Value>) -> Result<Value, ExecError> {
    if let Some(bad) = items.iter().find(|item| !item.is_hashable()) {
        return Err(ExecError::type_error(format!(
            "unhashable type: '{}'",
            bad.type_name()
        )));
    }
    Ok(Value::Set(Rc::new(dedup_values(items))))
}

fn set_operation(
    op: BinOp,
    left: &[Value],
    right: &[Value],
    frozen: bool,
) -> Option<Value> {
    let contains = |items: &[Value], needle: &Value| items.iter().any(|item| py_eq(item, needle));
    let items: Vec<Value> = match op {
        BinOp::BitOr => dedup_values(left.iter().chain(right.iter()).cloned().collect()),
        BinOp::BitAnd => left.iter().filter(|item| contains(right, item)).cloned().collect(),
        BinOp::Sub => left.iter().filter(|item| !contains(right, item)).cloned().collect(),
        BinOp::BitXor => left
            .iter()
            .filter(|item| !contains(right, item))
            .chain(right.iter().filter(|item| !contains(left, item)))
            .cloned()
            .collect(),
        _ => return None,
    };
    Some(if frozen {
        Value::FrozenSet(Rc::new(items))
    } else {
        Value::Set(Rc::new(items))
    })
}

fn delta_value(delta: Option<TimeDelta>) -> Result<Value, ExecError> {
    delta
        .map(Value::TimeDelta)
        .ok_or_else(|| ExecError::raise("OverflowError", "date value out of range"))
}

pub fn binary(budget: &Budget, op: BinOp, left: &Value, right: &Value) -> Result<Value, ExecError> {
    use Value as V;
    let symbol = op.symbol();

    if op == BinOp::BitOr && left.is_type_like() && right.is_type_like() {
        if matches!((left, right), (V::None, V::None)) {
            return Err(unsupported(symbol, left, right));
        }
        return Ok(typing::union(vec![left.clone(), right.clone()], true));
    }

    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        let both_bool = matches!((left, right), (V::Bool(_), V::Bool(_)));
        return match op {
            BinOp::Add => a.checked_add(b).map(V::Int).ok_or_else(overflow),
            BinOp::Sub => a.checked_sub(b).map(V::Int).ok_or_else(overflow),
            BinOp::Mult => a.checked_mul(b).map(V::Int).ok_or_else(overflow),
            #[allow(clippy::cast_precision_loss)]
            BinOp::Div => {
                if b == 0 {
                    return Err(ExecError::raise("ZeroDivisionError", "division by zero"));
                }
                Ok(V::Float(a as f64 / b as f64))
            }
            BinOp::FloorDiv => floor_div(a, b).map(V::Int),
            BinOp::Mod => floor_mod(a, b).map(V::Int),
            BinOp::Pow => int_pow(a, b),
            BinOp::LShift | BinOp::RShift => {
                if b < 0 {
                    return Err(ExecError::value_error("negative shift count"));
                }
                let shift = u32::try_from(b).map_err(|_| overflow())?;
                if op == BinOp::LShift {
                    a.checked_mul(2i128.checked_pow(shift).ok_or_else(overflow)?)
                        .map(V::Int)
                        .ok_or_else(overflow)
                } else {
                    Ok(V::Int(a.checked_shr(shift).unwrap_or(if a < 0 { -1 } else { 0 })))
                }
            }
            BinOp::BitAnd if both_bool => Ok(V::Bool(a & b != 0)),
            BinOp::BitOr if both_bool => Ok(V::Bool(a | b != 0)),
            BinOp::BitXor if both_bool => Ok(V::Bool(a ^ b != 0)),
            BinOp::BitAnd => Ok(V::Int(a & b)),
            BinOp::BitOr => Ok(V::Int(a | b)),
            BinOp::BitXor => Ok(V::Int(a ^ b)),
            BinOp::MatMult => Err(unsupported(symbol, left, right)),
        };
    }

    if is_float_pair(left, right) {
        let (a, b) = (as_float(left).unwrap_or_default(), as_float(right).unwrap_or_default());
        return match op {
            BinOp::Add => Ok(V::Float(a + b)),
            BinOp::Sub => Ok(V::Float(a - b)),
            BinOp::Mult => Ok(V::Float(a * b)),
            BinOp::Div if b == 0.0 => Err(ExecError::raise(
                "ZeroDivisionError",
                "float division by zero",
            )),
            BinOp::Div => Ok(V::Float(a / b)),
            BinOp::FloorDiv if b == 0.0 => Err(ExecError::raise(
                "ZeroDivisionError",
                "float floor division by zero",
            )),
            BinOp::FloorDiv => Ok(V::Float((a / b).floor())),
            BinOp::Mod if b == 0.0 => Err(ExecError::raise("ZeroDivisionError", "float modulo")),
            BinOp::Mod => Ok(V::Float(float_floor_mod(a, b))),
            BinOp::Pow => {
                let result = a.powf(b);
                if result.is_nan() && !a.is_nan() && !b.is_nan() {
                    return Err(ExecError::value_error("math domain error"));
                }
                Ok(V::Float(result))
            }
            _ => Err(unsupported(symbol, left, right)),
        };
    }

    match (op, left, right) {
        (BinOp::Add, V::Str(a), V::Str(b)) => {
            budget.check_size(a.len() + b.len())?;
            Ok(V::str(format!("{a}{b}")))
        }
        (BinOp::Add, V::Bytes(a), V::Bytes(b)) => {
            budget.check_size(a.len() + b.len())?;
            Ok(V::Bytes(a.iter().chain(b.iter()).copied().collect()))
        }
        (BinOp::Add, V::List(a), V::List(b)) => Ok(V::list(concat(budget, a, b)?)),
        (BinOp::Add, V::Tuple(a), V::Tuple(b)) => Ok(V::tuple(concat(budget, a, b)?)),
        (BinOp::Mult, V::Str(text), count) | (BinOp::Mult, count, V::Str(text))
            if as_int(count).is_some() =>
        {
            let chars: Vec<char> = text.chars().collect();
            let repeated = repeat(budget, &chars, as_int(count).unwrap_or_default(), 1)?;
            Ok(V::str(repeated.into_iter().collect::<String>()))
        }
        (BinOp::Mult, V::List(items), count) | (BinOp::Mult, count, V::List(items))
            if as_int(count).is_some() =>
        {
            let size = size_of::<Value>();
            Ok(V::list(repeat(budget, items, as_int(count).unwrap_or_default(), size)?))
        }
        (BinOp::Mult, V::Tuple(items), count) | (BinOp::Mult, count, V::Tuple(items))
            if as_int(count).is_some() =>
        {
            let size = size_of::<Value>();
            Ok(V::tuple(repeat(budget, items, as_int(count).unwrap_or_default(), size)?))
        }
        (BinOp::BitOr, V::Dict(a), V::Dict(b)) => Ok(V::dict(merge_dicts(a, b)?)),
        (op, V::Set(a) | V::FrozenSet(a), V::Set(b) | V::FrozenSet(b)) => {
            set_operation(op, a, b, matches!(left, V::FrozenSet(_)))
                .ok_or_else(|| unsupported(symbol, left, right))
        }
        (BinOp::Add, V::TimeDelta(a), V::TimeDelta(b)) => delta_value(a.checked_add(b)),
        (BinOp::Sub, V::TimeDelta(a), V::TimeDelta(b)) => delta_value(a.checked_sub(b)),
        (BinOp::Mult, V::TimeDelta(delta), count) | (BinOp::Mult, count, V::TimeDelta(delta))
            if as_int(count).is_some() =>
        {
            let factor = i32::try_from(as_int(count).unwrap_or_default()).map_err(|_| overflow())?;
            delta_value(delta.checked_mul(factor))
        }
        (BinOp::Add, V::DateTime(at), V::TimeDelta(delta))
        | (BinOp::Add, V::TimeDelta(delta), V::DateTime(at)) => at
            .checked_add_signed(*delta)
            .map(V::DateTime)
            .ok_or_else(|| ExecError::raise("OverflowError", "date value out of range")),
        (BinOp::Sub, V::DateTime(at), V::TimeDelta(delta)) => at
            .checked_sub_signed(*delta)
            .map(V::DateTime)
            .ok_or_else(|| ExecError::raise("OverflowError", "date value out of range")),
        (BinOp::Sub, V::DateTime(a), V::DateTime(b)) => {
            Ok(V::TimeDelta(a.signed_duration_since(*b)))
        }
        (BinOp::Add, V::Date(date), V::TimeDelta(delta))
        | (BinOp::Add, V::TimeDelta(delta), V::Date(date)) => date
            .checked_add_signed(TimeDelta::days(delta.num_days()))
            .map(V::Date)
            .ok_or_else(|| ExecError::raise("OverflowError", "date value out of range")),
        (BinOp::Sub, V::Date(date), V::TimeDelta(delta)) => date
            .checked_sub_signed(TimeDelta::days(delta.num_days()))
            .map(V::Date)
            .ok_or_else(|| ExecError::raise("OverflowError", "date value out of range")),
        (BinOp::Sub, V::Date(a), V::Date(b)) => Ok(V::TimeDelta(a.signed_duration_since(*b))),
        (BinOp::Mod, V::Str(_), _) => Err(ExecError::type_error(
            "printf-style string formatting is not supported; use str.format",
        )),
        _ => Err(unsupported(symbol, left, right)),
    }
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, ExecError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(int)) => int.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Value::Bool(flag)) => Ok(Value::Int(-i128::from(*flag))),
        (UnaryOp::Neg, Value::Float(float)) => Ok(Value::Float(-float)),
        (UnaryOp::Neg, Value::TimeDelta(delta)) => Ok(Value::TimeDelta(-*delta)),
        (UnaryOp::Neg, Value::Decimal(text)) => Ok(Value::Decimal(Rc::from(
            match text.strip_prefix('-') {
                Some(positive) => positive.to_string(),
                None => format!("-{}", text.strip_prefix('+').unwrap_or(text)),
            },
        ))),
        (UnaryOp::Pos, Value::Bool(flag)) => Ok(Value::Int(i128::from(*flag))),
        (
            UnaryOp::Pos,
            Value::Int(_) | Value::Float(_) | Value::TimeDelta(_) | Value::Decimal(_),
        ) => Ok(operand.clone()),
        (UnaryOp::Invert, Value::Int(int)) => Ok(Value::Int(!int)),
        (UnaryOp::Invert, Value::Bool(flag)) => Ok(Value::Int(!i128::from(*flag))),
        (op, other) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(ExecError::type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                other.type_name()
            )))
        }
    }
}

fn sequence_order(left: &[Value], right: &[Value]) -> Result<Option<Ordering>, ExecError> {
    for (a, b) in left.iter().zip(right.iter()) {
        if !py_eq(a, b) {
            return partial_order(a, b);
        }
    }
    Ok(Some(left.len().cmp(&right.len())))
}

/// Ordering for `<`-style comparisons; `None` when unordered (NaN).
pub fn partial_order(left: &Value, right: &Value) -> Result<Option<Ordering>, ExecError> {
    use Value as V;
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return Ok(Some(a.cmp(&b)));
    }
    if is_float_pair(left, right) {
        let (a, b) = (as_float(left).unwrap_or_default(), as_float(right).unwrap_or_default());
        return Ok(a.partial_cmp(&b));
    }
    match (left, right) {
        (V::Str(a), V::Str(b)) => Ok(Some(a.cmp(b))),
        (V::Bytes(a), V::Bytes(b)) => Ok(Some(a.cmp(b))),
        (V::List(a), V::List(b)) | (V::Tuple(a), V::Tuple(b)) => sequence_order(a, b),
        (V::Date(a), V::Date(b)) => Ok(Some(a.cmp(b))),
        (V::DateTime(a), V::DateTime(b)) => Ok(Some(a.cmp(b))),
        (V::Time(a), V::Time(b)) => Ok(Some(a.cmp(b))),
        (V::TimeDelta(a), V::TimeDelta(b)) => Ok(Some(a.cmp(b))),
        (V::Decimal(a), V::Decimal(b)) => match (a.parse::<f64>(), b.parse::<f64>()) {
            (Ok(x), Ok(y)) => Ok(x.partial_cmp(&y)),
            _ => Ok(None),
        },
        (V::Decimal(text), other) | (other, V::Decimal(text)) if as_float(other).is_some() => {
            let decimal = text.parse::<f64>().unwrap_or(f64::NAN);
            let number = as_float(other).unwrap_or_default();
            let ordering = decimal.partial_cmp(&number);
            Ok(if matches!(left, V::Decimal(_)) {
                ordering
            } else {
                ordering.map(Ordering::reverse)
            })
        }
        (V::EnumMember(member), other) if member.mixin_value => partial_order(&member.value, other),
        (other, V::EnumMember(member)) if member.mixin_value => partial_order(other, &member.value),
        _ => Err(ExecError::type_error(format!(
            "'<' not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Total ordering used by `min`, `max` and `sorted`.
pub fn order(left: &Value, right: &Value) -> Result<Ordering, ExecError> {
    Ok(partial_order(left, right)?.unwrap_or(Ordering::Equal))
}

pub fn contains(container: &Value, item: &Value) -> Result<bool, ExecError> {
    match container {
        Value::Str(text) => match item {
            Value::Str(needle) => Ok(text.contains(&**needle)),
            other => Err(ExecError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) | Value::Set(items) | Value::FrozenSet(items) => {
            Ok(items.iter().any(|candidate| py_eq(candidate, item)))
        }
        Value::Dict(entries) => Ok(entries.iter().any(|(key, _)| py_eq(key, item))),
        Value::Enum(class) => Ok(match item {
            Value::EnumMember(member) => class.members.iter().any(|m| Rc::ptr_eq(m, member)),
            other => class.member_by_value(other).is_some(),
        }),
        other => Err(ExecError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExecError> {
    let ordered = |test: fn(Ordering) -> bool| -> Result<bool, ExecError> {
        Ok(partial_order(left, right)
            .map_err(|_| {
                ExecError::type_error(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?
            .is_some_and(test))
    };
    match op {
        CmpOp::Eq => Ok(py_eq(left, right)),
        CmpOp::NotEq => Ok(!py_eq(left, right)),
        CmpOp::Is => Ok(py_is(left, right)),
        CmpOp::IsNot => Ok(!py_is(left, right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => contains(right, left).map(|found| !found),
        CmpOp::Lt => ordered(Ordering::is_lt),
        CmpOp::LtE => ordered(Ordering::is_le),
        CmpOp::Gt => ordered(Ordering::is_gt),
        CmpOp::GtE => ordered(Ordering::is_ge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::BuiltinType;
    use schemaforge_config::LimitsConfig;

    fn budget() -> Budget {
        Budget::new(&LimitsConfig::default())
    }

    #[test]
    fn floor_semantics_follow_python() {
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(floor_mod(-7, 2).unwrap(), 1);
        assert_eq!(floor_mod(7, -2).unwrap(), -1);
        assert!(floor_div(1, 0).is_err());
    }

    #[test]
    fn integers_beyond_64_bits_stay_exact() {
        let value = binary(&budget(), BinOp::Pow, &Value::Int(2), &Value::Int(64)).unwrap();
        assert!(matches!(value, Value::Int(int) if int == 18_446_744_073_709_551_616));
        let value = binary(&budget(), BinOp::Sub, &value, &Value::Int(1)).unwrap();
        assert!(matches!(value, Value::Int(int) if int == i128::from(u64::MAX)));
    }

    #[test]
    fn overflow_past_128_bits_is_an_error() {
        let err =
            binary(&budget(), BinOp::Mult, &Value::Int(i128::MAX), &Value::Int(2)).unwrap_err();
        assert_eq!(err.to_string(), "integer overflow");
    }

    #[test]
    fn pipe_builds_unions_of_types() {
        let value = binary(
            &budget(),
            BinOp::BitOr,
            &Value::Type(BuiltinType::Int),
            &Value::None,
        )
        .unwrap();
        assert!(matches!(value, Value::Generic(_)));
    }

    #[test]
    fn repetition_respects_value_budget() {
        let limits = LimitsConfig {
            max_value_bytes: 8,
            ..LimitsConfig::default()
        };
        let err = binary(
            &Budget::new(&limits),
            BinOp::Mult,
            &Value::str("ab"),
            &Value::Int(10),
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("execution budget exceeded"));
    }

    #[test]
    fn comparisons_across_numbers() {
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(!compare(CmpOp::Lt, &Value::Float(f64::NAN), &Value::Int(1)).unwrap());
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn membership() {
        let list = Value::list(vec![Value::Int(1), Value::str("a")]);
        assert!(compare(CmpOp::In, &Value::str("a"), &list).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(2), &list).unwrap());
        assert!(contains(&Value::Int(3), &Value::Int(3)).is_err());
    }
}
