//! Conversions between interpreter values and JSON.

use std::fmt::Write as _;

use chrono::TimeDelta;
use serde_json::{Map, Number, Value as Json};

use crate::interpreter::fields::int_to_json;
use crate::interpreter::value::{Value, float_repr, iso_datetime, iso_time};

/// ISO 8601 duration, e.g. `P1DT2H30M` or `PT0.5S`.
pub fn iso_duration(delta: TimeDelta) -> String {
    let micros = delta.num_microseconds().unwrap_or(i64::MAX);
    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();
    let days = micros / 86_400_000_000;
    let rest = micros % 86_400_000_000;
    let hours = rest / 3_600_000_000;
    let minutes = (rest / 60_000_000) % 60;
    let seconds = (rest / 1_000_000) % 60;
    let fraction = rest % 1_000_000;

    let mut out = format!("{sign}P");
    if days > 0 {
        let _ = write!(out, "{days}D");
    }
    if rest == 0 {
        if days == 0 {
            out.push_str("T0S");
        }
        return out;
    }
    out.push('T');
    if hours > 0 {
        let _ = write!(out, "{hours}H");
    }
    if minutes > 0 {
        let _ = write!(out, "{minutes}M");
    }
    if seconds > 0 || fraction > 0 {
        if fraction > 0 {
            let digits = format!("{fraction:06}");
            let _ = write!(out, "{seconds}.{}S", digits.trim_end_matches('0'));
        } else {
            let _ = write!(out, "{seconds}S");
        }
    }
    out
}

/// Key used when a dict is serialised as a JSON object.
fn object_key(key: &Value) -> Option<String> {
    match key {
        Value::Str(text) => Some(text.to_string()),
        Value::Int(int) => Some(int.to_string()),
        Value::Float(float) => Some(float_repr(*float)),
        Value::Bool(true) => Some("true".to_string()),
        Value::Bool(false) => Some("false".to_string()),
        Value::None => Some("None".to_string()),
        Value::EnumMember(member) => object_key(&member.value),
        other => match to_json(other)? {
            Json::String(text) => Some(text),
            _ => None,
        },
    }
}

/// JSON form of a value, as a default in a schema would show it.
///
/// `None` for values that have no JSON form (types, functions, non-finite
/// floats and the like).
pub fn to_json(value: &Value) -> Option<Json> {
    let json = match value {
        Value::None => Json::Null,
        Value::Bool(flag) => Json::Bool(*flag),
        Value::Int(int) => int_to_json(*int),
        Value::Float(float) => Json::Number(Number::from_f64(*float)?),
        Value::Str(text) => Json::String(text.to_string()),
        Value::Bytes(bytes) => Json::String(std::str::from_utf8(bytes).ok()?.to_string()),
        Value::List(items)
        | Value::Tuple(items)
        | Value::Set(items)
        | Value::FrozenSet(items) => {
            Json::Array(items.iter().map(to_json).collect::<Option<Vec<_>>>()?)
        }
        Value::Dict(entries) => {
            let mut object = Map::new();
            for (key, value) in entries.iter() {
                object.insert(object_key(key)?, to_json(value)?);
            }
            Json::Object(object)
        }
        Value::Decimal(text) => Json::String(text.to_string()),
        Value::Uuid(uuid) => Json::String(uuid.hyphenated().to_string()),
        Value::Date(date) => Json::String(date.format("%Y-%m-%d").to_string()),
        Value::DateTime(datetime) => Json::String(iso_datetime(datetime, 'T')),
        Value::Time(time) => Json::String(iso_time(time)),
        Value::TimeDelta(delta) => Json::String(iso_duration(*delta)),
        Value::EnumMember(member) => to_json(&member.value)?,
        Value::Instance(instance) => {
            let mut object = Map::new();
            for (name, value) in &instance.values {
                object.insert(name.clone(), to_json(value)?);
            }
            Json::Object(object)
        }
        _ => return None,
    };
    Some(json)
}

/// Interpreter value for a JSON document.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::None,
        Json::Bool(flag) => Value::Bool(*flag),
        Json::Number(number) => match number.to_string().parse::<i128>() {
            Ok(int) => Value::Int(int),
            Err(_) => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(text) => Value::str(text),
        Json::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        Json::Object(object) => Value::dict(
            object
                .iter()
                .map(|(key, value)| (Value::str(key), json_to_value(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn durations_use_iso_8601() {
        assert_eq!(iso_duration(TimeDelta::zero()), "PT0S");
        assert_eq!(iso_duration(TimeDelta::days(1)), "P1D");
        assert_eq!(
            iso_duration(TimeDelta::days(1) + TimeDelta::hours(2) + TimeDelta::minutes(30)),
            "P1DT2H30M"
        );
        assert_eq!(iso_duration(TimeDelta::milliseconds(1500)), "PT1.5S");
        assert_eq!(iso_duration(TimeDelta::seconds(-90)), "-PT1M30S");
    }

    #[test]
    fn containers_and_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let value = Value::dict(vec![
            (Value::str("when"), Value::Date(date)),
            (Value::Int(1), Value::tuple(vec![Value::Bool(true), Value::None])),
        ]);
        assert_eq!(
            to_json(&value),
            Some(json!({"when": "2024-02-29", "1": [true, null]}))
        );
    }

    #[test]
    fn types_have_no_json_form() {
        let value = Value::list(vec![Value::Type(crate::interpreter::value::BuiltinType::Int)]);
        assert_eq!(to_json(&value), None);
        assert_eq!(to_json(&Value::Float(f64::INFINITY)), None);
    }

    #[test]
    fn json_values_come_back() {
        let value = json_to_value(&json!({"a": [1, 2.5, "x", null]}));
        assert_eq!(value.repr(), "{'a': [1, 2.5, 'x', None]}");
    }
}
