//! String helpers shared by builtins, alias generators and schema titles.

use super::ExecError;
use super::value::Value;

/// `str.title()`: uppercase the first cased character of every run of letters.
pub fn py_title(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if previous_cased {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(ch);
            previous_cased = false;
        }
    }
    out
}

pub fn py_capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn to_pascal(snake: &str) -> String {
    let titled: Vec<char> = py_title(snake).chars().collect();
    let mut out = String::with_capacity(titled.len());
    for (index, ch) in titled.iter().enumerate() {
        if *ch == '_' {
            let before = index
                .checked_sub(1)
                .and_then(|prev| titled.get(prev))
                .is_some_and(char::is_ascii_alphanumeric);
            let after = titled
                .get(index + 1)
                .is_some_and(|next| next.is_ascii_digit() || next.is_ascii_uppercase());
            if before && after {
                continue;
            }
        }
        out.push(*ch);
    }
    out
}

pub fn to_camel(snake: &str) -> String {
    let mut chars = snake.chars();
    let already_camel = chars.next().is_some_and(|first| first.is_ascii_lowercase())
        && snake.chars().all(|ch| ch.is_ascii_alphanumeric())
        && snake
            .chars()
            .skip_while(char::is_ascii_lowercase)
            .all(|ch| ch.is_ascii_alphanumeric())
        && !snake.as_bytes().windows(2).any(|pair| {
            matches!(pair, [digit, lower] if digit.is_ascii_digit() && lower.is_ascii_lowercase())
        });
    if already_camel {
        return snake.to_string();
    }
    let pascal = to_pascal(snake);
    let mut out = String::with_capacity(pascal.len());
    let mut lowered = false;
    for ch in pascal.chars() {
        if !lowered && ch != '_' {
            if ch.is_ascii_uppercase() {
                out.push(ch.to_ascii_lowercase());
            } else {
                out.push(ch);
            }
            lowered = true;
        } else {
            out.push(ch);
        }
    }
    out
}

fn insert_underscores(chars: &[char], split: impl Fn(char, char) -> bool) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len() + 4);
    for (index, ch) in chars.iter().enumerate() {
        out.push(*ch);
        if let Some(next) = chars.get(index + 1)
            && split(*ch, *next)
        {
            out.push('_');
        }
    }
    out
}

pub fn to_snake(camel: &str) -> String {
    let chars: Vec<char> = camel.chars().collect();
    // An uppercase run followed by a capitalised word: `HTTPResponse`.
    let mut first = Vec::with_capacity(chars.len() + 4);
    for (index, ch) in chars.iter().enumerate() {
        first.push(*ch);
        let next = chars.get(index + 1);
        let after = chars.get(index + 2);
        if ch.is_ascii_uppercase()
            && next.is_some_and(char::is_ascii_uppercase)
            && after.is_some_and(char::is_ascii_lowercase)
        {
            first.push('_');
        }
    }
    let second =
        insert_underscores(&first, |a, b| a.is_ascii_lowercase() && b.is_ascii_uppercase());
    let third = insert_underscores(&second, |a, b| a.is_ascii_digit() && b.is_ascii_uppercase());
    let fourth = insert_underscores(&third, |a, b| a.is_ascii_lowercase() && b.is_ascii_digit());
    fourth
        .into_iter()
        .collect::<String>()
        .replace('-', "_")
        .to_lowercase()
}

/// `str.format` with positional, indexed and named replacement fields.
/// Format specs and conversions are accepted but ignored.
pub fn format_str(
    template: &str,
    positional: &[Value],
    named: &[(String, Value)],
) -> Result<String, ExecError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    field.push(inner);
                }
                if !closed {
                    return Err(ExecError::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let name = field
                    .split([':', '!'])
                    .next()
                    .unwrap_or_default()
                    .trim();
                let value = if name.is_empty() {
                    let value = positional.get(auto_index);
                    auto_index += 1;
                    value.ok_or_else(|| {
                        ExecError::raise(
                            "IndexError",
                            format!(
                                "Replacement index {} out of range for positional args tuple",
                                auto_index - 1
                            ),
                        )
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    positional.get(index).ok_or_else(|| {
                        ExecError::raise(
                            "IndexError",
                            format!(
                                "Replacement index {index} out of range for positional args tuple"
                            ),
                        )
                    })?
                } else {
                    named
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| ExecError::key_error(&Value::str(name)))?
                };
                out.push_str(&value.to_str());
            }
            '}' => {
                return Err(ExecError::value_error(
                    "Single '}' encountered in format string",
                ));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_matches_python() {
        assert_eq!(py_title("first_name"), "First_Name");
        assert_eq!(py_title("hello world"), "Hello World");
        assert_eq!(py_title("1st"), "1St");
        assert_eq!(py_title("userID"), "Userid");
    }

    #[test]
    fn alias_generators() {
        assert_eq!(to_pascal("first_name"), "FirstName");
        assert_eq!(to_camel("first_name"), "firstName");
        assert_eq!(to_camel("alreadyCamel"), "alreadyCamel");
        assert_eq!(to_snake("HTTPResponseCode"), "http_response_code");
        assert_eq!(to_snake("firstName"), "first_name");
        assert_eq!(to_snake("version2Beta"), "version_2_beta");
    }

    #[test]
    fn format_replacement_fields() {
        let out = format_str(
            "{} and {1} or {name}, {{literal}}",
            &[Value::Int(1), Value::str("two")],
            &[("name".to_string(), Value::str("n"))],
        )
        .unwrap();
        assert_eq!(out, "1 and two or n, {literal}");
    }

    #[test]
    fn format_reports_missing_names() {
        let err = format_str("{missing}", &[], &[]).unwrap_err();
        assert_eq!(err.to_string(), "'missing'");
    }
}
