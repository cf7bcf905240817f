/// Recursively merge two TOML values.
///
/// If both values are tables, they are merged recursively.
/// Otherwise, the `overlay` value replaces the `base` value.
pub fn merge_toml_values(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrays_are_replaced_not_concatenated() {
        let mut base: toml::Value =
            toml::from_str("[sandbox]\nallowed_modules = [\"pydantic\", \"typing\"]")
                .expect("base parses");
        let overlay: toml::Value =
            toml::from_str("[sandbox]\nallowed_modules = [\"pydantic\"]").expect("overlay parses");

        merge_toml_values(&mut base, &overlay);

        let modules = base
            .get("sandbox")
            .and_then(|sandbox| sandbox.get("allowed_modules"))
            .and_then(toml::Value::as_array)
            .map(Vec::len);
        assert_eq!(modules, Some(1));
    }

    #[test]
    fn sibling_keys_survive_nested_merge() {
        let mut base: toml::Value =
            toml::from_str("[limits]\nmax_steps = 10\ntimeout_ms = 5").expect("base parses");
        let overlay: toml::Value = toml::from_str("[limits]\ntimeout_ms = 0").expect("overlay");

        merge_toml_values(&mut base, &overlay);

        let limits = base.get("limits").expect("limits table");
        assert_eq!(
            limits.get("max_steps").and_then(toml::Value::as_integer),
            Some(10)
        );
        assert_eq!(
            limits.get("timeout_ms").and_then(toml::Value::as_integer),
            Some(0)
        );
    }
}
