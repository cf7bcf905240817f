use anyhow::Result;
use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const USER_SOURCE: &str = "\
from pydantic import BaseModel
from typing import Optional

class Address(BaseModel):
    city: str

class User(BaseModel):
    name: str
    age: Optional[int] = None
";

/// A command isolated from the caller's configuration files and environment.
fn schemaforge(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("schemaforge")?;
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("HOME", dir.path())
        .env_remove("SCHEMAFORGE_CONFIG")
        .env_remove("RUST_LOG");
    Ok(cmd)
}

fn stdout_json(output: &std::process::Output) -> Result<Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

#[test]
fn converts_stdin_and_selects_the_last_model() -> Result<()> {
    let dir = TempDir::new()?;
    let output = schemaforge(&dir)?.write_stdin(USER_SOURCE).output()?;
    assert!(output.status.success());

    let payload = stdout_json(&output)?;
    assert_eq!(payload.get("modelName"), Some(&json!("User")));
    assert_eq!(payload.get("allModels"), Some(&json!(["Address", "User"])));
    assert_eq!(
        payload.pointer("/schema/required"),
        Some(&json!(["name"]))
    );
    assert_eq!(
        payload.pointer("/schema/properties/age/anyOf"),
        Some(&json!([{"type": "integer"}, {"type": "null"}]))
    );
    assert!(payload.get("error").is_none());
    Ok(())
}

#[test]
fn empty_input_exits_with_an_error_payload() -> Result<()> {
    let dir = TempDir::new()?;
    schemaforge(&dir)?
        .write_stdin("   \n")
        .assert()
        .code(1)
        .stdout(predicate::str::diff("{\"error\":\"No input provided\"}\n"));
    Ok(())
}

#[test]
fn denied_import_names_the_module() -> Result<()> {
    let dir = TempDir::new()?;
    schemaforge(&dir)?
        .write_stdin("import os\n")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Import of 'os' is not allowed"))
        .stdout(predicate::str::contains("schema").not());
    Ok(())
}

#[test]
fn no_models_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let output = schemaforge(&dir)?
        .write_stdin("def helper():\n    return 1\n")
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout_json(&output)?,
        json!({"error": "No BaseModel subclass found in the provided code."})
    );
    Ok(())
}

#[test]
fn model_flag_selects_by_name() -> Result<()> {
    let dir = TempDir::new()?;
    let output = schemaforge(&dir)?
        .args(["--model", "Address", "--strip-root-title"])
        .write_stdin(USER_SOURCE)
        .output()?;
    assert!(output.status.success());
    let payload = stdout_json(&output)?;
    assert_eq!(payload.get("modelName"), Some(&json!("Address")));
    assert!(payload.pointer("/schema/title").is_none());
    assert_eq!(
        payload.pointer("/schema/properties/city/title"),
        Some(&json!("City"))
    );

    schemaforge(&dir)?
        .args(["--model", "Missing"])
        .write_stdin(USER_SOURCE)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Model 'Missing' not found in the provided code. Declared models: Address, User",
        ));
    Ok(())
}

#[test]
fn input_file_and_pretty_output() -> Result<()> {
    let dir = TempDir::new()?;
    let source = dir.child("models.py");
    source.write_str(USER_SOURCE)?;

    let output = schemaforge(&dir)?
        .args(["--pretty", "--input"])
        .arg(source.path())
        .output()?;
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout.clone())?;
    assert!(text.starts_with("{\n  \"schema\": {"));
    assert_eq!(stdout_json(&output)?.get("modelName"), Some(&json!("User")));
    Ok(())
}

#[test]
fn missing_input_file_is_reported_as_json() -> Result<()> {
    let dir = TempDir::new()?;
    schemaforge(&dir)?
        .args(["--input", "nope.py"])
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("{\"error\":\"Failed to read input file"));
    Ok(())
}

#[test]
fn workspace_config_and_allow_module_flag() -> Result<()> {
    let dir = TempDir::new()?;
    dir.child("schemaforge.toml").write_str(
        "[sandbox]\nallowed_modules = [\"pydantic\", \"typing_extensions\", \"annotated_types\", \"datetime\", \"decimal\", \"uuid\", \"enum\"]\n",
    )?;

    // `typing` is missing from the workspace allowlist, so seeding fails.
    schemaforge(&dir)?
        .write_stdin(USER_SOURCE)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "Failed to import pydantic: Import of 'typing' is not allowed",
        ));

    schemaforge(&dir)?
        .args(["--allow-module", "typing"])
        .write_stdin(USER_SOURCE)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"modelName\":\"User\""));
    Ok(())
}

#[test]
fn invalid_config_is_reported_as_json() -> Result<()> {
    let dir = TempDir::new()?;
    let config = dir.child("broken.toml");
    config.write_str("[limits]\nmax_steps = 0\n")?;

    schemaforge(&dir)?
        .arg("--config")
        .arg(config.path())
        .write_stdin(USER_SOURCE)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("{\"error\":"));
    Ok(())
}

#[test]
fn check_reports_seeded_modules() -> Result<()> {
    let dir = TempDir::new()?;
    let output = schemaforge(&dir)?.arg("check").output()?;
    assert!(output.status.success());
    let report = stdout_json(&output)?;
    assert_eq!(report.get("ok"), Some(&json!(true)));
    let modules = report
        .get("modules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    assert!(modules.contains(&json!("pydantic")));
    Ok(())
}

#[test]
fn schema_subcommand_describes_the_protocol() -> Result<()> {
    let dir = TempDir::new()?;
    schemaforge(&dir)?
        .args(["schema", "output"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modelName"))
        .stdout(predicate::str::contains("allModels"));

    schemaforge(&dir)?
        .args(["schema", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allowed_modules"));
    Ok(())
}

#[test]
fn config_path_from_environment() -> Result<()> {
    let dir = TempDir::new()?;
    let config = dir.child("forge.toml");
    config.write_str("[selection]\nmodel = \"Address\"\n\n[output]\nstrip_root_title = true\n")?;

    let output = schemaforge(&dir)?
        .env("SCHEMAFORGE_CONFIG", config.path())
        .write_stdin(USER_SOURCE)
        .output()?;
    assert!(output.status.success());
    let payload = stdout_json(&output)?;
    assert_eq!(payload.get("modelName"), Some(&json!("Address")));
    assert!(payload.pointer("/schema/title").is_none());
    Ok(())
}
