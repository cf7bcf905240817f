use super::*;

use crate::limits::LimitsConfig;
use crate::loader::layers::ConfigLayerSource;
use crate::sandbox::DEFAULT_ALLOWED_MODULES;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_defaults_without_any_file() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");

    let manager = ConfigBuilder::new()
        .workspace(workspace.path().to_path_buf())
        .search_paths(SearchPaths::none())
        .build()
        .expect("defaults should load");

    assert!(manager.layer_stack().layers().is_empty());
    assert!(manager.config_path().is_none());
    assert_eq!(manager.config(), &ForgeConfig::default());
    assert_eq!(
        manager.config().sandbox.effective_allowlist().len(),
        DEFAULT_ALLOWED_MODULES.len()
    );
}

#[test]
fn test_layered_config_loading() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let workspace_root = workspace.path();

    // 1. User config
    let home_dir = workspace_root.join("home");
    fs::create_dir_all(&home_dir).expect("failed to create home dir");
    let user_config_path = home_dir.join("schemaforge.toml");
    fs::write(
        &user_config_path,
        "[limits]\nmax_steps = 5000\n\n[output]\npretty = true",
    )
    .expect("failed to write user config");

    // 2. Workspace config
    fs::write(
        workspace_root.join("schemaforge.toml"),
        "[limits]\ntimeout_ms = 0",
    )
    .expect("failed to write workspace config");

    let manager = ConfigBuilder::new()
        .workspace(workspace_root.to_path_buf())
        .search_paths(SearchPaths {
            user_files: vec![user_config_path],
        })
        .build()
        .expect("failed to load config");

    let config = manager.config();
    assert_eq!(config.limits.max_steps, 5000);
    assert_eq!(config.limits.timeout_ms, 0);
    assert!(config.output.pretty);
    assert_eq!(
        config.limits.max_source_bytes,
        LimitsConfig::default().max_source_bytes
    );

    let layers = manager.layer_stack().layers();
    assert_eq!(layers.len(), 2);
    assert!(matches!(layers[0].source, ConfigLayerSource::User { .. }));
    assert!(matches!(
        layers[1].source,
        ConfigLayerSource::Workspace { .. }
    ));
}

#[test]
fn test_explicit_file_replaces_workspace_file() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let workspace_root = workspace.path();
    fs::write(
        workspace_root.join("schemaforge.toml"),
        "[selection]\nmodel = \"FromWorkspace\"",
    )
    .expect("failed to write workspace config");

    let mut explicit = NamedTempFile::new().expect("failed to create temp file");
    writeln!(explicit, "[selection]\nmodel = \"FromExplicit\"").expect("write explicit");

    let manager = ConfigBuilder::new()
        .workspace(workspace_root.to_path_buf())
        .config_file(explicit.path().to_path_buf())
        .search_paths(SearchPaths::none())
        .build()
        .expect("explicit config should load");

    assert_eq!(
        manager.config().selection.model.as_deref(),
        Some("FromExplicit")
    );
    assert_eq!(manager.config_path(), Some(explicit.path()));
    assert_eq!(manager.layer_stack().layers().len(), 1);
}

#[test]
fn test_config_builder_overrides() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    let workspace_root = workspace.path();
    fs::write(
        workspace_root.join("schemaforge.toml"),
        "[sandbox]\nallowed_modules = [\"pydantic\", \"typing\"]",
    )
    .expect("failed to write workspace config");

    let manager = ConfigBuilder::new()
        .workspace(workspace_root.to_path_buf())
        .search_paths(SearchPaths::none())
        .cli_override(
            "sandbox.extra_allowed_modules",
            toml::Value::Array(vec![toml::Value::String("json".to_string())]),
        )
        .cli_override("selection.model", toml::Value::String("Order".to_string()))
        .build()
        .expect("failed to build config");

    assert_eq!(
        manager.config().sandbox.effective_allowlist(),
        vec!["pydantic".to_string(), "typing".into(), "json".into()]
    );
    assert_eq!(manager.config().selection.model.as_deref(), Some("Order"));

    let layers = manager.layer_stack().layers();
    assert!(matches!(
        layers.last().map(|layer| &layer.source),
        Some(ConfigLayerSource::Runtime)
    ));
}

#[test]
fn test_invalid_override_fails_validation() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");

    let err = ConfigBuilder::new()
        .workspace(workspace.path().to_path_buf())
        .search_paths(SearchPaths::none())
        .cli_override("limits.max_nesting_depth", toml::Value::Integer(1))
        .build()
        .expect_err("depth below the floor must be rejected");

    assert!(format!("{err:#}").contains("max_nesting_depth"));
}

#[test]
fn test_malformed_file_reports_path() {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    writeln!(file, "[limits\nmax_steps = 1").expect("write config");

    let err = ConfigManager::load_from_file(file.path()).expect_err("parse must fail");
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}

#[test]
#[serial]
fn test_env_config_path_is_honoured() {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    writeln!(file, "[output]\nstrip_root_title = true").expect("write config");

    // SAFETY: serialised with other env-mutating tests.
    unsafe {
        std::env::set_var(crate::constants::files::CONFIG_PATH_ENV_VAR, file.path());
    }
    let result = ConfigManager::load();
    // SAFETY: see above.
    unsafe {
        std::env::remove_var(crate::constants::files::CONFIG_PATH_ENV_VAR);
    }

    let manager = result.expect("env-selected config should load");
    assert!(manager.config().output.strip_root_title);
    assert_eq!(manager.config_path(), Some(file.path()));
}

#[test]
#[serial]
fn test_env_workspace_is_honoured() {
    let workspace = assert_fs::TempDir::new().expect("failed to create workspace");
    fs::write(
        workspace.path().join("schemaforge.toml"),
        "[debug]\nenable_tracing = true\ntrace_level = \"debug\"",
    )
    .expect("failed to write workspace config");

    // SAFETY: serialised with other env-mutating tests.
    unsafe {
        std::env::set_var(crate::constants::files::WORKSPACE_ENV_VAR, workspace.path());
    }
    let result = ConfigManager::load();
    // SAFETY: see above.
    unsafe {
        std::env::remove_var(crate::constants::files::WORKSPACE_ENV_VAR);
    }

    let manager = result.expect("workspace config should load");
    assert!(manager.config().debug.enable_tracing);
}
