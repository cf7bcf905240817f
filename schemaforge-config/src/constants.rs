/// File and environment names used when locating configuration.
pub mod files {
    pub const CONFIG_FILE_NAME: &str = "schemaforge.toml";
    pub const USER_CONFIG_DIR: &str = "schemaforge";
    pub const CONFIG_PATH_ENV_VAR: &str = "SCHEMAFORGE_CONFIG";
    pub const WORKSPACE_ENV_VAR: &str = "SCHEMAFORGE_WORKSPACE";
}

/// Interpreter budget defaults.
pub mod limits {
    pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024;
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;
    pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;
}
