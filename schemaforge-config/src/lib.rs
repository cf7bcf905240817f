//! Configuration loader components for schemaforge.
//!
//! Settings are layered from built-in defaults, a user file, a workspace
//! file (or an explicit `--config` path) and runtime overrides coming from
//! the CLI. The merged TOML is deserialised into [`ForgeConfig`] and
//! validated before any source text is executed, so the import allowlist and
//! the interpreter budgets are fixed for the whole run.

pub mod constants;
pub mod debug;
pub mod limits;
pub mod loader;
pub mod root;
pub mod sandbox;

pub use debug::{DebugConfig, TraceLevel};
pub use limits::LimitsConfig;
pub use loader::{ConfigBuilder, ConfigManager, ForgeConfig, merge_toml_values};
pub use root::{OutputConfig, SelectionConfig};
pub use sandbox::{DEFAULT_ALLOWED_MODULES, SandboxConfig};
