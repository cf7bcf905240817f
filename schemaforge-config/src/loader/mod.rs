pub mod layers;

mod builder;
mod config;
mod manager;
mod merge;

#[cfg(test)]
mod tests;

pub use builder::ConfigBuilder;
pub use config::ForgeConfig;
pub use manager::{ConfigManager, SearchPaths};
pub use merge::merge_toml_values;
