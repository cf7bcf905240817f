//! Command-line surface of the `schemaforge` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod check;
mod convert;
mod schema;

pub use check::handle_check_command;
pub use convert::handle_convert_command;
pub use schema::handle_schema_command;

#[derive(Debug, Parser)]
#[command(name = "schemaforge")]
#[command(about = "Derive a JSON Schema from Pydantic model source read on stdin")]
#[command(version)]
pub struct Cli {
    /// Configuration file (replaces ./schemaforge.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Derive this model instead of the last one declared
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Additional importable module (repeatable)
    #[arg(long = "allow-module", value_name = "MODULE")]
    pub allow_module: Vec<String>,

    /// Pretty-print the JSON payload
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Drop the root `title` from the generated schema
    #[arg(long)]
    pub strip_root_title: bool,

    /// Read source from a file instead of stdin
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Verify that the execution environment can be seeded
    Check,
    /// Print a JSON Schema describing schemaforge itself
    Schema {
        #[arg(value_enum)]
        target: SchemaTarget,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemaTarget {
    /// The `{schema, modelName, allModels}` / `{error}` payload
    Output,
    /// The `schemaforge.toml` configuration file
    Config,
}

/// One JSON document for stdout and whether it reports success.
#[derive(Debug)]
pub struct Emission {
    pub body: String,
    pub success: bool,
}

impl Emission {
    pub fn new(body: String, success: bool) -> Self {
        Self { body, success }
    }
}
