//! Core engine for schemaforge.
//!
//! Source text declaring Pydantic-style models is parsed and executed by a
//! restricted interpreter ([`interpreter`]) whose every import passes through
//! an [`ImportPolicy`]. Class declarations are observed while the source
//! runs ([`registry`]), the last declared model (or an explicitly selected
//! one) is chosen, and its JSON Schema is derived ([`schema`]). The
//! [`Pipeline`] ties these stages together and [`ForgeResult`] is the JSON
//! document reported to callers.
//!
//! ```no_run
//! use schemaforge_core::{ForgeResult, Pipeline};
//!
//! let source = "class User(BaseModel):\n    name: str\n";
//! let result = ForgeResult::from_outcome(Pipeline::default().run(source));
//! assert_eq!(result.exit_code(), 0);
//! ```

pub mod environment;
pub mod error;
pub mod interpreter;
pub mod pipeline;
pub mod policy;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod syntax;

pub use environment::ExecutionEnvironment;
pub use error::{ErrorKind, ForgeError};
pub use pipeline::{Extraction, Pipeline};
pub use policy::{AllowlistPolicy, ImportDenied, ImportPolicy};
pub use protocol::{ErrorPayload, ForgeResult, SchemaPayload};
pub use registry::{DiscoveredModel, ModelRegistry};
pub use schema::{SchemaError, model_json_schema};
