// Orbis - declarative entities over a relational store
//
// Declarations build a metadata registry; the query, mutation and schema
// engines read it to compile arguments into SQL and API types.

// Registry and declarations
pub mod metadata;
pub mod module;
pub mod orbis;

// Argument compilation and SQL building
pub mod arguments;
pub mod query;

// Engines
pub mod mutations;
pub mod queries;
pub mod schema;
pub mod session;
pub mod validation;

// Storage and infrastructure
pub mod storage;
pub mod viewer;

// Feature modules
pub mod auth;

// Common utilities
pub mod config;
pub mod error;
pub mod util;

#[cfg(test)]
mod fixtures;

// Re-exports for convenience
pub use arguments::{DataArgument, OrderByArgument, UniqueWhereArgument, WhereArgument};
pub use config::{EntityOptions, OrbisConfig, OrbisOptions};
pub use error::{OrbisError, OrbisResult};
pub use metadata::{OrbisMetadata, Record};
pub use module::OrbisModule;
pub use mutations::{CreateOneArgs, UpdateOneArgs};
pub use crate::orbis::Orbis;
pub use queries::{EntityList, FindManyArgs, FindOneArgs, ListInfo, OperationOptions};
pub use session::Session;
pub use storage::{SqliteStorage, Storage};
pub use viewer::{with_viewer_context, ViewerContext};
