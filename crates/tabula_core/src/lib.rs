//! Generic object-to-table repository.
//!
//! Entity types are registered against tables per storage context; a
//! `DataStore` then offers typed get/count/save/delete over whichever
//! context serves each type.

pub mod context;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod query;
pub mod repo;
pub mod storage;

pub use context::data_context::{ContextState, DataContext, DataContextBuilder};
pub use context::router::{context_for, ContextProvider, ContextRouter};
pub use db::{DbError, DbResult, SessionOptions};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use mapping::schema::{EntityMapping, MappingError, SchemaDescriptor};
pub use model::entity::{DataItem, Entity, EntityType};
pub use query::predicate::{Filter, Predicate};
pub use repo::data_store::DataStore;
pub use repo::error::{RepoError, RepoResult};
pub use storage::{Record, SqliteSession, StorageSession};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
