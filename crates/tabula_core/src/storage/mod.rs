//! Storage engine boundary.
//!
//! # Responsibility
//! - Define the capability set the CRUD engine needs from a storage engine.
//! - Keep SQL generation and connection handling behind that boundary.
//!
//! # Invariants
//! - Sessions only see column names; field names never cross this boundary.
//! - Writes are invisible to other connections until `commit` succeeds.
//! - Sessions are not safe for concurrent use; callers serialize access.

use crate::db::DbResult;
use crate::mapping::schema::SchemaDescriptor;
use crate::query::predicate::Filter;
use serde_json::Value;
use std::collections::BTreeMap;

pub mod sqlite;

pub use sqlite::SqliteSession;

/// One stored row keyed by storage column name.
pub type Record = BTreeMap<String, Value>;

/// Capability set consumed by the CRUD engine.
pub trait StorageSession {
    /// Prepares the underlying connection for use.
    fn initialize(&self) -> DbResult<()>;

    /// Confirms the underlying store answers at all.
    fn ping(&self) -> DbResult<()>;

    /// Confirms the mapped table and every mapped column exist.
    fn probe(&self, schema: &SchemaDescriptor) -> DbResult<()>;

    fn find_by_key(&self, schema: &SchemaDescriptor, key: i64) -> DbResult<Option<Record>>;

    /// Runs a column-level `filter`, optionally ordered and paged.
    ///
    /// `take == None` means no upper bound.
    fn query(
        &self,
        schema: &SchemaDescriptor,
        filter: &Filter,
        order_column: Option<&str>,
        skip: i64,
        take: Option<i64>,
    ) -> DbResult<Vec<Record>>;

    fn count(&self, schema: &SchemaDescriptor, filter: &Filter) -> DbResult<u64>;

    /// Stages an insert and returns the row key.
    ///
    /// A non-positive key in `record` lets the engine assign one.
    fn add(&self, schema: &SchemaDescriptor, record: &Record) -> DbResult<i64>;

    /// Stages a full overwrite of the row addressed by the record key.
    fn replace(&self, schema: &SchemaDescriptor, record: &Record) -> DbResult<()>;

    fn remove(&self, schema: &SchemaDescriptor, key: i64) -> DbResult<()>;

    fn commit(&self) -> DbResult<()>;

    /// Discards staged, uncommitted work.
    fn rollback(&self) -> DbResult<()>;
}
