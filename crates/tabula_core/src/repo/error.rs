//! Repository error taxonomy.
//!
//! # Invariants
//! - "No row" is never an error; absence travels as `None` or a no-op.
//! - Every variant propagates to the caller unchanged; nothing is retried.

use crate::db::DbError;
use crate::mapping::schema::MappingError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure of a repository, routing or registration operation.
#[derive(Debug)]
pub enum RepoError {
    /// A required argument is missing or malformed.
    InvalidArgument(String),
    /// A numeric argument is outside its accepted range.
    OutOfRange { name: &'static str, value: i64 },
    Mapping(MappingError),
    /// No registered context claims the entity type.
    UnsupportedEntity(&'static str),
    /// The storage session could not be verified while the store started.
    StartupVerification(String),
    Db(DbError),
    /// A stored row or value does not fit the entity shape.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::OutOfRange { name, value } => {
                write!(f, "`{name}` must not be negative, got {value}")
            }
            Self::Mapping(err) => write!(f, "mapping error: {err}"),
            Self::UnsupportedEntity(entity) => {
                write!(f, "items of type {entity} are not supported by any context")
            }
            Self::StartupVerification(message) => {
                write!(f, "storage verification failed: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mapping(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidArgument(_)
            | Self::OutOfRange { .. }
            | Self::UnsupportedEntity(_)
            | Self::StartupVerification(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<MappingError> for RepoError {
    fn from(value: MappingError) -> Self {
        Self::Mapping(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
