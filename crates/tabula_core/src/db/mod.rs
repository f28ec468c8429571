//! SQLite connection bootstrap and storage-level errors.
//!
//! # Responsibility
//! - Open and configure SQLite connections used by storage sessions.
//! - Define the transport error type shared by every session operation.
//!
//! # Invariants
//! - Connections handed to sessions have the configured pragmas applied.
//! - Schema creation is owned by the application, never by this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;

pub use open::{bootstrap_connection, open_db, open_db_in_memory, SessionOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    MissingRequiredTable(String),
    MissingRequiredColumn { table: String, column: String },
    /// The key column is not the table's `INTEGER PRIMARY KEY`.
    KeyNotRowId { table: String, column: String },
    UnsupportedValue(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` does not exist")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` does not exist")
            }
            Self::KeyNotRowId { table, column } => write!(
                f,
                "key column `{table}.{column}` must be declared as the table's only INTEGER PRIMARY KEY"
            ),
            Self::UnsupportedValue(message) => write!(f, "unsupported stored value: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::KeyNotRowId { .. }
            | Self::UnsupportedValue(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
