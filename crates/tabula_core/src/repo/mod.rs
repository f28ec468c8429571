//! Repository surface: the CRUD engine and its error type.

pub mod data_store;
pub mod error;
