//! Storage contexts and entity-type routing.
//!
//! # Responsibility
//! - Group entity types that share one storage session.
//! - Decide which context owns a given entity type or value.
//! - Re-resolve detached values through a type-indexed lookup table.
//!
//! # Invariants
//! - Every type an operation touches resolves to exactly one context, or
//!   the operation fails with `UnsupportedEntity`.
//! - Contexts are not `Sync`; sharing one across threads needs external
//!   serialization.

pub mod data_context;
pub mod reconciler;
pub mod router;
