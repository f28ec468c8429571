//! Declarative entity-to-table mapping.
//!
//! # Responsibility
//! - Turn per-type mapping declarations into reusable schema descriptors.
//! - Convert entity values to and from column-keyed records.
//!
//! # Invariants
//! - A descriptor is built once per type per context and never mutated.
//! - No global schema cache exists; each context owns its registry.

pub mod record;
pub mod registry;
pub mod schema;
