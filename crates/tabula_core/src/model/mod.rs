//! Entity-facing model contracts.
//!
//! # Responsibility
//! - Define the capabilities every stored record type implements.
//!
//! # Invariants
//! - The core knows nothing about business fields beyond the identity value
//!   and what a registered mapping declares.

pub mod entity;
