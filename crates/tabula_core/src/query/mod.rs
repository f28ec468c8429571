//! Query-side building blocks: predicates and their column translation.

pub mod predicate;
