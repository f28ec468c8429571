//! Type-indexed lookup table for detached entities.
//!
//! A caller holding a `&dyn DataItem` cannot name the concrete type needed
//! for a typed key lookup. Each mapped type registers a closure bound to its
//! own `DataContext::find::<T>`, so resolution is a plain map lookup.

use crate::context::data_context::DataContext;
use crate::model::entity::{DataItem, Entity};
use crate::repo::error::{RepoError, RepoResult};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

type Lookup = Box<dyn Fn(&DataContext, i64) -> RepoResult<Option<Box<dyn DataItem>>>>;

#[derive(Default)]
pub struct Reconciler {
    lookups: HashMap<TypeId, Lookup>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Entity>(&mut self) {
        let lookup: Lookup = Box::new(|context: &DataContext, key: i64| {
            Ok(context
                .find::<T>(key)?
                .map(|found| Box::new(found) as Box<dyn DataItem>))
        });
        self.lookups.insert(TypeId::of::<T>(), lookup);
    }

    pub fn supports(&self, type_id: TypeId) -> bool {
        self.lookups.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    /// Re-reads the persisted counterpart of `item` from `context`.
    ///
    /// Returns `Ok(None)` when no row carries the item's key.
    pub fn resolve(
        &self,
        context: &DataContext,
        item: &dyn DataItem,
    ) -> RepoResult<Option<Box<dyn DataItem>>> {
        let entity = item.entity_type();
        let lookup = self
            .lookups
            .get(&entity.id())
            .ok_or(RepoError::UnsupportedEntity(entity.name()))?;
        lookup(context, item.id())
    }
}

impl Debug for Reconciler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("entries", &self.lookups.len())
            .finish()
    }
}
