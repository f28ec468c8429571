//! Per-context registry of resolved schema descriptors.

use crate::mapping::schema::{EntityMapping, MappingError, SchemaDescriptor};
use crate::model::entity::{Entity, EntityType};
use crate::repo::error::{RepoError, RepoResult};
use log::debug;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Type-indexed schema cache, filled once while a context is built.
///
/// Read-only after the owning context is built, so shared descriptors can be
/// handed out without locking.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    schemas: HashMap<TypeId, Arc<SchemaDescriptor>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records the mapping for `T`.
    pub fn register<T: Entity>(
        &mut self,
        mapping: &EntityMapping,
    ) -> Result<Arc<SchemaDescriptor>, MappingError> {
        let entity = EntityType::of::<T>();
        if self.schemas.contains_key(&entity.id()) {
            return Err(MappingError::DuplicateRegistration {
                entity: entity.name(),
            });
        }

        let schema = Arc::new(SchemaDescriptor::build::<T>(mapping)?);
        debug!(
            "event=mapping_register module=mapping status=ok entity={} table={} columns={}",
            entity,
            schema.table_name(),
            schema.columns().len()
        );
        self.schemas.insert(entity.id(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn resolve<T: Entity>(&self) -> RepoResult<Arc<SchemaDescriptor>> {
        self.resolve_type(EntityType::of::<T>())
    }

    pub fn resolve_type(&self, entity: EntityType) -> RepoResult<Arc<SchemaDescriptor>> {
        self.schemas
            .get(&entity.id())
            .cloned()
            .ok_or(RepoError::UnsupportedEntity(entity.name()))
    }

    pub fn supports(&self, type_id: TypeId) -> bool {
        self.schemas.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered entity type names, sorted.
    pub fn entity_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.schemas.values().map(|schema| schema.entity_name()).collect();
        names.sort_unstable();
        names
    }

    /// Registered descriptors sorted by table name.
    pub fn schemas(&self) -> Vec<Arc<SchemaDescriptor>> {
        let mut schemas: Vec<_> = self.schemas.values().cloned().collect();
        schemas.sort_by(|left, right| left.table_name().cmp(right.table_name()));
        schemas
    }
}

#[cfg(test)]
mod tests {
    use super::MappingRegistry;
    use crate::mapping::schema::{EntityMapping, MappingError};
    use crate::model::entity::{DataItem, EntityType};
    use crate::repo::error::RepoError;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Crate {
        id: i64,
        label: String,
    }

    impl DataItem for Crate {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Pallet {
        id: i64,
    }

    impl DataItem for Pallet {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    #[test]
    fn resolve_returns_the_cached_descriptor() {
        let mut registry = MappingRegistry::new();
        let registered = registry
            .register::<Crate>(&EntityMapping::table("crates").key("id"))
            .unwrap();

        let first = registry.resolve::<Crate>().unwrap();
        let second = registry.resolve_type(EntityType::of::<Crate>()).unwrap();
        assert!(Arc::ptr_eq(&registered, &first));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entity_names().len(), 1);
        assert!(registry.entity_names()[0].ends_with("Crate"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = MappingRegistry::new();
        let mapping = EntityMapping::table("crates").key("id");
        registry.register::<Crate>(&mapping).unwrap();
        let err = registry.register::<Crate>(&mapping).unwrap_err();
        assert!(matches!(err, MappingError::DuplicateRegistration { .. }));
    }

    #[test]
    fn unregistered_type_is_unsupported() {
        let registry = MappingRegistry::new();
        assert!(registry.is_empty());
        let err = registry.resolve::<Pallet>().unwrap_err();
        assert!(matches!(err, RepoError::UnsupportedEntity(name) if name.ends_with("Pallet")));
    }

    #[test]
    fn failed_registration_leaves_registry_untouched() {
        let mut registry = MappingRegistry::new();
        registry
            .register::<Crate>(&EntityMapping::table("crates"))
            .unwrap_err();
        assert!(registry.is_empty());
    }
}
