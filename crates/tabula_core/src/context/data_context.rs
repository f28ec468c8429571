//! One logical store: a storage session plus the entity types it serves.
//!
//! # Responsibility
//! - Bind mapped entity types to a single storage session.
//! - Track readiness (`Uninitialized -> Initialized -> Verified`).
//!
//! # Invariants
//! - The supported type set is fixed once the builder finishes.
//! - Verification never panics; failures are logged and reported as `false`.

use crate::context::reconciler::Reconciler;
use crate::mapping::record::from_record;
use crate::mapping::registry::MappingRegistry;
use crate::mapping::schema::{EntityMapping, MappingError, SchemaDescriptor};
use crate::model::entity::{DataItem, Entity, EntityType};
use crate::repo::error::RepoResult;
use crate::storage::StorageSession;
use log::{error, info, warn};
use std::any::TypeId;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Initialized,
    Verified,
}

/// Collects entity mappings before the context is bound to a session.
#[derive(Debug)]
pub struct DataContextBuilder {
    name: String,
    mapping: MappingRegistry,
    reconciler: Reconciler,
}

impl DataContextBuilder {
    /// Registers `T` under `mapping`.
    ///
    /// # Errors
    /// - Any `MappingError`; a failed registration is a configuration bug.
    pub fn map<T: Entity>(mut self, mapping: EntityMapping) -> Result<Self, MappingError> {
        self.mapping.register::<T>(&mapping)?;
        self.reconciler.register::<T>();
        Ok(self)
    }

    pub fn build(self, session: impl StorageSession + 'static) -> DataContext {
        DataContext {
            name: self.name,
            session: Box::new(session),
            mapping: self.mapping,
            reconciler: self.reconciler,
            state: ContextState::Uninitialized,
        }
    }
}

pub struct DataContext {
    name: String,
    session: Box<dyn StorageSession>,
    mapping: MappingRegistry,
    reconciler: Reconciler,
    state: ContextState,
}

impl DataContext {
    pub fn builder(name: impl Into<String>) -> DataContextBuilder {
        DataContextBuilder {
            name: name.into(),
            mapping: MappingRegistry::new(),
            reconciler: Reconciler::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn mapping(&self) -> &MappingRegistry {
        &self.mapping
    }

    pub fn session(&self) -> &dyn StorageSession {
        self.session.as_ref()
    }

    pub fn supports(&self, type_id: TypeId) -> bool {
        self.mapping.supports(type_id)
    }

    pub fn schema_for<T: Entity>(&self) -> RepoResult<Arc<SchemaDescriptor>> {
        self.mapping.resolve::<T>()
    }

    pub fn schema_for_type(&self, entity: EntityType) -> RepoResult<Arc<SchemaDescriptor>> {
        self.mapping.resolve_type(entity)
    }

    /// Prepares the storage session. Repeated calls are no-ops.
    pub fn initialize(&mut self) -> RepoResult<()> {
        if self.state != ContextState::Uninitialized {
            warn!(
                "event=context_init module=context status=skipped context={} state={:?}",
                self.name, self.state
            );
            return Ok(());
        }

        let started_at = Instant::now();
        if let Err(err) = self.session.initialize() {
            error!(
                "event=context_init module=context status=error context={} duration_ms={} error={}",
                self.name,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }

        self.state = ContextState::Initialized;
        info!(
            "event=context_init module=context status=ok context={} entities={} duration_ms={}",
            self.name,
            self.mapping.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Confirms the session answers and serves every mapped table.
    pub fn verify(&mut self) -> bool {
        if self.state == ContextState::Uninitialized {
            warn!(
                "event=context_verify module=context status=error context={} error_code=not_initialized",
                self.name
            );
            return false;
        }

        if let Err(err) = self.session.ping() {
            error!(
                "event=context_verify module=context status=error context={} error_code=unreachable error={}",
                self.name, err
            );
            return false;
        }
        for schema in self.mapping.schemas() {
            if let Err(err) = self.session.probe(&schema) {
                error!(
                    "event=context_verify module=context status=error context={} table={} error_code=schema_mismatch error={}",
                    self.name,
                    schema.table_name(),
                    err
                );
                return false;
            }
        }

        self.state = ContextState::Verified;
        info!(
            "event=context_verify module=context status=ok context={} tables={}",
            self.name,
            self.mapping.len()
        );
        true
    }

    /// Typed key lookup inside this context.
    pub fn find<T: Entity>(&self, key: i64) -> RepoResult<Option<T>> {
        let schema = self.schema_for::<T>()?;
        match self.session.find_by_key(&schema, key)? {
            Some(record) => Ok(Some(from_record(&schema, record)?)),
            None => Ok(None),
        }
    }

    /// Re-reads the persisted counterpart of a detached value.
    pub fn reconcile(&self, item: &dyn DataItem) -> RepoResult<Option<Box<dyn DataItem>>> {
        self.reconciler.resolve(self, item)
    }
}

impl Debug for DataContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("entities", &self.mapping.entity_names())
            .finish()
    }
}
