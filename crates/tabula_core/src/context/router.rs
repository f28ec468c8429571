//! Entity-type routing across data contexts.

use crate::context::data_context::DataContext;
use crate::mapping::schema::MappingError;
use crate::model::entity::{DataItem, Entity, EntityType};
use crate::repo::error::{RepoError, RepoResult};
use log::warn;

/// Resolves which context owns an entity type.
///
/// `context_for_type` and `context_for_item` must agree for the same
/// dynamic type.
pub trait ContextProvider {
    /// Prepares every owned storage session. Called once, at store startup.
    fn initialize(&mut self) -> RepoResult<()>;

    /// Returns `true` when every owned session is reachable and serves its
    /// mapped tables.
    fn verify(&mut self) -> bool;

    fn context_for_type(&self, entity: EntityType) -> RepoResult<&DataContext>;

    fn context_for_item(&self, item: &dyn DataItem) -> RepoResult<&DataContext> {
        self.context_for_type(item.entity_type())
    }
}

/// Typed convenience over `ContextProvider::context_for_type`.
pub fn context_for<T: Entity, P: ContextProvider + ?Sized>(provider: &P) -> RepoResult<&DataContext> {
    provider.context_for_type(EntityType::of::<T>())
}

/// Single-context environments route everything they map to themselves.
impl ContextProvider for DataContext {
    fn initialize(&mut self) -> RepoResult<()> {
        DataContext::initialize(self)
    }

    fn verify(&mut self) -> bool {
        DataContext::verify(self)
    }

    fn context_for_type(&self, entity: EntityType) -> RepoResult<&DataContext> {
        if self.supports(entity.id()) {
            return Ok(self);
        }
        Err(RepoError::UnsupportedEntity(entity.name()))
    }
}

/// Routes entity types across several contexts.
///
/// # Invariants
/// - Each entity type is claimed by at most one context.
#[derive(Debug, Default)]
pub struct ContextRouter {
    contexts: Vec<DataContext>,
}

impl ContextRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context whose types do not overlap with registered ones.
    pub fn add_context(&mut self, context: DataContext) -> RepoResult<()> {
        if self.context(context.name()).is_some() {
            return Err(RepoError::InvalidArgument(format!(
                "context name already registered: {}",
                context.name()
            )));
        }
        for schema in context.mapping().schemas() {
            if self
                .contexts
                .iter()
                .any(|existing| existing.supports(schema.entity().id()))
            {
                return Err(MappingError::DuplicateRegistration {
                    entity: schema.entity_name(),
                }
                .into());
            }
        }

        self.contexts.push(context);
        Ok(())
    }

    pub fn with_context(mut self, context: DataContext) -> RepoResult<Self> {
        self.add_context(context)?;
        Ok(self)
    }

    pub fn context(&self, name: &str) -> Option<&DataContext> {
        self.contexts.iter().find(|context| context.name() == name)
    }

    pub fn contexts(&self) -> &[DataContext] {
        &self.contexts
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl ContextProvider for ContextRouter {
    fn initialize(&mut self) -> RepoResult<()> {
        for context in &mut self.contexts {
            context.initialize()?;
        }
        Ok(())
    }

    fn verify(&mut self) -> bool {
        if self.contexts.is_empty() {
            warn!("event=router_verify module=context status=error error_code=no_contexts");
            return false;
        }
        self.contexts.iter_mut().all(DataContext::verify)
    }

    fn context_for_type(&self, entity: EntityType) -> RepoResult<&DataContext> {
        self.contexts
            .iter()
            .find(|context| context.supports(entity.id()))
            .ok_or(RepoError::UnsupportedEntity(entity.name()))
    }
}
