//! Entity identity capability.
//!
//! # Responsibility
//! - Define the object-safe "has an integer identity" contract.
//! - Carry the runtime type handle used for routing and reconciliation.
//!
//! # Invariants
//! - `id() == 0` means "not yet persisted".
//! - `id() > 0` means "persisted under this key".
//! - `entity_type()` on `&dyn DataItem` equals `EntityType::of::<T>()` for the
//!   concrete `T` behind the reference.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::fmt::{Display, Formatter};

/// Runtime handle of an entity type.
#[derive(Debug, Clone, Copy)]
pub struct EntityType {
    id: TypeId,
    name: &'static str,
}

impl EntityType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name, for diagnostics only.
    pub fn name(self) -> &'static str {
        self.name
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityType {}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity capability implemented by every stored record type.
///
/// Object safe so heterogeneous batches can travel as `&dyn DataItem`.
pub trait DataItem: Any {
    fn id(&self) -> i64;

    fn set_id(&mut self, id: i64);

    /// Dynamic type of the value behind this reference.
    fn entity_type(&self) -> EntityType {
        EntityType::of::<Self>()
    }
}

/// Full capability set required by typed repository operations.
///
/// `Default` supplies the prototype instance inspected at registration time.
pub trait Entity: DataItem + Serialize + DeserializeOwned + Default {}

impl<T> Entity for T where T: DataItem + Serialize + DeserializeOwned + Default {}
