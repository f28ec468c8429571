//! Generic CRUD engine over routed storage contexts.
//!
//! # Responsibility
//! - Expose typed get/count/save/delete over any mapped entity type.
//! - Decide insert versus update from the identity value and stored state.
//! - Reconcile detached values before deleting them.
//!
//! # Invariants
//! - A store only exists after its provider initialized and verified.
//! - Each saved or deleted item is committed on its own; batches are not
//!   atomic and keep the effects of items processed before a failure.
//! - A failing item rolls back its own uncommitted work before the error
//!   propagates.

use crate::context::data_context::DataContext;
use crate::context::router::{context_for, ContextProvider};
use crate::mapping::record::{from_record, to_record};
use crate::model::entity::{DataItem, Entity, EntityType};
use crate::query::predicate::{Filter, Predicate};
use crate::repo::error::{RepoError, RepoResult};
use crate::storage::StorageSession;
use log::{debug, error, info};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Insert,
    Update,
}

impl SaveMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

/// Typed repository over every entity type the provider routes.
#[derive(Debug)]
pub struct DataStore<P> {
    provider: P,
}

impl<P: ContextProvider> DataStore<P> {
    /// Initializes and verifies `provider`, then wraps it.
    ///
    /// # Errors
    /// - Errors from `ContextProvider::initialize`, unchanged.
    /// - `StartupVerification` when verification fails; the store never
    ///   starts against an unreachable or mismatched database.
    pub fn new(mut provider: P) -> RepoResult<Self> {
        let started_at = Instant::now();
        info!("event=store_open module=repo status=start");

        if let Err(err) = provider.initialize() {
            error!(
                "event=store_open module=repo status=error duration_ms={} error_code=init_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
        if !provider.verify() {
            error!(
                "event=store_open module=repo status=error duration_ms={} error_code=verification_failed",
                started_at.elapsed().as_millis()
            );
            return Err(RepoError::StartupVerification(
                "database is unreachable or does not match the registered mappings".to_string(),
            ));
        }

        info!(
            "event=store_open module=repo status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(Self { provider })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Loads one entity by key; `None` when no row matches.
    pub fn get_by_key<T: Entity>(&self, key: i64) -> RepoResult<Option<T>> {
        let context = context_for::<T, _>(&self.provider)?;
        let found = context.find::<T>(key)?;
        debug!(
            "event=get_by_key module=repo status=ok entity={} key={} found={}",
            EntityType::of::<T>(),
            key,
            found.is_some()
        );
        Ok(found)
    }

    /// Loads every entity matching `predicate`, optionally paged.
    ///
    /// Paged reads (`skip` or `take` present) are ordered by the key column
    /// ascending. Returns `None`, not an empty vector, when nothing matches.
    ///
    /// # Errors
    /// - `OutOfRange` when `skip` or `take` is negative.
    /// - `InvalidArgument` when the predicate names an unpersisted field.
    pub fn get_many<T: Entity>(
        &self,
        predicate: Option<&Predicate<T>>,
        skip: Option<i64>,
        take: Option<i64>,
    ) -> RepoResult<Option<Vec<T>>> {
        ensure_non_negative("take", take)?;
        ensure_non_negative("skip", skip)?;

        let started_at = Instant::now();
        let context = context_for::<T, _>(&self.provider)?;
        let schema = context.schema_for::<T>()?;
        let filter = match predicate {
            Some(predicate) => predicate.filter().to_columns(&schema)?,
            None => Filter::All,
        };
        let paged = skip.is_some() || take.is_some();
        let order_column = paged.then(|| schema.key_column());

        let records = context.session().query(
            &schema,
            &filter,
            order_column,
            skip.unwrap_or(0),
            take,
        )?;
        debug!(
            "event=get_many module=repo status=ok entity={} table={} rows={} paged={} duration_ms={}",
            schema.entity_name(),
            schema.table_name(),
            records.len(),
            paged,
            started_at.elapsed().as_millis()
        );
        if records.is_empty() {
            return Ok(None);
        }

        let items = records
            .into_iter()
            .map(|record| from_record(&schema, record))
            .collect::<RepoResult<Vec<T>>>()?;
        Ok(Some(items))
    }

    /// Counts rows matching `predicate` (all rows when `None`).
    pub fn count<T: Entity>(&self, predicate: Option<&Predicate<T>>) -> RepoResult<u64> {
        let context = context_for::<T, _>(&self.provider)?;
        let schema = context.schema_for::<T>()?;
        let filter = match predicate {
            Some(predicate) => predicate.filter().to_columns(&schema)?,
            None => Filter::All,
        };
        Ok(context.session().count(&schema, &filter)?)
    }

    /// Inserts or overwrites `item` and returns it with its committed key.
    ///
    /// # Contract
    /// - `id == 0`: insert; the generated key is written back.
    /// - `id > 0` with a stored row: full overwrite of that row.
    /// - `id > 0` without a stored row: insert under the caller's key.
    ///
    /// # Errors
    /// - `InvalidArgument` for a negative id.
    pub fn save<T: Entity>(&self, item: T) -> RepoResult<T> {
        let context = context_for::<T, _>(&self.provider)?;
        save_in(context, item)
    }

    /// Saves items one by one against one shared context.
    ///
    /// Stops at the first failure; earlier items stay committed.
    pub fn save_many<T: Entity>(&self, items: Vec<T>) -> RepoResult<Vec<T>> {
        let context = context_for::<T, _>(&self.provider)?;
        let total = items.len();
        let mut saved = Vec::with_capacity(total);
        for item in items {
            match save_in(context, item) {
                Ok(item) => saved.push(item),
                Err(err) => {
                    error!(
                        "event=save_many module=repo status=error context={} saved={} total={} error={}",
                        context.name(),
                        saved.len(),
                        total,
                        err
                    );
                    return Err(err);
                }
            }
        }
        Ok(saved)
    }

    /// Deletes the persisted counterpart of `item`.
    ///
    /// A value whose key has no stored row is a silent no-op.
    pub fn delete_item(&self, item: &dyn DataItem) -> RepoResult<()> {
        let context = self.provider.context_for_item(item)?;
        delete_in(context, item)
    }

    /// Deletes a batch routed through the context of its first item.
    ///
    /// # Errors
    /// - `UnsupportedEntity` before anything is deleted when any item is not
    ///   served by that context.
    pub fn delete_items(&self, items: &[&dyn DataItem]) -> RepoResult<()> {
        let Some(first) = items.first() else {
            return Ok(());
        };
        let context = self.provider.context_for_item(*first)?;
        for item in items {
            let entity = item.entity_type();
            if !context.supports(entity.id()) {
                return Err(RepoError::UnsupportedEntity(entity.name()));
            }
        }

        for item in items {
            delete_in(context, *item)?;
        }
        Ok(())
    }
}

fn ensure_non_negative(name: &'static str, value: Option<i64>) -> RepoResult<()> {
    match value {
        Some(value) if value < 0 => Err(RepoError::OutOfRange { name, value }),
        _ => Ok(()),
    }
}

fn save_in<T: Entity>(context: &DataContext, mut item: T) -> RepoResult<T> {
    let id = item.id();
    if id < 0 {
        return Err(RepoError::InvalidArgument(format!(
            "{} id must not be negative, got {id}",
            EntityType::of::<T>()
        )));
    }

    let started_at = Instant::now();
    let schema = context.schema_for::<T>()?;
    let session = context.session();
    let write = || -> RepoResult<(SaveMode, i64)> {
        let record = to_record(&schema, &item)?;
        if id > 0 && session.find_by_key(&schema, id)?.is_some() {
            session.replace(&schema, &record)?;
            session.commit()?;
            return Ok((SaveMode::Update, id));
        }
        let key = session.add(&schema, &record)?;
        session.commit()?;
        Ok((SaveMode::Insert, key))
    };

    match write() {
        Ok((mode, key)) => {
            item.set_id(key);
            info!(
                "event=save module=repo status=ok table={} mode={} id={} duration_ms={}",
                schema.table_name(),
                mode.as_str(),
                key,
                started_at.elapsed().as_millis()
            );
            Ok(item)
        }
        Err(err) => Err(abandon(session, "save", schema.table_name(), err)),
    }
}

fn delete_in(context: &DataContext, item: &dyn DataItem) -> RepoResult<()> {
    let entity = item.entity_type();
    let schema = context.schema_for_type(entity)?;
    let Some(persisted) = context.reconcile(item)? else {
        debug!(
            "event=delete module=repo status=noop table={} id={}",
            schema.table_name(),
            item.id()
        );
        return Ok(());
    };

    let session = context.session();
    let key = persisted.id();
    match session
        .remove(&schema, key)
        .and_then(|()| session.commit())
    {
        Ok(()) => {
            info!(
                "event=delete module=repo status=ok table={} id={}",
                schema.table_name(),
                key
            );
            Ok(())
        }
        Err(err) => Err(abandon(session, "delete", schema.table_name(), err.into())),
    }
}

fn abandon(session: &dyn StorageSession, event: &str, table: &str, err: RepoError) -> RepoError {
    if let Err(rollback_err) = session.rollback() {
        error!(
            "event={} module=repo status=error table={} error_code=rollback_failed error={}",
            event, table, rollback_err
        );
    }
    error!(
        "event={} module=repo status=error table={} error={}",
        event, table, err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::DataStore;
    use crate::context::data_context::DataContext;
    use crate::mapping::schema::EntityMapping;
    use crate::model::entity::DataItem;
    use crate::query::predicate::Predicate;
    use crate::repo::error::RepoError;
    use crate::storage::SqliteSession;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Cask {
        id: i64,
        label: String,
        litres: i64,
    }

    impl DataItem for Cask {
        fn id(&self) -> i64 {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn cask(label: &str, litres: i64) -> Cask {
        Cask {
            id: 0,
            label: label.to_string(),
            litres,
        }
    }

    fn open_store() -> DataStore<DataContext> {
        let session = SqliteSession::open_in_memory().unwrap();
        session
            .connection()
            .execute_batch(
                "CREATE TABLE casks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    label TEXT NOT NULL UNIQUE,
                    litres INTEGER NOT NULL
                );",
            )
            .unwrap();
        let context = DataContext::builder("cellar")
            .map::<Cask>(EntityMapping::table("casks").key("id"))
            .unwrap()
            .build(session);
        DataStore::new(context).unwrap()
    }

    #[test]
    fn save_assigns_key_then_updates_in_place() {
        let store = open_store();
        let mut saved = store.save(cask("oak", 225)).unwrap();
        assert!(saved.id > 0);

        saved.litres = 200;
        let updated = store.save(saved.clone()).unwrap();
        assert_eq!(updated.id, saved.id);
        assert_eq!(store.count::<Cask>(None).unwrap(), 1);
        assert_eq!(store.get_by_key::<Cask>(saved.id).unwrap(), Some(updated));
    }

    #[test]
    fn negative_ids_and_page_bounds_are_rejected() {
        let store = open_store();
        let mut bad = cask("oak", 1);
        bad.id = -3;
        assert!(matches!(
            store.save(bad).unwrap_err(),
            RepoError::InvalidArgument(_)
        ));

        let err = store.get_many::<Cask>(None, None, Some(-1)).unwrap_err();
        assert!(matches!(err, RepoError::OutOfRange { name: "take", value: -1 }));
        let err = store.get_many::<Cask>(None, Some(-2), None).unwrap_err();
        assert!(matches!(err, RepoError::OutOfRange { name: "skip", value: -2 }));
    }

    #[test]
    fn get_many_distinguishes_absent_from_found() {
        let store = open_store();
        assert_eq!(store.get_many::<Cask>(None, None, None).unwrap(), None);

        store
            .save_many(vec![cask("oak", 225), cask("sherry", 500), cask("port", 550)])
            .unwrap();
        let large = Predicate::<Cask>::gt("litres", 300);
        let found = store.get_many(Some(&large), None, None).unwrap().unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.count(Some(&large)).unwrap(), 2);

        let page = store.get_many::<Cask>(None, Some(1), Some(1)).unwrap().unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].label, "sherry");
    }

    #[test]
    fn failed_save_rolls_back_and_keeps_store_usable() {
        let store = open_store();
        store.save(cask("oak", 225)).unwrap();
        let err = store.save(cask("oak", 100)).unwrap_err();
        assert!(matches!(err, RepoError::Db(_)));

        store.save(cask("sherry", 500)).unwrap();
        assert_eq!(store.count::<Cask>(None).unwrap(), 2);
    }

    #[test]
    fn deleting_unknown_item_is_a_noop() {
        let store = open_store();
        let saved = store.save(cask("oak", 225)).unwrap();
        let mut ghost = cask("ghost", 1);
        ghost.id = saved.id + 40;

        store.delete_item(&ghost).unwrap();
        assert_eq!(store.count::<Cask>(None).unwrap(), 1);

        store.delete_item(&saved).unwrap();
        assert_eq!(store.count::<Cask>(None).unwrap(), 0);
        store.delete_items(&[]).unwrap();
    }
}
