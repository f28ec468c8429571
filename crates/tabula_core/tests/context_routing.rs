use serde::{Deserialize, Serialize};
use tabula_core::{
    context_for, ContextProvider, ContextRouter, DataContext, DataItem, DataStore, EntityMapping,
    EntityType, MappingError, RepoError, SqliteSession,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Brewery {
    id: i64,
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Invoice {
    id: i64,
    brewery_name: String,
    total_cents: i64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Coaster {
    id: i64,
}

macro_rules! data_item {
    ($($name:ident),+) => {
        $(impl DataItem for $name {
            fn id(&self) -> i64 {
                self.id
            }

            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
        })+
    };
}

data_item!(Brewery, Invoice, Coaster);

fn catalog_context() -> DataContext {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .connection()
        .execute_batch(
            "CREATE TABLE breweries (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO breweries (id, name) VALUES (1, 'St. James''s Gate'), (2, 'Brooklyn');",
        )
        .unwrap();
    DataContext::builder("catalog")
        .map::<Brewery>(EntityMapping::table("breweries").key("id"))
        .unwrap()
        .build(session)
}

fn billing_context() -> DataContext {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .connection()
        .execute_batch(
            "CREATE TABLE invoices (
                invoice_id INTEGER PRIMARY KEY,
                brewery TEXT NOT NULL,
                total_cents INTEGER NOT NULL
            );
            INSERT INTO invoices VALUES (1, 'Brooklyn', 12000);",
        )
        .unwrap();
    DataContext::builder("billing")
        .map::<Invoice>(
            EntityMapping::table("invoices")
                .key("id")
                .column("id", "invoice_id")
                .column("brewery_name", "brewery"),
        )
        .unwrap()
        .build(session)
}

fn open_router_store() -> DataStore<ContextRouter> {
    let router = ContextRouter::new()
        .with_context(catalog_context())
        .unwrap()
        .with_context(billing_context())
        .unwrap();
    DataStore::new(router).unwrap()
}

#[test]
fn each_type_is_served_by_its_own_context() {
    let store = open_router_store();

    assert_eq!(
        context_for::<Brewery, _>(store.provider()).unwrap().name(),
        "catalog"
    );
    assert_eq!(
        context_for::<Invoice, _>(store.provider()).unwrap().name(),
        "billing"
    );

    let invoice = store.get_by_key::<Invoice>(1).unwrap().unwrap();
    assert_eq!(invoice.brewery_name, "Brooklyn");
    assert_eq!(store.count::<Brewery>(None).unwrap(), 2);

    let saved = store
        .save(Invoice {
            brewery_name: "St. James's Gate".to_string(),
            total_cents: 990,
            ..Invoice::default()
        })
        .unwrap();
    assert_eq!(saved.id, 2);
    assert_eq!(store.count::<Invoice>(None).unwrap(), 2);
    assert_eq!(store.count::<Brewery>(None).unwrap(), 2);
}

#[test]
fn unregistered_types_fail_with_unsupported_entity() {
    let store = open_router_store();

    let err = store.get_by_key::<Coaster>(1).unwrap_err();
    assert!(matches!(err, RepoError::UnsupportedEntity(name) if name.ends_with("Coaster")));
    assert!(matches!(
        store.save(Coaster::default()).unwrap_err(),
        RepoError::UnsupportedEntity(_)
    ));
    assert!(matches!(
        store.delete_item(&Coaster { id: 1 }).unwrap_err(),
        RepoError::UnsupportedEntity(_)
    ));
    assert!(store
        .provider()
        .context_for_type(EntityType::of::<Coaster>())
        .is_err());
}

#[test]
fn mixed_context_delete_batch_is_rejected_before_any_delete() {
    let store = open_router_store();
    let brewery = store.get_by_key::<Brewery>(1).unwrap().unwrap();
    let invoice = store.get_by_key::<Invoice>(1).unwrap().unwrap();

    let err = store.delete_items(&[&brewery as &dyn DataItem, &invoice]).unwrap_err();
    assert!(matches!(err, RepoError::UnsupportedEntity(name) if name.ends_with("Invoice")));
    assert_eq!(store.count::<Brewery>(None).unwrap(), 2);
    assert_eq!(store.count::<Invoice>(None).unwrap(), 1);

    let other = store.get_by_key::<Brewery>(2).unwrap().unwrap();
    store.delete_items(&[&brewery as &dyn DataItem, &other]).unwrap();
    assert_eq!(store.get_many::<Brewery>(None, None, None).unwrap(), None);
}

#[test]
fn startup_fails_when_a_mapped_table_is_missing() {
    let broken = DataContext::builder("catalog")
        .map::<Brewery>(EntityMapping::table("breweries").key("id"))
        .unwrap()
        .build(SqliteSession::open_in_memory().unwrap());
    let router = ContextRouter::new()
        .with_context(billing_context())
        .unwrap()
        .with_context(broken)
        .unwrap();

    let err = DataStore::new(router).unwrap_err();
    assert!(matches!(err, RepoError::StartupVerification(_)));
}

#[test]
fn startup_fails_when_a_mapped_column_is_missing() {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .connection()
        .execute_batch("CREATE TABLE invoices (invoice_id INTEGER PRIMARY KEY, brewery TEXT);")
        .unwrap();
    let context = DataContext::builder("billing")
        .map::<Invoice>(
            EntityMapping::table("invoices")
                .key("id")
                .column("id", "invoice_id")
                .column("brewery_name", "brewery"),
        )
        .unwrap()
        .build(session);

    assert!(matches!(
        DataStore::new(context).unwrap_err(),
        RepoError::StartupVerification(_)
    ));
}

#[test]
fn empty_router_never_starts() {
    let err = DataStore::new(ContextRouter::new()).unwrap_err();
    assert!(matches!(err, RepoError::StartupVerification(_)));
}

#[test]
fn a_type_cannot_be_claimed_by_two_contexts() {
    let duplicate = DataContext::builder("catalog-replica")
        .map::<Brewery>(EntityMapping::table("breweries").key("id"))
        .unwrap()
        .build(SqliteSession::open_in_memory().unwrap());

    let err = ContextRouter::new()
        .with_context(catalog_context())
        .unwrap()
        .with_context(duplicate)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Mapping(MappingError::DuplicateRegistration { .. })
    ));
}

#[test]
fn startup_fails_when_the_key_is_not_the_rowid_alias() {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .connection()
        .execute_batch("CREATE TABLE breweries (id INTEGER NOT NULL DEFAULT 0, name TEXT);")
        .unwrap();
    let context = DataContext::builder("catalog")
        .map::<Brewery>(EntityMapping::table("breweries").key("id"))
        .unwrap()
        .build(session);

    assert!(matches!(
        DataStore::new(context).unwrap_err(),
        RepoError::StartupVerification(_)
    ));
}
