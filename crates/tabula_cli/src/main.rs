//! CLI smoke harness for `tabula_core`.
//!
//! # Responsibility
//! - Drive the Beverage get/save/delete flow end-to-end against SQLite.
//! - Print one deterministic `Running <step>...` line per step.
//!
//! # Usage
//! `tabula_cli [db-path]`; without a path the database lives in memory.
//! Set `TABULA_LOG_DIR` to an absolute directory to capture core logs.

use serde::{Deserialize, Serialize};
use std::process::ExitCode;
use tabula_core::{
    default_log_level, init_logging, DataContext, DataItem, DataStore, DbError, EntityMapping,
    Predicate, SqliteSession,
};

const CREATE_BEVERAGES: &str = "
    CREATE TABLE IF NOT EXISTS beverages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        beverage_key TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        external_info_url TEXT,
        date_created TEXT NOT NULL DEFAULT ''
    );
    INSERT OR IGNORE INTO beverages (id, beverage_key, name, description, date_created)
    VALUES (1, 'GUINNESS', 'Guinness', 'Guinness Draught Stout', '2017-03-17');
";

const CIDER_KEY: &str = "STRONGBOW-HONEY";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Beverage {
    id: i64,
    key: String,
    name: String,
    description: Option<String>,
    external_info: Option<String>,
    date_created: String,
    // Counted per process, never stored.
    pours_this_session: u32,
}

impl DataItem for Beverage {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

type Store = DataStore<DataContext>;

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("TABULA_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level().as_str(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let store = match open_store(std::env::args().nth(1)) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("failed to open beverage store: {err}");
            return ExitCode::FAILURE;
        }
    };

    let results = [
        run_step("GetItem with Primary Key", || get_by_key(&store)),
        run_step("GetItems", || get_all(&store)),
        run_step("GetItems With Predicate", || get_guinness(&store, None)),
        run_step("GetItems With Predicate and Skip/Take", || {
            get_guinness(&store, Some((0, 10)))
        }),
        run_step("Save New Item", || save_new(&store)),
        run_step("Update Existing Item", || update_existing(&store)),
        run_step("Delete Item", || delete_existing(&store)),
    ];

    println!("tabula_core version={}", tabula_core::core_version());
    if results.iter().all(|passed| *passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn open_store(path: Option<String>) -> Result<Store, String> {
    let session = match path {
        Some(path) => SqliteSession::open(&path),
        None => SqliteSession::open_in_memory(),
    }
    .map_err(|err| err.to_string())?;
    session
        .connection()
        .execute_batch(CREATE_BEVERAGES)
        .map_err(|err| DbError::from(err).to_string())?;

    let context = DataContext::builder("beverages")
        .map::<Beverage>(
            EntityMapping::table("beverages")
                .key("id")
                .column("key", "beverage_key")
                .column("external_info", "external_info_url")
                .ignore("pours_this_session"),
        )
        .map_err(|err| err.to_string())?
        .build(session);
    DataStore::new(context).map_err(|err| err.to_string())
}

fn run_step(name: &str, step: impl FnOnce() -> Result<(), String>) -> bool {
    print!("Running {name}...");
    match step() {
        Ok(()) => {
            println!("Success");
            true
        }
        Err(err) => {
            println!("Failure");
            println!("{err}");
            false
        }
    }
}

fn by_key(key: &str) -> Predicate<Beverage> {
    Predicate::eq("key", key)
}

fn find_cider(store: &Store) -> Result<Option<Beverage>, String> {
    let found = store
        .get_many(Some(&by_key(CIDER_KEY)), None, None)
        .map_err(|err| err.to_string())?;
    Ok(found.and_then(|items| items.into_iter().next()))
}

fn get_by_key(store: &Store) -> Result<(), String> {
    match store.get_by_key::<Beverage>(1).map_err(|err| err.to_string())? {
        Some(_) => Ok(()),
        None => Err("Error: Unable to locate Beverage with ID = 1".to_string()),
    }
}

fn get_all(store: &Store) -> Result<(), String> {
    match store
        .get_many::<Beverage>(None, None, None)
        .map_err(|err| err.to_string())?
    {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err("Error: No Beverage records found".to_string()),
    }
}

fn get_guinness(store: &Store, page: Option<(i64, i64)>) -> Result<(), String> {
    let (skip, take) = match page {
        Some((skip, take)) => (Some(skip), Some(take)),
        None => (None, None),
    };
    match store
        .get_many(Some(&by_key("GUINNESS")), skip, take)
        .map_err(|err| err.to_string())?
    {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err("Error: No Beverage record found for GUINNESS".to_string()),
    }
}

fn save_new(store: &Store) -> Result<(), String> {
    let cider = Beverage {
        key: CIDER_KEY.to_string(),
        name: "Strongbow Honey".to_string(),
        description: Some("Strongbow Hard Cider - Honey".to_string()),
        ..Beverage::default()
    };
    let saved = store.save(cider).map_err(|err| err.to_string())?;
    if saved.id == 0 {
        return Err("Error: Id not populated for new item".to_string());
    }
    Ok(())
}

fn update_existing(store: &Store) -> Result<(), String> {
    let Some(mut existing) = find_cider(store)? else {
        return Err("Error: Unable to load existing record for test".to_string());
    };
    let description = format!("{}-Test", existing.description.unwrap_or_default());
    existing.description = Some(description.clone());
    store.save(existing).map_err(|err| err.to_string())?;

    let Some(reloaded) = find_cider(store)? else {
        return Err("Error: Unable to reload existing record for test".to_string());
    };
    if reloaded.description.as_deref() != Some(description.as_str()) {
        return Err("Error: Changes did not save correctly".to_string());
    }
    Ok(())
}

fn delete_existing(store: &Store) -> Result<(), String> {
    let Some(existing) = find_cider(store)? else {
        return Err("Error: Unable to load existing record for test".to_string());
    };
    store.delete_item(&existing).map_err(|err| err.to_string())?;

    if find_cider(store)?.is_some() {
        return Err("Error: Record not deleted".to_string());
    }
    Ok(())
}
