//! SQLite implementation of the storage session boundary.
//!
//! # Responsibility
//! - Generate parameterized SQL from schema descriptors and column filters.
//! - Hold one connection and its open write transaction.
//!
//! # Invariants
//! - Identifiers come from validated descriptors and are always quoted;
//!   values are always bound, never interpolated.
//! - The first write after a commit opens a transaction (`BEGIN IMMEDIATE`);
//!   `commit`/`rollback` close it.

use crate::db::{
    bootstrap_connection, open_db, open_db_in_memory, DbError, DbResult, SessionOptions,
};
use crate::mapping::schema::SchemaDescriptor;
use crate::query::predicate::Filter;
use crate::storage::{Record, StorageSession};
use log::{debug, warn};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{Number, Value};
use std::path::Path;

/// Storage session over one SQLite connection.
pub struct SqliteSession {
    conn: Connection,
    options: SessionOptions,
}

impl SqliteSession {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            options: SessionOptions::default(),
        }
    }

    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Raw connection, for schema setup owned by the application.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn begin_if_needed(&self) -> DbResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        }
        Ok(())
    }

    fn select_sql(schema: &SchemaDescriptor) -> String {
        let columns = schema
            .columns()
            .iter()
            .map(|binding| quote(&binding.column))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {columns} FROM {}", quote(schema.table_name()))
    }
}

impl StorageSession for SqliteSession {
    fn initialize(&self) -> DbResult<()> {
        bootstrap_connection(&self.conn, &self.options)
    }

    fn ping(&self) -> DbResult<()> {
        self.conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn probe(&self, schema: &SchemaDescriptor) -> DbResult<()> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({});", quote(schema.table_name())))?;
        let existing = stmt
            .query_map([], |row| {
                Ok(TableColumn {
                    name: row.get("name")?,
                    declared_type: row.get("type")?,
                    pk: row.get("pk")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if existing.is_empty() {
            return Err(DbError::MissingRequiredTable(schema.table_name().to_string()));
        }

        for binding in schema.columns() {
            if !existing.iter().any(|column| column.name == binding.column) {
                return Err(DbError::MissingRequiredColumn {
                    table: schema.table_name().to_string(),
                    column: binding.column.clone(),
                });
            }
        }

        // Generated keys come from `last_insert_rowid`, so the key column
        // must be the table's rowid alias: the sole INTEGER PRIMARY KEY.
        let primary_keys = existing.iter().filter(|column| column.pk > 0).count();
        let is_rowid_alias = existing.iter().any(|column| {
            column.name == schema.key_column()
                && column.pk == 1
                && column.declared_type.eq_ignore_ascii_case("INTEGER")
        });
        if primary_keys != 1 || !is_rowid_alias {
            return Err(DbError::KeyNotRowId {
                table: schema.table_name().to_string(),
                column: schema.key_column().to_string(),
            });
        }
        Ok(())
    }

    fn find_by_key(&self, schema: &SchemaDescriptor, key: i64) -> DbResult<Option<Record>> {
        let sql = format!(
            "{} WHERE {} = ?1 LIMIT 1;",
            Self::select_sql(schema),
            quote(schema.key_column())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_record(schema, row)?)),
            None => Ok(None),
        }
    }

    fn query(
        &self,
        schema: &SchemaDescriptor,
        filter: &Filter,
        order_column: Option<&str>,
        skip: i64,
        take: Option<i64>,
    ) -> DbResult<Vec<Record>> {
        let mut binds = Vec::new();
        let mut sql = format!("{} WHERE ", Self::select_sql(schema));
        render_filter(filter, &mut sql, &mut binds)?;

        if let Some(column) = order_column {
            sql.push_str(&format!(" ORDER BY {} ASC", quote(column)));
        }
        if let Some(take) = take {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(SqlValue::Integer(take));
            binds.push(SqlValue::Integer(skip));
        } else if skip > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(SqlValue::Integer(skip));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record(schema, row)?);
        }
        Ok(records)
    }

    fn count(&self, schema: &SchemaDescriptor, filter: &Filter) -> DbResult<u64> {
        let mut binds = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {} WHERE ", quote(schema.table_name()));
        render_filter(filter, &mut sql, &mut binds)?;

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(binds), |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn add(&self, schema: &SchemaDescriptor, record: &Record) -> DbResult<i64> {
        let explicit_key = record_key(schema, record).filter(|key| *key > 0);

        let mut columns = Vec::new();
        let mut binds = Vec::new();
        for binding in schema.columns() {
            if binding.column == schema.key_column() && explicit_key.is_none() {
                continue;
            }
            columns.push(quote(&binding.column));
            binds.push(to_sql_value(record.get(&binding.column).unwrap_or(&Value::Null))?);
        }

        let table = quote(schema.table_name());
        let sql = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES;")
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders});",
                columns.join(", ")
            )
        };

        self.begin_if_needed()?;
        self.conn.execute(&sql, params_from_iter(binds))?;
        Ok(explicit_key.unwrap_or_else(|| self.conn.last_insert_rowid()))
    }

    fn replace(&self, schema: &SchemaDescriptor, record: &Record) -> DbResult<()> {
        let key = record_key(schema, record).ok_or_else(|| {
            DbError::UnsupportedValue(format!(
                "record for `{}` has no integer key",
                schema.table_name()
            ))
        })?;

        let mut assignments = Vec::new();
        let mut binds = Vec::new();
        for binding in schema.columns() {
            if binding.column == schema.key_column() {
                continue;
            }
            assignments.push(format!("{} = ?", quote(&binding.column)));
            binds.push(to_sql_value(record.get(&binding.column).unwrap_or(&Value::Null))?);
        }
        if assignments.is_empty() {
            return Ok(());
        }
        binds.push(SqlValue::Integer(key));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?;",
            quote(schema.table_name()),
            assignments.join(", "),
            quote(schema.key_column())
        );
        self.begin_if_needed()?;
        let changed = self.conn.execute(&sql, params_from_iter(binds))?;
        if changed == 0 {
            warn!(
                "event=replace module=storage status=noop table={} key={}",
                schema.table_name(),
                key
            );
        }
        Ok(())
    }

    fn remove(&self, schema: &SchemaDescriptor, key: i64) -> DbResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1;",
            quote(schema.table_name()),
            quote(schema.key_column())
        );
        self.begin_if_needed()?;
        self.conn.execute(&sql, [key])?;
        Ok(())
    }

    fn commit(&self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT;")?;
            debug!("event=commit module=storage status=ok");
        }
        Ok(())
    }

    fn rollback(&self) -> DbResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK;")?;
            debug!("event=rollback module=storage status=ok");
        }
        Ok(())
    }
}

struct TableColumn {
    name: String,
    declared_type: String,
    pk: i64,
}

fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn record_key(schema: &SchemaDescriptor, record: &Record) -> Option<i64> {
    record.get(schema.key_column()).and_then(Value::as_i64)
}

fn render_filter(filter: &Filter, sql: &mut String, binds: &mut Vec<SqlValue>) -> DbResult<()> {
    match filter {
        Filter::All => sql.push_str("1 = 1"),
        Filter::Compare { field, op, value } => {
            sql.push_str(&format!("{} {} ?", quote(field), op.as_sql()));
            binds.push(to_sql_value(value)?);
        }
        Filter::Like { field, pattern } => {
            sql.push_str(&format!("{} LIKE ?", quote(field)));
            binds.push(SqlValue::Text(pattern.clone()));
        }
        Filter::IsNull(field) => sql.push_str(&format!("{} IS NULL", quote(field))),
        Filter::NotNull(field) => sql.push_str(&format!("{} IS NOT NULL", quote(field))),
        Filter::OneOf { values, .. } if values.is_empty() => sql.push_str("1 = 0"),
        Filter::OneOf { field, values } => {
            let placeholders = vec!["?"; values.len()].join(", ");
            sql.push_str(&format!("{} IN ({placeholders})", quote(field)));
            for value in values {
                binds.push(to_sql_value(value)?);
            }
        }
        Filter::And(filters) => render_group(filters, " AND ", "1 = 1", sql, binds)?,
        Filter::Or(filters) => render_group(filters, " OR ", "1 = 0", sql, binds)?,
        Filter::Not(inner) => {
            sql.push_str("NOT (");
            render_filter(inner, sql, binds)?;
            sql.push(')');
        }
    }
    Ok(())
}

fn render_group(
    filters: &[Filter],
    separator: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
) -> DbResult<()> {
    if filters.is_empty() {
        sql.push_str(empty);
        return Ok(());
    }
    sql.push('(');
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            sql.push_str(separator);
        }
        render_filter(filter, sql, binds)?;
    }
    sql.push(')');
    Ok(())
}

fn to_sql_value(value: &Value) -> DbResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                SqlValue::Integer(integer)
            } else if number.is_u64() {
                return Err(DbError::UnsupportedValue(format!(
                    "integer {number} exceeds the SQLite range"
                )));
            } else {
                SqlValue::Real(number.as_f64().unwrap_or_default())
            }
        }
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    })
}

fn parse_record(schema: &SchemaDescriptor, row: &Row<'_>) -> DbResult<Record> {
    let mut record = Record::new();
    for (index, binding) in schema.columns().iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(integer) => Value::from(integer),
            ValueRef::Real(real) => Number::from_f64(real).map(Value::Number).ok_or_else(|| {
                DbError::UnsupportedValue(format!(
                    "non-finite real in {}.{}",
                    schema.table_name(),
                    binding.column
                ))
            })?,
            ValueRef::Text(bytes) => Value::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| {
                        DbError::UnsupportedValue(format!(
                            "invalid UTF-8 in {}.{}",
                            schema.table_name(),
                            binding.column
                        ))
                    })?
                    .to_string(),
            ),
            ValueRef::Blob(_) => {
                return Err(DbError::UnsupportedValue(format!(
                    "blob in {}.{}",
                    schema.table_name(),
                    binding.column
                )))
            }
        };
        record.insert(binding.column.clone(), value);
    }
    Ok(record)
}
