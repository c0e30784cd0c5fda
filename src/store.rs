//! Idempotent SQLite loader: one table per record kind, upserts keyed by
//! natural key, per-dump completion markers and an audit log.
//!
//! Storage failures are the only fatal errors in the pipeline. A dump's
//! rows are committed in one transaction and its completion marker is
//! written only afterwards, so a crashed run is resumed by reprocessing
//! the dump from the start and relying on upsert idempotence.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, types::Value, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::normalize::{FieldValue, Record};
use crate::records::{FieldKind, RecordKind};

/// Outcome of upserting one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Per-dump load tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl LoadStats {
    /// Total records that reached the loader.
    #[must_use]
    pub fn loaded(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// How to resolve a record whose natural key exists with different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Overwrite with the incoming values. Correct for oldest-to-newest
    /// processing order.
    #[default]
    LastWins,

    /// Keep the stored values. For replaying historic dumps over a newer
    /// database.
    KeepExisting,
}

/// One row from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub datetime: String,
    pub datatype: String,
    pub msg: String,
}

/// Destination store over a SQLite connection.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create destination tables, natural-key indexes, the audit log and
    /// the completion-marker table. Safe to call on every run.
    pub fn init_schema(&self, kinds: &[RecordKind]) -> Result<()> {
        for kind in kinds {
            self.conn.execute_batch(&create_table_sql(kind))?;
        }
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS etl_log (
                datetime TEXT,
                datatype TEXT,
                msg TEXT
            );
            CREATE TABLE IF NOT EXISTS dump_log (
                dump_date TEXT PRIMARY KEY,
                completed_at TEXT
            );",
        )?;
        Ok(())
    }

    /// Upsert a batch of records inside one transaction.
    pub fn load(&mut self, records: &[Record], policy: ConflictPolicy) -> Result<LoadStats> {
        let tx = self.conn.transaction()?;
        let mut stats = LoadStats::default();

        for record in records {
            match upsert(&tx, record, policy)? {
                LoadOutcome::Inserted => stats.inserted += 1,
                LoadOutcome::Updated => stats.updated += 1,
                LoadOutcome::Unchanged => stats.unchanged += 1,
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    /// Whether a dump was fully processed by an earlier run.
    pub fn is_complete(&self, date: NaiveDate) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT dump_date FROM dump_log WHERE dump_date = ?1",
                params![date.format("%Y-%m-%d").to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record that a dump was fully processed.
    pub fn mark_complete(&self, date: NaiveDate) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO dump_log (dump_date, completed_at) VALUES (?1, ?2)",
            params![
                date.format("%Y-%m-%d").to_string(),
                chrono::Local::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Append a message to the audit log.
    pub fn log(&self, datatype: &str, msg: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO etl_log (datetime, datatype, msg) VALUES (?1, ?2, ?3)",
            params![chrono::Local::now().to_rfc3339(), datatype, msg],
        )?;
        Ok(())
    }

    /// Most recent audit log entries, newest first.
    pub fn recent_log(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT datetime, datatype, msg FROM etl_log ORDER BY datetime DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(LogEntry {
                datetime: row.get(0)?,
                datatype: row.get(1)?,
                msg: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Row count of a destination table.
    pub fn table_len(&self, table: &str) -> Result<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Schema SQL for one record kind: the table plus a unique index over the
/// natural key.
fn create_table_sql(kind: &RecordKind) -> String {
    let mut columns: Vec<String> = kind
        .fields
        .iter()
        .map(|f| format!("{} {}", quote_ident(&f.column), sql_type(f.kind)))
        .collect();
    columns.push("sha256 TEXT".to_string());

    let key_columns: Vec<String> = kind.natural_key.iter().map(|c| quote_ident(c)).collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {table} ({columns});\n\
         CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} ({key});",
        table = quote_ident(&kind.table),
        columns = columns.join(", "),
        index = quote_ident(&format!("ux_{}_natural_key", kind.table)),
        key = key_columns.join(", "),
    )
}

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "INTEGER",
        _ => "TEXT",
    }
}

/// Double-quote an identifier; `desc` and friends are SQL keywords.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Date(_) => Value::Text(value.render()),
        FieldValue::Integer(i) => Value::Integer(*i),
    }
}

/// Insert-if-absent, else update only when the content digest differs.
fn upsert(
    tx: &rusqlite::Transaction<'_>,
    record: &Record,
    policy: ConflictPolicy,
) -> rusqlite::Result<LoadOutcome> {
    let key_clause = record
        .natural_key
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let key_values: Vec<Value> = record
        .natural_key
        .iter()
        .map(|(_, rendered)| Value::Text(rendered.clone()))
        .collect();

    let existing: Option<String> = tx
        .query_row(
            &format!(
                "SELECT sha256 FROM {} WHERE {key_clause}",
                quote_ident(&record.table)
            ),
            rusqlite::params_from_iter(key_values.iter()),
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        None => {
            let mut columns: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            for (column, value) in &record.values {
                columns.push(quote_ident(column));
                values.push(to_sql_value(value));
            }
            columns.push("sha256".to_string());
            values.push(Value::Text(record.digest.clone()));

            let placeholders = vec!["?"; columns.len()].join(", ");
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders})",
                    quote_ident(&record.table),
                    columns.join(", "),
                ),
                rusqlite::params_from_iter(values.iter()),
            )?;
            Ok(LoadOutcome::Inserted)
        }
        Some(digest) if digest == record.digest => Ok(LoadOutcome::Unchanged),
        Some(_) => match policy {
            ConflictPolicy::KeepExisting => {
                debug!(table = %record.table, "conflicting record kept per policy");
                Ok(LoadOutcome::Unchanged)
            }
            ConflictPolicy::LastWins => {
                let mut assignments: Vec<String> = Vec::new();
                let mut values: Vec<Value> = Vec::new();
                for (column, value) in &record.values {
                    assignments.push(format!("{} = ?", quote_ident(column)));
                    values.push(to_sql_value(value));
                }
                assignments.push("sha256 = ?".to_string());
                values.push(Value::Text(record.digest.clone()));
                values.extend(key_values);

                tx.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE {key_clause}",
                        quote_ident(&record.table),
                        assignments.join(", "),
                    ),
                    rusqlite::params_from_iter(values.iter()),
                )?;
                Ok(LoadOutcome::Updated)
            }
        },
    }
}
