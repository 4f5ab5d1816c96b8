//! Storage Backend adapter
//!
//! Thin read-only accessor over the SQLite usage store: table listing,
//! schema introspection, dry-run validation and capped query execution.

pub mod guard;
pub mod ingest;
pub mod record;

use crate::error::{Result, RoamingError};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub use guard::{check_read_only, normalize_sql};
pub use record::{DeviceType, UsageRecord};

/// Read-only operations the agent's tools are built on.
///
/// Implementations must never let a data-modifying statement reach the
/// engine and must not interleave reads from concurrent callers on one
/// connection.
pub trait SqlBackend: Send + Sync {
    fn list_tables(&self) -> Result<Vec<String>>;

    fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableDescription>>;

    /// Dry run: parse and compile `sql` without executing it.
    fn validate_query(&self, sql: &str) -> Result<()>;

    /// Run `sql`, returning at most `row_limit` rows.
    fn execute_query(&self, sql: &str, row_limit: usize) -> Result<QueryRows>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub create_sql: String,
    pub columns: Vec<ColumnInfo>,
    pub sample_rows: Vec<Vec<Value>>,
}

impl TableDescription {
    /// CREATE statement followed by a commented block of sample rows.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.create_sql.trim());
        let _ = writeln!(out);
        let _ = writeln!(out, "/*");
        let _ = writeln!(
            out,
            "{} rows from {} table:",
            self.sample_rows.len(),
            self.name
        );
        let header: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        let _ = writeln!(out, "{}", header.join("\t"));
        for row in &self.sample_rows {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            let _ = writeln!(out, "{}", cells.join("\t"));
        }
        let _ = write!(out, "*/");
        out
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// More rows were available than the cap allowed.
    pub truncated: bool,
}

/// SQLite-backed usage store. One connection per store; concurrent callers
/// are serialized by the mutex.
pub struct UsageStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    sample_rows: usize,
}

impl UsageStore {
    const DEFAULT_SAMPLE_ROWS: usize = 3;

    /// Open an existing database file in read-only mode.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(RoamingError::Database(format!(
                "database file {} does not exist",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RoamingError::Database(format!("failed to open {}: {}", path.display(), e)))?;

        info!("Opened usage store {} (read-only)", path.display());
        Ok(Self {
            path: Some(path),
            conn: Mutex::new(conn),
            sample_rows: Self::DEFAULT_SAMPLE_ROWS,
        })
    }

    /// Wrap an already-open connection (used for in-memory stores).
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            path: None,
            conn: Mutex::new(conn),
            sample_rows: Self::DEFAULT_SAMPLE_ROWS,
        }
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RoamingError::connectivity("usage store connection lock poisoned"))?;
        f(&conn)
    }

    fn describe_one(conn: &Connection, name: &str, sample_rows: usize) -> Result<TableDescription> {
        let create_sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(map_sqlite_error(other)),
            })?;
        let create_sql = create_sql
            .ok_or_else(|| RoamingError::logical(format!("no such table: {}", name)))?;

        let mut stmt = conn
            .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(map_sqlite_error)?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })
            .map_err(map_sqlite_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_sqlite_error)?;

        let sample_sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(name), sample_rows);
        let sample = read_rows(conn, &sample_sql, sample_rows)?;

        Ok(TableDescription {
            name: name.to_string(),
            create_sql,
            columns,
            sample_rows: sample.rows,
        })
    }
}

impl SqlBackend for UsageStore {
    fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name",
                )
                .map_err(map_sqlite_error)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_sqlite_error)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(map_sqlite_error)?;
            Ok(names)
        })
    }

    fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableDescription>> {
        let sample_rows = self.sample_rows;
        self.with_conn(|conn| {
            tables
                .iter()
                .map(|t| unquote_identifier(t))
                .filter(|t| !t.is_empty())
                .map(|t| Self::describe_one(conn, &t, sample_rows))
                .collect()
        })
    }

    fn validate_query(&self, sql: &str) -> Result<()> {
        let sql = prepare_text(sql)?;
        self.with_conn(|conn| {
            let stmt = conn.prepare(sql).map_err(|e| match map_sqlite_error(e) {
                RoamingError::Execution { kind, detail } if kind == crate::error::ExecutionErrorKind::Logical => {
                    RoamingError::Syntax(detail)
                }
                other => other,
            })?;
            if !stmt.readonly() {
                return Err(RoamingError::ForbiddenStatement(
                    "statement would modify the database".to_string(),
                ));
            }
            Ok(())
        })
    }

    fn execute_query(&self, sql: &str, row_limit: usize) -> Result<QueryRows> {
        let sql = prepare_text(sql)?;
        self.with_conn(|conn| {
            let rows = read_rows(conn, sql, row_limit)?;
            debug!(
                "Query returned {} rows (truncated: {})",
                rows.rows.len(),
                rows.truncated
            );
            Ok(rows)
        })
    }
}

/// Guard, strip the terminator and check statement kind. Returns the text
/// to hand to the engine.
fn prepare_text(sql: &str) -> Result<&str> {
    check_read_only(sql)?;
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err(RoamingError::Syntax("empty query".to_string()));
    }
    check_statement_kind(trimmed)?;
    Ok(trimmed)
}

/// Only a single query statement may run. When sqlparser cannot parse the
/// text the engine's own compiler has the final word.
fn check_statement_kind(sql: &str) -> Result<()> {
    match Parser::parse_sql(&SQLiteDialect {}, sql) {
        Ok(statements) => {
            if statements.len() != 1 {
                return Err(RoamingError::Syntax(format!(
                    "expected exactly one statement, found {}",
                    statements.len()
                )));
            }
            match &statements[0] {
                Statement::Query(_) => Ok(()),
                other => Err(RoamingError::ForbiddenStatement(format!(
                    "only SELECT queries may run, got: {}",
                    first_word(&other.to_string())
                ))),
            }
        }
        Err(e) => {
            debug!("sqlparser could not parse query, deferring to SQLite: {}", e);
            Ok(())
        }
    }
}

fn first_word(s: &str) -> String {
    s.split_whitespace().next().unwrap_or_default().to_uppercase()
}

fn read_rows(conn: &Connection, sql: &str, row_limit: usize) -> Result<QueryRows> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite_error)?;
    if !stmt.readonly() {
        return Err(RoamingError::ForbiddenStatement(
            "statement would modify the database".to_string(),
        ));
    }
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = stmt.query([]).map_err(map_sqlite_error)?;
    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(map_sqlite_error)? {
        if out.len() >= row_limit {
            truncated = true;
            break;
        }
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            let value = row.get_ref(idx).map_err(map_sqlite_error)?;
            values.push(value_to_json(value));
        }
        out.push(values);
    }

    Ok(QueryRows {
        columns,
        rows: out,
        truncated,
    })
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

/// Split engine failures into connectivity faults and query mistakes.
pub fn map_sqlite_error(err: rusqlite::Error) -> RoamingError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::OutOfMemory
            | ErrorCode::PermissionDenied
            | ErrorCode::FileLockingProtocolFailed
            | ErrorCode::InternalMalfunction => RoamingError::connectivity(err.to_string()),
            ErrorCode::ReadOnly => RoamingError::ForbiddenStatement(err.to_string()),
            _ => RoamingError::logical(err.to_string()),
        },
        rusqlite::Error::MultipleStatement => {
            RoamingError::Syntax("multiple statements are not allowed".to_string())
        }
        _ => RoamingError::logical(err.to_string()),
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn unquote_identifier(name: &str) -> String {
    name.trim()
        .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
        .to_string()
}
