//! CSV ingestion
//!
//! Bulk-loads an export of the usage spreadsheet into the `usage_logs`
//! table. This is the only writer in the crate and runs outside the agent.

use crate::catalog::USAGE_TABLE;
use crate::error::{Result, RoamingError};
use crate::storage::quote_identifier;
use crate::storage::record::{RawUsageRow, UsageRecord};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line in the source file, header included.
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub inserted: usize,
    pub skipped_blank: usize,
    pub rejected: Vec<RejectedRow>,
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE {} (
    imsi TEXT NOT NULL,
    imsitac TEXT,
    vmcc TEXT,
    vmnc TEXT,
    hmcc TEXT,
    hmnc TEXT,
    data_inbound_uploaded_bytes INTEGER NOT NULL CHECK (data_inbound_uploaded_bytes >= 0),
    data_inbound_downloaded_bytes INTEGER NOT NULL CHECK (data_inbound_downloaded_bytes >= 0),
    data_outbound_uploaded_bytes INTEGER NOT NULL CHECK (data_outbound_uploaded_bytes >= 0),
    data_outbound_downloaded_bytes INTEGER NOT NULL CHECK (data_outbound_downloaded_bytes >= 0),
    \"2G/3G Usage\" INTEGER NOT NULL,
    \"4G/5G Usage\" INTEGER NOT NULL,
    device_type TEXT NOT NULL CHECK (device_type IN ('IOT', 'NON-IOT')),
    extract_date TEXT NOT NULL
)",
        quote_identifier(table)
    )
}

/// Drop and recreate `table` with the usage schema.
fn create_usage_table(conn: &Connection, table: &str) -> Result<()> {
    check_table_name(table)?;
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {};\n{};",
        quote_identifier(table),
        create_table_sql(table)
    ))
    .map_err(|e| RoamingError::Database(format!("failed to create table {}: {}", table, e)))
}

/// Replace the contents of `table` with `records`. The drop, create and
/// inserts share one transaction, so a failure leaves the old table intact.
pub fn replace_records(conn: &mut Connection, table: &str, records: &[UsageRecord]) -> Result<usize> {
    check_table_name(table)?;
    let tx = begin(conn)?;
    create_usage_table(&tx, table)?;
    insert_all(&tx, table, records)?;
    commit(tx)?;
    Ok(records.len())
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| RoamingError::Database(format!("failed to start transaction: {}", e)))
}

fn commit(tx: Transaction<'_>) -> Result<()> {
    tx.commit()
        .map_err(|e| RoamingError::Database(format!("failed to commit: {}", e)))
}

fn insert_all(tx: &Transaction<'_>, table: &str, records: &[UsageRecord]) -> Result<()> {
    let mut stmt = tx
        .prepare(&insert_sql(table))
        .map_err(|e| RoamingError::Database(format!("failed to prepare insert: {}", e)))?;
    for record in records {
        insert_one(&mut stmt, record)?;
    }
    Ok(())
}

/// Load CSV text into `table`, replacing any previous contents.
pub fn ingest_reader<R: Read>(reader: R, conn: &mut Connection, table: &str) -> Result<IngestReport> {
    check_table_name(table)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut report = IngestReport {
        table: table.to_string(),
        ..Default::default()
    };
    let mut records = Vec::new();
    let headers = csv_reader.headers()?.clone();

    for row in csv_reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                report.rejected.push(RejectedRow {
                    line: e.position().map(|p| p.line()).unwrap_or(0),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        // Quoted fields may span lines, so take the line from the reader.
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let raw = match row.deserialize::<RawUsageRow>(Some(&headers)) {
            Ok(raw) => raw,
            Err(e) => {
                report.rejected.push(RejectedRow {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if raw.is_blank() {
            report.skipped_blank += 1;
            continue;
        }
        match UsageRecord::try_from(raw) {
            Ok(record) => records.push(record),
            Err(e) => report.rejected.push(RejectedRow {
                line,
                reason: e.to_string(),
            }),
        }
    }

    report.inserted = replace_records(conn, table, &records)?;

    for rejected in &report.rejected {
        warn!("Rejected row at line {}: {}", rejected.line, rejected.reason);
    }
    info!(
        "Loaded {} rows into {} ({} blank, {} rejected)",
        report.inserted,
        table,
        report.skipped_blank,
        report.rejected.len()
    );
    Ok(report)
}

/// Load a CSV file into the database at `db_path`, creating it if needed.
pub fn ingest_csv(csv_path: &Path, db_path: &Path, table: Option<&str>) -> Result<IngestReport> {
    let file = std::fs::File::open(csv_path)?;
    let mut conn = Connection::open(db_path).map_err(|e| {
        RoamingError::Database(format!("failed to open {}: {}", db_path.display(), e))
    })?;
    ingest_reader(file, &mut conn, table.unwrap_or(USAGE_TABLE))
}

fn check_table_name(table: &str) -> Result<()> {
    if IDENTIFIER.is_match(table) {
        Ok(())
    } else {
        Err(RoamingError::Config(format!(
            "'{}' is not a valid table name",
            table
        )))
    }
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        quote_identifier(table)
    )
}

fn stored_bytes(record: &UsageRecord, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| {
        RoamingError::Ingest(format!(
            "byte count {} for {} does not fit a SQLite integer",
            value, record.imsi
        ))
    })
}

fn insert_one(stmt: &mut rusqlite::Statement<'_>, record: &UsageRecord) -> Result<()> {
    stmt.execute(params![
        record.imsi,
        record.imsitac,
        record.vmcc,
        record.vmnc,
        record.hmcc,
        record.hmnc,
        stored_bytes(record, record.inbound_uploaded_bytes)?,
        stored_bytes(record, record.inbound_downloaded_bytes)?,
        stored_bytes(record, record.outbound_uploaded_bytes)?,
        stored_bytes(record, record.outbound_downloaded_bytes)?,
        record.uses_2g_3g,
        record.uses_4g_5g,
        record.device_type.as_str(),
        record.extract_date.format("%Y-%m-%d").to_string(),
    ])
    .map_err(|e| RoamingError::Database(format!("failed to insert row for {}: {}", record.imsi, e)))?;
    Ok(())
}
