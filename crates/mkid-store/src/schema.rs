//! SQLite index schema and row access.

use mkid_core::config::CalibrationKind;
use mkid_core::dataset::TimeRange;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::serde::{from_json_slice, to_canonical_json_bytes};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;

/// Current index schema version.
pub const SCHEMA_VERSION: i64 = 1;

fn store_error(code: &str, err: impl ToString) -> MkidError {
    MkidError::Store(ErrorInfo::new(code, err.to_string()))
}

/// One row of the solution index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Row identifier, increasing with insertion.
    pub id: i64,
    /// Calibration step.
    pub kind: CalibrationKind,
    /// Instrument identifier.
    pub instrument: String,
    /// Digest of the fit-relevant configuration.
    pub config_digest: String,
    /// Fingerprint key.
    pub key: String,
    /// Start of the covered span.
    pub start: f64,
    /// End of the covered span.
    pub stop: f64,
    /// Merged covered intervals.
    pub coverage: Vec<TimeRange>,
    /// RFC 3339 creation time of the artifact.
    pub created_at: String,
    /// Artifact path relative to the store root.
    pub path: String,
    /// SHA-256 of the artifact bytes.
    pub sha256: String,
}

impl IndexRow {
    /// Fingerprint the row was filed under.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            kind: self.kind,
            instrument: self.instrument.clone(),
            config_digest: self.config_digest.clone(),
            coverage: self.coverage.clone(),
            key: self.key.clone(),
        }
    }
}

/// Creates the index tables and stamps or checks the schema version.
pub fn init_schema(conn: &Connection) -> Result<(), MkidError> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS meta(version INTEGER NOT NULL);
        CREATE TABLE IF NOT EXISTS solutions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            instrument TEXT NOT NULL,
            config_digest TEXT NOT NULL,
            key TEXT NOT NULL UNIQUE,
            start REAL NOT NULL,
            stop REAL NOT NULL,
            coverage TEXT NOT NULL,
            created_at TEXT NOT NULL,
            path TEXT NOT NULL,
            sha256 TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS solutions_lookup
            ON solutions(kind, instrument, config_digest, start, stop);
        COMMIT;",
    )
    .map_err(|err| store_error("store.schema", err))?;
    set_version(conn, SCHEMA_VERSION)
}

fn set_version(conn: &Connection, version: i64) -> Result<(), MkidError> {
    let existing: Option<i64> = conn
        .query_row("SELECT version FROM meta LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|err| store_error("store.schema", err))?;
    match existing {
        Some(current) if current == version => Ok(()),
        Some(current) => Err(MkidError::Store(
            ErrorInfo::new(
                "store.schema_version",
                format!("index schema {current} incompatible with expected {version}"),
            )
            .with_hint("point paths.database at a fresh directory"),
        )),
        None => {
            conn.execute("INSERT INTO meta(version) VALUES (?)", params![version])
                .map_err(|err| store_error("store.schema", err))?;
            Ok(())
        }
    }
}

/// Inserts a row, or refreshes the existing row with the same key.
pub fn upsert_row(
    conn: &Connection,
    fingerprint: &Fingerprint,
    created_at: &str,
    path: &str,
    sha256: &str,
) -> Result<i64, MkidError> {
    let span = fingerprint.span().ok_or_else(|| {
        store_error("store.insert", "fingerprint has an empty coverage")
    })?;
    let coverage = String::from_utf8(to_canonical_json_bytes(&fingerprint.coverage)?)
        .map_err(|err| store_error("store.insert", err))?;
    conn.execute(
        "INSERT INTO solutions(kind, instrument, config_digest, key, start, stop, coverage, created_at, path, sha256)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(key) DO UPDATE SET
            created_at = excluded.created_at,
            path = excluded.path,
            sha256 = excluded.sha256",
        params![
            fingerprint.kind.as_str(),
            &fingerprint.instrument,
            &fingerprint.config_digest,
            &fingerprint.key,
            span.start,
            span.stop,
            coverage,
            created_at,
            path,
            sha256,
        ],
    )
    .map_err(|err| store_error("store.insert", err))?;
    conn.query_row(
        "SELECT id FROM solutions WHERE key = ?1",
        params![&fingerprint.key],
        |row| row.get(0),
    )
    .map_err(|err| store_error("store.insert", err))
}

const ROW_COLUMNS: &str =
    "id, kind, instrument, config_digest, key, start, stop, coverage, created_at, path, sha256";

fn read_row(row: &Row<'_>) -> rusqlite::Result<(IndexRow, String, String)> {
    Ok((
        IndexRow {
            id: row.get(0)?,
            kind: CalibrationKind::Wavecal,
            instrument: row.get(2)?,
            config_digest: row.get(3)?,
            key: row.get(4)?,
            start: row.get(5)?,
            stop: row.get(6)?,
            coverage: Vec::new(),
            created_at: row.get(8)?,
            path: row.get(9)?,
            sha256: row.get(10)?,
        },
        row.get(1)?,
        row.get(7)?,
    ))
}

fn finish_row((mut row, kind, coverage): (IndexRow, String, String)) -> Result<IndexRow, MkidError> {
    row.kind = kind.parse()?;
    row.coverage = from_json_slice(coverage.as_bytes())?;
    Ok(row)
}

/// Rows whose span could contain `query`, newest first.
///
/// The span test is only a prefilter; callers still apply the exact
/// coverage predicate.
pub fn candidate_rows(conn: &Connection, query: &Fingerprint) -> Result<Vec<IndexRow>, MkidError> {
    let span = query
        .span()
        .ok_or_else(|| store_error("store.query", "query has an empty coverage"))?;
    let sql = format!(
        "SELECT {ROW_COLUMNS} FROM solutions
         WHERE kind = ?1 AND instrument = ?2 AND config_digest = ?3 AND start <= ?4 AND stop >= ?5
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| store_error("store.query", err))?;
    let rows = stmt
        .query_map(
            params![
                query.kind.as_str(),
                &query.instrument,
                &query.config_digest,
                span.start,
                span.stop
            ],
            read_row,
        )
        .map_err(|err| store_error("store.query", err))?;
    rows.map(|row| row.map_err(|err| store_error("store.query", err)).and_then(finish_row))
        .collect()
}

/// All rows, optionally restricted to one step, ordered by id.
pub fn list_rows(
    conn: &Connection,
    kind: Option<CalibrationKind>,
) -> Result<Vec<IndexRow>, MkidError> {
    let sql = format!(
        "SELECT {ROW_COLUMNS} FROM solutions WHERE (?1 IS NULL OR kind = ?1) ORDER BY id"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|err| store_error("store.query", err))?;
    let rows = stmt
        .query_map(params![kind.map(|k| k.as_str())], read_row)
        .map_err(|err| store_error("store.query", err))?;
    rows.map(|row| row.map_err(|err| store_error("store.query", err)).and_then(finish_row))
        .collect()
}
