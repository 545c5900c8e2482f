//! Solution store: canonical JSON artifacts filed in a SQLite index.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mkid_core::config::CalibrationKind;
use mkid_core::errors::{ErrorInfo, MkidError};
use mkid_core::hash::sha256_hex;
use mkid_core::serde::{from_json_slice, to_canonical_json_bytes};
use rusqlite::{Connection, TransactionBehavior};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::fingerprint::Fingerprint;
use crate::schema::{candidate_rows, init_schema, list_rows, upsert_row, IndexRow};
use crate::solution::CalibrationSolution;

const INDEX_FILE: &str = "index.sqlite";
const SOLUTION_DIR: &str = "solutions";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn store_error(code: &str, path: &Path, err: impl ToString) -> MkidError {
    MkidError::Store(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Handle on a solution store rooted at a directory.
///
/// Connections are opened per call so the handle can be shared freely;
/// SQLite's locking serialises concurrent writers.
#[derive(Debug, Clone)]
pub struct SolutionStore {
    root: PathBuf,
}

impl SolutionStore {
    /// Opens (creating if needed) the store under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MkidError> {
        let store = Self { root: root.into() };
        let solutions = store.root.join(SOLUTION_DIR);
        fs::create_dir_all(&solutions)
            .map_err(|err| store_error("store.open", &solutions, err))?;
        let conn = store.connect()?;
        init_schema(&conn)?;
        Ok(store)
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn connect(&self) -> Result<Connection, MkidError> {
        let path = self.root.join(INDEX_FILE);
        let conn = Connection::open(&path).map_err(|err| store_error("store.open", &path, err))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| store_error("store.open", &path, err))?;
        Ok(conn)
    }

    fn artifact_name(fingerprint: &Fingerprint) -> String {
        format!("{}/{}_{}.json", SOLUTION_DIR, fingerprint.kind, fingerprint.key)
    }

    /// Persists a solution.
    ///
    /// The artifact path is derived from the fingerprint key, so a new
    /// fingerprint never touches an existing artifact. Writers of the same
    /// key serialise on the index lock and the last one wins; the artifact
    /// is renamed into place inside that lock so the index and the file
    /// always agree.
    pub fn put(&self, solution: &CalibrationSolution) -> Result<IndexRow, MkidError> {
        solution.verify()?;
        let bytes = to_canonical_json_bytes(solution)?;
        let sha256 = sha256_hex(&bytes);
        let name = Self::artifact_name(&solution.fingerprint);
        let target = self.root.join(&name);
        let dir = self.root.join(SOLUTION_DIR);

        let mut staged =
            NamedTempFile::new_in(&dir).map_err(|err| store_error("store.write", &dir, err))?;
        staged
            .write_all(&bytes)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|err| store_error("store.write", staged.path(), err))?;

        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| store_error("store.transaction", &target, err))?;
        staged
            .persist(&target)
            .map_err(|err| store_error("store.write", &target, err.error))?;
        let id = upsert_row(
            &tx,
            &solution.fingerprint,
            &solution.provenance.created_at,
            &name,
            &sha256,
        )?;
        tx.commit()
            .map_err(|err| store_error("store.commit", &target, err))?;

        let fingerprint = &solution.fingerprint;
        let span = fingerprint
            .span()
            .ok_or_else(|| store_error("store.commit", &target, "empty coverage"))?;
        let row = IndexRow {
            id,
            kind: fingerprint.kind,
            instrument: fingerprint.instrument.clone(),
            config_digest: fingerprint.config_digest.clone(),
            key: fingerprint.key.clone(),
            start: span.start,
            stop: span.stop,
            coverage: fingerprint.coverage.clone(),
            created_at: solution.provenance.created_at.clone(),
            path: name.clone(),
            sha256,
        };
        info!(
            kind = %solution.kind(),
            key = solution.fingerprint.short_key(),
            path = %name,
            "solution stored"
        );
        Ok(row)
    }

    /// Reads and verifies the artifact behind an index row.
    ///
    /// Any disagreement between index, artifact bytes and provenance is a
    /// [`MkidError::CacheInconsistency`].
    pub fn load(&self, row: &IndexRow) -> Result<CalibrationSolution, MkidError> {
        let path = self.root.join(&row.path);
        let inconsistent = |code: &str, message: String| {
            MkidError::CacheInconsistency(
                ErrorInfo::new(code, message)
                    .with_context("key", row.key.clone())
                    .with_context("path", path.display().to_string()),
            )
        };
        let bytes =
            fs::read(&path).map_err(|err| inconsistent("store.artifact_missing", err.to_string()))?;
        let sha256 = sha256_hex(&bytes);
        if sha256 != row.sha256 {
            return Err(inconsistent(
                "store.artifact_digest",
                format!("artifact digest {sha256} does not match index {}", row.sha256),
            ));
        }
        let solution: CalibrationSolution = from_json_slice(&bytes)
            .map_err(|err| inconsistent("store.artifact_decode", err.info().message.clone()))?;
        if solution.fingerprint != row.fingerprint() {
            return Err(inconsistent(
                "store.artifact_fingerprint",
                "artifact fingerprint differs from its index row".to_string(),
            ));
        }
        solution.verify()?;
        Ok(solution)
    }

    /// Most recent stored solution compatible with `query`.
    ///
    /// Candidates failing verification are logged and skipped, never
    /// returned.
    pub fn find(&self, query: &Fingerprint) -> Result<Option<CalibrationSolution>, MkidError> {
        let conn = self.connect()?;
        let candidates = candidate_rows(&conn, query)?;
        drop(conn);
        for row in candidates {
            if !row.fingerprint().serves(query) {
                debug!(key = %row.key, "stored span does not cover every requested interval");
                continue;
            }
            match self.load(&row) {
                Ok(solution) => return Ok(Some(solution)),
                Err(MkidError::CacheInconsistency(info)) => {
                    warn!(key = %row.key, code = %info.code, "skipping inconsistent cached solution: {}", info.message);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    /// Index rows ordered by id, optionally restricted to one step.
    pub fn list(&self, kind: Option<CalibrationKind>) -> Result<Vec<IndexRow>, MkidError> {
        let conn = self.connect()?;
        list_rows(&conn, kind)
    }
}
