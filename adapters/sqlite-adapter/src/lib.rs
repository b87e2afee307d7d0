//! sqlite-adapter: SQLite implementation of the `UrlStore` port.
//!
//! Purpose
//! - Provide a lightweight, file-based store so the service runs without any
//!   external database.
//! - Implements the `UrlStore` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - The schema is created with `CREATE ... IF NOT EXISTS` every time a store
//!   is opened, so concurrent or repeated opens are harmless.
//! - `urls.code` carries a UNIQUE constraint; it is the authoritative guard
//!   against two records sharing a code.
//! - Stores timestamps as seconds since UNIX_EPOCH.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{CoreError, ReportRecord, ShortCode, UrlRecord, UrlStore};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the database at `path`, creating its parent directory first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CoreError::Repository(format!("create {}: {e}", dir.display()))
                })?;
            }
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            original_url TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_urls_original_url ON urls(original_url);
        CREATE TABLE IF NOT EXISTS reports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url_code TEXT NOT NULL REFERENCES urls(code),
            reason TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reports_url_code ON reports(url_code);
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or(0))
}

fn row_to_record(code: String, original_url: String, created_at: i64) -> Result<UrlRecord, CoreError> {
    let code = ShortCode::new(code)
        .map_err(|e| CoreError::Repository(format!("bad code in db: {e}")))?;
    Ok(UrlRecord::new(
        code,
        original_url,
        secs_to_system_time(created_at),
    ))
}

impl UrlStore for SqliteStore {
    fn find_by_url(&self, url: &str) -> Result<Option<UrlRecord>, CoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT code, original_url, created_at FROM urls WHERE original_url = ?1 ORDER BY id LIMIT 1",
                params![url],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()
            .map_err(map_sqerr)?;
        row.map(|(c, u, t)| row_to_record(c, u, t)).transpose()
    }

    fn find_by_code(&self, code: &ShortCode) -> Result<Option<UrlRecord>, CoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT code, original_url, created_at FROM urls WHERE code = ?1",
                params![code.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()
            .map_err(map_sqerr)?;
        row.map(|(c, u, t)| row_to_record(c, u, t)).transpose()
    }

    fn code_exists(&self, code: &ShortCode) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM urls WHERE code = ?1)",
            params![code.as_str()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(map_sqerr)
    }

    fn insert(&self, record: &UrlRecord) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO urls(code, original_url, created_at) VALUES (?1, ?2, ?3)",
            params![
                record.code.as_str(),
                record.original_url,
                system_time_to_secs(record.created_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(CoreError::AlreadyExists),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn add_report(&self, report: &ReportRecord) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO reports(url_code, reason, created_at) VALUES (?1, ?2, ?3)",
            params![
                report.url_code.as_str(),
                report.reason,
                system_time_to_secs(report.created_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            // foreign key on url_code
            Err(e) if is_constraint_violation(&e) => Err(CoreError::NotFound),
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn has_reports(&self, code: &ShortCode) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM reports WHERE url_code = ?1)",
            params![code.as_str()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(map_sqerr)
    }

    fn count(&self) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))
            .map_err(map_sqerr)?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}
