//! SQLite record store.

use super::{ImageRecord, NewRecord, RecordStore, ScanVisitor, StoreTransaction, TransactionWork};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Rows fetched per page while scanning
const SCAN_PAGE_SIZE: i64 = 256;

const COLUMNS: &str =
    "id, source_url, tags, tag_text, timestamp, media_url, fingerprint, pool_id, pool_index";

/// SQLite-backed persistent record store
///
/// Uses WAL (Write-Ahead Logging) mode so readers proceed while a save is
/// being written. A unique index over `(pool_id, pool_index)` backs the
/// pool invariant; unpooled records store NULLs, which never collide.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create a record database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::initialize(conn, path.to_path_buf())
    }

    /// A private database that disappears when the store is dropped
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::initialize(conn, PathBuf::from(":memory:"))
    }

    fn initialize(conn: Connection, db_path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| query_error(&db_path, e))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_url TEXT NOT NULL,
                tags TEXT NOT NULL,
                tag_text TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                media_url TEXT NOT NULL,
                fingerprint TEXT,
                pool_id TEXT,
                pool_index INTEGER
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_records_pool_slot
                ON records(pool_id, pool_index);",
        )
        .map_err(|e| query_error(&db_path, e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Run SQLite's quick integrity check
    pub fn verify(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let verdict: String = conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(|e| query_error(&self.db_path, e))?;

        if verdict == "ok" {
            Ok(())
        } else {
            Err(StoreError::Corrupted {
                path: self.db_path.clone(),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Corrupted {
            path: self.db_path.clone(),
        })
    }
}

impl RecordStore for SqliteStore {
    fn scan(&self, visitor: &mut ScanVisitor<'_>) -> Result<(), StoreError> {
        let mut after_id = 0i64;

        loop {
            // The lock is released between pages so the visitor may use the store
            let page = {
                let conn = self.lock()?;
                let mut stmt = conn
                    .prepare_cached(&format!(
                        "SELECT {COLUMNS} FROM records WHERE id > ?1 ORDER BY id LIMIT ?2"
                    ))
                    .map_err(|e| query_error(&self.db_path, e))?;
                // The id is read apart from the other columns so paging moves
                // past a row whose columns do not read back
                let rows = stmt
                    .query_map(params![after_id, SCAN_PAGE_SIZE], |row| {
                        Ok((row.get::<_, i64>(0)?, RawRecord::from_row(row)))
                    })
                    .map_err(|e| query_error(&self.db_path, e))?;
                let page: Vec<(i64, rusqlite::Result<RawRecord>)> = rows
                    .collect::<Result<_, _>>()
                    .map_err(|e| query_error(&self.db_path, e))?;
                page
            };

            let Some((last_id, _)) = page.last() else {
                return Ok(());
            };
            after_id = *last_id;
            let full_page = page.len() as i64 == SCAN_PAGE_SIZE;

            for (id, raw) in page {
                let record = raw
                    .map_err(|e| unreadable_row(id, e))
                    .and_then(RawRecord::decode);
                if visitor(record).is_break() {
                    return Ok(());
                }
            }

            if !full_page {
                return Ok(());
            }
        }
    }

    fn transaction(&self, work: &mut TransactionWork<'_>) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| query_error(&self.db_path, e))?;

        let mut handle = SqliteTransaction {
            conn: &tx,
            db_path: &self.db_path,
        };
        // Dropping `tx` on the error path rolls back
        work(&mut handle)?;

        tx.commit().map_err(|e| query_error(&self.db_path, e))
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .map_err(|e| query_error(&self.db_path, e))?;
        Ok(count as usize)
    }
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
    db_path: &'a Path,
}

impl SqliteTransaction<'_> {
    fn write_error(&self, e: rusqlite::Error, record: (Option<&String>, Option<u32>)) -> StoreError {
        match (e.sqlite_error_code(), record) {
            (Some(ErrorCode::ConstraintViolation), (Some(pool_id), Some(pool_index))) => {
                StoreError::SlotTaken {
                    pool_id: pool_id.clone(),
                    pool_index,
                }
            }
            _ => query_error(self.db_path, e),
        }
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn get_by_pool(&mut self, pool_id: &str) -> Result<Vec<ImageRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {COLUMNS} FROM records WHERE pool_id = ?1 ORDER BY pool_index, id"
            ))
            .map_err(|e| query_error(self.db_path, e))?;

        let rows = stmt
            .query_map([pool_id], RawRecord::from_row)
            .map_err(|e| query_error(self.db_path, e))?;

        let records = rows
            .map(|row| row.map_err(|e| query_error(self.db_path, e))?.decode())
            .collect();
        records
    }

    fn get_by_pool_and_index(
        &mut self,
        pool_id: &str,
        index: u32,
    ) -> Result<Option<ImageRecord>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM records WHERE pool_id = ?1 AND pool_index = ?2"),
                params![pool_id, index],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|e| query_error(self.db_path, e))?;

        raw.map(RawRecord::decode).transpose()
    }

    fn put(&mut self, record: &ImageRecord) -> Result<(), StoreError> {
        let (tags, tag_text) = encode_tags(record)?;

        let changed = self
            .conn
            .execute(
                "UPDATE records SET source_url = ?2, tags = ?3, tag_text = ?4, timestamp = ?5,
                    media_url = ?6, fingerprint = ?7, pool_id = ?8, pool_index = ?9
                 WHERE id = ?1",
                params![
                    record.id,
                    record.source_url,
                    tags,
                    tag_text,
                    record.timestamp.to_rfc3339(),
                    record.media_url,
                    record.fingerprint,
                    record.pool_id,
                    record.pool_index,
                ],
            )
            .map_err(|e| self.write_error(e, (record.pool_id.as_ref(), record.pool_index)))?;

        if changed == 0 {
            return Err(StoreError::NotFound { id: record.id });
        }
        Ok(())
    }

    fn insert(&mut self, record: NewRecord) -> Result<ImageRecord, StoreError> {
        // Provisional id; the real one comes from SQLite
        let mut record = record.into_record(0);
        let (tags, tag_text) = encode_tags(&record)?;

        self.conn
            .execute(
                "INSERT INTO records
                    (source_url, tags, tag_text, timestamp, media_url, fingerprint, pool_id, pool_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.source_url,
                    tags,
                    tag_text,
                    record.timestamp.to_rfc3339(),
                    record.media_url,
                    record.fingerprint,
                    record.pool_id,
                    record.pool_index,
                ],
            )
            .map_err(|e| self.write_error(e, (record.pool_id.as_ref(), record.pool_index)))?;

        record.id = self.conn.last_insert_rowid();
        Ok(record)
    }
}

/// Column values before JSON and timestamp decoding
struct RawRecord {
    id: i64,
    source_url: String,
    tags: String,
    tag_text: String,
    timestamp: String,
    media_url: String,
    fingerprint: Option<String>,
    pool_id: Option<String>,
    pool_index: Option<i64>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_url: row.get(1)?,
            tags: row.get(2)?,
            tag_text: row.get(3)?,
            timestamp: row.get(4)?,
            media_url: row.get(5)?,
            fingerprint: row.get(6)?,
            pool_id: row.get(7)?,
            pool_index: row.get(8)?,
        })
    }

    fn decode(self) -> Result<ImageRecord, StoreError> {
        let id = self.id;
        let invalid = |what: &str, reason: String| {
            StoreError::Serialization(format!("record {id}: invalid {what}: {reason}"))
        };

        let tags = serde_json::from_str(&self.tags).map_err(|e| invalid("tags", e.to_string()))?;
        let tag_text =
            serde_json::from_str(&self.tag_text).map_err(|e| invalid("tag_text", e.to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| invalid("timestamp", e.to_string()))?
            .with_timezone(&Utc);
        let pool_index = self
            .pool_index
            .map(u32::try_from)
            .transpose()
            .map_err(|e| invalid("pool_index", e.to_string()))?;

        Ok(ImageRecord {
            id,
            source_url: self.source_url,
            tags,
            tag_text,
            timestamp,
            media_url: self.media_url,
            fingerprint: self.fingerprint,
            pool_id: self.pool_id,
            pool_index,
        })
    }
}

fn encode_tags(record: &ImageRecord) -> Result<(String, String), StoreError> {
    let tags =
        serde_json::to_string(&record.tags).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tag_text = serde_json::to_string(&record.tag_text)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok((tags, tag_text))
}

fn unreadable_row(id: i64, e: rusqlite::Error) -> StoreError {
    StoreError::Serialization(format!("record {id}: unreadable column: {e}"))
}

fn query_error(path: &Path, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseCorrupt) | Some(ErrorCode::NotADatabase) => StoreError::Corrupted {
            path: path.to_path_buf(),
        },
        _ => StoreError::QueryFailed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::contract;
    use std::ops::ControlFlow;
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("records.db");
        let store = SqliteStore::open(&db_path).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn satisfies_store_contract() {
        contract::run_all(|| Box::new(SqliteStore::open_in_memory().unwrap()));
    }

    #[test]
    fn records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("records.db");

        let saved = {
            let store = SqliteStore::open(&db_path).unwrap();
            store
                .insert(
                    NewRecord::new("https://site/1", "https://cdn/1.png", vec!["A:b".to_string()])
                        .with_fingerprint("dct8:0123456789abcdef")
                        .with_pool("pool-1", 0),
                )
                .unwrap()
        };

        let store = SqliteStore::open(&db_path).unwrap();
        let records = store.scan_all().unwrap();
        assert_eq!(records, vec![saved]);
    }

    #[test]
    fn scan_crosses_page_boundaries() {
        let (store, _temp) = create_test_store();
        let total = SCAN_PAGE_SIZE as usize + 10;
        for i in 0..total {
            store
                .insert(NewRecord::new(format!("https://site/{i}"), "m.png", vec![]))
                .unwrap();
        }

        assert_eq!(store.scan_all().unwrap().len(), total);
    }

    #[test]
    fn unreadable_row_is_reported_and_scan_continues() {
        let (store, _temp) = create_test_store();
        store.insert(NewRecord::new("a", "a.png", vec![])).unwrap();
        store.insert(NewRecord::new("b", "b.png", vec![])).unwrap();
        store
            .lock()
            .unwrap()
            .execute("UPDATE records SET tags = 'not json' WHERE source_url = 'a'", [])
            .unwrap();

        let mut errors = 0;
        let mut urls = Vec::new();
        store
            .scan(&mut |record| {
                match record {
                    Ok(record) => urls.push(record.source_url),
                    Err(_) => errors += 1,
                }
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(errors, 1);
        assert_eq!(urls, vec!["b"]);
    }

    #[test]
    fn column_of_the_wrong_type_is_reported_and_scan_continues() {
        let (store, _temp) = create_test_store();
        store.insert(NewRecord::new("a", "a.png", vec![])).unwrap();
        store.insert(NewRecord::new("b", "b.png", vec![])).unwrap();
        // A blob keeps its storage class despite the TEXT affinity
        store
            .lock()
            .unwrap()
            .execute("UPDATE records SET source_url = x'00ff' WHERE source_url = 'a'", [])
            .unwrap();

        let mut errors = Vec::new();
        let mut urls = Vec::new();
        store
            .scan(&mut |record| {
                match record {
                    Ok(record) => urls.push(record.source_url),
                    Err(e) => errors.push(e),
                }
                ControlFlow::Continue(())
            })
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], StoreError::Serialization(_)));
        assert_eq!(urls, vec!["b"]);
        assert_eq!(store.scan_all().unwrap().len(), 1);
    }

    #[test]
    fn fresh_database_passes_integrity_check() {
        let (store, _temp) = create_test_store();
        assert!(store.verify().is_ok());
    }

    #[test]
    fn garbage_file_is_reported_as_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("records.db");
        std::fs::write(&db_path, vec![0x5a; 8192]).unwrap();

        let result = SqliteStore::open(&db_path);
        assert!(matches!(
            result,
            Err(StoreError::Corrupted { .. }) | Err(StoreError::OpenFailed { .. })
        ));
    }
}
