//! SQLite-backed document store

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::{DocumentId, DocumentStore, NewSubjectDocument, StoreError, SubjectDocument, SubjectPatch};
use crate::identity::UserId;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subjects (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_id TEXT UNIQUE NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    attended INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    target_attendance INTEGER,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_subjects_user ON subjects(user_id);
"#;

/// How long a write waits on another process holding the database lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Subject documents in a single SQLite table, namespaced by user id
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open or create a store at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL so the identity provider can share the file
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened subject store at {:?}", db_path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of documents across all users
    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM subjects", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_subjects(&self, user: &UserId) -> Result<Vec<SubjectDocument>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT doc_id, name, attended, total, target_attendance
            FROM subjects
            WHERE user_id = ?1
            ORDER BY seq ASC
            "#,
        )?;

        let rows = stmt.query_map(params![user.as_str()], |row| {
            Ok(SubjectDocument {
                id: DocumentId::new(row.get::<_, String>(0)?),
                name: row.get(1)?,
                attended: row.get(2)?,
                total: row.get(3)?,
                target_attendance: row.get(4)?,
            })
        })?;

        let docs = rows.collect::<Result<Vec<_>, _>>()?;
        debug!("Listed {} subject documents for {}", docs.len(), user);
        Ok(docs)
    }

    async fn create_subject(
        &self,
        user: &UserId,
        fields: &NewSubjectDocument,
    ) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO subjects (doc_id, user_id, name, attended, total, target_attendance)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                id.as_str(),
                user.as_str(),
                fields.name,
                fields.attended,
                fields.total,
                fields.target_attendance
            ],
        )?;

        debug!("Created subject document {} for {}", id, user);
        Ok(id)
    }

    async fn update_subject(
        &self,
        user: &UserId,
        id: &DocumentId,
        patch: SubjectPatch,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE subjects SET
                attended = COALESCE(?3, attended),
                total = COALESCE(?4, total),
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?1 AND doc_id = ?2
            "#,
            params![user.as_str(), id.as_str(), patch.attended, patch.total],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn delete_subject(&self, user: &UserId, id: &DocumentId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let existed: Option<i64> = conn
            .query_row(
                "SELECT seq FROM subjects WHERE user_id = ?1 AND doc_id = ?2",
                params![user.as_str(), id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        conn.execute(
            "DELETE FROM subjects WHERE user_id = ?1 AND doc_id = ?2",
            params![user.as_str(), id.as_str()],
        )?;

        if existed.is_none() {
            debug!("Delete of missing subject document {} ignored", id);
        }
        Ok(())
    }
}
