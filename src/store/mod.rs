//! Document store boundary
//!
//! Subjects are persisted as documents in a per-user "subjects" collection.
//! The store is a dumb persistence layer: it does not validate counts or
//! apply the default target. That is the ledger's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identity::UserId;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteDocumentStore;

/// Identifier assigned by the store when a document is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subject document as it sits in the store.
///
/// Counts are signed because the store does not vouch for them; the ledger
/// validates every document it loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectDocument {
    pub id: DocumentId,
    pub name: String,
    pub attended: i64,
    pub total: i64,
    pub target_attendance: Option<i64>,
}

/// Fields written when a subject document is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubjectDocument {
    pub name: String,
    pub attended: u32,
    pub total: u32,
    pub target_attendance: Option<u8>,
}

/// Named fields to update on an existing document. `None` leaves the field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectPatch {
    pub attended: Option<u32>,
    pub total: Option<u32>,
}

/// Document store error
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No document with this id in the user's collection
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    /// Connection lock poisoned by a panicking writer
    #[error("store connection poisoned")]
    Poisoned,

    /// Backend reported a failure
    #[error("{0}")]
    Backend(String),
}

/// Per-user subject collection.
///
/// Every call is scoped by `user`; one user's documents are never visible
/// through another user's namespace.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List all subject documents, oldest first
    async fn list_subjects(&self, user: &UserId) -> Result<Vec<SubjectDocument>, StoreError>;

    /// Create a document and return its assigned id
    async fn create_subject(
        &self,
        user: &UserId,
        fields: &NewSubjectDocument,
    ) -> Result<DocumentId, StoreError>;

    /// Update named fields of a document
    async fn update_subject(
        &self,
        user: &UserId,
        id: &DocumentId,
        patch: SubjectPatch,
    ) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete_subject(&self, user: &UserId, id: &DocumentId) -> Result<(), StoreError>;
}
