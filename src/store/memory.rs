//! In-memory document store
//!
//! Holds documents in process memory. Reads and writes can be switched to
//! fail, which lets callers exercise their recovery paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{DocumentId, DocumentStore, NewSubjectDocument, StoreError, SubjectDocument, SubjectPatch};
use crate::identity::UserId;

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<UserId, Vec<SubjectDocument>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent list call fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent create/update/delete fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of write calls issued, including failed ones
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Insert a raw document, bypassing any validation
    pub fn insert_raw(&self, user: &UserId, doc: SubjectDocument) -> Result<(), StoreError> {
        self.collections()?.entry(user.clone()).or_default().push(doc);
        Ok(())
    }

    fn collections(&self) -> Result<MutexGuard<'_, HashMap<UserId, Vec<SubjectDocument>>>, StoreError> {
        self.collections.lock().map_err(|_| StoreError::Poisoned)
    }

    fn begin_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_subjects(&self, user: &UserId) -> Result<Vec<SubjectDocument>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read rejected".to_string()));
        }
        Ok(self.collections()?.get(user).cloned().unwrap_or_default())
    }

    async fn create_subject(
        &self,
        user: &UserId,
        fields: &NewSubjectDocument,
    ) -> Result<DocumentId, StoreError> {
        self.begin_write()?;
        let id = DocumentId::generate();
        self.collections()?.entry(user.clone()).or_default().push(SubjectDocument {
            id: id.clone(),
            name: fields.name.clone(),
            attended: i64::from(fields.attended),
            total: i64::from(fields.total),
            target_attendance: fields.target_attendance.map(i64::from),
        });
        Ok(id)
    }

    async fn update_subject(
        &self,
        user: &UserId,
        id: &DocumentId,
        patch: SubjectPatch,
    ) -> Result<(), StoreError> {
        self.begin_write()?;
        let mut collections = self.collections()?;
        let doc = collections
            .get_mut(user)
            .and_then(|docs| docs.iter_mut().find(|d| &d.id == id))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Some(attended) = patch.attended {
            doc.attended = i64::from(attended);
        }
        if let Some(total) = patch.total {
            doc.total = i64::from(total);
        }
        Ok(())
    }

    async fn delete_subject(&self, user: &UserId, id: &DocumentId) -> Result<(), StoreError> {
        self.begin_write()?;
        if let Some(docs) = self.collections()?.get_mut(user) {
            docs.retain(|d| &d.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_switches() {
        let store = MemoryStore::new();
        let user = UserId::new("u1");
        let fields = NewSubjectDocument {
            name: "Math".to_string(),
            attended: 0,
            total: 0,
            target_attendance: Some(75),
        };

        store.set_fail_writes(true);
        assert!(store.create_subject(&user, &fields).await.is_err());
        assert_eq!(store.write_count(), 1);
        assert!(store.list_subjects(&user).await.unwrap().is_empty());

        store.set_fail_writes(false);
        store.create_subject(&user, &fields).await.unwrap();

        store.set_fail_reads(true);
        assert!(store.list_subjects(&user).await.is_err());
    }
}
