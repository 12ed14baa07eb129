//! Attendance ledger
//!
//! In-memory view of one user's subjects. Every mutation is written to the
//! document store first and only reflected in memory once the write has
//! succeeded, so a failed write leaves the ledger exactly as it was.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::UserId;
use crate::store::{DocumentId, DocumentStore, NewSubjectDocument, SubjectPatch};

pub mod subject;

pub use subject::{percentage, SessionMark, Subject, DEFAULT_TARGET_ATTENDANCE};

enum LedgerState {
    /// No active user
    SignedOut,
    /// Load for this user failed; contents are unknown, not empty
    Unknown(UserId),
    Loaded { user: UserId, subjects: Vec<Subject> },
}

/// User and subjects of a loaded ledger, or why mutations are refused
fn loaded(state: &mut LedgerState) -> Result<(&UserId, &mut Vec<Subject>)> {
    match state {
        LedgerState::Loaded { user, subjects } => Ok((user, subjects)),
        LedgerState::Unknown(_) => Err(Error::NotLoaded),
        LedgerState::SignedOut => Err(Error::NoActiveUser),
    }
}

pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    state: LedgerState,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: LedgerState::SignedOut,
        }
    }

    /// Replace the ledger with the stored subjects of `user`.
    ///
    /// On failure the ledger becomes unknown for `user`: previous contents
    /// are dropped and mutations are refused until a load succeeds.
    pub async fn load(&mut self, user: &UserId) -> Result<&[Subject]> {
        let docs = match self.store.list_subjects(user).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Failed to load subjects for {}: {}", user, e);
                self.state = LedgerState::Unknown(user.clone());
                return Err(Error::StoreUnavailable(e));
            }
        };

        let mut subjects = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone();
            match Subject::from_document(doc) {
                Ok(subject) => subjects.push(subject),
                Err(reason) => warn!("Skipping stored subject {}: {}", id, reason),
            }
        }

        info!("Loaded {} subjects for {}", subjects.len(), user);
        self.state = LedgerState::Loaded {
            user: user.clone(),
            subjects,
        };
        Ok(self.subjects())
    }

    /// Drop all state, as on sign-out
    pub fn clear(&mut self) {
        self.state = LedgerState::SignedOut;
    }

    /// Subjects in insertion order. Empty unless loaded.
    pub fn subjects(&self) -> &[Subject] {
        match &self.state {
            LedgerState::Loaded { subjects, .. } => subjects,
            _ => &[],
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, LedgerState::Loaded { .. })
    }

    /// User the ledger is scoped to, loaded or not
    pub fn user(&self) -> Option<&UserId> {
        match &self.state {
            LedgerState::SignedOut => None,
            LedgerState::Unknown(user) | LedgerState::Loaded { user, .. } => Some(user),
        }
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Subject> {
        self.subjects().iter().find(|s| s.id() == id)
    }

    /// Look a subject up by id, then by name ignoring case
    pub fn find(&self, key: &str) -> Option<&Subject> {
        let key = key.trim();
        self.subjects()
            .iter()
            .find(|s| s.id().as_str() == key)
            .or_else(|| self.subjects().iter().find(|s| s.name().eq_ignore_ascii_case(key)))
    }

    /// Create a subject with zero counts and the default target.
    ///
    /// A name that is empty after trimming is ignored: `Ok(None)`, nothing
    /// written.
    pub async fn add(&mut self, name: &str) -> Result<Option<Subject>> {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring subject with empty name");
            return Ok(None);
        }

        let (user, subjects) = loaded(&mut self.state)?;

        let fields = NewSubjectDocument {
            name: name.to_string(),
            attended: 0,
            total: 0,
            target_attendance: Some(DEFAULT_TARGET_ATTENDANCE),
        };
        let id = self
            .store
            .create_subject(user, &fields)
            .await
            .map_err(Error::StoreWriteError)?;

        let subject = Subject::created(id, fields.name);
        info!("Added subject '{}' ({})", subject.name(), subject.id());
        subjects.push(subject.clone());
        Ok(Some(subject))
    }

    /// Add `attended_delta` attended and `total_delta` held sessions.
    ///
    /// Rejected with `InvariantViolation` if the result would have more
    /// attended than held sessions, or would overflow.
    pub async fn record_session(
        &mut self,
        id: &DocumentId,
        attended_delta: u32,
        total_delta: u32,
    ) -> Result<Subject> {
        let (user, subjects) = loaded(&mut self.state)?;
        let index = subjects
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| Error::UnknownSubject(id.to_string()))?;

        let current = &subjects[index];
        let (attended, total) = match (
            current.attended().checked_add(attended_delta),
            current.total().checked_add(total_delta),
        ) {
            (Some(a), Some(t)) if a <= t => (a, t),
            (Some(a), Some(t)) => {
                return Err(Error::InvariantViolation(format!(
                    "'{}' would have {} attended out of {} sessions",
                    current.name(),
                    a,
                    t
                )))
            }
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "'{}' session count overflow",
                    current.name()
                )))
            }
        };

        let patch = SubjectPatch {
            attended: Some(attended),
            total: Some(total),
        };
        self.store
            .update_subject(user, id, patch)
            .await
            .map_err(Error::StoreWriteError)?;

        let subject = &mut subjects[index];
        subject.set_counts(attended, total);
        debug!(
            "Recorded session for '{}': {}/{} ({}%)",
            subject.name(),
            attended,
            total,
            subject.percentage()
        );
        Ok(subject.clone())
    }

    /// Record a present or absent session
    pub async fn mark(&mut self, id: &DocumentId, mark: SessionMark) -> Result<Subject> {
        let (attended_delta, total_delta) = mark.deltas();
        self.record_session(id, attended_delta, total_delta).await
    }

    /// Delete a subject from the store, then from the ledger
    pub async fn remove(&mut self, id: &DocumentId) -> Result<Subject> {
        let (user, subjects) = loaded(&mut self.state)?;
        let index = subjects
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| Error::UnknownSubject(id.to_string()))?;

        self.store
            .delete_subject(user, id)
            .await
            .map_err(Error::StoreWriteError)?;

        let removed = subjects.remove(index);
        info!("Removed subject '{}' ({})", removed.name(), removed.id());
        Ok(removed)
    }
}
