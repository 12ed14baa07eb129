//! Subject model and derived attendance figures

use serde::Serialize;

use crate::store::{DocumentId, SubjectDocument};

/// Target used when a stored subject has none
pub const DEFAULT_TARGET_ATTENDANCE: u8 = 75;

/// A tracked class with cumulative attendance counts.
///
/// Fields are private so `attended <= total` can only change through the
/// ledger's counting operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    id: DocumentId,
    name: String,
    attended: u32,
    total: u32,
    target_attendance: u8,
}

impl Subject {
    /// Fresh subject as written on creation
    pub(crate) fn created(id: DocumentId, name: String) -> Self {
        Self {
            id,
            name,
            attended: 0,
            total: 0,
            target_attendance: DEFAULT_TARGET_ATTENDANCE,
        }
    }

    /// Validate a stored document.
    ///
    /// A missing target falls back to the default; a target outside 0..=100
    /// is clamped. Counts that are negative, overflow, or break
    /// `attended <= total` reject the document.
    pub(crate) fn from_document(doc: SubjectDocument) -> Result<Self, String> {
        let attended = u32::try_from(doc.attended)
            .map_err(|_| format!("attended count {} out of range", doc.attended))?;
        let total = u32::try_from(doc.total)
            .map_err(|_| format!("total count {} out of range", doc.total))?;
        if attended > total {
            return Err(format!("attended {} exceeds total {}", attended, total));
        }

        let target_attendance = match doc.target_attendance {
            None => DEFAULT_TARGET_ATTENDANCE,
            Some(t) => t.clamp(0, 100) as u8,
        };

        Ok(Self {
            id: doc.id,
            name: doc.name,
            attended,
            total,
            target_attendance,
        })
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attended(&self) -> u32 {
        self.attended
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn target_attendance(&self) -> u8 {
        self.target_attendance
    }

    /// Attendance percentage rounded half up, 0 when no sessions were held
    pub fn percentage(&self) -> u32 {
        percentage(self.attended, self.total)
    }

    /// Whether attendance sits under the user's target
    pub fn is_below_target(&self) -> bool {
        self.percentage() < u32::from(self.target_attendance)
    }

    pub(crate) fn set_counts(&mut self, attended: u32, total: u32) {
        debug_assert!(attended <= total);
        self.attended = attended;
        self.total = total;
    }
}

/// `round(attended / total * 100)`, or 0 when `total` is 0.
///
/// Integer arithmetic: `(200a + t) / 2t` is `100a/t` rounded half up.
pub fn percentage(attended: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let attended = u64::from(attended);
    let total = u64::from(total);
    ((attended * 200 + total) / (total * 2)) as u32
}

/// The two counting actions the user can take on a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMark {
    Present,
    Absent,
}

impl SessionMark {
    /// `(attended_delta, total_delta)`
    pub fn deltas(self) -> (u32, u32) {
        match self {
            SessionMark::Present => (1, 1),
            SessionMark::Absent => (0, 1),
        }
    }
}
