//! Repository and clock traits.
//!
//! Components depend only on these interfaces, never on a live database
//! session. `accredit-store` provides an in-memory implementation.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    CoPoMapping, CourseOutcome, ExamMark, FinalMarkRecord, IndirectAttainmentEntry,
    InternalMarkRecord, OutcomeRef, ProgramOutcome, Question, QuestionCoWeight, QuestionMark,
    SubjectAssignment, WorkflowAuditEntry,
};
use crate::workflow::WorkflowState;

// ---------------------------------------------------------------------------
// Mark repository
// ---------------------------------------------------------------------------

/// A guarded write: the stored record must still be in `expected_state` at
/// `expected_version` for the write to apply.
#[derive(Debug, Clone)]
pub struct RecordWrite {
    pub expected_state: WorkflowState,
    pub expected_version: u64,
    /// The record as it should be stored, with `version` already bumped.
    pub record: InternalMarkRecord,
    pub audit: WorkflowAuditEntry,
}

/// Storage for internal mark records, their audit trail, and final marks.
#[async_trait]
pub trait MarkRepository: Send + Sync {
    /// Fetch a record by id.
    async fn get_record(&self, id: Uuid) -> Result<Option<InternalMarkRecord>, StoreError>;

    /// Insert a new record together with its creation audit entry.
    async fn insert_record(
        &self,
        record: &InternalMarkRecord,
        audit: &WorkflowAuditEntry,
    ) -> Result<(), StoreError>;

    /// Apply every write and append every audit entry, or none of them.
    ///
    /// Fails with [`StoreError::Conflict`] if any write's expectation does
    /// not match the stored record.
    async fn commit(&self, writes: &[RecordWrite]) -> Result<(), StoreError>;

    /// Audit entries for a record, oldest first.
    async fn audit_trail(&self, record_id: Uuid) -> Result<Vec<WorkflowAuditEntry>, StoreError>;

    /// All records for one subject assignment.
    async fn records_for_assignment(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<InternalMarkRecord>, StoreError>;

    /// All records for one student in one subject assignment.
    async fn records_for_student(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<Vec<InternalMarkRecord>, StoreError>;

    /// Insert or replace the final mark keyed by (student, assignment, semester).
    async fn upsert_final_mark(&self, record: &FinalMarkRecord) -> Result<(), StoreError>;

    /// Fetch a final mark.
    async fn get_final_mark(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
        semester: u8,
    ) -> Result<Option<FinalMarkRecord>, StoreError>;

    /// All final marks for a student, any status.
    async fn final_marks_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<FinalMarkRecord>, StoreError>;
}

// ---------------------------------------------------------------------------
// Catalog repository
// ---------------------------------------------------------------------------

/// Read-only catalog snapshot: subjects, outcomes, questions, mappings, marks.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn subject_assignment(&self, id: &str) -> Result<Option<SubjectAssignment>, StoreError>;

    async fn course_outcome(&self, id: &str) -> Result<Option<CourseOutcome>, StoreError>;

    async fn course_outcomes_for_subject(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<CourseOutcome>, StoreError>;

    async fn program_outcome(&self, id: &str) -> Result<Option<ProgramOutcome>, StoreError>;

    async fn program_outcomes_for_department(
        &self,
        department_id: &str,
    ) -> Result<Vec<ProgramOutcome>, StoreError>;

    async fn question(&self, id: &str) -> Result<Option<Question>, StoreError>;

    /// Weight mappings pointing at a CO.
    async fn weights_for_co(&self, co_id: &str) -> Result<Vec<QuestionCoWeight>, StoreError>;

    /// Every CO mapping of a question, used to resolve unspecified weights.
    async fn weights_for_question(
        &self,
        question_id: &str,
    ) -> Result<Vec<QuestionCoWeight>, StoreError>;

    /// Committed per-question marks.
    async fn marks_for_question(&self, question_id: &str)
        -> Result<Vec<QuestionMark>, StoreError>;

    /// CO-PO mappings pointing at a PO.
    async fn copo_mappings_for_po(&self, po_id: &str) -> Result<Vec<CoPoMapping>, StoreError>;

    async fn indirect_attainment(
        &self,
        target: &OutcomeRef,
    ) -> Result<Vec<IndirectAttainmentEntry>, StoreError>;

    /// Exam-level marks for a student in a subject assignment.
    async fn exam_marks(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<Vec<ExamMark>, StoreError>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for the workflow engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
