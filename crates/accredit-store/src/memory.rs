//! In-memory repository for tests and the CLI.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use accredit_core::error::StoreError;
use accredit_core::model::{
    AuditAction, CoPoMapping, CourseOutcome, Dataset, ExamMark, FinalMarkRecord,
    ImportedInternalMark, IndirectAttainmentEntry, InternalMarkRecord, OutcomeRef, ProgramOutcome,
    Question, QuestionCoWeight, QuestionMark, SubjectAssignment, WorkflowAuditEntry,
};
use accredit_core::traits::{CatalogRepository, MarkRepository, RecordWrite};
use accredit_core::validator::MarkValidator;
use accredit_core::workflow::WorkflowState;

#[derive(Default)]
struct State {
    records: HashMap<Uuid, InternalMarkRecord>,
    audit: Vec<WorkflowAuditEntry>,
    final_marks: BTreeMap<(String, String, u8), FinalMarkRecord>,
    subjects: BTreeMap<String, SubjectAssignment>,
    course_outcomes: BTreeMap<String, CourseOutcome>,
    program_outcomes: BTreeMap<String, ProgramOutcome>,
    questions: BTreeMap<String, Question>,
    question_co_weights: Vec<QuestionCoWeight>,
    copo_mappings: Vec<CoPoMapping>,
    indirect: Vec<IndirectAttainmentEntry>,
    question_marks: Vec<QuestionMark>,
    exam_marks: Vec<ExamMark>,
}

/// Repository backed by a single mutex.
///
/// Every `commit` checks all expectations and applies all writes while
/// holding the lock, so a commit is atomic with respect to other callers.
/// Writes within one commit are checked in order.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Number of commits that have been applied.
    commit_count: AtomicU32,
    /// Upcoming commits that should fail with a backend error.
    failing_commits: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding a dataset's catalog and marks.
    ///
    /// Imported internal marks enter in their declared state with a single
    /// `Created` audit entry stamped `now`. Marks are checked with the
    /// default [`MarkValidator`].
    pub fn from_dataset(dataset: &Dataset, now: DateTime<Utc>) -> Result<Self> {
        Self::from_dataset_with(dataset, now, &MarkValidator::default())
    }

    /// Like [`MemoryStore::from_dataset`], checking every imported mark with
    /// `validator`. Any out-of-range mark fails the whole import.
    pub fn from_dataset_with(
        dataset: &Dataset,
        now: DateTime<Utc>,
        validator: &MarkValidator,
    ) -> Result<Self> {
        validate_imported_marks(dataset, validator)?;

        let store = Self::new();
        {
            let mut state = store.lock();
            for subject in &dataset.subjects {
                state.subjects.insert(subject.id.clone(), subject.clone());
            }
            for co in &dataset.course_outcomes {
                state.course_outcomes.insert(co.id.clone(), co.clone());
            }
            for po in &dataset.program_outcomes {
                state.program_outcomes.insert(po.id.clone(), po.clone());
            }
            for question in &dataset.questions {
                state.questions.insert(question.id.clone(), question.clone());
            }
            state.question_co_weights = dataset.question_co_weights.clone();
            state.copo_mappings = dataset.copo_mappings.clone();
            state.indirect = dataset.indirect_attainment.clone();
            state.question_marks = dataset.question_marks.clone();
            state.exam_marks = dataset.exam_marks.clone();

            for mark in &dataset.internal_marks {
                let subject = state
                    .subjects
                    .get(&mark.subject_assignment_id)
                    .cloned()
                    .with_context(|| {
                        format!(
                            "internal mark for {} references unknown subject {}",
                            mark.student_id, mark.subject_assignment_id
                        )
                    })?;
                let (record, audit) =
                    imported_record(mark, &subject, &dataset.academic_year, &dataset.id, now);
                state.audit.push(audit);
                state.records.insert(record.id, record);
            }
        }

        tracing::debug!(
            dataset = %dataset.id,
            subjects = dataset.subjects.len(),
            records = dataset.internal_marks.len(),
            "dataset loaded into memory store"
        );
        Ok(store)
    }

    pub fn add_subject(&self, subject: SubjectAssignment) {
        self.lock().subjects.insert(subject.id.clone(), subject);
    }

    pub fn add_course_outcome(&self, co: CourseOutcome) {
        self.lock().course_outcomes.insert(co.id.clone(), co);
    }

    pub fn add_program_outcome(&self, po: ProgramOutcome) {
        self.lock().program_outcomes.insert(po.id.clone(), po);
    }

    pub fn add_question(&self, question: Question) {
        self.lock().questions.insert(question.id.clone(), question);
    }

    pub fn add_question_co_weight(&self, weight: QuestionCoWeight) {
        self.lock().question_co_weights.push(weight);
    }

    pub fn add_copo_mapping(&self, mapping: CoPoMapping) {
        self.lock().copo_mappings.push(mapping);
    }

    pub fn add_indirect_attainment(&self, entry: IndirectAttainmentEntry) {
        self.lock().indirect.push(entry);
    }

    pub fn add_question_mark(&self, mark: QuestionMark) {
        self.lock().question_marks.push(mark);
    }

    pub fn add_exam_mark(&self, mark: ExamMark) {
        self.lock().exam_marks.push(mark);
    }

    /// Number of commits applied so far.
    pub fn commit_count(&self) -> u32 {
        self.commit_count.load(Ordering::Relaxed)
    }

    /// Make the next `n` commits fail with a backend error.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::Relaxed);
    }

    /// Every internal mark record, ordered by creation time.
    pub fn all_records(&self) -> Vec<InternalMarkRecord> {
        let mut records: Vec<_> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        records
    }

    /// Every stored final mark.
    pub fn all_final_marks(&self) -> Vec<FinalMarkRecord> {
        self.lock().final_marks.values().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn validate_imported_marks(dataset: &Dataset, validator: &MarkValidator) -> Result<()> {
    for mark in &dataset.internal_marks {
        validator
            .validate_component_mark(mark.component, mark.marks_obtained, mark.max_marks)
            .with_context(|| {
                format!(
                    "invalid {} mark for {} in {}",
                    mark.component, mark.student_id, mark.subject_assignment_id
                )
            })?;
    }

    let questions: HashMap<&str, &Question> = dataset
        .questions
        .iter()
        .map(|q| (q.id.as_str(), q))
        .collect();
    for mark in &dataset.question_marks {
        // Unknown questions are reported by `validate_dataset` and never scored.
        if let Some(question) = questions.get(mark.question_id.as_str()) {
            validator
                .validate_question_mark(question, mark.marks_obtained)
                .with_context(|| format!("invalid question mark for {}", mark.student_id))?;
        }
    }

    for mark in &dataset.exam_marks {
        validator
            .validate_exam_mark(mark)
            .with_context(|| format!("invalid exam mark in {}", mark.subject_assignment_id))?;
    }
    Ok(())
}

fn imported_record(
    mark: &ImportedInternalMark,
    subject: &SubjectAssignment,
    academic_year: &str,
    dataset_id: &str,
    now: DateTime<Utc>,
) -> (InternalMarkRecord, WorkflowAuditEntry) {
    let entered_by = mark
        .entered_by
        .clone()
        .unwrap_or_else(|| subject.faculty_id.clone());
    let record = InternalMarkRecord {
        id: Uuid::new_v4(),
        student_id: mark.student_id.clone(),
        subject_assignment_id: mark.subject_assignment_id.clone(),
        semester: subject.semester,
        academic_year: academic_year.to_string(),
        component: mark.component,
        marks_obtained: mark.marks_obtained,
        max_marks: mark.max_marks,
        state: mark.state,
        version: 1,
        entered_by: entered_by.clone(),
        created_at: now,
        updated_at: now,
        submitted_by: None,
        submitted_at: None,
        approved_by: None,
        approved_at: None,
        rejected_by: None,
        rejected_at: None,
        frozen_by: None,
        frozen_at: None,
        published_by: None,
        published_at: None,
        rejection_reason: None,
        notes: None,
    };
    let audit = WorkflowAuditEntry {
        id: Uuid::new_v4(),
        record_id: record.id,
        action: AuditAction::Created,
        old_state: WorkflowState::Draft,
        new_state: mark.state,
        actor_id: entered_by,
        at: now,
        reason: Some(format!("imported from dataset {dataset_id}")),
    };
    (record, audit)
}

#[async_trait]
impl MarkRepository for MemoryStore {
    async fn get_record(&self, id: Uuid) -> Result<Option<InternalMarkRecord>, StoreError> {
        Ok(self.lock().records.get(&id).cloned())
    }

    async fn insert_record(
        &self,
        record: &InternalMarkRecord,
        audit: &WorkflowAuditEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.records.contains_key(&record.id) {
            return Err(StoreError::Backend(format!(
                "record {} already exists",
                record.id
            )));
        }
        state.records.insert(record.id, record.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn commit(&self, writes: &[RecordWrite]) -> Result<(), StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        let mut state = self.lock();
        // Later writes in the slice see the state left by earlier ones.
        let mut pending: HashMap<Uuid, (WorkflowState, u64)> = HashMap::new();
        for write in writes {
            let current = match pending.get(&write.record.id) {
                Some(&current) => current,
                None => {
                    let stored = state.records.get(&write.record.id).ok_or_else(|| {
                        StoreError::NotFound {
                            entity: "internal mark record",
                            id: write.record.id.to_string(),
                        }
                    })?;
                    (stored.state, stored.version)
                }
            };
            if current != (write.expected_state, write.expected_version) {
                return Err(StoreError::Conflict {
                    record_id: write.record.id,
                    expected: write.expected_state,
                    expected_version: write.expected_version,
                });
            }
            pending.insert(write.record.id, (write.record.state, write.record.version));
        }

        for write in writes {
            state.records.insert(write.record.id, write.record.clone());
            state.audit.push(write.audit.clone());
        }
        self.commit_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn audit_trail(&self, record_id: Uuid) -> Result<Vec<WorkflowAuditEntry>, StoreError> {
        Ok(self
            .lock()
            .audit
            .iter()
            .filter(|e| e.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn records_for_assignment(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<InternalMarkRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .records
            .values()
            .filter(|r| r.subject_assignment_id == subject_assignment_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (&a.student_id, a.component, a.created_at)
                .cmp(&(&b.student_id, b.component, b.created_at))
        });
        Ok(records)
    }

    async fn records_for_student(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<Vec<InternalMarkRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .records
            .values()
            .filter(|r| {
                r.student_id == student_id && r.subject_assignment_id == subject_assignment_id
            })
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.component, r.created_at));
        Ok(records)
    }

    async fn upsert_final_mark(&self, record: &FinalMarkRecord) -> Result<(), StoreError> {
        let key = (
            record.student_id.clone(),
            record.subject_assignment_id.clone(),
            record.semester,
        );
        self.lock().final_marks.insert(key, record.clone());
        Ok(())
    }

    async fn get_final_mark(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
        semester: u8,
    ) -> Result<Option<FinalMarkRecord>, StoreError> {
        let key = (
            student_id.to_string(),
            subject_assignment_id.to_string(),
            semester,
        );
        Ok(self.lock().final_marks.get(&key).cloned())
    }

    async fn final_marks_for_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<FinalMarkRecord>, StoreError> {
        Ok(self
            .lock()
            .final_marks
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn subject_assignment(&self, id: &str) -> Result<Option<SubjectAssignment>, StoreError> {
        Ok(self.lock().subjects.get(id).cloned())
    }

    async fn course_outcome(&self, id: &str) -> Result<Option<CourseOutcome>, StoreError> {
        Ok(self.lock().course_outcomes.get(id).cloned())
    }

    async fn course_outcomes_for_subject(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<CourseOutcome>, StoreError> {
        Ok(self
            .lock()
            .course_outcomes
            .values()
            .filter(|c| c.subject_assignment_id == subject_assignment_id)
            .cloned()
            .collect())
    }

    async fn program_outcome(&self, id: &str) -> Result<Option<ProgramOutcome>, StoreError> {
        Ok(self.lock().program_outcomes.get(id).cloned())
    }

    async fn program_outcomes_for_department(
        &self,
        department_id: &str,
    ) -> Result<Vec<ProgramOutcome>, StoreError> {
        Ok(self
            .lock()
            .program_outcomes
            .values()
            .filter(|p| p.department_id == department_id)
            .cloned()
            .collect())
    }

    async fn question(&self, id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self.lock().questions.get(id).cloned())
    }

    async fn weights_for_co(&self, co_id: &str) -> Result<Vec<QuestionCoWeight>, StoreError> {
        Ok(self
            .lock()
            .question_co_weights
            .iter()
            .filter(|w| w.co_id == co_id)
            .cloned()
            .collect())
    }

    async fn weights_for_question(
        &self,
        question_id: &str,
    ) -> Result<Vec<QuestionCoWeight>, StoreError> {
        Ok(self
            .lock()
            .question_co_weights
            .iter()
            .filter(|w| w.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn marks_for_question(
        &self,
        question_id: &str,
    ) -> Result<Vec<QuestionMark>, StoreError> {
        Ok(self
            .lock()
            .question_marks
            .iter()
            .filter(|m| m.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn copo_mappings_for_po(&self, po_id: &str) -> Result<Vec<CoPoMapping>, StoreError> {
        Ok(self
            .lock()
            .copo_mappings
            .iter()
            .filter(|m| m.po_id == po_id)
            .cloned()
            .collect())
    }

    async fn indirect_attainment(
        &self,
        target: &OutcomeRef,
    ) -> Result<Vec<IndirectAttainmentEntry>, StoreError> {
        Ok(self
            .lock()
            .indirect
            .iter()
            .filter(|e| &e.target == target)
            .cloned()
            .collect())
    }

    async fn exam_marks(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<Vec<ExamMark>, StoreError> {
        Ok(self
            .lock()
            .exam_marks
            .iter()
            .filter(|m| {
                m.student_id == student_id && m.subject_assignment_id == subject_assignment_id
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredit_core::model::AssessmentComponent;

    fn subject() -> SubjectAssignment {
        SubjectAssignment {
            id: "sa1".into(),
            subject_code: "CS301".into(),
            subject_name: "Compiler Design".into(),
            department_id: "cse".into(),
            faculty_id: "fac1".into(),
            semester: 5,
            credits: 4.0,
            max_internal: 40.0,
            max_external: 60.0,
        }
    }

    fn dataset() -> Dataset {
        Dataset {
            id: "ds".into(),
            name: "Dataset".into(),
            academic_year: "2025-26".into(),
            subjects: vec![subject()],
            internal_marks: vec![ImportedInternalMark {
                student_id: "s1".into(),
                subject_assignment_id: "sa1".into(),
                component: AssessmentComponent::Internal1,
                marks_obtained: 28.0,
                max_marks: 30.0,
                state: WorkflowState::Frozen,
                entered_by: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn from_dataset_imports_records_with_audit() {
        let store = MemoryStore::from_dataset(&dataset(), Utc::now()).unwrap();
        let records = store.records_for_assignment("sa1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, WorkflowState::Frozen);
        assert_eq!(records[0].entered_by, "fac1");
        assert_eq!(records[0].semester, 5);

        let trail = store.audit_trail(records[0].id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Created);
        assert_eq!(trail[0].new_state, WorkflowState::Frozen);
    }

    #[test]
    fn from_dataset_rejects_unknown_subject() {
        let mut ds = dataset();
        ds.internal_marks[0].subject_assignment_id = "missing".into();
        let err = MemoryStore::from_dataset(&ds, Utc::now()).err().unwrap();
        assert!(err.to_string().contains("unknown subject missing"));
    }

    #[test]
    fn from_dataset_rejects_internal_mark_above_max() {
        let mut ds = dataset();
        ds.internal_marks[0].marks_obtained = 50.0;
        let err = MemoryStore::from_dataset(&ds, Utc::now()).err().unwrap();
        assert!(format!("{err:#}").contains("exceed maximum 30"));
    }

    #[test]
    fn from_dataset_rejects_question_mark_above_max() {
        let mut ds = dataset();
        ds.questions.push(Question {
            id: "q1".into(),
            subject_assignment_id: "sa1".into(),
            exam_type: accredit_core::model::ExamType::Internal1,
            label: "1a".into(),
            max_marks: 10.0,
            bloom_level: None,
            difficulty: None,
        });
        ds.question_marks.push(QuestionMark {
            student_id: "s1".into(),
            question_id: "q1".into(),
            marks_obtained: 12.0,
        });
        let err = MemoryStore::from_dataset(&ds, Utc::now()).err().unwrap();
        assert!(format!("{err:#}").contains("question q1"));

        ds.question_marks[0].marks_obtained = 10.0;
        assert!(MemoryStore::from_dataset(&ds, Utc::now()).is_ok());
    }

    #[test]
    fn from_dataset_with_applies_configured_rules() {
        let mut ds = dataset();
        ds.internal_marks[0].marks_obtained = 27.25;
        let validator = MarkValidator::new(accredit_core::validator::ValidationRules {
            mark_step: Some(0.5),
            ..Default::default()
        });

        assert!(MemoryStore::from_dataset(&ds, Utc::now()).is_ok());
        let err = MemoryStore::from_dataset_with(&ds, Utc::now(), &validator)
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("not a multiple of 0.5"));
    }

    fn published_write(record: &InternalMarkRecord, from: WorkflowState) -> RecordWrite {
        let mut updated = record.clone();
        updated.state = WorkflowState::Published;
        updated.version = record.version + 1;
        RecordWrite {
            expected_state: from,
            expected_version: record.version,
            audit: WorkflowAuditEntry {
                id: Uuid::new_v4(),
                record_id: record.id,
                action: AuditAction::Transition,
                old_state: from,
                new_state: WorkflowState::Published,
                actor_id: "cell".into(),
                at: Utc::now(),
                reason: None,
            },
            record: updated,
        }
    }

    #[tokio::test]
    async fn commit_checks_repeated_record_against_earlier_write() {
        let store = MemoryStore::from_dataset(&dataset(), Utc::now()).unwrap();
        let record = store.all_records().remove(0);

        let write = published_write(&record, WorkflowState::Frozen);
        let err = store
            .commit(&[write.clone(), write.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.all_records()[0].version, 1);
        assert_eq!(store.audit_trail(record.id).await.unwrap().len(), 1);

        // A second write that builds on the first applies.
        let next = published_write(&write.record, WorkflowState::Published);
        store.commit(&[write, next]).await.unwrap();
        assert_eq!(store.all_records()[0].version, 3);
        assert_eq!(store.audit_trail(record.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn commit_rejects_stale_version_and_writes_nothing() {
        let store = MemoryStore::from_dataset(&dataset(), Utc::now()).unwrap();
        let record = store.all_records().remove(0);

        let mut updated = record.clone();
        updated.state = WorkflowState::Published;
        updated.version = 2;
        let audit = WorkflowAuditEntry {
            id: Uuid::new_v4(),
            record_id: record.id,
            action: AuditAction::Transition,
            old_state: WorkflowState::Frozen,
            new_state: WorkflowState::Published,
            actor_id: "cell".into(),
            at: Utc::now(),
            reason: None,
        };
        let stale = RecordWrite {
            expected_state: WorkflowState::Frozen,
            expected_version: 7,
            record: updated.clone(),
            audit: audit.clone(),
        };

        let err = store.commit(&[stale]).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.all_records()[0].state, WorkflowState::Frozen);
        assert_eq!(store.audit_trail(record.id).await.unwrap().len(), 1);
        assert_eq!(store.commit_count(), 0);

        let fresh = RecordWrite {
            expected_state: WorkflowState::Frozen,
            expected_version: 1,
            record: updated,
            audit,
        };
        store.commit(&[fresh]).await.unwrap();
        assert_eq!(store.all_records()[0].state, WorkflowState::Published);
        assert_eq!(store.audit_trail(record.id).await.unwrap().len(), 2);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        assert!(matches!(
            store.commit(&[]).await,
            Err(StoreError::Backend(_))
        ));
        store.commit(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn final_marks_keyed_by_student_subject_semester() {
        let store = MemoryStore::new();
        let record = FinalMarkRecord {
            student_id: "s1".into(),
            subject_assignment_id: "sa1".into(),
            semester: 5,
            internal1: None,
            internal2: None,
            best_internal: 30.0,
            external: 45.0,
            total: 75.0,
            percentage: 75.0,
            grade: "B+".into(),
            grade_point: 7.0,
            result: accredit_core::model::PassStatus::Pass,
            status: accredit_core::model::FinalMarkStatus::Draft,
            published_at: None,
        };
        store.upsert_final_mark(&record).await.unwrap();
        store.upsert_final_mark(&record).await.unwrap();
        assert_eq!(store.all_final_marks().len(), 1);
        assert_eq!(
            store.get_final_mark("s1", "sa1", 5).await.unwrap(),
            Some(record)
        );
        assert!(store.get_final_mark("s1", "sa1", 6).await.unwrap().is_none());
    }
}
