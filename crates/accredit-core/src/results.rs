//! Results service: final marks and grade-point averages.
//!
//! Final marks are derived from internal marks that have reached `Frozen`
//! or `Published`, plus external exam marks. Refreshing is idempotent: a
//! recomputation that changes nothing leaves the stored record untouched.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::final_mark::{compute_final_mark, FinalMarkInput, ScaledMark};
use crate::gpa::{compute_cgpa, compute_sgpa, CgpaResult, SgpaResult};
use crate::grading::GradingPolicy;
use crate::model::{
    AssessmentComponent, FinalMarkRecord, FinalMarkStatus, InternalMarkRecord, SubjectAssignment,
};
use crate::traits::{CatalogRepository, Clock, MarkRepository};
use crate::validator::MarkValidator;
use crate::workflow::{authorize, Actor, Authority};

/// Computes, stores, and publishes final marks.
pub struct ResultsService {
    marks: Arc<dyn MarkRepository>,
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    policy: GradingPolicy,
}

impl ResultsService {
    pub fn new(
        marks: Arc<dyn MarkRepository>,
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
        policy: GradingPolicy,
    ) -> Self {
        Self {
            marks,
            catalog,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// Gather the calculator input for one student in one subject.
    pub async fn final_mark_input(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<(FinalMarkInput, SubjectAssignment), EngineError> {
        let subject = self.assignment(subject_assignment_id).await?;
        let records = self
            .marks
            .records_for_student(student_id, subject_assignment_id)
            .await?;
        let exam_marks = self
            .catalog
            .exam_marks(student_id, subject_assignment_id)
            .await?;
        let validator = MarkValidator::default();
        for mark in &exam_marks {
            validator.validate_exam_mark(mark)?;
        }

        let input = FinalMarkInput {
            student_id: student_id.to_string(),
            subject_assignment_id: subject_assignment_id.to_string(),
            semester: subject.semester,
            internal1: locked_mark(&records, AssessmentComponent::Internal1),
            internal2: locked_mark(&records, AssessmentComponent::Internal2),
            exam_marks,
        };
        Ok((input, subject))
    }

    /// Compute a final mark without storing it.
    pub async fn preview_final_mark(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<FinalMarkRecord, EngineError> {
        let (input, subject) = self
            .final_mark_input(student_id, subject_assignment_id)
            .await?;
        Ok(compute_final_mark(&input, &subject, &self.policy))
    }

    /// Recompute and upsert a final mark.
    ///
    /// If the stored record already has the same values it is returned as-is,
    /// publication included. Changed values reset the record to `Draft`.
    pub async fn refresh_final_mark(
        &self,
        student_id: &str,
        subject_assignment_id: &str,
    ) -> Result<FinalMarkRecord, EngineError> {
        let computed = self
            .preview_final_mark(student_id, subject_assignment_id)
            .await?;
        let existing = self
            .marks
            .get_final_mark(student_id, subject_assignment_id, computed.semester)
            .await?;

        match existing {
            Some(existing) if existing.same_values(&computed) => Ok(existing),
            existing => {
                if existing
                    .as_ref()
                    .is_some_and(|e| e.status == FinalMarkStatus::Published)
                {
                    tracing::warn!(
                        student = student_id,
                        subject = subject_assignment_id,
                        "published final mark changed on refresh, back to draft"
                    );
                }
                self.marks.upsert_final_mark(&computed).await?;
                tracing::debug!(
                    student = student_id,
                    subject = subject_assignment_id,
                    total = computed.total,
                    grade = %computed.grade,
                    "final mark stored"
                );
                Ok(computed)
            }
        }
    }

    /// Refresh the final mark of every student with internal marks in a subject.
    pub async fn refresh_subject(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<FinalMarkRecord>, EngineError> {
        let mut students: Vec<String> = self
            .marks
            .records_for_assignment(subject_assignment_id)
            .await?
            .into_iter()
            .map(|r| r.student_id)
            .collect();
        students.sort();
        students.dedup();

        let mut results = Vec::with_capacity(students.len());
        for student in &students {
            results.push(
                self.refresh_final_mark(student, subject_assignment_id)
                    .await?,
            );
        }
        Ok(results)
    }

    /// Mark a stored final mark as published. Exam cell or admin only.
    pub async fn publish_final_mark(
        &self,
        actor: &Actor,
        student_id: &str,
        subject_assignment_id: &str,
        semester: u8,
    ) -> Result<FinalMarkRecord, EngineError> {
        let subject = self.assignment(subject_assignment_id).await?;
        authorize(Authority::Publisher, actor, "", &subject)?;

        let mut record = self
            .marks
            .get_final_mark(student_id, subject_assignment_id, semester)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "final mark",
                id: format!("{student_id}/{subject_assignment_id}/{semester}"),
            })?;
        if record.status == FinalMarkStatus::Published {
            return Ok(record);
        }

        record.status = FinalMarkStatus::Published;
        record.published_at = Some(self.clock.now());
        self.marks.upsert_final_mark(&record).await?;
        tracing::info!(
            student = student_id,
            subject = subject_assignment_id,
            actor = %actor.id,
            "final mark published"
        );
        Ok(record)
    }

    /// SGPA for one semester from published final marks.
    pub async fn semester_sgpa(
        &self,
        student_id: &str,
        semester: u8,
    ) -> Result<SgpaResult, EngineError> {
        let records = self.marks.final_marks_for_student(student_id).await?;
        let credits = self.credits_for(&records).await?;
        let result = compute_sgpa(student_id, semester, &records, &credits);
        if result.subject_count == 0 {
            tracing::debug!(student = student_id, semester, "no published results for SGPA");
        }
        Ok(result)
    }

    /// CGPA across every semester with published final marks.
    pub async fn cgpa(&self, student_id: &str) -> Result<CgpaResult, EngineError> {
        let records = self.marks.final_marks_for_student(student_id).await?;
        let credits = self.credits_for(&records).await?;
        Ok(compute_cgpa(student_id, &records, &credits))
    }

    async fn credits_for(
        &self,
        records: &[FinalMarkRecord],
    ) -> Result<HashMap<String, f64>, EngineError> {
        let mut credits = HashMap::new();
        for record in records {
            if credits.contains_key(&record.subject_assignment_id) {
                continue;
            }
            if let Some(subject) = self
                .catalog
                .subject_assignment(&record.subject_assignment_id)
                .await?
            {
                credits.insert(subject.id, subject.credits);
            }
        }
        Ok(credits)
    }

    async fn assignment(&self, id: &str) -> Result<SubjectAssignment, EngineError> {
        self.catalog
            .subject_assignment(id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "subject assignment",
                id: id.to_string(),
            })
    }
}

/// Most recently updated frozen or published mark for `component`.
fn locked_mark(
    records: &[InternalMarkRecord],
    component: AssessmentComponent,
) -> Option<ScaledMark> {
    records
        .iter()
        .filter(|r| r.component == component && r.state.is_locked())
        .max_by_key(|r| r.updated_at)
        .map(|r| ScaledMark::new(r.marks_obtained, r.max_marks))
}
