//! Core data model types for accredit.
//!
//! These are the records the workflow engine mutates, the catalog snapshots
//! the calculators read, and the derived records they emit.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::WorkflowState;

// ---------------------------------------------------------------------------
// Internal marks and audit trail
// ---------------------------------------------------------------------------

/// Internal assessment component a mark was entered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentComponent {
    Internal1,
    Internal2,
    Assignment,
    Quiz,
    Lab,
}

impl fmt::Display for AssessmentComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentComponent::Internal1 => write!(f, "internal1"),
            AssessmentComponent::Internal2 => write!(f, "internal2"),
            AssessmentComponent::Assignment => write!(f, "assignment"),
            AssessmentComponent::Quiz => write!(f, "quiz"),
            AssessmentComponent::Lab => write!(f, "lab"),
        }
    }
}

impl FromStr for AssessmentComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal1" | "internal_1" | "ia1" => Ok(AssessmentComponent::Internal1),
            "internal2" | "internal_2" | "ia2" => Ok(AssessmentComponent::Internal2),
            "assignment" => Ok(AssessmentComponent::Assignment),
            "quiz" => Ok(AssessmentComponent::Quiz),
            "lab" | "practical" => Ok(AssessmentComponent::Lab),
            other => Err(format!("unknown assessment component: {other}")),
        }
    }
}

/// One student's mark for one assessment component of a subject assignment.
///
/// Created in `Draft` and mutated only through the workflow engine. Records
/// are never deleted; a correction is a new workflow state plus an audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalMarkRecord {
    pub id: Uuid,
    pub student_id: String,
    pub subject_assignment_id: String,
    pub semester: u8,
    pub academic_year: String,
    pub component: AssessmentComponent,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub state: WorkflowState,
    /// Incremented on every committed write; used as the optimistic lock.
    pub version: u64,
    pub entered_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_by: Option<String>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frozen_by: Option<String>,
    #[serde(default)]
    pub frozen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_by: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for creating a new internal mark record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInternalMark {
    pub student_id: String,
    pub subject_assignment_id: String,
    pub semester: u8,
    pub academic_year: String,
    pub component: AssessmentComponent,
    pub marks_obtained: f64,
    pub max_marks: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What an audit entry records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    /// The record was first entered.
    Created,
    /// A regular workflow transition.
    Transition,
    /// `marks_obtained` changed while the record was editable.
    MarksEdited {
        previous: f64,
        current: f64,
        overridden: bool,
    },
    /// An administrative rollback to an earlier state.
    Rollback,
}

/// Immutable, append-only history entry for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAuditEntry {
    pub id: Uuid,
    pub record_id: Uuid,
    pub action: AuditAction,
    pub old_state: WorkflowState,
    pub new_state: WorkflowState,
    pub actor_id: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Catalog snapshots
// ---------------------------------------------------------------------------

/// A subject taught to a class by one faculty member in one semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAssignment {
    pub id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub department_id: String,
    /// The faculty member who owns mark entry for this assignment.
    pub faculty_id: String,
    pub semester: u8,
    pub credits: f64,
    pub max_internal: f64,
    pub max_external: f64,
}

/// Exam types a question or exam-level mark can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Internal1,
    Internal2,
    Assignment,
    External,
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamType::Internal1 => write!(f, "internal1"),
            ExamType::Internal2 => write!(f, "internal2"),
            ExamType::Assignment => write!(f, "assignment"),
            ExamType::External => write!(f, "external"),
        }
    }
}

impl FromStr for ExamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal1" | "ia1" => Ok(ExamType::Internal1),
            "internal2" | "ia2" => Ok(ExamType::Internal2),
            "assignment" => Ok(ExamType::Assignment),
            "external" | "semester_end" | "see" => Ok(ExamType::External),
            other => Err(format!("unknown exam type: {other}")),
        }
    }
}

/// Bloom's taxonomy level of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

/// A question on an exam paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub subject_assignment_id: String,
    pub exam_type: ExamType,
    pub label: String,
    pub max_marks: f64,
    #[serde(default)]
    pub bloom_level: Option<BloomLevel>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// The share of a question's marks attributable to one CO.
///
/// `weight_pct = None` means "unspecified": the question's unclaimed
/// percentage is split equally among its unspecified mappings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCoWeight {
    pub question_id: String,
    pub co_id: String,
    #[serde(default)]
    pub weight_pct: Option<f64>,
}

/// A measurable learning objective for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOutcome {
    pub id: String,
    pub subject_assignment_id: String,
    pub code: String,
    pub title: String,
    pub target_attainment: f64,
    pub l1_threshold: f64,
    pub l2_threshold: f64,
    pub l3_threshold: f64,
}

/// Whether a program-level outcome is a PO or a program-specific outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Po,
    Pso,
}

/// A measurable objective at department/program level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramOutcome {
    pub id: String,
    pub department_id: String,
    pub code: String,
    pub title: String,
    pub target_attainment: f64,
    #[serde(default = "default_outcome_kind")]
    pub kind: OutcomeKind,
}

fn default_outcome_kind() -> OutcomeKind {
    OutcomeKind::Po
}

/// Contribution strength (1..=3) of a CO toward a PO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoPoMapping {
    pub co_id: String,
    pub po_id: String,
    pub strength: u8,
}

/// What a survey-sourced attainment value applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum OutcomeRef {
    Co(String),
    Po(String),
}

/// A survey-sourced (indirect) attainment value, entered externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndirectAttainmentEntry {
    pub target: OutcomeRef,
    pub value_pct: f64,
}

/// A committed per-question mark for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMark {
    pub student_id: String,
    pub question_id: String,
    pub marks_obtained: f64,
}

/// An exam-level mark (e.g. the external paper total).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamMark {
    pub student_id: String,
    pub subject_assignment_id: String,
    pub exam_type: ExamType,
    pub marks_obtained: f64,
    pub max_marks: f64,
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// An internal mark imported from a dataset file in a given workflow state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedInternalMark {
    pub student_id: String,
    pub subject_assignment_id: String,
    pub component: AssessmentComponent,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub state: WorkflowState,
    /// Defaults to the assignment's faculty when loaded.
    #[serde(default)]
    pub entered_by: Option<String>,
}

/// A catalog snapshot plus marks, as loaded from a dataset file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub academic_year: String,
    #[serde(default)]
    pub subjects: Vec<SubjectAssignment>,
    #[serde(default)]
    pub course_outcomes: Vec<CourseOutcome>,
    #[serde(default)]
    pub program_outcomes: Vec<ProgramOutcome>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub question_co_weights: Vec<QuestionCoWeight>,
    #[serde(default)]
    pub copo_mappings: Vec<CoPoMapping>,
    #[serde(default)]
    pub indirect_attainment: Vec<IndirectAttainmentEntry>,
    #[serde(default)]
    pub question_marks: Vec<QuestionMark>,
    #[serde(default)]
    pub internal_marks: Vec<ImportedInternalMark>,
    #[serde(default)]
    pub exam_marks: Vec<ExamMark>,
}

impl Dataset {
    /// Distinct student ids across every kind of mark, sorted.
    pub fn students(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .question_marks
            .iter()
            .map(|m| m.student_id.clone())
            .chain(self.internal_marks.iter().map(|m| m.student_id.clone()))
            .chain(self.exam_marks.iter().map(|m| m.student_id.clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Distinct department ids of the subjects, sorted.
    pub fn departments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subjects.iter().map(|s| s.department_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

/// Lifecycle of a derived final mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalMarkStatus {
    Draft,
    Published,
}

/// Pass/fail outcome of a final mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pass,
    Fail,
}

/// A student's derived result for one subject in one semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMarkRecord {
    pub student_id: String,
    pub subject_assignment_id: String,
    pub semester: u8,
    /// Internal 1 normalized to the subject's internal scale.
    pub internal1: Option<f64>,
    /// Internal 2 normalized to the subject's internal scale.
    pub internal2: Option<f64>,
    pub best_internal: f64,
    pub external: f64,
    pub total: f64,
    pub percentage: f64,
    pub grade: String,
    pub grade_point: f64,
    pub result: PassStatus,
    pub status: FinalMarkStatus,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl FinalMarkRecord {
    /// True when every derived field equals `other`'s, ignoring lifecycle.
    pub fn same_values(&self, other: &FinalMarkRecord) -> bool {
        self.student_id == other.student_id
            && self.subject_assignment_id == other.subject_assignment_id
            && self.semester == other.semester
            && self.internal1 == other.internal1
            && self.internal2 == other.internal2
            && self.best_internal == other.best_internal
            && self.external == other.external
            && self.total == other.total
            && self.percentage == other.percentage
            && self.grade == other.grade
            && self.grade_point == other.grade_point
            && self.result == other.result
    }
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
