//! Best-internal and final-mark calculation.

use serde::{Deserialize, Serialize};

use crate::grading::GradingPolicy;
use crate::model::{
    round2, ExamMark, ExamType, FinalMarkRecord, FinalMarkStatus, PassStatus, SubjectAssignment,
};

/// A mark together with the scale it was entered against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledMark {
    pub obtained: f64,
    pub out_of: f64,
}

impl ScaledMark {
    pub fn new(obtained: f64, out_of: f64) -> Self {
        Self { obtained, out_of }
    }

    /// Rescale proportionally onto `target`.
    pub fn normalize_to(&self, target: f64) -> f64 {
        if self.out_of <= 0.0 {
            return 0.0;
        }
        self.obtained / self.out_of * target
    }
}

/// Everything needed to derive one final mark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMarkInput {
    pub student_id: String,
    pub subject_assignment_id: String,
    pub semester: u8,
    #[serde(default)]
    pub internal1: Option<ScaledMark>,
    #[serde(default)]
    pub internal2: Option<ScaledMark>,
    #[serde(default)]
    pub exam_marks: Vec<ExamMark>,
}

/// Sum of external exam marks, capped at the subject's external maximum.
pub fn external_total(exam_marks: &[ExamMark], max_external: f64) -> f64 {
    let sum: f64 = exam_marks
        .iter()
        .filter(|m| m.exam_type == ExamType::External)
        .map(|m| m.marks_obtained)
        .sum();
    sum.min(max_external).max(0.0)
}

/// Derive a draft final mark. Pure: identical inputs give identical output.
pub fn compute_final_mark(
    input: &FinalMarkInput,
    subject: &SubjectAssignment,
    policy: &GradingPolicy,
) -> FinalMarkRecord {
    let internal1 = input
        .internal1
        .map(|m| round2(m.normalize_to(subject.max_internal)));
    let internal2 = input
        .internal2
        .map(|m| round2(m.normalize_to(subject.max_internal)));
    let best_internal = round2(policy.internal_method.combine(internal1, internal2));

    let external = round2(external_total(&input.exam_marks, subject.max_external));
    let total = round2(best_internal + external);

    let max_total = subject.max_internal + subject.max_external;
    let percentage = if max_total > 0.0 {
        round2(total / max_total * 100.0)
    } else {
        0.0
    };

    let (grade, grade_point) = policy.grade_for(percentage);
    let result = if policy.passes(percentage) {
        PassStatus::Pass
    } else {
        PassStatus::Fail
    };

    FinalMarkRecord {
        student_id: input.student_id.clone(),
        subject_assignment_id: input.subject_assignment_id.clone(),
        semester: input.semester,
        internal1,
        internal2,
        best_internal,
        external,
        total,
        percentage,
        grade,
        grade_point,
        result,
        status: FinalMarkStatus::Draft,
        published_at: None,
    }
}
