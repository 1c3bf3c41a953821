//! Mark validation.
//!
//! Every mark is checked here before it reaches the workflow engine, so an
//! out-of-range value never causes a state change.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{AssessmentComponent, ExamMark, Question};

/// Rules applied on top of `0 <= marks <= max`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Marks must be a multiple of this step (e.g. 0.5). `None` allows any value.
    #[serde(default)]
    pub mark_step: Option<f64>,
    /// Largest `max_marks` a component may be entered against.
    #[serde(default)]
    pub component_caps: HashMap<AssessmentComponent, f64>,
}

/// Checks raw marks against their maximum and component rules.
#[derive(Debug, Clone, Default)]
pub struct MarkValidator {
    rules: ValidationRules,
}

impl MarkValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// Validate a mark entered against an internal assessment component.
    pub fn validate_component_mark(
        &self,
        component: AssessmentComponent,
        marks_obtained: f64,
        max_marks: f64,
    ) -> Result<(), EngineError> {
        if let Some(&cap) = self.rules.component_caps.get(&component) {
            if max_marks > cap {
                return Err(EngineError::Validation(format!(
                    "{component} may not be entered out of more than {cap} (got {max_marks})"
                )));
            }
        }
        self.validate_range(marks_obtained, max_marks)
    }

    /// Validate a component given as text, as received from an entry form.
    pub fn validate_raw_component(
        &self,
        component: &str,
        marks_obtained: f64,
        max_marks: f64,
    ) -> Result<AssessmentComponent, EngineError> {
        let component: AssessmentComponent =
            component.parse().map_err(EngineError::Validation)?;
        self.validate_component_mark(component, marks_obtained, max_marks)?;
        Ok(component)
    }

    /// Validate a raw per-question mark against the question's maximum.
    pub fn validate_question_mark(
        &self,
        question: &Question,
        marks_obtained: f64,
    ) -> Result<(), EngineError> {
        self.validate_range(marks_obtained, question.max_marks)
            .map_err(|e| match e {
                EngineError::Validation(msg) => {
                    EngineError::Validation(format!("question {}: {msg}", question.id))
                }
                other => other,
            })
    }

    /// Validate an external exam mark against its own maximum.
    pub fn validate_exam_mark(&self, mark: &ExamMark) -> Result<(), EngineError> {
        self.validate_range(mark.marks_obtained, mark.max_marks)
            .map_err(|e| match e {
                EngineError::Validation(msg) => EngineError::Validation(format!(
                    "{} exam mark for {}: {msg}",
                    mark.exam_type, mark.student_id
                )),
                other => other,
            })
    }

    fn validate_range(&self, marks_obtained: f64, max_marks: f64) -> Result<(), EngineError> {
        if !marks_obtained.is_finite() || !max_marks.is_finite() {
            return Err(EngineError::Validation("marks must be finite numbers".into()));
        }
        if max_marks <= 0.0 {
            return Err(EngineError::Validation(format!(
                "max marks must be positive (got {max_marks})"
            )));
        }
        if marks_obtained < 0.0 {
            return Err(EngineError::Validation(format!(
                "marks may not be negative (got {marks_obtained})"
            )));
        }
        if marks_obtained > max_marks {
            return Err(EngineError::Validation(format!(
                "marks {marks_obtained} exceed maximum {max_marks}"
            )));
        }
        if let Some(step) = self.rules.mark_step {
            if step > 0.0 {
                let steps = marks_obtained / step;
                if (steps - steps.round()).abs() > 1e-9 {
                    return Err(EngineError::Validation(format!(
                        "marks {marks_obtained} are not a multiple of {step}"
                    )));
                }
            }
        }
        Ok(())
    }
}
