//! CO and PO attainment.
//!
//! [`co`] and [`po`] hold the pure calculators. [`AttainmentService`] reads
//! a consistent snapshot through [`CatalogRepository`] and runs them. One
//! pass computes every CO at most once, even when several POs map to it.

pub mod co;
pub mod po;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{CourseOutcome, OutcomeRef, ProgramOutcome};
use crate::traits::CatalogRepository;
use crate::validator::MarkValidator;

pub use co::{
    classify, compute_co_attainment, resolve_weights, AttainmentBand, CoAttainment, CoInputs,
    MappedQuestion,
};
pub use po::{compute_po_attainment, PoAttainment, PoContribution};

/// Default share of direct (CO-derived) attainment in a PO total.
pub const DEFAULT_DIRECT_WEIGHT: f64 = 0.8;

/// Whether an attainment figure was computed from real data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttainmentStatus {
    Ok,
    /// No mapped questions or no marks.
    NoData,
    /// No valid CO-PO mappings.
    NoMappings,
}

/// How direct and indirect attainment blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttainmentPolicy {
    #[serde(default = "default_direct_weight")]
    pub direct_weight: f64,
}

fn default_direct_weight() -> f64 {
    DEFAULT_DIRECT_WEIGHT
}

impl Default for AttainmentPolicy {
    fn default() -> Self {
        Self {
            direct_weight: DEFAULT_DIRECT_WEIGHT,
        }
    }
}

impl AttainmentPolicy {
    pub fn indirect_weight(&self) -> f64 {
        1.0 - self.direct_weight
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.direct_weight) {
            return Err(EngineError::Validation(format!(
                "direct weight {} outside 0..=1",
                self.direct_weight
            )));
        }
        Ok(())
    }
}

/// Attainment for every PO of a department, with the COs behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentAttainment {
    pub department_id: String,
    pub course_outcomes: Vec<CoAttainment>,
    pub program_outcomes: Vec<PoAttainment>,
}

/// Reads catalog snapshots and computes attainment.
pub struct AttainmentService {
    catalog: Arc<dyn CatalogRepository>,
    policy: AttainmentPolicy,
    validator: MarkValidator,
}

impl AttainmentService {
    pub fn new(catalog: Arc<dyn CatalogRepository>, policy: AttainmentPolicy) -> Self {
        Self {
            catalog,
            policy,
            validator: MarkValidator::default(),
        }
    }

    /// Replace the validator applied to question marks before scoring.
    pub fn with_validator(mut self, validator: MarkValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn policy(&self) -> &AttainmentPolicy {
        &self.policy
    }

    /// Attainment of a single CO.
    pub async fn co_attainment(&self, co_id: &str) -> Result<CoAttainment, EngineError> {
        let co = self
            .catalog
            .course_outcome(co_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "course outcome",
                id: co_id.to_string(),
            })?;
        self.compute_co(&co).await
    }

    /// Attainment of every CO of a subject assignment, ordered by code.
    pub async fn subject_attainment(
        &self,
        subject_assignment_id: &str,
    ) -> Result<Vec<CoAttainment>, EngineError> {
        if self
            .catalog
            .subject_assignment(subject_assignment_id)
            .await?
            .is_none()
        {
            return Err(EngineError::NotFound {
                entity: "subject assignment",
                id: subject_assignment_id.to_string(),
            });
        }
        let mut cos = self
            .catalog
            .course_outcomes_for_subject(subject_assignment_id)
            .await?;
        cos.sort_by(|a, b| a.code.cmp(&b.code));

        let mut results = Vec::with_capacity(cos.len());
        for co in &cos {
            results.push(self.compute_co(co).await?);
        }
        Ok(results)
    }

    /// Attainment of a single PO.
    pub async fn po_attainment(&self, po_id: &str) -> Result<PoAttainment, EngineError> {
        let po = self
            .catalog
            .program_outcome(po_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "program outcome",
                id: po_id.to_string(),
            })?;
        let mut cache = BTreeMap::new();
        self.compute_po(&po, &mut cache).await
    }

    /// Attainment of every PO/PSO of a department, ordered by code.
    pub async fn department_attainment(
        &self,
        department_id: &str,
    ) -> Result<DepartmentAttainment, EngineError> {
        let mut pos = self
            .catalog
            .program_outcomes_for_department(department_id)
            .await?;
        pos.sort_by(|a, b| a.code.cmp(&b.code));

        let mut cache = BTreeMap::new();
        let mut program_outcomes = Vec::with_capacity(pos.len());
        for po in &pos {
            program_outcomes.push(self.compute_po(po, &mut cache).await?);
        }

        let mut course_outcomes: Vec<CoAttainment> = cache.into_values().flatten().collect();
        course_outcomes.sort_by(|a, b| {
            (&a.subject_assignment_id, &a.code).cmp(&(&b.subject_assignment_id, &b.code))
        });

        tracing::info!(
            department = department_id,
            pos = program_outcomes.len(),
            cos = course_outcomes.len(),
            "department attainment computed"
        );
        Ok(DepartmentAttainment {
            department_id: department_id.to_string(),
            course_outcomes,
            program_outcomes,
        })
    }

    /// `cache` maps CO id to its result, `None` for a dangling mapping.
    async fn compute_po(
        &self,
        po: &ProgramOutcome,
        cache: &mut BTreeMap<String, Option<CoAttainment>>,
    ) -> Result<PoAttainment, EngineError> {
        let mappings = self.catalog.copo_mappings_for_po(&po.id).await?;

        for mapping in &mappings {
            if cache.contains_key(&mapping.co_id) {
                continue;
            }
            let result = match self.catalog.course_outcome(&mapping.co_id).await? {
                Some(co) => Some(self.compute_co(&co).await?),
                None => None,
            };
            cache.insert(mapping.co_id.clone(), result);
        }

        let co_results: BTreeMap<String, CoAttainment> = mappings
            .iter()
            .filter_map(|m| {
                cache
                    .get(&m.co_id)
                    .and_then(|r| r.clone())
                    .map(|r| (m.co_id.clone(), r))
            })
            .collect();

        let indirect = self
            .catalog
            .indirect_attainment(&OutcomeRef::Po(po.id.clone()))
            .await?;

        let result = compute_po_attainment(po, &mappings, &co_results, &indirect, &self.policy);
        tracing::debug!(
            po = %po.code,
            direct = result.direct_attainment,
            indirect = result.indirect_attainment,
            total = result.total_attainment,
            "PO attainment"
        );
        Ok(result)
    }

    async fn compute_co(&self, co: &CourseOutcome) -> Result<CoAttainment, EngineError> {
        let inputs = self.co_inputs(co).await?;
        let mut result = compute_co_attainment(co, &inputs);

        let indirect = self
            .catalog
            .indirect_attainment(&OutcomeRef::Co(co.id.clone()))
            .await?;
        if !indirect.is_empty() {
            result.indirect_attainment = Some(crate::model::round2(po::indirect_mean(&indirect)));
        }

        tracing::debug!(
            co = %co.code,
            actual = result.actual_attainment,
            students = result.student_count,
            status = ?result.status,
            "CO attainment"
        );
        Ok(result)
    }

    async fn co_inputs(&self, co: &CourseOutcome) -> Result<CoInputs, EngineError> {
        let mut inputs = CoInputs::default();
        for mapping in self.catalog.weights_for_co(&co.id).await? {
            let Some(question) = self.catalog.question(&mapping.question_id).await? else {
                tracing::warn!(
                    co = %co.code,
                    question = %mapping.question_id,
                    "mapped question not found, skipping"
                );
                continue;
            };

            let siblings = self.catalog.weights_for_question(&question.id).await?;
            let weight_pct = resolve_weights(&siblings)
                .into_iter()
                .find(|(co_id, _)| co_id == &co.id)
                .map(|(_, w)| w)
                .unwrap_or(0.0);

            inputs.questions.push(MappedQuestion {
                question_id: question.id.clone(),
                max_marks: question.max_marks,
                weight_pct,
            });
            let marks = self.catalog.marks_for_question(&question.id).await?;
            for mark in &marks {
                self.validator
                    .validate_question_mark(&question, mark.marks_obtained)
                    .map_err(|e| match e {
                        EngineError::Validation(msg) => EngineError::Validation(format!(
                            "{} for {}: {msg}",
                            co.code, mark.student_id
                        )),
                        other => other,
                    })?;
            }
            inputs.marks.extend(marks);
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = AttainmentPolicy::default();
        assert_eq!(policy.direct_weight, 0.8);
        assert!((policy.indirect_weight() - 0.2).abs() < 1e-12);
        policy.validate().unwrap();
    }

    #[test]
    fn policy_rejects_out_of_range_weight() {
        let policy = AttainmentPolicy { direct_weight: 1.5 };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AttainmentStatus::NoData).unwrap(),
            "\"no_data\""
        );
        assert_eq!(
            serde_json::to_string(&AttainmentStatus::NoMappings).unwrap(),
            "\"no_mappings\""
        );
    }
}
