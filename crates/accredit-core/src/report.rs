//! Attainment report types with JSON persistence and drift detection.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attainment::{CoAttainment, PoAttainment};
use crate::model::Dataset;

/// A complete attainment report for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttainmentReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the dataset the report was computed from.
    pub dataset: DatasetSummary,
    /// Direct share of the PO blend used for this run.
    pub direct_weight: f64,
    pub course_outcomes: Vec<CoAttainment>,
    pub program_outcomes: Vec<PoAttainment>,
}

/// Summary of a dataset (without the marks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub academic_year: String,
    pub subject_count: usize,
    pub student_count: usize,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset) -> Self {
        Self {
            id: dataset.id.clone(),
            name: dataset.name.clone(),
            academic_year: dataset.academic_year.clone(),
            subject_count: dataset.subjects.len(),
            student_count: dataset.students().len(),
        }
    }
}

impl AttainmentReport {
    pub fn new(
        dataset: &Dataset,
        course_outcomes: Vec<CoAttainment>,
        program_outcomes: Vec<PoAttainment>,
        direct_weight: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at,
            dataset: DatasetSummary::of(dataset),
            direct_weight,
            course_outcomes,
            program_outcomes,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AttainmentReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Attainment per outcome key: `subject/CO` for COs, the code for POs.
    fn attainment_map(&self) -> BTreeMap<(OutcomeLevel, String), f64> {
        let cos = self.course_outcomes.iter().map(|c| {
            (
                (
                    OutcomeLevel::Co,
                    format!("{}/{}", c.subject_assignment_id, c.code),
                ),
                c.actual_attainment,
            )
        });
        let pos = self
            .program_outcomes
            .iter()
            .map(|p| ((OutcomeLevel::Po, p.code.clone()), p.total_attainment));
        cos.chain(pos).collect()
    }

    /// Compare this report against a baseline (e.g. last academic year).
    ///
    /// `threshold` is in percentage points.
    pub fn compare(&self, baseline: &AttainmentReport, threshold: f64) -> AttainmentComparison {
        let baseline_map = baseline.attainment_map();
        let current_map = self.attainment_map();

        let mut regressions = Vec::new();
        let mut improvements = Vec::new();
        let mut unchanged = 0usize;
        let mut new_outcomes = 0usize;

        for (key, &current) in &current_map {
            let Some(&baseline_val) = baseline_map.get(key) else {
                new_outcomes += 1;
                continue;
            };
            let delta = current - baseline_val;
            let change = AttainmentChange {
                level: key.0,
                outcome: key.1.clone(),
                baseline: baseline_val,
                current,
                delta,
            };
            if delta < -threshold {
                regressions.push(change);
            } else if delta > threshold {
                improvements.push(change);
            } else {
                unchanged += 1;
            }
        }

        let removed_outcomes = baseline_map
            .keys()
            .filter(|k| !current_map.contains_key(k))
            .count();

        AttainmentComparison {
            regressions,
            improvements,
            unchanged,
            new_outcomes,
            removed_outcomes,
        }
    }

    /// Format the report as markdown tables.
    pub fn to_markdown(&self) -> String {
        let mut md = format!(
            "## Attainment: {} ({})\n\n",
            self.dataset.name, self.dataset.academic_year
        );

        if !self.course_outcomes.is_empty() {
            md.push_str("### Course outcomes\n\n");
            md.push_str("| Subject | CO | Students | Attainment | Target | Band | Attained | Status |\n");
            md.push_str("|---------|----|----------|------------|--------|------|----------|--------|\n");
            for co in &self.course_outcomes {
                md.push_str(&format!(
                    "| {} | {} | {} | {:.2}% | {:.2}% | {} | {} | {:?} |\n",
                    co.subject_assignment_id,
                    co.code,
                    co.student_count,
                    co.actual_attainment,
                    co.target_attainment,
                    co.band,
                    yes_no(co.attained),
                    co.status
                ));
            }
            md.push('\n');
        }

        if !self.program_outcomes.is_empty() {
            md.push_str("### Program outcomes\n\n");
            md.push_str("| PO | Direct | Indirect | Total | Target | Attained | Status |\n");
            md.push_str("|----|--------|----------|-------|--------|----------|--------|\n");
            for po in &self.program_outcomes {
                md.push_str(&format!(
                    "| {} | {:.2}% | {:.2}% | {:.2}% | {:.2}% | {} | {:?} |\n",
                    po.code,
                    po.direct_attainment,
                    po.indirect_attainment,
                    po.total_attainment,
                    po.target_attainment,
                    yes_no(po.attained),
                    po.status
                ));
            }
        }

        md
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Whether a compared outcome is a CO or a PO/PSO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeLevel {
    Co,
    Po,
}

/// Result of comparing two reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttainmentComparison {
    /// Outcomes whose attainment went down.
    pub regressions: Vec<AttainmentChange>,
    /// Outcomes whose attainment went up.
    pub improvements: Vec<AttainmentChange>,
    /// Outcomes with no significant change.
    pub unchanged: usize,
    /// Outcomes in current but not baseline.
    pub new_outcomes: usize,
    /// Outcomes in baseline but not current.
    pub removed_outcomes: usize,
}

/// A significant change in one outcome's attainment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttainmentChange {
    pub level: OutcomeLevel,
    pub outcome: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

impl AttainmentComparison {
    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged, {} new, {} removed\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.unchanged,
            self.new_outcomes,
            self.removed_outcomes
        ));

        if !self.regressions.is_empty() {
            md.push_str("### Regressions\n\n");
            md.push_str("| Outcome | Baseline | Current | Delta |\n");
            md.push_str("|---------|----------|---------|-------|\n");
            for r in &self.regressions {
                md.push_str(&format!(
                    "| {} | {:.2}% | {:.2}% | {:.2} |\n",
                    r.outcome, r.baseline, r.current, r.delta
                ));
            }
            md.push('\n');
        }

        if !self.improvements.is_empty() {
            md.push_str("### Improvements\n\n");
            md.push_str("| Outcome | Baseline | Current | Delta |\n");
            md.push_str("|---------|----------|---------|-------|\n");
            for i in &self.improvements {
                md.push_str(&format!(
                    "| {} | {:.2}% | {:.2}% | +{:.2} |\n",
                    i.outcome, i.baseline, i.current, i.delta
                ));
            }
        }

        md
    }

    /// Returns true if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}
