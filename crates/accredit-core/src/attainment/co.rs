//! Course Outcome attainment.
//!
//! A student's CO percentage is `Σ weighted obtained / Σ weighted max` over
//! the CO-mapped questions they have marks on. The population attainment is
//! the share of students at or above the CO's L2 threshold.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attainment::AttainmentStatus;
use crate::model::{round2, CourseOutcome, QuestionCoWeight, QuestionMark};

/// Band a percentage falls into relative to a CO's thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttainmentBand {
    BelowL1,
    L1,
    L2,
    L3,
}

impl fmt::Display for AttainmentBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttainmentBand::BelowL1 => write!(f, "Below L1"),
            AttainmentBand::L1 => write!(f, "L1"),
            AttainmentBand::L2 => write!(f, "L2"),
            AttainmentBand::L3 => write!(f, "L3"),
        }
    }
}

/// Classify `percentage` against `[l1, l2, l3]`. Lower bounds are inclusive.
pub fn classify(co: &CourseOutcome, percentage: f64) -> AttainmentBand {
    if percentage >= co.l3_threshold {
        AttainmentBand::L3
    } else if percentage >= co.l2_threshold {
        AttainmentBand::L2
    } else if percentage >= co.l1_threshold {
        AttainmentBand::L1
    } else {
        AttainmentBand::BelowL1
    }
}

/// A question mapped to the CO, with its resolved weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedQuestion {
    pub question_id: String,
    pub max_marks: f64,
    pub weight_pct: f64,
}

/// Snapshot the CO calculator runs over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoInputs {
    pub questions: Vec<MappedQuestion>,
    pub marks: Vec<QuestionMark>,
}

/// One student's score on a CO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentCoScore {
    pub student_id: String,
    pub weighted_obtained: f64,
    pub weighted_max: f64,
    pub percentage: f64,
    pub band: AttainmentBand,
}

/// Student counts per band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandDistribution {
    pub below_l1: usize,
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
}

impl BandDistribution {
    fn add(&mut self, band: AttainmentBand) {
        match band {
            AttainmentBand::BelowL1 => self.below_l1 += 1,
            AttainmentBand::L1 => self.l1 += 1,
            AttainmentBand::L2 => self.l2 += 1,
            AttainmentBand::L3 => self.l3 += 1,
        }
    }

    /// Students at or above L2.
    pub fn at_or_above_l2(&self) -> usize {
        self.l2 + self.l3
    }
}

/// How one question contributed to the CO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoQuestionDetail {
    pub question_id: String,
    pub weight_pct: f64,
    pub max_marks: f64,
    pub students_marked: usize,
}

/// Attainment of one CO across a student population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoAttainment {
    pub co_id: String,
    pub code: String,
    pub title: String,
    pub subject_assignment_id: String,
    pub target_attainment: f64,
    /// Percentage of students at or above L2. This is what PO roll-up uses.
    pub actual_attainment: f64,
    /// Mean of student percentages, for diagnostics only.
    pub mean_percentage: f64,
    /// Band of the mean student percentage.
    pub band: AttainmentBand,
    pub distribution: BandDistribution,
    pub student_count: usize,
    pub attained: bool,
    pub status: AttainmentStatus,
    /// Mean survey value for this CO, when any was entered.
    #[serde(default)]
    pub indirect_attainment: Option<f64>,
    pub contributing: Vec<CoQuestionDetail>,
    pub students: Vec<StudentCoScore>,
}

/// Resolve each CO's percentage of one question's marks.
///
/// Explicit weights are kept; mappings without a weight share what is left
/// of 100% equally.
pub fn resolve_weights(mappings: &[QuestionCoWeight]) -> Vec<(String, f64)> {
    let explicit: f64 = mappings.iter().filter_map(|m| m.weight_pct).sum();
    let unspecified = mappings.iter().filter(|m| m.weight_pct.is_none()).count();
    let share = if unspecified > 0 {
        (100.0 - explicit).max(0.0) / unspecified as f64
    } else {
        0.0
    };
    mappings
        .iter()
        .map(|m| (m.co_id.clone(), m.weight_pct.unwrap_or(share)))
        .collect()
}

#[derive(Default)]
struct StudentAccumulator {
    weighted_obtained: f64,
    weighted_max: f64,
}

/// Compute attainment for `co` from a snapshot. Never fails: missing
/// mappings or marks yield a zero result with `NoData`.
pub fn compute_co_attainment(co: &CourseOutcome, inputs: &CoInputs) -> CoAttainment {
    let questions: BTreeMap<&str, &MappedQuestion> = inputs
        .questions
        .iter()
        .filter(|q| q.weight_pct > 0.0 && q.max_marks > 0.0)
        .map(|q| (q.question_id.as_str(), q))
        .collect();

    // Last mark wins if a (student, question) pair repeats.
    let mut marks: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for mark in &inputs.marks {
        if questions.contains_key(mark.question_id.as_str()) {
            marks.insert(
                (mark.student_id.as_str(), mark.question_id.as_str()),
                mark.marks_obtained,
            );
        }
    }

    let mut students: BTreeMap<&str, StudentAccumulator> = BTreeMap::new();
    let mut marked_per_question: BTreeMap<&str, usize> = BTreeMap::new();
    for (&(student_id, question_id), &obtained) in &marks {
        let question = questions[question_id];
        let factor = question.weight_pct / 100.0;
        let acc = students.entry(student_id).or_default();
        acc.weighted_obtained += obtained * factor;
        acc.weighted_max += question.max_marks * factor;
        *marked_per_question.entry(question_id).or_default() += 1;
    }

    let contributing: Vec<CoQuestionDetail> = inputs
        .questions
        .iter()
        .map(|q| CoQuestionDetail {
            question_id: q.question_id.clone(),
            weight_pct: q.weight_pct,
            max_marks: q.max_marks,
            students_marked: marked_per_question
                .get(q.question_id.as_str())
                .copied()
                .unwrap_or(0),
        })
        .collect();

    let mut distribution = BandDistribution::default();
    let scores: Vec<StudentCoScore> = students
        .into_iter()
        .filter(|(_, acc)| acc.weighted_max > 0.0)
        .map(|(student_id, acc)| {
            let percentage = acc.weighted_obtained / acc.weighted_max * 100.0;
            let band = classify(co, percentage);
            distribution.add(band);
            StudentCoScore {
                student_id: student_id.to_string(),
                weighted_obtained: round2(acc.weighted_obtained),
                weighted_max: round2(acc.weighted_max),
                percentage: round2(percentage),
                band,
            }
        })
        .collect();

    if scores.is_empty() {
        tracing::debug!(co = %co.code, "no mapped questions or marks");
        return CoAttainment {
            co_id: co.id.clone(),
            code: co.code.clone(),
            title: co.title.clone(),
            subject_assignment_id: co.subject_assignment_id.clone(),
            target_attainment: co.target_attainment,
            actual_attainment: 0.0,
            mean_percentage: 0.0,
            band: AttainmentBand::BelowL1,
            distribution,
            student_count: 0,
            attained: false,
            status: AttainmentStatus::NoData,
            indirect_attainment: None,
            contributing,
            students: Vec::new(),
        };
    }

    let n = scores.len() as f64;
    let actual = round2(distribution.at_or_above_l2() as f64 / n * 100.0);
    let mean = round2(scores.iter().map(|s| s.percentage).sum::<f64>() / n);

    CoAttainment {
        co_id: co.id.clone(),
        code: co.code.clone(),
        title: co.title.clone(),
        subject_assignment_id: co.subject_assignment_id.clone(),
        target_attainment: co.target_attainment,
        actual_attainment: actual,
        mean_percentage: mean,
        band: classify(co, mean),
        distribution,
        student_count: scores.len(),
        attained: actual >= co.target_attainment,
        status: AttainmentStatus::Ok,
        indirect_attainment: None,
        contributing,
        students: scores,
    }
}
