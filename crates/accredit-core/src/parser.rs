//! TOML dataset parser.
//!
//! Loads catalog snapshots plus marks from TOML files and directories, and
//! validates them.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::attainment::po::STRENGTH_RANGE;
use crate::model::{
    BloomLevel, CoPoMapping, CourseOutcome, Dataset, ExamMark, ImportedInternalMark,
    IndirectAttainmentEntry, OutcomeKind, OutcomeRef, ProgramOutcome, Question, QuestionCoWeight,
    QuestionMark, SubjectAssignment,
};
use crate::workflow::WorkflowState;

/// Intermediate TOML structure for parsing dataset files.
#[derive(Debug, Deserialize)]
struct TomlDatasetFile {
    dataset: TomlDatasetHeader,
    #[serde(default)]
    subjects: Vec<SubjectAssignment>,
    #[serde(default)]
    course_outcomes: Vec<TomlCourseOutcome>,
    #[serde(default)]
    program_outcomes: Vec<TomlProgramOutcome>,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
    #[serde(default)]
    question_co_weights: Vec<TomlQuestionCoWeight>,
    #[serde(default)]
    copo_mappings: Vec<TomlCoPoMapping>,
    #[serde(default)]
    indirect_attainment: Vec<TomlIndirect>,
    #[serde(default)]
    question_marks: Vec<TomlQuestionMark>,
    #[serde(default)]
    internal_marks: Vec<TomlInternalMark>,
    #[serde(default)]
    exam_marks: Vec<TomlExamMark>,
}

#[derive(Debug, Deserialize)]
struct TomlDatasetHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    academic_year: String,
}

#[derive(Debug, Deserialize)]
struct TomlCourseOutcome {
    id: String,
    subject: String,
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_target")]
    target: f64,
    #[serde(default = "default_l1")]
    l1: f64,
    #[serde(default = "default_l2")]
    l2: f64,
    #[serde(default = "default_l3")]
    l3: f64,
}

fn default_target() -> f64 {
    60.0
}
fn default_l1() -> f64 {
    40.0
}
fn default_l2() -> f64 {
    60.0
}
fn default_l3() -> f64 {
    75.0
}

#[derive(Debug, Deserialize)]
struct TomlProgramOutcome {
    id: String,
    department: String,
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_target")]
    target: f64,
    #[serde(default)]
    kind: Option<OutcomeKind>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    subject: String,
    exam: String,
    #[serde(default)]
    label: Option<String>,
    max_marks: f64,
    #[serde(default)]
    bloom: Option<BloomLevel>,
    #[serde(default)]
    difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestionCoWeight {
    question: String,
    co: String,
    #[serde(default)]
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlCoPoMapping {
    co: String,
    po: String,
    strength: u8,
}

#[derive(Debug, Deserialize)]
struct TomlIndirect {
    #[serde(default)]
    co: Option<String>,
    #[serde(default)]
    po: Option<String>,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TomlQuestionMark {
    student: String,
    question: String,
    marks: f64,
}

#[derive(Debug, Deserialize)]
struct TomlInternalMark {
    student: String,
    subject: String,
    component: String,
    marks: f64,
    max_marks: f64,
    #[serde(default = "default_state")]
    state: String,
    #[serde(default)]
    entered_by: Option<String>,
}

fn default_state() -> String {
    "FROZEN".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlExamMark {
    student: String,
    subject: String,
    #[serde(default = "default_exam")]
    exam: String,
    marks: f64,
    max_marks: f64,
}

fn default_exam() -> String {
    "external".to_string()
}

/// Parse a single TOML file into a `Dataset`.
pub fn parse_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file: {}", path.display()))?;

    parse_dataset_str(&content, path)
}

/// Parse a TOML string into a `Dataset` (useful for testing).
pub fn parse_dataset_str(content: &str, source_path: &Path) -> Result<Dataset> {
    let parsed: TomlDatasetFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let course_outcomes = parsed
        .course_outcomes
        .into_iter()
        .map(|c| CourseOutcome {
            id: c.id,
            subject_assignment_id: c.subject,
            code: c.code,
            title: c.title,
            target_attainment: c.target,
            l1_threshold: c.l1,
            l2_threshold: c.l2,
            l3_threshold: c.l3,
        })
        .collect();

    let program_outcomes = parsed
        .program_outcomes
        .into_iter()
        .map(|p| ProgramOutcome {
            id: p.id,
            department_id: p.department,
            code: p.code,
            title: p.title,
            target_attainment: p.target,
            kind: p.kind.unwrap_or(OutcomeKind::Po),
        })
        .collect();

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            let exam_type = q
                .exam
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;
            Ok(Question {
                label: q.label.unwrap_or_else(|| q.id.clone()),
                id: q.id,
                subject_assignment_id: q.subject,
                exam_type,
                max_marks: q.max_marks,
                bloom_level: q.bloom,
                difficulty: q.difficulty,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let question_co_weights = parsed
        .question_co_weights
        .into_iter()
        .map(|w| QuestionCoWeight {
            question_id: w.question,
            co_id: w.co,
            weight_pct: w.weight,
        })
        .collect();

    let copo_mappings = parsed
        .copo_mappings
        .into_iter()
        .map(|m| CoPoMapping {
            co_id: m.co,
            po_id: m.po,
            strength: m.strength,
        })
        .collect();

    let indirect_attainment = parsed
        .indirect_attainment
        .into_iter()
        .map(|i| {
            let target = match (i.co, i.po) {
                (Some(co), None) => OutcomeRef::Co(co),
                (None, Some(po)) => OutcomeRef::Po(po),
                _ => anyhow::bail!("indirect attainment entry needs exactly one of `co` or `po`"),
            };
            Ok(IndirectAttainmentEntry {
                target,
                value_pct: i.value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let question_marks = parsed
        .question_marks
        .into_iter()
        .map(|m| QuestionMark {
            student_id: m.student,
            question_id: m.question,
            marks_obtained: m.marks,
        })
        .collect();

    let internal_marks = parsed
        .internal_marks
        .into_iter()
        .map(|m| {
            let component = m
                .component
                .parse()
                .map_err(|e: String| anyhow::anyhow!("student {}: {}", m.student, e))?;
            let state: WorkflowState = m
                .state
                .parse()
                .map_err(|e: String| anyhow::anyhow!("student {}: {}", m.student, e))?;
            Ok(ImportedInternalMark {
                student_id: m.student,
                subject_assignment_id: m.subject,
                component,
                marks_obtained: m.marks,
                max_marks: m.max_marks,
                state,
                entered_by: m.entered_by,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let exam_marks = parsed
        .exam_marks
        .into_iter()
        .map(|m| {
            let exam_type = m
                .exam
                .parse()
                .map_err(|e: String| anyhow::anyhow!("student {}: {}", m.student, e))?;
            Ok(ExamMark {
                student_id: m.student,
                subject_assignment_id: m.subject,
                exam_type,
                marks_obtained: m.marks,
                max_marks: m.max_marks,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Dataset {
        id: parsed.dataset.id,
        name: parsed.dataset.name,
        description: parsed.dataset.description,
        academic_year: parsed.dataset.academic_year,
        subjects: parsed.subjects,
        course_outcomes,
        program_outcomes,
        questions,
        question_co_weights,
        copo_mappings,
        indirect_attainment,
        question_marks,
        internal_marks,
        exam_marks,
    })
}

/// Recursively load all `.toml` dataset files from a directory.
pub fn load_dataset_directory(dir: &Path) -> Result<Vec<Dataset>> {
    let mut datasets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            datasets.extend(load_dataset_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_dataset(&path) {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    datasets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(datasets)
}

/// A warning from dataset validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The offending item's id (if applicable).
    pub item: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn new(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: Some(item.into()),
            message: message.into(),
        }
    }
}

fn duplicates<'a>(ids: impl Iterator<Item = &'a str>, what: &str) -> Vec<ValidationWarning> {
    let mut seen = HashSet::new();
    ids.filter(|id| !seen.insert(*id))
        .map(|id| ValidationWarning::new(id, format!("duplicate {what} id: {id}")))
        .collect()
}

/// Validate a dataset for common issues.
pub fn validate_dataset(dataset: &Dataset) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    warnings.extend(duplicates(
        dataset.subjects.iter().map(|s| s.id.as_str()),
        "subject",
    ));
    warnings.extend(duplicates(
        dataset.course_outcomes.iter().map(|c| c.id.as_str()),
        "course outcome",
    ));
    warnings.extend(duplicates(
        dataset.program_outcomes.iter().map(|p| p.id.as_str()),
        "program outcome",
    ));
    warnings.extend(duplicates(
        dataset.questions.iter().map(|q| q.id.as_str()),
        "question",
    ));

    let subjects: HashSet<&str> = dataset.subjects.iter().map(|s| s.id.as_str()).collect();
    let cos: HashSet<&str> = dataset.course_outcomes.iter().map(|c| c.id.as_str()).collect();
    let pos: HashSet<&str> = dataset.program_outcomes.iter().map(|p| p.id.as_str()).collect();
    let questions: HashMap<&str, &Question> = dataset
        .questions
        .iter()
        .map(|q| (q.id.as_str(), q))
        .collect();

    for co in &dataset.course_outcomes {
        if !(co.l1_threshold < co.l2_threshold && co.l2_threshold < co.l3_threshold) {
            warnings.push(ValidationWarning::new(
                &co.id,
                format!(
                    "thresholds must ascend: l1={} l2={} l3={}",
                    co.l1_threshold, co.l2_threshold, co.l3_threshold
                ),
            ));
        }
        if !subjects.contains(co.subject_assignment_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &co.id,
                format!("unknown subject: {}", co.subject_assignment_id),
            ));
        }
        if !dataset.question_co_weights.iter().any(|w| w.co_id == co.id) {
            warnings.push(ValidationWarning::new(
                &co.id,
                "no questions mapped; attainment will be no_data",
            ));
        }
    }

    for question in &dataset.questions {
        if !subjects.contains(question.subject_assignment_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &question.id,
                format!("unknown subject: {}", question.subject_assignment_id),
            ));
        }
        if question.max_marks <= 0.0 {
            warnings.push(ValidationWarning::new(&question.id, "max_marks must be positive"));
        }
    }

    let mut explicit_sums: HashMap<&str, f64> = HashMap::new();
    for weight in &dataset.question_co_weights {
        if !questions.contains_key(weight.question_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &weight.question_id,
                "weight references unknown question",
            ));
        }
        if !cos.contains(weight.co_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &weight.question_id,
                format!("weight references unknown course outcome: {}", weight.co_id),
            ));
        }
        if let Some(pct) = weight.weight_pct {
            *explicit_sums.entry(weight.question_id.as_str()).or_default() += pct;
        }
    }
    let mut over: Vec<(&str, f64)> = explicit_sums
        .into_iter()
        .filter(|(_, sum)| *sum > 100.0)
        .collect();
    over.sort_by(|a, b| a.0.cmp(b.0));
    for (question_id, sum) in over {
        warnings.push(ValidationWarning::new(
            question_id,
            format!("CO weights sum to {sum}%, above 100%"),
        ));
    }

    for mapping in &dataset.copo_mappings {
        if !STRENGTH_RANGE.contains(&mapping.strength) {
            warnings.push(ValidationWarning::new(
                format!("{}->{}", mapping.co_id, mapping.po_id),
                format!("strength {} outside 1..=3; mapping will be ignored", mapping.strength),
            ));
        }
        if !cos.contains(mapping.co_id.as_str()) || !pos.contains(mapping.po_id.as_str()) {
            warnings.push(ValidationWarning::new(
                format!("{}->{}", mapping.co_id, mapping.po_id),
                "mapping references an unknown outcome",
            ));
        }
    }

    for entry in &dataset.indirect_attainment {
        let (known, id) = match &entry.target {
            OutcomeRef::Co(id) => (cos.contains(id.as_str()), id),
            OutcomeRef::Po(id) => (pos.contains(id.as_str()), id),
        };
        if !known {
            warnings.push(ValidationWarning::new(id, "indirect entry for unknown outcome"));
        }
        if !(0.0..=100.0).contains(&entry.value_pct) {
            warnings.push(ValidationWarning::new(
                id,
                format!("indirect value {} outside 0..=100", entry.value_pct),
            ));
        }
    }

    for mark in &dataset.question_marks {
        match questions.get(mark.question_id.as_str()) {
            None => warnings.push(ValidationWarning::new(
                &mark.student_id,
                format!("mark for unknown question: {}", mark.question_id),
            )),
            Some(q) if mark.marks_obtained < 0.0 || mark.marks_obtained > q.max_marks => {
                warnings.push(ValidationWarning::new(
                    &mark.student_id,
                    format!(
                        "question {}: marks {} outside 0..={}",
                        q.id, mark.marks_obtained, q.max_marks
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    for mark in &dataset.internal_marks {
        if !subjects.contains(mark.subject_assignment_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &mark.student_id,
                format!("internal mark for unknown subject: {}", mark.subject_assignment_id),
            ));
        }
        if mark.marks_obtained < 0.0 || mark.marks_obtained > mark.max_marks {
            warnings.push(ValidationWarning::new(
                &mark.student_id,
                format!(
                    "{} marks {} outside 0..={}",
                    mark.component, mark.marks_obtained, mark.max_marks
                ),
            ));
        }
    }

    for mark in &dataset.exam_marks {
        if !subjects.contains(mark.subject_assignment_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &mark.student_id,
                format!("exam mark for unknown subject: {}", mark.subject_assignment_id),
            ));
        }
    }

    warnings
}
