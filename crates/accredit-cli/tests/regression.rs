//! Attainment drift detection, end to end.
//!
//! Computes attainment reports from the sample dataset through the store and
//! services, then compares them the way `accredit compare` does.

use std::path::Path;
use std::sync::Arc;

use accredit_core::attainment::{AttainmentPolicy, AttainmentService};
use accredit_core::model::Dataset;
use accredit_core::parser::parse_dataset;
use accredit_core::report::{AttainmentReport, OutcomeLevel};
use accredit_store::MemoryStore;

const SAMPLE: &str = "../../datasets/cse-2025.toml";

async fn report_for(dataset: &Dataset) -> AttainmentReport {
    let now = chrono::Utc::now();
    let store = Arc::new(MemoryStore::from_dataset(dataset, now).unwrap());
    let service = AttainmentService::new(store, AttainmentPolicy::default());

    let mut cos = Vec::new();
    for subject in &dataset.subjects {
        cos.extend(service.subject_attainment(&subject.id).await.unwrap());
    }
    let mut pos = Vec::new();
    for dept in dataset.departments() {
        pos.extend(service.department_attainment(&dept).await.unwrap().program_outcomes);
    }
    AttainmentReport::new(dataset, cos, pos, 0.8, now)
}

/// The sample dataset with one strong student's CS301 answers zeroed.
fn weaker_cohort() -> Dataset {
    let mut dataset = parse_dataset(Path::new(SAMPLE)).unwrap();
    for mark in dataset
        .question_marks
        .iter_mut()
        .filter(|m| m.student_id == "s003" && m.question_id.starts_with("q-cs301"))
    {
        mark.marks_obtained = 0.0;
    }
    dataset
}

#[tokio::test]
async fn sample_dataset_baseline() {
    let dataset = parse_dataset(Path::new(SAMPLE)).unwrap();
    let report = report_for(&dataset).await;

    assert_eq!(report.dataset.subject_count, 2);
    assert_eq!(report.dataset.student_count, 4);
    assert_eq!(report.course_outcomes.len(), 3);
    assert_eq!(report.program_outcomes.len(), 3);

    let co1 = &report.course_outcomes[0];
    assert_eq!(co1.subject_assignment_id, "sa-cs301");
    assert_eq!(co1.code, "CO1");
    assert_eq!(co1.actual_attainment, 50.0);
    assert_eq!(co1.indirect_attainment, Some(75.0));

    let po1 = &report.program_outcomes[0];
    assert_eq!(po1.code, "PO1");
    assert_eq!(po1.direct_attainment, 50.0);
    assert_eq!(po1.indirect_attainment, 75.0);
    assert!((po1.total_attainment - 55.0).abs() < 1e-9);
}

#[tokio::test]
async fn identical_runs_have_no_drift() {
    let dataset = parse_dataset(Path::new(SAMPLE)).unwrap();
    let baseline = report_for(&dataset).await;
    let current = report_for(&dataset).await;

    let cmp = current.compare(&baseline, 0.0);
    assert!(!cmp.has_regressions());
    assert!(cmp.improvements.is_empty());
    assert_eq!(cmp.unchanged, 6);
    assert_eq!(cmp.new_outcomes, 0);
    assert_eq!(cmp.removed_outcomes, 0);
}

#[tokio::test]
async fn weaker_cohort_regresses() {
    let baseline = report_for(&parse_dataset(Path::new(SAMPLE)).unwrap()).await;
    let current = report_for(&weaker_cohort()).await;

    let cmp = current.compare(&baseline, 5.0);
    assert!(cmp.has_regressions());

    let regressed: Vec<(OutcomeLevel, &str)> = cmp
        .regressions
        .iter()
        .map(|r| (r.level, r.outcome.as_str()))
        .collect();
    assert!(regressed.contains(&(OutcomeLevel::Co, "sa-cs301/CO1")));
    assert!(regressed.contains(&(OutcomeLevel::Co, "sa-cs301/CO2")));
    assert!(regressed.contains(&(OutcomeLevel::Po, "PO1")));
    assert!(!regressed.iter().any(|(_, o)| *o == "sa-cs302/CO1"));

    let co1 = cmp
        .regressions
        .iter()
        .find(|r| r.outcome == "sa-cs301/CO1")
        .unwrap();
    assert_eq!(co1.baseline, 50.0);
    assert_eq!(co1.current, 25.0);

    let po1 = cmp.regressions.iter().find(|r| r.outcome == "PO1").unwrap();
    assert!((po1.delta + 20.0).abs() < 0.01);
}

#[tokio::test]
async fn reverse_comparison_is_an_improvement() {
    let baseline = report_for(&weaker_cohort()).await;
    let current = report_for(&parse_dataset(Path::new(SAMPLE)).unwrap()).await;

    let cmp = current.compare(&baseline, 5.0);
    assert!(!cmp.has_regressions());
    assert!(cmp.improvements.iter().any(|i| i.outcome == "sa-cs301/CO1"));
}

#[tokio::test]
async fn threshold_controls_sensitivity() {
    let baseline = report_for(&parse_dataset(Path::new(SAMPLE)).unwrap()).await;
    let current = report_for(&weaker_cohort()).await;

    let cmp = current.compare(&baseline, 30.0);
    assert!(!cmp.has_regressions());
    assert_eq!(cmp.unchanged, 6);
}

#[tokio::test]
async fn json_roundtrip_preserves_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("baseline.json");

    let report = report_for(&parse_dataset(Path::new(SAMPLE)).unwrap()).await;
    report.save_json(&path).unwrap();
    let loaded = AttainmentReport::load_json(&path).unwrap();

    assert_eq!(loaded.id, report.id);
    assert_eq!(loaded.course_outcomes, report.course_outcomes);
    assert_eq!(loaded.program_outcomes, report.program_outcomes);
    assert!(!report.compare(&loaded, 0.0).has_regressions());
}

#[tokio::test]
async fn markdown_lists_regressions() {
    let baseline = report_for(&parse_dataset(Path::new(SAMPLE)).unwrap()).await;
    let current = report_for(&weaker_cohort()).await;

    let md = current.compare(&baseline, 5.0).to_markdown();
    assert!(md.contains("### Regressions"));
    assert!(md.contains("sa-cs301/CO1"));

    let md = current.to_markdown();
    assert!(md.contains("### Course outcomes"));
    assert!(md.contains("PSO1"));
}
