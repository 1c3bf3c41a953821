//! The `accredit results` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use accredit_core::gpa::GpaStatus;
use accredit_core::model::{FinalMarkRecord, PassStatus};
use accredit_core::parser;
use accredit_core::results::ResultsService;
use accredit_core::traits::SystemClock;
use accredit_core::workflow::{Actor, Role};
use accredit_store::{load_config_from, MemoryStore};

/// Identity used for publishing from the command line.
const CLI_ACTOR: &str = "accredit-cli";

pub async fn execute(
    dataset_path: PathBuf,
    student: Option<String>,
    publish: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let dataset = parser::parse_dataset(&dataset_path)?;
    let store = Arc::new(MemoryStore::from_dataset_with(
        &dataset,
        chrono::Utc::now(),
        &config.mark_validator(),
    )?);
    let service = ResultsService::new(
        store.clone(),
        store,
        Arc::new(SystemClock),
        config.grading,
    );

    let mut records = Vec::new();
    for subject in &dataset.subjects {
        records.extend(service.refresh_subject(&subject.id).await?);
    }
    if let Some(id) = &student {
        records.retain(|r| &r.student_id == id);
        anyhow::ensure!(!records.is_empty(), "no results for student '{id}'");
    }

    if publish {
        let actor = Actor::new(CLI_ACTOR, Role::ExamCell);
        for record in &mut records {
            *record = service
                .publish_final_mark(
                    &actor,
                    &record.student_id,
                    &record.subject_assignment_id,
                    record.semester,
                )
                .await?;
        }
    }

    records.sort_by(|a, b| {
        (&a.student_id, a.semester, &a.subject_assignment_id).cmp(&(
            &b.student_id,
            b.semester,
            &b.subject_assignment_id,
        ))
    });
    println!("{}", final_mark_table(&records));

    let passed = records.iter().filter(|r| r.result == PassStatus::Pass).count();
    println!("\n{passed}/{} passed", records.len());

    if !publish {
        println!("Final marks are drafts; rerun with --publish for SGPA/CGPA.");
        return Ok(());
    }

    let mut students: Vec<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
    students.dedup();

    let mut table = Table::new();
    table.set_header(vec!["Student", "Semester", "SGPA", "Credits", "CGPA"]);
    for id in students {
        let cgpa = service.cgpa(id).await?;
        let cgpa_cell = match cgpa.status {
            GpaStatus::Ok => format!("{:.2}", cgpa.cgpa),
            GpaStatus::InsufficientData => "-".to_string(),
        };
        for sgpa in &cgpa.semesters {
            table.add_row(vec![
                Cell::new(id),
                Cell::new(sgpa.semester),
                Cell::new(format!("{:.2}", sgpa.sgpa)),
                Cell::new(sgpa.total_credits),
                Cell::new(&cgpa_cell),
            ]);
        }
    }
    println!("\n{table}");

    Ok(())
}

fn final_mark_table(records: &[FinalMarkRecord]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Student", "Subject", "IA1", "IA2", "Internal", "External", "Total", "Grade", "Result",
    ]);
    for r in records {
        table.add_row(vec![
            Cell::new(&r.student_id),
            Cell::new(&r.subject_assignment_id),
            Cell::new(optional(r.internal1)),
            Cell::new(optional(r.internal2)),
            Cell::new(format!("{:.2}", r.best_internal)),
            Cell::new(format!("{:.2}", r.external)),
            Cell::new(format!("{:.2}", r.total)),
            Cell::new(format!("{} ({})", r.grade, r.grade_point)),
            Cell::new(match r.result {
                PassStatus::Pass => "PASS",
                PassStatus::Fail => "FAIL",
            }),
        ]);
    }
    table
}

fn optional(mark: Option<f64>) -> String {
    mark.map(|m| format!("{m:.2}"))
        .unwrap_or_else(|| "-".to_string())
}
