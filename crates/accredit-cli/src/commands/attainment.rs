//! The `accredit attainment` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use accredit_core::attainment::{AttainmentService, AttainmentStatus, CoAttainment, PoAttainment};
use accredit_core::parser;
use accredit_core::report::AttainmentReport;
use accredit_store::{load_config_from, MemoryStore};

pub async fn execute(
    dataset_path: PathBuf,
    subject: Option<String>,
    department: Option<String>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let dataset = parser::parse_dataset(&dataset_path)?;
    let now = chrono::Utc::now();
    let validator = config.mark_validator();
    let store = Arc::new(MemoryStore::from_dataset_with(&dataset, now, &validator)?);
    let service = AttainmentService::new(store, config.attainment).with_validator(validator);

    if let Some(id) = &subject {
        anyhow::ensure!(
            dataset.subjects.iter().any(|s| &s.id == id),
            "subject assignment '{id}' not in dataset {}",
            dataset.id
        );
    }
    if let Some(dept) = &department {
        anyhow::ensure!(
            dataset.departments().contains(dept),
            "department '{dept}' not in dataset {}",
            dataset.id
        );
    }

    let mut course_outcomes = Vec::new();
    for s in dataset.subjects.iter().filter(|s| {
        subject.as_ref().is_none_or(|id| &s.id == id)
            && department.as_ref().is_none_or(|d| &s.department_id == d)
    }) {
        course_outcomes.extend(service.subject_attainment(&s.id).await?);
    }

    // A subject filter narrows the run to COs only.
    let mut program_outcomes = Vec::new();
    if subject.is_none() {
        for dept in dataset.departments() {
            if department.as_ref().is_some_and(|d| d != &dept) {
                continue;
            }
            program_outcomes.extend(service.department_attainment(&dept).await?.program_outcomes);
        }
    }

    let report = AttainmentReport::new(
        &dataset,
        course_outcomes,
        program_outcomes,
        service.policy().direct_weight,
        now,
    );

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" | "md" => println!("{}", report.to_markdown()),
        _ => print_tables(&report),
    }

    if let Some(dir) = output {
        let timestamp = now.format("%Y-%m-%dT%H%M%S");
        let path = dir.join(format!("attainment-{}-{timestamp}.json", dataset.id));
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn print_tables(report: &AttainmentReport) {
    println!(
        "{} ({}), direct weight {:.0}%",
        report.dataset.name,
        report.dataset.academic_year,
        report.direct_weight * 100.0
    );

    if !report.course_outcomes.is_empty() {
        println!("\n{}", co_table(&report.course_outcomes));
    }
    if !report.program_outcomes.is_empty() {
        println!("\n{}", po_table(&report.program_outcomes));
    }
}

fn co_table(cos: &[CoAttainment]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Subject",
        "CO",
        "Students",
        "Attainment",
        "Mean",
        "Target",
        "Band",
        "Attained",
    ]);
    for co in cos {
        table.add_row(vec![
            Cell::new(&co.subject_assignment_id),
            Cell::new(&co.code),
            Cell::new(co.student_count),
            Cell::new(percent_or_status(co.actual_attainment, co.status)),
            Cell::new(format!("{:.2}%", co.mean_percentage)),
            Cell::new(format!("{:.2}%", co.target_attainment)),
            Cell::new(co.band),
            Cell::new(if co.attained { "yes" } else { "no" }),
        ]);
    }
    table
}

fn po_table(pos: &[PoAttainment]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "PO", "Direct", "Indirect", "Total", "Target", "Attained",
    ]);
    for po in pos {
        table.add_row(vec![
            Cell::new(&po.code),
            Cell::new(format!("{:.2}%", po.direct_attainment)),
            Cell::new(format!(
                "{:.2}% (n={})",
                po.indirect_attainment, po.indirect_responses
            )),
            Cell::new(percent_or_status(po.total_attainment, po.status)),
            Cell::new(format!("{:.2}%", po.target_attainment)),
            Cell::new(if po.attained { "yes" } else { "no" }),
        ]);
    }
    table
}

fn percent_or_status(value: f64, status: AttainmentStatus) -> String {
    match status {
        AttainmentStatus::Ok => format!("{value:.2}%"),
        AttainmentStatus::NoData => "no data".to_string(),
        AttainmentStatus::NoMappings => "no mappings".to_string(),
    }
}
