//! The `accredit validate` command.

use std::path::PathBuf;

use anyhow::Result;

use accredit_core::parser;

pub fn execute(dataset_path: PathBuf) -> Result<()> {
    let datasets = if dataset_path.is_dir() {
        parser::load_dataset_directory(&dataset_path)?
    } else {
        vec![parser::parse_dataset(&dataset_path)?]
    };

    let mut total_warnings = 0;

    for dataset in &datasets {
        println!(
            "Dataset: {} ({} subjects, {} course outcomes, {} students)",
            dataset.name,
            dataset.subjects.len(),
            dataset.course_outcomes.len(),
            dataset.students().len()
        );

        let warnings = parser::validate_dataset(dataset);
        for w in &warnings {
            let prefix = w
                .item
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All datasets valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
