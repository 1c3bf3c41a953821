//! The `accredit scale` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use accredit_store::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let grading = &config.grading;

    println!("Internal method: {}", grading.internal_method);
    println!("Pass mark: {:.2}%", grading.pass_percentage);
    println!(
        "Edit window: {} days, batch size {}",
        config.workflow.edit_window_days, config.workflow.batch_size
    );
    println!(
        "PO blend: {:.0}% direct / {:.0}% indirect",
        config.attainment.direct_weight * 100.0,
        config.attainment.indirect_weight() * 100.0
    );

    let mut bands = grading.scale.clone();
    bands.sort_by(|a, b| b.min.total_cmp(&a.min));

    let mut table = Table::new();
    table.set_header(vec!["Grade", "Min %", "Max %", "Grade point"]);
    for band in &bands {
        table.add_row(vec![
            Cell::new(&band.grade),
            Cell::new(format!("{:.2}", band.min)),
            Cell::new(format!("{:.2}", band.max)),
            Cell::new(band.grade_point),
        ]);
    }
    println!("\n{table}");

    Ok(())
}
