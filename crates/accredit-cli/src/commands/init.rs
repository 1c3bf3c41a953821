//! The `accredit init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("accredit.toml").exists() {
        println!("accredit.toml already exists, skipping.");
    } else {
        std::fs::write("accredit.toml", SAMPLE_CONFIG)?;
        println!("Created accredit.toml");
    }

    std::fs::create_dir_all("datasets")?;
    let example_path = std::path::Path::new("datasets/example.toml");
    if example_path.exists() {
        println!("datasets/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_DATASET)?;
        println!("Created datasets/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit accredit.toml to match your institution's regulations");
    println!("  2. Run: accredit validate --dataset datasets/example.toml");
    println!("  3. Run: accredit attainment --dataset datasets/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# accredit configuration

[workflow]
edit_window_days = 7
batch_size = 500
batch_parallelism = 4

[grading]
# best | average | weighted
internal_method = "best"
pass_percentage = 40.0

[attainment]
# Share of CO-derived attainment in PO totals; the rest comes from surveys.
direct_weight = 0.8
"#;

const EXAMPLE_DATASET: &str = r#"[dataset]
id = "example"
name = "Example dataset"
description = "One subject, one CO, one PO"
academic_year = "2025-26"

[[subjects]]
id = "sa-example"
subject_code = "EX101"
subject_name = "Example Subject"
department_id = "dept"
faculty_id = "fac1"
semester = 1
credits = 3.0
max_internal = 40.0
max_external = 60.0

[[course_outcomes]]
id = "co1"
subject = "sa-example"
code = "CO1"
title = "Apply the basics"

[[program_outcomes]]
id = "po1"
department = "dept"
code = "PO1"
title = "Engineering knowledge"

[[questions]]
id = "q1"
subject = "sa-example"
exam = "internal1"
max_marks = 15.0

[[question_co_weights]]
question = "q1"
co = "co1"

[[copo_mappings]]
co = "co1"
po = "po1"
strength = 3

[[question_marks]]
student = "s1"
question = "q1"
marks = 11.0

[[internal_marks]]
student = "s1"
subject = "sa-example"
component = "internal1"
marks = 35.0
max_marks = 50.0

[[exam_marks]]
student = "s1"
subject = "sa-example"
marks = 42.0
max_marks = 60.0
"#;
