use std::fmt::Write;
use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use accredit_core::parser::{parse_dataset_str, validate_dataset};

const HEADER: &str = r#"
[dataset]
id = "bench"
name = "Bench"
academic_year = "2025-26"

[[subjects]]
id = "sa1"
subject_code = "CS301"
subject_name = "Compiler Design"
department_id = "cse"
faculty_id = "fac1"
semester = 5
credits = 4
max_internal = 40
max_external = 60

[[course_outcomes]]
id = "co1"
subject = "sa1"
code = "CO1"
"#;

fn dataset_toml(students: usize, questions: usize) -> String {
    let mut s = HEADER.to_string();
    for q in 0..questions {
        let _ = write!(
            s,
            "\n[[questions]]\nid = \"q{q}\"\nsubject = \"sa1\"\nexam = \"external\"\nmax_marks = 10\n\
             \n[[question_co_weights]]\nquestion = \"q{q}\"\nco = \"co1\"\n"
        );
    }
    for st in 0..students {
        for q in 0..questions {
            let _ = write!(
                s,
                "\n[[question_marks]]\nstudent = \"s{st}\"\nquestion = \"q{q}\"\nmarks = {}\n",
                (st + q) % 11
            );
        }
    }
    s
}

fn bench_parse_dataset(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_dataset");

    let small = dataset_toml(30, 5);
    let large = dataset_toml(300, 10);

    group.bench_function("150 marks", |b| {
        b.iter(|| parse_dataset_str(black_box(&small), Path::new("bench.toml")))
    });

    group.bench_function("3000 marks", |b| {
        b.iter(|| parse_dataset_str(black_box(&large), Path::new("bench.toml")))
    });

    group.finish();
}

fn bench_validate_dataset(c: &mut Criterion) {
    let Ok(dataset) = parse_dataset_str(&dataset_toml(300, 10), Path::new("bench.toml")) else {
        return;
    };
    c.bench_function("validate_dataset/3000 marks", |b| {
        b.iter(|| validate_dataset(black_box(&dataset)))
    });
}

criterion_group!(benches, bench_parse_dataset, bench_validate_dataset);
criterion_main!(benches);
