use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use accredit_core::attainment::{
    compute_co_attainment, compute_po_attainment, AttainmentPolicy, CoInputs, MappedQuestion,
};
use accredit_core::model::{CoPoMapping, CourseOutcome, OutcomeKind, ProgramOutcome, QuestionMark};

fn course_outcome(id: &str) -> CourseOutcome {
    CourseOutcome {
        id: id.into(),
        subject_assignment_id: "sa1".into(),
        code: id.to_uppercase(),
        title: String::new(),
        target_attainment: 60.0,
        l1_threshold: 40.0,
        l2_threshold: 60.0,
        l3_threshold: 75.0,
    }
}

fn inputs(students: usize, questions: usize) -> CoInputs {
    let questions: Vec<MappedQuestion> = (0..questions)
        .map(|q| MappedQuestion {
            question_id: format!("q{q}"),
            max_marks: 10.0,
            weight_pct: if q % 2 == 0 { 100.0 } else { 50.0 },
        })
        .collect();
    let marks = (0..students)
        .flat_map(|s| {
            questions.iter().enumerate().map(move |(i, q)| QuestionMark {
                student_id: format!("s{s}"),
                question_id: q.question_id.clone(),
                marks_obtained: ((s * 7 + i * 3) % 11) as f64,
            })
        })
        .collect();
    CoInputs { questions, marks }
}

fn bench_co_attainment(c: &mut Criterion) {
    let mut group = c.benchmark_group("co_attainment");
    let co = course_outcome("co1");

    let small = inputs(60, 5);
    let large = inputs(2_000, 20);

    group.bench_function("60 students x 5 questions", |b| {
        b.iter(|| compute_co_attainment(black_box(&co), black_box(&small)))
    });

    group.bench_function("2000 students x 20 questions", |b| {
        b.iter(|| compute_co_attainment(black_box(&co), black_box(&large)))
    });

    group.finish();
}

fn bench_po_attainment(c: &mut Criterion) {
    let po = ProgramOutcome {
        id: "po1".into(),
        department_id: "cse".into(),
        code: "PO1".into(),
        title: String::new(),
        target_attainment: 60.0,
        kind: OutcomeKind::Po,
    };
    let data = inputs(60, 5);
    let co_results: BTreeMap<_, _> = (0..40)
        .map(|i| {
            let co = course_outcome(&format!("co{i}"));
            (co.id.clone(), compute_co_attainment(&co, &data))
        })
        .collect();
    let mappings: Vec<CoPoMapping> = (0..40)
        .map(|i| CoPoMapping {
            co_id: format!("co{i}"),
            po_id: "po1".into(),
            strength: (i % 3 + 1) as u8,
        })
        .collect();
    let policy = AttainmentPolicy::default();

    c.bench_function("po_attainment/40 mapped COs", |b| {
        b.iter(|| {
            compute_po_attainment(
                black_box(&po),
                black_box(&mappings),
                black_box(&co_results),
                &[],
                &policy,
            )
        })
    });
}

criterion_group!(benches, bench_co_attainment, bench_po_attainment);
criterion_main!(benches);
