//! Final marks, publication, and grade-point averages through the store.

mod common;

use chrono::Duration;

use accredit_core::error::ErrorKind;
use accredit_core::gpa::GpaStatus;
use accredit_core::grading::GradingPolicy;
use accredit_core::model::{
    AssessmentComponent, ExamMark, ExamType, FinalMarkRecord, FinalMarkStatus, PassStatus,
    SubjectAssignment,
};
use accredit_core::results::ResultsService;
use accredit_core::traits::MarkRepository;

use common::*;

fn results(fx: &Fixture) -> ResultsService {
    ResultsService::new(
        fx.store.clone(),
        fx.store.clone(),
        fx.clock.clone(),
        GradingPolicy::default(),
    )
}

fn external(student: &str, marks: f64) -> ExamMark {
    ExamMark {
        student_id: student.into(),
        subject_assignment_id: SUBJECT.into(),
        exam_type: ExamType::External,
        marks_obtained: marks,
        max_marks: 60.0,
    }
}

fn other_subject(id: &str, semester: u8, credits: f64) -> SubjectAssignment {
    SubjectAssignment {
        id: id.into(),
        subject_code: id.to_uppercase(),
        subject_name: id.into(),
        semester,
        credits,
        ..subject()
    }
}

fn published(subject: &str, semester: u8, grade_point: f64) -> FinalMarkRecord {
    FinalMarkRecord {
        student_id: "s1".into(),
        subject_assignment_id: subject.into(),
        semester,
        internal1: None,
        internal2: None,
        best_internal: 0.0,
        external: 0.0,
        total: 0.0,
        percentage: 0.0,
        grade: String::new(),
        grade_point,
        result: PassStatus::Pass,
        status: FinalMarkStatus::Published,
        published_at: None,
    }
}

async fn scenario_a(fx: &Fixture) {
    fx.frozen("s1", AssessmentComponent::Internal1, 70.0).await;
    fx.frozen("s1", AssessmentComponent::Internal2, 75.0).await;
    fx.store.add_exam_mark(external("s1", 45.0));
}

#[tokio::test]
async fn external_mark_above_max_is_rejected() {
    let fx = fixture();
    fx.frozen("s1", AssessmentComponent::Internal1, 70.0).await;
    fx.store.add_exam_mark(external("s1", 75.0));

    let service = results(&fx);
    let err = service.preview_final_mark("s1", SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = service.refresh_final_mark("s1", SUBJECT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(fx.store.all_final_marks().is_empty());
}

#[tokio::test]
async fn best_internal_final_mark() {
    let fx = fixture();
    scenario_a(&fx).await;

    let record = results(&fx).refresh_final_mark("s1", SUBJECT).await.unwrap();
    assert_eq!(record.internal1, Some(28.0));
    assert_eq!(record.internal2, Some(30.0));
    assert_eq!(record.best_internal, 30.0);
    assert_eq!(record.external, 45.0);
    assert_eq!(record.total, 75.0);
    assert_eq!(record.percentage, 75.0);
    assert_eq!(record.grade, "B+");
    assert_eq!(record.grade_point, 7.0);
    assert_eq!(record.result, PassStatus::Pass);
    assert_eq!(record.status, FinalMarkStatus::Draft);
}

#[tokio::test]
async fn unlocked_marks_are_ignored() {
    let fx = fixture();
    fx.frozen("s1", AssessmentComponent::Internal1, 70.0).await;
    let draft = fx
        .engine
        .create_record(
            &faculty(),
            new_mark("s1", AssessmentComponent::Internal2, 95.0),
        )
        .await
        .unwrap();
    fx.engine.submit(draft.id, &faculty()).await.unwrap();
    fx.engine.approve(draft.id, &hod()).await.unwrap();

    let record = results(&fx).preview_final_mark("s1", SUBJECT).await.unwrap();
    assert_eq!(record.internal2, None);
    assert_eq!(record.best_internal, 28.0);
    assert_eq!(record.external, 0.0);
    assert_eq!(record.result, PassStatus::Fail);
    assert!(fx.store.all_final_marks().is_empty());
}

#[tokio::test]
async fn refresh_is_idempotent_and_keeps_publication() {
    let fx = fixture();
    scenario_a(&fx).await;
    let service = results(&fx);

    let first = service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    let second = service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.store.all_final_marks().len(), 1);

    let published = service
        .publish_final_mark(&exam_cell(), "s1", SUBJECT, 5)
        .await
        .unwrap();
    assert_eq!(published.status, FinalMarkStatus::Published);
    assert!(published.published_at.is_some());

    let again = service
        .publish_final_mark(&exam_cell(), "s1", SUBJECT, 5)
        .await
        .unwrap();
    assert_eq!(again, published);

    let refreshed = service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    assert_eq!(refreshed.status, FinalMarkStatus::Published);
}

#[tokio::test]
async fn changed_inputs_reset_to_draft() {
    let fx = fixture();
    scenario_a(&fx).await;
    let service = results(&fx);
    service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    service
        .publish_final_mark(&admin(), "s1", SUBJECT, 5)
        .await
        .unwrap();

    // A re-test entered later supersedes the earlier Internal 1.
    fx.clock.advance(Duration::hours(1));
    fx.frozen("s1", AssessmentComponent::Internal1, 90.0).await;

    let record = service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    assert_eq!(record.internal1, Some(36.0));
    assert_eq!(record.best_internal, 36.0);
    assert_eq!(record.total, 81.0);
    assert_eq!(record.grade, "A");
    assert_eq!(record.status, FinalMarkStatus::Draft);
    assert_eq!(fx.store.all_final_marks()[0], record);
}

#[tokio::test]
async fn refresh_subject_covers_every_student() {
    let fx = fixture();
    scenario_a(&fx).await;
    fx.frozen("s2", AssessmentComponent::Internal1, 40.0).await;
    fx.store.add_exam_mark(external("s2", 20.0));

    let records = results(&fx).refresh_subject(SUBJECT).await.unwrap();
    let students: Vec<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
    assert_eq!(students, ["s1", "s2"]);
    assert_eq!(records[1].total, 36.0);
    assert_eq!(records[1].result, PassStatus::Fail);
    assert_eq!(records[1].grade, "F");
}

#[tokio::test]
async fn publishing_needs_exam_cell_and_a_stored_mark() {
    let fx = fixture();
    scenario_a(&fx).await;
    let service = results(&fx);

    let err = service
        .publish_final_mark(&exam_cell(), "s1", SUBJECT, 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    service.refresh_final_mark("s1", SUBJECT).await.unwrap();
    for actor in [faculty(), hod()] {
        let err = service
            .publish_final_mark(&actor, "s1", SUBJECT, 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    assert_eq!(fx.store.all_final_marks()[0].status, FinalMarkStatus::Draft);
}

#[tokio::test]
async fn sgpa_and_cgpa_from_published_marks() {
    let fx = fixture();
    scenario_a(&fx).await;
    fx.store.add_subject(other_subject("sa-ma301", 5, 3.0));
    fx.store.add_subject(other_subject("sa-cs401", 6, 4.0));
    fx.store.add_subject(other_subject("sa-cs501", 7, 4.0));

    let service = results(&fx);
    service.refresh_final_mark("s1", SUBJECT).await.unwrap();

    // Draft marks do not count yet.
    let sgpa = service.semester_sgpa("s1", 5).await.unwrap();
    assert_eq!(sgpa.status, GpaStatus::InsufficientData);

    service
        .publish_final_mark(&exam_cell(), "s1", SUBJECT, 5)
        .await
        .unwrap();
    fx.store
        .upsert_final_mark(&published("sa-ma301", 5, 9.0))
        .await
        .unwrap();
    fx.store
        .upsert_final_mark(&published("sa-cs401", 6, 8.0))
        .await
        .unwrap();
    let mut draft = published("sa-cs501", 7, 10.0);
    draft.status = FinalMarkStatus::Draft;
    fx.store.upsert_final_mark(&draft).await.unwrap();

    let sgpa = service.semester_sgpa("s1", 5).await.unwrap();
    assert_eq!(sgpa.status, GpaStatus::Ok);
    assert_eq!(sgpa.subject_count, 2);
    assert_eq!(sgpa.total_credits, 7.0);
    assert_eq!(sgpa.sgpa, 7.86);

    let cgpa = service.cgpa("s1").await.unwrap();
    assert_eq!(cgpa.status, GpaStatus::Ok);
    assert_eq!(cgpa.semesters.len(), 3);
    assert_eq!(cgpa.semesters[2].status, GpaStatus::InsufficientData);
    assert_eq!(cgpa.cgpa, 7.93);

    let nobody = service.cgpa("s9").await.unwrap();
    assert_eq!(nobody.status, GpaStatus::InsufficientData);
    assert_eq!(nobody.cgpa, 0.0);
}
