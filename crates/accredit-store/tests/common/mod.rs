//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use accredit_core::engine::{WorkflowConfig, WorkflowEngine};
use accredit_core::model::{
    AssessmentComponent, InternalMarkRecord, NewInternalMark, SubjectAssignment,
};
use accredit_core::traits::ManualClock;
use accredit_core::workflow::{Actor, Role};
use accredit_store::MemoryStore;

pub const SUBJECT: &str = "sa-cs301";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<WorkflowEngine>,
}

pub fn subject() -> SubjectAssignment {
    SubjectAssignment {
        id: SUBJECT.into(),
        subject_code: "CS301".into(),
        subject_name: "Compiler Design".into(),
        department_id: "cse".into(),
        faculty_id: "fac-rao".into(),
        semester: 5,
        credits: 4.0,
        max_internal: 40.0,
        max_external: 60.0,
    }
}

pub fn faculty() -> Actor {
    Actor::new("fac-rao", Role::Faculty).in_department("cse")
}

pub fn other_faculty() -> Actor {
    Actor::new("fac-iyer", Role::Faculty).in_department("cse")
}

pub fn hod() -> Actor {
    Actor::new("hod-cse", Role::Hod).in_department("cse")
}

pub fn foreign_hod() -> Actor {
    Actor::new("hod-ece", Role::Hod).in_department("ece")
}

pub fn exam_cell() -> Actor {
    Actor::new("exam-cell", Role::ExamCell)
}

pub fn admin() -> Actor {
    Actor::new("admin", Role::Admin)
}

pub fn fixture() -> Fixture {
    fixture_with(WorkflowConfig::default())
}

pub fn fixture_with(config: WorkflowConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    store.add_subject(subject());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 8, 4, 9, 0, 0).unwrap(),
    ));
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        store.clone(),
        clock.clone(),
        config,
    ));
    Fixture {
        store,
        clock,
        engine,
    }
}

pub fn new_mark(student: &str, component: AssessmentComponent, marks: f64) -> NewInternalMark {
    NewInternalMark {
        student_id: student.into(),
        subject_assignment_id: SUBJECT.into(),
        semester: 5,
        academic_year: "2025-26".into(),
        component,
        marks_obtained: marks,
        max_marks: 100.0,
        notes: None,
    }
}

impl Fixture {
    pub async fn draft(&self, student: &str) -> InternalMarkRecord {
        self.engine
            .create_record(
                &faculty(),
                new_mark(student, AssessmentComponent::Internal1, 70.0),
            )
            .await
            .unwrap()
    }

    /// Create a record and walk it to `FROZEN`.
    pub async fn frozen(
        &self,
        student: &str,
        component: AssessmentComponent,
        marks: f64,
    ) -> InternalMarkRecord {
        let record = self
            .engine
            .create_record(&faculty(), new_mark(student, component, marks))
            .await
            .unwrap();
        self.engine.submit(record.id, &faculty()).await.unwrap();
        self.engine.approve(record.id, &hod()).await.unwrap();
        self.engine.freeze(record.id, &exam_cell()).await.unwrap()
    }
}
