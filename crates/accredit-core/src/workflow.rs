//! Internal-mark lifecycle state machine.
//!
//! ```text
//! DRAFT -> SUBMITTED -> APPROVED -> FROZEN -> PUBLISHED
//!              |            \________________/^
//!              v
//!          REJECTED -> DRAFT | SUBMITTED
//! ```
//!
//! The transition table lives in [`check_transition`] and nowhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::SubjectAssignment;

/// Lifecycle stage of an internal mark record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowState {
    Draft,
    Submitted,
    Rejected,
    Approved,
    Frozen,
    Published,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 6] = [
        WorkflowState::Draft,
        WorkflowState::Submitted,
        WorkflowState::Rejected,
        WorkflowState::Approved,
        WorkflowState::Frozen,
        WorkflowState::Published,
    ];

    /// Position along the main lifecycle. `Rejected` sits beside `Submitted`.
    pub fn rank(self) -> u8 {
        match self {
            WorkflowState::Draft => 0,
            WorkflowState::Submitted | WorkflowState::Rejected => 1,
            WorkflowState::Approved => 2,
            WorkflowState::Frozen => 3,
            WorkflowState::Published => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == WorkflowState::Published
    }

    /// Marks may only be edited in these states.
    pub fn is_editable(self) -> bool {
        matches!(self, WorkflowState::Draft | WorkflowState::Rejected)
    }

    /// Calculators only read records in these states.
    pub fn is_locked(self) -> bool {
        matches!(self, WorkflowState::Frozen | WorkflowState::Published)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowState::Draft => "DRAFT",
            WorkflowState::Submitted => "SUBMITTED",
            WorkflowState::Rejected => "REJECTED",
            WorkflowState::Approved => "APPROVED",
            WorkflowState::Frozen => "FROZEN",
            WorkflowState::Published => "PUBLISHED",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(WorkflowState::Draft),
            "SUBMITTED" => Ok(WorkflowState::Submitted),
            "REJECTED" => Ok(WorkflowState::Rejected),
            "APPROVED" => Ok(WorkflowState::Approved),
            "FROZEN" => Ok(WorkflowState::Frozen),
            "PUBLISHED" => Ok(WorkflowState::Published),
            other => Err(format!("unknown workflow state: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Privilege level of an actor, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Faculty,
    Hod,
    ExamCell,
    Admin,
}

/// Someone performing a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            department_id: None,
        }
    }

    pub fn in_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    /// Owns mark entry for the assignment.
    pub fn owns(&self, assignment: &SubjectAssignment) -> bool {
        self.id == assignment.faculty_id
    }
}

/// Who may perform a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The faculty member owning the subject assignment.
    EntryOwner,
    /// HOD of the assignment's department, or exam cell / admin.
    Approver,
    /// Exam cell or admin.
    Freezer,
    /// Exam cell or admin.
    Publisher,
}

/// A legal edge in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub authority: Authority,
    pub reason_required: bool,
}

/// Look up the rule for `from -> to`, failing with `InvalidTransition`.
pub fn check_transition(
    from: WorkflowState,
    to: WorkflowState,
) -> Result<TransitionRule, EngineError> {
    use WorkflowState::*;

    let (authority, reason_required) = match (from, to) {
        (Draft, Submitted) | (Rejected, Submitted) | (Rejected, Draft) => {
            (Authority::EntryOwner, false)
        }
        (Submitted, Approved) => (Authority::Approver, false),
        (Submitted, Rejected) => (Authority::Approver, true),
        (Approved, Frozen) => (Authority::Freezer, false),
        (Approved, Published) | (Frozen, Published) => (Authority::Publisher, false),
        _ => return Err(EngineError::InvalidTransition { from, to }),
    };

    Ok(TransitionRule {
        from,
        to,
        authority,
        reason_required,
    })
}

/// Verify `actor` holds `authority` over a record entered by `entered_by`.
pub fn authorize(
    authority: Authority,
    actor: &Actor,
    entered_by: &str,
    assignment: &SubjectAssignment,
) -> Result<(), EngineError> {
    match authority {
        Authority::EntryOwner => {
            if actor.owns(assignment) {
                Ok(())
            } else {
                Err(EngineError::Unauthorized(format!(
                    "{} does not own subject assignment {}",
                    actor.id, assignment.id
                )))
            }
        }
        Authority::Approver => {
            if actor.id == entered_by {
                return Err(EngineError::Unauthorized(format!(
                    "{} entered this record and cannot review it",
                    actor.id
                )));
            }
            match actor.role {
                Role::ExamCell | Role::Admin => Ok(()),
                Role::Hod
                    if actor.department_id.as_deref()
                        == Some(assignment.department_id.as_str()) =>
                {
                    Ok(())
                }
                Role::Hod => Err(EngineError::Unauthorized(format!(
                    "{} is not HOD of department {}",
                    actor.id, assignment.department_id
                ))),
                Role::Faculty => Err(EngineError::Unauthorized(format!(
                    "{} lacks approval privilege",
                    actor.id
                ))),
            }
        }
        Authority::Freezer | Authority::Publisher => {
            if actor.role >= Role::ExamCell {
                Ok(())
            } else {
                Err(EngineError::Unauthorized(format!(
                    "{} lacks exam cell privilege",
                    actor.id
                )))
            }
        }
    }
}

/// Require a non-blank reason.
pub fn require_reason(reason: Option<&str>, what: &str) -> Result<String, EngineError> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(EngineError::Validation(format!("{what} requires a reason"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> SubjectAssignment {
        SubjectAssignment {
            id: "sa1".into(),
            subject_code: "CS301".into(),
            subject_name: "Compilers".into(),
            department_id: "cse".into(),
            faculty_id: "fac1".into(),
            semester: 5,
            credits: 4.0,
            max_internal: 40.0,
            max_external: 60.0,
        }
    }

    #[test]
    fn legal_edges_match_table() {
        use WorkflowState::*;
        let legal = [
            (Draft, Submitted),
            (Rejected, Submitted),
            (Rejected, Draft),
            (Submitted, Approved),
            (Submitted, Rejected),
            (Approved, Frozen),
            (Approved, Published),
            (Frozen, Published),
        ];
        for from in WorkflowState::ALL {
            for to in WorkflowState::ALL {
                let result = check_transition(from, to);
                if legal.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from} -> {to} should be legal");
                } else {
                    assert_eq!(
                        result.unwrap_err(),
                        EngineError::InvalidTransition { from, to },
                        "{from} -> {to} should be illegal"
                    );
                }
            }
        }
    }

    #[test]
    fn published_is_terminal() {
        for to in WorkflowState::ALL {
            assert!(check_transition(WorkflowState::Published, to).is_err());
        }
    }

    #[test]
    fn only_rejection_requires_reason() {
        let rule = check_transition(WorkflowState::Submitted, WorkflowState::Rejected).unwrap();
        assert!(rule.reason_required);
        let rule = check_transition(WorkflowState::Submitted, WorkflowState::Approved).unwrap();
        assert!(!rule.reason_required);
    }

    #[test]
    fn approver_cannot_review_own_entry() {
        let admin = Actor::new("fac1", Role::Admin);
        let err = authorize(Authority::Approver, &admin, "fac1", &assignment()).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[test]
    fn hod_scope_is_department() {
        let own = Actor::new("hod1", Role::Hod).in_department("cse");
        let other = Actor::new("hod2", Role::Hod).in_department("ece");
        assert!(authorize(Authority::Approver, &own, "fac1", &assignment()).is_ok());
        assert!(authorize(Authority::Approver, &other, "fac1", &assignment()).is_err());
    }

    #[test]
    fn freezing_needs_exam_cell() {
        let hod = Actor::new("hod1", Role::Hod).in_department("cse");
        let cell = Actor::new("cell", Role::ExamCell);
        assert!(authorize(Authority::Freezer, &hod, "fac1", &assignment()).is_err());
        assert!(authorize(Authority::Freezer, &cell, "fac1", &assignment()).is_ok());
    }

    #[test]
    fn blank_reason_rejected() {
        assert!(require_reason(None, "rejection").is_err());
        assert!(require_reason(Some("   "), "rejection").is_err());
        assert_eq!(
            require_reason(Some(" wrong total "), "rejection").unwrap(),
            "wrong total"
        );
    }

    #[test]
    fn state_parse_roundtrip() {
        for s in WorkflowState::ALL {
            assert_eq!(s.to_string().parse::<WorkflowState>().unwrap(), s);
        }
        assert!("archived".parse::<WorkflowState>().is_err());
    }
}
