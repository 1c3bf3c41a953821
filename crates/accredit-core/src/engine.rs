//! Workflow engine for internal mark records.
//!
//! Owns every write to `InternalMarkRecord::state` and every audit entry.
//! Each operation reads the record, checks legality and authorization, then
//! commits the new record and exactly one audit entry through a guarded
//! [`RecordWrite`], so a concurrent change between read and write surfaces
//! as [`EngineError::Conflict`] instead of a skipped approval.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    AuditAction, InternalMarkRecord, NewInternalMark, SubjectAssignment, WorkflowAuditEntry,
};
use crate::traits::{CatalogRepository, Clock, MarkRepository, RecordWrite};
use crate::validator::MarkValidator;
use crate::workflow::{
    authorize, check_transition, require_reason, Actor, Authority, Role, WorkflowState,
};

/// Configuration for the workflow engine and batch processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Days after first entry during which marks may be edited without override.
    #[serde(default = "default_edit_window_days")]
    pub edit_window_days: i64,
    /// Records per atomic batch commit.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum batch commits in flight.
    #[serde(default = "default_batch_parallelism")]
    pub batch_parallelism: usize,
}

fn default_edit_window_days() -> i64 {
    7
}
fn default_batch_size() -> usize {
    500
}
fn default_batch_parallelism() -> usize {
    4
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            edit_window_days: default_edit_window_days(),
            batch_size: default_batch_size(),
            batch_parallelism: default_batch_parallelism(),
        }
    }
}

/// A privileged request to edit marks outside the edit window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOverride {
    pub reason: String,
}

impl EditOverride {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The internal-mark workflow engine.
pub struct WorkflowEngine {
    marks: Arc<dyn MarkRepository>,
    catalog: Arc<dyn CatalogRepository>,
    clock: Arc<dyn Clock>,
    validator: MarkValidator,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(
        marks: Arc<dyn MarkRepository>,
        catalog: Arc<dyn CatalogRepository>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            marks,
            catalog,
            clock,
            validator: MarkValidator::default(),
            config,
        }
    }

    /// Replace the default validator.
    pub fn with_validator(mut self, validator: MarkValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub(crate) fn marks(&self) -> &Arc<dyn MarkRepository> {
        &self.marks
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Enter a new mark in `Draft`.
    pub async fn create_record(
        &self,
        actor: &Actor,
        input: NewInternalMark,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.validator.validate_component_mark(
            input.component,
            input.marks_obtained,
            input.max_marks,
        )?;
        let assignment = self.assignment(&input.subject_assignment_id).await?;
        if input.semester != assignment.semester {
            return Err(EngineError::Validation(format!(
                "semester {} does not match subject assignment semester {}",
                input.semester, assignment.semester
            )));
        }
        authorize(Authority::EntryOwner, actor, &actor.id, &assignment)?;

        let now = self.clock.now();
        let record = InternalMarkRecord {
            id: Uuid::new_v4(),
            student_id: input.student_id,
            subject_assignment_id: input.subject_assignment_id,
            semester: input.semester,
            academic_year: input.academic_year,
            component: input.component,
            marks_obtained: input.marks_obtained,
            max_marks: input.max_marks,
            state: WorkflowState::Draft,
            version: 1,
            entered_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
            submitted_by: None,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            frozen_by: None,
            frozen_at: None,
            published_by: None,
            published_at: None,
            rejection_reason: None,
            notes: input.notes,
        };
        let audit = audit_entry(
            &record,
            AuditAction::Created,
            WorkflowState::Draft,
            actor,
            now,
            None,
        );
        self.marks.insert_record(&record, &audit).await?;

        tracing::debug!(
            record_id = %record.id,
            student = %record.student_id,
            component = %record.component,
            "internal mark entered"
        );
        Ok(record)
    }

    /// Move a record to `to`, enforcing the transition table.
    pub async fn apply_transition(
        &self,
        record_id: Uuid,
        to: WorkflowState,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<InternalMarkRecord, EngineError> {
        let record = self.load(record_id).await?;
        let assignment = self.assignment(&record.subject_assignment_id).await?;
        let write = self.prepare_transition(&record, to, actor, reason, &assignment, self.now())?;
        self.marks.commit(std::slice::from_ref(&write)).await?;

        tracing::info!(
            record_id = %record_id,
            from = %record.state,
            to = %to,
            actor = %actor.id,
            "workflow transition"
        );
        Ok(write.record)
    }

    pub async fn submit(
        &self,
        record_id: Uuid,
        actor: &Actor,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Submitted, actor, None)
            .await
    }

    pub async fn approve(
        &self,
        record_id: Uuid,
        actor: &Actor,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Approved, actor, None)
            .await
    }

    pub async fn reject(
        &self,
        record_id: Uuid,
        actor: &Actor,
        reason: &str,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Rejected, actor, Some(reason))
            .await
    }

    /// Return a rejected record to `Draft` for editing.
    pub async fn reopen(
        &self,
        record_id: Uuid,
        actor: &Actor,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Draft, actor, None)
            .await
    }

    pub async fn freeze(
        &self,
        record_id: Uuid,
        actor: &Actor,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Frozen, actor, None)
            .await
    }

    pub async fn publish(
        &self,
        record_id: Uuid,
        actor: &Actor,
    ) -> Result<InternalMarkRecord, EngineError> {
        self.apply_transition(record_id, WorkflowState::Published, actor, None)
            .await
    }

    /// Change `marks_obtained` on a `Draft` or `Rejected` record.
    ///
    /// Outside the edit window the change needs an [`EditOverride`] from an
    /// HOD or above; the override reason lands in the audit entry.
    pub async fn update_marks(
        &self,
        record_id: Uuid,
        actor: &Actor,
        marks_obtained: f64,
        edit_override: Option<&EditOverride>,
    ) -> Result<InternalMarkRecord, EngineError> {
        let override_reason = edit_override
            .map(|o| require_reason(Some(&o.reason), "edit window override"))
            .transpose()?;

        let record = self.load(record_id).await?;
        if !record.state.is_editable() {
            return Err(EngineError::NotEditable {
                state: record.state,
            });
        }
        self.validator.validate_component_mark(
            record.component,
            marks_obtained,
            record.max_marks,
        )?;

        let assignment = self.assignment(&record.subject_assignment_id).await?;
        if override_reason.is_some() {
            authorize_override(actor, &assignment)?;
        } else {
            authorize(Authority::EntryOwner, actor, &record.entered_by, &assignment)?;
        }

        let now = self.clock.now();
        let window = Duration::days(self.config.edit_window_days);
        if override_reason.is_none() && now - record.created_at > window {
            return Err(EngineError::EditWindowExpired {
                window_days: self.config.edit_window_days,
            });
        }

        let mut updated = record.clone();
        updated.marks_obtained = marks_obtained;
        updated.version += 1;
        updated.updated_at = now;

        let action = AuditAction::MarksEdited {
            previous: record.marks_obtained,
            current: marks_obtained,
            overridden: override_reason.is_some(),
        };
        let audit = audit_entry(&record, action, record.state, actor, now, override_reason);
        let write = RecordWrite {
            expected_state: record.state,
            expected_version: record.version,
            record: updated,
            audit,
        };
        self.marks.commit(std::slice::from_ref(&write)).await?;

        if edit_override.is_some() {
            tracing::warn!(
                record_id = %record_id,
                actor = %actor.id,
                "marks edited under override"
            );
        } else {
            tracing::debug!(record_id = %record_id, "marks edited");
        }
        Ok(write.record)
    }

    /// Force a record back to an earlier state found in its own history.
    ///
    /// History is never rewritten: the rollback is itself a new audit entry.
    pub async fn rollback(
        &self,
        record_id: Uuid,
        actor: &Actor,
        target: WorkflowState,
        reason: Option<&str>,
    ) -> Result<InternalMarkRecord, EngineError> {
        let reason = require_reason(reason, "rollback")?;
        if actor.role != Role::Admin {
            return Err(EngineError::Unauthorized(format!(
                "{} may not roll back records",
                actor.id
            )));
        }

        let record = self.load(record_id).await?;
        let invalid = EngineError::InvalidTransition {
            from: record.state,
            to: target,
        };
        if record.state.is_terminal() || target.rank() >= record.state.rank() {
            return Err(invalid);
        }
        let history = self.marks.audit_trail(record_id).await?;
        let visited = history
            .iter()
            .any(|e| e.old_state == target || e.new_state == target);
        if !visited {
            return Err(invalid);
        }

        let now = self.clock.now();
        let mut updated = record.clone();
        updated.state = target;
        updated.version += 1;
        updated.updated_at = now;
        clear_stamps_above(&mut updated, target);

        let audit = audit_entry(&record, AuditAction::Rollback, target, actor, now, Some(reason));
        let write = RecordWrite {
            expected_state: record.state,
            expected_version: record.version,
            record: updated,
            audit,
        };
        self.marks.commit(std::slice::from_ref(&write)).await?;

        tracing::warn!(
            record_id = %record_id,
            from = %record.state,
            to = %target,
            actor = %actor.id,
            "workflow rollback"
        );
        Ok(write.record)
    }

    /// Fetch a record.
    pub async fn record(&self, record_id: Uuid) -> Result<InternalMarkRecord, EngineError> {
        self.load(record_id).await
    }

    /// A record's audit history, oldest first.
    pub async fn audit_trail(
        &self,
        record_id: Uuid,
    ) -> Result<Vec<WorkflowAuditEntry>, EngineError> {
        self.load(record_id).await?;
        Ok(self.marks.audit_trail(record_id).await?)
    }

    /// Build the guarded write for one transition without committing it.
    pub(crate) fn prepare_transition(
        &self,
        record: &InternalMarkRecord,
        to: WorkflowState,
        actor: &Actor,
        reason: Option<&str>,
        assignment: &SubjectAssignment,
        now: DateTime<Utc>,
    ) -> Result<RecordWrite, EngineError> {
        let rule = check_transition(record.state, to)?;
        authorize(rule.authority, actor, &record.entered_by, assignment)?;
        let reason = if rule.reason_required {
            Some(require_reason(reason, "rejection")?)
        } else {
            reason.map(str::trim).filter(|r| !r.is_empty()).map(String::from)
        };

        let mut updated = record.clone();
        updated.state = to;
        updated.version += 1;
        updated.updated_at = now;
        let by = Some(actor.id.clone());
        match to {
            WorkflowState::Submitted => {
                updated.submitted_by = by;
                updated.submitted_at = Some(now);
                updated.rejection_reason = None;
            }
            WorkflowState::Approved => {
                updated.approved_by = by;
                updated.approved_at = Some(now);
            }
            WorkflowState::Rejected => {
                updated.rejected_by = by;
                updated.rejected_at = Some(now);
                updated.rejection_reason = reason.clone();
            }
            WorkflowState::Frozen => {
                updated.frozen_by = by;
                updated.frozen_at = Some(now);
            }
            WorkflowState::Published => {
                updated.published_by = by;
                updated.published_at = Some(now);
            }
            WorkflowState::Draft => {}
        }

        let audit = audit_entry(record, AuditAction::Transition, to, actor, now, reason);
        Ok(RecordWrite {
            expected_state: record.state,
            expected_version: record.version,
            record: updated,
            audit,
        })
    }

    pub(crate) async fn load(&self, record_id: Uuid) -> Result<InternalMarkRecord, EngineError> {
        self.marks
            .get_record(record_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "internal mark record",
                id: record_id.to_string(),
            })
    }

    pub(crate) async fn assignment(&self, id: &str) -> Result<SubjectAssignment, EngineError> {
        self.catalog
            .subject_assignment(id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: "subject assignment",
                id: id.to_string(),
            })
    }
}

fn audit_entry(
    record: &InternalMarkRecord,
    action: AuditAction,
    new_state: WorkflowState,
    actor: &Actor,
    at: DateTime<Utc>,
    reason: Option<String>,
) -> WorkflowAuditEntry {
    WorkflowAuditEntry {
        id: Uuid::new_v4(),
        record_id: record.id,
        action,
        old_state: record.state,
        new_state,
        actor_id: actor.id.clone(),
        at,
        reason,
    }
}

/// Overrides need HOD of the owning department, exam cell, or admin.
fn authorize_override(actor: &Actor, assignment: &SubjectAssignment) -> Result<(), EngineError> {
    let allowed = match actor.role {
        Role::ExamCell | Role::Admin => true,
        Role::Hod => actor.department_id.as_deref() == Some(assignment.department_id.as_str()),
        Role::Faculty => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::Unauthorized(format!(
            "{} may not override the edit window",
            actor.id
        )))
    }
}

fn clear_stamps_above(record: &mut InternalMarkRecord, target: WorkflowState) {
    let rank = target.rank();
    if rank < WorkflowState::Submitted.rank() {
        record.submitted_by = None;
        record.submitted_at = None;
        record.rejected_by = None;
        record.rejected_at = None;
        record.rejection_reason = None;
    }
    if rank < WorkflowState::Approved.rank() {
        record.approved_by = None;
        record.approved_at = None;
    }
    if rank < WorkflowState::Frozen.rank() {
        record.frozen_by = None;
        record.frozen_at = None;
    }
}
