//! Per-artifact approval progress: the state machine at the heart of the
//! routing engine.
//!
//! Invariants:
//! - `completed_steps.len() == current_step - 1` while `InProgress`
//! - a terminal row (`Completed`, `Rejected`) is frozen
//! - `total_steps == 0` completes immediately (auto-approval)
//!
//! Transitions return `Result` so that duplicate delivery of the same
//! action surfaces as a conflict instead of silently re-appending.

use crate::{ApproverRole, ArtifactId, RoutingError, RoutingResult, UserId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Approval Status ──────────────────────────────────────────────────

/// Overall status of an artifact's approval routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    InProgress,
    Completed,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

// ── Completed Step ───────────────────────────────────────────────────

/// Record of one approved step. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    /// 1-based index into the applicable-steps list
    pub step_order: u32,
    /// Role the step required
    pub role: ApproverRole,
    /// User whose action satisfied the step (the delegate when authority
    /// came through a delegation)
    pub acted_by: UserId,
    /// When the step was approved
    pub completed_at: DateTime<Utc>,
}

// ── Approval Progress ────────────────────────────────────────────────

/// The approval state of one artifact. One row per artifact, created at
/// submission and frozen on the terminal transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalProgress {
    /// The artifact this progress belongs to
    pub artifact_id: ArtifactId,
    /// The custom workflow used to plan steps, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    /// 1-based index of the step awaiting action
    pub current_step: u32,
    /// Count of applicable steps computed at submission time
    pub total_steps: u32,
    /// Approved steps, in chronological order
    pub completed_steps: Vec<CompletedStep>,
    /// Overall status
    pub status: ApprovalStatus,
    /// When the artifact was submitted
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl ApprovalProgress {
    /// Start tracking an artifact's approval. A plan with zero applicable
    /// steps completes immediately: the artifact is auto-approved.
    pub fn start(
        artifact_id: ArtifactId,
        workflow_id: Option<WorkflowId>,
        total_steps: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if total_steps == 0 {
            ApprovalStatus::Completed
        } else {
            ApprovalStatus::InProgress
        };
        Self {
            artifact_id,
            workflow_id,
            current_step: 1,
            total_steps,
            completed_steps: Vec::new(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the artifact completed with no approval steps at all
    pub fn is_auto_approved(&self) -> bool {
        self.total_steps == 0 && self.status == ApprovalStatus::Completed
    }

    /// Steps still awaiting approval
    pub fn remaining_steps(&self) -> u32 {
        match self.status {
            ApprovalStatus::InProgress => self.total_steps - self.current_step + 1,
            _ => 0,
        }
    }

    /// Record the approval of the current step and advance. Completing the
    /// final step transitions the row to `Completed`.
    pub fn record_step_approval(
        &mut self,
        role: ApproverRole,
        acted_by: UserId,
        now: DateTime<Utc>,
    ) -> RoutingResult<()> {
        if self.status != ApprovalStatus::InProgress {
            return Err(RoutingError::Conflict(format!(
                "approval for artifact {} is {:?}, not in progress",
                self.artifact_id, self.status
            )));
        }
        if self.current_step > self.total_steps {
            return Err(RoutingError::Conflict(format!(
                "artifact {} has no pending step to approve",
                self.artifact_id
            )));
        }

        self.completed_steps.push(CompletedStep {
            step_order: self.current_step,
            role,
            acted_by,
            completed_at: now,
        });
        self.current_step += 1;
        if self.current_step > self.total_steps {
            self.status = ApprovalStatus::Completed;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Reject the artifact. Valid only while in progress; the row is
    /// frozen afterwards.
    pub fn reject(&mut self, now: DateTime<Utc>) -> RoutingResult<()> {
        if self.status != ApprovalStatus::InProgress {
            return Err(RoutingError::Conflict(format!(
                "approval for artifact {} is {:?}, not in progress",
                self.artifact_id, self.status
            )));
        }
        self.status = ApprovalStatus::Rejected;
        self.updated_at = now;
        Ok(())
    }

    /// Check the structural invariant on an in-progress row
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            ApprovalStatus::InProgress => {
                self.completed_steps.len() as u32 == self.current_step - 1
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_progress(total: u32) -> ApprovalProgress {
        ApprovalProgress::start(ArtifactId::new("po-1"), None, total, Utc::now())
    }

    #[test]
    fn test_zero_steps_completes_immediately() {
        let progress = in_progress(0);
        assert_eq!(progress.status, ApprovalStatus::Completed);
        assert!(progress.is_auto_approved());
        assert!(progress.completed_steps.is_empty());
    }

    #[test]
    fn test_n_approvals_complete_in_order() {
        let mut progress = in_progress(2);
        assert_eq!(progress.status, ApprovalStatus::InProgress);
        assert_eq!(progress.remaining_steps(), 2);

        progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(progress.status, ApprovalStatus::InProgress);
        assert_eq!(progress.current_step, 2);
        assert!(progress.invariant_holds());

        progress
            .record_step_approval(ApproverRole::ChiefExecutive, UserId::new("ceo-1"), Utc::now())
            .unwrap();
        assert_eq!(progress.status, ApprovalStatus::Completed);
        assert_eq!(progress.completed_steps.len(), 2);
        assert_eq!(
            progress
                .completed_steps
                .iter()
                .map(|s| s.role)
                .collect::<Vec<_>>(),
            vec![ApproverRole::ManagingDirector, ApproverRole::ChiefExecutive]
        );
        assert_eq!(
            progress
                .completed_steps
                .iter()
                .map(|s| s.step_order)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_approval_after_completion_conflicts() {
        let mut progress = in_progress(1);
        progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap();

        let err = progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, RoutingError::Conflict(_)));
        assert_eq!(progress.completed_steps.len(), 1);
    }

    #[test]
    fn test_reject_only_in_progress() {
        let mut progress = in_progress(1);
        progress.reject(Utc::now()).unwrap();
        assert_eq!(progress.status, ApprovalStatus::Rejected);

        let err = progress.reject(Utc::now()).unwrap_err();
        assert!(matches!(err, RoutingError::Conflict(_)));
    }

    #[test]
    fn test_rejected_row_is_frozen() {
        let mut progress = in_progress(2);
        progress.reject(Utc::now()).unwrap();
        let before = progress.clone();

        let err = progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, RoutingError::Conflict(_)));
        assert_eq!(progress.current_step, before.current_step);
        assert_eq!(progress.completed_steps, before.completed_steps);
    }

    #[test]
    fn test_invariant_tracks_completed_count() {
        let mut progress = in_progress(3);
        assert!(progress.invariant_holds());
        progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap();
        assert!(progress.invariant_holds());
        assert_eq!(progress.remaining_steps(), 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut progress = in_progress(1);
        progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap();

        let json = serde_json::to_string(&progress).unwrap();
        let back: ApprovalProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, ApprovalStatus::Completed);
        assert_eq!(back.completed_steps, progress.completed_steps);
    }
}
