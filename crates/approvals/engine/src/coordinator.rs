//! Routing coordinator: the engine's entry point for approval actions.
//!
//! The coordinator plans steps at submission, resolves acting authority on
//! every approval or rejection, advances the per-artifact state machine,
//! and issues side-effect requests to the external collaborators.
//!
//! Commit discipline: the progress-row conditional update is the
//! authoritative commit point; it decides concurrent races. The artifact
//! status update and the log append follow it, and fire-and-forget side
//! effects come last; a failed side effect is logged and never rolls the
//! transition back.

use crate::config::RoutingConfig;
use crate::delegation::DelegationRegistry;
use crate::dispatch::{
    DocumentGenerator, EmailDispatcher, EmailRequest, EmailTemplate, Notification,
    NotificationDispatcher, NotificationKind, NotificationTarget, NoopDocumentGenerator,
    NoopEmailDispatcher, NoopNotificationDispatcher,
};
use crate::thresholds::{applicable_steps, requires_ceo};
use approvals_storage::RoutingStorage;
use approvals_types::{
    Amount, ApprovalAction, ApprovalLogAppend, ApprovalProgress, ApprovalStatus, ApprovalWorkflow,
    ApproverRole, Artifact, ArtifactId, ArtifactKind, ArtifactStatus, OrganisationId,
    RoutingError, RoutingResult, UserId, WorkflowId, WorkflowStep,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Rejections must carry a reason of at least this many characters
pub const MIN_REJECTION_REASON_CHARS: usize = 10;

/// Result of submitting an artifact for approval
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    /// The progress row created at submission
    pub progress: ApprovalProgress,
    /// Whether the plan involves the CEO
    pub requires_ceo: bool,
    /// True when the plan was empty and the artifact approved immediately
    pub auto_approved: bool,
    /// The step now awaiting action, if any
    pub first_step: Option<WorkflowStep>,
}

/// Result of approving the current step
#[derive(Clone, Debug)]
pub struct ApproveOutcome {
    /// The progress row after the step was recorded
    pub progress: ApprovalProgress,
    /// The artifact's status after the approval
    pub artifact_status: ArtifactStatus,
    /// True when this approval completed the plan
    pub completed: bool,
    /// The step now awaiting action, if any
    pub next_step: Option<WorkflowStep>,
    /// The delegator whose authority was exercised, when delegated
    pub on_behalf_of: Option<UserId>,
}

/// The routing coordinator orchestrates approvals. It never renders,
/// stores files, or sends mail itself.
pub struct RoutingCoordinator<S> {
    storage: Arc<S>,
    delegations: DelegationRegistry<S>,
    notifier: Arc<dyn NotificationDispatcher>,
    mailer: Arc<dyn EmailDispatcher>,
    documents: Arc<dyn DocumentGenerator>,
    config: RoutingConfig,
}

impl<S: RoutingStorage> RoutingCoordinator<S> {
    /// Create a coordinator with no-op side-effect collaborators.
    pub fn new(storage: Arc<S>, config: RoutingConfig) -> Self {
        let delegations =
            DelegationRegistry::new(Arc::clone(&storage)).with_policy(config.overlap_policy);
        Self {
            storage,
            delegations,
            notifier: Arc::new(NoopNotificationDispatcher),
            mailer: Arc::new(NoopEmailDispatcher),
            documents: Arc::new(NoopDocumentGenerator),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn EmailDispatcher>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentGenerator>) -> Self {
        self.documents = documents;
        self
    }

    /// The delegation registry backing this coordinator's authority
    /// resolution. Delegation creation and deactivation go through here.
    pub fn delegations(&self) -> &DelegationRegistry<S> {
        &self.delegations
    }

    // ── Operations ───────────────────────────────────────────────────

    /// The steps an amount would require, without touching any artifact.
    pub async fn preview_steps_for_amount(
        &self,
        organisation_id: &OrganisationId,
        kind: ArtifactKind,
        amount: Amount,
    ) -> RoutingResult<Vec<WorkflowStep>> {
        let workflow = self.configured_workflow(organisation_id, kind).await?;
        Ok(applicable_steps(amount, workflow.as_ref(), &self.config.fallback))
    }

    /// Submit a draft artifact for approval.
    ///
    /// Plans the applicable steps from the artifact's amount (frozen from
    /// here on), creates the progress row, moves the artifact out of
    /// draft, and notifies the first approver's role, or completes
    /// immediately when no steps apply.
    pub async fn submit(&self, artifact_id: &ArtifactId) -> RoutingResult<SubmitOutcome> {
        let artifact = self.load_artifact(artifact_id).await?;
        if artifact.status != ArtifactStatus::Draft {
            return Err(RoutingError::Conflict(format!(
                "artifact {} is {:?}; only drafts can be submitted",
                artifact_id, artifact.status
            )));
        }

        let (workflow_id, plan) = self.plan_for(&artifact).await?;
        let now = Utc::now();
        let progress =
            ApprovalProgress::start(artifact_id.clone(), workflow_id, plan.len() as u32, now);
        self.storage.insert_progress(progress.clone()).await?;

        let first_step = plan.first().cloned();
        let new_status = match &first_step {
            None => ArtifactStatus::Approved,
            Some(step) if step.role == ApproverRole::ChiefExecutive => {
                ArtifactStatus::PendingCeoApproval
            }
            Some(_) => ArtifactStatus::PendingApproval,
        };
        self.storage
            .transition_status(artifact_id, ArtifactStatus::Draft, new_status, now)
            .await?;

        let auto_approved = plan.is_empty();
        let mut log = ApprovalLogAppend::new(
            artifact_id.clone(),
            ApprovalAction::SentForApproval,
            artifact.originator.clone(),
        )
        .at(now);
        if auto_approved {
            log = log.with_comment("auto-approved below threshold");
        }
        self.storage.append_log(log).await?;

        if auto_approved {
            self.completion_side_effects(&artifact).await;
        } else if let Some(step) = &first_step {
            self.notify_best_effort(Notification::new(
                NotificationTarget::Role(step.role),
                artifact.organisation_id.clone(),
                NotificationKind::ApprovalRequested,
                "Approval required",
                format!(
                    "A {} for {} awaits your approval",
                    artifact.kind, artifact.amount
                ),
            ))
            .await;
        }

        tracing::info!(
            artifact_id = %artifact_id,
            total_steps = plan.len(),
            auto_approved,
            "artifact submitted for approval"
        );

        Ok(SubmitOutcome {
            requires_ceo: requires_ceo(&plan),
            auto_approved,
            first_step,
            progress,
        })
    }

    /// Approve the current step as `acting_user`.
    ///
    /// Authority comes either from the actor's own role matching the
    /// step, or from an active delegation whose delegator holds that role.
    pub async fn approve(
        &self,
        artifact_id: &ArtifactId,
        acting_user: &UserId,
    ) -> RoutingResult<ApproveOutcome> {
        let artifact = self.load_artifact(artifact_id).await?;
        let (mut progress, plan, step) = self.pending_step(&artifact).await?;

        let now = Utc::now();
        let on_behalf_of = self
            .resolve_authority(&artifact.organisation_id, step.role, acting_user, now)
            .await?;

        let expected_step = progress.current_step;
        progress.record_step_approval(step.role, acting_user.clone(), now)?;
        // Authoritative commit: the conditional update decides races
        self.storage
            .transition_progress(artifact_id, expected_step, progress.clone())
            .await?;

        let completed = progress.status == ApprovalStatus::Completed;
        let next_step = if completed {
            None
        } else {
            plan.get(progress.current_step as usize - 1).cloned()
        };
        let new_status = if completed {
            ArtifactStatus::Approved
        } else if next_step.as_ref().map(|s| s.role) == Some(ApproverRole::ChiefExecutive) {
            ArtifactStatus::PendingCeoApproval
        } else {
            ArtifactStatus::PendingApproval
        };
        if new_status != artifact.status {
            self.storage
                .transition_status(artifact_id, artifact.status, new_status, now)
                .await?;
        }

        let mut log =
            ApprovalLogAppend::new(artifact_id.clone(), ApprovalAction::Approved, acting_user.clone())
                .at(now);
        if let Some(delegator) = &on_behalf_of {
            log = log.on_behalf_of(delegator.clone());
        }
        self.storage.append_log(log).await?;

        if completed {
            self.completion_side_effects(&artifact).await;
        } else if let Some(step) = &next_step {
            self.notify_best_effort(Notification::new(
                NotificationTarget::Role(step.role),
                artifact.organisation_id.clone(),
                NotificationKind::ApprovalRequested,
                "Approval required",
                format!(
                    "A {} for {} awaits your approval",
                    artifact.kind, artifact.amount
                ),
            ))
            .await;
        }

        tracing::info!(
            artifact_id = %artifact_id,
            actor = %acting_user,
            step = expected_step,
            delegated = on_behalf_of.is_some(),
            completed,
            "approval step recorded"
        );

        Ok(ApproveOutcome {
            progress,
            artifact_status: new_status,
            completed,
            next_step,
            on_behalf_of,
        })
    }

    /// Reject the artifact with a mandatory reason.
    ///
    /// The reason is validated before any state is touched. Authority
    /// resolution matches `approve`.
    pub async fn reject(
        &self,
        artifact_id: &ArtifactId,
        acting_user: &UserId,
        reason: &str,
    ) -> RoutingResult<ApprovalProgress> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_REJECTION_REASON_CHARS {
            return Err(RoutingError::Validation(format!(
                "rejection reason must be at least {} characters",
                MIN_REJECTION_REASON_CHARS
            )));
        }

        let artifact = self.load_artifact(artifact_id).await?;
        let (mut progress, _plan, step) = self.pending_step(&artifact).await?;

        let now = Utc::now();
        let on_behalf_of = self
            .resolve_authority(&artifact.organisation_id, step.role, acting_user, now)
            .await?;

        let expected_step = progress.current_step;
        progress.reject(now)?;
        self.storage
            .transition_progress(artifact_id, expected_step, progress.clone())
            .await?;
        self.storage
            .transition_status(artifact_id, artifact.status, ArtifactStatus::Rejected, now)
            .await?;

        let mut log =
            ApprovalLogAppend::new(artifact_id.clone(), ApprovalAction::Rejected, acting_user.clone())
                .with_comment(reason)
                .at(now);
        if let Some(delegator) = &on_behalf_of {
            log = log.on_behalf_of(delegator.clone());
        }
        self.storage.append_log(log).await?;

        self.notify_best_effort(Notification::new(
            NotificationTarget::User(artifact.originator.clone()),
            artifact.organisation_id.clone(),
            NotificationKind::ApprovalRejected,
            "Rejected",
            format!("Your {} was rejected: {}", artifact.kind, reason),
        ))
        .await;

        tracing::info!(
            artifact_id = %artifact_id,
            actor = %acting_user,
            "artifact rejected"
        );

        Ok(progress)
    }

    /// Record an approved invoice as paid. Accounts and Admin only.
    pub async fn mark_paid(
        &self,
        artifact_id: &ArtifactId,
        acting_user: &UserId,
    ) -> RoutingResult<Artifact> {
        let mut artifact = self.load_artifact(artifact_id).await?;
        if artifact.kind != ArtifactKind::Invoice {
            return Err(RoutingError::Validation(format!(
                "artifact {} is a {}; only invoices can be marked paid",
                artifact_id, artifact.kind
            )));
        }
        let role = self
            .storage
            .role_of(acting_user, &artifact.organisation_id)
            .await?;
        if !role.map(|r| r.can_mark_paid()).unwrap_or(false) {
            return Err(RoutingError::Unauthorized(format!(
                "user {} cannot record payments",
                acting_user
            )));
        }

        let now = Utc::now();
        self.storage
            .transition_status(artifact_id, ArtifactStatus::Approved, ArtifactStatus::Paid, now)
            .await?;
        self.storage
            .append_log(
                ApprovalLogAppend::new(
                    artifact_id.clone(),
                    ApprovalAction::MarkedPaid,
                    acting_user.clone(),
                )
                .at(now),
            )
            .await?;

        self.notify_best_effort(Notification::new(
            NotificationTarget::User(artifact.originator.clone()),
            artifact.organisation_id.clone(),
            NotificationKind::PaymentRecorded,
            "Payment recorded",
            format!("Your invoice for {} has been paid", artifact.amount),
        ))
        .await;

        tracing::info!(artifact_id = %artifact_id, actor = %acting_user, "invoice marked paid");

        artifact.status = ArtifactStatus::Paid;
        artifact.updated_at = now;
        Ok(artifact)
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn load_artifact(&self, id: &ArtifactId) -> RoutingResult<Artifact> {
        self.storage
            .get_artifact(id)
            .await?
            .ok_or_else(|| RoutingError::NotFound(format!("artifact {} not found", id)))
    }

    async fn configured_workflow(
        &self,
        organisation_id: &OrganisationId,
        kind: ArtifactKind,
    ) -> RoutingResult<Option<ApprovalWorkflow>> {
        if !self.config.use_custom_workflows {
            return Ok(None);
        }
        Ok(self.storage.workflow_for(organisation_id, kind).await?)
    }

    /// Plan the applicable steps for an artifact. Deterministic: the same
    /// amount yields the same plan at submission and at action time.
    async fn plan_for(
        &self,
        artifact: &Artifact,
    ) -> RoutingResult<(Option<WorkflowId>, Vec<WorkflowStep>)> {
        let workflow = self
            .configured_workflow(&artifact.organisation_id, artifact.kind)
            .await?;
        let steps = applicable_steps(artifact.amount, workflow.as_ref(), &self.config.fallback);
        Ok((workflow.map(|w| w.id), steps))
    }

    /// Load the in-progress row and the step currently awaiting action.
    /// The recomputed plan must agree with the plan recorded at
    /// submission; drift surfaces as a conflict, never a silent replan.
    async fn pending_step(
        &self,
        artifact: &Artifact,
    ) -> RoutingResult<(ApprovalProgress, Vec<WorkflowStep>, WorkflowStep)> {
        let progress = self
            .storage
            .get_progress(&artifact.id)
            .await?
            .ok_or_else(|| {
                RoutingError::NotFound(format!(
                    "artifact {} has not been submitted for approval",
                    artifact.id
                ))
            })?;
        if progress.status != ApprovalStatus::InProgress {
            return Err(RoutingError::Conflict(format!(
                "approval for artifact {} is {:?}, not in progress",
                artifact.id, progress.status
            )));
        }

        let (_, plan) = self.plan_for(artifact).await?;
        if plan.len() as u32 != progress.total_steps {
            return Err(RoutingError::Conflict(format!(
                "approval plan for artifact {} no longer matches the plan recorded at submission",
                artifact.id
            )));
        }
        let step = plan
            .get(progress.current_step as usize - 1)
            .cloned()
            .ok_or_else(|| {
                RoutingError::Conflict(format!(
                    "artifact {} has no pending step to act on",
                    artifact.id
                ))
            })?;
        Ok((progress, plan, step))
    }

    /// Whether `acting_user` may act for `required`, directly or through
    /// an active delegation. Returns the delegator when delegated.
    async fn resolve_authority(
        &self,
        organisation_id: &OrganisationId,
        required: ApproverRole,
        acting_user: &UserId,
        at: DateTime<Utc>,
    ) -> RoutingResult<Option<UserId>> {
        let own_role = self.storage.role_of(acting_user, organisation_id).await?;
        if own_role == Some(required) {
            return Ok(None);
        }

        let grants = self
            .delegations
            .active_delegations_to(acting_user, organisation_id, at)
            .await?;
        for grant in grants {
            let delegator_role = self
                .storage
                .role_of(&grant.delegator, organisation_id)
                .await?;
            if delegator_role == Some(required) {
                return Ok(Some(grant.delegator));
            }
        }

        Err(RoutingError::Unauthorized(format!(
            "user {} holds neither the {} role nor an active delegation for it",
            acting_user, required
        )))
    }

    /// Side effects for a fully approved artifact: notify the originator
    /// and accounts, request the durable document, dispatch the email.
    async fn completion_side_effects(&self, artifact: &Artifact) {
        self.notify_best_effort(Notification::new(
            NotificationTarget::User(artifact.originator.clone()),
            artifact.organisation_id.clone(),
            NotificationKind::ApprovalCompleted,
            "Approved",
            format!(
                "Your {} for {} has been fully approved",
                artifact.kind, artifact.amount
            ),
        ))
        .await;
        self.notify_best_effort(Notification::new(
            NotificationTarget::Role(ApproverRole::Accounts),
            artifact.organisation_id.clone(),
            NotificationKind::ApprovalCompleted,
            "Ready for payment",
            format!(
                "A {} for {} has been approved",
                artifact.kind, artifact.amount
            ),
        ))
        .await;

        match self.documents.render_and_store(&artifact.id).await {
            Ok(stored_path) => {
                let request = EmailRequest {
                    template: EmailTemplate::ApprovalCompleted,
                    payload: serde_json::json!({
                        "artifact_id": artifact.id,
                        "kind": artifact.kind,
                        "amount": artifact.amount,
                        "document_path": stored_path,
                    }),
                };
                if let Err(error) = self.mailer.send(request).await {
                    tracing::warn!(
                        artifact_id = %artifact.id,
                        %error,
                        "approval email dispatch failed"
                    );
                }
            }
            Err(error) => {
                tracing::warn!(
                    artifact_id = %artifact.id,
                    %error,
                    "document generation request failed"
                );
            }
        }
    }

    async fn notify_best_effort(&self, notification: Notification) {
        if let Err(error) = self.notifier.notify(notification).await {
            tracing::warn!(%error, "notification dispatch failed");
        }
    }
}
