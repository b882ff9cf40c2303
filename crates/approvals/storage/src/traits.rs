use crate::StorageResult;
use approvals_types::{
    ApprovalLogAppend, ApprovalLogEntry, ApprovalProgress, ApprovalWorkflow, ApproverRole,
    Artifact, ArtifactId, ArtifactKind, ArtifactStatus, Delegation, DelegationId, OrganisationId,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for artifact rows.
///
/// Artifacts are never deleted; rejection and payment are soft states.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Insert a new artifact row.
    async fn insert_artifact(&self, artifact: Artifact) -> StorageResult<()>;

    /// Get one artifact by id.
    async fn get_artifact(&self, id: &ArtifactId) -> StorageResult<Option<Artifact>>;

    /// Conditionally transition artifact status. Fails with `Conflict`
    /// when the stored status differs from `expected_from`; the losing
    /// side of a concurrent update must not be applied.
    async fn transition_status(
        &self,
        id: &ArtifactId,
        expected_from: ArtifactStatus,
        to: ArtifactStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;
}

/// Storage interface for custom workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Store or replace the workflow for an organisation and artifact kind.
    async fn upsert_workflow(&self, workflow: ApprovalWorkflow) -> StorageResult<()>;

    /// The workflow configured for an organisation and artifact kind.
    async fn workflow_for(
        &self,
        organisation_id: &OrganisationId,
        kind: ArtifactKind,
    ) -> StorageResult<Option<ApprovalWorkflow>>;
}

/// Storage interface for per-artifact approval progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert the progress row created at submission. One row per
    /// artifact, so a duplicate submission fails with `Conflict`.
    async fn insert_progress(&self, progress: ApprovalProgress) -> StorageResult<()>;

    /// Get the progress row for an artifact.
    async fn get_progress(&self, artifact_id: &ArtifactId)
        -> StorageResult<Option<ApprovalProgress>>;

    /// Conditionally replace the progress row. The stored row must still
    /// be in progress at `expected_step`; otherwise the caller lost a
    /// concurrent race and receives `Conflict`.
    async fn transition_progress(
        &self,
        artifact_id: &ArtifactId,
        expected_step: u32,
        updated: ApprovalProgress,
    ) -> StorageResult<()>;
}

/// Storage interface for delegation grants.
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Insert a new delegation row.
    async fn insert_delegation(&self, delegation: Delegation) -> StorageResult<()>;

    /// Get one delegation by id.
    async fn get_delegation(&self, id: &DelegationId) -> StorageResult<Option<Delegation>>;

    /// All delegations granted by a delegator within an organisation,
    /// newest `starts_at` first.
    async fn delegations_for_delegator(
        &self,
        delegator: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Vec<Delegation>>;

    /// All delegations granted to a delegate within an organisation,
    /// newest `starts_at` first.
    async fn delegations_for_delegate(
        &self,
        delegate: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Vec<Delegation>>;

    /// Active delegations whose end time has passed at `now`.
    async fn expired_active(&self, now: DateTime<Utc>) -> StorageResult<Vec<Delegation>>;

    /// Deactivate a delegation. Returns whether this call performed the
    /// flip; false means the row was already inactive (idempotent no-op).
    async fn set_inactive(
        &self,
        id: &DelegationId,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool>;
}

/// The engine's window onto the auth/user-profile collaborator: which
/// role a user holds within an organisation.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Record a user's role within an organisation.
    async fn upsert_role(
        &self,
        user: &UserId,
        organisation_id: &OrganisationId,
        role: ApproverRole,
    ) -> StorageResult<()>;

    /// The role a user holds within an organisation, if any.
    async fn role_of(
        &self,
        user: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Option<ApproverRole>>;
}

/// Storage interface for the append-only approval log.
#[async_trait]
pub trait ApprovalLogStore: Send + Sync {
    /// Append an action and return the stored entry with its assigned id
    /// and sequence. Entries are never mutated or deleted.
    async fn append_log(&self, entry: ApprovalLogAppend) -> StorageResult<ApprovalLogEntry>;

    /// Entries for one artifact, newest-first.
    async fn list_log(
        &self,
        artifact_id: &ArtifactId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalLogEntry>>;
}

/// Unified storage bundle consumed by the routing coordinator.
pub trait RoutingStorage:
    ArtifactStore
    + WorkflowStore
    + ProgressStore
    + DelegationStore
    + UserDirectory
    + ApprovalLogStore
    + Send
    + Sync
{
}

impl<T> RoutingStorage for T where
    T: ArtifactStore
        + WorkflowStore
        + ProgressStore
        + DelegationStore
        + UserDirectory
        + ApprovalLogStore
        + Send
        + Sync
{
}
