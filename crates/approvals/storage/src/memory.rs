//! In-memory reference implementation of the routing storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend for source-of-truth data.

use crate::traits::{
    ApprovalLogStore, ArtifactStore, DelegationStore, ProgressStore, QueryWindow, UserDirectory,
    WorkflowStore,
};
use crate::{StorageError, StorageResult};
use approvals_types::{
    ApprovalLogAppend, ApprovalLogEntry, ApprovalProgress, ApprovalStatus, ApprovalWorkflow,
    ApproverRole, Artifact, ArtifactId, ArtifactKind, ArtifactStatus, Delegation, DelegationId,
    LogEntryId, OrganisationId, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory routing storage adapter.
#[derive(Default)]
pub struct InMemoryRoutingStorage {
    artifacts: RwLock<HashMap<ArtifactId, Artifact>>,
    workflows: RwLock<HashMap<(OrganisationId, ArtifactKind), ApprovalWorkflow>>,
    progress: RwLock<HashMap<ArtifactId, ApprovalProgress>>,
    delegations: RwLock<HashMap<DelegationId, Delegation>>,
    roles: RwLock<HashMap<(OrganisationId, UserId), ApproverRole>>,
    log: RwLock<Vec<ApprovalLogEntry>>,
}

impl InMemoryRoutingStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryRoutingStorage {
    async fn insert_artifact(&self, artifact: Artifact) -> StorageResult<()> {
        let mut guard = self
            .artifacts
            .write()
            .map_err(|_| StorageError::Backend("artifacts lock poisoned".to_string()))?;

        if guard.contains_key(&artifact.id) {
            return Err(StorageError::Conflict(format!(
                "artifact {} already exists",
                artifact.id
            )));
        }
        guard.insert(artifact.id.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, id: &ArtifactId) -> StorageResult<Option<Artifact>> {
        let guard = self
            .artifacts
            .read()
            .map_err(|_| StorageError::Backend("artifacts lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn transition_status(
        &self,
        id: &ArtifactId,
        expected_from: ArtifactStatus,
        to: ArtifactStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self
            .artifacts
            .write()
            .map_err(|_| StorageError::Backend("artifacts lock poisoned".to_string()))?;
        let artifact = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("artifact {} not found", id)))?;

        if artifact.status != expected_from {
            return Err(StorageError::Conflict(format!(
                "artifact {} status is {:?}, expected {:?}",
                id, artifact.status, expected_from
            )));
        }

        artifact.status = to;
        artifact.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryRoutingStorage {
    async fn upsert_workflow(&self, workflow: ApprovalWorkflow) -> StorageResult<()> {
        let mut guard = self
            .workflows
            .write()
            .map_err(|_| StorageError::Backend("workflows lock poisoned".to_string()))?;
        guard.insert(
            (workflow.organisation_id.clone(), workflow.kind),
            workflow,
        );
        Ok(())
    }

    async fn workflow_for(
        &self,
        organisation_id: &OrganisationId,
        kind: ArtifactKind,
    ) -> StorageResult<Option<ApprovalWorkflow>> {
        let guard = self
            .workflows
            .read()
            .map_err(|_| StorageError::Backend("workflows lock poisoned".to_string()))?;
        Ok(guard.get(&(organisation_id.clone(), kind)).cloned())
    }
}

#[async_trait]
impl ProgressStore for InMemoryRoutingStorage {
    async fn insert_progress(&self, progress: ApprovalProgress) -> StorageResult<()> {
        let mut guard = self
            .progress
            .write()
            .map_err(|_| StorageError::Backend("progress lock poisoned".to_string()))?;

        if guard.contains_key(&progress.artifact_id) {
            return Err(StorageError::Conflict(format!(
                "artifact {} already has approval progress",
                progress.artifact_id
            )));
        }
        guard.insert(progress.artifact_id.clone(), progress);
        Ok(())
    }

    async fn get_progress(
        &self,
        artifact_id: &ArtifactId,
    ) -> StorageResult<Option<ApprovalProgress>> {
        let guard = self
            .progress
            .read()
            .map_err(|_| StorageError::Backend("progress lock poisoned".to_string()))?;
        Ok(guard.get(artifact_id).cloned())
    }

    async fn transition_progress(
        &self,
        artifact_id: &ArtifactId,
        expected_step: u32,
        updated: ApprovalProgress,
    ) -> StorageResult<()> {
        let mut guard = self
            .progress
            .write()
            .map_err(|_| StorageError::Backend("progress lock poisoned".to_string()))?;
        let stored = guard.get_mut(artifact_id).ok_or_else(|| {
            StorageError::NotFound(format!("no approval progress for artifact {}", artifact_id))
        })?;

        if stored.status != ApprovalStatus::InProgress || stored.current_step != expected_step {
            return Err(StorageError::Conflict(format!(
                "approval progress for artifact {} moved on: status {:?}, step {}",
                artifact_id, stored.status, stored.current_step
            )));
        }

        *stored = updated;
        Ok(())
    }
}

#[async_trait]
impl DelegationStore for InMemoryRoutingStorage {
    async fn insert_delegation(&self, delegation: Delegation) -> StorageResult<()> {
        let mut guard = self
            .delegations
            .write()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;

        if guard.contains_key(&delegation.id) {
            return Err(StorageError::Conflict(format!(
                "delegation {} already exists",
                delegation.id
            )));
        }
        guard.insert(delegation.id.clone(), delegation);
        Ok(())
    }

    async fn get_delegation(&self, id: &DelegationId) -> StorageResult<Option<Delegation>> {
        let guard = self
            .delegations
            .read()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn delegations_for_delegator(
        &self,
        delegator: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Vec<Delegation>> {
        let guard = self
            .delegations
            .read()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|d| &d.delegator == delegator && &d.organisation_id == organisation_id)
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut values);
        Ok(values)
    }

    async fn delegations_for_delegate(
        &self,
        delegate: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Vec<Delegation>> {
        let guard = self
            .delegations
            .read()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|d| &d.delegate == delegate && &d.organisation_id == organisation_id)
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut values);
        Ok(values)
    }

    async fn expired_active(&self, now: DateTime<Utc>) -> StorageResult<Vec<Delegation>> {
        let guard = self
            .delegations
            .read()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|d| d.is_active && d.is_expired(now))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.ends_at.cmp(&b.ends_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(values)
    }

    async fn set_inactive(
        &self,
        id: &DelegationId,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self
            .delegations
            .write()
            .map_err(|_| StorageError::Backend("delegations lock poisoned".to_string()))?;
        let delegation = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("delegation {} not found", id)))?;

        if !delegation.is_active {
            return Ok(false);
        }
        delegation.is_active = false;
        delegation.updated_at = updated_at;
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for InMemoryRoutingStorage {
    async fn upsert_role(
        &self,
        user: &UserId,
        organisation_id: &OrganisationId,
        role: ApproverRole,
    ) -> StorageResult<()> {
        let mut guard = self
            .roles
            .write()
            .map_err(|_| StorageError::Backend("roles lock poisoned".to_string()))?;
        guard.insert((organisation_id.clone(), user.clone()), role);
        Ok(())
    }

    async fn role_of(
        &self,
        user: &UserId,
        organisation_id: &OrganisationId,
    ) -> StorageResult<Option<ApproverRole>> {
        let guard = self
            .roles
            .read()
            .map_err(|_| StorageError::Backend("roles lock poisoned".to_string()))?;
        Ok(guard
            .get(&(organisation_id.clone(), user.clone()))
            .copied())
    }
}

#[async_trait]
impl ApprovalLogStore for InMemoryRoutingStorage {
    async fn append_log(&self, entry: ApprovalLogAppend) -> StorageResult<ApprovalLogEntry> {
        let mut guard = self
            .log
            .write()
            .map_err(|_| StorageError::Backend("log lock poisoned".to_string()))?;

        let record = ApprovalLogEntry {
            id: LogEntryId::generate(),
            sequence: guard.len() as u64 + 1,
            artifact_id: entry.artifact_id,
            action: entry.action,
            actor: entry.actor,
            on_behalf_of: entry.on_behalf_of,
            comment: entry.comment,
            timestamp: entry.timestamp,
        };
        guard.push(record.clone());
        Ok(record)
    }

    async fn list_log(
        &self,
        artifact_id: &ArtifactId,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalLogEntry>> {
        let guard = self
            .log
            .read()
            .map_err(|_| StorageError::Backend("log lock poisoned".to_string()))?;
        let mut values = guard
            .iter()
            .filter(|e| &e.artifact_id == artifact_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(apply_window(values, window))
    }
}

fn sort_newest_first(delegations: &mut [Delegation]) {
    delegations.sort_by(|a, b| {
        b.starts_at
            .cmp(&a.starts_at)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.0.cmp(&b.id.0))
    });
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_types::{Amount, ApprovalAction};
    use chrono::Duration;

    fn artifact() -> Artifact {
        Artifact::new(
            ArtifactKind::PurchaseOrder,
            OrganisationId::new("org-1"),
            UserId::new("pm-1"),
            Amount::new(8_000),
        )
    }

    fn delegation(ends_at: Option<DateTime<Utc>>) -> Delegation {
        let mut d = Delegation::new(
            UserId::new("md-1"),
            UserId::new("standin-1"),
            OrganisationId::new("org-1"),
        );
        d.ends_at = ends_at;
        d
    }

    #[tokio::test]
    async fn test_transition_status_checks_expected_state() {
        let storage = InMemoryRoutingStorage::new();
        let a = artifact();
        let id = a.id.clone();
        storage.insert_artifact(a).await.unwrap();

        storage
            .transition_status(
                &id,
                ArtifactStatus::Draft,
                ArtifactStatus::PendingApproval,
                Utc::now(),
            )
            .await
            .unwrap();

        // Stale expectation loses
        let result = storage
            .transition_status(
                &id,
                ArtifactStatus::Draft,
                ArtifactStatus::Approved,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_status_missing_artifact() {
        let storage = InMemoryRoutingStorage::new();
        let result = storage
            .transition_status(
                &ArtifactId::new("ghost"),
                ArtifactStatus::Draft,
                ArtifactStatus::PendingApproval,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_progress_conflicts() {
        let storage = InMemoryRoutingStorage::new();
        let progress = ApprovalProgress::start(ArtifactId::new("po-1"), None, 2, Utc::now());

        storage.insert_progress(progress.clone()).await.unwrap();
        let result = storage.insert_progress(progress).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_progress_cas_loses_on_stale_step() {
        let storage = InMemoryRoutingStorage::new();
        let id = ArtifactId::new("po-1");
        let mut progress = ApprovalProgress::start(id.clone(), None, 2, Utc::now());
        storage.insert_progress(progress.clone()).await.unwrap();

        progress
            .record_step_approval(
                ApproverRole::ManagingDirector,
                UserId::new("md-1"),
                Utc::now(),
            )
            .unwrap();
        storage
            .transition_progress(&id, 1, progress.clone())
            .await
            .unwrap();

        // A second caller that read step 1 before the first write lands
        let result = storage.transition_progress(&id, 1, progress).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_set_inactive_is_idempotent() {
        let storage = InMemoryRoutingStorage::new();
        let d = delegation(Some(Utc::now() - Duration::hours(1)));
        let id = d.id.clone();
        storage.insert_delegation(d).await.unwrap();

        assert!(storage.set_inactive(&id, Utc::now()).await.unwrap());
        assert!(!storage.set_inactive(&id, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_active_filters() {
        let storage = InMemoryRoutingStorage::new();
        let now = Utc::now();

        let expired = delegation(Some(now - Duration::hours(1)));
        let expired_id = expired.id.clone();
        let current = delegation(Some(now + Duration::hours(1)));
        let indefinite = delegation(None);

        storage.insert_delegation(expired).await.unwrap();
        storage.insert_delegation(current).await.unwrap();
        storage.insert_delegation(indefinite).await.unwrap();

        let hits = storage.expired_active(now).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, expired_id);
    }

    #[tokio::test]
    async fn test_delegation_queries_sort_newest_first() {
        let storage = InMemoryRoutingStorage::new();
        let now = Utc::now();

        let older = delegation(None).with_starts_at(now - Duration::days(2));
        let newer = delegation(None).with_starts_at(now - Duration::days(1));
        let newer_id = newer.id.clone();

        storage.insert_delegation(older).await.unwrap();
        storage.insert_delegation(newer).await.unwrap();

        let hits = storage
            .delegations_for_delegator(&UserId::new("md-1"), &OrganisationId::new("org-1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, newer_id);

        let hits = storage
            .delegations_for_delegate(&UserId::new("standin-1"), &OrganisationId::new("org-1"))
            .await
            .unwrap();
        assert_eq!(hits[0].id, newer_id);
    }

    #[tokio::test]
    async fn test_log_is_append_only_and_newest_first() {
        let storage = InMemoryRoutingStorage::new();
        let id = ArtifactId::new("po-1");

        storage
            .append_log(ApprovalLogAppend::new(
                id.clone(),
                ApprovalAction::SentForApproval,
                UserId::new("pm-1"),
            ))
            .await
            .unwrap();
        let second = storage
            .append_log(ApprovalLogAppend::new(
                id.clone(),
                ApprovalAction::Approved,
                UserId::new("md-1"),
            ))
            .await
            .unwrap();
        assert_eq!(second.sequence, 2);

        let entries = storage.list_log(&id, QueryWindow::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, ApprovalAction::Approved);

        let windowed = storage
            .list_log(
                &id,
                QueryWindow {
                    limit: 1,
                    offset: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].action, ApprovalAction::SentForApproval);
    }

    #[tokio::test]
    async fn test_role_directory() {
        let storage = InMemoryRoutingStorage::new();
        let org = OrganisationId::new("org-1");
        let user = UserId::new("md-1");

        assert!(storage.role_of(&user, &org).await.unwrap().is_none());
        storage
            .upsert_role(&user, &org, ApproverRole::ManagingDirector)
            .await
            .unwrap();
        assert_eq!(
            storage.role_of(&user, &org).await.unwrap(),
            Some(ApproverRole::ManagingDirector)
        );
    }
}
