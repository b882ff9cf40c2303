//! Delegation registry: granting, resolving and revoking stand-in
//! authority.
//!
//! Resolution is time-based at the moment of the authority check: an
//! expired delegation grants nothing even before the sweeper has
//! deactivated the row. When several grants match, the most recently
//! started wins, deterministically.

use approvals_storage::DelegationStore;
use approvals_types::{
    Delegation, DelegationId, OrganisationId, RoutingError, RoutingResult, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How delegation creation treats an existing in-effect grant for the
/// same delegator.
///
/// The source behavior leaves overlap unchecked and resolves reads as
/// "latest wins"; stricter hosts can reject overlapping grants outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DelegationOverlapPolicy {
    /// No creation-time check; the most recently started grant wins
    #[default]
    LatestWins,
    /// Creating a second in-effect grant fails with a validation error
    RejectOverlap,
}

/// Registry of delegation grants for an organisation's approvers
pub struct DelegationRegistry<S> {
    storage: Arc<S>,
    policy: DelegationOverlapPolicy,
}

impl<S> Clone for DelegationRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            policy: self.policy,
        }
    }
}

impl<S: DelegationStore> DelegationRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            policy: DelegationOverlapPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DelegationOverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Grant a delegator's approval authority to a delegate, effective
    /// immediately, lapsing at `ends_at` (or indefinite when unset).
    pub async fn create(
        &self,
        delegator: UserId,
        delegate: UserId,
        organisation_id: OrganisationId,
        ends_at: Option<DateTime<Utc>>,
    ) -> RoutingResult<Delegation> {
        if delegator == delegate {
            return Err(RoutingError::Validation(format!(
                "user {} cannot delegate to themselves",
                delegator
            )));
        }
        let now = Utc::now();
        if let Some(ends_at) = ends_at {
            if ends_at <= now {
                return Err(RoutingError::Validation(
                    "delegation end time must be in the future".to_string(),
                ));
            }
        }

        if self.policy == DelegationOverlapPolicy::RejectOverlap {
            if let Some(existing) = self
                .active_delegation_for(&delegator, &organisation_id, now)
                .await?
            {
                return Err(RoutingError::Validation(format!(
                    "user {} already has an active delegation ({})",
                    delegator,
                    existing.id.short()
                )));
            }
        }

        let mut delegation = Delegation::new(delegator, delegate, organisation_id);
        if let Some(ends_at) = ends_at {
            delegation = delegation.with_ends_at(ends_at);
        }
        self.storage.insert_delegation(delegation.clone()).await?;

        tracing::info!(
            delegation_id = %delegation.id,
            delegator = %delegation.delegator,
            delegate = %delegation.delegate,
            "delegation created"
        );
        Ok(delegation)
    }

    /// The delegation conveying a delegator's authority at `at`, if any.
    /// Most recently started wins when several are in effect.
    pub async fn active_delegation_for(
        &self,
        delegator: &UserId,
        organisation_id: &OrganisationId,
        at: DateTime<Utc>,
    ) -> RoutingResult<Option<Delegation>> {
        let delegations = self
            .storage
            .delegations_for_delegator(delegator, organisation_id)
            .await?;
        // Store results come newest-first already; keep the first in effect
        Ok(delegations.into_iter().find(|d| d.is_in_effect(at)))
    }

    /// All delegations conveying authority *to* a delegate at `at`,
    /// newest first. Used to resolve a stand-in's acting authority.
    pub async fn active_delegations_to(
        &self,
        delegate: &UserId,
        organisation_id: &OrganisationId,
        at: DateTime<Utc>,
    ) -> RoutingResult<Vec<Delegation>> {
        let delegations = self
            .storage
            .delegations_for_delegate(delegate, organisation_id)
            .await?;
        Ok(delegations
            .into_iter()
            .filter(|d| d.is_in_effect(at))
            .collect())
    }

    /// Deactivate a grant. Idempotent: deactivating an already-inactive
    /// delegation succeeds as a no-op.
    pub async fn deactivate(&self, id: &DelegationId) -> RoutingResult<()> {
        let flipped = self.storage.set_inactive(id, Utc::now()).await?;
        if flipped {
            tracing::info!(delegation_id = %id, "delegation deactivated");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_storage::InMemoryRoutingStorage;
    use chrono::Duration;

    fn registry(policy: DelegationOverlapPolicy) -> DelegationRegistry<InMemoryRoutingStorage> {
        DelegationRegistry::new(Arc::new(InMemoryRoutingStorage::new())).with_policy(policy)
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let registry = registry(DelegationOverlapPolicy::LatestWins);
        let org = OrganisationId::new("org-1");

        let created = registry
            .create(
                UserId::new("md-1"),
                UserId::new("standin-1"),
                org.clone(),
                Some(Utc::now() + Duration::days(7)),
            )
            .await
            .unwrap();

        let resolved = registry
            .active_delegation_for(&UserId::new("md-1"), &org, Utc::now())
            .await
            .unwrap();
        assert_eq!(resolved.map(|d| d.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_self_delegation_rejected() {
        let registry = registry(DelegationOverlapPolicy::LatestWins);
        let err = registry
            .create(
                UserId::new("md-1"),
                UserId::new("md-1"),
                OrganisationId::new("org-1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_past_end_time_rejected() {
        let registry = registry(DelegationOverlapPolicy::LatestWins);
        let err = registry
            .create(
                UserId::new("md-1"),
                UserId::new("standin-1"),
                OrganisationId::new("org-1"),
                Some(Utc::now() - Duration::hours(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_latest_wins_resolution() {
        let storage = Arc::new(InMemoryRoutingStorage::new());
        let registry = DelegationRegistry::new(Arc::clone(&storage));
        let org = OrganisationId::new("org-1");
        let now = Utc::now();

        let older = Delegation::new(
            UserId::new("md-1"),
            UserId::new("standin-1"),
            org.clone(),
        )
        .with_starts_at(now - Duration::days(2));
        storage.insert_delegation(older).await.unwrap();

        let newer = Delegation::new(
            UserId::new("md-1"),
            UserId::new("standin-2"),
            org.clone(),
        )
        .with_starts_at(now - Duration::days(1));
        let newer_id = newer.id.clone();
        storage.insert_delegation(newer).await.unwrap();

        let resolved = registry
            .active_delegation_for(&UserId::new("md-1"), &org, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, newer_id);
    }

    #[tokio::test]
    async fn test_reject_overlap_policy() {
        let registry = registry(DelegationOverlapPolicy::RejectOverlap);
        let org = OrganisationId::new("org-1");

        registry
            .create(
                UserId::new("md-1"),
                UserId::new("standin-1"),
                org.clone(),
                None,
            )
            .await
            .unwrap();

        let err = registry
            .create(
                UserId::new("md-1"),
                UserId::new("standin-2"),
                org.clone(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));

        // A different delegator is unaffected
        registry
            .create(
                UserId::new("ceo-1"),
                UserId::new("standin-2"),
                org,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_delegation_not_resolved() {
        let storage = Arc::new(InMemoryRoutingStorage::new());
        let registry = DelegationRegistry::new(Arc::clone(&storage));
        let org = OrganisationId::new("org-1");
        let now = Utc::now();

        let lapsed = Delegation::new(
            UserId::new("md-1"),
            UserId::new("standin-1"),
            org.clone(),
        )
        .with_starts_at(now - Duration::days(2))
        .with_ends_at(now - Duration::hours(1));
        storage.insert_delegation(lapsed).await.unwrap();

        // Still active in storage, but past its end: conveys nothing
        let resolved = registry
            .active_delegation_for(&UserId::new("md-1"), &org, now)
            .await
            .unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let registry = registry(DelegationOverlapPolicy::LatestWins);
        let org = OrganisationId::new("org-1");

        let d = registry
            .create(UserId::new("md-1"), UserId::new("standin-1"), org, None)
            .await
            .unwrap();

        registry.deactivate(&d.id).await.unwrap();
        registry.deactivate(&d.id).await.unwrap();
    }
}
