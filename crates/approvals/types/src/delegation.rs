//! Time-bounded authority delegation.
//!
//! A delegation lets a stand-in approve on a delegator's behalf between
//! `starts_at` and `ends_at`. Expiry is evaluated against the instant of
//! the authority check; a delegation past its end grants nothing even if
//! no sweep has deactivated it yet. Rows are never deleted, only
//! deactivated, and are retained for audit.

use crate::{DelegationId, OrganisationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grant of one user's approval authority to another
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Unique identifier
    pub id: DelegationId,
    /// The approver granting authority
    pub delegator: UserId,
    /// The stand-in receiving authority
    pub delegate: UserId,
    /// Organisation the grant is scoped to
    pub organisation_id: OrganisationId,
    /// When the grant takes effect
    pub starts_at: DateTime<Utc>,
    /// When the grant lapses; unset means indefinite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// False once deactivated (explicitly or by the expiry sweep)
    pub is_active: bool,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl Delegation {
    /// Create a delegation effective immediately and indefinitely
    pub fn new(delegator: UserId, delegate: UserId, organisation_id: OrganisationId) -> Self {
        let now = Utc::now();
        Self {
            id: DelegationId::generate(),
            delegator,
            delegate,
            organisation_id,
            starts_at: now,
            ends_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = starts_at;
        self
    }

    pub fn with_ends_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    /// Whether the grant conveys authority at `at`
    pub fn is_in_effect(&self, at: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at <= at
            && match self.ends_at {
                Some(ends_at) => ends_at > at,
                None => true,
            }
    }

    /// Whether the grant's end time has passed at `at`
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        match self.ends_at {
            Some(ends_at) => ends_at < at,
            None => false,
        }
    }

    /// Deactivate the grant. Idempotent.
    pub fn deactivate(&mut self, at: DateTime<Utc>) {
        if self.is_active {
            self.is_active = false;
            self.updated_at = at;
        }
    }
}
