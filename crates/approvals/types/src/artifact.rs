//! Artifacts under approval: purchase orders and invoices.
//!
//! The engine owns artifact status transitions exclusively through the
//! conditional-update path in the storage layer. The amount is frozen once
//! the artifact is submitted; later edits never replan an in-flight
//! approval.

use crate::{Amount, ArtifactId, OrganisationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of artifact subject to approval routing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    PurchaseOrder,
    Invoice,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PurchaseOrder => "purchase order",
            Self::Invoice => "invoice",
        };
        write!(f, "{}", label)
    }
}

/// Lifecycle status of an artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArtifactStatus {
    /// Created, not yet submitted for approval
    #[default]
    Draft,
    /// Submitted; awaiting a non-CEO approval step
    PendingApproval,
    /// Awaiting the CEO step
    PendingCeoApproval,
    /// All applicable steps approved
    Approved,
    /// Rejected by an approver
    Rejected,
    /// Invoice recorded as paid (invoices only, from Approved)
    Paid,
}

impl ArtifactStatus {
    /// Terminal statuses admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Paid)
    }

    /// Whether the artifact is awaiting an approval action
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingApproval | Self::PendingCeoApproval)
    }
}

/// A purchase order or invoice row, as the engine sees it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique artifact identifier
    pub id: ArtifactId,
    /// Purchase order or invoice
    pub kind: ArtifactKind,
    /// Owning organisation
    pub organisation_id: OrganisationId,
    /// Who created the artifact
    pub originator: UserId,
    /// Monetary amount; frozen once submitted
    pub amount: Amount,
    /// Current lifecycle status
    pub status: ArtifactStatus,
    /// When the artifact was created
    pub created_at: DateTime<Utc>,
    /// When the artifact was last updated
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        kind: ArtifactKind,
        organisation_id: OrganisationId,
        originator: UserId,
        amount: Amount,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ArtifactId::generate(),
            kind,
            organisation_id,
            originator,
            amount,
            status: ArtifactStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: ArtifactId) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_artifact_is_draft() {
        let artifact = Artifact::new(
            ArtifactKind::PurchaseOrder,
            OrganisationId::new("org-1"),
            UserId::new("pm-1"),
            Amount::new(8_000),
        );
        assert_eq!(artifact.status, ArtifactStatus::Draft);
        assert!(!artifact.status.is_terminal());
    }

    #[test]
    fn test_status_predicates() {
        assert!(ArtifactStatus::PendingApproval.is_pending());
        assert!(ArtifactStatus::PendingCeoApproval.is_pending());
        assert!(!ArtifactStatus::Approved.is_pending());
        assert!(ArtifactStatus::Rejected.is_terminal());
        assert!(ArtifactStatus::Paid.is_terminal());
        assert!(!ArtifactStatus::Approved.is_terminal());
    }
}
