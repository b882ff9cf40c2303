//! Append-only approval audit log.
//!
//! One entry per routing action. Entries are never mutated or deleted;
//! the store assigns the id and a monotonically increasing sequence.

use crate::{ArtifactId, LogEntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The action a log entry records
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalAction {
    SentForApproval,
    Approved,
    Rejected,
    MarkedPaid,
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::SentForApproval => "sent for approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::MarkedPaid => "marked paid",
        };
        write!(f, "{}", label)
    }
}

/// An action to append to the audit log
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalLogAppend {
    /// Artifact the action applies to
    pub artifact_id: ArtifactId,
    /// What happened
    pub action: ApprovalAction,
    /// Who performed the action
    pub actor: UserId,
    /// Set when the actor's authority came from a delegation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<UserId>,
    /// Free-text comment (the rejection reason, for rejections)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
}

impl ApprovalLogAppend {
    pub fn new(artifact_id: ArtifactId, action: ApprovalAction, actor: UserId) -> Self {
        Self {
            artifact_id,
            action,
            actor,
            on_behalf_of: None,
            comment: None,
            timestamp: Utc::now(),
        }
    }

    pub fn on_behalf_of(mut self, delegator: UserId) -> Self {
        self.on_behalf_of = Some(delegator);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A stored audit log entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalLogEntry {
    /// Store-assigned identifier
    pub id: LogEntryId,
    /// Store-assigned, monotonically increasing
    pub sequence: u64,
    /// Artifact the action applies to
    pub artifact_id: ArtifactId,
    /// What happened
    pub action: ApprovalAction,
    /// Who performed the action
    pub actor: UserId,
    /// Set when the actor's authority came from a delegation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<UserId>,
    /// Free-text comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
}
