//! Contracts for the engine's side-effect collaborators.
//!
//! Notifications, emails and document generation are fire-and-forget: the
//! coordinator issues the request after the authoritative state commit and
//! logs a failure without rolling anything back. Template content, email
//! delivery and PDF rendering all live outside this engine.

use approvals_types::{ApproverRole, ArtifactId, OrganisationId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Side-effect dispatch errors. Logged by the caller, never fatal to a
/// routing operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch failed: {0}")]
    Failed(String),

    #[error("no dispatcher configured: {0}")]
    Unavailable(String),
}

// ── Notifications ────────────────────────────────────────────────────

/// Who an in-app notification is addressed to. Role targets are fanned
/// out to the role's members by the collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTarget {
    User(UserId),
    Role(ApproverRole),
}

/// Category of an in-app notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    ApprovalRequested,
    ApprovalCompleted,
    ApprovalRejected,
    DelegationExpired,
    PaymentRecorded,
}

/// An in-app notification request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub target: NotificationTarget,
    pub organisation_id: OrganisationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Notification {
    pub fn new(
        target: NotificationTarget,
        organisation_id: OrganisationId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            organisation_id,
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// In-app notification collaborator. Fire-and-forget.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> DispatchResult<()>;
}

// ── Email ────────────────────────────────────────────────────────────

/// Which transactional template the email collaborator should render
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailTemplate {
    ApprovalCompleted,
    DelegationExpired,
}

/// A transactional email request. The payload shape is owned by the
/// template; the engine only forwards structured data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailRequest {
    pub template: EmailTemplate,
    pub payload: serde_json::Value,
}

/// Transactional email collaborator. Fire-and-forget.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, request: EmailRequest) -> DispatchResult<()>;
}

// ── Documents ────────────────────────────────────────────────────────

/// Durable document collaborator, invoked only on final approval
/// completion. Returns the stored path.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn render_and_store(&self, artifact_id: &ArtifactId) -> DispatchResult<String>;
}

// ── Defaults ─────────────────────────────────────────────────────────

/// Drops notifications silently. For hosts that wire a collaborator later.
pub struct NoopNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopNotificationDispatcher {
    async fn notify(&self, _notification: Notification) -> DispatchResult<()> {
        Ok(())
    }
}

/// Drops emails silently.
pub struct NoopEmailDispatcher;

#[async_trait]
impl EmailDispatcher for NoopEmailDispatcher {
    async fn send(&self, _request: EmailRequest) -> DispatchResult<()> {
        Ok(())
    }
}

/// Always unavailable. A missing document generator is a real failure
/// worth surfacing in the logs, unlike a dropped notification.
pub struct NoopDocumentGenerator;

#[async_trait]
impl DocumentGenerator for NoopDocumentGenerator {
    async fn render_and_store(&self, _artifact_id: &ArtifactId) -> DispatchResult<String> {
        Err(DispatchError::Unavailable(
            "no document generator configured".to_string(),
        ))
    }
}
