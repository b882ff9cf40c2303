//! Delegation expiry sweeper.
//!
//! Runs on an external scheduler trigger. Each run queries active
//! delegations whose end time has passed, deactivates them, and sends one
//! in-app notification plus one transactional email per actual flip. The
//! `set_inactive` boolean is the idempotence gate: a row already flipped
//! by a concurrent or earlier run produces no second notification, so
//! running the sweep twice in quick succession is safe.
//!
//! Authority resolution does not depend on this job: an expired
//! delegation grants nothing from its end time onward regardless of when
//! the sweep next runs. The sweep exists to settle the durable rows and
//! tell the delegate their stand-in authority has lapsed.

use crate::dispatch::{
    EmailDispatcher, EmailRequest, EmailTemplate, Notification, NotificationDispatcher,
    NotificationKind, NotificationTarget, NoopEmailDispatcher, NoopNotificationDispatcher,
};
use approvals_storage::DelegationStore;
use approvals_types::{Delegation, RoutingResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of one sweep run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired-and-active rows the query returned
    pub examined: usize,
    /// Rows this run actually flipped to inactive
    pub deactivated: usize,
    /// Notifications or emails that failed to dispatch
    pub notify_failures: usize,
}

/// Scheduled job that deactivates lapsed delegations
pub struct DelegationExpirySweeper<S> {
    storage: Arc<S>,
    notifier: Arc<dyn NotificationDispatcher>,
    mailer: Arc<dyn EmailDispatcher>,
}

impl<S: DelegationStore> DelegationExpirySweeper<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            notifier: Arc::new(NoopNotificationDispatcher),
            mailer: Arc::new(NoopEmailDispatcher),
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

    /// One sweep: deactivate every delegation whose `ends_at` has passed
    /// at `now`, notifying each delegate once per actual deactivation.
    pub async fn run(&self, now: DateTime<Utc>) -> RoutingResult<SweepReport> {
        let expired = self.storage.expired_active(now).await?;
        let mut report = SweepReport {
            examined: expired.len(),
            ..SweepReport::default()
        };

        for delegation in expired {
            match self.storage.set_inactive(&delegation.id, now).await {
                Ok(true) => {
                    report.deactivated += 1;
                    report.notify_failures += self.notify_expiry(&delegation).await;
                }
                // Another run flipped it first; nothing left to do
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(
                        delegation_id = %delegation.id,
                        %error,
                        "failed to deactivate expired delegation"
                    );
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            deactivated = report.deactivated,
            "delegation expiry sweep complete"
        );
        Ok(report)
    }

    /// Best-effort notification pair for one deactivated delegation.
    /// Returns the number of dispatch failures; failures are logged, not
    /// retried within the run, and never undo the deactivation.
    async fn notify_expiry(&self, delegation: &Delegation) -> usize {
        let mut failures = 0;

        let notification = Notification::new(
            NotificationTarget::User(delegation.delegate.clone()),
            delegation.organisation_id.clone(),
            NotificationKind::DelegationExpired,
            "Delegation expired",
            format!(
                "Your approval authority on behalf of {} has expired",
                delegation.delegator
            ),
        );
        if let Err(error) = self.notifier.notify(notification).await {
            failures += 1;
            tracing::warn!(
                delegation_id = %delegation.id,
                %error,
                "delegation expiry notification failed"
            );
        }

        let email = EmailRequest {
            template: EmailTemplate::DelegationExpired,
            payload: serde_json::json!({
                "delegation_id": delegation.id,
                "delegator": delegation.delegator,
                "delegate": delegation.delegate,
                "ended_at": delegation.ends_at,
            }),
        };
        if let Err(error) = self.mailer.send(email).await {
            failures += 1;
            tracing::warn!(
                delegation_id = %delegation.id,
                %error,
                "delegation expiry email failed"
            );
        }

        failures
    }
}
