//! Workflow step definitions and fallback thresholds.
//!
//! An organisation either configures a custom workflow (an ordered,
//! non-empty sequence of steps) per artifact kind, or relies on two scalar
//! thresholds from which the evaluator synthesizes the step plan.

use crate::{Amount, ApproverRole, ArtifactKind, OrganisationId, RoutingError, RoutingResult, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Workflow Step ────────────────────────────────────────────────────

/// A single approval gate within a custom workflow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Position within the workflow, 1-based, unique and contiguous
    pub step_order: u32,
    /// Role that must approve this step
    pub role: ApproverRole,
    /// Step is omitted when the artifact amount is strictly below this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_if_below: Option<Amount>,
    /// Lower bound of the amount band (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Amount>,
    /// Upper bound of the amount band (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Amount>,
    /// Carried as configuration data; does not alter applicability
    pub is_required: bool,
}

impl WorkflowStep {
    pub fn new(step_order: u32, role: ApproverRole) -> Self {
        Self {
            step_order,
            role,
            skip_if_below: None,
            min_amount: None,
            max_amount: None,
            is_required: true,
        }
    }

    pub fn with_skip_below(mut self, amount: Amount) -> Self {
        self.skip_if_below = Some(amount);
        self
    }

    pub fn with_min_amount(mut self, amount: Amount) -> Self {
        self.min_amount = Some(amount);
        self
    }

    pub fn with_max_amount(mut self, amount: Amount) -> Self {
        self.max_amount = Some(amount);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    /// A step applies iff the amount sits inside its band and is not
    /// strictly below its skip threshold.
    pub fn applies_to(&self, amount: Amount) -> bool {
        if let Some(min) = self.min_amount {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return false;
            }
        }
        if let Some(skip) = self.skip_if_below {
            if amount < skip {
                return false;
            }
        }
        true
    }
}

// ── Approval Workflow ────────────────────────────────────────────────

/// A custom approval workflow for one organisation and artifact kind
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    /// Unique identifier
    pub id: WorkflowId,
    /// Owning organisation
    pub organisation_id: OrganisationId,
    /// Artifact kind this workflow routes
    pub kind: ArtifactKind,
    /// Human-readable name
    pub name: String,
    /// Ordered approval steps
    pub steps: Vec<WorkflowStep>,
    /// When this workflow was created
    pub created_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    pub fn new(
        organisation_id: OrganisationId,
        kind: ArtifactKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: WorkflowId::generate(),
            organisation_id,
            kind,
            name: name.into(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Add a step. Duplicate `step_order` values are rejected immediately;
    /// contiguity is checked by `validate`.
    pub fn add_step(&mut self, step: WorkflowStep) -> RoutingResult<()> {
        if self.steps.iter().any(|s| s.step_order == step.step_order) {
            return Err(RoutingError::Validation(format!(
                "duplicate step_order {} in workflow {}",
                step.step_order, self.id
            )));
        }
        if !step.role.can_approve() {
            return Err(RoutingError::Validation(format!(
                "role {} cannot sit on an approval step",
                step.role
            )));
        }
        self.steps.push(step);
        self.steps.sort_by_key(|s| s.step_order);
        Ok(())
    }

    /// Validate the workflow: non-empty, with unique contiguous
    /// `step_order` values starting at 1.
    pub fn validate(&self) -> RoutingResult<()> {
        if self.steps.is_empty() {
            return Err(RoutingError::Validation(format!(
                "workflow {} has no steps",
                self.id
            )));
        }
        let orders: HashSet<u32> = self.steps.iter().map(|s| s.step_order).collect();
        if orders.len() != self.steps.len() {
            return Err(RoutingError::Validation(format!(
                "workflow {} has duplicate step orders",
                self.id
            )));
        }
        for expected in 1..=self.steps.len() as u32 {
            if !orders.contains(&expected) {
                return Err(RoutingError::Validation(format!(
                    "workflow {} step orders are not contiguous: missing {}",
                    self.id, expected
                )));
            }
        }
        Ok(())
    }

    /// Steps in ascending `step_order`
    pub fn steps_in_order(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }
}

// ── Fallback Thresholds ──────────────────────────────────────────────

/// Scalar thresholds used when no custom workflow is configured.
///
/// `auto_approve_below` unset means "no auto-approval"; `ceo_above` unset
/// means "never requires CEO". A misconfigured pair (auto ≥ ceo) is applied
/// literally by the evaluator, never reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FallbackThresholds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve_below: Option<Amount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceo_above: Option<Amount>,
}

impl FallbackThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_approve_below(mut self, amount: Amount) -> Self {
        self.auto_approve_below = Some(amount);
        self
    }

    pub fn with_ceo_above(mut self, amount: Amount) -> Self {
        self.ceo_above = Some(amount);
        self
    }
}
