//! Threshold evaluation: amount in, ordered step plan out.
//!
//! This is a pure function. It is called identically at plan time
//! (submission) and at action time (approve/reject), so the two sites can
//! never disagree about which steps an amount requires. Threshold
//! comparisons are literal: a misconfigured pair (auto-approve at or
//! above the CEO threshold) is applied as written, not reconciled.

use approvals_types::{Amount, ApprovalWorkflow, ApproverRole, FallbackThresholds, WorkflowStep};

/// Compute the ordered list of approval steps an amount requires.
///
/// With a custom workflow, its steps are filtered to those applicable to
/// the amount, ascending `step_order` preserved. Without one, steps are
/// synthesized from the fallback thresholds: below `auto_approve_below`
/// no steps at all, otherwise a Managing Director step, plus a CEO step
/// when the amount is strictly above `ceo_above`.
///
/// An empty result means the artifact is auto-approved.
pub fn applicable_steps(
    amount: Amount,
    workflow: Option<&ApprovalWorkflow>,
    fallback: &FallbackThresholds,
) -> Vec<WorkflowStep> {
    match workflow {
        Some(workflow) => {
            let mut steps: Vec<WorkflowStep> = workflow
                .steps
                .iter()
                .filter(|step| step.applies_to(amount))
                .cloned()
                .collect();
            steps.sort_by_key(|step| step.step_order);
            steps
        }
        None => synthesize(amount, fallback),
    }
}

/// Whether the plan involves the CEO
pub fn requires_ceo(steps: &[WorkflowStep]) -> bool {
    steps
        .iter()
        .any(|step| step.role == ApproverRole::ChiefExecutive)
}

fn synthesize(amount: Amount, fallback: &FallbackThresholds) -> Vec<WorkflowStep> {
    if let Some(auto_below) = fallback.auto_approve_below {
        if amount < auto_below {
            return Vec::new();
        }
    }

    let mut steps = vec![WorkflowStep::new(1, ApproverRole::ManagingDirector)];
    if let Some(ceo_above) = fallback.ceo_above {
        if amount > ceo_above {
            steps.push(WorkflowStep::new(2, ApproverRole::ChiefExecutive));
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvals_types::{ArtifactKind, OrganisationId};
    use proptest::prelude::*;

    fn fallback() -> FallbackThresholds {
        FallbackThresholds::new()
            .with_auto_approve_below(Amount::new(5_000))
            .with_ceo_above(Amount::new(15_000))
    }

    #[test]
    fn test_scenario_grid() {
        // auto_approve_below = 5_000, ceo_above = 15_000
        let fb = fallback();

        assert!(applicable_steps(Amount::new(3_000), None, &fb).is_empty());

        let one = applicable_steps(Amount::new(8_000), None, &fb);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].role, ApproverRole::ManagingDirector);

        let two = applicable_steps(Amount::new(20_000), None, &fb);
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].role, ApproverRole::ManagingDirector);
        assert_eq!(two[1].role, ApproverRole::ChiefExecutive);
        assert!(requires_ceo(&two));
    }

    #[test]
    fn test_thresholds_are_boundary_exact() {
        let fb = fallback();

        // At the auto-approve threshold: MD step required
        let at_auto = applicable_steps(Amount::new(5_000), None, &fb);
        assert_eq!(at_auto.len(), 1);

        // At the CEO threshold: not strictly above, no CEO step
        let at_ceo = applicable_steps(Amount::new(15_000), None, &fb);
        assert_eq!(at_ceo.len(), 1);
        assert!(!requires_ceo(&at_ceo));

        let above_ceo = applicable_steps(Amount::new(15_001), None, &fb);
        assert_eq!(above_ceo.len(), 2);
    }

    #[test]
    fn test_unset_thresholds() {
        // No auto-approval: even tiny amounts need the MD
        let no_auto = FallbackThresholds::new().with_ceo_above(Amount::new(15_000));
        let steps = applicable_steps(Amount::new(1), None, &no_auto);
        assert_eq!(steps.len(), 1);

        // No CEO threshold: never requires the CEO
        let no_ceo = FallbackThresholds::new().with_auto_approve_below(Amount::new(5_000));
        let steps = applicable_steps(Amount::new(u64::MAX), None, &no_ceo);
        assert_eq!(steps.len(), 1);
        assert!(!requires_ceo(&steps));
    }

    #[test]
    fn test_misconfigured_thresholds_apply_literally() {
        // auto_approve_below above ceo_above: the auto-approve comparison
        // wins for anything below it, exactly as written
        let inverted = FallbackThresholds::new()
            .with_auto_approve_below(Amount::new(20_000))
            .with_ceo_above(Amount::new(15_000));

        assert!(applicable_steps(Amount::new(18_000), None, &inverted).is_empty());

        let steps = applicable_steps(Amount::new(25_000), None, &inverted);
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_custom_workflow_filters_and_orders() {
        let mut wf = ApprovalWorkflow::new(
            OrganisationId::new("org-1"),
            ArtifactKind::PurchaseOrder,
            "PO approvals",
        );
        wf.add_step(
            WorkflowStep::new(2, ApproverRole::ChiefExecutive).with_skip_below(Amount::new(10_000)),
        )
        .unwrap();
        wf.add_step(WorkflowStep::new(1, ApproverRole::ManagingDirector))
            .unwrap();
        wf.validate().unwrap();

        // Below the CEO step's skip threshold: MD only
        let steps = applicable_steps(Amount::new(4_000), Some(&wf), &FallbackThresholds::new());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].role, ApproverRole::ManagingDirector);

        // At the skip threshold: both, MD first
        let steps = applicable_steps(Amount::new(10_000), Some(&wf), &FallbackThresholds::new());
        assert_eq!(
            steps.iter().map(|s| s.role).collect::<Vec<_>>(),
            vec![ApproverRole::ManagingDirector, ApproverRole::ChiefExecutive]
        );
    }

    #[test]
    fn test_custom_workflow_can_yield_no_steps() {
        let mut wf = ApprovalWorkflow::new(
            OrganisationId::new("org-1"),
            ArtifactKind::Invoice,
            "Invoice approvals",
        );
        wf.add_step(
            WorkflowStep::new(1, ApproverRole::ManagingDirector)
                .with_min_amount(Amount::new(1_000)),
        )
        .unwrap();

        let steps = applicable_steps(Amount::new(500), Some(&wf), &fallback());
        assert!(steps.is_empty());
    }

    proptest! {
        #[test]
        fn property_below_auto_threshold_needs_no_steps(amount in 0u64..5_000) {
            let steps = applicable_steps(Amount::new(amount), None, &fallback());
            prop_assert!(steps.is_empty());
        }

        #[test]
        fn property_above_ceo_threshold_ends_with_ceo(amount in 15_001u64..10_000_000) {
            let steps = applicable_steps(Amount::new(amount), None, &fallback());
            prop_assert_eq!(steps.len(), 2);
            prop_assert_eq!(steps[0].role, ApproverRole::ManagingDirector);
            prop_assert_eq!(steps[1].role, ApproverRole::ChiefExecutive);
        }

        #[test]
        fn property_plan_is_deterministic(amount in 0u64..10_000_000) {
            let first = applicable_steps(Amount::new(amount), None, &fallback());
            let second = applicable_steps(Amount::new(amount), None, &fallback());
            prop_assert_eq!(first, second);
        }
    }
}
