//! Approval routing engine for purchase orders and invoices.
//!
//! Given a monetary amount and an artifact kind, the engine decides which
//! sequence of human approval steps must occur before the artifact becomes
//! payable, tracks that sequence as a per-artifact state machine, resolves
//! acting authority (direct role or time-bounded delegation), and expires
//! lapsed delegations on a schedule.
//!
//! # Key Principle
//!
//! **The approval state is authoritative; side effects follow it.**
//!
//! Every state transition commits through a conditional update before any
//! notification, email, or document request is issued. A failed side
//! effect is logged and never rolls the transition back.
//!
//! # Architecture
//!
//! The [`RoutingCoordinator`] composes specialized components:
//!
//! - [`thresholds`] — Pure step planning from amounts and thresholds
//! - [`DelegationRegistry`] — Creates, resolves and deactivates delegations
//! - [`DelegationExpirySweeper`] — Scheduled expiry of lapsed delegations
//! - [`dispatch`] — Contracts for the notification, email and document
//!   collaborators
//!
//! # Example
//!
//! ```rust
//! use approvals_engine::thresholds::applicable_steps;
//! use approvals_types::{Amount, ApproverRole, FallbackThresholds};
//!
//! let fallback = FallbackThresholds::new()
//!     .with_auto_approve_below(Amount::new(5_000))
//!     .with_ceo_above(Amount::new(15_000));
//!
//! // Below the auto-approve threshold: no steps at all
//! assert!(applicable_steps(Amount::new(3_000), None, &fallback).is_empty());
//!
//! // Above the CEO threshold: Managing Director first, then CEO
//! let steps = applicable_steps(Amount::new(20_000), None, &fallback);
//! let roles: Vec<ApproverRole> = steps.iter().map(|s| s.role).collect();
//! assert_eq!(
//!     roles,
//!     vec![ApproverRole::ManagingDirector, ApproverRole::ChiefExecutive]
//! );
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod delegation;
pub mod dispatch;
pub mod sweeper;
pub mod thresholds;

pub use config::RoutingConfig;
pub use coordinator::{ApproveOutcome, RoutingCoordinator, SubmitOutcome};
pub use delegation::{DelegationOverlapPolicy, DelegationRegistry};
pub use dispatch::{
    DispatchError, DispatchResult, DocumentGenerator, EmailDispatcher, EmailRequest,
    EmailTemplate, Notification, NotificationDispatcher, NotificationKind, NotificationTarget,
};
pub use sweeper::{DelegationExpirySweeper, SweepReport};
