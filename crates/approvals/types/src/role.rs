//! Approver roles.
//!
//! The role set is closed. Only Managing Director, CEO and Admin act as
//! approvers; Property Managers originate artifacts and Accounts handles
//! payment, but neither sits on an approval step.

use serde::{Deserialize, Serialize};

/// Role held by a user within an organisation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApproverRole {
    /// Originates purchase orders and invoices
    PropertyManager,
    /// First approval gate for most amounts
    ManagingDirector,
    /// Final approval gate for large amounts
    ChiefExecutive,
    /// Administrative override approver
    Admin,
    /// Payment handling; notified on completion, never an approval gate
    Accounts,
}

impl ApproverRole {
    /// Whether this role can sit on an approval step
    pub fn can_approve(&self) -> bool {
        matches!(
            self,
            Self::ManagingDirector | Self::ChiefExecutive | Self::Admin
        )
    }

    /// Whether this role can record an invoice as paid
    pub fn can_mark_paid(&self) -> bool {
        matches!(self, Self::Accounts | Self::Admin)
    }
}

impl std::fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PropertyManager => "Property Manager",
            Self::ManagingDirector => "Managing Director",
            Self::ChiefExecutive => "CEO",
            Self::Admin => "Admin",
            Self::Accounts => "Accounts",
        };
        write!(f, "{}", label)
    }
}
