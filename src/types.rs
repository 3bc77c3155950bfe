//! Domain records for bounties, budgets, requests, proofs, transactions and
//! the activity log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// STATUS ENUMS
// ============================================================================

/// Generates `as_str`, `Display` and `FromStr` for a status enum whose
/// persisted form is its SCREAMING_SNAKE name.
macro_rules! status_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BountyStatus {
    Draft,
    Open,
    Assigned,
    InReview,
    Completed,
    Paid,
    Cancelled,
}

status_enum!(BountyStatus {
    Draft => "DRAFT",
    Open => "OPEN",
    Assigned => "ASSIGNED",
    InReview => "IN_REVIEW",
    Completed => "COMPLETED",
    Paid => "PAID",
    Cancelled => "CANCELLED",
});

impl BountyStatus {
    /// Whether the bounty amount is currently held in the reserved bucket.
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            BountyStatus::Open
                | BountyStatus::Assigned
                | BountyStatus::InReview
                | BountyStatus::Completed
        )
    }

    /// Title, description, tags and amount may still be edited.
    pub fn is_editable(&self) -> bool {
        !matches!(
            self,
            BountyStatus::Completed | BountyStatus::Paid | BountyStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

status_enum!(RequestStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProofStatus {
    Pending,
    Accepted,
    Rejected,
}

status_enum!(ProofStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Payment,
}

status_enum!(TransactionType {
    Deposit => "DEPOSIT",
    Payment => "PAYMENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

status_enum!(TransactionStatus {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

/// Audit log action tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Created,
    Updated,
    Published,
    Assigned,
    Unassigned,
    Claimed,
    Unclaimed,
    RequestCreated,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
    ProofSubmitted,
    ProofAccepted,
    ProofRejected,
    ProofDeleted,
    Completed,
    Cancelled,
    Deleted,
    BudgetDeposited,
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
}

status_enum!(ActivityAction {
    Created => "CREATED",
    Updated => "UPDATED",
    Published => "PUBLISHED",
    Assigned => "ASSIGNED",
    Unassigned => "UNASSIGNED",
    Claimed => "CLAIMED",
    Unclaimed => "UNCLAIMED",
    RequestCreated => "REQUEST_CREATED",
    RequestApproved => "REQUEST_APPROVED",
    RequestRejected => "REQUEST_REJECTED",
    RequestCancelled => "REQUEST_CANCELLED",
    ProofSubmitted => "PROOF_SUBMITTED",
    ProofAccepted => "PROOF_ACCEPTED",
    ProofRejected => "PROOF_REJECTED",
    ProofDeleted => "PROOF_DELETED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Deleted => "DELETED",
    BudgetDeposited => "BUDGET_DEPOSITED",
    PaymentInitiated => "PAYMENT_INITIATED",
    PaymentCompleted => "PAYMENT_COMPLETED",
    PaymentFailed => "PAYMENT_FAILED",
});

// ============================================================================
// RECORDS
// ============================================================================

/// Who currently holds a bounty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Assignment {
    Unassigned,
    Assigned {
        assignee: String,
        since: DateTime<Utc>,
    },
}

impl Assignment {
    pub fn assignee(&self) -> Option<&str> {
        match self {
            Assignment::Unassigned => None,
            Assignment::Assigned { assignee, .. } => Some(assignee),
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignment::Assigned { .. })
    }

    pub fn is_held_by(&self, pubkey: &str) -> bool {
        self.assignee() == Some(pubkey)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub creator: String,
    pub title: String,
    pub description: Option<String>,
    /// Smallest currency unit.
    pub amount: u64,
    pub status: BountyStatus,
    pub assignment: Assignment,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Bounty {
    pub fn assignee(&self) -> Option<&str> {
        self.assignment.assignee()
    }
}

/// One budget ledger per workspace.
///
/// `total == available + reserved + paid` holds after every committed
/// mutation; see [`crate::ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceBudget {
    pub workspace_id: Uuid,
    pub total: u64,
    pub available: u64,
    pub reserved: u64,
    pub paid: u64,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceBudget {
    pub fn empty(workspace_id: Uuid) -> Self {
        Self {
            workspace_id,
            total: 0,
            available: 0,
            reserved: 0,
            paid: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyRequest {
    pub id: Uuid,
    pub bounty_id: Uuid,
    pub requester: String,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub reviewer: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyProof {
    pub id: Uuid,
    pub bounty_id: Uuid,
    pub submitter: String,
    pub url: String,
    pub description: String,
    pub status: ProofStatus,
    pub reviewer: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub bounty_id: Option<Uuid>,
    pub kind: TransactionType,
    pub amount: u64,
    pub status: TransactionStatus,
    /// Actor who funded or released the money.
    pub from_pubkey: Option<String>,
    /// Recipient of a payment.
    pub to_pubkey: Option<String>,
    pub memo: Option<String>,
    pub external_ref: Option<String>,
    pub proof_of_payment: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountyActivity {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// Absent for workspace-level events such as deposits.
    pub bounty_id: Option<Uuid>,
    pub actor: String,
    pub action: ActivityAction,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// OPERATION INPUTS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewBounty {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// DRAFT or OPEN; OPEN reserves the amount immediately.
    #[serde(default = "default_initial_status")]
    pub status: BountyStatus,
}

fn default_initial_status() -> BountyStatus {
    BountyStatus::Open
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BountyPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl BountyPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    #[serde(alias = "accept")]
    Approve,
    Reject,
}

/// Settlement detail reported back by whoever executed the payment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentDetail {
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub proof_of_payment: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_text() {
        for status in BountyStatus::ALL {
            assert_eq!(status.as_str().parse::<BountyStatus>(), Ok(*status));
        }
        assert!("open".parse::<BountyStatus>().is_err());
    }

    #[test]
    fn test_reservation_states() {
        assert!(!BountyStatus::Draft.holds_reservation());
        assert!(BountyStatus::Open.holds_reservation());
        assert!(BountyStatus::Completed.holds_reservation());
        assert!(!BountyStatus::Paid.holds_reservation());
        assert!(!BountyStatus::Cancelled.holds_reservation());
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&BountyStatus::InReview).unwrap();
        assert_eq!(json, "\"IN_REVIEW\"");
    }

    #[test]
    fn test_assignment_accessors() {
        let assigned = Assignment::Assigned {
            assignee: "hunter".to_string(),
            since: Utc::now(),
        };
        assert!(assigned.is_held_by("hunter"));
        assert!(!assigned.is_held_by("other"));
        assert_eq!(Assignment::Unassigned.assignee(), None);
    }
}
