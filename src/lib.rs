//! Bounty Ledger - Workspace-funded bounties with an audited budget ledger
//!
//! Workspaces deposit funds, publish bounties against them and pay
//! contributors once their work has been reviewed. Every status change of a
//! bounty moves money between ledger buckets in the same SQLite transaction.
//!
//! # How it works
//!
//! 1. An owner deposits into the workspace budget (`available` grows)
//! 2. Publishing a bounty reserves its amount (`available` → `reserved`)
//! 3. A contributor claims it, or an admin approves one of the competing requests
//! 4. The assignee submits proof; an admin accepts it and completes the bounty
//! 5. A payment is initiated and, once confirmed, settles (`reserved` → `paid`)
//!
//! # Guarantees
//!
//! - `total == available + reserved + paid` after every committed operation
//! - Each operation is one serializable unit of work: all of it applies or none
//! - Races on assignment resolve inside the unit; the loser sees `ALREADY_ASSIGNED`
//! - Every state change appends to the activity log

pub mod activity;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod payments;
pub mod proofs;
pub mod requests;
pub mod server;
pub mod service;
pub mod storage;
pub mod types;
pub mod validation;

pub use auth::{Actor, Capability, CapabilitySet, MemberDirectory, Role};
pub use config::{Config, Limits};
pub use error::{BountyError, ErrorKind, Result};
pub use ledger::LedgerReport;
pub use lifecycle::{transition, BountyEvent, BountyStateMachine, LedgerEffect};
pub use payments::{DepositReceipt, PaymentProcessor};
pub use proofs::ProofWorkflow;
pub use requests::RequestWorkflow;
pub use service::BountyCore;
pub use storage::{BountyStorage, UnitOfWork};
pub use types::{
    ActivityAction, Assignment, Bounty, BountyActivity, BountyPatch, BountyProof, BountyRequest,
    BountyStatus, NewBounty, PaymentDetail, ProofStatus, RequestStatus, ReviewDecision,
    Transaction, TransactionStatus, TransactionType, WorkspaceBudget,
};
