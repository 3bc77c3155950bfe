//! Bounty lifecycle
//!
//! Status changes go through one table, [`transition`], which maps
//! `(status, event)` to the next status and the ledger effect that must be
//! applied in the same unit of work. [`BountyStateMachine`] wraps it with
//! authorization, validation and the activity log.
//!
//! | From | Event | To | Ledger |
//! |---|---|---|---|
//! | DRAFT | publish | OPEN | reserve |
//! | OPEN | assign | ASSIGNED | - |
//! | ASSIGNED, IN_REVIEW | unassign | OPEN | - |
//! | ASSIGNED, IN_REVIEW | submit proof | IN_REVIEW | - |
//! | IN_REVIEW | complete | COMPLETED | - |
//! | COMPLETED | settle | PAID | settle |
//! | OPEN, ASSIGNED, IN_REVIEW | cancel | CANCELLED | release |
//! | DRAFT, CANCELLED | cancel | CANCELLED | - |

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::auth::{is_valid_pubkey, Actor, Capability, MemberDirectory};
use crate::config::Limits;
use crate::error::{BountyError, Result};
use crate::ledger;
use crate::storage::{BountyStorage, UnitOfWork};
use crate::types::{
    ActivityAction, Assignment, Bounty, BountyActivity, BountyPatch, BountyStatus, NewBounty,
    ProofStatus, RequestStatus,
};
use crate::validation;

// ============================================================================
// TRANSITION TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BountyEvent {
    Publish,
    Assign,
    Unassign,
    SubmitProof,
    Complete,
    Settle,
    Cancel,
}

impl BountyEvent {
    fn verb(&self) -> &'static str {
        match self {
            BountyEvent::Publish => "publish",
            BountyEvent::Assign => "assign",
            BountyEvent::Unassign => "unassign",
            BountyEvent::SubmitProof => "submit proof for",
            BountyEvent::Complete => "complete",
            BountyEvent::Settle => "settle",
            BountyEvent::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    None,
    Reserve,
    Release,
    Settle,
}

pub fn transition(
    from: BountyStatus,
    event: BountyEvent,
) -> Result<(BountyStatus, LedgerEffect)> {
    use BountyEvent as E;
    use BountyStatus::*;

    let next = match (from, event) {
        (Draft, E::Publish) => (Open, LedgerEffect::Reserve),
        (Open, E::Assign) => (Assigned, LedgerEffect::None),
        (Assigned | InReview, E::Unassign) => (Open, LedgerEffect::None),
        (Assigned | InReview, E::SubmitProof) => (InReview, LedgerEffect::None),
        (InReview, E::Complete) => (Completed, LedgerEffect::None),
        (Completed, E::Settle) => (Paid, LedgerEffect::Settle),
        (Open | Assigned | InReview, E::Cancel) => (Cancelled, LedgerEffect::Release),
        (Draft | Cancelled, E::Cancel) => (Cancelled, LedgerEffect::None),
        (Completed | Paid, E::Cancel) => return Err(BountyError::TerminalState(from)),
        _ => {
            return Err(BountyError::InvalidState {
                status: from,
                action: event.verb(),
            })
        }
    };
    Ok(next)
}

/// Apply `event` to `bounty`: status change plus its ledger effect.
pub(crate) fn apply(uow: &UnitOfWork<'_>, bounty: &mut Bounty, event: BountyEvent) -> Result<()> {
    let (next, effect) = transition(bounty.status, event)?;
    match effect {
        LedgerEffect::None => {}
        LedgerEffect::Reserve => {
            ledger::reserve(uow, bounty.workspace_id, bounty.amount)?;
        }
        LedgerEffect::Release => {
            ledger::release(uow, bounty.workspace_id, bounty.amount)?;
        }
        LedgerEffect::Settle => {
            ledger::settle(uow, bounty.workspace_id, bounty.amount)?;
        }
    }
    bounty.status = next;
    bounty.updated_at = Utc::now();
    Ok(())
}

/// OPEN → ASSIGNED inside an open unit of work. The "still unassigned"
/// check happens here so concurrent assigners serialize on it.
pub(crate) fn assign_within(
    uow: &UnitOfWork<'_>,
    bounty: &mut Bounty,
    assignee: &str,
    actor: &str,
    action: ActivityAction,
) -> Result<BountyActivity> {
    if bounty.assignment.is_assigned() {
        return Err(BountyError::AlreadyAssigned(bounty.id));
    }

    // Reserved at OPEN time; assignment moves no money.
    let budget = ledger::budget(uow, bounty.workspace_id)?;
    if budget.reserved < bounty.amount {
        return Err(BountyError::Invariant(format!(
            "bounty {} is OPEN but workspace reserves only {}",
            bounty.id, budget.reserved
        )));
    }

    apply(uow, bounty, BountyEvent::Assign)?;
    bounty.assignment = Assignment::Assigned {
        assignee: assignee.to_string(),
        since: Utc::now(),
    };
    uow.save_bounty(bounty)?;

    activity::record(uow, bounty, actor, action, json!({ "assignee": assignee }))
}

/// ASSIGNED/IN_REVIEW → OPEN, keeping the reservation. Proofs still waiting
/// for review are rejected with the assignment.
fn release_assignee(
    uow: &UnitOfWork<'_>,
    bounty: &mut Bounty,
    actor: &str,
) -> Result<(Option<String>, Vec<Uuid>)> {
    apply(uow, bounty, BountyEvent::Unassign)?;
    let previous = bounty.assignee().map(str::to_string);
    bounty.assignment = Assignment::Unassigned;
    uow.save_bounty(bounty)?;
    let rejected = reject_pending_proofs(uow, bounty.id, actor, "assignee released")?;
    Ok((previous, rejected))
}

/// Pending proofs are only reviewable while the bounty is IN_REVIEW.
fn reject_pending_proofs(
    uow: &UnitOfWork<'_>,
    bounty_id: Uuid,
    actor: &str,
    note: &str,
) -> Result<Vec<Uuid>> {
    let now = Utc::now();
    let mut rejected = Vec::new();
    for mut proof in uow.proofs(bounty_id)? {
        if proof.status != ProofStatus::Pending {
            continue;
        }
        proof.status = ProofStatus::Rejected;
        proof.reviewer = Some(actor.to_string());
        proof.review_note = Some(note.to_string());
        proof.reviewed_at = Some(now);
        uow.save_proof(&proof)?;
        rejected.push(proof.id);
    }
    Ok(rejected)
}

// ============================================================================
// STATE MACHINE
// ============================================================================

#[derive(Clone)]
pub struct BountyStateMachine {
    storage: Arc<BountyStorage>,
    members: Arc<dyn MemberDirectory>,
    limits: Limits,
}

impl BountyStateMachine {
    pub fn new(
        storage: Arc<BountyStorage>,
        members: Arc<dyn MemberDirectory>,
        limits: Limits,
    ) -> Self {
        Self {
            storage,
            members,
            limits,
        }
    }

    /// The caller re-resolved against the workspace owning bounty `id`.
    fn scoped(&self, actor: &Actor, id: Uuid) -> Result<Actor> {
        let workspace_id = self.storage.bounty_workspace(id)?;
        self.members.scope(workspace_id, actor)
    }

    /// Create a DRAFT or OPEN bounty. OPEN reserves the amount immediately.
    pub fn create_bounty(&self, actor: &Actor, workspace_id: Uuid, data: NewBounty) -> Result<Bounty> {
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::CreateBounty)?;
        validation::validate_new_bounty(&data, &self.limits)?;
        if !matches!(data.status, BountyStatus::Draft | BountyStatus::Open) {
            return Err(BountyError::validation(format!(
                "bounties are created as DRAFT or OPEN, not {}",
                data.status
            )));
        }

        let bounty = self.storage.atomic(|uow| {
            let now = Utc::now();
            let mut bounty = Bounty {
                id: Uuid::new_v4(),
                workspace_id,
                creator: actor.pubkey.clone(),
                title: data.title.trim().to_string(),
                description: data.description.clone(),
                amount: data.amount,
                status: BountyStatus::Draft,
                assignment: Assignment::Unassigned,
                tags: validation::normalize_tags(&data.tags),
                created_at: now,
                updated_at: now,
                completed_at: None,
                paid_at: None,
                deleted_at: None,
            };
            uow.insert_bounty(&bounty)?;

            if data.status == BountyStatus::Open {
                apply(uow, &mut bounty, BountyEvent::Publish)?;
                uow.save_bounty(&bounty)?;
            }

            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Created,
                json!({ "amount": bounty.amount, "status": bounty.status }),
            )?;
            Ok(bounty)
        })?;

        info!(
            "Created bounty {} ({}) in workspace {} by {}",
            bounty.id, bounty.status, workspace_id, actor.pubkey
        );
        Ok(bounty)
    }

    /// Edit a mutable bounty. Amount changes on a reserved bounty move the
    /// difference between available and reserved.
    pub fn update_bounty(&self, actor: &Actor, id: Uuid, patch: BountyPatch) -> Result<Bounty> {
        validation::validate_patch(&patch, &self.limits)?;
        let actor = &self.scoped(actor, id)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            actor.require_self_or(&bounty.creator, Capability::EditAny)?;
            if !bounty.status.is_editable() {
                return Err(match bounty.status {
                    BountyStatus::Cancelled => BountyError::InvalidState {
                        status: bounty.status,
                        action: "edit",
                    },
                    status => BountyError::TerminalState(status),
                });
            }

            let mut changed = serde_json::Map::new();
            if let Some(amount) = patch.amount {
                if amount != bounty.amount {
                    if bounty.status.holds_reservation() {
                        let delta = ledger::amount_delta(bounty.amount, amount)?;
                        ledger::adjust_reservation(uow, bounty.workspace_id, delta)?;
                    }
                    changed.insert("amount".into(), json!({ "from": bounty.amount, "to": amount }));
                    bounty.amount = amount;
                }
            }
            if let Some(title) = &patch.title {
                bounty.title = title.trim().to_string();
                changed.insert("title".into(), json!(bounty.title));
            }
            if let Some(description) = &patch.description {
                bounty.description = Some(description.clone());
                changed.insert("description".into(), json!(true));
            }
            if let Some(tags) = &patch.tags {
                bounty.tags = validation::normalize_tags(tags);
                changed.insert("tags".into(), json!(bounty.tags));
            }

            bounty.updated_at = Utc::now();
            uow.save_bounty(&bounty)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Updated,
                serde_json::Value::Object(changed),
            )?;
            Ok(bounty)
        })?;

        info!("Updated bounty {} by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// DRAFT → OPEN, reserving the amount.
    pub fn publish_bounty(&self, actor: &Actor, id: Uuid) -> Result<Bounty> {
        let actor = &self.scoped(actor, id)?;
        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            actor.require_self_or(&bounty.creator, Capability::EditAny)?;
            apply(uow, &mut bounty, BountyEvent::Publish)?;
            uow.save_bounty(&bounty)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Published,
                json!({ "reserved": bounty.amount }),
            )?;
            Ok(bounty)
        })?;

        info!("Published bounty {} (reserved {})", id, bounty.amount);
        Ok(bounty)
    }

    pub fn assign(&self, actor: &Actor, id: Uuid, assignee: &str) -> Result<Bounty> {
        let workspace_id = self.storage.bounty_workspace(id)?;
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::Assign)?;
        if !is_valid_pubkey(assignee) {
            return Err(BountyError::validation(format!("invalid assignee: {:?}", assignee)));
        }
        if !self.members.is_member(workspace_id, assignee)? {
            return Err(BountyError::validation(format!(
                "{} is not a member of workspace {}",
                assignee, workspace_id
            )));
        }

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            assign_within(uow, &mut bounty, assignee, &actor.pubkey, ActivityAction::Assigned)?;
            Ok(bounty)
        })?;

        info!("Assigned bounty {} to {} by {}", id, assignee, actor.pubkey);
        Ok(bounty)
    }

    pub fn unassign(&self, actor: &Actor, id: Uuid) -> Result<Bounty> {
        let actor = &self.scoped(actor, id)?;
        actor.require(Capability::Assign)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            let (previous, rejected) = release_assignee(uow, &mut bounty, &actor.pubkey)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Unassigned,
                json!({ "previous_assignee": previous, "rejected_proofs": rejected }),
            )?;
            Ok(bounty)
        })?;

        info!("Unassigned bounty {} by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// Self-assignment by a member of the bounty's workspace.
    pub fn claim(&self, actor: &Actor, id: Uuid) -> Result<Bounty> {
        let actor = &self.scoped(actor, id)?;
        actor.require(Capability::Claim)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            assign_within(uow, &mut bounty, &actor.pubkey, &actor.pubkey, ActivityAction::Claimed)?;
            Ok(bounty)
        })?;

        info!("Bounty {} claimed by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// Give a claimed bounty back. Only from ASSIGNED; work under review must
    /// be unassigned by an admin.
    pub fn unclaim(&self, actor: &Actor, id: Uuid, reason: Option<String>) -> Result<Bounty> {
        validation::validate_text("reason", reason.as_deref(), &self.limits)?;
        let actor = &self.scoped(actor, id)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            match bounty.assignee() {
                Some(assignee) => actor.require_self_or(assignee, Capability::Assign)?,
                None => actor.require(Capability::Assign)?,
            }
            if bounty.status != BountyStatus::Assigned {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: "unclaim",
                });
            }
            let (previous, rejected) = release_assignee(uow, &mut bounty, &actor.pubkey)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Unclaimed,
                json!({
                    "previous_assignee": previous,
                    "reason": reason,
                    "rejected_proofs": rejected,
                }),
            )?;
            Ok(bounty)
        })?;

        info!("Bounty {} unclaimed by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// IN_REVIEW → COMPLETED, gated on an accepted proof from the current
    /// assignee.
    pub fn complete_bounty(&self, actor: &Actor, id: Uuid) -> Result<Bounty> {
        let actor = &self.scoped(actor, id)?;
        actor.require(Capability::Complete)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            if bounty.status != BountyStatus::InReview {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: BountyEvent::Complete.verb(),
                });
            }
            let assignee = bounty.assignee().ok_or(BountyError::NoAssignee)?;
            if uow.accepted_proofs_by(id, assignee)? == 0 {
                return Err(BountyError::NoAcceptedProof);
            }

            apply(uow, &mut bounty, BountyEvent::Complete)?;
            bounty.completed_at = Some(bounty.updated_at);
            uow.save_bounty(&bounty)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Completed,
                json!({ "assignee": bounty.assignee() }),
            )?;
            Ok(bounty)
        })?;

        info!("Completed bounty {} by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// Cancel and release the reservation. Cancelling twice is a no-op.
    pub fn cancel_bounty(&self, actor: &Actor, id: Uuid, reason: Option<String>) -> Result<Bounty> {
        validation::validate_text("reason", reason.as_deref(), &self.limits)?;
        let actor = &self.scoped(actor, id)?;

        let bounty = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            actor.require_self_or(&bounty.creator, Capability::Cancel)?;
            if bounty.status == BountyStatus::Cancelled {
                return Ok(bounty);
            }

            let released = if bounty.status.holds_reservation() {
                bounty.amount
            } else {
                0
            };
            apply(uow, &mut bounty, BountyEvent::Cancel)?;
            let previous = bounty.assignee().map(str::to_string);
            bounty.assignment = Assignment::Unassigned;
            uow.save_bounty(&bounty)?;

            let now = Utc::now();
            for mut request in uow.requests(id, Some(RequestStatus::Pending))? {
                request.status = RequestStatus::Rejected;
                request.reviewer = Some(actor.pubkey.clone());
                request.review_note = Some("bounty cancelled".to_string());
                request.reviewed_at = Some(now);
                uow.save_request(&request)?;
            }
            let rejected = reject_pending_proofs(uow, id, &actor.pubkey, "bounty cancelled")?;

            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::Cancelled,
                json!({
                    "reason": reason,
                    "released": released,
                    "previous_assignee": previous,
                    "rejected_proofs": rejected,
                }),
            )?;
            Ok(bounty)
        })?;

        info!("Cancelled bounty {} by {}", id, actor.pubkey);
        Ok(bounty)
    }

    /// Soft delete. Only DRAFT or CANCELLED bounties, which hold no funds.
    pub fn delete_bounty(&self, actor: &Actor, id: Uuid) -> Result<()> {
        let actor = &self.scoped(actor, id)?;
        self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(id)?;
            actor.require_self_or(&bounty.creator, Capability::EditAny)?;
            if !matches!(bounty.status, BountyStatus::Draft | BountyStatus::Cancelled) {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: "delete",
                });
            }
            let now = Utc::now();
            bounty.deleted_at = Some(now);
            bounty.updated_at = now;
            uow.save_bounty(&bounty)?;
            activity::record(uow, &bounty, &actor.pubkey, ActivityAction::Deleted, json!({}))?;
            Ok(())
        })?;

        info!("Deleted bounty {} by {}", id, actor.pubkey);
        Ok(())
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn get_bounty(&self, id: Uuid) -> Result<Bounty> {
        self.storage.atomic(|uow| uow.bounty(id))
    }

    pub fn list_bounties(&self, workspace_id: Uuid, status: Option<BountyStatus>) -> Result<Vec<Bounty>> {
        self.storage.atomic(|uow| uow.bounties(workspace_id, status))
    }

    pub fn activity(&self, id: Uuid) -> Result<Vec<BountyActivity>> {
        self.storage.atomic(|uow| {
            uow.bounty(id)?;
            uow.activities(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::types::WorkspaceBudget;

    struct Fixture {
        storage: Arc<BountyStorage>,
        machine: BountyStateMachine,
        workspace: Uuid,
        admin: Actor,
        hunter: Actor,
    }

    fn fixture(funds: u64) -> Fixture {
        let storage = Arc::new(BountyStorage::in_memory().unwrap());
        let workspace = Uuid::new_v4();
        storage.add_member(workspace, "admin", Role::Admin).unwrap();
        storage.add_member(workspace, "hunter", Role::Member).unwrap();
        if funds > 0 {
            storage
                .atomic(|uow| ledger::deposit(uow, workspace, funds))
                .unwrap();
        }
        let machine = BountyStateMachine::new(storage.clone(), storage.clone(), Limits::default());
        Fixture {
            storage,
            machine,
            workspace,
            admin: Actor::new("admin", Role::Admin).unwrap(),
            hunter: Actor::new("hunter", Role::Member).unwrap(),
        }
    }

    fn new_bounty(amount: u64, status: BountyStatus) -> NewBounty {
        NewBounty {
            title: "Implement feature".to_string(),
            description: None,
            amount,
            tags: vec![],
            status,
        }
    }

    fn budget(f: &Fixture) -> WorkspaceBudget {
        f.storage.atomic(|uow| ledger::budget(uow, f.workspace)).unwrap()
    }

    #[test]
    fn test_transition_table() {
        use BountyStatus::*;
        assert_eq!(
            transition(Draft, BountyEvent::Publish).unwrap(),
            (Open, LedgerEffect::Reserve)
        );
        assert_eq!(
            transition(InReview, BountyEvent::Unassign).unwrap(),
            (Open, LedgerEffect::None)
        );
        assert_eq!(
            transition(Completed, BountyEvent::Settle).unwrap(),
            (Paid, LedgerEffect::Settle)
        );
        assert_eq!(
            transition(Assigned, BountyEvent::Cancel).unwrap(),
            (Cancelled, LedgerEffect::Release)
        );
        assert_eq!(
            transition(Cancelled, BountyEvent::Cancel).unwrap(),
            (Cancelled, LedgerEffect::None)
        );
        assert!(matches!(
            transition(Paid, BountyEvent::Cancel),
            Err(BountyError::TerminalState(Paid))
        ));
        assert!(matches!(
            transition(Open, BountyEvent::Complete),
            Err(BountyError::InvalidState { .. })
        ));
        assert!(matches!(
            transition(Open, BountyEvent::Publish),
            Err(BountyError::InvalidState { .. })
        ));
        assert!(matches!(
            transition(Paid, BountyEvent::Settle),
            Err(BountyError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_only_publish_and_cancel_touch_ledger_before_payment() {
        for status in BountyStatus::ALL {
            for event in [
                BountyEvent::Assign,
                BountyEvent::Unassign,
                BountyEvent::SubmitProof,
                BountyEvent::Complete,
            ] {
                if let Ok((_, effect)) = transition(*status, event) {
                    assert_eq!(effect, LedgerEffect::None, "{:?} from {}", event, status);
                }
            }
        }
    }

    #[test]
    fn test_create_open_reserves() {
        let f = fixture(100_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(50_000, BountyStatus::Open))
            .unwrap();
        assert_eq!(bounty.status, BountyStatus::Open);

        let b = budget(&f);
        assert_eq!((b.available, b.reserved, b.paid), (50_000, 50_000, 0));
    }

    #[test]
    fn test_create_open_without_budget_leaves_nothing() {
        let f = fixture(10);
        let err = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(50, BountyStatus::Open))
            .unwrap_err();
        assert!(matches!(err, BountyError::InsufficientBudget { .. }));
        assert!(f.machine.list_bounties(f.workspace, None).unwrap().is_empty());
        assert_eq!(budget(&f).available, 10);
    }

    #[test]
    fn test_draft_publish_reserves_once() {
        let f = fixture(1_000);
        let draft = f
            .machine
            .create_bounty(&f.hunter, f.workspace, new_bounty(600, BountyStatus::Draft))
            .unwrap();
        assert_eq!(budget(&f).reserved, 0);

        let open = f.machine.publish_bounty(&f.hunter, draft.id).unwrap();
        assert_eq!(open.status, BountyStatus::Open);
        assert_eq!(budget(&f).reserved, 600);

        assert!(f.machine.publish_bounty(&f.hunter, draft.id).is_err());
        f.machine.assign(&f.admin, draft.id, "hunter").unwrap();
        assert_eq!(budget(&f).reserved, 600);
    }

    #[test]
    fn test_assign_requires_member_and_open() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();

        let err = f.machine.assign(&f.admin, bounty.id, "stranger").unwrap_err();
        assert!(matches!(err, BountyError::Validation(_)));

        let err = f.machine.assign(&f.hunter, bounty.id, "hunter").unwrap_err();
        assert!(matches!(err, BountyError::Forbidden(_)));

        let assigned = f.machine.assign(&f.admin, bounty.id, "hunter").unwrap();
        assert_eq!(assigned.assignee(), Some("hunter"));

        let err = f.machine.assign(&f.admin, bounty.id, "admin").unwrap_err();
        assert!(matches!(err, BountyError::AlreadyAssigned(_)));
    }

    #[test]
    fn test_claim_and_unclaim() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();

        let claimed = f.machine.claim(&f.hunter, bounty.id).unwrap();
        assert_eq!(claimed.status, BountyStatus::Assigned);

        f.storage.add_member(f.workspace, "other", Role::Member).unwrap();
        let other = Actor::new("other", Role::Member).unwrap();
        assert!(matches!(
            f.machine.claim(&other, bounty.id),
            Err(BountyError::AlreadyAssigned(_))
        ));
        assert!(matches!(
            f.machine.unclaim(&other, bounty.id, None),
            Err(BountyError::Forbidden(_))
        ));

        let open = f
            .machine
            .unclaim(&f.hunter, bounty.id, Some("no time".to_string()))
            .unwrap();
        assert_eq!(open.status, BountyStatus::Open);
        assert_eq!(open.assignment, Assignment::Unassigned);
        assert_eq!(budget(&f).reserved, 100);
    }

    #[test]
    fn test_claim_requires_membership() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();

        let stranger = Actor::new("stranger", Role::Member).unwrap();
        assert!(matches!(
            f.machine.claim(&stranger, bounty.id),
            Err(BountyError::Forbidden(_))
        ));
        let unchanged = f.machine.get_bounty(bounty.id).unwrap();
        assert_eq!(unchanged.status, BountyStatus::Open);
        assert_eq!(unchanged.assignment, Assignment::Unassigned);
    }

    #[test]
    fn test_create_requires_membership() {
        let f = fixture(1_000);
        let outsider = Actor::new("outsider", Role::Admin).unwrap();
        assert!(matches!(
            f.machine
                .create_bounty(&outsider, f.workspace, new_bounty(100, BountyStatus::Open)),
            Err(BountyError::Forbidden(_))
        ));
        assert!(f.machine.list_bounties(f.workspace, None).unwrap().is_empty());
        assert_eq!(budget(&f).reserved, 0);
    }

    #[test]
    fn test_presented_role_cannot_exceed_stored_role() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();

        // "hunter" is a plain member however it presents itself.
        let posing = Actor::new("hunter", Role::Owner).unwrap();
        assert!(matches!(
            f.machine.assign(&posing, bounty.id, "hunter"),
            Err(BountyError::Forbidden(_))
        ));
        assert!(matches!(
            f.machine.cancel_bounty(&posing, bounty.id, None),
            Err(BountyError::Forbidden(_))
        ));

        // Admin of another workspace has no say here.
        let other_workspace = Uuid::new_v4();
        f.storage.add_member(other_workspace, "boss", Role::Admin).unwrap();
        let boss = Actor::new("boss", Role::Admin).unwrap();
        assert!(matches!(
            f.machine.cancel_bounty(&boss, bounty.id, None),
            Err(BountyError::Forbidden(_))
        ));

        // A narrower presented role is honoured.
        let read_only_admin = Actor::new("admin", Role::Viewer).unwrap();
        assert!(matches!(
            f.machine.assign(&read_only_admin, bounty.id, "hunter"),
            Err(BountyError::Forbidden(_))
        ));
    }

    fn submit_proof(f: &Fixture, bounty_id: Uuid, submitter: &str, status: ProofStatus) -> Uuid {
        f.storage
            .atomic(|uow| {
                let mut bounty = uow.bounty(bounty_id)?;
                apply(uow, &mut bounty, BountyEvent::SubmitProof)?;
                uow.save_bounty(&bounty)?;
                let proof = crate::types::BountyProof {
                    id: Uuid::new_v4(),
                    bounty_id,
                    submitter: submitter.to_string(),
                    url: "https://example.com/pr/1".to_string(),
                    description: "work".to_string(),
                    status,
                    reviewer: None,
                    review_note: None,
                    reviewed_at: None,
                    created_at: Utc::now(),
                };
                uow.insert_proof(&proof)?;
                Ok(proof.id)
            })
            .unwrap()
    }

    #[test]
    fn test_previous_assignee_proof_does_not_complete() {
        let f = fixture(1_000);
        f.storage.add_member(f.workspace, "second", Role::Member).unwrap();
        let second = Actor::new("second", Role::Member).unwrap();
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();

        f.machine.claim(&f.hunter, bounty.id).unwrap();
        submit_proof(&f, bounty.id, "hunter", ProofStatus::Accepted);
        f.machine.unassign(&f.admin, bounty.id).unwrap();

        f.machine.claim(&second, bounty.id).unwrap();
        submit_proof(&f, bounty.id, "second", ProofStatus::Pending);
        assert!(matches!(
            f.machine.complete_bounty(&f.admin, bounty.id),
            Err(BountyError::NoAcceptedProof)
        ));
    }

    #[test]
    fn test_unassign_rejects_pending_proofs() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();
        f.machine.claim(&f.hunter, bounty.id).unwrap();
        let pending = submit_proof(&f, bounty.id, "hunter", ProofStatus::Pending);

        f.machine.unassign(&f.admin, bounty.id).unwrap();
        let proof = f.storage.atomic(|uow| uow.proof(pending)).unwrap();
        assert_eq!(proof.status, ProofStatus::Rejected);
        assert_eq!(proof.review_note.as_deref(), Some("assignee released"));
    }

    #[test]
    fn test_complete_requires_in_review() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();
        f.machine.claim(&f.hunter, bounty.id).unwrap();

        assert!(matches!(
            f.machine.complete_bounty(&f.admin, bounty.id),
            Err(BountyError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_cancel_idempotent_and_releases_once() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(400, BountyStatus::Open))
            .unwrap();
        f.machine.claim(&f.hunter, bounty.id).unwrap();

        let first = f.machine.cancel_bounty(&f.admin, bounty.id, None).unwrap();
        assert_eq!(first.status, BountyStatus::Cancelled);
        assert_eq!(first.assignment, Assignment::Unassigned);
        let after_first = budget(&f);
        assert_eq!((after_first.available, after_first.reserved), (1_000, 0));

        let second = f.machine.cancel_bounty(&f.admin, bounty.id, None).unwrap();
        assert_eq!(second.status, BountyStatus::Cancelled);
        assert_eq!(budget(&f).available, after_first.available);

        let cancels = f
            .machine
            .activity(bounty.id)
            .unwrap()
            .into_iter()
            .filter(|a| a.action == ActivityAction::Cancelled)
            .count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn test_cancel_by_stranger_forbidden() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(400, BountyStatus::Open))
            .unwrap();
        assert!(matches!(
            f.machine.cancel_bounty(&f.hunter, bounty.id, None),
            Err(BountyError::Forbidden(_))
        ));
    }

    #[test]
    fn test_update_amount_adjusts_reservation() {
        let f = fixture(1_000);
        let bounty = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(400, BountyStatus::Open))
            .unwrap();

        let patch = BountyPatch {
            amount: Some(700),
            ..Default::default()
        };
        f.machine.update_bounty(&f.admin, bounty.id, patch).unwrap();
        assert_eq!((budget(&f).available, budget(&f).reserved), (300, 700));

        let too_much = BountyPatch {
            amount: Some(1_001),
            ..Default::default()
        };
        assert!(matches!(
            f.machine.update_bounty(&f.admin, bounty.id, too_much),
            Err(BountyError::InsufficientBudget { .. })
        ));
        assert_eq!(f.machine.get_bounty(bounty.id).unwrap().amount, 700);

        let lower = BountyPatch {
            amount: Some(100),
            ..Default::default()
        };
        f.machine.update_bounty(&f.admin, bounty.id, lower).unwrap();
        assert_eq!((budget(&f).available, budget(&f).reserved), (900, 100));
    }

    #[test]
    fn test_update_draft_amount_moves_no_funds() {
        let f = fixture(100);
        let draft = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(50, BountyStatus::Draft))
            .unwrap();
        let patch = BountyPatch {
            amount: Some(5_000),
            title: Some("Bigger scope".to_string()),
            ..Default::default()
        };
        let updated = f.machine.update_bounty(&f.admin, draft.id, patch).unwrap();
        assert_eq!(updated.amount, 5_000);
        assert_eq!(budget(&f).reserved, 0);
        assert!(matches!(
            f.machine.publish_bounty(&f.admin, draft.id),
            Err(BountyError::InsufficientBudget { .. })
        ));
    }

    #[test]
    fn test_delete_only_unfunded() {
        let f = fixture(1_000);
        let open = f
            .machine
            .create_bounty(&f.admin, f.workspace, new_bounty(100, BountyStatus::Open))
            .unwrap();
        assert!(matches!(
            f.machine.delete_bounty(&f.admin, open.id),
            Err(BountyError::InvalidState { .. })
        ));

        f.machine.cancel_bounty(&f.admin, open.id, None).unwrap();
        f.machine.delete_bounty(&f.admin, open.id).unwrap();
        assert!(matches!(
            f.machine.get_bounty(open.id),
            Err(BountyError::NotFound { .. })
        ));
    }
}
