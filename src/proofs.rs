//! Proof-of-work submissions and review
//!
//! Only the current assignee submits. An accepted proof is the gate for
//! completion and is never modified or deleted afterwards.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::auth::{Actor, Capability, MemberDirectory};
use crate::config::Limits;
use crate::error::{BountyError, Result};
use crate::lifecycle::{self, BountyEvent};
use crate::storage::BountyStorage;
use crate::types::{ActivityAction, BountyProof, BountyStatus, ProofStatus, ReviewDecision};
use crate::validation;

#[derive(Clone)]
pub struct ProofWorkflow {
    storage: Arc<BountyStorage>,
    members: Arc<dyn MemberDirectory>,
    limits: Limits,
}

impl ProofWorkflow {
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

    /// The caller re-resolved against the workspace owning a proof.
    fn proof_scope(&self, actor: &Actor, proof_id: Uuid) -> Result<Actor> {
        let workspace_id = self
            .storage
            .atomic(|uow| Ok(uow.bounty(uow.proof(proof_id)?.bounty_id)?.workspace_id))?;
        self.members.scope(workspace_id, actor)
    }

    /// Record a proof; an ASSIGNED bounty moves to IN_REVIEW in the same unit.
    pub fn submit_proof(
        &self,
        actor: &Actor,
        bounty_id: Uuid,
        url: &str,
        description: &str,
    ) -> Result<BountyProof> {
        validation::validate_url(url)?;
        validation::validate_text("description", Some(description), &self.limits)?;
        let actor = &self
            .members
            .scope(self.storage.bounty_workspace(bounty_id)?, actor)?;

        let proof = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(bounty_id)?;
            if !bounty.assignment.is_held_by(&actor.pubkey) {
                return Err(BountyError::forbidden("only the assignee may submit proof"));
            }
            let previous = bounty.status;
            lifecycle::apply(uow, &mut bounty, BountyEvent::SubmitProof)?;
            uow.save_bounty(&bounty)?;

            let proof = BountyProof {
                id: Uuid::new_v4(),
                bounty_id,
                submitter: actor.pubkey.clone(),
                url: url.to_string(),
                description: description.to_string(),
                status: ProofStatus::Pending,
                reviewer: None,
                review_note: None,
                reviewed_at: None,
                created_at: Utc::now(),
            };
            uow.insert_proof(&proof)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::ProofSubmitted,
                json!({ "proof_id": proof.id, "url": proof.url, "from_status": previous }),
            )?;
            Ok(proof)
        })?;

        info!("Proof {} submitted on bounty {} by {}", proof.id, bounty_id, actor.pubkey);
        Ok(proof)
    }

    pub fn review_proof(
        &self,
        actor: &Actor,
        proof_id: Uuid,
        decision: ReviewDecision,
        note: Option<String>,
    ) -> Result<BountyProof> {
        let actor = &self.proof_scope(actor, proof_id)?;
        actor.require(Capability::ReviewProof)?;
        validation::validate_text("note", note.as_deref(), &self.limits)?;

        let proof = self.storage.atomic(|uow| {
            let mut proof = uow.proof(proof_id)?;
            if proof.status != ProofStatus::Pending {
                return Err(BountyError::validation(format!(
                    "proof {} is already {}",
                    proof.id, proof.status
                )));
            }
            let bounty = uow.bounty(proof.bounty_id)?;
            if bounty.status != BountyStatus::InReview {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: "review proof for",
                });
            }

            let action = match decision {
                ReviewDecision::Approve => {
                    proof.status = ProofStatus::Accepted;
                    ActivityAction::ProofAccepted
                }
                ReviewDecision::Reject => {
                    proof.status = ProofStatus::Rejected;
                    ActivityAction::ProofRejected
                }
            };
            proof.reviewer = Some(actor.pubkey.clone());
            proof.review_note = note.clone();
            proof.reviewed_at = Some(Utc::now());
            uow.save_proof(&proof)?;

            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                action,
                json!({ "proof_id": proof.id, "note": proof.review_note }),
            )?;
            Ok(proof)
        })?;

        info!("Proof {} {} by {}", proof_id, proof.status, actor.pubkey);
        Ok(proof)
    }

    pub fn delete_proof(&self, actor: &Actor, proof_id: Uuid) -> Result<()> {
        let actor = &self.proof_scope(actor, proof_id)?;
        self.storage.atomic(|uow| {
            let proof = uow.proof(proof_id)?;
            actor.require_self_or(&proof.submitter, Capability::ReviewProof)?;
            if proof.status == ProofStatus::Accepted {
                return Err(BountyError::validation("accepted proofs cannot be deleted"));
            }
            let bounty = uow.bounty(proof.bounty_id)?;
            uow.delete_proof(proof.id)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::ProofDeleted,
                json!({ "proof_id": proof.id, "status": proof.status }),
            )?;
            Ok(())
        })?;

        info!("Proof {} deleted by {}", proof_id, actor.pubkey);
        Ok(())
    }

    pub fn list_proofs(&self, bounty_id: Uuid) -> Result<Vec<BountyProof>> {
        self.storage.atomic(|uow| {
            uow.bounty(bounty_id)?;
            uow.proofs(bounty_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::ledger;
    use crate::lifecycle::BountyStateMachine;
    use crate::types::{Bounty, NewBounty};

    const PR_URL: &str = "https://github.com/acme/widgets/pull/42";

    struct Fixture {
        machine: BountyStateMachine,
        proofs: ProofWorkflow,
        admin: Actor,
        hunter: Actor,
        bounty: Bounty,
    }

    fn claimed_bounty() -> Fixture {
        let storage = Arc::new(BountyStorage::in_memory().unwrap());
        let workspace = Uuid::new_v4();
        storage.add_member(workspace, "admin", Role::Admin).unwrap();
        storage.add_member(workspace, "hunter", Role::Member).unwrap();
        storage
            .atomic(|uow| ledger::deposit(uow, workspace, 5_000))
            .unwrap();

        let machine = BountyStateMachine::new(storage.clone(), storage.clone(), Limits::default());
        let proofs = ProofWorkflow::new(storage.clone(), storage.clone(), Limits::default());
        let admin = Actor::new("admin", Role::Admin).unwrap();
        let hunter = Actor::new("hunter", Role::Member).unwrap();
        let bounty = machine
            .create_bounty(
                &admin,
                workspace,
                NewBounty {
                    title: "Write docs".to_string(),
                    description: Some("User guide".to_string()),
                    amount: 2_000,
                    tags: vec!["docs".to_string()],
                    status: BountyStatus::Open,
                },
            )
            .unwrap();
        machine.claim(&hunter, bounty.id).unwrap();

        Fixture {
            machine,
            proofs,
            admin,
            hunter,
            bounty,
        }
    }

    #[test]
    fn test_submit_moves_to_in_review() {
        let f = claimed_bounty();
        let proof = f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "done").unwrap();
        assert_eq!(proof.status, ProofStatus::Pending);
        assert_eq!(
            f.machine.get_bounty(f.bounty.id).unwrap().status,
            BountyStatus::InReview
        );

        // Resubmission while in review keeps the status.
        f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "again").unwrap();
        assert_eq!(f.proofs.list_proofs(f.bounty.id).unwrap().len(), 2);
    }

    #[test]
    fn test_only_assignee_submits() {
        let f = claimed_bounty();
        let err = f
            .proofs
            .submit_proof(&f.admin, f.bounty.id, PR_URL, "not mine")
            .unwrap_err();
        assert!(matches!(err, BountyError::Forbidden(_)));

        let err = f
            .proofs
            .submit_proof(&f.hunter, f.bounty.id, "not-a-url", "done")
            .unwrap_err();
        assert!(matches!(err, BountyError::Validation(_)));
    }

    #[test]
    fn test_accepted_proof_is_immutable() {
        let f = claimed_bounty();
        let proof = f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "done").unwrap();

        assert!(matches!(
            f.proofs.review_proof(&f.hunter, proof.id, ReviewDecision::Approve, None),
            Err(BountyError::Forbidden(_))
        ));

        let accepted = f
            .proofs
            .review_proof(&f.admin, proof.id, ReviewDecision::Approve, Some("lgtm".to_string()))
            .unwrap();
        assert_eq!(accepted.status, ProofStatus::Accepted);
        assert_eq!(accepted.reviewer.as_deref(), Some("admin"));

        assert!(matches!(
            f.proofs.review_proof(&f.admin, proof.id, ReviewDecision::Reject, None),
            Err(BountyError::Validation(_))
        ));
        assert!(matches!(
            f.proofs.delete_proof(&f.admin, proof.id),
            Err(BountyError::Validation(_))
        ));
    }

    #[test]
    fn test_completion_gate_follows_proof_state() {
        let f = claimed_bounty();
        let first = f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "v1").unwrap();
        let second = f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "v2").unwrap();

        f.proofs
            .review_proof(&f.admin, first.id, ReviewDecision::Reject, Some("tests fail".to_string()))
            .unwrap();
        assert!(matches!(
            f.machine.complete_bounty(&f.admin, f.bounty.id),
            Err(BountyError::NoAcceptedProof)
        ));

        f.proofs
            .review_proof(&f.admin, second.id, ReviewDecision::Approve, None)
            .unwrap();
        let completed = f.machine.complete_bounty(&f.admin, f.bounty.id).unwrap();
        assert_eq!(completed.status, BountyStatus::Completed);
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_delete_pending_proof() {
        let f = claimed_bounty();
        let proof = f.proofs.submit_proof(&f.hunter, f.bounty.id, PR_URL, "wip").unwrap();

        let stranger = Actor::new("stranger", Role::Member).unwrap();
        assert!(matches!(
            f.proofs.delete_proof(&stranger, proof.id),
            Err(BountyError::Forbidden(_))
        ));
        let outside_admin = Actor::new("outside-admin", Role::Admin).unwrap();
        assert!(matches!(
            f.proofs.review_proof(&outside_admin, proof.id, ReviewDecision::Reject, None),
            Err(BountyError::Forbidden(_))
        ));

        f.proofs.delete_proof(&f.hunter, proof.id).unwrap();
        assert!(f.proofs.list_proofs(f.bounty.id).unwrap().is_empty());
        assert!(matches!(
            f.proofs.delete_proof(&f.hunter, proof.id),
            Err(BountyError::NotFound { .. })
        ));
    }
}
