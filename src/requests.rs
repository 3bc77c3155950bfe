//! Requests to work on an OPEN bounty
//!
//! Several hunters may bid on the same bounty. Approving one assigns the
//! bounty to its requester and rejects every other pending bid in the same
//! unit of work.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::auth::{Actor, Capability, MemberDirectory};
use crate::config::Limits;
use crate::error::{BountyError, Result};
use crate::lifecycle;
use crate::storage::BountyStorage;
use crate::types::{ActivityAction, BountyRequest, BountyStatus, RequestStatus, ReviewDecision};
use crate::validation;

const SUPERSEDED_NOTE: &str = "another request was approved";

#[derive(Clone)]
pub struct RequestWorkflow {
    storage: Arc<BountyStorage>,
    members: Arc<dyn MemberDirectory>,
    limits: Limits,
}

impl RequestWorkflow {
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

    /// Requester and owning workspace of a request.
    fn request_scope(&self, request_id: Uuid) -> Result<(String, Uuid)> {
        self.storage.atomic(|uow| {
            let request = uow.request(request_id)?;
            let bounty = uow.bounty(request.bounty_id)?;
            Ok((request.requester, bounty.workspace_id))
        })
    }

    pub fn create_request(
        &self,
        actor: &Actor,
        bounty_id: Uuid,
        message: Option<String>,
    ) -> Result<BountyRequest> {
        let workspace_id = self.storage.bounty_workspace(bounty_id)?;
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::Request)?;
        validation::validate_text("message", message.as_deref(), &self.limits)?;

        let request = self.storage.atomic(|uow| {
            let bounty = uow.bounty(bounty_id)?;
            if bounty.assignment.is_held_by(&actor.pubkey) {
                return Err(BountyError::validation("the assignee cannot request their own bounty"));
            }
            if bounty.status != BountyStatus::Open {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: "request",
                });
            }
            if bounty.assignment.is_assigned() {
                return Err(BountyError::AlreadyAssigned(bounty.id));
            }
            if let Some(existing) = uow.request_by(bounty_id, &actor.pubkey)? {
                return Err(BountyError::Conflict(format!(
                    "{} already has a {} request on bounty {}",
                    actor.pubkey, existing.status, bounty_id
                )));
            }

            let request = BountyRequest {
                id: Uuid::new_v4(),
                bounty_id,
                requester: actor.pubkey.clone(),
                status: RequestStatus::Pending,
                message: message.clone(),
                reviewer: None,
                review_note: None,
                reviewed_at: None,
                created_at: Utc::now(),
            };
            uow.insert_request(&request)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::RequestCreated,
                json!({ "request_id": request.id }),
            )?;
            Ok(request)
        })?;

        info!("Request {} on bounty {} by {}", request.id, bounty_id, actor.pubkey);
        Ok(request)
    }

    /// Approve or reject a pending request. Approval assigns the bounty and
    /// rejects the other pending requests on it.
    pub fn review_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
        decision: ReviewDecision,
        note: Option<String>,
    ) -> Result<BountyRequest> {
        let (requester, workspace_id) = self.request_scope(request_id)?;
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::ReviewRequest)?;
        validation::validate_text("note", note.as_deref(), &self.limits)?;

        if decision == ReviewDecision::Approve && !self.members.is_member(workspace_id, &requester)? {
            return Err(BountyError::validation(format!(
                "{} is no longer a member of workspace {}",
                requester, workspace_id
            )));
        }

        let request = self.storage.atomic(|uow| {
            let mut request = uow.request(request_id)?;
            if request.status != RequestStatus::Pending {
                return Err(BountyError::validation(format!(
                    "request {} is already {}",
                    request.id, request.status
                )));
            }
            let mut bounty = uow.bounty(request.bounty_id)?;
            let now = Utc::now();

            request.reviewer = Some(actor.pubkey.clone());
            request.review_note = note.clone();
            request.reviewed_at = Some(now);

            match decision {
                ReviewDecision::Approve => {
                    request.status = RequestStatus::Approved;
                    uow.save_request(&request)?;

                    let mut superseded = Vec::new();
                    for mut other in uow.requests(bounty.id, Some(RequestStatus::Pending))? {
                        other.status = RequestStatus::Rejected;
                        other.reviewer = Some(actor.pubkey.clone());
                        other.review_note = Some(SUPERSEDED_NOTE.to_string());
                        other.reviewed_at = Some(now);
                        uow.save_request(&other)?;
                        superseded.push(other.id);
                    }

                    activity::record(
                        uow,
                        &bounty,
                        &actor.pubkey,
                        ActivityAction::RequestApproved,
                        json!({
                            "request_id": request.id,
                            "requester": request.requester,
                            "rejected": superseded,
                        }),
                    )?;
                    lifecycle::assign_within(
                        uow,
                        &mut bounty,
                        &request.requester,
                        &actor.pubkey,
                        ActivityAction::Assigned,
                    )?;
                }
                ReviewDecision::Reject => {
                    request.status = RequestStatus::Rejected;
                    uow.save_request(&request)?;
                    activity::record(
                        uow,
                        &bounty,
                        &actor.pubkey,
                        ActivityAction::RequestRejected,
                        json!({ "request_id": request.id, "requester": request.requester }),
                    )?;
                }
            }
            Ok(request)
        })?;

        info!(
            "Request {} {} by {}",
            request_id, request.status, actor.pubkey
        );
        Ok(request)
    }

    /// Withdraw one's own pending request. The row is removed, so the
    /// requester may bid again later.
    pub fn cancel_request(&self, actor: &Actor, request_id: Uuid) -> Result<()> {
        let (_, workspace_id) = self.request_scope(request_id)?;
        let actor = &self.members.scope(workspace_id, actor)?;

        self.storage.atomic(|uow| {
            let request = uow.request(request_id)?;
            if !actor.is(&request.requester) {
                return Err(BountyError::forbidden("only the requester may cancel a request"));
            }
            if request.status != RequestStatus::Pending {
                return Err(BountyError::validation(format!(
                    "request {} is already {}",
                    request.id, request.status
                )));
            }
            let bounty = uow.bounty(request.bounty_id)?;
            uow.delete_request(request.id)?;
            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::RequestCancelled,
                json!({ "request_id": request.id }),
            )?;
            Ok(())
        })?;

        info!("Request {} cancelled by {}", request_id, actor.pubkey);
        Ok(())
    }

    pub fn list_requests(
        &self,
        bounty_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BountyRequest>> {
        self.storage.atomic(|uow| {
            uow.bounty(bounty_id)?;
            uow.requests(bounty_id, status)
        })
    }
}
