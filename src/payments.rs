//! Deposits and bounty payouts
//!
//! A payout is a single-shot PENDING transaction. Initiation stamps the
//! bounty's `paid_at` and moves no money; COMPLETED settles reserved into
//! paid and the bounty becomes PAID; FAILED clears `paid_at` and leaves the
//! reservation where it was, so payment can be initiated again.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity;
use crate::auth::{Actor, Capability, MemberDirectory};
use crate::config::Limits;
use crate::error::{BountyError, Result};
use crate::ledger::{self, LedgerReport};
use crate::lifecycle::{self, BountyEvent};
use crate::storage::{amount_to_sql, BountyStorage};
use crate::types::{
    ActivityAction, BountyStatus, PaymentDetail, Transaction, TransactionStatus, TransactionType,
    WorkspaceBudget,
};
use crate::validation;

#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub transaction: Transaction,
    pub budget: WorkspaceBudget,
}

#[derive(Clone)]
pub struct PaymentProcessor {
    storage: Arc<BountyStorage>,
    members: Arc<dyn MemberDirectory>,
    limits: Limits,
}

impl PaymentProcessor {
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

    /// Fund a workspace. Creates the ledger on first deposit.
    pub fn deposit(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        amount: u64,
        memo: Option<String>,
    ) -> Result<DepositReceipt> {
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::Deposit)?;
        if amount == 0 {
            return Err(BountyError::validation("deposit amount must be at least 1"));
        }
        amount_to_sql(amount)?;
        validation::validate_text("memo", memo.as_deref(), &self.limits)?;

        let receipt = self.storage.atomic(|uow| {
            let budget = ledger::deposit(uow, workspace_id, amount)?;
            let now = Utc::now();
            let transaction = Transaction {
                id: Uuid::new_v4(),
                workspace_id,
                bounty_id: None,
                kind: TransactionType::Deposit,
                amount,
                status: TransactionStatus::Completed,
                from_pubkey: Some(actor.pubkey.clone()),
                to_pubkey: None,
                memo: memo.clone(),
                external_ref: None,
                proof_of_payment: None,
                failure_reason: None,
                created_at: now,
                completed_at: Some(now),
            };
            uow.insert_transaction(&transaction)?;
            activity::record_workspace(
                uow,
                workspace_id,
                &actor.pubkey,
                ActivityAction::BudgetDeposited,
                json!({ "transaction_id": transaction.id, "amount": amount, "total": budget.total }),
            )?;
            Ok(DepositReceipt { transaction, budget })
        })?;

        info!(
            "Deposited {} into workspace {} (total {})",
            amount, workspace_id, receipt.budget.total
        );
        Ok(receipt)
    }

    /// Open a PENDING payout to the assignee of a COMPLETED bounty.
    pub fn initiate_payment(
        &self,
        actor: &Actor,
        bounty_id: Uuid,
        memo: Option<String>,
    ) -> Result<Transaction> {
        let actor = &self
            .members
            .scope(self.storage.bounty_workspace(bounty_id)?, actor)?;
        actor.require(Capability::ManagePayments)?;
        validation::validate_text("memo", memo.as_deref(), &self.limits)?;

        let transaction = self.storage.atomic(|uow| {
            let mut bounty = uow.bounty(bounty_id)?;

            let payments = uow.payments_for(bounty_id)?;
            if payments
                .iter()
                .any(|t| t.status == TransactionStatus::Completed)
            {
                return Err(BountyError::AlreadyPaid(bounty_id));
            }
            if let Some(pending) = payments
                .iter()
                .find(|t| t.status == TransactionStatus::Pending)
            {
                return Err(BountyError::Conflict(format!(
                    "payment {} for bounty {} is still pending",
                    pending.id, bounty_id
                )));
            }

            if bounty.status != BountyStatus::Completed {
                return Err(BountyError::InvalidState {
                    status: bounty.status,
                    action: "pay",
                });
            }
            let assignee = bounty
                .assignee()
                .map(str::to_string)
                .ok_or(BountyError::NoAssignee)?;
            if uow.accepted_proofs_by(bounty_id, &assignee)? == 0 {
                return Err(BountyError::NoAcceptedProof);
            }
            let budget = ledger::budget(uow, bounty.workspace_id)?;
            if budget.reserved < bounty.amount {
                return Err(BountyError::InsufficientBudget {
                    available: budget.reserved,
                    required: bounty.amount,
                });
            }

            let now = Utc::now();
            let transaction = Transaction {
                id: Uuid::new_v4(),
                workspace_id: bounty.workspace_id,
                bounty_id: Some(bounty_id),
                kind: TransactionType::Payment,
                amount: bounty.amount,
                status: TransactionStatus::Pending,
                from_pubkey: Some(actor.pubkey.clone()),
                to_pubkey: Some(assignee.clone()),
                memo: memo.clone(),
                external_ref: None,
                proof_of_payment: None,
                failure_reason: None,
                created_at: now,
                completed_at: None,
            };
            uow.insert_transaction(&transaction)?;

            bounty.paid_at = Some(now);
            bounty.updated_at = now;
            uow.save_bounty(&bounty)?;

            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                ActivityAction::PaymentInitiated,
                json!({
                    "transaction_id": transaction.id,
                    "amount": transaction.amount,
                    "to": assignee,
                }),
            )?;
            Ok(transaction)
        })?;

        info!(
            "Payment {} initiated for bounty {} ({} to {:?})",
            transaction.id, bounty_id, transaction.amount, transaction.to_pubkey
        );
        Ok(transaction)
    }

    /// Resolve a PENDING payout as COMPLETED or FAILED.
    pub fn update_payment_status(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
        status: TransactionStatus,
        detail: PaymentDetail,
    ) -> Result<Transaction> {
        let workspace_id = self
            .storage
            .atomic(|uow| Ok(uow.transaction(transaction_id)?.workspace_id))?;
        let actor = &self.members.scope(workspace_id, actor)?;
        actor.require(Capability::ManagePayments)?;
        if status == TransactionStatus::Pending {
            return Err(BountyError::validation(
                "payment status can only move to COMPLETED or FAILED",
            ));
        }
        for (field, text) in [
            ("external_ref", &detail.external_ref),
            ("proof_of_payment", &detail.proof_of_payment),
            ("failure_reason", &detail.failure_reason),
        ] {
            validation::validate_text(field, text.as_deref(), &self.limits)?;
        }

        let transaction = self.storage.atomic(|uow| {
            let mut transaction = uow.transaction(transaction_id)?;
            if transaction.status != TransactionStatus::Pending {
                return Err(BountyError::InvalidTransactionStatus(transaction.status));
            }
            let bounty_id = match (transaction.kind, transaction.bounty_id) {
                (TransactionType::Payment, Some(id)) => id,
                _ => {
                    return Err(BountyError::Invariant(format!(
                        "pending transaction {} is not a bounty payment",
                        transaction.id
                    )))
                }
            };
            let mut bounty = uow.bounty(bounty_id)?;
            let now = Utc::now();

            let action = match status {
                TransactionStatus::Completed => {
                    lifecycle::apply(uow, &mut bounty, BountyEvent::Settle)?;
                    transaction.status = TransactionStatus::Completed;
                    transaction.completed_at = Some(now);
                    transaction.external_ref = detail.external_ref.clone();
                    transaction.proof_of_payment = detail.proof_of_payment.clone();
                    ActivityAction::PaymentCompleted
                }
                _ => {
                    transaction.status = TransactionStatus::Failed;
                    transaction.failure_reason = detail.failure_reason.clone();
                    transaction.external_ref = detail.external_ref.clone();
                    bounty.paid_at = None;
                    bounty.updated_at = now;
                    ActivityAction::PaymentFailed
                }
            };
            uow.save_transaction(&transaction)?;
            uow.save_bounty(&bounty)?;

            activity::record(
                uow,
                &bounty,
                &actor.pubkey,
                action,
                json!({
                    "transaction_id": transaction.id,
                    "amount": transaction.amount,
                    "external_ref": transaction.external_ref,
                    "failure_reason": transaction.failure_reason,
                }),
            )?;
            Ok(transaction)
        })?;

        match transaction.status {
            TransactionStatus::Failed => warn!(
                "Payment {} failed: {}",
                transaction_id,
                transaction.failure_reason.as_deref().unwrap_or("no reason given")
            ),
            _ => info!("Payment {} settled by {}", transaction_id, actor.pubkey),
        }
        Ok(transaction)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn get_budget(&self, workspace_id: Uuid) -> Result<WorkspaceBudget> {
        self.storage.atomic(|uow| ledger::budget(uow, workspace_id))
    }

    pub fn verify_ledger(&self, workspace_id: Uuid) -> Result<LedgerReport> {
        self.storage.atomic(|uow| ledger::verify(uow, workspace_id))
    }

    pub fn list_transactions(&self, workspace_id: Uuid) -> Result<Vec<Transaction>> {
        self.storage.atomic(|uow| uow.transactions(workspace_id))
    }

    /// Most recent payout for a bounty.
    pub fn latest_payment(&self, bounty_id: Uuid) -> Result<Transaction> {
        self.storage.atomic(|uow| {
            uow.bounty(bounty_id)?;
            uow.payments_for(bounty_id)?
                .pop()
                .ok_or(BountyError::NoTransaction(bounty_id))
        })
    }
}
