//! Wiring for the four workflow components over one store.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::MemberDirectory;
use crate::config::{Config, Limits};
use crate::error::Result;
use crate::ledger::{self, LedgerReport};
use crate::lifecycle::BountyStateMachine;
use crate::payments::PaymentProcessor;
use crate::proofs::ProofWorkflow;
use crate::requests::RequestWorkflow;
use crate::storage::BountyStorage;
use crate::types::BountyActivity;

#[derive(Clone)]
pub struct BountyCore {
    pub bounties: BountyStateMachine,
    pub requests: RequestWorkflow,
    pub proofs: ProofWorkflow,
    pub payments: PaymentProcessor,
    storage: Arc<BountyStorage>,
}

impl BountyCore {
    /// Use the store's own `workspace_members` table as the directory.
    pub fn new(storage: Arc<BountyStorage>, limits: Limits) -> Self {
        let members: Arc<dyn MemberDirectory> = storage.clone();
        Self::with_directory(storage, members, limits)
    }

    pub fn with_directory(
        storage: Arc<BountyStorage>,
        members: Arc<dyn MemberDirectory>,
        limits: Limits,
    ) -> Self {
        Self {
            bounties: BountyStateMachine::new(storage.clone(), members.clone(), limits.clone()),
            requests: RequestWorkflow::new(storage.clone(), members.clone(), limits.clone()),
            proofs: ProofWorkflow::new(storage.clone(), members.clone(), limits.clone()),
            payments: PaymentProcessor::new(storage.clone(), members, limits),
            storage,
        }
    }

    /// Open the database named by the config.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(BountyStorage::new(config.database_path())?);
        Ok(Self::new(storage, config.limits.clone()))
    }

    pub fn storage(&self) -> &Arc<BountyStorage> {
        &self.storage
    }

    /// Newest first, bounty and workspace-level entries together.
    pub fn workspace_activity(&self, workspace_id: Uuid, limit: u32) -> Result<Vec<BountyActivity>> {
        self.storage
            .atomic(|uow| uow.workspace_activities(workspace_id, limit))
    }

    /// Verify every funded workspace.
    pub fn verify_all(&self) -> Result<Vec<LedgerReport>> {
        let workspaces = self.storage.workspaces_with_budget()?;
        self.storage.atomic(|uow| {
            workspaces
                .iter()
                .map(|id| ledger::verify(uow, *id))
                .collect()
        })
    }
}
