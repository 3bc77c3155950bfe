//! Append-only audit log
//!
//! Entries are written through the caller's [`UnitOfWork`], so an activity
//! is durable exactly when the state change it describes commits.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::UnitOfWork;
use crate::types::{ActivityAction, Bounty, BountyActivity};

/// Append an entry about `bounty`.
pub fn record(
    uow: &UnitOfWork<'_>,
    bounty: &Bounty,
    actor: &str,
    action: ActivityAction,
    detail: Value,
) -> Result<BountyActivity> {
    append(uow, bounty.workspace_id, Some(bounty.id), actor, action, detail)
}

/// Append a workspace-level entry with no bounty attached.
pub fn record_workspace(
    uow: &UnitOfWork<'_>,
    workspace_id: Uuid,
    actor: &str,
    action: ActivityAction,
    detail: Value,
) -> Result<BountyActivity> {
    append(uow, workspace_id, None, actor, action, detail)
}

fn append(
    uow: &UnitOfWork<'_>,
    workspace_id: Uuid,
    bounty_id: Option<Uuid>,
    actor: &str,
    action: ActivityAction,
    detail: Value,
) -> Result<BountyActivity> {
    let activity = BountyActivity {
        id: Uuid::new_v4(),
        workspace_id,
        bounty_id,
        actor: actor.to_string(),
        action,
        detail,
        created_at: Utc::now(),
    };
    uow.insert_activity(&activity)?;
    debug!("Activity {} by {} on {:?}", action, actor, bounty_id);
    Ok(activity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BountyStorage;
    use serde_json::json;

    #[test]
    fn test_workspace_activity_round_trip() {
        let storage = BountyStorage::in_memory().unwrap();
        let workspace = Uuid::new_v4();

        storage
            .atomic(|uow| {
                record_workspace(
                    uow,
                    workspace,
                    "owner",
                    ActivityAction::BudgetDeposited,
                    json!({ "amount": 100 }),
                )
            })
            .unwrap();

        let entries = storage
            .atomic(|uow| uow.workspace_activities(workspace, 10))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, ActivityAction::BudgetDeposited);
        assert_eq!(entries[0].detail["amount"], 100);
        assert_eq!(entries[0].bounty_id, None);
    }
}
