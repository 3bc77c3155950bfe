//! Activity command - recent audit log entries

use crate::style::*;
use anyhow::Result;
use bounty_ledger::BountyCore;
use uuid::Uuid;

pub fn run(core: &BountyCore, workspace: Uuid, limit: u32) -> Result<()> {
    let entries = core.workspace_activity(workspace, limit)?;

    print_header(&format!("Activity {}", workspace));
    if entries.is_empty() {
        println!("{}", style_dim("No activity recorded"));
        return Ok(());
    }

    for entry in entries {
        let target = entry
            .bounty_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "workspace".to_string());
        println!(
            "{}  {:<18} {:<16} {}",
            style_dim(&entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            style_cyan(entry.action.as_str()),
            truncate_pubkey(&entry.actor),
            target
        );
    }
    Ok(())
}
