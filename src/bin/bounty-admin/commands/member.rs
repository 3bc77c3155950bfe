//! Member commands - manage the workspace directory

use crate::style::*;
use anyhow::{bail, Result};
use bounty_ledger::{BountyCore, Role};
use uuid::Uuid;

pub fn add(core: &BountyCore, workspace: Uuid, pubkey: &str, role: Role) -> Result<()> {
    if !bounty_ledger::auth::is_valid_pubkey(pubkey) {
        bail!("Invalid pubkey: {:?}", pubkey);
    }
    core.storage().add_member(workspace, pubkey, role)?;
    print_success(&format!(
        "{} is now {} of {}",
        style_bold(pubkey),
        style_cyan(role.as_str()),
        workspace
    ));
    Ok(())
}

pub fn remove(core: &BountyCore, workspace: Uuid, pubkey: &str) -> Result<()> {
    if core.storage().remove_member(workspace, pubkey)? {
        print_success(&format!("Removed {} from {}", pubkey, workspace));
    } else {
        print_warning(&format!("{} is not a member of {}", pubkey, workspace));
    }
    Ok(())
}
