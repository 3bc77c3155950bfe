//! Deposit command - fund a workspace budget

use crate::style::*;
use anyhow::{bail, Result};
use bounty_ledger::{Actor, BountyCore, BountyError, Role};
use uuid::Uuid;

pub fn run(
    core: &BountyCore,
    operator: &str,
    workspace: Uuid,
    amount: u64,
    memo: Option<String>,
) -> Result<()> {
    let actor = Actor::new(operator, Role::Owner)?;
    let receipt = match core.payments.deposit(&actor, workspace, amount, memo) {
        Err(e @ BountyError::Forbidden(_)) => bail!(
            "{} (run `bounty-admin member add {} {} --role owner` first)",
            e,
            workspace,
            operator
        ),
        other => other?,
    };

    print_success(&format!(
        "Deposited {} into {}",
        style_bold(&format_amount(amount)),
        workspace
    ));
    println!("Transaction: {}", style_dim(&receipt.transaction.id.to_string()));
    println!(
        "Available:   {}",
        style_green(&format_amount(receipt.budget.available))
    );
    println!("Total:       {}", format_amount(receipt.budget.total));
    Ok(())
}
