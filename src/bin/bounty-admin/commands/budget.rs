//! Budget command - show ledger buckets

use crate::style::*;
use anyhow::Result;
use bounty_ledger::BountyCore;
use uuid::Uuid;

pub fn run(core: &BountyCore, workspace: Uuid) -> Result<()> {
    let budget = core.payments.get_budget(workspace)?;

    print_header(&format!("Budget {}", workspace));
    println!("Total:     {}", style_bold(&format_amount(budget.total)));
    println!("Available: {}", style_green(&format_amount(budget.available)));
    println!("Reserved:  {}", style_yellow(&format_amount(budget.reserved)));
    println!("Paid:      {}", style_cyan(&format_amount(budget.paid)));
    if budget.total == 0 {
        println!();
        print_warning("Workspace has no funds yet");
    }
    Ok(())
}
