//! Verify command - check ledger invariants

use crate::style::*;
use anyhow::{bail, Result};
use bounty_ledger::{BountyCore, LedgerReport};
use uuid::Uuid;

pub fn run(core: &BountyCore, workspace: Option<Uuid>) -> Result<()> {
    let reports = match workspace {
        Some(id) => vec![core.payments.verify_ledger(id)?],
        None => core.verify_all()?,
    };

    print_header("Ledger Verification");
    if reports.is_empty() {
        println!("{}", style_dim("No funded workspaces"));
        return Ok(());
    }

    let mut broken = 0;
    for report in &reports {
        print_report(report);
        if !report.is_consistent() {
            broken += 1;
        }
    }

    println!();
    if broken > 0 {
        bail!("{} of {} ledgers are inconsistent", broken, reports.len());
    }
    print_success(&format!("{} ledgers consistent", reports.len()));
    Ok(())
}

fn print_report(report: &LedgerReport) {
    let budget = &report.budget;
    let mark = if report.is_consistent() {
        style_green("ok")
    } else {
        style_red("FAIL")
    };
    println!(
        "{:<4} {}  total={} available={} reserved={} paid={}",
        mark,
        budget.workspace_id,
        budget.total,
        budget.available,
        budget.reserved,
        budget.paid
    );
    if !report.invariant_holds {
        println!("     {}", style_red("total != available + reserved + paid"));
    }
    if !report.reservations_match {
        println!(
            "     {}",
            style_yellow(&format!(
                "reserved {} but funded bounties hold {}",
                budget.reserved, report.reserved_by_bounties
            ))
        );
    }
}
