//! Workspace budget ledger
//!
//! Four buckets per workspace: total, available, reserved and paid, with
//! `total == available + reserved + paid` checked before and after every
//! mutation. Each operation moves money between exactly two of the three
//! spendable buckets; only [`deposit`] grows the total.
//!
//! Counter overflow, underflow of a bucket that the caller already vouched
//! for, or a broken invariant are bugs and surface as
//! [`BountyError::Invariant`], which aborts the enclosing unit of work.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BountyError, Result};
use crate::storage::UnitOfWork;
use crate::types::WorkspaceBudget;

// ============================================================================
// BUCKET ARITHMETIC
// ============================================================================

fn add(bucket: &'static str, value: u64, delta: u64) -> Result<u64> {
    value
        .checked_add(delta)
        .ok_or_else(|| BountyError::Invariant(format!("{} overflow adding {}", bucket, delta)))
}

fn sub(bucket: &'static str, value: u64, delta: u64) -> Result<u64> {
    value.checked_sub(delta).ok_or_else(|| {
        BountyError::Invariant(format!("{} underflow: {} - {}", bucket, value, delta))
    })
}

impl WorkspaceBudget {
    pub fn check_invariant(&self) -> Result<()> {
        let sum = self
            .available
            .checked_add(self.reserved)
            .and_then(|s| s.checked_add(self.paid));
        match sum {
            Some(sum) if sum == self.total => Ok(()),
            _ => Err(BountyError::Invariant(format!(
                "workspace {}: total {} != available {} + reserved {} + paid {}",
                self.workspace_id, self.total, self.available, self.reserved, self.paid
            ))),
        }
    }

    /// Apply `f` to a copy and keep it only if it succeeds and the invariant
    /// still holds.
    fn mutate<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut WorkspaceBudget) -> Result<()>,
    {
        self.check_invariant()?;
        let mut next = self.clone();
        f(&mut next)?;
        next.check_invariant()?;
        next.updated_at = Utc::now();
        *self = next;
        Ok(())
    }

    pub fn apply_deposit(&mut self, amount: u64) -> Result<()> {
        if amount == 0 {
            return Err(BountyError::validation("deposit amount must be at least 1"));
        }
        self.mutate(|b| {
            b.total = add("total", b.total, amount)?;
            b.available = add("available", b.available, amount)?;
            Ok(())
        })
    }

    pub fn apply_reserve(&mut self, amount: u64) -> Result<()> {
        if self.available < amount {
            return Err(BountyError::InsufficientBudget {
                available: self.available,
                required: amount,
            });
        }
        self.mutate(|b| {
            b.available = sub("available", b.available, amount)?;
            b.reserved = add("reserved", b.reserved, amount)?;
            Ok(())
        })
    }

    pub fn apply_release(&mut self, amount: u64) -> Result<()> {
        self.mutate(|b| {
            b.reserved = sub("reserved", b.reserved, amount)?;
            b.available = add("available", b.available, amount)?;
            Ok(())
        })
    }

    pub fn apply_settle(&mut self, amount: u64) -> Result<()> {
        self.mutate(|b| {
            b.reserved = sub("reserved", b.reserved, amount)?;
            b.paid = add("paid", b.paid, amount)?;
            Ok(())
        })
    }

    /// Positive delta reserves more (needs available budget), negative
    /// releases.
    pub fn apply_adjustment(&mut self, delta: i64) -> Result<()> {
        match delta {
            0 => Ok(()),
            d if d > 0 => self.apply_reserve(d.unsigned_abs()),
            d => self.apply_release(d.unsigned_abs()),
        }
    }
}

// ============================================================================
// LEDGER OPERATIONS
// ============================================================================

fn load(uow: &UnitOfWork<'_>, workspace_id: Uuid) -> Result<WorkspaceBudget> {
    Ok(uow
        .budget(workspace_id)?
        .unwrap_or_else(|| WorkspaceBudget::empty(workspace_id)))
}

fn load_existing(uow: &UnitOfWork<'_>, workspace_id: Uuid) -> Result<WorkspaceBudget> {
    uow.budget(workspace_id)?.ok_or_else(|| {
        BountyError::Invariant(format!("workspace {} has no ledger", workspace_id))
    })
}

fn store(uow: &UnitOfWork<'_>, budget: &WorkspaceBudget, op: &str, amount: u64) -> Result<()> {
    uow.save_budget(budget)?;
    debug!(
        "Ledger {} {} on {}: available={} reserved={} paid={}",
        op, amount, budget.workspace_id, budget.available, budget.reserved, budget.paid
    );
    Ok(())
}

/// Current budget; an unfunded workspace reads as all zeroes.
pub fn budget(uow: &UnitOfWork<'_>, workspace_id: Uuid) -> Result<WorkspaceBudget> {
    let budget = load(uow, workspace_id)?;
    budget.check_invariant()?;
    Ok(budget)
}

/// total += amount, available += amount. Creates the ledger on first use.
pub fn deposit(uow: &UnitOfWork<'_>, workspace_id: Uuid, amount: u64) -> Result<WorkspaceBudget> {
    let mut budget = load(uow, workspace_id)?;
    budget.apply_deposit(amount)?;
    store(uow, &budget, "deposit", amount)?;
    Ok(budget)
}

/// available -= amount, reserved += amount.
pub fn reserve(uow: &UnitOfWork<'_>, workspace_id: Uuid, amount: u64) -> Result<WorkspaceBudget> {
    let mut budget = load(uow, workspace_id)?;
    budget.apply_reserve(amount)?;
    store(uow, &budget, "reserve", amount)?;
    Ok(budget)
}

/// reserved -= amount, available += amount.
pub fn release(uow: &UnitOfWork<'_>, workspace_id: Uuid, amount: u64) -> Result<WorkspaceBudget> {
    let mut budget = load_existing(uow, workspace_id)?;
    budget.apply_release(amount)?;
    store(uow, &budget, "release", amount)?;
    Ok(budget)
}

/// reserved -= amount, paid += amount.
pub fn settle(uow: &UnitOfWork<'_>, workspace_id: Uuid, amount: u64) -> Result<WorkspaceBudget> {
    let mut budget = load_existing(uow, workspace_id)?;
    budget.apply_settle(amount)?;
    store(uow, &budget, "settle", amount)?;
    Ok(budget)
}

pub fn adjust_reservation(
    uow: &UnitOfWork<'_>,
    workspace_id: Uuid,
    delta: i64,
) -> Result<WorkspaceBudget> {
    let mut budget = load(uow, workspace_id)?;
    if delta == 0 {
        return Ok(budget);
    }
    budget.apply_adjustment(delta)?;
    store(uow, &budget, "adjust", delta.unsigned_abs())?;
    Ok(budget)
}

/// Signed difference `new - old` for an amount edit.
pub fn amount_delta(old: u64, new: u64) -> Result<i64> {
    let old = i64::try_from(old).map_err(|_| BountyError::validation("amount out of range"))?;
    let new = i64::try_from(new).map_err(|_| BountyError::validation("amount out of range"))?;
    Ok(new - old)
}

/// Result of cross-checking a ledger against the bounties that hold funds.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub budget: WorkspaceBudget,
    pub reserved_by_bounties: u64,
    pub invariant_holds: bool,
    pub reservations_match: bool,
}

impl LedgerReport {
    pub fn is_consistent(&self) -> bool {
        self.invariant_holds && self.reservations_match
    }
}

/// Recompute the invariant and compare `reserved` with the sum of amounts
/// of bounties whose status carries a reservation.
pub fn verify(uow: &UnitOfWork<'_>, workspace_id: Uuid) -> Result<LedgerReport> {
    let budget = load(uow, workspace_id)?;
    let invariant_holds = budget.check_invariant().is_ok();
    let reserved_by_bounties = uow.reserved_by_bounties(workspace_id)?;
    let reservations_match = reserved_by_bounties == budget.reserved;
    if !(invariant_holds && reservations_match) {
        warn!(
            "Ledger for {} inconsistent: reserved={} bounties hold {}",
            workspace_id, budget.reserved, reserved_by_bounties
        );
    }
    Ok(LedgerReport {
        budget,
        reserved_by_bounties,
        invariant_holds,
        reservations_match,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BountyStorage;
    use proptest::prelude::*;

    fn funded(available: u64) -> WorkspaceBudget {
        let mut budget = WorkspaceBudget::empty(Uuid::new_v4());
        budget.apply_deposit(available).unwrap();
        budget
    }

    #[test]
    fn test_reserve_release_settle() {
        let mut budget = funded(100_000);

        budget.apply_reserve(50_000).unwrap();
        assert_eq!((budget.available, budget.reserved, budget.paid), (50_000, 50_000, 0));

        budget.apply_release(10_000).unwrap();
        assert_eq!((budget.available, budget.reserved), (60_000, 40_000));

        budget.apply_settle(40_000).unwrap();
        assert_eq!((budget.available, budget.reserved, budget.paid), (60_000, 0, 40_000));
        assert_eq!(budget.total, 100_000);
    }

    #[test]
    fn test_reserve_insufficient() {
        let mut budget = funded(10);
        let before = budget.clone();

        let err = budget.apply_reserve(11).unwrap_err();
        assert!(matches!(
            err,
            BountyError::InsufficientBudget {
                available: 10,
                required: 11
            }
        ));
        assert_eq!(budget, before);
    }

    #[test]
    fn test_release_underflow_is_fatal() {
        let mut budget = funded(10);
        let err = budget.apply_release(1).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(budget.reserved, 0);
        assert_eq!(budget.available, 10);
    }

    #[test]
    fn test_deposit_overflow_is_fatal() {
        let mut budget = funded(u64::MAX);
        assert!(budget.apply_deposit(1).unwrap_err().is_fatal());
        assert_eq!(budget.total, u64::MAX);
    }

    #[test]
    fn test_corrupt_budget_refuses_mutation() {
        let mut budget = funded(10);
        budget.paid = 5;
        assert!(budget.apply_deposit(1).unwrap_err().is_fatal());
    }

    #[test]
    fn test_adjustment_directions() {
        let mut budget = funded(100);
        budget.apply_reserve(40).unwrap();

        budget.apply_adjustment(20).unwrap();
        assert_eq!((budget.available, budget.reserved), (40, 60));

        budget.apply_adjustment(-50).unwrap();
        assert_eq!((budget.available, budget.reserved), (90, 10));

        assert!(matches!(
            budget.apply_adjustment(91),
            Err(BountyError::InsufficientBudget { .. })
        ));
    }

    #[test]
    fn test_ledger_ops_persist() {
        let storage = BountyStorage::in_memory().unwrap();
        let workspace = Uuid::new_v4();

        storage.atomic(|uow| deposit(uow, workspace, 1_000)).unwrap();
        storage.atomic(|uow| reserve(uow, workspace, 400)).unwrap();
        storage.atomic(|uow| settle(uow, workspace, 100)).unwrap();

        let snapshot = storage.atomic(|uow| budget(uow, workspace)).unwrap();
        assert_eq!(snapshot.total, 1_000);
        assert_eq!(snapshot.available, 600);
        assert_eq!(snapshot.reserved, 300);
        assert_eq!(snapshot.paid, 100);
    }

    #[test]
    fn test_reserve_on_unfunded_workspace() {
        let storage = BountyStorage::in_memory().unwrap();
        let err = storage
            .atomic(|uow| reserve(uow, Uuid::new_v4(), 1))
            .unwrap_err();
        assert!(matches!(err, BountyError::InsufficientBudget { available: 0, .. }));
    }

    #[test]
    fn test_release_without_ledger_is_fatal() {
        let storage = BountyStorage::in_memory().unwrap();
        let err = storage
            .atomic(|uow| release(uow, Uuid::new_v4(), 1))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(u64),
        Reserve(u64),
        Release(u64),
        Settle(u64),
        Adjust(i64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..10_000).prop_map(Op::Deposit),
            (0u64..10_000).prop_map(Op::Reserve),
            (0u64..10_000).prop_map(Op::Release),
            (0u64..10_000).prop_map(Op::Settle),
            (-10_000i64..10_000).prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #[test]
        fn proptest_invariant_holds_after_any_sequence(ops in prop::collection::vec(arb_op(), 0..64)) {
            let mut budget = WorkspaceBudget::empty(Uuid::new_v4());
            for op in ops {
                let before = budget.clone();
                let result = match op {
                    Op::Deposit(a) => budget.apply_deposit(a),
                    Op::Reserve(a) => budget.apply_reserve(a),
                    Op::Release(a) => budget.apply_release(a),
                    Op::Settle(a) => budget.apply_settle(a),
                    Op::Adjust(d) => budget.apply_adjustment(d),
                };
                prop_assert!(budget.check_invariant().is_ok(), "invariant must hold");
                if result.is_err() {
                    prop_assert_eq!(&budget, &before, "failed op must leave budget unchanged");
                } else {
                    prop_assert_eq!(budget.total >= before.total, true, "total never shrinks");
                }
            }
        }
    }
}
