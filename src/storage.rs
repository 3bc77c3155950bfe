//! SQLite storage for bounties, budgets and the audit log
//!
//! One connection guarded by a mutex. Every composite operation runs through
//! [`BountyStorage::atomic`], which holds the lock for the whole IMMEDIATE
//! transaction, so units of work are serialized and either commit entirely
//! or leave no trace.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, TransactionBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{MemberDirectory, Role};
use crate::error::{BountyError, Result};
use crate::types::{
    ActivityAction, Assignment, Bounty, BountyActivity, BountyProof, BountyRequest,
    BountyStatus, ProofStatus, RequestStatus, Transaction, TransactionStatus, TransactionType,
    WorkspaceBudget,
};

const SCHEMA_V1: &str = include_str!("../migrations/001_schema.sql");

// ============================================================================
// COLUMN CONVERSIONS
// ============================================================================

macro_rules! sql_text_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse::<$ty>()
                    .map_err(|e| FromSqlError::Other(e.into()))
            }
        }
    )+};
}

sql_text_enum!(
    BountyStatus,
    RequestStatus,
    ProofStatus,
    TransactionType,
    TransactionStatus,
    ActivityAction,
    Role,
);

/// Amounts are u64 in the domain and INTEGER (i64) in SQLite.
pub(crate) fn amount_to_sql(amount: u64) -> Result<i64> {
    i64::try_from(amount)
        .map_err(|_| BountyError::validation(format!("amount {} exceeds storage range", amount)))
}

fn amount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn tags_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const BOUNTY_COLUMNS: &str = "id, workspace_id, creator, title, description, amount, status, \
     assignee, assigned_at, tags, created_at, updated_at, completed_at, paid_at, deleted_at";

fn bounty_from_row(row: &Row<'_>) -> rusqlite::Result<Bounty> {
    let assignee: Option<String> = row.get(7)?;
    let assigned_at: Option<DateTime<Utc>> = row.get(8)?;
    let assignment = match (assignee, assigned_at) {
        (Some(assignee), Some(since)) => Assignment::Assigned { assignee, since },
        _ => Assignment::Unassigned,
    };

    Ok(Bounty {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        creator: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        amount: amount_column(row, 5)?,
        status: row.get(6)?,
        assignment,
        tags: tags_column(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        completed_at: row.get(12)?,
        paid_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

const BUDGET_COLUMNS: &str =
    "workspace_id, total_budget, available_budget, reserved_budget, paid_budget, updated_at";

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<WorkspaceBudget> {
    Ok(WorkspaceBudget {
        workspace_id: row.get(0)?,
        total: amount_column(row, 1)?,
        available: amount_column(row, 2)?,
        reserved: amount_column(row, 3)?,
        paid: amount_column(row, 4)?,
        updated_at: row.get(5)?,
    })
}

const REQUEST_COLUMNS: &str =
    "id, bounty_id, requester, status, message, reviewer, review_note, reviewed_at, created_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<BountyRequest> {
    Ok(BountyRequest {
        id: row.get(0)?,
        bounty_id: row.get(1)?,
        requester: row.get(2)?,
        status: row.get(3)?,
        message: row.get(4)?,
        reviewer: row.get(5)?,
        review_note: row.get(6)?,
        reviewed_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const PROOF_COLUMNS: &str = "id, bounty_id, submitter, url, description, status, reviewer, \
     review_note, reviewed_at, created_at";

fn proof_from_row(row: &Row<'_>) -> rusqlite::Result<BountyProof> {
    Ok(BountyProof {
        id: row.get(0)?,
        bounty_id: row.get(1)?,
        submitter: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        reviewer: row.get(6)?,
        review_note: row.get(7)?,
        reviewed_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, workspace_id, bounty_id, kind, amount, status, from_pubkey, \
     to_pubkey, memo, external_ref, proof_of_payment, failure_reason, created_at, completed_at";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        bounty_id: row.get(2)?,
        kind: row.get(3)?,
        amount: amount_column(row, 4)?,
        status: row.get(5)?,
        from_pubkey: row.get(6)?,
        to_pubkey: row.get(7)?,
        memo: row.get(8)?,
        external_ref: row.get(9)?,
        proof_of_payment: row.get(10)?,
        failure_reason: row.get(11)?,
        created_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

const ACTIVITY_COLUMNS: &str = "id, workspace_id, bounty_id, actor, action, detail, created_at";

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<BountyActivity> {
    Ok(BountyActivity {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        bounty_id: row.get(2)?,
        actor: row.get(3)?,
        action: row.get(4)?,
        detail: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// ============================================================================
// STORAGE
// ============================================================================

pub struct BountyStorage {
    conn: Mutex<Connection>,
}

impl BountyStorage {
    /// Open (or create) a database file and apply migrations
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        let storage = Self::from_connection(conn)?;
        info!("Opened bounty database at {}", path.display());
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations')",
            [],
            |row| row.get(0),
        )?;

        if !exists {
            conn.execute_batch(SCHEMA_V1)?;
            info!("Applied migration 001_schema");
        }

        Ok(())
    }

    /// Run `f` as one serializable unit of work.
    ///
    /// Commits when `f` returns `Ok`; any error rolls back every write made
    /// through the [`UnitOfWork`].
    pub fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let uow = UnitOfWork { tx };

        match f(&uow) {
            Ok(value) => {
                uow.tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if e.is_fatal() {
                    error!("Aborting unit of work: {}", e);
                } else {
                    debug!("Rolling back unit of work: {}", e);
                }
                if let Err(rollback) = uow.tx.rollback() {
                    warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    // ========================================================================
    // MEMBERSHIP
    // ========================================================================

    pub fn add_member(&self, workspace_id: Uuid, pubkey: &str, role: Role) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO workspace_members (workspace_id, pubkey, role, added_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (workspace_id, pubkey) DO UPDATE SET role = excluded.role",
            params![workspace_id, pubkey, role, Utc::now()],
        )?;
        info!("Added {} to workspace {} as {}", pubkey, workspace_id, role);
        Ok(())
    }

    pub fn remove_member(&self, workspace_id: Uuid, pubkey: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM workspace_members WHERE workspace_id = ?1 AND pubkey = ?2",
            params![workspace_id, pubkey],
        )?;
        Ok(removed > 0)
    }

    /// Workspace that owns a live bounty
    pub fn bounty_workspace(&self, id: Uuid) -> Result<Uuid> {
        self.atomic(|uow| Ok(uow.bounty(id)?.workspace_id))
    }

    /// Every workspace that has a ledger row
    pub fn workspaces_with_budget(&self) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT workspace_id FROM workspace_budgets")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<Uuid>>>()?;
        Ok(ids)
    }
}

impl MemberDirectory for BountyStorage {
    fn role_of(&self, workspace_id: Uuid, pubkey: &str) -> Result<Option<Role>> {
        let conn = self.conn.lock();
        let role = conn
            .query_row(
                "SELECT role FROM workspace_members WHERE workspace_id = ?1 AND pubkey = ?2",
                params![workspace_id, pubkey],
                |row| row.get(0),
            )
            .optional()?;
        Ok(role)
    }
}

// ============================================================================
// UNIT OF WORK
// ============================================================================

/// Typed access to the tables inside one open transaction.
pub struct UnitOfWork<'c> {
    tx: rusqlite::Transaction<'c>,
}

impl UnitOfWork<'_> {
    // ------------------------------------------------------------------------
    // Budgets
    // ------------------------------------------------------------------------

    pub fn budget(&self, workspace_id: Uuid) -> Result<Option<WorkspaceBudget>> {
        let budget = self
            .tx
            .query_row(
                &format!(
                    "SELECT {} FROM workspace_budgets WHERE workspace_id = ?1",
                    BUDGET_COLUMNS
                ),
                params![workspace_id],
                budget_from_row,
            )
            .optional()?;
        Ok(budget)
    }

    pub(crate) fn save_budget(&self, budget: &WorkspaceBudget) -> Result<()> {
        self.tx.execute(
            "INSERT INTO workspace_budgets
                 (workspace_id, total_budget, available_budget, reserved_budget, paid_budget, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (workspace_id) DO UPDATE SET
                 total_budget = excluded.total_budget,
                 available_budget = excluded.available_budget,
                 reserved_budget = excluded.reserved_budget,
                 paid_budget = excluded.paid_budget,
                 updated_at = excluded.updated_at",
            params![
                budget.workspace_id,
                amount_to_sql(budget.total)?,
                amount_to_sql(budget.available)?,
                amount_to_sql(budget.reserved)?,
                amount_to_sql(budget.paid)?,
                budget.updated_at,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Bounties
    // ------------------------------------------------------------------------

    /// Live bounty by id; soft-deleted rows read as NOT_FOUND
    pub fn bounty(&self, id: Uuid) -> Result<Bounty> {
        self.tx
            .query_row(
                &format!(
                    "SELECT {} FROM bounties WHERE id = ?1 AND deleted_at IS NULL",
                    BOUNTY_COLUMNS
                ),
                params![id],
                bounty_from_row,
            )
            .optional()?
            .ok_or_else(|| BountyError::not_found("bounty", id))
    }

    pub fn insert_bounty(&self, bounty: &Bounty) -> Result<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO bounties ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                BOUNTY_COLUMNS
            ),
            params![
                bounty.id,
                bounty.workspace_id,
                bounty.creator,
                bounty.title,
                bounty.description,
                amount_to_sql(bounty.amount)?,
                bounty.status,
                bounty.assignee(),
                assigned_since(&bounty.assignment),
                serde_json::to_string(&bounty.tags)?,
                bounty.created_at,
                bounty.updated_at,
                bounty.completed_at,
                bounty.paid_at,
                bounty.deleted_at,
            ],
        )?;
        Ok(())
    }

    pub fn save_bounty(&self, bounty: &Bounty) -> Result<()> {
        let updated = self.tx.execute(
            "UPDATE bounties SET
                 title = ?2, description = ?3, amount = ?4, status = ?5,
                 assignee = ?6, assigned_at = ?7, tags = ?8, updated_at = ?9,
                 completed_at = ?10, paid_at = ?11, deleted_at = ?12
             WHERE id = ?1",
            params![
                bounty.id,
                bounty.title,
                bounty.description,
                amount_to_sql(bounty.amount)?,
                bounty.status,
                bounty.assignee(),
                assigned_since(&bounty.assignment),
                serde_json::to_string(&bounty.tags)?,
                bounty.updated_at,
                bounty.completed_at,
                bounty.paid_at,
                bounty.deleted_at,
            ],
        )?;
        if updated == 0 {
            return Err(BountyError::not_found("bounty", bounty.id));
        }
        Ok(())
    }

    pub fn bounties(
        &self,
        workspace_id: Uuid,
        status: Option<BountyStatus>,
    ) -> Result<Vec<Bounty>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM bounties
             WHERE workspace_id = ?1 AND deleted_at IS NULL AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC",
            BOUNTY_COLUMNS
        ))?;
        let bounties = stmt
            .query_map(params![workspace_id, status], bounty_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(bounties)
    }

    /// Sum of amounts held by bounties whose status carries a reservation
    pub fn reserved_by_bounties(&self, workspace_id: Uuid) -> Result<u64> {
        let total: i64 = self.tx.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM bounties
             WHERE workspace_id = ?1 AND status IN ('OPEN', 'ASSIGNED', 'IN_REVIEW', 'COMPLETED')",
            params![workspace_id],
            |row| row.get(0),
        )?;
        u64::try_from(total).map_err(|_| BountyError::Invariant("negative reserved sum".into()))
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    pub fn request(&self, id: Uuid) -> Result<BountyRequest> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM bounty_requests WHERE id = ?1", REQUEST_COLUMNS),
                params![id],
                request_from_row,
            )
            .optional()?
            .ok_or_else(|| BountyError::not_found("request", id))
    }

    pub fn request_by(&self, bounty_id: Uuid, requester: &str) -> Result<Option<BountyRequest>> {
        let request = self
            .tx
            .query_row(
                &format!(
                    "SELECT {} FROM bounty_requests WHERE bounty_id = ?1 AND requester = ?2",
                    REQUEST_COLUMNS
                ),
                params![bounty_id, requester],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    pub fn requests(
        &self,
        bounty_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<BountyRequest>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM bounty_requests
             WHERE bounty_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at, rowid",
            REQUEST_COLUMNS
        ))?;
        let requests = stmt
            .query_map(params![bounty_id, status], request_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }

    pub fn insert_request(&self, request: &BountyRequest) -> Result<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO bounty_requests ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                REQUEST_COLUMNS
            ),
            params![
                request.id,
                request.bounty_id,
                request.requester,
                request.status,
                request.message,
                request.reviewer,
                request.review_note,
                request.reviewed_at,
                request.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn save_request(&self, request: &BountyRequest) -> Result<()> {
        self.tx.execute(
            "UPDATE bounty_requests SET status = ?2, reviewer = ?3, review_note = ?4, reviewed_at = ?5
             WHERE id = ?1",
            params![
                request.id,
                request.status,
                request.reviewer,
                request.review_note,
                request.reviewed_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete_request(&self, id: Uuid) -> Result<()> {
        self.tx
            .execute("DELETE FROM bounty_requests WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Proofs
    // ------------------------------------------------------------------------

    pub fn proof(&self, id: Uuid) -> Result<BountyProof> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM bounty_proofs WHERE id = ?1", PROOF_COLUMNS),
                params![id],
                proof_from_row,
            )
            .optional()?
            .ok_or_else(|| BountyError::not_found("proof", id))
    }

    pub fn proofs(&self, bounty_id: Uuid) -> Result<Vec<BountyProof>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM bounty_proofs WHERE bounty_id = ?1 ORDER BY created_at, rowid",
            PROOF_COLUMNS
        ))?;
        let proofs = stmt
            .query_map(params![bounty_id], proof_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(proofs)
    }

    /// Accepted proofs on `bounty_id` submitted by `submitter`
    pub fn accepted_proofs_by(&self, bounty_id: Uuid, submitter: &str) -> Result<u32> {
        let count: u32 = self.tx.query_row(
            "SELECT COUNT(*) FROM bounty_proofs
             WHERE bounty_id = ?1 AND submitter = ?2 AND status = 'ACCEPTED'",
            params![bounty_id, submitter],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_proof(&self, proof: &BountyProof) -> Result<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO bounty_proofs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                PROOF_COLUMNS
            ),
            params![
                proof.id,
                proof.bounty_id,
                proof.submitter,
                proof.url,
                proof.description,
                proof.status,
                proof.reviewer,
                proof.review_note,
                proof.reviewed_at,
                proof.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn save_proof(&self, proof: &BountyProof) -> Result<()> {
        self.tx.execute(
            "UPDATE bounty_proofs SET status = ?2, reviewer = ?3, review_note = ?4, reviewed_at = ?5
             WHERE id = ?1",
            params![
                proof.id,
                proof.status,
                proof.reviewer,
                proof.review_note,
                proof.reviewed_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete_proof(&self, id: Uuid) -> Result<()> {
        self.tx
            .execute("DELETE FROM bounty_proofs WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    pub fn transaction(&self, id: Uuid) -> Result<Transaction> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS),
                params![id],
                transaction_from_row,
            )
            .optional()?
            .ok_or_else(|| BountyError::not_found("transaction", id))
    }

    pub fn payments_for(&self, bounty_id: Uuid) -> Result<Vec<Transaction>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM transactions WHERE bounty_id = ?1 AND kind = 'PAYMENT'
             ORDER BY created_at, rowid",
            TRANSACTION_COLUMNS
        ))?;
        let txns = stmt
            .query_map(params![bounty_id], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txns)
    }

    pub fn transactions(&self, workspace_id: Uuid) -> Result<Vec<Transaction>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM transactions WHERE workspace_id = ?1 ORDER BY created_at DESC, rowid DESC",
            TRANSACTION_COLUMNS
        ))?;
        let txns = stmt
            .query_map(params![workspace_id], transaction_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txns)
    }

    pub fn insert_transaction(&self, txn: &Transaction) -> Result<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO transactions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                TRANSACTION_COLUMNS
            ),
            params![
                txn.id,
                txn.workspace_id,
                txn.bounty_id,
                txn.kind,
                amount_to_sql(txn.amount)?,
                txn.status,
                txn.from_pubkey,
                txn.to_pubkey,
                txn.memo,
                txn.external_ref,
                txn.proof_of_payment,
                txn.failure_reason,
                txn.created_at,
                txn.completed_at,
            ],
        )?;
        Ok(())
    }

    pub fn save_transaction(&self, txn: &Transaction) -> Result<()> {
        self.tx.execute(
            "UPDATE transactions SET status = ?2, external_ref = ?3, proof_of_payment = ?4,
                 failure_reason = ?5, completed_at = ?6
             WHERE id = ?1",
            params![
                txn.id,
                txn.status,
                txn.external_ref,
                txn.proof_of_payment,
                txn.failure_reason,
                txn.completed_at,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Activity log
    // ------------------------------------------------------------------------

    pub fn insert_activity(&self, activity: &BountyActivity) -> Result<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO bounty_activities ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                ACTIVITY_COLUMNS
            ),
            params![
                activity.id,
                activity.workspace_id,
                activity.bounty_id,
                activity.actor,
                activity.action,
                activity.detail,
                activity.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn activities(&self, bounty_id: Uuid) -> Result<Vec<BountyActivity>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM bounty_activities WHERE bounty_id = ?1 ORDER BY created_at, rowid",
            ACTIVITY_COLUMNS
        ))?;
        let activities = stmt
            .query_map(params![bounty_id], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }

    pub fn workspace_activities(&self, workspace_id: Uuid, limit: u32) -> Result<Vec<BountyActivity>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM bounty_activities WHERE workspace_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            ACTIVITY_COLUMNS
        ))?;
        let activities = stmt
            .query_map(params![workspace_id, limit], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(activities)
    }
}

fn assigned_since(assignment: &Assignment) -> Option<DateTime<Utc>> {
    match assignment {
        Assignment::Unassigned => None,
        Assignment::Assigned { since, .. } => Some(*since),
    }
}
