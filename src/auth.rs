//! Actors and Authorization
//!
//! - Pubkey shape validation
//! - Workspace roles resolved into capability sets
//! - Membership lookup seam

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BountyError, Result};

const MAX_PUBKEY_LEN: usize = 128;

/// Check that a caller identity looks like a pubkey we can store and compare
pub fn is_valid_pubkey(pubkey: &str) -> bool {
    !pubkey.is_empty()
        && pubkey.len() <= MAX_PUBKEY_LEN
        && pubkey.chars().all(|c| c.is_ascii_graphic())
}

// ============================================================================
// ROLES AND CAPABILITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
            Role::Viewer => "viewer",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Role::Owner => 3,
            Role::Admin => 2,
            Role::Member => 1,
            Role::Viewer => 0,
        }
    }

    /// The less privileged of `self` and `ceiling`.
    pub fn narrowed_to(self, ceiling: Role) -> Role {
        if self.rank() <= ceiling.rank() {
            self
        } else {
            ceiling
        }
    }

    pub fn capabilities(&self) -> CapabilitySet {
        match self {
            Role::Owner | Role::Admin => CapabilitySet::all(),
            Role::Member => CapabilitySet::empty()
                .with(Capability::CreateBounty)
                .with(Capability::Claim)
                .with(Capability::Request),
            Role::Viewer => CapabilitySet::empty(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BountyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" | "contributor" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            other => Err(BountyError::validation(format!("unknown role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Capability {
    CreateBounty = 1 << 0,
    /// Edit or cancel bounties created by someone else.
    EditAny = 1 << 1,
    Assign = 1 << 2,
    ReviewRequest = 1 << 3,
    ReviewProof = 1 << 4,
    Complete = 1 << 5,
    Cancel = 1 << 6,
    Deposit = 1 << 7,
    ManagePayments = 1 << 8,
    Claim = 1 << 9,
    Request = 1 << 10,
}

impl Capability {
    const ALL: [Capability; 11] = [
        Capability::CreateBounty,
        Capability::EditAny,
        Capability::Assign,
        Capability::ReviewRequest,
        Capability::ReviewProof,
        Capability::Complete,
        Capability::Cancel,
        Capability::Deposit,
        Capability::ManagePayments,
        Capability::Claim,
        Capability::Request,
    ];

    fn bit(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Capability::ALL
            .iter()
            .fold(Self::empty(), |set, cap| set.with(*cap))
    }

    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }
}

// ============================================================================
// ACTOR
// ============================================================================

/// An authenticated caller with its workspace role already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub pubkey: String,
    pub role: Role,
    capabilities: CapabilitySet,
}

impl Actor {
    pub fn new(pubkey: impl Into<String>, role: Role) -> Result<Self> {
        let pubkey = pubkey.into();
        if !is_valid_pubkey(&pubkey) {
            return Err(BountyError::Unauthorized);
        }
        Ok(Self {
            pubkey,
            role,
            capabilities: role.capabilities(),
        })
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(BountyError::forbidden(format!(
                "role {} lacks {:?}",
                self.role, capability
            )))
        }
    }

    pub fn is(&self, pubkey: &str) -> bool {
        self.pubkey == pubkey
    }

    /// Passes when the actor is `pubkey` or holds `capability`.
    pub fn require_self_or(&self, pubkey: &str, capability: Capability) -> Result<()> {
        if self.is(pubkey) || self.can(capability) {
            Ok(())
        } else {
            Err(BountyError::forbidden(format!(
                "{} is neither {} nor holds {:?}",
                self.pubkey, pubkey, capability
            )))
        }
    }
}

/// Resolves workspace membership. Role storage lives outside this crate;
/// [`crate::storage::BountyStorage`] ships a SQLite-backed implementation.
pub trait MemberDirectory: Send + Sync {
    fn role_of(&self, workspace_id: Uuid, pubkey: &str) -> Result<Option<Role>>;

    fn is_member(&self, workspace_id: Uuid, pubkey: &str) -> Result<bool> {
        Ok(self.role_of(workspace_id, pubkey)?.is_some())
    }

    /// The caller as seen by `workspace_id`. The stored role is authoritative;
    /// the role the caller presented can only narrow it.
    fn scope(&self, workspace_id: Uuid, actor: &Actor) -> Result<Actor> {
        match self.role_of(workspace_id, &actor.pubkey)? {
            Some(stored) => Actor::new(actor.pubkey.clone(), stored.narrowed_to(actor.role)),
            None => Err(BountyError::forbidden(format!(
                "{} is not a member of workspace {}",
                actor.pubkey, workspace_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_validation() {
        assert!(is_valid_pubkey("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"));
        assert!(is_valid_pubkey("npub1xyz"));
        assert!(!is_valid_pubkey(""));
        assert!(!is_valid_pubkey("has space"));
        assert!(!is_valid_pubkey(&"a".repeat(129)));
    }

    #[test]
    fn test_role_capabilities() {
        let admin = Role::Admin.capabilities();
        assert!(admin.contains(Capability::Deposit));
        assert!(admin.contains(Capability::ReviewProof));

        let member = Role::Member.capabilities();
        assert!(member.contains(Capability::Claim));
        assert!(member.contains(Capability::CreateBounty));
        assert!(!member.contains(Capability::Assign));
        assert!(!member.contains(Capability::ManagePayments));

        assert_eq!(Role::Viewer.capabilities(), CapabilitySet::empty());
    }

    #[test]
    fn test_actor_requires() {
        let member = Actor::new("alice", Role::Member).unwrap();
        assert!(member.require(Capability::Claim).is_ok());
        assert!(matches!(
            member.require(Capability::Complete),
            Err(BountyError::Forbidden(_))
        ));
        assert!(member.require_self_or("alice", Capability::EditAny).is_ok());
        assert!(member.require_self_or("bob", Capability::EditAny).is_err());

        assert!(matches!(
            Actor::new("", Role::Owner),
            Err(BountyError::Unauthorized)
        ));
    }

    #[test]
    fn test_role_narrowing() {
        assert_eq!(Role::Owner.narrowed_to(Role::Viewer), Role::Viewer);
        assert_eq!(Role::Member.narrowed_to(Role::Admin), Role::Member);
        assert_eq!(Role::Admin.narrowed_to(Role::Admin), Role::Admin);
    }

    struct Directory(Vec<(Uuid, &'static str, Role)>);

    impl MemberDirectory for Directory {
        fn role_of(&self, workspace_id: Uuid, pubkey: &str) -> Result<Option<Role>> {
            Ok(self
                .0
                .iter()
                .find(|(ws, pk, _)| *ws == workspace_id && *pk == pubkey)
                .map(|(_, _, role)| *role))
        }
    }

    #[test]
    fn test_scope_uses_stored_role() {
        let home = Uuid::new_v4();
        let elsewhere = Uuid::new_v4();
        let directory = Directory(vec![
            (home, "alice", Role::Member),
            (elsewhere, "alice", Role::Admin),
        ]);

        // Claiming admin does not lift a member.
        let claimed_admin = Actor::new("alice", Role::Admin).unwrap();
        let scoped = directory.scope(home, &claimed_admin).unwrap();
        assert_eq!(scoped.role, Role::Member);
        assert!(scoped.require(Capability::Assign).is_err());

        // A narrower presented role wins.
        let read_only = Actor::new("alice", Role::Viewer).unwrap();
        assert_eq!(directory.scope(elsewhere, &read_only).unwrap().role, Role::Viewer);

        assert!(matches!(
            directory.scope(Uuid::new_v4(), &claimed_admin),
            Err(BountyError::Forbidden(_))
        ));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("contributor".parse::<Role>().unwrap(), Role::Member);
        assert!("root".parse::<Role>().is_err());
    }
}
