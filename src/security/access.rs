//! Access evaluation
//!
//! [`evaluate`] decides whether a subject can see, access, or fully manage
//! an object. It is a pure function of its two inputs.

use crate::types::Entity;
use serde::{Deserialize, Serialize};

/// Ordered privilege level of a subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AccessLevel {
    /// Not logged in
    #[default]
    Anonymous = 0,
    /// Regular registered user
    Standard = 1,
    /// User with elevated privileges
    Privileged = 2,
    /// Moderator
    Moderator = 3,
    /// Administrator
    Admin = 4,
    /// Super administrator
    SuperAdmin = 5,
    /// Unrestricted
    Root = 6,
}

impl AccessLevel {
    /// Rank from which a subject is treated as administrator of everything
    pub const ADMIN: AccessLevel = AccessLevel::Admin;

    /// Numeric rank
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for AccessLevel {
    type Error = String;

    fn try_from(rank: u8) -> Result<Self, Self::Error> {
        match rank {
            0 => Ok(AccessLevel::Anonymous),
            1 => Ok(AccessLevel::Standard),
            2 => Ok(AccessLevel::Privileged),
            3 => Ok(AccessLevel::Moderator),
            4 => Ok(AccessLevel::Admin),
            5 => Ok(AccessLevel::SuperAdmin),
            6 => Ok(AccessLevel::Root),
            other => Err(format!("unknown access level {}", other)),
        }
    }
}

impl From<AccessLevel> for u8 {
    fn from(level: AccessLevel) -> Self {
        level.rank()
    }
}

/// Subject of an access check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthContext {
    /// Identity of the subject; `None` when anonymous
    pub object_id: Option<String>,
    /// Privilege level
    pub access_level: AccessLevel,
    /// Teams the subject belongs to
    pub part_of_teams: Vec<String>,
    /// Alias identities owned by the subject
    pub aliases: Vec<String>,
    /// Override granting full access everywhere
    pub has_full_access: bool,
}

impl AuthContext {
    /// Anonymous subject
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Subject with an identity and level
    pub fn user(id: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            object_id: Some(id.into()),
            access_level,
            ..Self::default()
        }
    }
}

/// Object of an access check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessTarget {
    /// Owner identity
    pub owner_id: Option<String>,
    /// Member identities
    pub participant_ids: Vec<String>,
    /// Member teams
    pub teams: Vec<String>,
    /// Identities with admin rights on the object
    pub admin_ids: Vec<String>,
    /// Teams with admin rights on the object
    pub admin_teams: Vec<String>,
    /// Visible and accessible to everyone
    pub is_public: bool,
    /// Minimum level that may see the object without membership
    pub visibility: Option<AccessLevel>,
}

impl AccessTarget {
    /// Read the access fields of an entity, ignoring everything else
    pub fn from_entity(entity: &Entity) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(entity.fields().clone()))
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    /// The object may be listed/seen
    pub can_see: bool,
    /// The object may be entered/used
    pub has_access: bool,
    /// The object may be administered
    pub has_full_access: bool,
}

fn contains(ids: &[String], id: Option<&str>) -> bool {
    id.is_some_and(|id| ids.iter().any(|candidate| candidate == id))
}

fn intersects(left: &[String], right: &[String]) -> bool {
    !left.is_empty() && !right.is_empty() && left.iter().any(|id| right.contains(id))
}

/// Decide what `subject` may do with `target`
pub fn evaluate(target: &AccessTarget, subject: &AuthContext) -> AccessDecision {
    let subject_id = subject.object_id.as_deref();
    let is_owner = subject_id.is_some() && target.owner_id.as_deref() == subject_id;

    let user_has_access = is_owner || contains(&target.participant_ids, subject_id);
    let team_has_access = intersects(&subject.part_of_teams, &target.teams);
    let alias_has_access = subject
        .aliases
        .iter()
        .any(|alias| contains(&target.participant_ids, Some(alias)));

    let is_admin = is_owner || subject.has_full_access || subject.access_level >= AccessLevel::ADMIN;

    let user_has_admin_access = contains(&target.admin_ids, subject_id);
    let team_has_admin_access = intersects(&subject.part_of_teams, &target.admin_teams);
    let alias_has_admin_access = subject
        .aliases
        .iter()
        .any(|alias| contains(&target.admin_ids, Some(alias)));

    let has_access =
        is_admin || target.is_public || user_has_access || team_has_access || alias_has_access;
    let meets_visibility = target
        .visibility
        .is_some_and(|visibility| subject.access_level >= visibility);

    AccessDecision {
        can_see: has_access || meets_visibility,
        has_access,
        has_full_access: is_admin
            || user_has_admin_access
            || alias_has_admin_access
            || team_has_admin_access,
    }
}
