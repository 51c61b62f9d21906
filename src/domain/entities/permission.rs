use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Persisted membership of one permission level within one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelMembership {
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl LevelMembership {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty()
    }

    /// Actor id is listed, or any of its roles is
    pub fn admits(&self, user_id: &str, role_ids: &[String]) -> bool {
        self.users.contains(user_id) || role_ids.iter().any(|r| self.roles.contains(r))
    }

    pub fn contains(&self, target: &PermissionTarget) -> bool {
        match target {
            PermissionTarget::User(id) => self.users.contains(id),
            PermissionTarget::Role(id) => self.roles.contains(id),
        }
    }

    /// Returns `false` if the target was already present
    pub fn insert(&mut self, target: &PermissionTarget) -> bool {
        match target {
            PermissionTarget::User(id) => self.users.insert(id.clone()),
            PermissionTarget::Role(id) => self.roles.insert(id.clone()),
        }
    }

    /// Returns `false` if the target was not present
    pub fn remove(&mut self, target: &PermissionTarget) -> bool {
        match target {
            PermissionTarget::User(id) => self.users.remove(id),
            PermissionTarget::Role(id) => self.roles.remove(id),
        }
    }
}

/// Subject of a grant or revoke
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionTarget {
    User(String),
    Role(String),
}

impl fmt::Display for PermissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionTarget::User(id) => write!(f, "user {}", id),
            PermissionTarget::Role(id) => write!(f, "role {}", id),
        }
    }
}
