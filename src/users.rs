//! Admin oracle.
//!
//! The registry decides owner privileges from its own records; whether a
//! user is a global administrator comes from the surrounding system
//! through this port.

use std::collections::BTreeSet;

/// Answers "is this user a global administrator".
pub trait UserInfoProvider: Send + Sync {
    fn is_admin(&self, user_id: &str) -> bool;
}

/// Fixed admin list, for embedders with static configuration and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAdminList {
    admins: BTreeSet<String>,
}

impl StaticAdminList {
    pub fn new(admins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }
}

impl UserInfoProvider for StaticAdminList {
    fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(user_id)
    }
}
