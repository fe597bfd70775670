//! Employee accounts, roles and the provisioning workflow.

mod manager;
#[cfg(test)]
pub(crate) mod memory;
mod postgres;
mod store;
mod validation;

pub use manager::*;
pub use postgres::*;
pub use store::*;
pub use validation::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADMINISTRATOR: &str = "Administrator";
pub const EMPLOYEE: &str = "Employee";

/// Employee account as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub user_name: String,
    pub email: String,
    pub email_confirmed: bool,
    pub phone_number: Option<String>,
    pub job_title: Option<String>,
    /// Line manager, `None` at the top of a reporting line.
    pub manager_id: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub access_failed_count: i32,
    #[serde(skip)]
    pub lockout_end: Option<DateTime<Utc>>,
    /// Only loaded by the read side.
    #[sqlx(skip)]
    #[serde(skip)]
    pub roles: Vec<RoleMembership>,
}

impl User {
    /// Create a new [`User`] with a login name and an email.
    pub fn new(user_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// Whether the account is locked at `now`.
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        self.lockout_end.is_some_and(|end| end > now)
    }

    /// Role ids carried by loaded memberships.
    pub fn role_ids(&self) -> Vec<String> {
        self.roles.iter().map(|m| m.role_id.clone()).collect()
    }
}

/// Role, as saved on database.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Role {
    pub id: String,
    pub name: String,
}

impl Role {
    /// Create a new [`Role`] with no id; the store assigns one.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::default(),
            name: name.into(),
        }
    }
}

/// One user in one role.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct RoleMembership {
    pub user_id: String,
    pub role_id: String,
}

/// A user with the names of their roles.
#[derive(Clone, Debug, PartialEq)]
pub struct UserAndRoles {
    pub user: User,
    pub roles: Vec<String>,
}

/// Outcome of a mutating store call: success, or error descriptions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityResult {
    pub errors: Vec<String>,
}

impl IdentityResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn refused operations into [`ServerError::Identity`].
    ///
    /// [`ServerError::Identity`]: crate::error::ServerError::Identity
    pub fn into_result(self) -> crate::error::Result<()> {
        if self.succeeded() {
            Ok(())
        } else {
            Err(crate::error::ServerError::Identity(self.errors))
        }
    }
}

/// Whether `names` holds `name`, ignoring ASCII case as role lookups do.
pub(crate) fn contains_role(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Remove case-insensitive duplicates while keeping the first occurrence.
pub(crate) fn distinct<'a>(
    names: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !contains_role(&out, name) {
            out.push(name.clone());
        }
    }
    out
}
