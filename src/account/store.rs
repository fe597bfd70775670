//! Ports between the provisioning workflow and the identity store.

use async_trait::async_trait;

use crate::account::{IdentityResult, Role, User};
use crate::error::Result;
use crate::paging::Pagination;

/// Port for user persistence, password hashing and role membership.
///
/// Refused operations (duplicate name, weak password, unknown role...) are
/// reported through [`IdentityResult`]; `Err` means the store itself failed.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Hash `password` and insert `user`. The store assigns the id.
    async fn create_user(
        &self,
        user: &User,
        password: &str,
    ) -> Result<IdentityResult>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Case-insensitive lookup on the login name.
    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<User>>;

    /// Persist every field except password and lockout bookkeeping.
    async fn update_user(&self, user: &User) -> Result<IdentityResult>;

    /// Delete `user` and its role memberships.
    async fn delete_user(&self, user: &User) -> Result<IdentityResult>;

    async fn check_password(&self, user: &User, password: &str) -> Result<bool>;

    /// Whether [`UserStore::check_password`] tracks failed attempts itself.
    fn supports_user_lockout(&self) -> bool;

    /// Record one failed access attempt.
    async fn access_failed(&self, user: &User) -> Result<IdentityResult>;

    async fn generate_password_reset_token(&self, user: &User) -> Result<String>;

    /// Consume `token` and set `new_password`.
    async fn reset_password(
        &self,
        user: &User,
        token: &str,
        new_password: &str,
    ) -> Result<IdentityResult>;

    async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<IdentityResult>;

    async fn add_to_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult>;

    async fn remove_from_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult>;

    /// Names of the roles `user` belongs to.
    async fn get_roles(&self, user: &User) -> Result<Vec<String>>;
}

/// Port for role persistence.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Insert `role`. The store assigns the id.
    async fn create_role(&self, role: &Role) -> Result<IdentityResult>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>>;

    async fn roles(&self) -> Result<Vec<Role>>;
}

/// Read-side repository joining users, memberships and roles.
#[async_trait]
pub trait AccountQuery: Send + Sync {
    /// User with its role memberships loaded.
    async fn user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Names of the roles whose id is in `ids`.
    async fn role_names_by_ids(&self, ids: &[String]) -> Result<Vec<String>>;

    /// Users ordered by login name, memberships loaded.
    async fn users_ordered_by_name(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<User>>;

    async fn roles_by_ids(&self, ids: &[String]) -> Result<Vec<Role>>;

    /// Users reporting to `manager_id`, ordered by login name.
    async fn subordinates(&self, manager_id: &str) -> Result<Vec<User>>;

    async fn any_users(&self) -> Result<bool>;
}
