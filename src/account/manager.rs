//! Provisioning workflow and read-side façade over the identity store.
//!
//! Creating a user is compensated: when role assignment fails after the user
//! row was committed, the user is deleted again before the failure is
//! returned. Updating is not: roles removed before a failed addition stay
//! removed.

use std::sync::Arc;

use crate::account::{
    AccountQuery, Role, RoleStore, User, UserAndRoles, UserStore,
    contains_role, distinct,
};
use crate::error::{Result, ServerError};
use crate::paging::Pagination;

/// Account manager.
#[derive(Clone)]
pub struct AccountManager {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    query: Arc<dyn AccountQuery>,
}

impl AccountManager {
    /// Create a new [`AccountManager`].
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        query: Arc<dyn AccountQuery>,
    ) -> Self {
        Self {
            users,
            roles,
            query,
        }
    }

    /// Create a new [`AccountManager`] from a store implementing every port.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore + RoleStore + AccountQuery + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    /// Create `user` with `password`, then assign `roles`.
    ///
    /// Returns the user as stored, id included.
    #[tracing::instrument(skip_all, fields(user_name = %user.user_name))]
    pub async fn create_user(
        &self,
        user: &User,
        roles: &[String],
        password: &str,
    ) -> Result<User> {
        self.users.create_user(user, password).await?.into_result()?;

        let Some(created) = self.users.find_user_by_name(&user.user_name).await?
        else {
            return Err(ServerError::internal(format!(
                "user '{}' cannot be found after creation",
                user.user_name
            )));
        };

        let roles = distinct(roles);
        match self.users.add_to_roles(&created, &roles).await {
            Ok(result) if result.succeeded() => {
                metrics::counter!("accounts_created_total").increment(1);
                tracing::info!(user_id = %created.id, ?roles, "user created");
                Ok(created)
            },
            Ok(result) => {
                self.compensate(&created).await?;
                Err(ServerError::Identity(result.errors))
            },
            Err(err) => {
                self.compensate(&created).await?;
                Err(err)
            },
        }
    }

    /// Delete a user whose role assignment failed.
    async fn compensate(&self, user: &User) -> Result<()> {
        metrics::counter!("accounts_compensated_total").increment(1);
        tracing::warn!(user_id = %user.id, "role assignment failed, deleting created user");

        let errors = match self.users.delete_user(user).await {
            Ok(result) if result.succeeded() => return Ok(()),
            Ok(result) => result.errors,
            Err(err) => vec![err.to_string()],
        };

        Err(ServerError::InconsistentState {
            user_id: user.id.clone(),
            errors,
        })
    }

    /// Persist field changes, then reconcile roles when `roles` is given.
    ///
    /// `None` leaves role memberships untouched. Removals run before
    /// additions and are kept if the addition fails.
    #[tracing::instrument(skip_all, fields(user_id = %user.id))]
    pub async fn update_user(
        &self,
        user: &User,
        roles: Option<&[String]>,
    ) -> Result<()> {
        self.users.update_user(user).await?.into_result()?;

        let Some(requested) = roles else {
            return Ok(());
        };

        let current = self.users.get_roles(user).await?;
        let to_remove = distinct(
            current
                .iter()
                .filter(|role| !contains_role(requested, role)),
        );
        let to_add = distinct(
            requested
                .iter()
                .filter(|role| !contains_role(&current, role)),
        );

        if !to_remove.is_empty() {
            self.users
                .remove_from_roles(user, &to_remove)
                .await?
                .into_result()?;
        }

        if !to_add.is_empty() {
            self.users.add_to_roles(user, &to_add).await?.into_result()?;
        }

        tracing::debug!(removed = ?to_remove, added = ?to_add, "user updated");
        Ok(())
    }

    /// Delete the user with `id`. Unknown ids succeed.
    pub async fn delete_user_by_id(&self, id: &str) -> Result<()> {
        match self.users.find_user_by_id(id).await? {
            Some(user) => self.delete_user(&user).await,
            None => Ok(()),
        }
    }

    /// Delete `user` and its role memberships.
    pub async fn delete_user(&self, user: &User) -> Result<()> {
        self.users.delete_user(user).await?.into_result()?;
        tracing::info!(user_id = %user.id, "user deleted");
        Ok(())
    }

    /// Verify `password`.
    ///
    /// When the store does not track failed attempts itself, a mismatch is
    /// recorded here.
    pub async fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        if self.users.check_password(user, password).await? {
            return Ok(true);
        }

        if !self.users.supports_user_lockout() {
            let result = self.users.access_failed(user).await?;
            if !result.succeeded() {
                tracing::warn!(user_id = %user.id, errors = ?result.errors, "failed access not recorded");
            }
        }

        Ok(false)
    }

    /// Administrative reset: no current password required.
    pub async fn reset_password(&self, user: &User, new_password: &str) -> Result<()> {
        let token = self.users.generate_password_reset_token(user).await?;

        self.users
            .reset_password(user, &token, new_password)
            .await?
            .into_result()
    }

    /// Change password after verifying the current one.
    pub async fn update_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        self.users
            .change_password(user, current_password, new_password)
            .await?
            .into_result()
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.users.find_user_by_id(id).await
    }

    pub async fn find_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        self.users.find_user_by_name(user_name).await
    }

    /// Names of the roles `user` belongs to.
    pub async fn get_roles(&self, user: &User) -> Result<Vec<String>> {
        self.users.get_roles(user).await
    }

    /// Users reporting directly to `manager_id`.
    pub async fn subordinates(&self, manager_id: &str) -> Result<Vec<User>> {
        self.query.subordinates(manager_id).await
    }

    /// Whether at least one user exists.
    pub async fn any_users(&self) -> Result<bool> {
        self.query.any_users().await
    }

    /// Create a role named `name` and return it as stored.
    pub async fn create_role(&self, name: &str) -> Result<Role> {
        self.roles.create_role(&Role::new(name)).await?.into_result()?;

        self.roles.find_role_by_name(name).await?.ok_or_else(|| {
            ServerError::internal(format!(
                "role '{name}' cannot be found after creation"
            ))
        })
    }

    pub async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.roles.find_role_by_name(name).await
    }

    pub async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>> {
        self.roles.find_role_by_id(id).await
    }

    pub async fn roles(&self) -> Result<Vec<Role>> {
        self.roles.roles().await
    }

    /// User with the names of its roles, `None` if unknown.
    pub async fn get_user_and_roles(&self, id: &str) -> Result<Option<UserAndRoles>> {
        let Some(user) = self.query.user_by_id(id).await? else {
            return Ok(None);
        };

        let roles = self.query.role_names_by_ids(&user.role_ids()).await?;
        Ok(Some(UserAndRoles { user, roles }))
    }

    /// Page of users ordered by login name, each with its role names.
    pub async fn get_users_and_roles(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<UserAndRoles>> {
        let users = self.query.users_ordered_by_name(pagination).await?;

        let role_ids = distinct(
            users
                .iter()
                .flat_map(|u| u.roles.iter().map(|m| &m.role_id)),
        );
        let roles = self.query.roles_by_ids(&role_ids).await?;

        Ok(users
            .into_iter()
            .map(|user| {
                let names = roles
                    .iter()
                    .filter(|r| user.roles.iter().any(|m| m.role_id == r.id))
                    .map(|r| r.name.clone())
                    .collect();

                UserAndRoles { user, roles: names }
            })
            .collect())
    }
}
