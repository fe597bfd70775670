//! PostgreSQL identity store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres};

use crate::account::{
    AccountQuery, INVALID_TOKEN, IdentityResult, PASSWORD_MISMATCH, Role,
    RoleMembership, RoleStore, User, UserStore, already_in_role,
    duplicate_role_name, duplicate_user_name, not_in_role, unknown_role,
    unknown_user, validate_password, validate_role_name, validate_user,
};
use crate::config::{Lockout, PasswordPolicy};
use crate::crypto::{Hasher, PasswordManager, random_id, random_token};
use crate::error::Result;
use crate::paging::Pagination;

const USER_COLUMNS: &str = r#"id, user_name, email, email_confirmed,
    phone_number, job_title, manager_id, password_hash, access_failed_count,
    lockout_end"#;

/// Reset tokens expire after one day.
const RESET_TOKEN_LIFETIME_HOURS: i64 = 24;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|err| err.is_unique_violation())
}

/// Identity store saving users, roles and memberships on PostgreSQL.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: Pool<Postgres>,
    passwords: Arc<PasswordManager>,
    hasher: Arc<Hasher>,
    policy: PasswordPolicy,
    lockout: Lockout,
}

impl PgIdentityStore {
    /// Create a new [`PgIdentityStore`].
    pub fn new(
        pool: Pool<Postgres>,
        passwords: Arc<PasswordManager>,
        hasher: Arc<Hasher>,
        policy: PasswordPolicy,
        lockout: Lockout,
    ) -> Self {
        Self {
            pool,
            passwords,
            hasher,
            policy,
            lockout,
        }
    }

    async fn fetch_user(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn memberships(&self, user_ids: &[String]) -> Result<Vec<RoleMembership>> {
        let memberships = sqlx::query_as::<_, RoleMembership>(
            r#"SELECT user_id, role_id FROM user_roles WHERE user_id = ANY($1)"#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    /// Count one failed attempt, locking the account once the threshold is
    /// reached.
    async fn record_failure(&self, user_id: &str) -> Result<u64> {
        let lockout_end =
            Utc::now() + Duration::minutes(self.lockout.minutes.max(0));

        let result = sqlx::query(
            r#"UPDATE users SET
                access_failed_count = CASE
                    WHEN access_failed_count + 1 >= $2 THEN 0
                    ELSE access_failed_count + 1
                END,
                lockout_end = CASE
                    WHEN access_failed_count + 1 >= $2 THEN $3
                    ELSE lockout_end
                END
            WHERE id = $1"#,
        )
        .bind(user_id)
        .bind(self.lockout.max_failed_access_attempts.max(1))
        .bind(lockout_end)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_password_hash(&self, user_id: &str, password: &str) -> Result<()> {
        let hash = self.passwords.hash_password(password)?;

        sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE id = $2"#)
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgIdentityStore {
    async fn create_user(
        &self,
        user: &User,
        password: &str,
    ) -> Result<IdentityResult> {
        let mut errors = validate_user(user);
        if self.find_user_by_name(&user.user_name).await?.is_some() {
            errors.push(duplicate_user_name(&user.user_name));
        }
        errors.extend(validate_password(&self.policy, password));
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let hash = self.passwords.hash_password(password)?;
        let result = sqlx::query(
            r#"INSERT INTO users (id, user_name, email, email_confirmed,
                phone_number, job_title, manager_id, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(random_id())
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(user.email_confirmed)
        .bind(&user.phone_number)
        .bind(&user.job_title)
        .bind(&user.manager_id)
        .bind(hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(IdentityResult::success()),
            Err(err) if is_unique_violation(&err) => Ok(IdentityResult::failed(
                vec![duplicate_user_name(&user.user_name)],
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.fetch_user(id).await
    }

    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(user_name) = lower($1)"
        ))
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<IdentityResult> {
        let mut errors = validate_user(user);
        if self
            .find_user_by_name(&user.user_name)
            .await?
            .is_some_and(|other| other.id != user.id)
        {
            errors.push(duplicate_user_name(&user.user_name));
        }
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let result = sqlx::query(
            r#"UPDATE users
                SET user_name = $1, email = $2, email_confirmed = $3,
                    phone_number = $4, job_title = $5, manager_id = $6
                WHERE id = $7"#,
        )
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(user.email_confirmed)
        .bind(&user.phone_number)
        .bind(&user.job_title)
        .bind(&user.manager_id)
        .bind(&user.id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Ok(IdentityResult::failed(vec![unknown_user(&user.id)]))
            },
            Ok(_) => Ok(IdentityResult::success()),
            Err(err) if is_unique_violation(&err) => Ok(IdentityResult::failed(
                vec![duplicate_user_name(&user.user_name)],
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_user(&self, user: &User) -> Result<IdentityResult> {
        // Memberships and reset tokens cascade, reports and news are detached.
        let result = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(&user.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(IdentityResult::failed(vec![unknown_user(&user.id)]));
        }

        Ok(IdentityResult::success())
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        let Some(stored) = self.fetch_user(&user.id).await? else {
            return Ok(false);
        };

        if self.lockout.enabled && stored.is_locked_out(Utc::now()) {
            tracing::info!(user_id = %stored.id, "sign-in refused, account locked out");
            return Ok(false);
        }

        let matches = self
            .passwords
            .verify_password(password, &stored.password_hash);

        if self.lockout.enabled {
            if !matches {
                self.record_failure(&stored.id).await?;
            } else if stored.access_failed_count > 0 {
                sqlx::query(
                    r#"UPDATE users SET access_failed_count = 0 WHERE id = $1"#,
                )
                .bind(&stored.id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(matches)
    }

    fn supports_user_lockout(&self) -> bool {
        self.lockout.enabled
    }

    async fn access_failed(&self, user: &User) -> Result<IdentityResult> {
        if self.record_failure(&user.id).await? == 0 {
            return Ok(IdentityResult::failed(vec![unknown_user(&user.id)]));
        }

        Ok(IdentityResult::success())
    }

    async fn generate_password_reset_token(&self, user: &User) -> Result<String> {
        let token = random_token();
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_LIFETIME_HOURS);

        sqlx::query(
            r#"INSERT INTO password_reset_tokens (token_hash, user_id, expires_at)
                VALUES ($1, $2, $3)"#,
        )
        .bind(self.hasher.digest(&token))
        .bind(&user.id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    async fn reset_password(
        &self,
        user: &User,
        token: &str,
        new_password: &str,
    ) -> Result<IdentityResult> {
        let mut tx = self.pool.begin().await?;

        let consumed = sqlx::query(
            r#"DELETE FROM password_reset_tokens
                WHERE token_hash = $1 AND user_id = $2 AND expires_at > NOW()"#,
        )
        .bind(self.hasher.digest(token))
        .bind(&user.id)
        .execute(&mut *tx)
        .await?;

        if consumed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(IdentityResult::failed(vec![INVALID_TOKEN.into()]));
        }

        let errors = validate_password(&self.policy, new_password);
        if !errors.is_empty() {
            tx.rollback().await?;
            return Ok(IdentityResult::failed(errors));
        }

        let hash = self.passwords.hash_password(new_password)?;
        sqlx::query(r#"UPDATE users SET password_hash = $1 WHERE id = $2"#)
            .bind(hash)
            .bind(&user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(IdentityResult::success())
    }

    async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<IdentityResult> {
        let Some(stored) = self.fetch_user(&user.id).await? else {
            return Ok(IdentityResult::failed(vec![unknown_user(&user.id)]));
        };

        if !self
            .passwords
            .verify_password(current_password, &stored.password_hash)
        {
            return Ok(IdentityResult::failed(vec![PASSWORD_MISMATCH.into()]));
        }

        let errors = validate_password(&self.policy, new_password);
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        self.set_password_hash(&stored.id, new_password).await?;

        Ok(IdentityResult::success())
    }

    async fn add_to_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult> {
        let mut tx = self.pool.begin().await?;
        let mut errors = Vec::new();

        for name in roles {
            let role_id = sqlx::query_scalar::<_, String>(
                r#"SELECT id FROM roles WHERE lower(name) = lower($1)"#,
            )
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(role_id) = role_id else {
                errors.push(unknown_role(name));
                continue;
            };

            let inserted = sqlx::query(
                r#"INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)
                    ON CONFLICT DO NOTHING"#,
            )
            .bind(&user.id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                errors.push(already_in_role(name));
            }
        }

        if !errors.is_empty() {
            tx.rollback().await?;
            return Ok(IdentityResult::failed(errors));
        }

        tx.commit().await?;

        Ok(IdentityResult::success())
    }

    async fn remove_from_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult> {
        let mut tx = self.pool.begin().await?;
        let mut errors = Vec::new();

        for name in roles {
            let removed = sqlx::query(
                r#"DELETE FROM user_roles ur USING roles r
                    WHERE ur.role_id = r.id
                        AND ur.user_id = $1
                        AND lower(r.name) = lower($2)"#,
            )
            .bind(&user.id)
            .bind(name)
            .execute(&mut *tx)
            .await?;

            if removed.rows_affected() == 0 {
                errors.push(not_in_role(name));
            }
        }

        if !errors.is_empty() {
            tx.rollback().await?;
            return Ok(IdentityResult::failed(errors));
        }

        tx.commit().await?;

        Ok(IdentityResult::success())
    }

    async fn get_roles(&self, user: &User) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"SELECT r.name FROM roles r
                JOIN user_roles ur ON ur.role_id = r.id
                WHERE ur.user_id = $1
                ORDER BY r.name"#,
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }
}

#[async_trait]
impl RoleStore for PgIdentityStore {
    async fn create_role(&self, role: &Role) -> Result<IdentityResult> {
        let errors = validate_role_name(&role.name);
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let result = sqlx::query(r#"INSERT INTO roles (id, name) VALUES ($1, $2)"#)
            .bind(random_id())
            .bind(&role.name)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(IdentityResult::success()),
            Err(err) if is_unique_violation(&err) => Ok(IdentityResult::failed(
                vec![duplicate_role_name(&role.name)],
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r#"SELECT id, name FROM roles WHERE lower(name) = lower($1)"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>> {
        let role =
            sqlx::query_as::<_, Role>(r#"SELECT id, name FROM roles WHERE id = $1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(role)
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        let roles =
            sqlx::query_as::<_, Role>(r#"SELECT id, name FROM roles ORDER BY name"#)
                .fetch_all(&self.pool)
                .await?;

        Ok(roles)
    }
}

#[async_trait]
impl AccountQuery for PgIdentityStore {
    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let Some(mut user) = self.fetch_user(id).await? else {
            return Ok(None);
        };

        user.roles = self.memberships(std::slice::from_ref(&user.id)).await?;
        Ok(Some(user))
    }

    async fn role_names_by_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"SELECT name FROM roles WHERE id = ANY($1) ORDER BY name"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(names)
    }

    async fn users_ordered_by_name(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<User>> {
        // NULL disables LIMIT, and OFFSET NULL skips nothing.
        let mut users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY user_name LIMIT $1 OFFSET $2"
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let memberships = self.memberships(&ids).await?;
        for user in &mut users {
            user.roles = memberships
                .iter()
                .filter(|m| m.user_id == user.id)
                .cloned()
                .collect();
        }

        Ok(users)
    }

    async fn roles_by_ids(&self, ids: &[String]) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r#"SELECT id, name FROM roles WHERE id = ANY($1) ORDER BY name"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn subordinates(&self, manager_id: &str) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE manager_id = $1 ORDER BY user_name"
        ))
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn any_users(&self) -> Result<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>(r#"SELECT EXISTS(SELECT 1 FROM users)"#)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}
