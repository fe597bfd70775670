//! Default roles and accounts created on first start.

use std::sync::Arc;

use crate::account::{AccountManager, User};
use crate::config::{Seed, SeedAccount};
use crate::error::ServerError;

#[derive(thiserror::Error, Debug)]
pub enum SeedError {
    #[error("seeding \"{name}\" role failed: {source}")]
    Role {
        name: String,
        #[source]
        source: ServerError,
    },

    #[error("seeding \"{user_name}\" user failed: {source}")]
    User {
        user_name: String,
        #[source]
        source: ServerError,
    },

    #[error("cannot check existing users: {0}")]
    Store(#[from] ServerError),
}

/// Seeds an empty database.
pub struct DatabaseInitializer {
    accounts: Arc<AccountManager>,
    seed: Seed,
}

impl DatabaseInitializer {
    /// Create a new [`DatabaseInitializer`].
    pub fn new(accounts: Arc<AccountManager>, seed: Seed) -> Self {
        Self { accounts, seed }
    }

    /// Create roles and default accounts when no user exists yet.
    ///
    /// Returns whether anything was created.
    pub async fn seed(&self) -> Result<bool, SeedError> {
        if self.accounts.any_users().await? {
            tracing::debug!("users found, skipping seed");
            return Ok(false);
        }

        tracing::info!("generating default data");

        for name in &self.seed.roles {
            self.create_role(name).await?;
        }
        for account in &self.seed.accounts {
            self.create_user(account).await?;
        }

        tracing::info!(
            roles = self.seed.roles.len(),
            accounts = self.seed.accounts.len(),
            "default data generated"
        );
        Ok(true)
    }

    async fn create_role(&self, name: &str) -> Result<(), SeedError> {
        let existing = self.accounts.find_role_by_name(name).await;
        let result = match existing {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => self.accounts.create_role(name).await.map(|_| ()),
            Err(err) => Err(err),
        };

        result.map_err(|source| SeedError::Role {
            name: name.to_owned(),
            source,
        })
    }

    async fn create_user(&self, account: &SeedAccount) -> Result<(), SeedError> {
        let user = User {
            email_confirmed: true,
            phone_number: account.phone_number.clone(),
            job_title: account.job_title.clone(),
            ..User::new(&account.user_name, &account.email)
        };

        self.accounts
            .create_user(&user, &account.roles, &account.password)
            .await
            .map(|_| ())
            .map_err(|source| SeedError::User {
                user_name: account.user_name.clone(),
                source,
            })
    }
}
