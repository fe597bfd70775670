pub mod administration;
pub mod login;
pub mod news;
pub mod status;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ServerError;

/// JSON body checked with [`validator`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// State over in-memory stores, seeded with the default accounts.
#[cfg(test)]
pub async fn state() -> crate::AppState {
    use std::sync::Arc;

    use crate::account::AccountManager;
    use crate::account::memory::MemoryStore;
    use crate::config::Configuration;
    use crate::news::memory::MemoryNews;
    use crate::seed::DatabaseInitializer;
    use crate::token::TokenManager;

    let mut config = Configuration::default();
    config.token.secret = "test-secret".into();

    let accounts = Arc::new(AccountManager::from_store(Arc::new(MemoryStore::new())));
    DatabaseInitializer::new(Arc::clone(&accounts), config.seed.clone())
        .seed()
        .await
        .unwrap();

    crate::AppState {
        token: TokenManager::new(&config.name, &config.token),
        config: Arc::new(config),
        accounts,
        news: Arc::new(MemoryNews::default()),
        metrics: None,
    }
}

/// Bearer token for a seeded user, as the login route would issue it.
#[cfg(test)]
pub async fn bearer(state: &crate::AppState, user_name: &str) -> String {
    let user = state
        .accounts
        .find_user_by_name(user_name)
        .await
        .unwrap()
        .unwrap();
    let roles = state.accounts.get_roles(&user).await.unwrap();

    format!(
        "Bearer {}",
        state.token.create(&user.id, &user.user_name, roles).unwrap()
    )
}
