//! Sign-in with login name and password.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::router::administration::UserResponse;

pub const TOKEN_TYPE: &str = "Bearer";
const INVALID_CREDENTIALS: &str = "The username/password couple is invalid.";
const LOCKED_OUT: &str = "This account has been locked out, please try again later.";

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[validate(length(min = 1, message = "Username is required."))]
    pub user_name: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

/// Handler for sign-in.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let invalid = || ServerError::Identity(vec![INVALID_CREDENTIALS.into()]);

    let Some(user) = state.accounts.find_user_by_name(&body.user_name).await?
    else {
        return Err(invalid());
    };

    if user.is_locked_out(Utc::now()) {
        return Err(ServerError::Identity(vec![LOCKED_OUT.into()]));
    }

    if !state.accounts.check_password(&user, &body.password).await? {
        tracing::info!(user_id = %user.id, "sign-in failed");
        return Err(invalid());
    }

    let roles = state.accounts.get_roles(&user).await?;
    let token = state.token.create(&user.id, &user.user_name, roles.clone())?;

    tracing::debug!(user_id = %user.id, "signed in");

    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token,
        expires_in: state.token.expires_in(),
        user: UserResponse::new(user, roles),
    }))
}
