//! Employee accounts administration.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::UserResponse;
use crate::AppState;
use crate::account::User;
use crate::error::{Result, ServerError};
use crate::paging::Pagination;
use crate::router::Valid;
use crate::token::Claims;

const CONFLICTING_ID: &str = "Conflicting user id in parameter and model data.";
const INVALID_CURRENT_PASSWORD: &str = "The username/password couple is invalid.";

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub id: Option<String>,
    #[validate(length(
        min = 2,
        max = 200,
        message = "Username must be between 2 and 200 characters."
    ))]
    pub user_name: String,
    #[validate(
        length(max = 200, message = "Email must be at most 200 characters."),
        email(message = "Invalid email address.")
    )]
    pub email: String,
    pub job_title: Option<String>,
    pub phone_number: Option<String>,
    pub manager_id: Option<String>,
    /// Role names. Absent on update leaves memberships untouched.
    pub role_ids: Option<Vec<String>>,
    pub new_password: Option<String>,
    pub current_password: Option<String>,
}

impl Body {
    fn apply(&self, user: &mut User) {
        user.user_name = self.user_name.clone();
        user.email = self.email.clone();
        user.job_title = self.job_title.clone();
        user.phone_number = self.phone_number.clone();
        user.manager_id = self.manager_id.clone().filter(|id| !id.is_empty());
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

async fn check_manager(state: &AppState, user: &User) -> Result<()> {
    let Some(manager_id) = &user.manager_id else {
        return Ok(());
    };

    if state.accounts.find_user_by_id(manager_id).await?.is_none() {
        return Err(ServerError::Identity(vec![format!(
            "Manager '{manager_id}' does not exist."
        )]));
    }
    Ok(())
}

/// `GET /users?page&pageSize`.
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<UserResponse>>> {
    let users = state.accounts.get_users_and_roles(pagination).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// `GET /users/{id}`.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>> {
    match state.accounts.get_user_and_roles(&id).await? {
        Some(user) => Ok(Json(user.into())),
        None => Err(ServerError::NotFound(format!("user {id}"))),
    }
}

/// `GET /users/{id}/subordinates`.
pub async fn subordinates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<User>>> {
    if state.accounts.find_user_by_id(&id).await?.is_none() {
        return Err(ServerError::NotFound(format!("user {id}")));
    }

    Ok(Json(state.accounts.subordinates(&id).await?))
}

/// `POST /users`.
pub async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<UserResponse>> {
    let mut user = User::default();
    body.apply(&mut user);
    check_manager(&state, &user).await?;

    let created = state
        .accounts
        .create_user(
            &user,
            body.role_ids.as_deref().unwrap_or_default(),
            body.new_password.as_deref().unwrap_or_default(),
        )
        .await?;

    match state.accounts.get_user_and_roles(&created.id).await? {
        Some(user) => Ok(Json(user.into())),
        None => Err(ServerError::internal(format!(
            "user {} vanished after creation",
            created.id
        ))),
    }
}

/// `PUT /users/{id}`.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode> {
    if non_blank(&body.id).is_some_and(|body_id| body_id != id) {
        return Err(ServerError::Identity(vec![CONFLICTING_ID.into()]));
    }

    let Some(mut user) = state.accounts.find_user_by_id(&id).await? else {
        return Err(ServerError::NotFound(format!("user {id}")));
    };

    let new_password = non_blank(&body.new_password);
    let current_password = non_blank(&body.current_password);
    let user_name_changed =
        user.user_name.to_lowercase() != body.user_name.to_lowercase();

    // Administrators editing themselves must prove who they are.
    if claims.sub == id {
        let mut errors = Vec::new();
        match current_password {
            None => {
                if new_password.is_some() {
                    errors.push(
                        "Current password is required when changing your own password."
                            .to_owned(),
                    );
                }
                if user_name_changed {
                    errors.push(
                        "Current password is required when changing your own username."
                            .to_owned(),
                    );
                }
            },
            Some(current) if new_password.is_some() || user_name_changed => {
                if !state.accounts.check_password(&user, current).await? {
                    errors.push(INVALID_CURRENT_PASSWORD.to_owned());
                }
            },
            Some(_) => {},
        }

        if !errors.is_empty() {
            return Err(ServerError::Identity(errors));
        }
    }

    body.apply(&mut user);
    check_manager(&state, &user).await?;

    state
        .accounts
        .update_user(&user, body.role_ids.as_deref())
        .await?;

    if let Some(new_password) = new_password {
        match current_password {
            Some(current) => {
                state
                    .accounts
                    .update_password(&user, current, new_password)
                    .await?
            },
            None => state.accounts.reset_password(&user, new_password).await?,
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /users/{id}`.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let Some(user) = state.accounts.find_user_by_id(&id).await? else {
        return Err(ServerError::NotFound(format!("user {id}")));
    };

    state
        .accounts
        .delete_user(&user)
        .await
        .map_err(|err| ServerError::Internal {
            details: format!("cannot delete user {id}"),
            source: Some(Box::new(err)),
        })?;

    Ok(StatusCode::OK)
}
