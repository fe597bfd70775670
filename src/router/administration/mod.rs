//! Administration HTTP API. Every route requires the administrator role.
mod roles;
mod users;

use axum::routing::get;
use axum::{Router, middleware};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::account::{User, UserAndRoles};

/// User as shown to administrators, with role names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "roleIds")]
    pub roles: Vec<String>,
}

impl UserResponse {
    pub fn new(user: User, roles: Vec<String>) -> Self {
        Self { user, roles }
    }
}

impl From<UserAndRoles> for UserResponse {
    fn from(value: UserAndRoles) -> Self {
        Self::new(value.user, value.roles)
    }
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `GET /users?page&pageSize` lists, `POST /users` creates.
        .route("/users", get(users::list).post(users::create))
        .route(
            "/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/users/{id}/subordinates", get(users::subordinates))
        .route("/roles", get(roles::list).post(roles::create))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::require_admin,
        ))
}
