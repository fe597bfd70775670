use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::account::Role;
use crate::error::Result;
use crate::router::Valid;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 256,
        message = "Role name must be between 1 and 256 characters."
    ))]
    pub name: String,
}

/// `GET /roles`.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Role>>> {
    Ok(Json(state.accounts.roles().await?))
}

/// `POST /roles`.
pub async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<Role>)> {
    let role = state.accounts.create_role(body.name.trim()).await?;
    tracing::info!(role_id = %role.id, name = %role.name, "role created");

    Ok((StatusCode::CREATED, Json(role)))
}
