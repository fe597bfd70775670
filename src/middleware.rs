//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::{Result, ServerError};

const BEARER: &str = "Bearer ";

/// Reject requests without a valid bearer token carrying the
/// administrator role. Decoded claims are added to request extensions.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    else {
        return Err(ServerError::Unauthorized);
    };

    let token = token.strip_prefix(BEARER).unwrap_or(token);
    let claims = state
        .token
        .decode(token)
        .map_err(|_| ServerError::Unauthorized)?;

    if !claims.is_administrator() {
        tracing::info!(user_id = %claims.sub, "administration refused, missing role");
        return Err(ServerError::Forbidden);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
