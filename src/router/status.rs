//! Public server status.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::config::Configuration;
use crate::error::{Result, ServerError};

/// Structured configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct Status {
    pub name: String,
    pub version: String,
}

/// Public server status (configuration).
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        version: config.version().to_owned(),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Result<Response> {
    let Some(handle) = &state.metrics else {
        return Err(ServerError::NotFound("metrics".into()));
    };

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_status_handler() {
        let state = router::state().await;
        let app = app(state.clone());

        let response =
            make_request(None, app, Method::GET, "/status.json", String::default())
                .await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Status = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.name, state.config.name);
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = app(router::state().await);

        let response =
            make_request(None, app, Method::GET, "/metrics", String::default())
                .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
