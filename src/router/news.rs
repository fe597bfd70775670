//! Company news feed HTTP API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::news::News;
use crate::paging::Pagination;
use crate::router::Valid;

/// Paging fields stay flat, `Query` cannot flatten numbers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub author_id: Option<String>,
    #[serde(default = "crate::paging::unbounded_clause")]
    pub page: i64,
    #[serde(default = "crate::paging::unbounded_clause")]
    pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    pub id: Option<i32>,
    #[validate(length(
        max = 200,
        message = "Content must be at most 200 characters."
    ))]
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub author_id: Option<String>,
}

impl From<Body> for News {
    fn from(body: Body) -> Self {
        News {
            id: body.id.unwrap_or_default(),
            content: body.content,
            created_at: body.created_at.unwrap_or_else(Utc::now),
            author_id: body.author_id.filter(|id| !id.is_empty()),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).put(update))
        .route("/{id}", delete(remove))
}

/// `GET /news?authorId&page&pageSize`.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<News>>> {
    let pagination = Pagination::new(query.page, query.page_size);
    let news = state
        .news
        .list(query.author_id.as_deref(), pagination)
        .await?;

    Ok(Json(news))
}

/// `POST /news`. Store faults answer a bare 500.
pub async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<News>> {
    match state.news.add(&body.into()).await {
        Ok(news) => Ok(Json(news)),
        Err(err) => Err(ServerError::Internal {
            details: "news creation failed".into(),
            source: Some(Box::new(err)),
        }),
    }
}

/// `PUT /news`. Store faults answer a bare 500.
pub async fn update(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode> {
    match state.news.update(&body.into()).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(err) => Err(ServerError::Internal {
            details: "news editing failed".into(),
            source: Some(Box::new(err)),
        }),
    }
}

/// `DELETE /news/{id}`. Unknown ids answer 400.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    if state.news.find(id).await?.is_none() {
        return Err(ServerError::UnknownNews { id });
    }

    state.news.remove(id).await?;
    Ok(StatusCode::OK)
}
