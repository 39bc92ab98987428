//! JSON HTTP surface: article generation plus the caller's article history.

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::pipeline::{ArticlePipeline, PipelineError, PipelineResult};
use crate::store::{self, ArticleStore, BlogArticle};
use crate::Result;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ArticlePipeline>,
    user_header: HeaderName,
}

impl AppState {
    pub fn new(pipeline: Arc<ArticlePipeline>, user_header: &str) -> Result<Self> {
        let user_header = HeaderName::from_bytes(user_header.as_bytes())
            .with_context(|| format!("Invalid identity header name: {}", user_header))?;

        Ok(Self {
            pipeline,
            user_header,
        })
    }
}

/// `{"error": ...}` response with a status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Article not found")
    }

    fn internal(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", err), "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::new(err.status_code(), err.client_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// The user set by the authenticating proxy in front of this service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        parts
            .headers
            .get(&state.user_header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| AuthenticatedUser(user.to_string()))
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

/// Public shape of a stored article
#[derive(Debug, Serialize)]
pub struct ArticleView {
    pub id: Uuid,
    pub title: String,
    pub link: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<BlogArticle> for ArticleView {
    fn from(article: BlogArticle) -> Self {
        Self {
            id: article.id,
            title: article.source_title,
            link: article.source_link,
            content: article.content,
            created_at: article.created_at,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/generate",
            post(generate_article).fallback(method_not_allowed),
        )
        .route("/api/articles", get(list_articles))
        .route("/api/articles/{id}", get(get_article))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn method_not_allowed() -> ApiError {
    PipelineError::MethodNotAllowed.into()
}

async fn generate_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    body: Bytes,
) -> std::result::Result<Json<PipelineResult>, ApiError> {
    let result = state.pipeline.handle(&user, &body).await?;
    Ok(Json(result))
}

async fn list_articles(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> std::result::Result<Json<Vec<ArticleView>>, ApiError> {
    let articles = state
        .pipeline
        .store()
        .list_for_owner(&user)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(articles.into_iter().map(ArticleView::from).collect()))
}

async fn get_article(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> std::result::Result<Json<ArticleView>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found())?;

    match state.pipeline.store().get(id).await.map_err(ApiError::internal)? {
        Some(article) if article.owner == user => Ok(Json(article.into())),
        // someone else's article is indistinguishable from a missing one
        _ => Err(ApiError::not_found()),
    }
}

/// Build everything from `config` and serve until Ctrl+C
pub async fn serve(config: &Config, bind: Option<&str>) -> Result<()> {
    let store = store::from_config(config.storage.articles_path.as_deref())?;
    let pipeline = ArticlePipeline::from_config(config, store).await?;
    let state = AppState::new(Arc::new(pipeline), &config.server.user_header)?;

    let addr = bind.unwrap_or(&config.server.bind);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(addr = %addr, "blogscribe listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
