mod accounts;
mod communities;
mod posts;
mod votes;

use crate::config::ForumConfig;
use crate::database::Database;
use crate::error::ForumError;
use crate::votes::VoteBook;
use anyhow::Result;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Header naming the viewer whose votes and authorship apply to a request.
pub const VIEWER_HEADER: &str = "x-viewer-id";
pub use crate::votes::ANONYMOUS_VIEWER;

#[derive(Clone)]
pub struct AppState {
    pub config: ForumConfig,
    pub database: Database,
    pub votes: VoteBook,
}

pub(crate) type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn into_response_parts(self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse { message: msg }),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse { message: msg }),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse { message: msg }),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorResponse { message: msg })
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        message: "internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.into_response_parts();
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ForumError> for ApiError {
    fn from(err: ForumError) -> Self {
        match err {
            ForumError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ForumError::Validation(msg) => ApiError::BadRequest(msg),
            ForumError::Conflict(msg) => ApiError::Conflict(msg),
            ForumError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            ForumError::Storage(err) => ApiError::Internal(err),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Viewer named by the request, or the anonymous viewer.
pub(crate) fn viewer(headers: &HeaderMap) -> String {
    headers
        .get(VIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(ANONYMOUS_VIEWER)
        .to_string()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(posts::health_handler))
        .route(
            "/communities",
            get(communities::list_communities).post(communities::create_community),
        )
        .route("/communities/:name", get(communities::get_community))
        .route("/communities/:name/posts", get(posts::list_community_posts))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/:id", get(posts::get_post))
        .route("/posts/:id/comments", post(posts::create_comment))
        .route("/posts/:id/vote", post(votes::vote_post))
        .route("/comments/:id/vote", post(votes::vote_comment))
        .route("/votes/sync", post(votes::sync_votes))
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/magic-link", post(accounts::request_magic_link))
        .route("/auth/verify", post(accounts::verify_email))
        .route("/users/:username", get(accounts::get_profile))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Tries to bind to the given port, or finds the next available port
async fn find_available_port(start_port: u16) -> Result<(TcpListener, u16)> {
    const MAX_PORT_ATTEMPTS: u16 = 100;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let Some(port) = start_port.checked_add(offset) else {
            break;
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => {
                if offset == 0 {
                    tracing::debug!(port, error = %e, "Port in use, trying next port");
                }
                continue;
            }
        }
    }

    anyhow::bail!(
        "Could not find available port in range {}-{}",
        start_port,
        start_port.saturating_add(MAX_PORT_ATTEMPTS - 1)
    )
}

pub async fn serve_http(config: ForumConfig, database: Database, votes: VoteBook) -> Result<()> {
    let state = AppState {
        config: config.clone(),
        database,
        votes,
    };
    let router = build_router(state);

    let (listener, actual_port) = find_available_port(config.api_port).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], actual_port));

    if actual_port != config.api_port {
        tracing::warn!(
            requested_port = config.api_port,
            actual_port = actual_port,
            "Configured port was in use, bound to next available port"
        );
    }

    tracing::info!(?addr, storage = %config.storage, "HTTP server listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
