use super::{viewer, ApiError, ApiResult, AppState};
use crate::ranking::SortPolicy;
use crate::threading::{
    CommentView, CreateCommentInput, CreatePostInput, PostDetails, PostView, ThreadService,
};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub(crate) struct ListPostsParams {
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostParams {
    #[serde(default)]
    sort: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    api_port: u16,
    storage: String,
}

fn service(state: &AppState) -> ThreadService {
    ThreadService::new(
        state.database.clone(),
        state.votes.clone(),
        state.config.ranking,
    )
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        storage: state.database.storage_kind().to_string(),
    })
}

pub(crate) async fn list_posts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListPostsParams>,
) -> ApiResult<Vec<PostView>> {
    list(&state, &headers, None, params)
}

pub(crate) async fn list_community_posts(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Query(params): Query<ListPostsParams>,
) -> ApiResult<Vec<PostView>> {
    list(&state, &headers, Some(&name), params)
}

fn list(
    state: &AppState,
    headers: &HeaderMap,
    community: Option<&str>,
    params: ListPostsParams,
) -> ApiResult<Vec<PostView>> {
    let sort = SortPolicy::parse_or(params.sort.as_deref(), SortPolicy::Hot)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let posts = service(state).list_posts(&viewer(headers), community, sort, Some(limit))?;
    Ok(Json(posts))
}

pub(crate) async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<PostParams>,
) -> ApiResult<PostDetails> {
    let sort = SortPolicy::parse_or(params.sort.as_deref(), SortPolicy::Top)?;
    match service(&state).get_post(&viewer(&headers), &id, sort)? {
        Some(details) => Ok(Json(details)),
        None => Err(ApiError::NotFound(format!("post {id} not found"))),
    }
}

pub(crate) async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let post = service(&state).create_post(&viewer(&headers), input)?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub(crate) async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    let comment = service(&state).create_comment(&viewer(&headers), &post_id, input)?;
    Ok((StatusCode::CREATED, Json(comment)))
}
