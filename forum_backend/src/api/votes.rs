use super::{viewer, ApiResult, AppState};
use crate::votes::{SubjectKind, SyncReport, VoteDirection, VoteOutcome, VoteService};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct VoteRequest {
    direction: VoteDirection,
}

fn service(state: &AppState) -> VoteService {
    VoteService::new(state.database.clone(), state.votes.clone())
}

pub(crate) async fn vote_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> ApiResult<VoteOutcome> {
    let outcome = service(&state).cast(&viewer(&headers), SubjectKind::Post, &id, request.direction)?;
    Ok(Json(outcome))
}

pub(crate) async fn vote_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> ApiResult<VoteOutcome> {
    let outcome =
        service(&state).cast(&viewer(&headers), SubjectKind::Comment, &id, request.direction)?;
    Ok(Json(outcome))
}

pub(crate) async fn sync_votes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<SyncReport> {
    Ok(Json(service(&state).sync(&viewer(&headers))?))
}
