use super::{ApiError, ApiResult, AppState};
use crate::communities::{CommunityService, CreateCommunityInput};
use crate::database::models::CommunityRecord;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

pub(crate) async fn list_communities(
    State(state): State<AppState>,
) -> ApiResult<Vec<CommunityRecord>> {
    let service = CommunityService::new(state.database.clone());
    Ok(Json(service.list()?))
}

pub(crate) async fn get_community(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CommunityRecord> {
    let service = CommunityService::new(state.database.clone());
    match service.get(&name)? {
        Some(community) => Ok(Json(community)),
        None => Err(ApiError::NotFound(format!("community {name} not found"))),
    }
}

pub(crate) async fn create_community(
    State(state): State<AppState>,
    Json(input): Json<CreateCommunityInput>,
) -> Result<(StatusCode, Json<CommunityRecord>), ApiError> {
    let service = CommunityService::new(state.database.clone());
    let community = service.create(input)?;
    Ok((StatusCode::CREATED, Json(community)))
}
