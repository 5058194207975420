use super::{viewer, ApiError, ApiResult, AppState};
use crate::accounts::{AccountService, LoginInput, ProfileDetails, RegisterInput, UserProfile};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct EmailRequest {
    email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AckResponse {
    ok: bool,
}

fn service(state: &AppState) -> AccountService {
    AccountService::new(state.database.clone(), state.votes.clone())
}

pub(crate) async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = service(&state).register(input)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub(crate) async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> ApiResult<UserProfile> {
    match service(&state).login(input)? {
        Some(profile) => Ok(Json(profile)),
        None => Err(ApiError::Unauthorized("invalid email or password".into())),
    }
}

pub(crate) async fn request_magic_link(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> ApiResult<AckResponse> {
    service(&state).request_magic_link(&request.email)?;
    Ok(Json(AckResponse { ok: true }))
}

pub(crate) async fn verify_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> ApiResult<AckResponse> {
    let ok = service(&state).verify_email(&request.email)?;
    Ok(Json(AckResponse { ok }))
}

pub(crate) async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ProfileDetails> {
    match service(&state).get_profile(&viewer(&headers), &username)? {
        Some(profile) => Ok(Json(profile)),
        None => Err(ApiError::NotFound(format!("user {username} not found"))),
    }
}
