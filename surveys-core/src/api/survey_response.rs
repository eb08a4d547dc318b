//! Survey response API handlers

use crate::api::{clamp_limit, split_list, MessageResponse, SuccessResponse};
use crate::domain::Survey;
use crate::error::Result;
use crate::middleware::{AdminUser, AuthUser};
use crate::service::ResponseFilter;
use crate::state::HasServices;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ResponseListParams {
    pub survey_ids: Option<String>,
    pub survey_types: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ResponseListParams> for ResponseFilter {
    fn from(params: ResponseListParams) -> Self {
        ResponseFilter {
            survey_ids: split_list(params.survey_ids.as_deref()),
            survey_types: split_list(params.survey_types.as_deref()),
            start_date: params.start_date,
            end_date: params.end_date,
            limit: clamp_limit(params.limit),
            offset: params.offset.map(|o| o.max(0)),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct DeletedCount {
    pub deleted: u64,
}

pub async fn list<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Query(params): Query<ResponseListParams>,
) -> Result<impl IntoResponse> {
    let responses = state
        .survey_response_service()
        .list(params.into(), &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(responses)))
}

pub async fn get<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let response = state
        .survey_response_service()
        .get(&id, &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(response)))
}

/// The body is the survey with the caller's answers filled in
pub async fn create<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Json(answered): Json<Survey>,
) -> Result<impl IntoResponse> {
    let response = state
        .survey_response_service()
        .create(answered, &auth.tenant(), &auth.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(response))))
}

pub async fn update<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(answered): Json<Survey>,
) -> Result<impl IntoResponse> {
    let response = state
        .survey_response_service()
        .update(&id, answered, &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(response)))
}

pub async fn delete<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state
        .survey_response_service()
        .delete(&id, &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(MessageResponse::new("Survey response deleted successfully")))
}

/// Bulk delete of the caller's responses matching the query string
pub async fn delete_many<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Query(params): Query<ResponseListParams>,
) -> Result<impl IntoResponse> {
    let deleted = state
        .survey_response_service()
        .delete_many(params.into(), &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(DeletedCount { deleted })))
}

/// Responses to an event-linked survey, for that event's admins
pub async fn list_for_survey<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(survey_id): Path<String>,
    Query(params): Query<ResponseListParams>,
) -> Result<impl IntoResponse> {
    let responses = state
        .survey_response_service()
        .list_for_event_admin(&survey_id, params.into(), &auth.tenant(), &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(responses)))
}

pub async fn admin_list_for_survey<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(survey_id): Path<String>,
    Query(params): Query<ResponseListParams>,
) -> Result<impl IntoResponse> {
    let responses = state
        .survey_response_service()
        .list_for_event_admin(&survey_id, params.into(), &admin.tenant(), &admin.actor())
        .await?;
    Ok(Json(SuccessResponse::new(responses)))
}
