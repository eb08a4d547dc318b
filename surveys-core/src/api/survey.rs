//! Survey API handlers
//!
//! Client routes act with the caller's own rights. Admin update and delete
//! pass `already_admin` so the event check is skipped. Admin create still
//! needs the caller to be an admin of the linked event.

use crate::api::{clamp_limit, split_list, MessageResponse, SuccessResponse};
use crate::domain::{SurveyInput, SurveyQuery, SurveyTimeFilter};
use crate::error::Result;
use crate::middleware::{AdminUser, AuthUser};
use crate::state::HasServices;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query string of the survey list endpoints. List values are
/// comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct SurveyListParams {
    pub ids: Option<String>,
    pub types: Option<String>,
    pub calendar_event_id: Option<String>,
    pub start_time_after: Option<DateTime<Utc>>,
    pub start_time_before: Option<DateTime<Utc>>,
    pub end_time_after: Option<DateTime<Utc>>,
    pub end_time_before: Option<DateTime<Utc>>,
    pub public: Option<bool>,
    pub archived: Option<bool>,
    pub completed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SurveyListParams {
    fn into_query(self) -> (SurveyQuery, Option<bool>) {
        let query = SurveyQuery {
            creator_id: None,
            ids: split_list(self.ids.as_deref()),
            types: split_list(self.types.as_deref()),
            calendar_event_id: self.calendar_event_id.filter(|e| !e.is_empty()),
            time: SurveyTimeFilter {
                start_time_after: self.start_time_after,
                start_time_before: self.start_time_before,
                end_time_after: self.end_time_after,
                end_time_before: self.end_time_before,
            },
            public: self.public,
            archived: self.archived,
            limit: clamp_limit(self.limit),
            offset: self.offset.map(|o| o.max(0)),
        };
        (query, self.completed)
    }
}

pub async fn list<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Query(params): Query<SurveyListParams>,
) -> Result<impl IntoResponse> {
    let (query, completed) = params.into_query();
    let surveys = state
        .survey_service()
        .list(&auth.tenant(), &query, completed, &auth.actor())
        .await?;
    Ok(Json(SuccessResponse::new(surveys)))
}

pub async fn get<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let survey = state.survey_service().get(&id, &auth.tenant()).await?;
    Ok(Json(SuccessResponse::new(survey)))
}

pub async fn create<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Json(input): Json<SurveyInput>,
) -> Result<impl IntoResponse> {
    let survey = state
        .survey_service()
        .create(input, &auth.tenant(), &auth.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(survey))))
}

pub async fn update<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<SurveyInput>,
) -> Result<impl IntoResponse> {
    let survey = state
        .survey_service()
        .update(&id, input, &auth.tenant(), &auth.actor(), false)
        .await?;
    Ok(Json(SuccessResponse::new(survey)))
}

pub async fn delete<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state
        .survey_service()
        .delete(&id, &auth.tenant(), &auth.actor(), false)
        .await?;
    Ok(Json(MessageResponse::new("Survey deleted successfully")))
}

/// Surveys created by the caller
pub async fn list_created<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
) -> Result<impl IntoResponse> {
    let surveys = state
        .survey_service()
        .list_created_by(&auth.actor(), &auth.tenant())
        .await?;
    Ok(Json(SuccessResponse::new(surveys)))
}

/// Everything stored about the caller
pub async fn user_data<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
) -> Result<impl IntoResponse> {
    let data = state
        .survey_service()
        .get_user_data(&auth.actor(), &auth.tenant())
        .await?;
    Ok(Json(SuccessResponse::new(data)))
}

// ============================================================================
// Admin
// ============================================================================

pub async fn admin_list<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Query(params): Query<SurveyListParams>,
) -> Result<impl IntoResponse> {
    let (query, completed) = params.into_query();
    let surveys = state
        .survey_service()
        .list(&admin.tenant(), &query, completed, &admin.actor())
        .await?;
    Ok(Json(SuccessResponse::new(surveys)))
}

pub async fn admin_get<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let survey = state.survey_service().get(&id, &admin.tenant()).await?;
    Ok(Json(SuccessResponse::new(survey)))
}

pub async fn admin_create<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Json(input): Json<SurveyInput>,
) -> Result<impl IntoResponse> {
    let survey = state
        .survey_service()
        .create(input, &admin.tenant(), &admin.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(survey))))
}

pub async fn admin_update<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<SurveyInput>,
) -> Result<impl IntoResponse> {
    let survey = state
        .survey_service()
        .update(&id, input, &admin.tenant(), &admin.actor(), true)
        .await?;
    Ok(Json(SuccessResponse::new(survey)))
}

pub async fn admin_delete<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state
        .survey_service()
        .delete(&id, &admin.tenant(), &admin.actor(), true)
        .await?;
    Ok(Json(MessageResponse::new("Survey deleted successfully")))
}
