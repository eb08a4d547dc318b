//! Analytics export, authenticated by a static token instead of a JWT

use crate::api::{split_list, SuccessResponse};
use crate::error::Result;
use crate::service::AnalyticsQuery;
use crate::state::HasServices;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub survey_types: Option<String>,
    /// Hours back from now
    pub time_offset: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn anonymous_responses<S: HasServices>(
    State(state): State<S>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<AnalyticsParams>,
) -> Result<impl IntoResponse> {
    let analytics = state.analytics_service();
    analytics.authorize(auth.token())?;

    let query = AnalyticsQuery {
        survey_types: split_list(params.survey_types.as_deref()),
        start_date: params.start_date,
        end_date: params.end_date,
        time_offset_hours: params.time_offset,
    };
    let responses = analytics.anonymous_responses(&query).await?;
    Ok(Json(SuccessResponse::new(responses)))
}
