//! Config admin API handlers
//!
//! Reads come from the in-memory cache, so a config written a moment ago may
//! not be listed until the change notification has been processed.

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::ConfigInput;
use crate::error::Result;
use crate::middleware::AdminUser;
use crate::state::HasServices;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ConfigListParams {
    #[serde(rename = "type")]
    pub config_type: Option<String>,
}

pub async fn list<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Query(params): Query<ConfigListParams>,
) -> Result<impl IntoResponse> {
    let configs = state
        .config_service()
        .list(params.config_type.as_deref(), &admin.claims);
    Ok(Json(SuccessResponse::new(configs)))
}

pub async fn get<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let config = state.config_service().get(&id, &admin.claims)?;
    Ok(Json(SuccessResponse::new(config)))
}

pub async fn create<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Json(input): Json<ConfigInput>,
) -> Result<impl IntoResponse> {
    let config = state.config_service().create(input, &admin.claims).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(config))))
}

pub async fn update<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<ConfigInput>,
) -> Result<impl IntoResponse> {
    let config = state
        .config_service()
        .update(&id, input, &admin.claims)
        .await?;
    Ok(Json(SuccessResponse::new(config)))
}

pub async fn delete<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.config_service().delete(&id, &admin.claims).await?;
    Ok(Json(MessageResponse::new("Config deleted successfully")))
}
