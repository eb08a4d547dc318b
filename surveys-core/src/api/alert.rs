//! Alert contact and survey alert handlers

use crate::api::{MessageResponse, SuccessResponse};
use crate::domain::{AlertContactInput, SurveyAlert};
use crate::error::Result;
use crate::middleware::{AdminUser, AuthUser};
use crate::state::HasServices;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

pub async fn list_contacts<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
) -> Result<impl IntoResponse> {
    let contacts = state.alert_service().list(&admin.tenant()).await?;
    Ok(Json(SuccessResponse::new(contacts)))
}

pub async fn get_contact<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let contact = state.alert_service().get(&id, &admin.tenant()).await?;
    Ok(Json(SuccessResponse::new(contact)))
}

pub async fn create_contact<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Json(input): Json<AlertContactInput>,
) -> Result<impl IntoResponse> {
    let contact = state.alert_service().create(input, &admin.tenant()).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(contact))))
}

pub async fn update_contact<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(input): Json<AlertContactInput>,
) -> Result<impl IntoResponse> {
    let contact = state
        .alert_service()
        .update(&id, input, &admin.tenant())
        .await?;
    Ok(Json(SuccessResponse::new(contact)))
}

pub async fn delete_contact<S: HasServices>(
    State(state): State<S>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.alert_service().delete(&id, &admin.tenant()).await?;
    Ok(Json(MessageResponse::new("Alert contact deleted successfully")))
}

/// Raise a survey alert in the caller's tenant. Delivery is asynchronous.
pub async fn raise<S: HasServices>(
    State(state): State<S>,
    auth: AuthUser,
    Json(mut alert): Json<SurveyAlert>,
) -> Result<impl IntoResponse> {
    let tenant = auth.tenant();
    alert.org_id = tenant.org_id.clone();
    alert.app_id = tenant.app_id.clone();

    let started = state.alert_service().raise(alert, &tenant).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(format!(
            "Survey alert sent to {} contact(s)",
            started
        ))),
    ))
}
