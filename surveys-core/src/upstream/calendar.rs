//! Calendar service client: role and attendance facts for event users

use super::{build_http_client, ServiceAccountTokens};
use crate::config::UpstreamConfig;
use crate::domain::{EventPerson, EventPersonFilter, EventUser, Tenant};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::Serialize;

/// Remote lookup of who holds which role on a calendar event
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventAccessClient: Send + Sync {
    /// Facts for each of `users` on `event_id` that pass `filter`.
    ///
    /// Transport failures and non-2xx answers are `UpstreamUnavailable`.
    async fn get_event_persons(
        &self,
        tenant: &Tenant,
        event_id: &str,
        users: &[EventUser],
        filter: &EventPersonFilter,
    ) -> Result<Vec<EventPerson>>;
}

#[derive(Serialize)]
struct EventUsersRequest<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    users: &'a [EventUser],
    #[serde(skip_serializing_if = "Option::is_none")]
    registered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attended: Option<bool>,
}

/// HTTP implementation of [`EventAccessClient`]
#[derive(Clone)]
pub struct CalendarClient {
    base_url: String,
    http_client: Client,
    tokens: ServiceAccountTokens,
}

impl CalendarClient {
    pub fn new(config: &UpstreamConfig, tokens: ServiceAccountTokens) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client: build_http_client(config.timeout())?,
            tokens,
        })
    }

    async fn fetch(
        &self,
        tenant: &Tenant,
        event_id: &str,
        users: &[EventUser],
        filter: &EventPersonFilter,
    ) -> Result<Vec<EventPerson>> {
        let url = format!("{}/event/{}/users", self.base_url, event_id);
        let body = EventUsersRequest {
            users,
            registered: filter.registered,
            role: filter.role.as_deref(),
            attended: filter.attended,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(token) = self.tokens.token(tenant).await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Calendar request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Calendar returned {} for event {}: {}",
                status, event_id, body
            )));
        }

        response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse calendar response: {}", e))
        })
    }
}

#[async_trait]
impl EventAccessClient for CalendarClient {
    async fn get_event_persons(
        &self,
        tenant: &Tenant,
        event_id: &str,
        users: &[EventUser],
        filter: &EventPersonFilter,
    ) -> Result<Vec<EventPerson>> {
        let result = self.fetch(tenant, event_id, users, filter).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("surveys_event_access_requests_total", "outcome" => outcome).increment(1);
        result
    }
}
