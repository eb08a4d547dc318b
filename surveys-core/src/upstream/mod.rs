//! Clients for the services this one depends on
//!
//! Both the calendar and the notifications service authenticate callers with
//! a service-account bearer token scoped to the tenant being acted on.

pub mod calendar;
pub mod notifications;
pub mod service_account;

pub use calendar::{CalendarClient, EventAccessClient};
pub use notifications::{Notifications, NotificationsClient};
pub use service_account::ServiceAccountTokens;

use crate::error::{AppError, Result};
use reqwest::Client;
use std::time::Duration;

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))
}
