//! Notifications service client (mail delivery)

use super::{build_http_client, ServiceAccountTokens};
use crate::config::UpstreamConfig;
use crate::domain::Tenant;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifications: Send + Sync {
    async fn send_mail(&self, tenant: &Tenant, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct MailRequest<'a> {
    to_mail: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Clone)]
pub struct NotificationsClient {
    base_url: String,
    http_client: Client,
    tokens: ServiceAccountTokens,
}

impl NotificationsClient {
    pub fn new(config: &UpstreamConfig, tokens: ServiceAccountTokens) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http_client: build_http_client(config.timeout())?,
            tokens,
        })
    }
}

#[async_trait]
impl Notifications for NotificationsClient {
    async fn send_mail(&self, tenant: &Tenant, to: &str, subject: &str, body: &str) -> Result<()> {
        let url = format!("{}/api/bbs/mail", self.base_url);
        let mut request = self.http_client.post(&url).json(&MailRequest {
            to_mail: to,
            subject,
            body,
        });
        if let Some(token) = self.tokens.token(tenant).await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Notifications request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Notifications returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
