//! Service-account bearer tokens, cached per tenant

use crate::config::ServiceAccountConfig;
use crate::domain::Tenant;
use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Fetches and caches service-account tokens
#[derive(Clone)]
pub struct ServiceAccountTokens {
    config: ServiceAccountConfig,
    http_client: Client,
    tokens: Arc<RwLock<HashMap<Tenant, CachedToken>>>,
}

impl ServiceAccountTokens {
    pub fn new(config: ServiceAccountConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bearer token for `tenant`, or `None` when no token endpoint is
    /// configured (local development)
    pub async fn token(&self, tenant: &Tenant) -> Result<Option<String>> {
        if self.config.token_url.is_empty() {
            return Ok(None);
        }

        {
            let tokens = self.tokens.read().await;
            if let Some(t) = tokens.get(tenant) {
                if t.expires_at > Utc::now() + Duration::seconds(30) {
                    return Ok(Some(t.access_token.clone()));
                }
            }
        }

        let params = [
            ("grant_type", "client_credentials"),
            ("account_id", self.config.account_id.as_str()),
            ("secret", self.config.secret.as_str()),
            ("app_id", tenant.app_id.as_str()),
            ("org_id", tenant.org_id.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamUnavailable(format!("Failed to get service token: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamUnavailable(format!(
                "Failed to get service token: {} - {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("Failed to parse token response: {}", e))
        })?;

        let cached = CachedToken {
            access_token: token_response.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token_response.expires_in),
        };
        self.tokens.write().await.insert(tenant.clone(), cached);

        Ok(Some(token_response.access_token))
    }
}
