//! Cross-tenant anonymous response export
//!
//! Callers present a static bearer token. Its SHA-256 digest, base64
//! encoded, must equal the `analytics_token_hash` of the global `env`
//! config.

use crate::cache::ConfigCache;
use crate::domain::{AnonymousSurveyResponse, SurveyResponseQuery, Tenant, ALL_APPS, ALL_ORGS};
use crate::error::{AppError, Result};
use crate::repository::{ConfigRepository, SurveyResponseRepository};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Time window and types selected by an analytics caller
#[derive(Debug, Clone, Default)]
pub struct AnalyticsQuery {
    pub survey_types: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Window length in hours ending now, used when no dates are given
    pub time_offset_hours: Option<i64>,
}

impl AnalyticsQuery {
    fn window(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_date, self.end_date, self.time_offset_hours) {
            (Some(start), Some(end), _) => Ok((start, end)),
            (Some(start), None, _) => Ok((start, now)),
            (None, _, Some(hours)) if hours > 0 => {
                let end = self.end_date.unwrap_or(now);
                Ok((end - Duration::hours(hours), end))
            }
            _ => Err(AppError::BadRequest(
                "start_date or a positive time_offset is required".to_string(),
            )),
        }
    }
}

pub struct AnalyticsService<R: SurveyResponseRepository, C: ConfigRepository> {
    responses: Arc<R>,
    configs: Arc<ConfigCache<C>>,
}

impl<R: SurveyResponseRepository, C: ConfigRepository> AnalyticsService<R, C> {
    pub fn new(responses: Arc<R>, configs: Arc<ConfigCache<C>>) -> Self {
        Self { responses, configs }
    }

    /// Check a presented analytics token against the configured digest.
    /// With no digest configured every token is rejected.
    pub fn authorize(&self, token: &str) -> Result<()> {
        let expected = self
            .configs
            .env_config(&Tenant::new(ALL_ORGS, ALL_APPS))
            .and_then(|env| env.analytics_token_hash)
            .filter(|hash| !hash.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Analytics access is not configured".to_string()))?;

        let presented = STANDARD.encode(Sha256::digest(token.as_bytes()));
        if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("Invalid analytics token".to_string()))
        }
    }

    /// Responses from every tenant in the query window, stripped of answers
    /// and authors
    pub async fn anonymous_responses(
        &self,
        query: &AnalyticsQuery,
    ) -> Result<Vec<AnonymousSurveyResponse>> {
        let (start, end) = query.window(Utc::now())?;
        let responses = self
            .responses
            .list(&SurveyResponseQuery {
                survey_types: query.survey_types.clone(),
                start_date: Some(start),
                end_date: Some(end),
                ..Default::default()
            })
            .await?;

        Ok(responses.iter().map(AnonymousSurveyResponse::from).collect())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
