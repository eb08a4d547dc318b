//! Survey responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::survey::Survey;

/// A user's answers, stored with a snapshot of the survey as it was answered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub id: String,
    /// Empty when stripped from an anonymous survey's response set
    #[serde(default)]
    pub user_id: String,
    pub org_id: String,
    pub app_id: String,
    pub survey: Survey,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl SurveyResponse {
    /// Drop the author so the response can be shown to event admins
    pub fn anonymize(&mut self) {
        self.user_id.clear();
    }
}

/// Survey response row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SurveyResponseRow {
    pub id: String,
    pub user_id: String,
    pub org_id: String,
    pub app_id: String,
    #[sqlx(json)]
    pub survey: Survey,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl From<SurveyResponseRow> for SurveyResponse {
    fn from(row: SurveyResponseRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            app_id: row.app_id,
            survey: row.survey,
            date_created: row.date_created,
            date_updated: row.date_updated,
        }
    }
}

/// Filters for listing or bulk-deleting responses. `org_id`/`app_id` unset
/// means every tenant (analytics only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyResponseQuery {
    pub org_id: Option<String>,
    pub app_id: Option<String>,
    pub user_id: Option<String>,
    pub survey_ids: Vec<String>,
    pub survey_types: Vec<String>,
    /// Inclusive lower bound on `date_created`
    pub start_date: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `date_created`
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SurveyResponseQuery {
    pub fn matches(&self, response: &SurveyResponse) -> bool {
        self.org_id.as_ref().is_none_or(|o| &response.org_id == o)
            && self.app_id.as_ref().is_none_or(|a| &response.app_id == a)
            && self.user_id.as_ref().is_none_or(|u| &response.user_id == u)
            && (self.survey_ids.is_empty() || self.survey_ids.contains(&response.survey.id))
            && (self.survey_types.is_empty()
                || self
                    .survey_types
                    .contains(&response.survey.content.survey_type))
            && self.start_date.is_none_or(|s| response.date_created >= s)
            && self.end_date.is_none_or(|e| response.date_created < e)
    }
}

/// Response summary exposed to analytics, carrying no answer or author data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymousSurveyResponse {
    pub id: String,
    pub creator_id: String,
    pub org_id: String,
    pub app_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub survey_type: String,
    pub stats: Option<serde_json::Value>,
    pub date_created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
}

impl From<&SurveyResponse> for AnonymousSurveyResponse {
    fn from(response: &SurveyResponse) -> Self {
        let survey = &response.survey;
        Self {
            id: survey.id.clone(),
            creator_id: survey.creator_id.clone(),
            org_id: survey.org_id.clone(),
            app_id: survey.app_id.clone(),
            title: survey.content.title.clone(),
            survey_type: survey.content.survey_type.clone(),
            stats: survey.content.stats.clone(),
            date_created: survey.date_created,
            date_updated: survey.date_updated,
        }
    }
}

/// Everything the service stores about one user in a tenant
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    pub surveys: Vec<Survey>,
    pub survey_responses: Vec<SurveyResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SurveyContent;

    fn response() -> SurveyResponse {
        SurveyResponse {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            org_id: "o1".to_string(),
            app_id: "a1".to_string(),
            survey: Survey {
                id: "s1".to_string(),
                creator_id: "u0".to_string(),
                org_id: "o1".to_string(),
                app_id: "a1".to_string(),
                content: SurveyContent {
                    title: "Wellness".to_string(),
                    survey_type: "check-in".to_string(),
                    stats: Some(serde_json::json!({"total": 3})),
                    ..Default::default()
                },
                ..Default::default()
            },
            date_created: Utc::now(),
            date_updated: None,
        }
    }

    #[test]
    fn test_anonymize_clears_user() {
        let mut r = response();
        r.anonymize();
        assert!(r.user_id.is_empty());
    }

    #[test]
    fn test_anonymous_summary_uses_survey_snapshot() {
        let r = response();
        let summary = AnonymousSurveyResponse::from(&r);
        assert_eq!(summary.id, "s1");
        assert_eq!(summary.creator_id, "u0");
        assert_eq!(summary.title, "Wellness");
        assert_eq!(summary.survey_type, "check-in");
    }

    #[test]
    fn test_query_matches_survey_filters() {
        let r = response();
        let by_type = SurveyResponseQuery {
            survey_types: vec!["check-in".into()],
            ..Default::default()
        };
        assert!(by_type.matches(&r));

        let other_user = SurveyResponseQuery {
            user_id: Some("u2".into()),
            ..Default::default()
        };
        assert!(!other_user.matches(&r));

        let end_now = SurveyResponseQuery {
            end_date: Some(r.date_created),
            ..Default::default()
        };
        assert!(!end_now.matches(&r));
    }
}
