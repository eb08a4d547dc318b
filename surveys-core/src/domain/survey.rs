//! Survey definitions and list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::common::Tenant;

/// A survey definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Survey {
    pub id: String,
    pub creator_id: String,
    pub org_id: String,
    pub app_id: String,
    /// Linked calendar event. An empty string is treated as unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(flatten)]
    pub content: SurveyContent,
    #[serde(default)]
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub date_updated: Option<DateTime<Utc>>,
}

impl Survey {
    /// The linked calendar event, if any
    pub fn event_id(&self) -> Option<&str> {
        self.calendar_event_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    pub fn tenant(&self) -> Tenant {
        Tenant::new(&self.org_id, &self.app_id)
    }
}

/// Editable survey content. Question data, rules and stats are opaque to this
/// service and stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SurveyContent {
    #[validate(length(max = 512))]
    pub title: String,
    pub more_info: Option<String>,
    pub data: Option<serde_json::Value>,
    pub scored: bool,
    pub result_rules: String,
    pub result_json: String,
    #[serde(rename = "type")]
    #[validate(length(max = 64))]
    pub survey_type: String,
    pub stats: Option<serde_json::Value>,
    pub default_data_key: Option<String>,
    pub default_data_key_rule: Option<String>,
    pub constants: Option<serde_json::Value>,
    pub strings: Option<serde_json::Value>,
    pub sub_rules: Option<serde_json::Value>,
    pub response_keys: Vec<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub estimated_completion_time: Option<i32>,
}

/// Request body for creating or updating a survey
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SurveyInput {
    #[serde(default)]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(flatten)]
    #[validate(nested)]
    pub content: SurveyContent,
}

impl SurveyInput {
    /// Materialize a survey owned by `creator_id` in `tenant`
    pub fn into_survey(self, id: String, creator_id: &str, tenant: &Tenant) -> Survey {
        Survey {
            id,
            creator_id: creator_id.to_string(),
            org_id: tenant.org_id.clone(),
            app_id: tenant.app_id.clone(),
            calendar_event_id: self.calendar_event_id,
            sensitive: self.sensitive,
            anonymous: self.anonymous,
            public: self.public,
            archived: self.archived,
            content: self.content,
            date_created: Utc::now(),
            date_updated: None,
        }
    }
}

/// Survey row from the database
#[derive(Debug, Clone, FromRow)]
pub struct SurveyRow {
    pub id: String,
    pub creator_id: String,
    pub org_id: String,
    pub app_id: String,
    pub calendar_event_id: Option<String>,
    pub sensitive: bool,
    pub anonymous: bool,
    pub public: Option<bool>,
    pub archived: Option<bool>,
    #[sqlx(json)]
    pub content: SurveyContent,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl From<SurveyRow> for Survey {
    fn from(row: SurveyRow) -> Self {
        Self {
            id: row.id,
            creator_id: row.creator_id,
            org_id: row.org_id,
            app_id: row.app_id,
            calendar_event_id: row.calendar_event_id,
            sensitive: row.sensitive,
            anonymous: row.anonymous,
            public: row.public,
            archived: row.archived,
            content: row.content,
            date_created: row.date_created,
            date_updated: row.date_updated,
        }
    }
}

/// Bounds on a survey's start and end dates
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SurveyTimeFilter {
    pub start_time_after: Option<DateTime<Utc>>,
    pub start_time_before: Option<DateTime<Utc>>,
    pub end_time_after: Option<DateTime<Utc>>,
    pub end_time_before: Option<DateTime<Utc>>,
}

/// Filters for listing surveys within a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyQuery {
    pub creator_id: Option<String>,
    pub ids: Vec<String>,
    pub types: Vec<String>,
    pub calendar_event_id: Option<String>,
    pub time: SurveyTimeFilter,
    pub public: Option<bool>,
    pub archived: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl SurveyQuery {
    /// Whether `survey` passes every filter except paging
    pub fn matches(&self, survey: &Survey) -> bool {
        let content = &survey.content;
        let within = |value: Option<DateTime<Utc>>, after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>| {
            if after.is_none() && before.is_none() {
                return true;
            }
            match value {
                Some(v) => after.is_none_or(|a| v >= a) && before.is_none_or(|b| v <= b),
                None => false,
            }
        };

        self.creator_id
            .as_ref()
            .is_none_or(|c| &survey.creator_id == c)
            && (self.ids.is_empty() || self.ids.contains(&survey.id))
            && (self.types.is_empty() || self.types.contains(&content.survey_type))
            && self
                .calendar_event_id
                .as_deref()
                .is_none_or(|e| survey.event_id() == Some(e))
            && within(
                content.start_date,
                self.time.start_time_after,
                self.time.start_time_before,
            )
            && within(
                content.end_date,
                self.time.end_time_after,
                self.time.end_time_before,
            )
            && self
                .public
                .is_none_or(|p| survey.public.unwrap_or(false) == p)
            && self
                .archived
                .is_none_or(|a| survey.archived.unwrap_or(false) == a)
    }
}

/// A survey in a list, with whether the caller has already responded
#[derive(Debug, Clone, Serialize)]
pub struct SurveyListItem {
    #[serde(flatten)]
    pub survey: Survey,
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn survey() -> Survey {
        Survey {
            id: "s1".to_string(),
            creator_id: "u1".to_string(),
            org_id: "o1".to_string(),
            app_id: "a1".to_string(),
            calendar_event_id: Some("e1".to_string()),
            content: SurveyContent {
                survey_type: "feedback".to_string(),
                start_date: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_event_id_treats_empty_as_unset() {
        let mut s = survey();
        assert_eq!(s.event_id(), Some("e1"));
        s.calendar_event_id = Some(String::new());
        assert_eq!(s.event_id(), None);
        s.calendar_event_id = None;
        assert_eq!(s.event_id(), None);
    }

    #[test]
    fn test_survey_json_shape() {
        let json = serde_json::to_value(survey()).unwrap();
        assert_eq!(json["type"], "feedback");
        assert_eq!(json["calendar_event_id"], "e1");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn test_input_into_survey_takes_tenant_and_creator() {
        let input: SurveyInput =
            serde_json::from_str(r#"{"title":"Check-in","type":"daily","public":true}"#).unwrap();
        let s = input.into_survey("s9".into(), "u7", &Tenant::new("o1", "a1"));
        assert_eq!(s.creator_id, "u7");
        assert_eq!(s.org_id, "o1");
        assert_eq!(s.content.title, "Check-in");
        assert_eq!(s.public, Some(true));
    }

    #[rstest]
    #[case(SurveyQuery::default(), true)]
    #[case(SurveyQuery { types: vec!["feedback".into()], ..Default::default() }, true)]
    #[case(SurveyQuery { types: vec!["quiz".into()], ..Default::default() }, false)]
    #[case(SurveyQuery { calendar_event_id: Some("e2".into()), ..Default::default() }, false)]
    #[case(SurveyQuery { public: Some(false), ..Default::default() }, true)]
    #[case(SurveyQuery { archived: Some(true), ..Default::default() }, false)]
    #[case(SurveyQuery { creator_id: Some("u2".into()), ..Default::default() }, false)]
    fn test_query_matches(#[case] query: SurveyQuery, #[case] expected: bool) {
        assert_eq!(query.matches(&survey()), expected);
    }

    #[test]
    fn test_query_time_window() {
        let query = SurveyQuery {
            time: SurveyTimeFilter {
                start_time_after: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
                start_time_before: Some(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(query.matches(&survey()));

        let mut undated = survey();
        undated.content.start_date = None;
        assert!(!query.matches(&undated));
    }
}
