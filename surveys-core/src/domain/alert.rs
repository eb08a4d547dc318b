//! Alert contacts and survey alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Contact type that is delivered through the notifications mail API
pub const CONTACT_TYPE_EMAIL: &str = "email";

/// Where survey alerts for a key are delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AlertContact {
    pub id: String,
    pub org_id: String,
    pub app_id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub contact_type: String,
    pub address: String,
    #[sqlx(json)]
    pub params: serde_json::Value,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

/// Admin request body for alert contacts
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AlertContactInput {
    #[validate(length(min = 1, max = 128))]
    pub key: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 32))]
    pub contact_type: String,
    #[validate(length(min = 1, max = 320))]
    pub address: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A survey alert raised by a client, fanned out to every contact under `contact_key`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyAlert {
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub app_id: String,
    pub contact_key: String,
    #[serde(default)]
    pub content: serde_json::Map<String, serde_json::Value>,
}

impl SurveyAlert {
    /// Subject and body for an email contact
    pub fn email_parts(&self) -> std::result::Result<(&str, &str), &'static str> {
        let subject = self
            .content
            .get("subject")
            .and_then(|v| v.as_str())
            .ok_or("subject")?;
        let body = self
            .content
            .get("body")
            .and_then(|v| v.as_str())
            .ok_or("body")?;
        Ok((subject, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(content: serde_json::Value) -> SurveyAlert {
        SurveyAlert {
            org_id: "o1".to_string(),
            app_id: "a1".to_string(),
            contact_key: "wellness".to_string(),
            content: content.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_email_parts() {
        let a = alert(json!({"subject": "Hi", "body": "Text"}));
        assert_eq!(a.email_parts(), Ok(("Hi", "Text")));
    }

    #[test]
    fn test_email_parts_missing_body() {
        let a = alert(json!({"subject": "Hi"}));
        assert_eq!(a.email_parts(), Err("body"));
    }

    #[test]
    fn test_email_parts_non_string_subject() {
        let a = alert(json!({"subject": 3, "body": "x"}));
        assert_eq!(a.email_parts(), Err("subject"));
    }
}
