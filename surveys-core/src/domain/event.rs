//! Calendar event attendance records, as returned by the calendar service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role granted to event administrators
pub const EVENT_ROLE_ADMIN: &str = "admin";

/// Candidate identity sent to the calendar service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUser {
    pub account_id: String,
    #[serde(default)]
    pub external_id: String,
}

/// Optional filters applied by the calendar service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPersonFilter {
    pub registered: Option<bool>,
    pub role: Option<String>,
    pub attended: Option<bool>,
}

impl EventPersonFilter {
    pub fn admins() -> Self {
        Self {
            role: Some(EVENT_ROLE_ADMIN.to_string()),
            ..Default::default()
        }
    }

    pub fn attendees() -> Self {
        Self {
            registered: Some(true),
            attended: Some(true),
            ..Default::default()
        }
    }
}

/// Role and attendance facts for one identity on one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPerson {
    pub user: EventUser,
    #[serde(default)]
    pub registered: bool,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub registration_type: String,
    #[serde(default)]
    pub attended: bool,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl EventPerson {
    /// Matches on account ID, or on a non-empty external ID
    pub fn is_identity(&self, account_id: &str, external_id: &str) -> bool {
        self.user.account_id == account_id
            || (!external_id.is_empty() && self.user.external_id == external_id)
    }
}
