//! Tenant scope and acting identity

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wildcard application scope
pub const ALL_APPS: &str = "all";
/// Wildcard organization scope
pub const ALL_ORGS: &str = "all";

/// The (org, app) pair every record and authorization decision is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub org_id: String,
    pub app_id: String,
}

impl Tenant {
    pub fn new(org_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            app_id: app_id.into(),
        }
    }
}

/// The identity acting on a request.
///
/// `external_ids` holds every external identifier the auth service knows for
/// the account, keyed by field name. Which one counts for event lookups is
/// decided per tenant by the `env` config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub account_id: String,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
}

impl Identity {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            external_ids: HashMap::new(),
        }
    }

    pub fn with_external_id(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_ids.insert(field.into(), value.into());
        self
    }

    /// External ID under `field`, empty when the account has none
    pub fn external_id(&self, field: &str) -> &str {
        self.external_ids.get(field).map(String::as_str).unwrap_or("")
    }
}
