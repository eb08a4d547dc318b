//! Tenant configuration records
//!
//! `Config.data` is decoded once, when the cache builds a snapshot. Read sites
//! match on [`ConfigData`] instead of re-parsing JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::common::ALL_ORGS;

/// Config type holding per-tenant environment settings
pub const CONFIG_TYPE_ENV: &str = "env";

/// Stored configuration record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub id: String,
    #[serde(rename = "type")]
    pub config_type: String,
    pub app_id: String,
    pub org_id: String,
    pub system: bool,
    pub data: ConfigData,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl Config {
    /// A config scoped to every organization must be a system config
    pub fn validate_scope(&self) -> std::result::Result<(), String> {
        if self.org_id == ALL_ORGS && !self.system {
            return Err(format!(
                "config {} targets all organizations but is not a system config",
                self.config_type
            ));
        }
        Ok(())
    }

    pub fn env_data(&self) -> Option<&EnvConfigData> {
        match &self.data {
            ConfigData::Env(env) => Some(env),
            ConfigData::Other(_) => None,
        }
    }
}

/// Typed config payload, keyed by `Config.config_type`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigData {
    Env(EnvConfigData),
    Other(serde_json::Value),
}

impl ConfigData {
    /// Decode a raw payload for the given config type
    pub fn decode(config_type: &str, raw: serde_json::Value) -> Result<Self, DecodeError> {
        match config_type {
            CONFIG_TYPE_ENV => serde_json::from_value::<EnvConfigData>(raw.clone())
                .map(ConfigData::Env)
                .map_err(|source| DecodeError { raw, source }),
            _ => Ok(ConfigData::Other(raw)),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ConfigData::Env(env) => serde_json::to_value(env).unwrap_or_default(),
            ConfigData::Other(value) => value.clone(),
        }
    }
}

/// Payload that did not match the shape its type requires. Carries the raw
/// value so the caller can fall back to [`ConfigData::Other`].
#[derive(Debug)]
pub struct DecodeError {
    pub raw: serde_json::Value,
    pub source: serde_json::Error,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// Environment settings for a tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfigData {
    /// Name of the external identifier field used to match accounts against
    /// calendar event records
    #[serde(default)]
    pub external_id: String,
    /// Base64 SHA-256 digest of the analytics bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_token_hash: Option<String>,
}

/// Config row from the database
#[derive(Debug, Clone, FromRow)]
pub struct ConfigRow {
    pub id: String,
    pub config_type: String,
    pub app_id: String,
    pub org_id: String,
    pub system: bool,
    #[sqlx(json)]
    pub data: serde_json::Value,
    pub date_created: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
}

impl ConfigRow {
    /// Build the domain record with an already-decoded payload
    pub fn into_config(self, data: ConfigData) -> Config {
        Config {
            id: self.id,
            config_type: self.config_type,
            app_id: self.app_id,
            org_id: self.org_id,
            system: self.system,
            data,
            date_created: self.date_created,
            date_updated: self.date_updated,
        }
    }
}

/// Admin request body for creating or updating a config
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfigInput {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    pub config_type: String,
    #[serde(default)]
    pub all_apps: Option<bool>,
    #[serde(default)]
    pub all_orgs: Option<bool>,
    #[serde(default)]
    pub system: bool,
    pub data: serde_json::Value,
}
