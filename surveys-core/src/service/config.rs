//! Tenant config administration
//!
//! Writes go to the store and then announce the change. Reads are served from
//! the [`ConfigCache`], which picks the write up once the announcement has
//! been processed.

use crate::cache::{ConfigCache, ConfigChangeNotifier};
use crate::domain::{Config, ConfigData, ConfigInput, ConfigRow, ALL_APPS, ALL_ORGS};
use crate::error::{AppError, Result};
use crate::jwt::Claims;
use crate::repository::ConfigRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub struct ConfigService<C: ConfigRepository, N: ConfigChangeNotifier> {
    repo: Arc<C>,
    cache: Arc<ConfigCache<C>>,
    notifier: Arc<N>,
}

impl<C: ConfigRepository, N: ConfigChangeNotifier> ConfigService<C, N> {
    pub fn new(repo: Arc<C>, cache: Arc<ConfigCache<C>>, notifier: Arc<N>) -> Self {
        Self {
            repo,
            cache,
            notifier,
        }
    }

    pub async fn create(&self, input: ConfigInput, claims: &Claims) -> Result<Config> {
        let config = self.build(input, claims, Uuid::new_v4().to_string())?;
        if !claims.can_access(&config.app_id, &config.org_id, config.system) {
            return Err(AppError::PermissionDenied(
                "Not allowed to create a config for this scope".to_string(),
            ));
        }

        self.repo.insert(&to_row(&config)).await?;
        info!(config_id = %config.id, config_type = %config.config_type, "Created config");
        self.announce().await;
        Ok(config)
    }

    /// Replace the config of the same type and scope. `id` must name that
    /// config.
    pub async fn update(&self, id: &str, input: ConfigInput, claims: &Claims) -> Result<Config> {
        let mut config = self.build(input, claims, id.to_string())?;

        let existing = self
            .repo
            .find(&config.config_type, &config.app_id, &config.org_id)
            .await?
            .filter(|row| row.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Config {} not found", id)))?;

        if existing.system && !claims.system {
            return Err(AppError::PermissionDenied(
                "Only system administrators can change system configs".to_string(),
            ));
        }
        if !claims.can_access(&config.app_id, &config.org_id, config.system) {
            return Err(AppError::PermissionDenied(
                "Not allowed to update a config for this scope".to_string(),
            ));
        }

        config.date_created = existing.date_created;
        config.date_updated = Some(Utc::now());
        self.repo.update(&to_row(&config)).await?;
        info!(config_id = %config.id, "Updated config");
        self.announce().await;
        Ok(config)
    }

    pub async fn delete(&self, id: &str, claims: &Claims) -> Result<()> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Config {} not found", id)))?;

        if !claims.can_access(&existing.app_id, &existing.org_id, existing.system) {
            return Err(AppError::PermissionDenied(
                "Not allowed to delete this config".to_string(),
            ));
        }

        self.repo.delete(id).await?;
        info!(config_id = %id, "Deleted config");
        self.announce().await;
        Ok(())
    }

    /// Cached config by id. A config outside the caller's reach is reported
    /// as missing.
    pub fn get(&self, id: &str, claims: &Claims) -> Result<Config> {
        self.cache
            .get(id)
            .filter(|c| claims.can_access(&c.app_id, &c.org_id, c.system))
            .ok_or_else(|| AppError::NotFound(format!("Config {} not found", id)))
    }

    pub fn list(&self, config_type: Option<&str>, claims: &Claims) -> Vec<Config> {
        self.cache
            .list(config_type)
            .into_iter()
            .filter(|c| claims.can_access(&c.app_id, &c.org_id, c.system))
            .collect()
    }

    fn build(&self, input: ConfigInput, claims: &Claims, id: String) -> Result<Config> {
        input.validate()?;

        let app_id = if input.all_apps.unwrap_or(false) {
            ALL_APPS.to_string()
        } else {
            claims.app_id.clone()
        };
        let org_id = if input.all_orgs.unwrap_or(false) {
            ALL_ORGS.to_string()
        } else {
            claims.org_id.clone()
        };
        let data = ConfigData::decode(&input.config_type, input.data).map_err(|e| {
            AppError::BadRequest(format!("Invalid {} config data: {}", input.config_type, e))
        })?;

        let config = Config {
            id,
            config_type: input.config_type,
            app_id,
            org_id,
            system: input.system,
            data,
            date_created: Utc::now(),
            date_updated: None,
        };
        config.validate_scope().map_err(AppError::InvalidState)?;
        Ok(config)
    }

    /// Publish failures are logged, not returned
    async fn announce(&self) {
        if let Err(e) = self.notifier.publish().await {
            warn!(error = %e, "Failed to publish config change");
        }
    }
}

fn to_row(config: &Config) -> ConfigRow {
    ConfigRow {
        id: config.id.clone(),
        config_type: config.config_type.clone(),
        app_id: config.app_id.clone(),
        org_id: config.org_id.clone(),
        system: config.system,
        data: config.data.to_value(),
        date_created: config.date_created,
        date_updated: config.date_updated,
    }
}
