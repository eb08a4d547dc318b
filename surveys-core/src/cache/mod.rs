//! In-memory config cache
//!
//! Readers load an immutable [`ConfigSnapshot`] through an `ArcSwap` and never
//! wait on a refresh. A refresh lists every config outside any lock, decodes
//! the payloads, then publishes the new snapshot with a single pointer swap.
//! Each refresh takes a generation number before listing; a listing older than
//! the one already published is dropped instead of swapped in.
//!
//! Config writes do not touch the cache. It catches up when the change
//! notifier fires [`ConfigCache::on_upstream_change`], so reads between a
//! write and its notification see the previous value.

pub mod notifier;

pub use notifier::{
    config_change_channel, spawn_cache_refresher, ChannelConfigChangeNotifier,
    ConfigChangeNotifier, RedisConfigChangeNotifier,
};

use crate::domain::{Config, ConfigData, ConfigRow, EnvConfigData, Tenant, ALL_APPS, ALL_ORGS, CONFIG_TYPE_ENV};
use crate::error::{AppError, Result};
use crate::repository::ConfigRepository;
use arc_swap::ArcSwap;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Immutable view of the whole configs table
#[derive(Debug, Default, PartialEq)]
pub struct ConfigSnapshot {
    by_id: HashMap<String, Arc<Config>>,
    /// (type, app_id, org_id) -> config
    by_scope: HashMap<(String, String, String), Arc<Config>>,
}

impl ConfigSnapshot {
    fn build(rows: Vec<ConfigRow>) -> Self {
        let mut snapshot = Self::default();
        for row in rows {
            let raw = row.data.clone();
            let data = match ConfigData::decode(&row.config_type, raw) {
                Ok(data) => data,
                Err(err) => {
                    warn!(
                        config_id = %row.id,
                        config_type = %row.config_type,
                        error = %err,
                        "Config payload does not match its type, keeping it undecoded"
                    );
                    ConfigData::Other(err.raw)
                }
            };
            let config = Arc::new(row.into_config(data));
            snapshot.by_scope.insert(
                (
                    config.config_type.clone(),
                    config.app_id.clone(),
                    config.org_id.clone(),
                ),
                config.clone(),
            );
            snapshot.by_id.insert(config.id.clone(), config);
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

pub struct ConfigCache<R: ConfigRepository> {
    repo: Arc<R>,
    snapshot: ArcSwap<ConfigSnapshot>,
    /// Last generation handed to a refresh
    requested: AtomicU64,
    /// Generation of the stored snapshot. Held only around compare-and-store.
    published: Mutex<u64>,
}

impl<R: ConfigRepository> ConfigCache<R> {
    /// Create an empty cache. Call [`Self::refresh_all`] before serving.
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::default()),
            requested: AtomicU64::new(0),
            published: Mutex::new(0),
        }
    }

    /// Cache already holding `rows`, for tests that never refresh
    #[cfg(test)]
    pub(crate) fn with_rows(repo: Arc<R>, rows: Vec<ConfigRow>) -> Self {
        let cache = Self::new(repo);
        cache.snapshot.store(Arc::new(ConfigSnapshot::build(rows)));
        cache
    }

    /// Current snapshot. Stays valid after later refreshes.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    pub fn get(&self, id: &str) -> Option<Config> {
        self.snapshot
            .load()
            .by_id
            .get(id)
            .map(|config| config.as_ref().clone())
    }

    /// The config of `config_type` scoped exactly to (app, org)
    pub fn find(&self, config_type: &str, app_id: &str, org_id: &str) -> Option<Config> {
        self.snapshot
            .load()
            .by_scope
            .get(&(
                config_type.to_string(),
                app_id.to_string(),
                org_id.to_string(),
            ))
            .map(|config| config.as_ref().clone())
    }

    /// All configs, optionally of one type
    pub fn list(&self, config_type: Option<&str>) -> Vec<Config> {
        let snapshot = self.snapshot.load();
        let mut configs: Vec<Config> = snapshot
            .by_id
            .values()
            .filter(|c| config_type.is_none_or(|t| c.config_type == t))
            .map(|c| c.as_ref().clone())
            .collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    /// Env settings for `tenant`, falling back to wildcard scopes from most
    /// to least specific
    pub fn env_config(&self, tenant: &Tenant) -> Option<EnvConfigData> {
        let scopes = [
            (tenant.app_id.as_str(), tenant.org_id.as_str()),
            (tenant.app_id.as_str(), ALL_ORGS),
            (ALL_APPS, tenant.org_id.as_str()),
            (ALL_APPS, ALL_ORGS),
        ];
        let snapshot = self.snapshot.load();
        scopes.iter().find_map(|(app_id, org_id)| {
            snapshot
                .by_scope
                .get(&(
                    CONFIG_TYPE_ENV.to_string(),
                    app_id.to_string(),
                    org_id.to_string(),
                ))
                .and_then(|config| config.env_data().cloned())
        })
    }

    /// Re-read every config and replace the snapshot.
    ///
    /// On failure the previous snapshot stays in place and the error is
    /// returned. A refresh overtaken by a later one returns `Ok` without
    /// replacing the newer snapshot.
    pub async fn refresh_all(&self) -> Result<()> {
        let generation = self.requested.fetch_add(1, Ordering::SeqCst) + 1;

        let rows = match self.repo.list().await {
            Ok(rows) => rows,
            Err(err) => {
                counter!("surveys_config_cache_refresh_total", "result" => "error").increment(1);
                return Err(err);
            }
        };

        let snapshot = ConfigSnapshot::build(rows);
        let entries = snapshot.len();
        {
            let mut published = self.published.lock().map_err(|_| {
                AppError::Internal(anyhow::anyhow!("config cache generation lock poisoned"))
            })?;
            if *published > generation {
                counter!("surveys_config_cache_refresh_total", "result" => "stale").increment(1);
                debug!(generation, published = *published, "Dropped stale config listing");
                return Ok(());
            }
            *published = generation;
            self.snapshot.store(Arc::new(snapshot));
        }

        counter!("surveys_config_cache_refresh_total", "result" => "success").increment(1);
        gauge!("surveys_config_cache_entries").set(entries as f64);
        debug!(entries, "Config cache refreshed");
        Ok(())
    }

    /// Change-notification callback
    pub async fn on_upstream_change(&self) {
        if let Err(err) = self.refresh_all().await {
            warn!(error = %err, "Config cache refresh failed, serving last snapshot");
        }
    }
}
