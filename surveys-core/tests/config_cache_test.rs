//! Config cache consistency: snapshots, staleness and the refresh path

mod common;

use common::{claims, config_row, RecordingNotifier, TestConfigRepository};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use surveys_core::cache::{config_change_channel, spawn_cache_refresher, ConfigCache};
use surveys_core::domain::{ConfigData, ConfigInput, EnvConfigData, Tenant, ALL_APPS, ALL_ORGS};
use surveys_core::jwt::PERMISSION_SURVEYS_ADMIN;
use surveys_core::repository::ConfigRepository;
use surveys_core::service::ConfigService;

fn feature_input(enabled: bool) -> ConfigInput {
    ConfigInput {
        config_type: "features".to_string(),
        all_apps: None,
        all_orgs: None,
        system: false,
        data: json!({ "enabled": enabled }),
    }
}

#[tokio::test]
async fn test_refresh_all_is_idempotent() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![
        config_row("c1", "env", "a1", "o1", false, json!({"external_id": "uin"})),
        config_row("c2", "features", "a1", "o1", false, json!({"beta": true})),
    ]));
    let cache = ConfigCache::new(repo);

    cache.refresh_all().await.unwrap();
    let first = cache.snapshot();
    cache.refresh_all().await.unwrap();
    let second = cache.snapshot();

    assert_eq!(*first, *second);
    assert_eq!(second.len(), 2);
}

#[tokio::test]
async fn test_write_is_invisible_until_change_is_processed() {
    let repo = Arc::new(TestConfigRepository::new());
    let cache = Arc::new(ConfigCache::new(repo.clone()));
    cache.refresh_all().await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ConfigService::new(repo.clone(), cache.clone(), notifier.clone());
    let admin = claims("admin", &[PERMISSION_SURVEYS_ADMIN]);

    let created = service.create(feature_input(true), &admin).await.unwrap();
    assert_eq!(notifier.publishes(), 1);
    assert!(cache.get(&created.id).is_none());

    cache.on_upstream_change().await;
    assert_eq!(
        cache.get(&created.id).map(|c| c.data),
        Some(ConfigData::Other(json!({"enabled": true})))
    );

    service
        .update(&created.id, feature_input(false), &admin)
        .await
        .unwrap();
    assert_eq!(
        cache.get(&created.id).map(|c| c.data),
        Some(ConfigData::Other(json!({"enabled": true})))
    );

    cache.on_upstream_change().await;
    assert_eq!(
        cache.get(&created.id).map(|c| c.data),
        Some(ConfigData::Other(json!({"enabled": false})))
    );
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![config_row(
        "c1",
        "features",
        "a1",
        "o1",
        false,
        json!({}),
    )]));
    let cache = ConfigCache::new(repo.clone());
    cache.refresh_all().await.unwrap();

    repo.set_fail_list(true);
    assert!(cache.refresh_all().await.is_err());
    cache.on_upstream_change().await;

    assert!(cache.get("c1").is_some());
    assert_eq!(cache.snapshot().len(), 1);
}

#[tokio::test]
async fn test_snapshot_held_by_reader_survives_refresh() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![config_row(
        "c1",
        "features",
        "a1",
        "o1",
        false,
        json!({}),
    )]));
    let cache = ConfigCache::new(repo.clone());
    cache.refresh_all().await.unwrap();
    let held = cache.snapshot();

    repo.delete("c1").await.unwrap();
    cache.refresh_all().await.unwrap();

    assert_eq!(held.len(), 1);
    assert!(cache.snapshot().is_empty());
}

#[tokio::test]
async fn test_overtaken_refresh_does_not_overwrite_newer_snapshot() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![config_row(
        "c1",
        "features",
        "a1",
        "o1",
        false,
        json!({"v": 1}),
    )]));
    let cache = Arc::new(ConfigCache::new(repo.clone()));

    let hold = repo.hold_next_list();
    let slow = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh_all().await }
    });
    hold.entered.notified().await;

    // Readers are not blocked while the slow listing is in flight
    assert!(cache.get("c1").is_none());

    repo.update(&config_row("c1", "features", "a1", "o1", false, json!({"v": 2})))
        .await
        .unwrap();
    cache.refresh_all().await.unwrap();
    assert_eq!(cache.get("c1").unwrap().data.to_value(), json!({"v": 2}));

    hold.release.notify_one();
    slow.await.unwrap().unwrap();
    assert_eq!(cache.get("c1").unwrap().data.to_value(), json!({"v": 2}));
}

#[tokio::test]
async fn test_env_config_falls_back_to_wildcard_scopes() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![
        config_row("c1", "env", ALL_APPS, ALL_ORGS, true, json!({"external_id": "global"})),
        config_row("c2", "env", "a1", ALL_ORGS, true, json!({"external_id": "app"})),
        config_row("c3", "env", "a1", "o1", false, json!({"external_id": "exact"})),
    ]));
    let cache = ConfigCache::new(repo);
    cache.refresh_all().await.unwrap();

    let external_id = |org: &str, app: &str| {
        cache
            .env_config(&Tenant::new(org, app))
            .map(|env: EnvConfigData| env.external_id)
    };
    assert_eq!(external_id("o1", "a1").as_deref(), Some("exact"));
    assert_eq!(external_id("o2", "a1").as_deref(), Some("app"));
    assert_eq!(external_id("o2", "a2").as_deref(), Some("global"));
}

#[tokio::test]
async fn test_malformed_env_payload_is_kept_raw() {
    let repo = Arc::new(TestConfigRepository::with_rows(vec![config_row(
        "c1",
        "env",
        "a1",
        "o1",
        false,
        json!({"external_id": 42}),
    )]));
    let cache = ConfigCache::new(repo);
    cache.refresh_all().await.unwrap();

    assert_eq!(
        cache.get("c1").map(|c| c.data),
        Some(ConfigData::Other(json!({"external_id": 42})))
    );
    assert!(cache.env_config(&Tenant::new("o1", "a1")).is_none());
}

#[tokio::test]
async fn test_channel_refresher_catches_up_eventually() {
    let repo = Arc::new(TestConfigRepository::new());
    let cache = Arc::new(ConfigCache::new(repo.clone()));
    cache.refresh_all().await.unwrap();

    let (notifier, rx) = config_change_channel();
    let refresher = spawn_cache_refresher(cache.clone(), rx);
    let service = ConfigService::new(repo, cache.clone(), Arc::new(notifier));
    let admin = claims("admin", &[PERMISSION_SURVEYS_ADMIN]);

    let created = service.create(feature_input(true), &admin).await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(2), async {
        while cache.get(&created.id).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(seen.is_ok(), "cache never picked up the new config");

    // Dropping the service drops the last sender, which stops the refresher
    drop(service);
    tokio::time::timeout(Duration::from_secs(2), refresher)
        .await
        .expect("refresher did not stop")
        .unwrap();
}
