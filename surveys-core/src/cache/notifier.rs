//! Config change notification
//!
//! Config writes call [`ConfigChangeNotifier::publish`]. Every instance feeds
//! the notifications it receives into a single-consumer channel drained by
//! [`spawn_cache_refresher`], which refreshes the local [`ConfigCache`].

use super::ConfigCache;
use crate::config::RedisConfig;
use crate::error::{AppError, Result};
use crate::repository::ConfigRepository;
use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Announces that the configs table changed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigChangeNotifier: Send + Sync {
    async fn publish(&self) -> Result<()>;
}

/// In-process notifier. Holds at most one pending signal, so a burst of
/// writes collapses into one refresh.
#[derive(Clone)]
pub struct ChannelConfigChangeNotifier {
    tx: mpsc::Sender<()>,
}

/// Create a local notifier and the receiver to hand to [`spawn_cache_refresher`]
pub fn config_change_channel() -> (ChannelConfigChangeNotifier, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ChannelConfigChangeNotifier { tx }, rx)
}

impl ChannelConfigChangeNotifier {
    fn signal(&self) -> Result<()> {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(AppError::Internal(
                anyhow::anyhow!("config refresher has stopped"),
            )),
        }
    }
}

#[async_trait]
impl ConfigChangeNotifier for ChannelConfigChangeNotifier {
    async fn publish(&self) -> Result<()> {
        self.signal()
    }
}

/// Cross-instance notifier over Redis pub/sub
#[derive(Clone)]
pub struct RedisConfigChangeNotifier {
    conn: ConnectionManager,
    channel: String,
}

impl RedisConfigChangeNotifier {
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to connect to Redis: {}", e))
        })?;

        Ok(Self {
            conn,
            channel: config.config_channel.clone(),
        })
    }

    /// Forward every message on the config channel into `local`.
    ///
    /// The task ends when the subscription drops or `local` closes.
    pub async fn subscribe(
        config: &RedisConfig,
        local: ChannelConfigChangeNotifier,
    ) -> Result<JoinHandle<()>> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create Redis client: {}", e))
        })?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&config.config_channel).await?;
        info!(channel = %config.config_channel, "Subscribed to config changes");

        Ok(tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while messages.next().await.is_some() {
                if local.signal().is_err() {
                    break;
                }
            }
            warn!("Config change subscription ended");
        }))
    }
}

#[async_trait]
impl ConfigChangeNotifier for RedisConfigChangeNotifier {
    async fn publish(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(&self.channel, "changed").await?;
        Ok(())
    }
}

/// Drain change signals and refresh `cache` once per batch. Stops when every
/// sender is dropped.
pub fn spawn_cache_refresher<R>(
    cache: Arc<ConfigCache<R>>,
    mut rx: mpsc::Receiver<()>,
) -> JoinHandle<()>
where
    R: ConfigRepository + 'static,
{
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            while rx.try_recv().is_ok() {}
            cache.on_upstream_change().await;
        }
    })
}
