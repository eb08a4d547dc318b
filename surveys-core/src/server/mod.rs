//! Server initialization and routing

use crate::api;
use crate::cache::{
    config_change_channel, spawn_cache_refresher, ConfigCache, RedisConfigChangeNotifier,
};
use crate::config::Config;
use crate::jwt::JwtManager;
use crate::middleware::ObservabilityLayer;
use crate::repository::{
    alert_contact::AlertContactRepositoryImpl, config::ConfigRepositoryImpl,
    survey::SurveyRepositoryImpl, survey_response::SurveyResponseRepositoryImpl,
    transaction::MySqlTransactionManager,
};
use crate::service::{
    AlertService, AnalyticsService, AuthorizationResolver, ConfigService, SurveyResponseService,
    SurveyService,
};
use crate::state::HasServices;
use crate::upstream::{CalendarClient, NotificationsClient, ServiceAccountTokens};
use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Upper bound on handling one request, upstream calls included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: MySqlPool,
    pub jwt_manager: JwtManager,
    pub survey_service: Arc<
        SurveyService<
            SurveyRepositoryImpl,
            SurveyResponseRepositoryImpl,
            CalendarClient,
            ConfigRepositoryImpl,
            MySqlTransactionManager,
        >,
    >,
    pub survey_response_service: Arc<
        SurveyResponseService<
            SurveyResponseRepositoryImpl,
            SurveyRepositoryImpl,
            CalendarClient,
            ConfigRepositoryImpl,
        >,
    >,
    pub config_service: Arc<ConfigService<ConfigRepositoryImpl, RedisConfigChangeNotifier>>,
    pub alert_service: Arc<AlertService<AlertContactRepositoryImpl, NotificationsClient>>,
    pub analytics_service: Arc<AnalyticsService<SurveyResponseRepositoryImpl, ConfigRepositoryImpl>>,
}

impl HasServices for AppState {
    type SurveyRepo = SurveyRepositoryImpl;
    type ResponseRepo = SurveyResponseRepositoryImpl;
    type ConfigRepo = ConfigRepositoryImpl;
    type AlertContactRepo = AlertContactRepositoryImpl;
    type Transactions = MySqlTransactionManager;
    type Events = CalendarClient;
    type Mailer = NotificationsClient;
    type Notifier = RedisConfigChangeNotifier;

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    fn survey_service(
        &self,
    ) -> &SurveyService<
        SurveyRepositoryImpl,
        SurveyResponseRepositoryImpl,
        CalendarClient,
        ConfigRepositoryImpl,
        MySqlTransactionManager,
    > {
        &self.survey_service
    }

    fn survey_response_service(
        &self,
    ) -> &SurveyResponseService<
        SurveyResponseRepositoryImpl,
        SurveyRepositoryImpl,
        CalendarClient,
        ConfigRepositoryImpl,
    > {
        &self.survey_response_service
    }

    fn config_service(&self) -> &ConfigService<ConfigRepositoryImpl, RedisConfigChangeNotifier> {
        &self.config_service
    }

    fn alert_service(&self) -> &AlertService<AlertContactRepositoryImpl, NotificationsClient> {
        &self.alert_service
    }

    fn analytics_service(
        &self,
    ) -> &AnalyticsService<SurveyResponseRepositoryImpl, ConfigRepositoryImpl> {
        &self.analytics_service
    }

    async fn check_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.db_pool).await.is_ok()
    }
}

/// Start the service and block until shutdown
pub async fn run(config: Config, prometheus_handle: Option<PrometheusHandle>) -> Result<()> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    let survey_repo = Arc::new(SurveyRepositoryImpl::new(db_pool.clone()));
    let response_repo = Arc::new(SurveyResponseRepositoryImpl::new(db_pool.clone()));
    let config_repo = Arc::new(ConfigRepositoryImpl::new(db_pool.clone()));
    let alert_contact_repo = Arc::new(AlertContactRepositoryImpl::new(db_pool.clone()));
    let transactions = Arc::new(MySqlTransactionManager::new(db_pool.clone()));

    // The cache must hold a full snapshot before the first request
    let config_cache = Arc::new(ConfigCache::new(config_repo.clone()));
    config_cache
        .refresh_all()
        .await
        .context("Failed to load configs")?;
    info!(entries = config_cache.snapshot().len(), "Config cache loaded");

    let (local_notifier, change_rx) = config_change_channel();
    let refresher = spawn_cache_refresher(config_cache.clone(), change_rx);
    let subscriber = RedisConfigChangeNotifier::subscribe(&config.redis, local_notifier)
        .await
        .context("Failed to subscribe to config changes")?;
    let notifier = Arc::new(
        RedisConfigChangeNotifier::new(&config.redis)
            .await
            .context("Failed to connect to Redis")?,
    );

    let tokens = ServiceAccountTokens::new(
        config.service_account.clone(),
        crate::upstream::build_http_client(config.calendar.timeout())?,
    );
    let calendar = Arc::new(CalendarClient::new(&config.calendar, tokens.clone())?);
    let mailer = Arc::new(NotificationsClient::new(&config.notifications, tokens)?);

    let authorization = Arc::new(AuthorizationResolver::new(calendar, config_cache.clone()));

    let state = AppState {
        db_pool: db_pool.clone(),
        jwt_manager: JwtManager::new(config.jwt.clone())?,
        survey_service: Arc::new(SurveyService::new(
            survey_repo.clone(),
            response_repo.clone(),
            authorization.clone(),
            transactions,
            config.fanout_timeout(),
        )),
        survey_response_service: Arc::new(SurveyResponseService::new(
            response_repo.clone(),
            survey_repo,
            authorization,
        )),
        config_service: Arc::new(ConfigService::new(
            config_repo,
            config_cache.clone(),
            notifier,
        )),
        alert_service: Arc::new(AlertService::new(alert_contact_repo, mailer)),
        analytics_service: Arc::new(AnalyticsService::new(response_repo, config_cache)),
    };

    let metrics_router = Router::new()
        .route("/metrics", get(api::metrics::metrics_handler))
        .with_state(Arc::new(prometheus_handle));
    let app = build_router(state).merge(metrics_router);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;
    info!("HTTP server started on {}", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the subscription closes the change channel, which ends the refresher
    subscriber.abort();
    if let Err(e) = refresher.await {
        warn!(error = %e, "Config cache refresher ended abnormally");
    }
    db_pool.close().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Build the HTTP router.
///
/// Generic over [`HasServices`] so tests can drive it with in-memory state.
pub fn build_router<S: HasServices>(state: S) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready::<S>))
        .route("/version", get(api::health::version))
        // Client surveys
        .route(
            "/api/surveys",
            get(api::survey::list::<S>).post(api::survey::create::<S>),
        )
        .route(
            "/api/surveys/{id}",
            get(api::survey::get::<S>)
                .put(api::survey::update::<S>)
                .delete(api::survey::delete::<S>),
        )
        .route(
            "/api/surveys/{id}/responses",
            get(api::survey_response::list_for_survey::<S>),
        )
        .route("/api/creator/surveys", get(api::survey::list_created::<S>))
        .route("/api/user-data", get(api::survey::user_data::<S>))
        // Client survey responses
        .route(
            "/api/survey-responses",
            get(api::survey_response::list::<S>)
                .post(api::survey_response::create::<S>)
                .delete(api::survey_response::delete_many::<S>),
        )
        .route(
            "/api/survey-responses/{id}",
            get(api::survey_response::get::<S>)
                .put(api::survey_response::update::<S>)
                .delete(api::survey_response::delete::<S>),
        )
        .route("/api/survey-alerts", axum::routing::post(api::alert::raise::<S>))
        // Admin configs
        .route(
            "/api/admin/configs",
            get(api::config::list::<S>).post(api::config::create::<S>),
        )
        .route(
            "/api/admin/configs/{id}",
            get(api::config::get::<S>)
                .put(api::config::update::<S>)
                .delete(api::config::delete::<S>),
        )
        // Admin surveys
        .route(
            "/api/admin/surveys",
            get(api::survey::admin_list::<S>).post(api::survey::admin_create::<S>),
        )
        .route(
            "/api/admin/surveys/{id}",
            get(api::survey::admin_get::<S>)
                .put(api::survey::admin_update::<S>)
                .delete(api::survey::admin_delete::<S>),
        )
        .route(
            "/api/admin/surveys/{id}/responses",
            get(api::survey_response::admin_list_for_survey::<S>),
        )
        // Admin alert contacts
        .route(
            "/api/admin/alert-contacts",
            get(api::alert::list_contacts::<S>).post(api::alert::create_contact::<S>),
        )
        .route(
            "/api/admin/alert-contacts/{id}",
            get(api::alert::get_contact::<S>)
                .put(api::alert::update_contact::<S>)
                .delete(api::alert::delete_contact::<S>),
        )
        // Analytics
        .route(
            "/api/analytics/survey-responses",
            get(api::analytics::anonymous_responses::<S>),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(ObservabilityLayer)
        .layer(cors)
        .with_state(state)
}
