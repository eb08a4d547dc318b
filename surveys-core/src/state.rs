//! Application state traits for dependency injection
//!
//! Handlers are generic over [`HasServices`], so the production `AppState`
//! and the in-memory state used by the HTTP tests share one router.

use crate::cache::ConfigChangeNotifier;
use crate::jwt::JwtManager;
use crate::repository::{
    AlertContactRepository, ConfigRepository, SurveyRepository, SurveyResponseRepository,
    TransactionManager,
};
use crate::service::{
    AlertService, AnalyticsService, ConfigService, SurveyResponseService, SurveyService,
};
use crate::upstream::{EventAccessClient, Notifications};

pub trait HasServices: Clone + Send + Sync + 'static {
    type SurveyRepo: SurveyRepository + 'static;
    type ResponseRepo: SurveyResponseRepository + 'static;
    type ConfigRepo: ConfigRepository + 'static;
    type AlertContactRepo: AlertContactRepository + 'static;
    type Transactions: TransactionManager + 'static;
    type Events: EventAccessClient + 'static;
    type Mailer: Notifications + 'static;
    type Notifier: ConfigChangeNotifier + 'static;

    fn jwt_manager(&self) -> &JwtManager;

    fn survey_service(
        &self,
    ) -> &SurveyService<
        Self::SurveyRepo,
        Self::ResponseRepo,
        Self::Events,
        Self::ConfigRepo,
        Self::Transactions,
    >;

    fn survey_response_service(
        &self,
    ) -> &SurveyResponseService<Self::ResponseRepo, Self::SurveyRepo, Self::Events, Self::ConfigRepo>;

    fn config_service(&self) -> &ConfigService<Self::ConfigRepo, Self::Notifier>;

    fn alert_service(&self) -> &AlertService<Self::AlertContactRepo, Self::Mailer>;

    fn analytics_service(&self) -> &AnalyticsService<Self::ResponseRepo, Self::ConfigRepo>;

    /// Whether the backing store answers
    fn check_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}
