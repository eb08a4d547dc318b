//! Business logic layer

pub mod alert;
pub mod analytics;
pub mod authorization;
pub mod config;
pub mod survey;
pub mod survey_response;

pub use alert::AlertService;
pub use analytics::{AnalyticsQuery, AnalyticsService};
pub use authorization::AuthorizationResolver;
pub use config::ConfigService;
pub use survey::SurveyService;
pub use survey_response::{ResponseFilter, SurveyResponseService};
