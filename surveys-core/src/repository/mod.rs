//! Data access layer (Repository pattern)

pub mod alert_contact;
pub mod config;
pub mod survey;
pub mod survey_response;
pub mod transaction;

pub use alert_contact::AlertContactRepository;
pub use config::ConfigRepository;
pub use survey::SurveyRepository;
pub use survey_response::SurveyResponseRepository;
pub use transaction::{perform_transaction, SurveyTransaction, TransactionManager};
