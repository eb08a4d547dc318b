//! Domain models for the survey service

pub mod alert;
pub mod common;
pub mod config;
pub mod event;
pub mod survey;
pub mod survey_response;

pub use alert::*;
pub use common::*;
pub use config::*;
pub use event::*;
pub use survey::*;
pub use survey_response::*;
