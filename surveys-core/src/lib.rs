//! Surveys Core - survey, response, config and alert service
//!
//! Serves tenant-scoped surveys and their responses over HTTP. Configs are
//! held in an in-memory cache kept fresh by a change notifier, and survey
//! elevation is checked against the calendar service.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod migration;
pub mod repository;
pub mod server;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod upstream;

pub use error::{AppError, Result};
