//! Telemetry initialization: metrics, tracing, and structured logging

pub mod metrics;
pub mod tracing_setup;

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the full telemetry stack.
///
/// Returns `Some(PrometheusHandle)` when metrics are enabled and the recorder
/// installed, so the HTTP server can expose `/metrics`.
pub fn init(config: &TelemetryConfig) -> Option<PrometheusHandle> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "surveys_core=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // The OpenTelemetry layer's subscriber type must match the composed
    // registry, so each format builds the whole stack.
    if config.log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true);
        let otel_layer = tracing_setup::create_otel_layer(config);
        registry.with(fmt_layer).with(otel_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let otel_layer = tracing_setup::create_otel_layer(config);
        registry.with(fmt_layer).with(otel_layer).init();
    }

    if !config.metrics_enabled {
        return None;
    }
    match metrics::install_prometheus_recorder() {
        Ok(handle) => {
            metrics::describe_metrics();
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
            None
        }
    }
}

/// Flush pending spans before exit
pub fn shutdown() {
    if let Some(provider) = tracing_setup::PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("WARN: Failed to shut down tracer provider: {}", e);
        }
    }
}
