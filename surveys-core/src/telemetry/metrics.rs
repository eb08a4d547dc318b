//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    let buckets = [
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)?
        .install_recorder()
}

/// Register metric descriptions and emit zero values so the exposition
/// carries HELP/TYPE lines from startup.
pub fn describe_metrics() {
    // HTTP
    describe_counter!("surveys_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "surveys_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "surveys_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    // Config cache
    describe_counter!(
        "surveys_config_cache_refresh_total",
        "Config cache refreshes by result"
    );
    describe_gauge!(
        "surveys_config_cache_entries",
        "Number of configs held by the cache"
    );

    // Upstreams
    describe_counter!(
        "surveys_event_access_requests_total",
        "Calendar event-person lookups by outcome"
    );

    // Surveys
    describe_counter!(
        "surveys_survey_deletes_total",
        "Survey delete attempts by result"
    );

    gauge!("surveys_http_requests_in_flight").set(0.0);
    gauge!("surveys_config_cache_entries").set(0.0);
    counter!("surveys_config_cache_refresh_total", "result" => "success").absolute(0);
    counter!("surveys_config_cache_refresh_total", "result" => "error").absolute(0);
}
