use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!("http_requests_total", "HTTP responses by route, method and status");
    metrics::describe_histogram!("http_request_duration_seconds", "HTTP latency by route");
    metrics::describe_counter!("submissions_total", "Accepted exam attempts by exam kind");
    metrics::describe_counter!("grading_jobs_total", "Grading runs by outcome");
    metrics::describe_histogram!("grading_duration_seconds", "Wall time of one grading run");
    metrics::describe_counter!("code_runs_total", "Sandbox runs requested through the API");
    metrics::describe_counter!("exams_closed_total", "Exams closed after their end time");
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
