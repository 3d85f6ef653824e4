use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

pub(crate) const BLUEPRINTS_GENERATED: &str = "exam_blueprints_generated_total";
pub(crate) const SESSIONS_STARTED: &str = "attempt_sessions_started_total";
pub(crate) const INTEGRITY_VIOLATIONS: &str = "integrity_violations_total";
pub(crate) const SUBMISSIONS_CREATED: &str = "submissions_created_total";
pub(crate) const AUTOSAVE_FAILURES: &str = "autosave_failures_total";
pub(crate) const ASSIGNMENTS_AUTO_CLOSED: &str = "assignments_auto_closed_total";

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    if PROM_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus recorder was installed concurrently");
    }
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!(BLUEPRINTS_GENERATED, "Exams generated from a selection matrix");
    describe_counter!(SESSIONS_STARTED, "Attempt sessions opened or resumed");
    describe_counter!(INTEGRITY_VIOLATIONS, "Focus or visibility violations recorded");
    describe_counter!(SUBMISSIONS_CREATED, "Submissions appended, labelled by mode");
    describe_counter!(AUTOSAVE_FAILURES, "Write-through saves that failed");
    describe_counter!(ASSIGNMENTS_AUTO_CLOSED, "Assignments closed after their window ended");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency by status"
    );
}
