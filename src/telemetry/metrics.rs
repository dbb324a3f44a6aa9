//! Prometheus metrics setup and metric definitions

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Register metric descriptions and emit initial zero values so the
/// exposition includes HELP/TYPE lines before the first batch.
pub fn describe_metrics() {
    describe_counter!(
        "mailcore_commands_total",
        "Commands dispatched, by command name and result status"
    );
    describe_counter!(
        "mailcore_mail_sends_total",
        "Mail send attempts by outcome (delivered/rejected/transport_error)"
    );
    describe_counter!(
        "mailcore_config_reloads_total",
        "Configuration change notifications by result (replaced/unchanged/invalid)"
    );
    describe_counter!(
        "mailcore_transport_builds_total",
        "SMTP transports built for a new settings snapshot"
    );

    counter!("mailcore_mail_sends_total", "outcome" => "delivered").absolute(0);
    counter!("mailcore_config_reloads_total", "result" => "replaced").absolute(0);
    counter!("mailcore_transport_builds_total").absolute(0);
}
