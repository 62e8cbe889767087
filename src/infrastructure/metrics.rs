//! Prometheus metrics

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus exporter with its own HTTP listener
pub fn init_metrics(listen: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;

    describe_gauge!("ats_active_calls", "Number of calls currently occupying a line");
    describe_gauge!(
        "ats_registered_subscribers",
        "Number of currently registered subscribers"
    );
    describe_counter!("ats_calls_total", "Total number of calls placed");
    describe_counter!(
        "ats_calls_answered_total",
        "Total number of calls answered by the callee"
    );
    describe_counter!(
        "ats_commands_rejected_total",
        "Total number of commands answered with ERROR"
    );

    Ok(())
}

/// Update active calls gauge
pub fn update_active_calls(count: usize) {
    gauge!("ats_active_calls").set(count as f64);
}

/// Update registered subscribers gauge
pub fn update_registered_subscribers(count: usize) {
    gauge!("ats_registered_subscribers").set(count as f64);
}

/// Record a call being placed
pub fn record_call_placed() {
    counter!("ats_calls_total").increment(1);
}

/// Record a call being answered
pub fn record_call_answered() {
    counter!("ats_calls_answered_total").increment(1);
}

/// Record a rejected command
pub fn record_command_rejected(reason: &'static str) {
    counter!("ats_commands_rejected_total", "reason" => reason).increment(1);
}
