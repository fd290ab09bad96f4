//! Per-driver metrics
//!
//! Two sinks: a snapshot struct callers can poll (`DriverMetrics`) and the
//! process-wide `metrics` registry using the exported Prometheus names.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

/// Cumulative driver statistics since construction
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriverMetrics {
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub timeouts: u64,
    /// Mean latency over all commands, milliseconds
    pub average_latency_ms: f64,
    pub average_success_latency_ms: f64,
    pub average_error_latency_ms: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connection_attempts: u64,
    pub connections: u64,
    pub queue_depth: usize,
    pub max_queue_depth_observed: usize,
    pub watchdog_triggers: u64,
    pub reconnect_attempts: u64,
    pub reconnect_successes: u64,
    pub reconnect_failures: u64,
    pub last_reconnect_duration_seconds: Option<f64>,
    pub total_reconnect_duration_seconds: f64,
    pub last_command: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub firmware_version: Option<String>,
    pub adapter_voltage: Option<f64>,
    pub protocol_used: Option<String>,
    #[serde(skip)]
    total_latency_ms: f64,
    #[serde(skip)]
    success_latency_ms: f64,
    #[serde(skip)]
    error_latency_ms: f64,
}

impl DriverMetrics {
    pub(crate) fn record_success(&mut self, command: &str, duration_ms: u64) {
        self.total_commands += 1;
        self.successful_commands += 1;
        self.total_latency_ms += duration_ms as f64;
        self.success_latency_ms += duration_ms as f64;
        self.recompute_averages();
        self.last_command = Some(command.to_string());
        self.last_duration_ms = Some(duration_ms);
        self.last_updated_at = Some(Utc::now());
        histogram!("obd_command_duration_seconds", "command" => command.to_string())
            .record(duration_ms as f64 / 1_000.0);
    }

    pub(crate) fn record_failure(
        &mut self,
        command: &str,
        duration_ms: u64,
        code: &'static str,
        timed_out: bool,
    ) {
        self.total_commands += 1;
        self.failed_commands += 1;
        if timed_out {
            self.timeouts += 1;
        }
        self.total_latency_ms += duration_ms as f64;
        self.error_latency_ms += duration_ms as f64;
        self.recompute_averages();
        self.last_command = Some(command.to_string());
        self.last_duration_ms = Some(duration_ms);
        self.last_error = Some(code.to_string());
        self.last_updated_at = Some(Utc::now());
        counter!("obd_errors_total", "type" => code).increment(1);
        histogram!("obd_command_duration_seconds", "command" => command.to_string())
            .record(duration_ms as f64 / 1_000.0);
    }

    pub(crate) fn record_connection(&mut self) {
        self.connections += 1;
        counter!("obd_connections_total").increment(1);
    }

    pub(crate) fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
    }

    pub(crate) fn record_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth;
        gauge!("obd_queue_depth").set(depth as f64);
        if depth > self.max_queue_depth_observed {
            self.max_queue_depth_observed = depth;
            gauge!("obd_queue_depth_max_observed").set(depth as f64);
        }
    }

    pub(crate) fn record_watchdog_trigger(&mut self) {
        self.watchdog_triggers += 1;
        counter!("ble_watchdog_triggers_total").increment(1);
    }

    pub(crate) fn record_reconnect_attempt(&mut self) {
        self.reconnect_attempts += 1;
        counter!("ble_reconnect_attempts_total").increment(1);
    }

    pub(crate) fn record_reconnect_failure(&mut self) {
        self.reconnect_failures += 1;
        counter!("ble_reconnect_failed_total").increment(1);
    }

    pub(crate) fn record_reconnect_success(&mut self, duration_seconds: f64) {
        self.reconnect_successes += 1;
        self.last_reconnect_duration_seconds = Some(duration_seconds);
        self.total_reconnect_duration_seconds += duration_seconds;
        counter!("ble_reconnect_success_total").increment(1);
        histogram!("ble_reconnect_duration_seconds").record(duration_seconds);
        gauge!("obd_reconnect_last_duration_seconds").set(duration_seconds);
    }

    pub(crate) fn record_io(&mut self, sent: usize, received: usize) {
        self.bytes_sent += sent as u64;
        self.bytes_received += received as u64;
    }

    fn recompute_averages(&mut self) {
        if self.total_commands > 0 {
            self.average_latency_ms = self.total_latency_ms / self.total_commands as f64;
        }
        if self.successful_commands > 0 {
            self.average_success_latency_ms =
                self.success_latency_ms / self.successful_commands as f64;
        }
        if self.failed_commands > 0 {
            self.average_error_latency_ms = self.error_latency_ms / self.failed_commands as f64;
        }
    }
}
