//! End-to-end drive-cycle tests against a scripted ELM327 adapter
//!
//! These tests run the full stack: connect/init sequence, PID and DTC
//! reads through the codec, live-data sampling, self-check, watchdog
//! recovery and the exported Prometheus metric names.
//!
//! Run with: cargo test -p obd-tests --test e2e_test

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use obd_core::{DriverEvent, DriverState, DtcSeverity, ObdError};
use obd_driver::config::{DriverConfig, RetryConfig, ScriptedConfig};
use obd_driver::transport::ScriptedTransport;
use obd_driver::{Elm327Driver, LinkSupervisor, RetryPolicy};
use obd_selfcheck::{run_self_check, SelfCheckOptions, SelfCheckOutcome};
use pretty_assertions::assert_eq;

fn fast_config() -> DriverConfig {
    DriverConfig {
        reset_settle_ms: 0,
        command_timeout_ms: 500,
        init_timeout_ms: 500,
        read_dtc_timeout_ms: 500,
        clear_dtc_timeout_ms: 500,
        live_data_timeout_ms: 500,
        retry: RetryConfig {
            connect: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 50,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
            },
            init: RetryPolicy::none(),
            operation: RetryPolicy::none(),
        },
        ..DriverConfig::default()
    }
}

async fn connected_driver() -> (Arc<ScriptedTransport>, Arc<Elm327Driver>) {
    let transport = Arc::new(ScriptedTransport::new(&ScriptedConfig::default()));
    let driver = Arc::new(Elm327Driver::with_transport(
        transport.clone(),
        fast_config(),
    ));
    driver.connect().await.unwrap();
    (transport, driver)
}

#[tokio::test]
async fn pid_read_yields_decoded_reading_and_one_success() {
    let (_, driver) = connected_driver().await;
    let before = driver.metrics().successful_commands;

    let reading = driver.read_pid("0C").await.unwrap();
    assert_eq!(reading.pid, "0C");
    assert_eq!(reading.name, "Engine RPM");
    assert_eq!(reading.value, 1726.0);
    assert_eq!(reading.unit.as_deref(), Some("rpm"));

    let metrics = driver.metrics();
    assert_eq!(metrics.successful_commands, before + 1);
    assert_eq!(metrics.failed_commands, 0);
    assert_eq!(metrics.last_command.as_deref(), Some("010C"));
}

#[tokio::test]
async fn full_drive_cycle() {
    let (_, driver) = connected_driver().await;

    let status = driver.read_status().await.unwrap();
    assert!(!status.mil_on);
    assert_eq!(status.dtc_count, 0);
    assert!(status.spark_ignition);

    let dtcs = driver.read_dtc().await.unwrap();
    let codes: Vec<&str> = dtcs.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["P0044", "P0133"]);
    // Known codes come from the catalog, unknown ones get a category
    // fallback
    let p0133 = dtcs.iter().find(|d| d.code == "P0133").unwrap();
    assert_eq!(
        p0133.description.as_deref(),
        Some("O2 sensor slow response (bank 1, sensor 1)")
    );
    assert_eq!(p0133.severity, Some(DtcSeverity::Medium));
    let p0044 = dtcs.iter().find(|d| d.code == "P0044").unwrap();
    assert_eq!(p0044.description.as_deref(), Some("Powertrain fault P0044"));

    let live = driver.read_live_data().await.unwrap();
    assert_eq!(live.rpm, Some(1726.0));
    assert_eq!(live.coolant_temp, Some(60.0));
    assert_eq!(live.vehicle_speed, Some(80.0));
    assert_eq!(live.throttle_position, Some(20.0));

    driver.clear_dtc().await.unwrap();

    let snapshot = driver.snapshot();
    assert_eq!(snapshot.state, DriverState::Ready);
    assert_eq!(snapshot.firmware.as_deref(), Some("ELM327 v1.5"));
    assert_eq!(snapshot.protocol.as_deref(), Some("Auto"));
}

#[tokio::test]
async fn protocol_fault_maps_to_no_data_error() {
    let (transport, driver) = connected_driver().await;
    transport.add_response("010C", "NO DATA");
    let err = driver.read_pid("0C").await.unwrap_err();
    assert!(matches!(err, ObdError::NoData { .. }));
    assert_eq!(err.code(), "no_data");
}

#[tokio::test]
async fn self_check_over_the_full_stack_passes() {
    let (_, driver) = connected_driver().await;
    let report = run_self_check(
        &driver,
        &SelfCheckOptions {
            attempts: 3,
            delay: Duration::from_millis(10),
        },
    )
    .await;
    assert_eq!(report.outcome, SelfCheckOutcome::Passed);
    assert!(report.consistent);
    assert_eq!(report.metrics.rpm_min, Some(1726.0));
    assert_eq!(report.protocol.as_deref(), Some("Auto"));
}

#[tokio::test]
async fn watchdog_recovers_a_dead_link() {
    let transport = Arc::new(ScriptedTransport::new(&ScriptedConfig::default()));
    let mut config = fast_config();
    config.watchdog.tick_ms = 20;
    config.watchdog.stall_timeout_ms = Some(50);
    let driver = Arc::new(Elm327Driver::with_transport(transport.clone(), config));
    driver.connect().await.unwrap();
    let _supervisor = LinkSupervisor::start(Arc::clone(&driver));
    let mut events = driver.subscribe();

    transport.set_silent(true);
    let pending = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.read_pid("0C").await })
    };
    // The stalled command fails through the forced disconnect, not its
    // own (longer) timeout
    assert!(pending.await.unwrap().is_err());
    transport.set_silent(false);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                DriverEvent::ReconnectSucceeded { .. } => break,
                _ => continue,
            }
        }
    })
    .await
    .expect("link was not restored");
    assert_eq!(driver.state(), DriverState::Ready);
    assert!(driver.metrics().watchdog_triggers >= 1);
}

#[tokio::test]
async fn prometheus_export_uses_the_contract_names() {
    let handle = PrometheusBuilder::new().install_recorder().unwrap();

    let (transport, driver) = connected_driver().await;
    driver.read_pid("0C").await.unwrap();
    driver.read_dtc().await.unwrap();
    driver.clear_dtc().await.unwrap();
    transport.add_response("010D", "NO DATA");
    let _ = driver.read_pid("0D").await;

    let rendered = handle.render();
    for name in [
        "obd_connections_total",
        "obd_dtc_read_total",
        "obd_dtc_cleared_total",
        "obd_pid_read_total",
        "obd_errors_total",
        "obd_command_duration_seconds",
        "obd_queue_depth",
    ] {
        assert!(rendered.contains(name), "missing metric: {name}");
    }
    assert!(rendered.contains(r#"pid="0C""#));
    assert!(rendered.contains(r#"type="no_data""#));
}
