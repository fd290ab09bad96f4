//! Link supervision: stall watchdog and automatic reconnect
//!
//! BLE clones in particular drop the link without closing it; a command
//! then sits in flight forever while the OS still reports the socket as
//! healthy. The watchdog periodically inspects the driver and forces the
//! transport closed once an in-flight command exceeds the stall
//! threshold, which converts the silent hang into an ordinary
//! disconnect. The reconnect task then dials the link back up with the
//! connect backoff policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use obd_core::DriverEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::WatchdogConfig;
use crate::driver::Elm327Driver;
use crate::retry::{backoff_delay, RetryPolicy};

/// Owns the watchdog and reconnect background tasks for one driver.
///
/// Dropping the supervisor stops both tasks; the driver itself is
/// unaffected.
pub struct LinkSupervisor {
    watchdog_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    reconnect_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LinkSupervisor {
    pub fn start(driver: Arc<Elm327Driver>) -> Self {
        let config = driver.config().watchdog.clone();
        let supervisor = Self {
            watchdog_task: parking_lot::Mutex::new(None),
            reconnect_task: parking_lot::Mutex::new(None),
        };
        if config.enabled {
            *supervisor.watchdog_task.lock() = Some(spawn_watchdog(Arc::clone(&driver), &config));
        }
        if config.auto_reconnect {
            *supervisor.reconnect_task.lock() = Some(spawn_reconnect(driver));
        }
        supervisor
    }

    pub fn stop(&self) {
        if let Some(task) = self.watchdog_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.reconnect_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for LinkSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_watchdog(driver: Arc<Elm327Driver>, config: &WatchdogConfig) -> JoinHandle<()> {
    let tick = Duration::from_millis(config.tick_ms);
    let stall_threshold = Duration::from_millis(
        config.effective_stall_timeout_ms(driver.config().command_timeout_ms),
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(stalled_for) = driver.stalled_for() else {
                continue;
            };
            if stalled_for <= stall_threshold {
                continue;
            }
            tracing::warn!(
                stalled_for_ms = stalled_for.as_millis() as u64,
                threshold_ms = stall_threshold.as_millis() as u64,
                "command stalled, forcing transport closed"
            );
            driver.note_watchdog_trigger(stalled_for);
            driver.force_close_transport().await;
        }
    })
}

fn spawn_reconnect(driver: Arc<Elm327Driver>) -> JoinHandle<()> {
    let mut events = driver.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DriverEvent::Disconnected) => {
                    let policy = driver.config().retry.connect.clone();
                    reconnect(&driver, &policy).await;
                    // A failed attempt tears the link down again; those
                    // disconnects are ours, not new ones
                    while matches!(events.try_recv(), Ok(_)) {}
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "driver event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn reconnect(driver: &Arc<Elm327Driver>, policy: &RetryPolicy) {
    let started = Instant::now();
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts.max(1) {
        driver.note_reconnect_attempt(attempt);
        tracing::info!(attempt, "reconnecting adapter link");
        match driver.connect().await {
            Ok(()) => {
                let duration = started.elapsed().as_secs_f64();
                tracing::info!(attempt, duration_seconds = duration, "link restored");
                driver.note_reconnect_success(duration);
                return;
            }
            Err(err) => {
                tracing::warn!(attempt, error = %err, "reconnect attempt failed");
                last_error = err.to_string();
                driver.note_reconnect_failure();
                if attempt < policy.max_attempts {
                    tokio::time::sleep(backoff_delay(attempt, policy)).await;
                }
            }
        }
    }
    tracing::error!(
        attempts = policy.max_attempts,
        error = %last_error,
        "reconnect attempts exhausted"
    );
    driver.note_reconnect_exhausted(last_error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverConfig, RetryConfig, ScriptedConfig, TransportConfig};
    use crate::transport::{ScriptedTransport, Transport};
    use obd_core::DriverState;

    fn supervised_config() -> DriverConfig {
        DriverConfig {
            transport: TransportConfig::Scripted(ScriptedConfig::default()),
            command_timeout_ms: 2_000,
            init_timeout_ms: 200,
            reset_settle_ms: 0,
            retry: RetryConfig {
                connect: crate::retry::RetryPolicy {
                    max_attempts: 5,
                    base_delay_ms: 10,
                    max_delay_ms: 50,
                    backoff_multiplier: 2.0,
                    jitter_factor: 0.0,
                },
                init: crate::retry::RetryPolicy::none(),
                operation: crate::retry::RetryPolicy::none(),
            },
            watchdog: WatchdogConfig {
                enabled: true,
                tick_ms: 20,
                stall_timeout_ms: Some(50),
                auto_reconnect: true,
            },
            ..DriverConfig::default()
        }
    }

    async fn wait_for_event<F>(
        events: &mut broadcast::Receiver<DriverEvent>,
        mut matches_event: F,
    ) -> DriverEvent
    where
        F: FnMut(&DriverEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.unwrap();
                if matches_event(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not observed in time")
    }

    #[tokio::test]
    async fn watchdog_breaks_a_stalled_command_and_reconnects() {
        let transport = Arc::new(ScriptedTransport::new(&ScriptedConfig::default()));
        let driver = Arc::new(Elm327Driver::with_transport(
            transport.clone(),
            supervised_config(),
        ));
        driver.connect().await.unwrap();
        let supervisor = LinkSupervisor::start(Arc::clone(&driver));
        let mut events = driver.subscribe();

        transport.set_silent(true);
        let worker = {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.read_pid("0C").await })
        };

        let event = wait_for_event(&mut events, |e| {
            matches!(e, DriverEvent::WatchdogTriggered { .. })
        })
        .await;
        match event {
            DriverEvent::WatchdogTriggered { stalled_for_ms } => assert!(stalled_for_ms >= 50),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(worker.await.unwrap().is_err());

        // The adapter comes back; the reconnect task restores the link
        transport.set_silent(false);
        wait_for_event(&mut events, |e| {
            matches!(e, DriverEvent::ReconnectSucceeded { .. })
        })
        .await;
        assert_eq!(driver.state(), DriverState::Ready);
        let metrics = driver.metrics();
        assert!(metrics.watchdog_triggers >= 1);
        assert!(metrics.reconnect_successes >= 1);
        assert!(metrics.last_reconnect_duration_seconds.is_some());
        supervisor.stop();
    }

    #[tokio::test]
    async fn watchdog_ignores_an_idle_driver() {
        let transport = Arc::new(ScriptedTransport::new(&ScriptedConfig::default()));
        let driver = Arc::new(Elm327Driver::with_transport(
            transport.clone(),
            supervised_config(),
        ));
        driver.connect().await.unwrap();
        let _supervisor = LinkSupervisor::start(Arc::clone(&driver));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(driver.state(), DriverState::Ready);
        assert_eq!(driver.metrics().watchdog_triggers, 0);
    }

    #[tokio::test]
    async fn reconnect_reports_exhaustion() {
        let mut config = supervised_config();
        config.retry.connect = crate::retry::RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 5,
            max_delay_ms: 10,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        };
        let transport = Arc::new(ScriptedTransport::new(&ScriptedConfig::default()));
        let driver = Arc::new(Elm327Driver::with_transport(transport.clone(), config));
        driver.connect().await.unwrap();
        let _supervisor = LinkSupervisor::start(Arc::clone(&driver));
        let mut events = driver.subscribe();

        // Adapter goes away for good
        transport.set_silent(true);
        transport.close().await.unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, DriverEvent::ReconnectFailed { .. })
        })
        .await;
        let metrics = driver.metrics();
        assert_eq!(metrics.reconnect_attempts, 2);
        assert_eq!(metrics.reconnect_failures, 2);
        assert_eq!(metrics.reconnect_successes, 0);
    }
}
