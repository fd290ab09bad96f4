//! Bounded driver pool
//!
//! One active driver per vehicle, at most `max_size` drivers alive.
//! Released drivers stay connected and are reused LIFO so a fresh
//! acquire skips the full init sequence. Callers beyond capacity queue
//! FIFO and are serviced exactly once on release; a waiter whose
//! vehicle already holds a slot is passed over until that slot is
//! released, and a timed-out waiter is removed from the queue and can
//! never be handed a driver afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use obd_core::{ObdError, ObdResult};
use obd_driver::Elm327Driver;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

/// Factory for pool-owned drivers; implementations typically build a
/// transport, connect and attach a supervisor
#[async_trait]
pub trait DriverProvider: Send + Sync {
    async fn create_driver(&self, vehicle_id: &str) -> ObdResult<Arc<Elm327Driver>>;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    /// Default wait bound for `acquire` when the caller passes none
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
    pub total_acquired: u64,
    pub average_wait_ms: f64,
}

struct PoolSlot {
    driver: Arc<Elm327Driver>,
    acquired_at: Instant,
}

struct Waiter {
    id: u64,
    vehicle_id: String,
    tx: oneshot::Sender<Arc<Elm327Driver>>,
    enqueued_at: Instant,
}

struct PoolInner {
    slots: HashMap<String, PoolSlot>,
    /// Connected drivers awaiting reuse, most recently released last
    idle: Vec<Arc<Elm327Driver>>,
    queue: VecDeque<Waiter>,
    /// Drivers being created outside the lock; counts against capacity
    creating: usize,
    shutdown: bool,
    next_waiter_id: u64,
    total_acquired: u64,
    total_wait_ms: f64,
}

impl PoolInner {
    fn note_acquired(&mut self, waited: Duration) {
        self.total_acquired += 1;
        self.total_wait_ms += waited.as_secs_f64() * 1_000.0;
    }
}

/// Multiplexes a bounded set of drivers across vehicle identifiers
pub struct ConnectionPool {
    config: PoolConfig,
    provider: Arc<dyn DriverProvider>,
    inner: Mutex<PoolInner>,
}

enum AcquirePlan {
    Create,
    Wait(u64, oneshot::Receiver<Arc<Elm327Driver>>),
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, provider: Arc<dyn DriverProvider>) -> Self {
        Self {
            config,
            provider,
            inner: Mutex::new(PoolInner {
                slots: HashMap::new(),
                idle: Vec::new(),
                queue: VecDeque::new(),
                creating: 0,
                shutdown: false,
                next_waiter_id: 0,
                total_acquired: 0,
                total_wait_ms: 0.0,
            }),
        }
    }

    /// Acquire a driver for `vehicle_id`, waiting up to `timeout` (the
    /// configured default when `None`) if the pool is at capacity.
    pub async fn acquire(
        &self,
        vehicle_id: &str,
        timeout: Option<Duration>,
    ) -> ObdResult<Arc<Elm327Driver>> {
        let started = Instant::now();
        let plan = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                return Err(ObdError::PoolShutdown);
            }
            if inner.slots.contains_key(vehicle_id) {
                return Err(ObdError::VehicleBusy(vehicle_id.to_string()));
            }
            if let Some(driver) = inner.idle.pop() {
                inner.slots.insert(
                    vehicle_id.to_string(),
                    PoolSlot {
                        driver: Arc::clone(&driver),
                        acquired_at: Instant::now(),
                    },
                );
                inner.note_acquired(started.elapsed());
                tracing::debug!(vehicle_id, "reusing idle driver");
                return Ok(driver);
            }
            if inner.slots.len() + inner.idle.len() + inner.creating < self.config.max_size {
                inner.creating += 1;
                AcquirePlan::Create
            } else {
                let (tx, rx) = oneshot::channel();
                let id = inner.next_waiter_id;
                inner.next_waiter_id += 1;
                inner.queue.push_back(Waiter {
                    id,
                    vehicle_id: vehicle_id.to_string(),
                    tx,
                    enqueued_at: started,
                });
                tracing::debug!(vehicle_id, waiting = inner.queue.len(), "pool at capacity, queueing");
                AcquirePlan::Wait(id, rx)
            }
        };

        match plan {
            AcquirePlan::Create => self.create_slot(vehicle_id, started).await,
            AcquirePlan::Wait(id, rx) => {
                let timeout = timeout.unwrap_or(self.config.acquire_timeout);
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(driver)) => Ok(driver),
                    // Sender dropped without a driver: shutdown drained us
                    Ok(Err(_)) => Err(ObdError::PoolShutdown),
                    Err(_) => {
                        self.inner.lock().queue.retain(|waiter| waiter.id != id);
                        tracing::warn!(vehicle_id, timeout_ms = timeout.as_millis() as u64, "acquire timed out");
                        Err(ObdError::AcquireTimeout(timeout.as_millis() as u64))
                    }
                }
            }
        }
    }

    async fn create_slot(
        &self,
        vehicle_id: &str,
        started: Instant,
    ) -> ObdResult<Arc<Elm327Driver>> {
        let created = self.provider.create_driver(vehicle_id).await;
        let driver = {
            let mut inner = self.inner.lock();
            inner.creating -= 1;
            match created {
                Ok(driver) => {
                    if inner.shutdown {
                        Some(driver)
                    } else {
                        inner.slots.insert(
                            vehicle_id.to_string(),
                            PoolSlot {
                                driver: Arc::clone(&driver),
                                acquired_at: Instant::now(),
                            },
                        );
                        inner.note_acquired(started.elapsed());
                        tracing::info!(vehicle_id, active = inner.slots.len(), "driver created");
                        return Ok(driver);
                    }
                }
                Err(err) => {
                    tracing::warn!(vehicle_id, error = %err, "driver creation failed");
                    return Err(err);
                }
            }
        };
        // Shutdown raced the creation; tear the fresh driver down
        if let Some(driver) = driver {
            driver.disconnect().await;
        }
        Err(ObdError::PoolShutdown)
    }

    /// Return the driver held for `vehicle_id` to the pool. The first
    /// queued waiter whose vehicle is not already active is handed the
    /// driver immediately; waiters for a still-active vehicle keep
    /// their queue position.
    pub fn release(&self, vehicle_id: &str) -> ObdResult<()> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.remove(vehicle_id).ok_or_else(|| {
            ObdError::Internal(format!("no active connection for vehicle {vehicle_id}"))
        })?;
        tracing::debug!(
            vehicle_id,
            held_ms = slot.acquired_at.elapsed().as_millis() as u64,
            "driver released"
        );
        let mut driver = slot.driver;
        // A waiter for a vehicle that still holds a slot must not be
        // serviced: it would hand two callers the same vehicle and the
        // slot insert would orphan the first caller's driver.
        while let Some(position) = inner
            .queue
            .iter()
            .position(|waiter| !inner.slots.contains_key(&waiter.vehicle_id))
        {
            let waiter = match inner.queue.remove(position) {
                Some(waiter) => waiter,
                None => break,
            };
            inner.slots.insert(
                waiter.vehicle_id.clone(),
                PoolSlot {
                    driver: Arc::clone(&driver),
                    acquired_at: Instant::now(),
                },
            );
            match waiter.tx.send(Arc::clone(&driver)) {
                Ok(()) => {
                    inner.note_acquired(waiter.enqueued_at.elapsed());
                    tracing::debug!(vehicle_id = %waiter.vehicle_id, "queued acquire serviced");
                    return Ok(());
                }
                Err(returned) => {
                    // Waiter gave up between queue removal and delivery
                    inner.slots.remove(&waiter.vehicle_id);
                    driver = returned;
                }
            }
        }
        inner.idle.push(driver);
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            active: inner.slots.len(),
            idle: inner.idle.len(),
            waiting: inner.queue.len(),
            total_acquired: inner.total_acquired,
            average_wait_ms: if inner.total_acquired > 0 {
                inner.total_wait_ms / inner.total_acquired as f64
            } else {
                0.0
            },
        }
    }

    /// Reject all queued waiters and disconnect every driver. Subsequent
    /// `acquire` calls fail immediately.
    pub async fn shutdown(&self) {
        let (waiters, drivers) = {
            let mut inner = self.inner.lock();
            inner.shutdown = true;
            let waiters: Vec<Waiter> = inner.queue.drain(..).collect();
            let mut drivers: Vec<Arc<Elm327Driver>> = inner.idle.drain(..).collect();
            drivers.extend(inner.slots.drain().map(|(_, slot)| slot.driver));
            (waiters, drivers)
        };
        tracing::info!(
            rejected_waiters = waiters.len(),
            drivers = drivers.len(),
            "pool shutting down"
        );
        // Dropping the senders fails every queued acquire
        drop(waiters);
        for driver in drivers {
            driver.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_driver::config::DriverConfig;
    use pretty_assertions::assert_eq;

    struct ScriptedProvider;

    #[async_trait]
    impl DriverProvider for ScriptedProvider {
        async fn create_driver(&self, _vehicle_id: &str) -> ObdResult<Arc<Elm327Driver>> {
            let config = DriverConfig {
                reset_settle_ms: 0,
                ..DriverConfig::default()
            };
            let driver = Arc::new(Elm327Driver::new(config)?);
            driver.connect().await?;
            Ok(driver)
        }
    }

    fn pool(max_size: usize) -> ConnectionPool {
        ConnectionPool::new(
            PoolConfig {
                max_size,
                acquire_timeout: Duration::from_secs(2),
            },
            Arc::new(ScriptedProvider),
        )
    }

    #[tokio::test]
    async fn duplicate_vehicle_acquire_fails() {
        let pool = pool(2);
        pool.acquire("v1", None).await.unwrap();
        let err = pool.acquire("v1", None).await.unwrap_err();
        assert!(matches!(err, ObdError::VehicleBusy(_)));
        assert!(err
            .to_string()
            .contains("already has active connection"));
    }

    #[tokio::test]
    async fn released_driver_is_reused() {
        let pool = pool(1);
        let first = pool.acquire("v1", None).await.unwrap();
        pool.release("v1").unwrap();
        let second = pool.acquire("v2", None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.stats().total_acquired, 2);
    }

    #[tokio::test]
    async fn idle_reuse_is_lifo() {
        let pool = pool(2);
        let a = pool.acquire("a", None).await.unwrap();
        let b = pool.acquire("b", None).await.unwrap();
        pool.release("a").unwrap();
        pool.release("b").unwrap();
        let next = pool.acquire("c", None).await.unwrap();
        assert!(Arc::ptr_eq(&next, &b));
        assert!(!Arc::ptr_eq(&next, &a));
    }

    #[tokio::test]
    async fn waiter_is_serviced_on_release() {
        let pool = Arc::new(pool(1));
        let held = pool.acquire("v1", None).await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v2", Some(Duration::from_secs(2))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.stats().waiting, 1);
        pool.release("v1").unwrap();
        let handed = waiter.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&handed, &held));
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.waiting, 0);
        assert!(stats.average_wait_ms > 0.0);
    }

    #[tokio::test]
    async fn queued_duplicates_are_not_handed_a_shared_vehicle() {
        let pool = Arc::new(pool(1));
        pool.acquire("holder", None).await.unwrap();
        let first = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v2", Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v2", Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pool.stats().waiting, 2);

        pool.release("holder").unwrap();
        first.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // The duplicate stays queued while "v2" holds its slot
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.waiting, 1);

        pool.release("v2").unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(pool.stats().active, 1);
        pool.release("v2").unwrap();
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn busy_vehicle_waiter_is_passed_over_for_a_distinct_one() {
        let pool = Arc::new(pool(2));
        pool.acquire("v1", None).await.unwrap();
        pool.acquire("other", None).await.unwrap();
        let duplicate = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v1", Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let distinct = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v3", Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        // "v3" queued behind the duplicate but is serviced first
        pool.release("other").unwrap();
        distinct.await.unwrap().unwrap();
        assert_eq!(pool.stats().waiting, 1);

        pool.release("v1").unwrap();
        duplicate.await.unwrap().unwrap();
        assert_eq!(pool.stats().active, 2);
    }

    #[tokio::test]
    async fn timed_out_acquire_never_resolves() {
        let pool = pool(1);
        pool.acquire("v1", None).await.unwrap();
        let err = pool
            .acquire("v2", Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, ObdError::AcquireTimeout(30)));
        // The timed-out waiter must not be handed the driver later
        pool.release("v1").unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_waiters_and_new_acquires() {
        let pool = Arc::new(pool(1));
        pool.acquire("v1", None).await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire("v2", Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, ObdError::PoolShutdown));
        let err = pool.acquire("v3", None).await.unwrap_err();
        assert!(matches!(err, ObdError::PoolShutdown));
    }

    #[tokio::test]
    async fn release_of_unknown_vehicle_fails() {
        let pool = pool(1);
        assert!(pool.release("ghost").is_err());
    }

    #[tokio::test]
    async fn stats_track_active_and_idle() {
        let pool = pool(3);
        pool.acquire("a", None).await.unwrap();
        pool.acquire("b", None).await.unwrap();
        pool.release("a").unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.total_acquired, 2);
    }
}
