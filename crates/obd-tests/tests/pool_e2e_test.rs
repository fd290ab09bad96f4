//! Pool behavior over real (scripted) drivers
//!
//! Exercises acquire/release contention, FIFO waiter servicing, timeout
//! removal, shutdown and the caches sitting beside the pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use obd_core::{ObdError, ObdResult};
use obd_driver::config::DriverConfig;
use obd_driver::Elm327Driver;
use obd_pool::{ConnectionPool, DriverProvider, DtcDescriptionCache, PoolConfig};
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

fn pool(max_size: usize) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(
        PoolConfig {
            max_size,
            acquire_timeout: Duration::from_secs(2),
        },
        Arc::new(ScriptedProvider),
    ))
}

#[tokio::test]
async fn pooled_drivers_serve_commands() {
    let pool = pool(2);
    let driver = pool.acquire("vehicle-1", None).await.unwrap();
    let reading = driver.read_pid("0C").await.unwrap();
    assert_eq!(reading.value, 1726.0);
    pool.release("vehicle-1").unwrap();
}

#[tokio::test]
async fn contention_is_fifo_and_each_waiter_served_once() {
    let pool = pool(1);
    pool.acquire("holder", None).await.unwrap();

    let mut waiters = Vec::new();
    for i in 0..3 {
        let pool = Arc::clone(&pool);
        let vehicle = format!("waiter-{i}");
        waiters.push(tokio::spawn(async move {
            pool.acquire(&vehicle, Some(Duration::from_secs(5))).await
        }));
        // Deterministic queue order
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pool.stats().waiting, 3);

    pool.release("holder").unwrap();
    // waiter-0 is at the head of the queue
    waiters.remove(0).await.unwrap().unwrap();
    assert_eq!(pool.stats().waiting, 2);
    pool.release("waiter-0").unwrap();
    waiters.remove(0).await.unwrap().unwrap();
    pool.release("waiter-1").unwrap();
    waiters.remove(0).await.unwrap().unwrap();
    pool.release("waiter-2").unwrap();

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.total_acquired, 4);
}

#[tokio::test]
async fn duplicate_vehicle_and_timeout_semantics() {
    let pool = pool(1);
    pool.acquire("v1", None).await.unwrap();

    let err = pool.acquire("v1", None).await.unwrap_err();
    assert!(err.to_string().contains("already has active connection"));

    let err = pool
        .acquire("v2", Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, ObdError::AcquireTimeout(50)));

    // The timed-out waiter must never be serviced
    pool.release("v1").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.stats().active, 0);
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test]
async fn shutdown_cancels_waiters_and_disconnects() {
    let pool = pool(1);
    let driver = pool.acquire("v1", None).await.unwrap();
    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire("v2", Some(Duration::from_secs(10))).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    pool.shutdown().await;
    assert!(matches!(
        waiter.await.unwrap().unwrap_err(),
        ObdError::PoolShutdown
    ));
    assert!(matches!(
        pool.acquire("v3", None).await.unwrap_err(),
        ObdError::PoolShutdown
    ));
    assert_eq!(driver.state(), obd_core::DriverState::Disconnected);
}

#[tokio::test]
async fn dtc_descriptions_are_cached_beside_the_pool() {
    let pool = pool(1);
    let cache = DtcDescriptionCache::new();
    let driver = pool.acquire("v1", None).await.unwrap();

    let dtcs = driver.read_dtc().await.unwrap();
    for dtc in &dtcs {
        if let Some(description) = &dtc.description {
            cache.insert(&dtc.code, description);
        }
    }
    assert_eq!(
        cache.get("P0133").as_deref(),
        Some("O2 sensor slow response (bank 1, sensor 1)")
    );
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.len, 2);
    pool.release("v1").unwrap();
}
