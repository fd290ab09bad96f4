//! obd-pool - bounded driver pool and read caches
//!
//! The pool multiplexes a fixed number of adapter drivers across vehicle
//! identifiers with FIFO waiting and LIFO idle reuse. The caches absorb
//! repeated DTC description lookups and short-lived PID samples.

pub mod cache;
pub mod pool;

pub use cache::{CacheConfig, CacheStats, DtcDescriptionCache, ObdCache, PidSampleCache};
pub use pool::{ConnectionPool, DriverProvider, PoolConfig, PoolStats};
