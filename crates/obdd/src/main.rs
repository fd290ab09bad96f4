//! obdd - OBD-II Diagnostic Daemon
//!
//! Pools ELM327 adapter drivers across vehicles, exports Prometheus
//! metrics and runs an adapter self-check at startup.
//!
//! Usage:
//!   obdd [OPTIONS] [config.toml]
//!
//! Options:
//!   --self-check  Run the adapter self-check, print the report and exit
//!
//! If no config file is provided, uses the scripted transport for demo
//! purposes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use obd_core::ObdResult;
use obd_driver::{DriverConfig, Elm327Driver, LinkSupervisor};
use obd_pool::{ConnectionPool, DriverProvider, PoolConfig};
use obd_selfcheck::{run_self_check, SelfCheckOptions, SelfCheckOutcome};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
    /// Run the self-check and exit
    self_check_only: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        self_check_only: false,
    };

    for arg in &args {
        match arg.as_str() {
            "--self-check" => result.self_check_only = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"obdd - OBD-II Diagnostic Daemon

Usage: obdd [OPTIONS] [config.toml]

Options:
      --self-check  Run the adapter self-check, print the report and exit
  -h, --help        Print this help message

Examples:
  # Run against the scripted demo adapter
  obdd

  # Run with a config file
  obdd config.toml

  # Qualify an adapter and exit
  obdd --self-check config.toml
"#
    );
}

/// Daemon configuration (TOML)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DaemonConfig {
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    pool: PoolSection,
    /// Template applied to every driver the pool creates
    #[serde(default)]
    driver: DriverConfig,
    #[serde(default)]
    self_check: SelfCheckSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetricsConfig {
    #[serde(default = "default_true")]
    enabled: bool,
    /// Prometheus scrape endpoint
    #[serde(default = "default_metrics_listen")]
    listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PoolSection {
    #[serde(default = "default_pool_max_size")]
    max_size: usize,
    #[serde(default = "default_acquire_timeout_ms")]
    acquire_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelfCheckSection {
    /// Qualify the adapter before serving
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_self_check_attempts")]
    attempts: u32,
    #[serde(default = "default_self_check_delay_ms")]
    delay_ms: u64,
}

impl Default for SelfCheckSection {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_self_check_attempts(),
            delay_ms: default_self_check_delay_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_metrics_listen() -> String {
    "0.0.0.0:9190".to_string()
}
fn default_pool_max_size() -> usize {
    5
}
fn default_acquire_timeout_ms() -> u64 {
    10_000
}
fn default_self_check_attempts() -> u32 {
    3
}
fn default_self_check_delay_ms() -> u64 {
    500
}

/// Pool provider: builds, connects and supervises one driver per vehicle
struct SupervisedDriverProvider {
    template: DriverConfig,
    supervisors: parking_lot::Mutex<Vec<LinkSupervisor>>,
}

impl SupervisedDriverProvider {
    fn new(template: DriverConfig) -> Self {
        Self {
            template,
            supervisors: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DriverProvider for SupervisedDriverProvider {
    async fn create_driver(&self, vehicle_id: &str) -> ObdResult<Arc<Elm327Driver>> {
        tracing::info!(vehicle_id, "creating adapter driver");
        let driver = Arc::new(Elm327Driver::new(self.template.clone())?);
        driver.connect().await?;
        driver.start_keepalive();
        self.supervisors
            .lock()
            .push(LinkSupervisor::start(Arc::clone(&driver)));
        Ok(driver)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "obdd=info,obd_driver=info,obd_pool=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting obdd (OBD-II Diagnostic Daemon)");

    let args = parse_args();

    let config = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str::<DaemonConfig>(&content)?
    } else {
        tracing::info!("No config file provided, using scripted transport");
        DaemonConfig::default()
    };

    if config.metrics.enabled && !args.self_check_only {
        let addr: SocketAddr = config.metrics.listen.parse()?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!("Metrics exported on http://{}/metrics", addr);
    }

    let provider = Arc::new(SupervisedDriverProvider::new(config.driver.clone()));
    let pool = Arc::new(ConnectionPool::new(
        PoolConfig {
            max_size: config.pool.max_size,
            acquire_timeout: Duration::from_millis(config.pool.acquire_timeout_ms),
        },
        provider,
    ));

    if config.self_check.enabled || args.self_check_only {
        let outcome = startup_self_check(&pool, &config.self_check).await?;
        if args.self_check_only {
            pool.shutdown().await;
            if outcome == SelfCheckOutcome::Failed {
                std::process::exit(1);
            }
            return Ok(());
        }
        if outcome == SelfCheckOutcome::Failed {
            pool.shutdown().await;
            anyhow::bail!("adapter self-check failed");
        }
    }

    tracing::info!(
        max_size = config.pool.max_size,
        "Pool ready, waiting for shutdown signal"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    pool.shutdown().await;

    Ok(())
}

/// Acquire a driver, qualify the adapter, print the report
async fn startup_self_check(
    pool: &ConnectionPool,
    section: &SelfCheckSection,
) -> anyhow::Result<SelfCheckOutcome> {
    let driver = pool.acquire("self-check", None).await?;
    let options = SelfCheckOptions {
        attempts: section.attempts,
        delay: Duration::from_millis(section.delay_ms),
    };
    let report = run_self_check(&driver, &options).await;
    pool.release("self-check")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    match report.outcome {
        SelfCheckOutcome::Passed => tracing::info!("Adapter self-check passed"),
        SelfCheckOutcome::Warning => tracing::warn!(
            passes = report.passes,
            fails = report.fails,
            consistent = report.consistent,
            "Adapter self-check finished with warnings"
        ),
        SelfCheckOutcome::Failed => tracing::error!("Adapter self-check failed"),
    }
    Ok(report.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_uses_scripted_transport() {
        let config = DaemonConfig::default();
        assert!(matches!(
            config.driver.transport,
            obd_driver::config::TransportConfig::Scripted(_)
        ));
        assert_eq!(config.pool.max_size, 5);
        assert!(config.metrics.enabled);
        assert_eq!(config.self_check.attempts, 3);
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            [metrics]
            listen = "127.0.0.1:9999"

            [pool]
            max_size = 2
            acquire_timeout_ms = 3000

            [driver]
            command_timeout_ms = 1500

            [driver.transport]
            type = "serial"
            port = "/dev/ttyUSB0"
            baud_rate = 115200

            [self_check]
            enabled = false
        "#;
        let config: DaemonConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.metrics.listen, "127.0.0.1:9999");
        assert_eq!(config.pool.max_size, 2);
        assert_eq!(config.driver.command_timeout_ms, 1_500);
        assert!(!config.self_check.enabled);
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(toml::from_str::<DaemonConfig>("[nope]\nx = 1").is_err());
    }
}
