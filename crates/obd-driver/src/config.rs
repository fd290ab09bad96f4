//! Driver configuration
//!
//! Every recognized option is an explicit field; unknown keys fail
//! deserialization rather than vanishing into a bag.

use serde::{Deserialize, Serialize};

use crate::profiles::ObdProtocol;
use crate::retry::RetryPolicy;

/// Full driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Link to the adapter
    #[serde(default)]
    pub transport: TransportConfig,
    /// Timeout for ordinary commands
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Timeout for AT commands during init
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    /// Timeout for Mode 03 reads
    #[serde(default = "default_read_dtc_timeout_ms")]
    pub read_dtc_timeout_ms: u64,
    /// Timeout for Mode 04 clears
    #[serde(default = "default_clear_dtc_timeout_ms")]
    pub clear_dtc_timeout_ms: u64,
    /// Timeout for live-data PID samples
    #[serde(default = "default_live_data_timeout_ms")]
    pub live_data_timeout_ms: u64,
    /// Settle delay after ATZ before further init commands
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,
    /// Force a single protocol instead of profile negotiation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ObdProtocol>,
    /// Named per-make protocol profile ("toyota_lexus", "gm", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_profile: Option<String>,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_command_timeout_ms() -> u64 {
    2_000
}
fn default_init_timeout_ms() -> u64 {
    5_000
}
fn default_read_dtc_timeout_ms() -> u64 {
    3_000
}
fn default_clear_dtc_timeout_ms() -> u64 {
    5_000
}
fn default_live_data_timeout_ms() -> u64 {
    1_500
}
fn default_reset_settle_ms() -> u64 {
    1_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            command_timeout_ms: default_command_timeout_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            read_dtc_timeout_ms: default_read_dtc_timeout_ms(),
            clear_dtc_timeout_ms: default_clear_dtc_timeout_ms(),
            live_data_timeout_ms: default_live_data_timeout_ms(),
            reset_settle_ms: default_reset_settle_ms(),
            protocol: None,
            protocol_profile: None,
            keepalive: KeepaliveConfig::default(),
            retry: RetryConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// Transport selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// USB/RS232 adapter via a serial device node
    Serial(SerialConfig),
    /// BLE adapter; the link itself is supplied by the host BLE stack
    Bluetooth(BluetoothConfig),
    /// In-process scripted adapter for tests and demo mode
    Scripted(ScriptedConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Scripted(ScriptedConfig::default())
    }
}

/// Serial port settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    /// Device node, e.g. "/dev/ttyUSB0"
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    38_400
}

/// BLE peripheral identification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BluetoothConfig {
    /// Peripheral MAC address
    pub address: String,
    /// Advertised name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Scripted transport settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedConfig {
    /// Simulated response latency per command
    #[serde(default)]
    pub latency_ms: u64,
}

/// Idle keep-alive pinger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeepaliveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_keepalive_interval_ms")]
    pub interval_ms: u64,
    /// Command used as the ping
    #[serde(default = "default_keepalive_command")]
    pub command: String,
}

fn default_keepalive_interval_ms() -> u64 {
    5_000
}
fn default_keepalive_command() -> String {
    "0100".to_string()
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_keepalive_interval_ms(),
            command: default_keepalive_command(),
        }
    }
}

/// Retry policies per operation class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "RetryPolicy::connect")]
    pub connect: RetryPolicy,
    #[serde(default = "RetryPolicy::init")]
    pub init: RetryPolicy,
    #[serde(default = "RetryPolicy::operation")]
    pub operation: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect: RetryPolicy::connect(),
            init: RetryPolicy::init(),
            operation: RetryPolicy::operation(),
        }
    }
}

/// Link supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often the watchdog inspects the driver
    #[serde(default = "default_watchdog_tick_ms")]
    pub tick_ms: u64,
    /// Stall threshold for an in-flight command; defaults to twice the
    /// command timeout when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_timeout_ms: Option<u64>,
    /// Reconnect automatically after a lost link
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
}

fn default_true() -> bool {
    true
}
fn default_watchdog_tick_ms() -> u64 {
    15_000
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: default_watchdog_tick_ms(),
            stall_timeout_ms: None,
            auto_reconnect: true,
        }
    }
}

impl WatchdogConfig {
    /// Effective stall threshold for a given command timeout
    pub fn effective_stall_timeout_ms(&self, command_timeout_ms: u64) -> u64 {
        self.stall_timeout_ms
            .unwrap_or_else(|| command_timeout_ms.saturating_mul(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.command_timeout_ms, 2_000);
        assert_eq!(config.init_timeout_ms, 5_000);
        assert!(matches!(config.transport, TransportConfig::Scripted(_)));
        assert_eq!(config.retry.connect.max_attempts, 5);
        assert_eq!(config.watchdog.tick_ms, 15_000);
    }

    #[test]
    fn stall_timeout_defaults_to_twice_command_timeout() {
        let watchdog = WatchdogConfig::default();
        assert_eq!(watchdog.effective_stall_timeout_ms(2_000), 4_000);
        let explicit = WatchdogConfig {
            stall_timeout_ms: Some(1_000),
            ..WatchdogConfig::default()
        };
        assert_eq!(explicit.effective_stall_timeout_ms(2_000), 1_000);
    }

    #[test]
    fn parses_toml() {
        let toml = r#"
            command_timeout_ms = 1500
            protocol_profile = "toyota_lexus"

            [transport]
            type = "serial"
            port = "/dev/ttyUSB0"

            [retry.connect]
            max_attempts = 2
            base_delay_ms = 100

            [watchdog]
            tick_ms = 500
        "#;
        let config: DriverConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.command_timeout_ms, 1_500);
        match &config.transport {
            TransportConfig::Serial(serial) => {
                assert_eq!(serial.port, "/dev/ttyUSB0");
                assert_eq!(serial.baud_rate, 38_400);
            }
            other => panic!("unexpected transport: {other:?}"),
        }
        assert_eq!(config.retry.connect.max_attempts, 2);
        assert_eq!(config.watchdog.tick_ms, 500);
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = "unknown_option = true";
        assert!(toml::from_str::<DriverConfig>(toml).is_err());
    }
}
