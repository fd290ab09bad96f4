//! obd-driver - ELM327 adapter driver
//!
//! Owns everything between the raw byte stream and decoded diagnostics:
//! the transport abstraction (serial, scripted; BLE links plug in through
//! the same trait), prompt framing, the serialized command state machine,
//! the AT init sequence with protocol-profile negotiation, retry/backoff,
//! per-driver metrics, and the link supervisor (watchdog + reconnect).

pub mod config;
pub mod driver;
pub mod metrics;
pub mod profiles;
pub mod retry;
pub mod supervisor;
pub mod transport;

pub use config::{
    BluetoothConfig, DriverConfig, KeepaliveConfig, RetryConfig, ScriptedConfig, SerialConfig,
    TransportConfig, WatchdogConfig,
};
pub use driver::{Command, Elm327Driver};
pub use metrics::DriverMetrics;
pub use profiles::{profile, ObdProtocol, ProtocolProfile};
pub use retry::{backoff_delay, retry_with_policy, retry_with_policy_hooked, RetryPolicy};
pub use supervisor::LinkSupervisor;
pub use transport::{
    create_transport, ScriptedTransport, SerialTransport, Transport, TransportDescriptor,
    TransportError, TransportEvent,
};
