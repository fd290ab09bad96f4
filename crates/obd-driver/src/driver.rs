//! ELM327 driver state machine
//!
//! One driver owns one adapter link. Commands are strictly serialized:
//! the transport is half-duplex and the adapter answers exactly one
//! request at a time, terminated by the `>` prompt. Concurrent callers
//! queue on the internal I/O mutex in arrival order.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use obd_core::{
    ConnectionSnapshot, DriverEvent, DriverState, DtcEntry, ErrorSubtype, ObdError, ObdLiveData,
    ObdResult, ObdStatus, PidReading,
};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::DriverConfig;
use crate::metrics::DriverMetrics;
use crate::profiles::{self, ObdProtocol, ProtocolProfile};
use crate::retry::{retry_with_policy, retry_with_policy_hooked};
use crate::transport::{create_transport, Transport, TransportEvent};

/// A single request to the adapter
#[derive(Debug, Clone)]
pub struct Command {
    /// Request text without the trailing CR
    pub text: String,
    pub timeout: Duration,
    /// Substring the normalized response must contain
    pub expect: Option<String>,
}

impl Command {
    pub fn new(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            timeout,
            expect: None,
        }
    }

    pub fn expecting(mut self, token: &str) -> Self {
        self.expect = Some(token.to_string());
        self
    }
}

/// State shared with the spawned frame/keepalive tasks
struct Shared {
    state: RwLock<DriverState>,
    events_tx: broadcast::Sender<DriverEvent>,
    metrics: RwLock<DriverMetrics>,
    queue_depth: AtomicUsize,
    /// Set while a command is waiting for its response
    in_flight_since: parking_lot::Mutex<Option<Instant>>,
}

impl Shared {
    fn emit(&self, event: DriverEvent) {
        let _ = self.events_tx.send(event);
    }

    fn set_state(&self, to: DriverState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            *state = to;
            from
        };
        if from != to {
            tracing::debug!(%from, %to, "driver state changed");
            self.emit(DriverEvent::StateChanged { from, to });
        }
    }
}

struct DriverIo {
    /// Framed responses from the frame task; `None` while disconnected
    frames: Option<mpsc::Receiver<String>>,
}

/// Driver for ELM327-family adapters
pub struct Elm327Driver {
    config: DriverConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    io: tokio::sync::Mutex<DriverIo>,
    frame_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    keepalive_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

// `Arc<dyn Transport>` has no `Debug`, so summarize through the descriptor
impl fmt::Debug for Elm327Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Elm327Driver")
            .field("state", &self.state())
            .field("transport", &self.transport.descriptor())
            .finish_non_exhaustive()
    }
}

impl Elm327Driver {
    /// Build a driver and its transport from configuration
    pub fn new(config: DriverConfig) -> ObdResult<Self> {
        let transport = create_transport(&config.transport)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Build a driver over an externally constructed transport (the BLE
    /// integration path)
    pub fn with_transport(transport: Arc<dyn Transport>, config: DriverConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            config,
            transport,
            shared: Arc::new(Shared {
                state: RwLock::new(DriverState::Disconnected),
                events_tx,
                metrics: RwLock::new(DriverMetrics::default()),
                queue_depth: AtomicUsize::new(0),
                in_flight_since: parking_lot::Mutex::new(None),
            }),
            io: tokio::sync::Mutex::new(DriverIo { frames: None }),
            frame_task: parking_lot::Mutex::new(None),
            keepalive_task: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> DriverState {
        *self.shared.state.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.shared.events_tx.subscribe()
    }

    pub fn metrics(&self) -> DriverMetrics {
        self.shared.metrics.read().clone()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// How long the current in-flight command has been waiting, if any
    pub fn stalled_for(&self) -> Option<Duration> {
        self.shared.in_flight_since.lock().map(|since| since.elapsed())
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let descriptor = self.transport.descriptor();
        let metrics = self.shared.metrics.read();
        ConnectionSnapshot {
            state: self.state(),
            transport: descriptor.kind,
            firmware: metrics.firmware_version.clone(),
            protocol: metrics.protocol_used.clone(),
            bluetooth_address: descriptor.bluetooth_address,
            bluetooth_name: descriptor.bluetooth_name,
        }
    }

    /// Open the link and run the init sequence.
    ///
    /// Idempotent when already connected. On link failure the connect
    /// retry policy applies; on init failure the init policy applies and
    /// exhaustion leaves the driver in `Error`.
    pub async fn connect(&self) -> ObdResult<()> {
        match self.state() {
            DriverState::Ready | DriverState::Busy => return Ok(()),
            DriverState::Error => self.shared.set_state(DriverState::Disconnected),
            _ => {}
        }
        self.shared.set_state(DriverState::Connecting);

        let open = retry_with_policy_hooked(
            &self.config.retry.connect,
            |_| async {
                self.shared.metrics.write().record_connection_attempt();
                self.transport.open().await.map_err(ObdError::from)
            },
            |attempt| tracing::info!(attempt, "opening adapter link"),
            |attempt, err| tracing::warn!(attempt, error = %err, "adapter link open failed"),
        )
        .await;
        if let Err(err) = open {
            self.shared.emit(DriverEvent::Error {
                code: err.code(),
                message: err.to_string(),
            });
            self.shared.set_state(DriverState::Error);
            self.shared.set_state(DriverState::Disconnected);
            return Err(err);
        }

        self.install_frame_channel().await;
        self.shared.set_state(DriverState::Initializing);

        match retry_with_policy(&self.config.retry.init, |_| self.init_adapter()).await {
            Ok(()) => {
                self.shared.set_state(DriverState::Ready);
                self.shared.metrics.write().record_connection();
                let firmware = self.shared.metrics.read().firmware_version.clone();
                tracing::info!(firmware = ?firmware, "adapter ready");
                self.shared.emit(DriverEvent::Connected { firmware });
                Ok(())
            }
            Err(err) => {
                let err = ObdError::InitFailed(err.to_string());
                self.shared.emit(DriverEvent::Error {
                    code: err.code(),
                    message: err.to_string(),
                });
                self.teardown().await;
                self.shared.set_state(DriverState::Error);
                Err(err)
            }
        }
    }

    /// Close the link and return to `Disconnected`
    pub async fn disconnect(&self) {
        self.stop_keepalive();
        self.teardown().await;
        if self.state() != DriverState::Disconnected {
            self.shared.set_state(DriverState::Disconnected);
            self.shared.emit(DriverEvent::Disconnected);
        }
    }

    /// Execute one command and return its framed response.
    ///
    /// Serialized with all other commands on this driver; queue position
    /// is arrival order on the internal mutex.
    pub async fn command(&self, command: &Command) -> ObdResult<String> {
        let depth = self.shared.queue_depth.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.metrics.write().record_queue_depth(depth);
        let mut io = self.io.lock().await;
        let depth = self.shared.queue_depth.fetch_sub(1, Ordering::SeqCst) - 1;
        self.shared.metrics.write().record_queue_depth(depth);

        match self.state() {
            DriverState::Ready | DriverState::Busy | DriverState::Initializing => {}
            _ => return Err(ObdError::NotConnected),
        }
        let frames = io.frames.as_mut().ok_or(ObdError::NotConnected)?;
        // Stale frames from a previous timeout would pair with the wrong
        // command
        while frames.try_recv().is_ok() {}

        let was_ready = self.state() == DriverState::Ready;
        if was_ready {
            self.shared.set_state(DriverState::Busy);
        }
        *self.shared.in_flight_since.lock() = Some(Instant::now());
        let started = Instant::now();
        let result = self.exchange(frames, command).await;
        *self.shared.in_flight_since.lock() = None;
        let duration_ms = started.elapsed().as_millis() as u64;
        if was_ready && self.state() == DriverState::Busy {
            self.shared.set_state(DriverState::Ready);
        }

        match &result {
            Ok(_) => self
                .shared
                .metrics
                .write()
                .record_success(&command.text, duration_ms),
            Err(err) => self.shared.metrics.write().record_failure(
                &command.text,
                duration_ms,
                err.code(),
                matches!(err, ObdError::CommandTimeout { .. }),
            ),
        }
        self.shared.emit(DriverEvent::CommandCompleted {
            command: command.text.clone(),
            duration_ms,
            ok: result.is_ok(),
        });
        result
    }

    async fn exchange(
        &self,
        frames: &mut mpsc::Receiver<String>,
        command: &Command,
    ) -> ObdResult<String> {
        let wire = format!("{}\r", command.text);
        self.shared.metrics.write().record_io(wire.len(), 0);
        self.transport.write(&wire).await.map_err(ObdError::from)?;

        let frame = match tokio::time::timeout(command.timeout, frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(ObdError::TransportClosed(
                    "response stream ended".to_string(),
                ))
            }
            Err(_) => {
                return Err(ObdError::CommandTimeout {
                    command: command.text.clone(),
                    timeout_ms: command.timeout.as_millis() as u64,
                })
            }
        };

        if let Some(fault) = obd_codec::detect_fault(&frame) {
            return Err(fault.to_error(&command.text));
        }
        if let Some(expect) = &command.expect {
            if !obd_codec::normalize_response(&frame).contains(expect.as_str()) {
                return Err(ObdError::CommandRejected {
                    command: command.text.clone(),
                    response: frame,
                });
            }
        }
        Ok(frame)
    }

    /// Read stored DTCs (Mode 03)
    pub async fn read_dtc(&self) -> ObdResult<Vec<DtcEntry>> {
        self.ensure_ready()?;
        let command = Command::new("03", Duration::from_millis(self.config.read_dtc_timeout_ms));
        let raw = retry_with_policy(&self.config.retry.operation, |_| self.command(&command)).await?;
        let dtcs = obd_codec::decode_dtc_frame(&raw).map_err(ObdError::from)?;
        counter!("obd_dtc_read_total").increment(1);
        self.shared.emit(DriverEvent::DtcRead { count: dtcs.len() });
        Ok(dtcs)
    }

    /// Clear stored DTCs and reset the MIL (Mode 04)
    pub async fn clear_dtc(&self) -> ObdResult<()> {
        self.ensure_ready()?;
        let command = Command::new("04", Duration::from_millis(self.config.clear_dtc_timeout_ms));
        let raw = retry_with_policy(&self.config.retry.operation, |_| self.command(&command)).await?;
        let normalized = obd_codec::normalize_response(&raw);
        if !normalized.contains("44") && !normalized.contains("OK") {
            return Err(ObdError::CommandRejected {
                command: "04".to_string(),
                response: raw,
            });
        }
        counter!("obd_dtc_cleared_total").increment(1);
        self.shared.emit(DriverEvent::DtcCleared);
        Ok(())
    }

    /// Read and decode a single PID (Mode 01)
    pub async fn read_pid(&self, pid: &str) -> ObdResult<PidReading> {
        self.ensure_ready()?;
        let pid = pid.to_ascii_uppercase();
        let command = Command::new(
            format!("01{pid}"),
            Duration::from_millis(self.config.command_timeout_ms),
        );
        let raw = retry_with_policy(&self.config.retry.operation, |_| self.command(&command)).await?;
        let payload = obd_codec::extract_payload(&raw, "01", Some(&pid)).map_err(ObdError::from)?;
        let reading = obd_codec::pid_reading(&pid, &payload).ok_or_else(|| ObdError::Parse {
            reason: format!("no decoder or malformed payload for PID {pid}"),
            raw: payload,
        })?;
        counter!("obd_pid_read_total", "pid" => pid.clone()).increment(1);
        self.shared.emit(DriverEvent::PidRead { pid });
        Ok(reading)
    }

    /// Read MIL state, DTC count and readiness monitors (Mode 01 PID 01)
    pub async fn read_status(&self) -> ObdResult<ObdStatus> {
        self.ensure_ready()?;
        let command = Command::new("0101", Duration::from_millis(self.config.command_timeout_ms));
        let raw = retry_with_policy(&self.config.retry.operation, |_| self.command(&command)).await?;
        obd_codec::decode_status(&raw).map_err(ObdError::from)
    }

    /// One pass over the core live parameters.
    ///
    /// Per-PID NO DATA or timeouts leave the field empty; transport-level
    /// failures abort the pass.
    pub async fn read_live_data(&self) -> ObdResult<ObdLiveData> {
        self.ensure_ready()?;
        Ok(ObdLiveData {
            rpm: self.sample_pid("0C").await?,
            coolant_temp: self.sample_pid("05").await?,
            intake_temp: self.sample_pid("0F").await?,
            vehicle_speed: self.sample_pid("0D").await?,
            battery_voltage: self.sample_pid("42").await?,
            throttle_position: self.sample_pid("11").await?,
            timestamp: Utc::now(),
        })
    }

    async fn sample_pid(&self, pid: &str) -> ObdResult<Option<f64>> {
        let command = Command::new(
            format!("01{pid}"),
            Duration::from_millis(self.config.live_data_timeout_ms),
        );
        match self.command(&command).await {
            Ok(raw) => Ok(obd_codec::extract_payload(&raw, "01", Some(pid))
                .ok()
                .and_then(|payload| obd_codec::parse_pid(pid, &payload))),
            Err(err)
                if matches!(
                    err.subtype(),
                    ErrorSubtype::DataError | ErrorSubtype::ProtocolError
                ) || matches!(err, ObdError::CommandTimeout { .. }) =>
            {
                tracing::debug!(pid, error = %err, "live data sample unavailable");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Adapter firmware identification (ATI)
    pub async fn identify(&self) -> ObdResult<String> {
        self.ensure_ready()?;
        let command = Command::new("ATI", Duration::from_millis(self.config.command_timeout_ms));
        let raw = self.command(&command).await?;
        let firmware = parse_firmware(&raw).ok_or_else(|| ObdError::Parse {
            reason: "empty ATI response".to_string(),
            raw: raw.clone(),
        })?;
        self.shared.metrics.write().firmware_version = Some(firmware.clone());
        Ok(firmware)
    }

    /// Adapter supply voltage (ATRV)
    pub async fn read_voltage(&self) -> ObdResult<f64> {
        self.ensure_ready()?;
        let command = Command::new("ATRV", Duration::from_millis(self.config.command_timeout_ms));
        let raw = self.command(&command).await?;
        let voltage = parse_voltage(&raw).ok_or_else(|| ObdError::Parse {
            reason: "unparseable ATRV response".to_string(),
            raw: raw.clone(),
        })?;
        self.shared.metrics.write().adapter_voltage = Some(voltage);
        Ok(voltage)
    }

    /// Start the idle keep-alive pinger, when enabled in config
    pub fn start_keepalive(self: &Arc<Self>) {
        if !self.config.keepalive.enabled {
            return;
        }
        let driver = Arc::clone(self);
        let interval = Duration::from_millis(self.config.keepalive.interval_ms);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if driver.state() != DriverState::Ready {
                    continue;
                }
                let command = Command::new(
                    driver.config.keepalive.command.clone(),
                    Duration::from_millis(driver.config.command_timeout_ms),
                );
                if let Err(err) = driver.command(&command).await {
                    tracing::debug!(error = %err, "keepalive ping failed");
                }
            }
        });
        if let Some(previous) = self.keepalive_task.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_keepalive(&self) {
        if let Some(task) = self.keepalive_task.lock().take() {
            task.abort();
        }
    }

    /// Force the transport closed; used by the watchdog to fail a stalled
    /// in-flight command. The frame task observes the close and moves the
    /// driver to `Disconnected`.
    pub(crate) async fn force_close_transport(&self) {
        if let Err(err) = self.transport.close().await {
            tracing::debug!(error = %err, "forced transport close failed");
        }
    }

    pub(crate) fn note_watchdog_trigger(&self, stalled_for: Duration) {
        self.shared.metrics.write().record_watchdog_trigger();
        self.shared.emit(DriverEvent::WatchdogTriggered {
            stalled_for_ms: stalled_for.as_millis() as u64,
        });
    }

    pub(crate) fn note_reconnect_attempt(&self, attempt: u32) {
        self.shared.metrics.write().record_reconnect_attempt();
        self.shared.emit(DriverEvent::ReconnectAttempt { attempt });
    }

    pub(crate) fn note_reconnect_failure(&self) {
        self.shared.metrics.write().record_reconnect_failure();
    }

    pub(crate) fn note_reconnect_success(&self, duration_seconds: f64) {
        self.shared
            .metrics
            .write()
            .record_reconnect_success(duration_seconds);
        self.shared.emit(DriverEvent::ReconnectSucceeded {
            duration_ms: (duration_seconds * 1_000.0) as u64,
        });
    }

    pub(crate) fn note_reconnect_exhausted(&self, error: String) {
        self.shared.emit(DriverEvent::ReconnectFailed { error });
    }

    fn ensure_ready(&self) -> ObdResult<()> {
        match self.state() {
            DriverState::Ready | DriverState::Busy => Ok(()),
            _ => Err(ObdError::NotConnected),
        }
    }

    async fn install_frame_channel(&self) {
        let (frames_tx, frames_rx) = mpsc::channel(64);
        self.io.lock().await.frames = Some(frames_rx);
        self.spawn_frame_task(frames_tx);
    }

    fn spawn_frame_task(&self, frames_tx: mpsc::Sender<String>) {
        let mut events = self.transport.subscribe();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut buffer = String::new();
            loop {
                match events.recv().await {
                    Ok(TransportEvent::Data(chunk)) => {
                        shared.metrics.write().record_io(0, chunk.len());
                        buffer.push_str(&chunk);
                        while let Some(pos) = buffer.find('>') {
                            let frame: String = buffer.drain(..=pos).collect();
                            let frame = frame.trim_end_matches('>').trim().to_string();
                            if frame.is_empty() {
                                continue;
                            }
                            if frames_tx.try_send(frame).is_err() {
                                tracing::warn!("frame queue full, dropping response frame");
                            }
                        }
                    }
                    Ok(TransportEvent::Error(message)) => {
                        tracing::warn!(error = %message, "transport reported an error");
                        shared.emit(DriverEvent::Error {
                            code: "transport_error",
                            message,
                        });
                    }
                    Ok(TransportEvent::Closed)
                    | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "transport event stream lagged");
                    }
                }
            }
            // Dropping frames_tx fails any in-flight command with a
            // transport-closed error
            let from = *shared.state.read();
            if from != DriverState::Disconnected {
                shared.set_state(DriverState::Disconnected);
                shared.emit(DriverEvent::Disconnected);
            }
        });
        if let Some(previous) = self.frame_task.lock().replace(handle) {
            previous.abort();
        }
    }

    async fn teardown(&self) {
        if let Some(task) = self.frame_task.lock().take() {
            task.abort();
        }
        self.io.lock().await.frames = None;
        if let Err(err) = self.transport.close().await {
            tracing::debug!(error = %err, "transport close failed");
        }
    }

    /// ATZ, echo/linefeed/spaces/headers off, then protocol selection and
    /// adapter identification
    async fn init_adapter(&self) -> ObdResult<()> {
        let timeout = Duration::from_millis(self.config.init_timeout_ms);

        let reset = self.command(&Command::new("ATZ", timeout)).await?;
        if let Some(firmware) = parse_firmware(&reset) {
            self.shared.metrics.write().firmware_version = Some(firmware);
        }
        // Clones need time to finish their reset banner
        if self.config.reset_settle_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.reset_settle_ms)).await;
        }

        for at in ["ATE0", "ATL0", "ATS0", "ATH0"] {
            self.command(&Command::new(at, timeout)).await?;
        }

        self.select_protocol(timeout).await?;
        self.identify_adapter(timeout).await;
        Ok(())
    }

    async fn select_protocol(&self, timeout: Duration) -> ObdResult<()> {
        let profile = match self.config.protocol {
            Some(protocol) => ProtocolProfile::single(protocol),
            None => profiles::profile(self.config.protocol_profile.as_deref()),
        };
        tracing::debug!(profile = profile.name, "selecting protocol");

        for at in &profile.init_commands {
            if let Err(err) = self.command(&Command::new(*at, timeout)).await {
                tracing::warn!(command = at, error = %err, "profile init command failed");
            }
        }

        for protocol in &profile.protocols {
            if self.try_protocol(*protocol, timeout).await {
                self.shared.metrics.write().protocol_used = Some(protocol.label().to_string());
                return Ok(());
            }
        }

        // Nothing from the profile worked; let the adapter search
        self.command(&Command::new("ATSP0", timeout)).await?;
        self.command(&Command::new("0100", timeout))
            .await
            .map_err(|err| {
                ObdError::ProtocolSelection(format!(
                    "profile '{}' exhausted and auto search failed: {err}",
                    profile.name
                ))
            })?;
        self.shared.metrics.write().protocol_used = Some(ObdProtocol::Auto.label().to_string());
        Ok(())
    }

    async fn try_protocol(&self, protocol: ObdProtocol, timeout: Duration) -> bool {
        if let Err(err) = self.command(&Command::new(protocol.at_command(), timeout)).await {
            tracing::debug!(protocol = protocol.label(), error = %err, "protocol select rejected");
            return false;
        }
        match self.command(&Command::new("0100", timeout)).await {
            Ok(_) => {
                tracing::info!(protocol = protocol.label(), "protocol verified");
                true
            }
            Err(err) => {
                tracing::debug!(protocol = protocol.label(), error = %err, "protocol probe failed");
                false
            }
        }
    }

    /// Best-effort ATI/ATRV/ATDPN; failures only log
    async fn identify_adapter(&self, timeout: Duration) {
        match self.command(&Command::new("ATI", timeout)).await {
            Ok(raw) => {
                if let Some(firmware) = parse_firmware(&raw) {
                    self.shared.metrics.write().firmware_version = Some(firmware);
                }
            }
            Err(err) => tracing::debug!(error = %err, "ATI failed"),
        }
        match self.command(&Command::new("ATRV", timeout)).await {
            Ok(raw) => {
                if let Some(voltage) = parse_voltage(&raw) {
                    self.shared.metrics.write().adapter_voltage = Some(voltage);
                }
            }
            Err(err) => tracing::debug!(error = %err, "ATRV failed"),
        }
        match self.command(&Command::new("ATDPN", timeout)).await {
            Ok(raw) => tracing::info!(protocol_number = %raw.trim(), "active protocol number"),
            Err(err) => tracing::debug!(error = %err, "ATDPN failed"),
        }
    }
}

impl Drop for Elm327Driver {
    fn drop(&mut self) {
        if let Some(task) = self.frame_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.keepalive_task.lock().take() {
            task.abort();
        }
    }
}

fn parse_firmware(frame: &str) -> Option<String> {
    frame
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn parse_voltage(frame: &str) -> Option<f64> {
    frame
        .trim()
        .trim_end_matches(['V', 'v'])
        .trim()
        .parse()
        .ok()
}
