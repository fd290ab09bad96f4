//! Scripted transport: canned responses for tests and demo mode

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use obd_core::TransportKind;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::{Transport, TransportDescriptor, TransportError, TransportEvent};
use crate::config::ScriptedConfig;

/// In-process adapter simulation.
///
/// Commands are matched against a response table (exact match first, then
/// prefix); the reply is delivered through the event channel framed with
/// a trailing prompt, after the configured latency. Tests can override
/// entries, swallow commands entirely (`set_silent`) to simulate a stalled
/// adapter, or fail the next write.
pub struct ScriptedTransport {
    latency: Duration,
    open: AtomicBool,
    silent: AtomicBool,
    events_tx: broadcast::Sender<TransportEvent>,
    responses: RwLock<Vec<(String, String)>>,
    fail_next_write: Mutex<Option<TransportError>>,
}

impl ScriptedTransport {
    pub fn new(config: &ScriptedConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            latency: Duration::from_millis(config.latency_ms),
            open: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            events_tx,
            responses: RwLock::new(Self::default_responses()),
            fail_next_write: Mutex::new(None),
        }
    }

    /// Override or add a canned response (command is matched normalized)
    pub fn add_response(&self, command: &str, response: &str) {
        let key = canonical(command);
        let mut responses = self.responses.write();
        responses.retain(|(c, _)| *c != key);
        // Newer entries win over the built-in table
        responses.insert(0, (key, response.to_string()));
    }

    /// Swallow subsequent commands without replying (stalled adapter)
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Make the next `write` fail with the given error
    pub fn fail_next_write(&self, error: TransportError) {
        *self.fail_next_write.lock() = Some(error);
    }

    /// Push arbitrary text to subscribers, as if the adapter sent it
    pub fn inject(&self, data: &str) {
        let _ = self.events_tx.send(TransportEvent::Data(data.to_string()));
    }

    /// Canned table mirroring a warm ELM327 v1.5 on a CAN vehicle with
    /// two stored powertrain codes.
    fn default_responses() -> Vec<(String, String)> {
        [
            ("ATZ", "ELM327 v1.5"),
            ("ATI", "ELM327 v1.5"),
            ("ATRV", "12.6V"),
            ("ATDPN", "A6"),
            ("0100", "41 00 BE 3E B8 13"),
            ("0101", "41 01 00 07 65 00"),
            ("010C", "41 0C 1A F8"),
            ("010D", "41 0D 50"),
            ("0105", "41 05 64"),
            ("010F", "41 0F 3C"),
            ("0111", "41 11 33"),
            ("0142", "41 42 30 39"),
            ("03", "43 01 33 00 44 00 00 00"),
            ("04", "44"),
        ]
        .into_iter()
        .map(|(c, r)| (c.to_string(), r.to_string()))
        .collect()
    }

    fn find_response(&self, command: &str) -> String {
        let responses = self.responses.read();
        if let Some((_, response)) = responses.iter().find(|(c, _)| *c == command) {
            return response.clone();
        }
        if let Some((_, response)) = responses.iter().find(|(c, _)| command.starts_with(c.as_str()))
        {
            return response.clone();
        }
        // Unlisted AT commands succeed; unlisted OBD requests get no data
        if command.starts_with("AT") {
            "OK".to_string()
        } else {
            "NO DATA".to_string()
        }
    }
}

fn canonical(command: &str) -> String {
    command
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<(), TransportError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events_tx.send(TransportEvent::Closed);
        }
        Ok(())
    }

    async fn write(&self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        if let Some(error) = self.fail_next_write.lock().take() {
            return Err(error);
        }
        if self.silent.load(Ordering::SeqCst) {
            return Ok(());
        }
        let command = canonical(text);
        let response = self.find_response(&command);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let _ = self
            .events_tx
            .send(TransportEvent::Data(format!("{response}\r\n>")));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            kind: TransportKind::Scripted,
            endpoint: Some("scripted".to_string()),
            bluetooth_address: None,
            bluetooth_name: None,
        }
    }
}
