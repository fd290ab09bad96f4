//! Serial transport (USB/RS232 ELM327 adapters)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use obd_core::TransportKind;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{Transport, TransportDescriptor, TransportError, TransportEvent};
use crate::config::SerialConfig;

/// Serial adapter link on top of tokio-serial.
///
/// A reader task forwards incoming bytes to the broadcast channel as
/// lossy UTF-8 chunks; the driver frames them at the `>` prompt.
pub struct SerialTransport {
    config: SerialConfig,
    open: Arc<AtomicBool>,
    events_tx: broadcast::Sender<TransportEvent>,
    writer: tokio::sync::Mutex<Option<WriteHalf<SerialStream>>>,
    reader_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            config,
            open: Arc::new(AtomicBool::new(false)),
            events_tx,
            writer: tokio::sync::Mutex::new(None),
            reader_task: parking_lot::Mutex::new(None),
        }
    }

    fn spawn_reader(&self, mut reader: ReadHalf<SerialStream>) {
        let events_tx = self.events_tx.clone();
        let open = self.open.clone();
        let port = self.config.port.clone();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        tracing::debug!(port = %port, "serial stream ended");
                        break;
                    }
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        let _ = events_tx.send(TransportEvent::Data(chunk));
                    }
                    Err(err) => {
                        tracing::warn!(port = %port, error = %err, "serial read failed");
                        let _ = events_tx.send(TransportEvent::Error(err.to_string()));
                        break;
                    }
                }
            }
            open.store(false, Ordering::SeqCst);
            let _ = events_tx.send(TransportEvent::Closed);
        });
        if let Some(previous) = self.reader_task.lock().replace(handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            return Ok(());
        }
        let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .open_native_async()
            .map_err(|err| classify_serial_error(&err, &self.config.port))?;
        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);
        self.spawn_reader(reader);
        self.open.store(true, Ordering::SeqCst);
        tracing::info!(port = %self.config.port, baud = self.config.baud_rate, "serial port opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            let _ = w.shutdown().await;
        }
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events_tx.send(TransportEvent::Closed);
            tracing::info!(port = %self.config.port, "serial port closed");
        }
        Ok(())
    }

    async fn write(&self, text: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer
            .write_all(text.as_bytes())
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {
                    TransportError::Closed
                }
                _ => TransportError::WriteFailed(format!("{}: {err}", self.config.port)),
            })?;
        writer
            .flush()
            .await
            .map_err(|err| TransportError::WriteFailed(format!("{}: {err}", self.config.port)))
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            kind: TransportKind::Serial,
            endpoint: Some(self.config.port.clone()),
            bluetooth_address: None,
            bluetooth_name: None,
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
    }
}

/// Map a tokio-serial open error onto the transport taxonomy.
///
/// tokio-serial collapses most OS errors into its `Io` kind, so the
/// errno-specific cases (busy ports in particular) need a description
/// check as fallback.
fn classify_serial_error(err: &tokio_serial::Error, port: &str) -> TransportError {
    let detail = format!("{port}: {err}");
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => TransportError::NotFound(detail),
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::NotFound) => TransportError::NotFound(detail),
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::AccessDenied(detail)
        }
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::TimedOut) => TransportError::TimedOut(detail),
        _ => {
            let description = err.to_string().to_ascii_lowercase();
            if description.contains("busy") || description.contains("in use") {
                TransportError::Busy(detail)
            } else {
                TransportError::OpenFailed(detail)
            }
        }
    }
}
