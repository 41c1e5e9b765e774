//! Native serial link backed by tokio-serial.
//!
//! A dedicated I/O task owns the `SerialStream`: writes, baud-rate changes
//! and the close request arrive over a command channel and are answered
//! through oneshot replies, while received bytes and driver errors are
//! emitted as `LinkEvent`s. Owning the stream in one task keeps every
//! transport operation single-flight without sharing the handle.

use super::error::TransportError;
use super::traits::{LinkEvent, LinkFactory, PortInfo, SerialLink};
use async_trait::async_trait;
use serialport::SerialPortType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const READ_BUFFER_SIZE: usize = 1024;

/// Pause after a failed read so a persistently failing driver cannot spin
/// the I/O task.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(50);

enum Command {
    Write(Vec<u8>, oneshot::Sender<Result<usize, TransportError>>),
    SetBaudRate(u32, oneshot::Sender<Result<(), TransportError>>),
    Close(oneshot::Sender<Result<(), TransportError>>),
}

/// Serial link driven by a background I/O task.
pub struct NativeSerialLink {
    name: String,
    commands: mpsc::Sender<Command>,
    open: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}

impl NativeSerialLink {
    /// Open a serial port and spawn its I/O task.
    ///
    /// # Example
    /// ```no_run
    /// use serial_monitor::transport::NativeSerialLink;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let link = NativeSerialLink::open("/dev/ttyUSB0", 115200)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let builder = tokio_serial::new(path, baud_rate);
        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => TransportError::not_found(path),
            tokio_serial::ErrorKind::InvalidInput => TransportError::config(e.to_string()),
            _ => TransportError::Io(std::io::Error::other(e.to_string())),
        })?;

        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(io_task(stream, command_rx, event_tx, Arc::clone(&open)));
        debug!(port = %path, baud = baud_rate, "serial stream opened");

        Ok(Self {
            name: path.to_string(),
            commands: command_tx,
            open,
            events: Some(event_rx),
        })
    }

    async fn dispatch<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, TransportError>>) -> Command,
    ) -> Result<T, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| TransportError::NotOpen)?;
        reply_rx.await.map_err(|_| TransportError::NotOpen)?
    }
}

#[async_trait]
impl SerialLink for NativeSerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let data = data.to_vec();
        self.dispatch(move |reply| Command::Write(data, reply)).await
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.dispatch(move |reply| Command::SetBaudRate(baud_rate, reply))
            .await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open() {
            return Ok(());
        }
        self.dispatch(Command::Close).await
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events.take()
    }
}

impl std::fmt::Debug for NativeSerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeSerialLink")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

/// The I/O task: answers commands and pushes inbound events until closed.
///
/// Read errors are reported as events without tearing the link down; the
/// link only leaves this loop on `Close` or when the handle is dropped.
async fn io_task(
    mut stream: tokio_serial::SerialStream,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<LinkEvent>,
    open: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut eof = false;
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Write(data, reply)) => {
                    let result = stream
                        .write_all(&data)
                        .await
                        .map(|_| data.len())
                        .map_err(TransportError::Io);
                    let _ = reply.send(result);
                }
                Some(Command::SetBaudRate(baud_rate, reply)) => {
                    use serialport::SerialPort;
                    let result = stream
                        .set_baud_rate(baud_rate)
                        .map_err(TransportError::Serial);
                    let _ = reply.send(result);
                }
                Some(Command::Close(reply)) => {
                    open.store(false, Ordering::SeqCst);
                    let _ = reply.send(Ok(()));
                    break;
                }
                None => break,
            },
            read = stream.read(&mut buffer), if !eof => match read {
                Ok(0) => {
                    eof = true;
                    let _ = events.send(LinkEvent::Error("serial stream ended".to_string()));
                }
                Ok(n) => {
                    let _ = events.send(LinkEvent::Data(buffer[..n].to_vec()));
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    let _ = events.send(LinkEvent::Error(e.to_string()));
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            },
        }
    }
    open.store(false, Ordering::SeqCst);
}

/// Opens `NativeSerialLink`s and enumerates system serial ports.
#[derive(Debug, Clone, Default)]
pub struct NativeLinkFactory;

impl NativeLinkFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LinkFactory for NativeLinkFactory {
    async fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn SerialLink>, TransportError> {
        Ok(Box::new(NativeSerialLink::open(path, baud_rate)?))
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    path: port.port_name,
                    manufacturer: usb.manufacturer,
                    vendor_id: Some(format!("{:04x}", usb.vid)),
                    product_id: Some(format!("{:04x}", usb.pid)),
                },
                _ => PortInfo {
                    path: port.port_name,
                    manufacturer: None,
                    vendor_id: None,
                    product_id: None,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = NativeSerialLink::open("/dev/nonexistent_link_12345", 9600);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_factory_open_missing_port_fails() {
        let factory = NativeLinkFactory::new();
        let result = factory.open("/dev/nonexistent_link_12345", 9600).await;
        assert!(result.is_err());
    }
}
