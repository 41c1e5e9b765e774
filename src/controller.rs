//! Connection controller: owns the single live serial link.
//!
//! The controller walks one link through `Closed → Opening → Probing →
//! Open → Closing` and forwards everything the device says to the output
//! sink. Freshly opened handles on some platforms report "open" before the
//! remote device is ready, so unless disabled by configuration a short
//! control write is sent right after open and its outcome decides whether
//! the connection is usable.
//!
//! All transport operations are single-flight: one async lock guards the
//! link, so open/write/close/reconfigure can never interleave against the
//! same handle. Inbound events are pumped to the sink on a separate task
//! and never block that path.

use crate::error::{CloseError, OpenError, ReconfigureError, WriteError};
use crate::sink::OutputSink;
use crate::transport::{LinkEvent, LinkFactory, SerialLink};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Control-write framing appended to every outbound message and the probe.
pub const LINE_ENDING: &str = "\r\n";

/// Payload written right after open to prove the link is usable.
pub const PROBE_MESSAGE: &str = "TestingOpen";

/// Some Windows CDC drivers complete the first overlapped write with error
/// code 121 even though the data went out. That specific failure is a false
/// negative and counts as a successful probe; its scope must not be widened
/// beyond this exact message.
pub(crate) const BENIGN_PROBE_ERROR: &str =
    "Writing to COM port (GetOverlappedResult): Unknown error code 121";

/// Lifecycle of the controller's underlying link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Opening,
    Probing,
    Open,
    Closing,
}

/// Options read once at controller construction.
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Skip the liveness probe after open.
    pub disable_probe: bool,
}

#[derive(Debug, Clone)]
struct Status {
    port: String,
    baud_rate: u32,
    state: LinkState,
}

#[derive(Default)]
struct LinkSlot {
    link: Option<Box<dyn SerialLink>>,
    pump: Option<JoinHandle<()>>,
}

/// Manages exactly one serial link at a time.
///
/// The port and baud rate persist across close/reopen cycles; only the
/// handle comes and goes.
pub struct ConnectionController {
    factory: Arc<dyn LinkFactory>,
    sink: Arc<dyn OutputSink>,
    options: ControllerOptions,
    /// Cheap mirror of port/baud/state for status displays.
    status: parking_lot::Mutex<Status>,
    /// Single-flight guard over the link and its event pump.
    io: tokio::sync::Mutex<LinkSlot>,
}

impl ConnectionController {
    pub fn new(
        port: impl Into<String>,
        baud_rate: u32,
        factory: Arc<dyn LinkFactory>,
        sink: Arc<dyn OutputSink>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            factory,
            sink,
            options,
            status: parking_lot::Mutex::new(Status {
                port: port.into(),
                baud_rate,
                state: LinkState::Closed,
            }),
            io: tokio::sync::Mutex::new(LinkSlot::default()),
        }
    }

    pub fn current_port(&self) -> String {
        self.status.lock().port.clone()
    }

    pub fn current_baud_rate(&self) -> u32 {
        self.status.lock().baud_rate
    }

    pub fn state(&self) -> LinkState {
        self.status.lock().state
    }

    /// Whether a connection is open and accepting writes.
    pub fn is_active(&self) -> bool {
        self.state() == LinkState::Open
    }

    fn set_state(&self, state: LinkState) {
        self.status.lock().state = state;
    }

    /// Open the stored port at the stored baud rate.
    ///
    /// A link that is still up is fully closed first, then the open runs
    /// again from the top; this is the path a port switch takes. Trace
    /// lines go to the sink before the attempt and after the outcome.
    pub async fn open(&self) -> Result<(), OpenError> {
        let mut slot = self.io.lock().await;

        if slot.link.as_ref().is_some_and(|link| link.is_open()) {
            let port = self.current_port();
            self.set_state(LinkState::Closing);
            self.close_slot(&mut slot)
                .await
                .map_err(|source| OpenError::Reopen { port, source })?;
        }

        let (port, baud_rate) = {
            let status = self.status.lock();
            (status.port.clone(), status.baud_rate)
        };

        self.sink
            .append_line(&format!("[Starting] Opening the serial port - {port}"));
        self.set_state(LinkState::Opening);

        let mut link = match self.factory.open(&port, baud_rate).await {
            Ok(link) => link,
            Err(source) => {
                self.sink
                    .append_line(&format!("[Error] Failed to open the serial port - {port}"));
                self.set_state(LinkState::Closed);
                return Err(OpenError::Transport { port, source });
            }
        };
        self.sink.reveal();
        slot.pump = link
            .take_events()
            .map(|events| spawn_event_pump(events, Arc::clone(&self.sink)));

        if self.options.disable_probe {
            self.sink
                .append_line("[Warning] Auto checking serial port open is disabled");
        } else {
            self.set_state(LinkState::Probing);
            let mut frame = PROBE_MESSAGE.as_bytes().to_vec();
            frame.extend_from_slice(LINE_ENDING.as_bytes());
            match link.write_bytes(&frame).await {
                Err(source) if !source.to_string().contains(BENIGN_PROBE_ERROR) => {
                    self.sink
                        .append_line(&format!("[Error] Failed to open the serial port - {port}"));
                    if let Err(close_error) = link.close().await {
                        warn!(port = %port, error = %close_error, "close after failed probe");
                    }
                    if let Some(pump) = slot.pump.take() {
                        let _ = pump.await;
                    }
                    self.set_state(LinkState::Closed);
                    return Err(OpenError::Probe { port, source });
                }
                _ => {
                    self.sink
                        .append_line(&format!("[Info] Opened the serial port - {port}"));
                }
            }
        }

        slot.link = Some(link);
        self.set_state(LinkState::Open);
        debug!(port = %port, baud = baud_rate, "serial connection opened");
        Ok(())
    }

    /// Send one line of user input.
    ///
    /// Empty input or a closed connection is a no-op success; otherwise the
    /// text is framed with CRLF and written.
    pub async fn send(&self, text: &str) -> Result<(), WriteError> {
        let mut slot = self.io.lock().await;
        if text.is_empty() {
            return Ok(());
        }
        let Some(link) = slot.link.as_mut().filter(|link| link.is_open()) else {
            return Ok(());
        };
        let mut frame = text.as_bytes().to_vec();
        frame.extend_from_slice(LINE_ENDING.as_bytes());
        link.write_bytes(&frame)
            .await
            .map(|_| ())
            .map_err(|source| WriteError {
                port: self.current_port(),
                source,
            })
    }

    /// Switch the stored port, closing any open connection.
    ///
    /// A no-op when the port is unchanged. Does not reopen; the caller
    /// decides when to open the new port.
    pub async fn change_port(&self, new_port: &str) -> Result<(), CloseError> {
        let mut slot = self.io.lock().await;
        if new_port == self.current_port() {
            return Ok(());
        }
        let old_port = {
            let mut status = self.status.lock();
            std::mem::replace(&mut status.port, new_port.to_string())
        };
        if !slot.link.as_ref().is_some_and(|link| link.is_open()) {
            return Ok(());
        }
        self.set_state(LinkState::Closing);
        self.close_slot(&mut slot)
            .await
            .map_err(|source| CloseError {
                port: old_port,
                source,
            })
    }

    /// Change the stored baud rate, reconfiguring the live link in place
    /// when one is open.
    pub async fn change_baud_rate(&self, baud_rate: u32) -> Result<(), ReconfigureError> {
        let mut slot = self.io.lock().await;
        self.status.lock().baud_rate = baud_rate;
        if let Some(link) = slot.link.as_mut().filter(|link| link.is_open()) {
            link.set_baud_rate(baud_rate)
                .await
                .map_err(|source| ReconfigureError {
                    port: self.current_port(),
                    baud_rate,
                    source,
                })?;
            debug!(port = %self.current_port(), baud = baud_rate, "baud rate changed in place");
        }
        Ok(())
    }

    /// Close the active connection.
    ///
    /// Returns `Ok(false)` when nothing was open. Local state is cleared
    /// before a close error is surfaced.
    pub async fn stop(&self) -> Result<bool, CloseError> {
        let mut slot = self.io.lock().await;
        if !slot.link.as_ref().is_some_and(|link| link.is_open()) {
            return Ok(false);
        }
        self.set_state(LinkState::Closing);
        match self.close_slot(&mut slot).await {
            Ok(()) => Ok(true),
            Err(source) => Err(CloseError {
                port: self.current_port(),
                source,
            }),
        }
    }

    /// Tear down the link and wait for the event pump to drain.
    ///
    /// State is cleared and the closing trace emitted whether or not the
    /// transport accepted the close.
    async fn close_slot(
        &self,
        slot: &mut LinkSlot,
    ) -> Result<(), crate::transport::TransportError> {
        let result = match slot.link.take() {
            Some(mut link) => link.close().await,
            None => Ok(()),
        };
        if let Some(pump) = slot.pump.take() {
            let _ = pump.await;
        }
        self.set_state(LinkState::Closed);
        self.sink.append_line("[Done] Closed the serial port\n");
        result
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status.lock();
        f.debug_struct("ConnectionController")
            .field("port", &status.port)
            .field("baud_rate", &status.baud_rate)
            .field("state", &status.state)
            .finish()
    }
}

/// Forward link events to the sink until the stream ends.
///
/// Data chunks are appended verbatim; error reports become diagnostic
/// lines. Neither transitions the connection state.
fn spawn_event_pump(
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    sink: Arc<dyn OutputSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Data(bytes) => sink.append(&String::from_utf8_lossy(&bytes)),
                LinkEvent::Error(message) => sink.append_line(&format!("[Error]{message}")),
            }
        }
    })
}
