//! Session coordinator over the connection controller.
//!
//! Presents the external API for the monitor lifecycle: select a port,
//! open the session, send lines, change the baud rate, close. The
//! coordinator owns the controller, applies the caller-level guards the
//! controller itself does not (no port selected, already open, stale close
//! requests), and mirrors the current port/baud/active flags for status
//! displays.

use crate::config::Config;
use crate::controller::{ConnectionController, ControllerOptions};
use crate::error::SessionError;
use crate::sink::OutputSink;
use crate::transport::{LinkFactory, PortInfo};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Baud rate used when the configuration does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Baud rates offered to selection UIs. Any positive rate is accepted.
pub const RECOMMENDED_BAUD_RATES: [u32; 12] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 74880, 115200, 230400, 250000,
];

/// Vendor/product pair used for deterministic port selection.
///
/// Ids are hex strings; a `0x` prefix is accepted because providers differ
/// in how they format them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbFilter {
    pub vendor_id: String,
    pub product_id: String,
}

/// Interactive port chooser, supplied by the embedding UI.
#[async_trait]
pub trait PortPicker: Send + Sync {
    /// Pick one of the candidate ports, or none to abort selection.
    async fn pick(&self, ports: &[PortInfo]) -> Option<String>;
}

#[derive(Debug, Clone)]
struct SessionState {
    current_port: Option<String>,
    current_baud_rate: u32,
}

/// The user-facing unit of "a port is selected and possibly open".
pub struct SerialSession {
    factory: Arc<dyn LinkFactory>,
    sink: Arc<dyn OutputSink>,
    picker: Arc<dyn PortPicker>,
    options: ControllerOptions,
    state: parking_lot::Mutex<SessionState>,
    controller: parking_lot::Mutex<Option<Arc<ConnectionController>>>,
}

impl SerialSession {
    /// Build a session. The probe flag and default baud rate are read from
    /// `config` once, here.
    pub fn new(
        factory: Arc<dyn LinkFactory>,
        sink: Arc<dyn OutputSink>,
        picker: Arc<dyn PortPicker>,
        config: &Config,
    ) -> Self {
        Self {
            factory,
            sink,
            picker,
            options: ControllerOptions {
                disable_probe: config.serial.disable_probe,
            },
            state: parking_lot::Mutex::new(SessionState {
                current_port: None,
                current_baud_rate: config.serial.default_baud,
            }),
            controller: parking_lot::Mutex::new(None),
        }
    }

    /// The last selected port, which may be set while nothing is open.
    pub fn current_port(&self) -> Option<String> {
        self.state.lock().current_port.clone()
    }

    pub fn current_baud_rate(&self) -> u32 {
        self.state.lock().current_baud_rate
    }

    /// Whether a connection is currently open and accepting writes.
    pub fn is_active(&self) -> bool {
        self.controller
            .lock()
            .as_ref()
            .is_some_and(|controller| controller.is_active())
    }

    /// Record a port selection made by an external collaborator, e.g. a
    /// restored device context or an explicit caller choice.
    pub fn set_current_port(&self, path: &str) {
        self.state.lock().current_port = Some(path.to_string());
    }

    /// Select a port from the system's enumeration.
    ///
    /// With a filter, the first port whose vendor/product ids match
    /// numerically is chosen — unless a session is already active, which
    /// keeps its port. Without a filter the picker collaborator chooses
    /// from the path-sorted candidates. Returns the selected path, or
    /// `None` when no port is available or nothing was chosen.
    pub async fn select_port(
        &self,
        filter: Option<&UsbFilter>,
    ) -> Result<Option<String>, SessionError> {
        let ports = self
            .factory
            .list_ports()
            .map_err(|source| SessionError::Enumeration { source })?;
        if ports.is_empty() {
            warn!("no serial port is available");
            return Ok(None);
        }

        if let Some(filter) = filter {
            let wanted_vid = parse_hex_id(&filter.vendor_id);
            let wanted_pid = parse_hex_id(&filter.product_id);
            if wanted_vid.is_none() || wanted_pid.is_none() {
                return Ok(None);
            }
            let found = ports.iter().find(|port| {
                match (&port.vendor_id, &port.product_id) {
                    (Some(vid), Some(pid)) => {
                        parse_hex_id(vid) == wanted_vid && parse_hex_id(pid) == wanted_pid
                    }
                    _ => false,
                }
            });
            if let Some(port) = found {
                if !self.is_active() {
                    self.set_current_port(&port.path);
                    return Ok(Some(port.path.clone()));
                }
            }
            return Ok(None);
        }

        let mut candidates = ports;
        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        match self.picker.pick(&candidates).await {
            Some(path) => {
                self.set_current_port(&path);
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    /// Open the session on the selected port.
    ///
    /// Requires a prior selection. An existing connection on a different
    /// port is switched in place; one already open on the same port is
    /// left alone and signalled as `AlreadyOpen`.
    pub async fn open_session(&self) -> Result<(), SessionError> {
        let (port, baud_rate) = {
            let state = self.state.lock();
            (state.current_port.clone(), state.current_baud_rate)
        };
        let port = port.ok_or(SessionError::NoPortSelected)?;

        let controller = self.ensure_controller(&port, baud_rate);
        if controller.current_port() != port {
            controller.change_port(&port).await?;
        } else if controller.is_active() {
            return Err(SessionError::AlreadyOpen { port });
        }

        controller.open().await?;
        Ok(())
    }

    fn ensure_controller(&self, port: &str, baud_rate: u32) -> Arc<ConnectionController> {
        let mut guard = self.controller.lock();
        match guard.as_ref() {
            Some(controller) => Arc::clone(controller),
            None => {
                let controller = Arc::new(ConnectionController::new(
                    port,
                    baud_rate,
                    Arc::clone(&self.factory),
                    Arc::clone(&self.sink),
                    self.options.clone(),
                ));
                *guard = Some(Arc::clone(&controller));
                controller
            }
        }
    }

    fn active_controller(&self) -> Option<Arc<ConnectionController>> {
        self.controller.lock().as_ref().map(Arc::clone)
    }

    /// Close the session.
    ///
    /// When `port` is given and does not name the currently open port this
    /// is not applicable and returns `Ok(false)` without side effects, so a
    /// stale caller cannot tear down someone else's session. Returns
    /// whether a connection was actually closed.
    pub async fn close_session(&self, port: Option<&str>) -> Result<bool, SessionError> {
        let Some(controller) = self.active_controller() else {
            if port.is_none() {
                warn!("{}", SessionError::NotStarted);
            }
            return Ok(false);
        };
        if let Some(requested) = port {
            let active = controller.current_port();
            if requested != active {
                let mismatch = SessionError::PortMismatch {
                    requested: requested.to_string(),
                    active,
                };
                warn!(error = %mismatch, "close request ignored");
                return Ok(false);
            }
        }
        Ok(controller.stop().await?)
    }

    /// Send one line through the open session.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        match self.active_controller() {
            Some(controller) if controller.is_active() => Ok(controller.send(text).await?),
            _ => Err(SessionError::NotOpen),
        }
    }

    /// Change the session's baud rate.
    ///
    /// The rate must be a positive integer; the session must have been
    /// started at least once.
    pub async fn change_baud_rate(&self, baud_rate: u32) -> Result<(), SessionError> {
        if baud_rate == 0 {
            return Err(SessionError::InvalidRate { value: baud_rate });
        }
        let controller = self
            .active_controller()
            .ok_or(SessionError::NotStarted)?;
        controller.change_baud_rate(baud_rate).await?;
        self.state.lock().current_baud_rate = baud_rate;
        Ok(())
    }
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SerialSession")
            .field("current_port", &state.current_port)
            .field("current_baud_rate", &state.current_baud_rate)
            .field("is_active", &self.is_active())
            .finish()
    }
}

/// Parse a provider-formatted hex id, tolerating a `0x`/`0X` prefix.
fn parse_hex_id(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::transport::MockLinkFactory;
    use pretty_assertions::assert_eq;

    struct ScriptedPicker(Option<String>);

    #[async_trait]
    impl PortPicker for ScriptedPicker {
        async fn pick(&self, _ports: &[PortInfo]) -> Option<String> {
            self.0.clone()
        }
    }

    struct RecordingPicker(parking_lot::Mutex<Vec<String>>);

    #[async_trait]
    impl PortPicker for RecordingPicker {
        async fn pick(&self, ports: &[PortInfo]) -> Option<String> {
            *self.0.lock() = ports.iter().map(|p| p.path.clone()).collect();
            ports.first().map(|p| p.path.clone())
        }
    }

    fn usb_port(path: &str, vid: &str, pid: &str) -> PortInfo {
        PortInfo {
            path: path.to_string(),
            manufacturer: Some("Silicon Labs".to_string()),
            vendor_id: Some(vid.to_string()),
            product_id: Some(pid.to_string()),
        }
    }

    fn session_with(
        factory: &MockLinkFactory,
        picker: Arc<dyn PortPicker>,
    ) -> (SerialSession, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let session = SerialSession::new(
            Arc::new(factory.clone()),
            sink.clone(),
            picker,
            &Config::default(),
        );
        (session, sink)
    }

    #[test]
    fn test_parse_hex_id_tolerates_prefix_styles() {
        assert_eq!(parse_hex_id("0x10C4"), Some(0x10C4));
        assert_eq!(parse_hex_id("10C4"), Some(0x10C4));
        assert_eq!(parse_hex_id("0X10c4"), Some(0x10C4));
        assert_eq!(parse_hex_id("ea60"), Some(0xEA60));
        assert_eq!(parse_hex_id("zz"), None);
        assert_eq!(parse_hex_id(""), None);
    }

    #[tokio::test]
    async fn test_select_port_filter_matches_across_prefix_styles() {
        let factory = MockLinkFactory::with_ports(vec![
            usb_port("COM5", "0403", "6001"),
            usb_port("COM3", "0x10C4", "0xEA60"),
            usb_port("COM4", "10C4", "EA60"),
        ]);
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        let filter = UsbFilter {
            vendor_id: "10c4".to_string(),
            product_id: "ea60".to_string(),
        };
        let chosen = session.select_port(Some(&filter)).await.unwrap();

        // First structurally matching entry wins, prefix style ignored.
        assert_eq!(chosen.as_deref(), Some("COM3"));
        assert_eq!(session.current_port().as_deref(), Some("COM3"));
    }

    #[tokio::test]
    async fn test_select_port_filter_without_match() {
        let factory = MockLinkFactory::with_ports(vec![usb_port("COM5", "0403", "6001")]);
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        let filter = UsbFilter {
            vendor_id: "10C4".to_string(),
            product_id: "EA60".to_string(),
        };
        assert_eq!(session.select_port(Some(&filter)).await.unwrap(), None);
        assert_eq!(session.current_port(), None);
    }

    #[tokio::test]
    async fn test_select_port_with_no_ports() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        assert_eq!(session.select_port(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_interactive_selection_sees_sorted_candidates() {
        let factory = MockLinkFactory::with_ports(vec![
            usb_port("COM9", "0403", "6001"),
            usb_port("COM2", "0403", "6001"),
            usb_port("COM10", "0403", "6001"),
        ]);
        let picker = Arc::new(RecordingPicker(parking_lot::Mutex::new(Vec::new())));
        let (session, _sink) = session_with(&factory, picker.clone());

        let chosen = session.select_port(None).await.unwrap();

        assert_eq!(
            *picker.0.lock(),
            vec!["COM10".to_string(), "COM2".to_string(), "COM9".to_string()]
        );
        assert_eq!(chosen.as_deref(), Some("COM10"));
        assert_eq!(session.current_port().as_deref(), Some("COM10"));
    }

    #[tokio::test]
    async fn test_filtered_selection_never_hijacks_active_session() {
        let factory = MockLinkFactory::with_ports(vec![usb_port("COM8", "10C4", "EA60")]);
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();

        let filter = UsbFilter {
            vendor_id: "10C4".to_string(),
            product_id: "EA60".to_string(),
        };
        assert_eq!(session.select_port(Some(&filter)).await.unwrap(), None);
        assert_eq!(session.current_port().as_deref(), Some("COM3"));
    }

    #[tokio::test]
    async fn test_open_session_requires_selection() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        let err = session.open_session().await.unwrap_err();
        assert!(matches!(err, SessionError::NoPortSelected));
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test]
    async fn test_open_session_twice_signals_already_open() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();
        let err = session.open_session().await.unwrap_err();

        assert!(matches!(err, SessionError::AlreadyOpen { .. }));
        // The existing connection was not torn down.
        assert!(session.is_active());
        assert_eq!(factory.open_count(), 1);
    }

    #[tokio::test]
    async fn test_open_session_switches_port_in_place() {
        let factory = MockLinkFactory::new();
        let (session, sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();
        session.set_current_port("COM4");
        session.open_session().await.unwrap();

        // Close trace for COM3 comes before the open traces for COM4.
        let closed = sink.find("[Done] Closed the serial port").unwrap();
        let reopened = sink.find("[Starting] Opening the serial port - COM4").unwrap();
        assert!(closed < reopened);

        assert!(session.is_active());
        assert_eq!(session.current_port().as_deref(), Some("COM4"));
        let handles = factory.handles();
        assert_eq!(handles.len(), 2);
        assert!(!handles[0].is_open());
        assert!(handles[1].is_open());
    }

    #[tokio::test]
    async fn test_close_session_guards_against_stale_port() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();

        // Mismatched port: not applicable, no side effects.
        assert!(!session.close_session(Some("COM4")).await.unwrap());
        assert!(session.is_active());

        // Matching port closes for real.
        assert!(session.close_session(Some("COM3")).await.unwrap());
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_close_session_without_start() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        assert!(!session.close_session(None).await.unwrap());
        assert!(!session.close_session(Some("COM3")).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_requires_open_session() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, SessionError::NotOpen));
    }

    #[tokio::test]
    async fn test_send_forwards_to_controller() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();
        session.send("status").await.unwrap();

        let log = factory.last_handle().unwrap().write_log();
        assert_eq!(log.last().unwrap(), b"status\r\n");
    }

    #[tokio::test]
    async fn test_change_baud_rate_validation_order() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        // Invalid rate is rejected before the not-started check.
        let err = session.change_baud_rate(0).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidRate { value: 0 }));

        let err = session.change_baud_rate(57600).await.unwrap_err();
        assert!(matches!(err, SessionError::NotStarted));
        assert_eq!(factory.open_count(), 0);
    }

    #[tokio::test]
    async fn test_change_baud_rate_updates_session_and_link() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));

        session.set_current_port("COM3");
        session.open_session().await.unwrap();
        session.change_baud_rate(115200).await.unwrap();

        assert_eq!(session.current_baud_rate(), 115200);
        assert_eq!(factory.last_handle().unwrap().baud_rate(), 115200);
    }

    #[tokio::test]
    async fn test_default_baud_rate_from_config() {
        let factory = MockLinkFactory::new();
        let (session, _sink) = session_with(&factory, Arc::new(ScriptedPicker(None)));
        assert_eq!(session.current_baud_rate(), DEFAULT_BAUD_RATE);
        assert!(!session.is_active());
    }

    #[test]
    fn test_recommended_rates_contain_common_defaults() {
        assert!(RECOMMENDED_BAUD_RATES.contains(&9600));
        assert!(RECOMMENDED_BAUD_RATES.contains(&115200));
        assert_eq!(RECOMMENDED_BAUD_RATES.len(), 12);
    }
}
