//! Mock serial link for testing.
//!
//! Provides a `MockLink` that simulates an open serial resource without
//! requiring hardware, and a `MockLinkFactory` that hands out scripted
//! links. Each opened link comes with a `MockLinkHandle` the test keeps:
//! it can inspect the write log, script failures, and inject inbound
//! data/error events.

use super::error::TransportError;
use super::traits::{LinkEvent, LinkFactory, PortInfo, SerialLink};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Inner state of a mock link, protected by a mutex for interior mutability.
#[derive(Debug, Default)]
struct MockLinkState {
    open: bool,
    baud_rate: u32,
    /// Log of all byte chunks written to the link.
    write_log: Vec<Vec<u8>>,
    /// Scripted outcomes for upcoming writes; unscripted writes succeed.
    write_failures: VecDeque<TransportError>,
    /// Scripted outcomes for upcoming baud-rate changes.
    reconfigure_failures: VecDeque<TransportError>,
    /// Error to report from the next close; state is cleared regardless.
    close_failure: Option<TransportError>,
    /// Sender side of the event stream; dropped on close so the stream ends.
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
}

/// Test-side handle to a `MockLink`.
///
/// # Example
/// ```
/// use serial_monitor::transport::MockLink;
///
/// let (_link, handle) = MockLink::new("MOCK0", 9600);
/// handle.push_data(b"boot ok\r\n");
/// assert!(handle.is_open());
/// ```
#[derive(Clone, Debug)]
pub struct MockLinkHandle {
    name: String,
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLinkHandle {
    /// Inject inbound bytes, as if the device sent them.
    pub fn push_data(&self, data: &[u8]) {
        let state = self.state.lock().unwrap();
        if let Some(events) = &state.events {
            let _ = events.send(LinkEvent::Data(data.to_vec()));
        }
    }

    /// Inject a driver error report.
    pub fn push_error(&self, message: &str) {
        let state = self.state.lock().unwrap();
        if let Some(events) = &state.events {
            let _ = events.send(LinkEvent::Error(message.to_string()));
        }
    }

    /// Script the next write to fail with `error`. The write is still
    /// recorded in the log before failing.
    pub fn fail_next_write(&self, error: TransportError) {
        self.state.lock().unwrap().write_failures.push_back(error);
    }

    /// Script the next baud-rate change to fail with `error`.
    pub fn fail_next_reconfigure(&self, error: TransportError) {
        self.state
            .lock()
            .unwrap()
            .reconfigure_failures
            .push_back(error);
    }

    /// Script the next close to report `error`.
    pub fn fail_close(&self, error: TransportError) {
        self.state.lock().unwrap().close_failure = Some(error);
    }

    /// Get a copy of all chunks written to the link.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    pub fn baud_rate(&self) -> u32 {
        self.state.lock().unwrap().baud_rate
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Mock serial link implementation for testing.
pub struct MockLink {
    name: String,
    state: Arc<Mutex<MockLinkState>>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}

impl MockLink {
    /// Create an already-open mock link and its test handle.
    pub fn new(name: impl Into<String>, baud_rate: u32) -> (Self, MockLinkHandle) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MockLinkState {
            open: true,
            baud_rate,
            events: Some(event_tx),
            ..Default::default()
        }));
        let name = name.into();
        let handle = MockLinkHandle {
            name: name.clone(),
            state: Arc::clone(&state),
        };
        (
            Self {
                name,
                state,
                events: Some(event_rx),
            },
            handle,
        )
    }
}

#[async_trait]
impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        state.write_log.push(data.to_vec());
        match state.write_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(data.len()),
        }
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        match state.reconfigure_failures.pop_front() {
            Some(error) => Err(error),
            None => {
                state.baud_rate = baud_rate;
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        // Ends the event stream even when the close is scripted to fail.
        state.events = None;
        match state.close_failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events.take()
    }
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    /// Errors returned by upcoming `open` calls, one each.
    open_failures: VecDeque<TransportError>,
    /// Write failures pre-loaded into the next opened link, one per open.
    first_write_failures: VecDeque<TransportError>,
    /// Handles for every link this factory has opened, in order.
    handles: Vec<MockLinkHandle>,
    open_count: usize,
}

/// Factory producing `MockLink`s, with scripted open/write outcomes.
#[derive(Clone, Default)]
pub struct MockLinkFactory {
    ports: Vec<PortInfo>,
    state: Arc<Mutex<FactoryState>>,
}

impl MockLinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `list_ports` returns the given enumeration.
    pub fn with_ports(ports: Vec<PortInfo>) -> Self {
        Self {
            ports,
            state: Arc::default(),
        }
    }

    /// Script the next `open` call to fail with `error`.
    pub fn fail_next_open(&self, error: TransportError) {
        self.state.lock().unwrap().open_failures.push_back(error);
    }

    /// Script the first write on the next opened link to fail with `error`.
    pub fn fail_first_write(&self, error: TransportError) {
        self.state
            .lock()
            .unwrap()
            .first_write_failures
            .push_back(error);
    }

    /// Number of `open` calls observed, including failed ones.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().open_count
    }

    /// Handle of the most recently opened link, if any.
    pub fn last_handle(&self) -> Option<MockLinkHandle> {
        self.state.lock().unwrap().handles.last().cloned()
    }

    /// Handles of every opened link, in open order.
    pub fn handles(&self) -> Vec<MockLinkHandle> {
        self.state.lock().unwrap().handles.clone()
    }
}

#[async_trait]
impl LinkFactory for MockLinkFactory {
    async fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn SerialLink>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.open_count += 1;
        if let Some(error) = state.open_failures.pop_front() {
            return Err(error);
        }
        let (link, handle) = MockLink::new(path, baud_rate);
        if let Some(error) = state.first_write_failures.pop_front() {
            handle.fail_next_write(error);
        }
        state.handles.push(handle);
        Ok(Box::new(link))
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        Ok(self.ports.clone())
    }
}

impl std::fmt::Debug for MockLinkFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLinkFactory")
            .field("ports", &self.ports.len())
            .field("open_count", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_logging() {
        let (mut link, handle) = MockLink::new("MOCK0", 9600);
        link.write_bytes(b"Test1").await.unwrap();
        link.write_bytes(b"Test2").await.unwrap();

        let log = handle.write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"Test1");
        assert_eq!(log[1], b"Test2");
    }

    #[tokio::test]
    async fn test_scripted_write_failure_still_logged() {
        let (mut link, handle) = MockLink::new("MOCK0", 9600);
        handle.fail_next_write(TransportError::config("refused"));

        let result = link.write_bytes(b"Probe").await;
        assert!(result.is_err());
        assert_eq!(handle.write_log(), vec![b"Probe".to_vec()]);

        // The next write succeeds again.
        link.write_bytes(b"After").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_ends_event_stream() {
        let (mut link, handle) = MockLink::new("MOCK0", 9600);
        let mut events = link.take_events().unwrap();

        handle.push_data(b"hello");
        link.close().await.unwrap();

        assert_eq!(events.recv().await, Some(LinkEvent::Data(b"hello".to_vec())));
        assert_eq!(events.recv().await, None);
        assert!(!handle.is_open());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (mut link, _handle) = MockLink::new("MOCK0", 9600);
        link.close().await.unwrap();

        let result = link.write_bytes(b"data").await;
        assert!(matches!(result, Err(TransportError::NotOpen)));
    }

    #[tokio::test]
    async fn test_factory_counts_and_scripts_opens() {
        let factory = MockLinkFactory::new();
        factory.fail_next_open(TransportError::not_found("COM9"));

        assert!(factory.open("COM9", 9600).await.is_err());
        let link = factory.open("COM3", 9600).await.unwrap();
        assert_eq!(factory.open_count(), 2);
        assert_eq!(factory.handles().len(), 1);
        assert_eq!(link.name(), "COM3");
        assert_eq!(factory.last_handle().unwrap().baud_rate(), 9600);
    }

    #[tokio::test]
    async fn test_factory_preloads_write_failure() {
        let factory = MockLinkFactory::new();
        factory.fail_first_write(TransportError::config("quirk"));

        let mut link = factory.open("COM3", 9600).await.unwrap();
        assert!(link.write_bytes(b"x").await.is_err());
        assert!(link.write_bytes(b"y").await.is_ok());
    }
}
