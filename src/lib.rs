//! Serial Monitor Session Core
//!
//! This library manages a single logical serial-port connection to an
//! attached microcontroller: opening (with a post-open liveness probe),
//! closing, switching port or baud rate, and streaming bidirectional data
//! to an output sink.
//!
//! # Modules
//!
//! - `config`: TOML configuration with environment overrides
//! - `controller`: the connection state machine over one serial link
//! - `error`: typed error taxonomy for controller and session operations
//! - `session`: the session coordinator exposed to UI/CLI layers
//! - `sink`: the append-only output target the monitor writes into
//! - `transport`: serial link abstraction (tokio-serial native impl + mock)
//!
//! # Example
//!
//! ```no_run
//! use serial_monitor::config::Config;
//! use serial_monitor::session::{PortPicker, SerialSession};
//! use serial_monitor::sink::TracingSink;
//! use serial_monitor::transport::{NativeLinkFactory, PortInfo};
//! use std::sync::Arc;
//!
//! struct FirstPort;
//!
//! #[async_trait::async_trait]
//! impl PortPicker for FirstPort {
//!     async fn pick(&self, ports: &[PortInfo]) -> Option<String> {
//!         ports.first().map(|p| p.path.clone())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SerialSession::new(
//!     Arc::new(NativeLinkFactory::new()),
//!     Arc::new(TracingSink),
//!     Arc::new(FirstPort),
//!     &Config::load()?,
//! );
//! if session.select_port(None).await?.is_some() {
//!     session.open_session().await?;
//!     session.send("hello").await?;
//!     session.close_session(None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod session;
pub mod sink;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError, LoggingSettings, SerialSettings};
pub use controller::{
    ConnectionController, ControllerOptions, LinkState, LINE_ENDING, PROBE_MESSAGE,
};
pub use error::{CloseError, OpenError, ReconfigureError, SessionError, WriteError};
pub use session::{
    PortPicker, SerialSession, UsbFilter, DEFAULT_BAUD_RATE, RECOMMENDED_BAUD_RATES,
};
pub use sink::{MemorySink, OutputSink, TracingSink};
pub use transport::{
    LinkEvent, LinkFactory, MockLink, MockLinkFactory, MockLinkHandle, NativeLinkFactory,
    NativeSerialLink, PortInfo, SerialLink, TransportError,
};
