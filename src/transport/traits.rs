//! Core traits for the serial transport abstraction.
//!
//! Defines the `SerialLink` capability interface over an open serial
//! resource and the `LinkFactory` that opens links and enumerates ports,
//! allowing both real serial ports and mock implementations to be used
//! interchangeably.

use super::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single enumerated serial device.
///
/// Vendor and product ids are kept as the provider formats them: hex
/// strings that may or may not carry a `0x` prefix depending on platform.
/// Matching against them must compare numeric values, not strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    /// Platform path or name of the device (e.g. "/dev/ttyUSB0" or "COM3").
    pub path: String,

    /// Manufacturer string, when the platform reports one.
    pub manufacturer: Option<String>,

    /// USB vendor id as a hex string, when the device is a USB port.
    pub vendor_id: Option<String>,

    /// USB product id as a hex string, when the device is a USB port.
    pub product_id: Option<String>,
}

/// Inbound events delivered by an open link, in the driver's own order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A chunk of received bytes, exactly as the driver handed them over.
    Data(Vec<u8>),
    /// A transport error report. Does not imply the link closed.
    Error(String),
}

/// Capability interface over one open serial resource.
///
/// This trait requires `Send` but not `Sync` because a link is accessed
/// exclusively (mutable access only); the controller serializes all
/// operations against it.
#[async_trait]
pub trait SerialLink: Send + std::fmt::Debug {
    /// Get the path/name this link was opened on.
    fn name(&self) -> &str;

    /// Whether the underlying resource still reports itself open.
    fn is_open(&self) -> bool;

    /// Write bytes to the link.
    ///
    /// Returns the number of bytes actually written.
    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Reconfigure the live link to a new baud rate, without reopening.
    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    /// Close the link. The resource is released even if the driver
    /// reports an error.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Take the inbound event stream.
    ///
    /// The stream ends when the link closes. Yields `None` after the
    /// first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>>;
}

/// Opens serial links and enumerates the ports available on the system.
#[async_trait]
pub trait LinkFactory: Send + Sync {
    /// Open a link on `path` at `baud_rate`.
    async fn open(
        &self,
        path: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn SerialLink>, TransportError>;

    /// List the serial ports currently present.
    fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError>;
}
