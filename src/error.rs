//! Operation-level error taxonomy.
//!
//! The transport layer reports `TransportError`; the controller wraps it
//! with the attempted operation and port, and the session layer adds its
//! own guard failures. Session variants that wrap controller errors are
//! transparent so the context the controller attached is what callers see.

use crate::transport::TransportError;
use thiserror::Error;

/// The transport failed to open, or the liveness probe failed.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The transport rejected the open request.
    #[error("Failed to open the serial port {port}: {source}")]
    Transport {
        port: String,
        #[source]
        source: TransportError,
    },

    /// The port opened but the liveness probe write failed.
    #[error("Failed to verify the serial port {port}: {source}")]
    Probe {
        port: String,
        #[source]
        source: TransportError,
    },

    /// A previous connection could not be closed before reopening.
    #[error("Failed to close {port} before reopening: {source}")]
    Reopen {
        port: String,
        #[source]
        source: TransportError,
    },
}

/// A write was rejected by the transport.
#[derive(Debug, Error)]
#[error("Failed to write to the serial port {port}: {source}")]
pub struct WriteError {
    pub port: String,
    #[source]
    pub source: TransportError,
}

/// The transport rejected a close. Local state is cleared regardless.
#[derive(Debug, Error)]
#[error("Failed to close the serial port {port}: {source}")]
pub struct CloseError {
    pub port: String,
    #[source]
    pub source: TransportError,
}

/// A live baud-rate change was rejected by the transport.
#[derive(Debug, Error)]
#[error("Failed to change the baud rate on {port} to {baud_rate}: {source}")]
pub struct ReconfigureError {
    pub port: String,
    pub baud_rate: u32,
    #[source]
    pub source: TransportError,
}

/// Session-level failures surfaced to external callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No serial port was selected before opening the session.
    #[error("No serial port was selected")]
    NoPortSelected,

    /// The session is already open for this port; nothing was reopened.
    #[error("Serial monitor is already opened for {port}")]
    AlreadyOpen { port: String },

    /// The operation requires an open session.
    #[error("Serial monitor is not open")]
    NotOpen,

    /// No session has been started yet.
    #[error("Serial monitor has not been started")]
    NotStarted,

    /// The requested baud rate is not a positive integer.
    #[error("Invalid baud rate: {value}")]
    InvalidRate { value: u32 },

    /// A request named a port other than the one currently open.
    #[error("Port {requested} does not match the open port {active}")]
    PortMismatch { requested: String, active: String },

    /// Enumerating the system's serial ports failed.
    #[error("Failed to list serial ports: {source}")]
    Enumeration {
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Close(#[from] CloseError),

    #[error(transparent)]
    Reconfigure(#[from] ReconfigureError),
}
