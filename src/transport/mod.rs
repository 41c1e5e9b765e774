//! Transport abstraction layer for serial communication.
//!
//! Provides the narrow capability interface over a serial resource
//! (`SerialLink`), the factory that opens links and enumerates ports
//! (`LinkFactory`), a tokio-serial implementation, and a mock for tests.

pub mod error;
pub mod mock;
pub mod native;
pub mod traits;

pub use error::TransportError;
pub use mock::{MockLink, MockLinkFactory, MockLinkHandle};
pub use native::{NativeLinkFactory, NativeSerialLink};
pub use traits::{LinkEvent, LinkFactory, PortInfo, SerialLink};
