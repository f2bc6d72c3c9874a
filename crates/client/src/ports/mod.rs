//! Port traits the session depends on.

pub mod transport;

pub use transport::{Endpoint, Transport, TransportError, TransportHandler};

#[cfg(any(test, feature = "testing"))]
pub use transport::MockTransport;
