//! Test doubles shared by unit tests and downstream crates (`testing` feature).

mod loopback;

pub use loopback::LoopbackTransport;
