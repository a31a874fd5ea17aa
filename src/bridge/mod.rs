//! Client side of the PyMOL socket bridge.
//!
//! This module provides:
//! - `protocol`: Newline-delimited JSON messages and their codec
//! - `connection`: A single timeout-bounded request/response connection

mod connection;
mod protocol;

pub use connection::{Connection, Endpoint};
pub use protocol::DEFAULT_PORT;
