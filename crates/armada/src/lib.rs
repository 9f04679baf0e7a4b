//! The Armada server: accept loop, per-connection handlers, and process
//! bootstrap over the transport, protocol, and room crates.

mod error;
mod handler;
mod server;

pub use error::ArmadaError;
pub use server::Server;

/// Listening port when none is given on the command line.
pub const DEFAULT_PORT: u16 = 3000;
