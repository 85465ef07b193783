//! Two-socket file transfer: a control connection carries the request, a
//! second connection opened back to the client carries the framed data.

pub mod client;
pub mod cmd;
pub mod error;
pub mod files;
pub mod network;
pub mod protocol;
pub mod server;

pub use cmd::{Command, Config, Endpoint, ServerConfig};
pub use error::{Error, Result};
