//! In-process broker host for pingscope extensions.
//!
//! The host plays the broker's side of the extension contract: it keeps
//! session state, runs the client initializer for every new connection, and
//! delivers PINGREQ packets to the interceptors registered on that
//! connection. Interceptor and extension faults are contained here; packet
//! handling never depends on them.

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod initializers;
pub mod sessions;

pub use config::HostConfig;
pub use connection::{Connection, ConnectionContext, PingResp};
pub use error::HostError;
pub use host::{ExtensionState, Host};
pub use initializers::Initializers;
pub use sessions::SessionStore;
