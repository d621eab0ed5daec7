//! Broker-side extension surface: identifiers, session snapshots, and the
//! traits through which a host and its extensions talk to each other.

pub mod errors;
pub mod extension;
pub mod ids;
pub mod initializer;
pub mod interceptor;
pub mod services;
pub mod session;

pub use errors::{panic_message, LookupError, RegistrationError};
pub use ids::{ClientId, ConnectionId};
pub use session::{LookupOutcome, SessionSnapshot};
