use serde::{Deserialize, Serialize};

use crate::errors::LookupError;
use crate::ids::ClientId;

/// Point-in-time view of the broker's session state for one client.
///
/// `session_expiry_interval` is in seconds. Any sentinel meaning (for
/// example "never expires") is defined by the session store and is passed
/// through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub client_id: ClientId,
    pub connected: bool,
    pub session_expiry_interval: u64,
}

impl SessionSnapshot {
    pub fn new(client_id: ClientId, connected: bool, session_expiry_interval: u64) -> Self {
        Self {
            client_id,
            connected,
            session_expiry_interval,
        }
    }
}

/// Result of one asynchronous session lookup.
///
/// `Ok(None)` means no session exists for the client at lookup time.
pub type LookupOutcome = Result<Option<SessionSnapshot>, LookupError>;
