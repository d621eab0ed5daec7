use async_trait::async_trait;

use crate::ids::ClientId;
use crate::session::LookupOutcome;

/// Read access to the broker's session store.
///
/// Implementations complete on whatever context they own; callers must not
/// assume a particular thread.
#[async_trait]
pub trait ClientService: Send + Sync {
    async fn get_session(&self, client_id: &ClientId) -> LookupOutcome;
}
