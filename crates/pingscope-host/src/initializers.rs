use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pingscope_core::initializer::{ClientInitializer, InitializerRegistry};
use pingscope_core::RegistrationError;
use tracing::debug;

struct Registered {
    owner: String,
    initializer: Arc<dyn ClientInitializer>,
}

/// Holds the single client initializer of the host.
///
/// Only the extension that installed the initializer may replace it.
#[derive(Default)]
pub struct Initializers {
    current: RwLock<Option<Registered>>,
    closed: AtomicBool,
}

impl Initializers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_initializer(&self) -> Option<Arc<dyn ClientInitializer>> {
        self.current
            .read()
            .as_ref()
            .map(|r| Arc::clone(&r.initializer))
    }

    /// Extension id that owns the current initializer.
    pub fn owner(&self) -> Option<String> {
        self.current.read().as_ref().map(|r| r.owner.clone())
    }

    /// Drop the initializer if `owner` installed it.
    pub fn clear_owner(&self, owner: &str) -> bool {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|r| r.owner == owner) {
            *current = None;
            debug!(extension = %owner, "client initializer removed");
            true
        } else {
            false
        }
    }

    /// Reject all further registrations.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl InitializerRegistry for Initializers {
    fn set_client_initializer(
        &self,
        owner: &str,
        initializer: Arc<dyn ClientInitializer>,
    ) -> Result<(), RegistrationError> {
        if self.is_closed() {
            return Err(RegistrationError::RegistryClosed);
        }

        let mut current = self.current.write();
        if let Some(existing) = current.as_ref() {
            if existing.owner != owner {
                return Err(RegistrationError::InitializerAlreadySet {
                    owner: existing.owner.clone(),
                });
            }
        }
        *current = Some(Registered {
            owner: owner.to_string(),
            initializer,
        });
        debug!(extension = %owner, "client initializer registered");
        Ok(())
    }
}

impl std::fmt::Debug for Initializers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializers")
            .field("owner", &self.owner())
            .field("closed", &self.is_closed())
            .finish()
    }
}
