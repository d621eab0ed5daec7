use std::sync::Arc;

use crate::errors::RegistrationError;
use crate::ids::ConnectionId;
use crate::interceptor::{ClientInformation, PingReqInboundInterceptor};

/// Facts about a connection that is being initialized.
#[derive(Clone, Debug)]
pub struct InitializerInput {
    pub client_information: ClientInformation,
    pub connection_id: ConnectionId,
}

/// Per-connection registration point for interceptors.
pub trait ClientContext {
    /// Attach a PINGREQ interceptor for the lifetime of the connection.
    /// Adding the same interceptor twice has no effect.
    fn add_ping_req_inbound_interceptor(&mut self, interceptor: Arc<dyn PingReqInboundInterceptor>);

    fn ping_req_inbound_interceptors(&self) -> Vec<Arc<dyn PingReqInboundInterceptor>>;
}

/// Runs once for every new connection, before any packet of that
/// connection reaches an interceptor.
pub trait ClientInitializer: Send + Sync {
    fn initialize(&self, input: &InitializerInput, context: &mut dyn ClientContext);
}

/// Host capability for installing a [`ClientInitializer`].
pub trait InitializerRegistry: Send + Sync {
    fn set_client_initializer(
        &self,
        owner: &str,
        initializer: Arc<dyn ClientInitializer>,
    ) -> Result<(), RegistrationError>;
}
