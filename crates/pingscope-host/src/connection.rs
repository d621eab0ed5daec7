//! Per-connection interceptor bookkeeping and PINGREQ dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use pingscope_core::initializer::ClientContext;
use pingscope_core::interceptor::{
    ClientInformation, PingReqInboundInput, PingReqInboundInterceptor, PingReqInboundOutput,
    PingReqPacket,
};
use pingscope_core::{panic_message, ClientId, ConnectionId};
use tracing::error;

use crate::error::HostError;

/// Broker answer to a PINGREQ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingResp;

fn same_interceptor(
    a: &Arc<dyn PingReqInboundInterceptor>,
    b: &Arc<dyn PingReqInboundInterceptor>,
) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Interceptors collected while a connection is initialized.
#[derive(Default)]
pub struct ConnectionContext {
    ping_req_inbound: Vec<Arc<dyn PingReqInboundInterceptor>>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn into_ping_req_inbound(self) -> Vec<Arc<dyn PingReqInboundInterceptor>> {
        self.ping_req_inbound
    }
}

impl ClientContext for ConnectionContext {
    fn add_ping_req_inbound_interceptor(&mut self, interceptor: Arc<dyn PingReqInboundInterceptor>) {
        if !self
            .ping_req_inbound
            .iter()
            .any(|existing| same_interceptor(existing, &interceptor))
        {
            self.ping_req_inbound.push(interceptor);
        }
    }

    fn ping_req_inbound_interceptors(&self) -> Vec<Arc<dyn PingReqInboundInterceptor>> {
        self.ping_req_inbound.clone()
    }
}

/// An open client connection as seen by the host.
pub struct Connection {
    id: ConnectionId,
    client: ClientInformation,
    session_expiry_interval: u64,
    ping_req_inbound: Vec<Arc<dyn PingReqInboundInterceptor>>,
    pings_received: AtomicU64,
    interceptor_faults: AtomicU64,
    open: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        client_id: ClientId,
        session_expiry_interval: u64,
        context: ConnectionContext,
    ) -> Self {
        Self {
            id,
            client: ClientInformation::new(client_id),
            session_expiry_interval,
            ping_req_inbound: context.into_ping_req_inbound(),
            pings_received: AtomicU64::new(0),
            interceptor_faults: AtomicU64::new(0),
            open: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn client_id(&self) -> &ClientId {
        self.client.client_id()
    }

    pub fn session_expiry_interval(&self) -> u64 {
        self.session_expiry_interval
    }

    /// Deliver a PINGREQ to every interceptor of this connection.
    ///
    /// Interceptor panics are logged and counted; the broker still answers
    /// with PINGRESP.
    pub fn receive_pingreq(&self) -> Result<PingResp, HostError> {
        if !self.is_open() {
            return Err(HostError::ConnectionClosed(self.client_id().clone()));
        }
        self.pings_received.fetch_add(1, Ordering::Relaxed);

        let input = PingReqInboundInput::new(
            self.client.clone(),
            PingReqPacket {
                connection_id: self.id.clone(),
                received_at: Utc::now(),
            },
        );
        for interceptor in &self.ping_req_inbound {
            let mut output = PingReqInboundOutput::new();
            let result = catch_unwind(AssertUnwindSafe(|| {
                interceptor.on_inbound_ping_req(&input, &mut output);
            }));
            if let Err(panic) = result {
                self.interceptor_faults.fetch_add(1, Ordering::Relaxed);
                error!(
                    interceptor = interceptor.name(),
                    client_id = %self.client_id(),
                    panic = %panic_message(panic.as_ref()),
                    "PINGREQ interceptor panicked, packet delivered unchanged"
                );
            }
        }
        Ok(PingResp)
    }

    pub fn interceptor_count(&self) -> usize {
        self.ping_req_inbound.len()
    }

    pub fn pings_received(&self) -> u64 {
        self.pings_received.load(Ordering::Relaxed)
    }

    pub fn interceptor_faults(&self) -> u64 {
        self.interceptor_faults.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("client_id", self.client_id())
            .field("interceptors", &self.interceptor_count())
            .field("open", &self.is_open())
            .finish()
    }
}
