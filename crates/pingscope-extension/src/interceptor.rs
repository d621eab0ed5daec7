use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use pingscope_core::interceptor::{
    PingReqInboundInput, PingReqInboundInterceptor, PingReqInboundOutput,
};
use pingscope_core::services::ClientService;
use pingscope_core::{panic_message, ClientId};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::continuation::{lookup_and_report, LookupReport};

pub const INTERCEPTOR_NAME: &str = "pingscope-pingreq";

/// Logs every inbound PINGREQ and reports the sender's session state.
///
/// The lookup runs as a task on `runtime`; the packet path only spawns it.
/// One instance is shared by all connections and holds no per-call state.
pub struct PingReqInterceptor {
    client_service: Arc<dyn ClientService>,
    runtime: Handle,
}

impl PingReqInterceptor {
    pub fn new(client_service: Arc<dyn ClientService>, runtime: Handle) -> Self {
        Self {
            client_service,
            runtime,
        }
    }

    /// Log the ping and start exactly one session lookup for `client_id`.
    ///
    /// The returned handle is not needed on the packet path; dropping it
    /// detaches the lookup.
    pub fn observe(&self, client_id: &ClientId) -> JoinHandle<LookupReport> {
        info!(client_id = %client_id, "intercepted PINGREQ packet");

        let span = info_span!("session_lookup", client_id = %client_id);
        let lookup = lookup_and_report(Arc::clone(&self.client_service), client_id.clone());
        self.runtime.spawn(lookup.instrument(span))
    }
}

impl PingReqInboundInterceptor for PingReqInterceptor {
    fn name(&self) -> &str {
        INTERCEPTOR_NAME
    }

    fn on_inbound_ping_req(&self, input: &PingReqInboundInput, _output: &mut PingReqInboundOutput) {
        let client_id = input.client_information().client_id();
        let observed = catch_unwind(AssertUnwindSafe(|| {
            drop(self.observe(client_id));
        }));
        if let Err(panic) = observed {
            error!(
                client_id = %client_id,
                panic = %panic_message(panic.as_ref()),
                "PINGREQ interception failed"
            );
        }
    }
}

impl std::fmt::Debug for PingReqInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingReqInterceptor").finish_non_exhaustive()
    }
}
