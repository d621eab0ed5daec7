use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use pingscope_core::extension::{
    ExtensionInformation, ExtensionMain, ExtensionStartInput, ExtensionStartOutput,
    ExtensionStopInput, ExtensionStopOutput,
};
use pingscope_core::initializer::{ClientContext, ClientInitializer, InitializerInput};
use pingscope_core::interceptor::PingReqInboundInterceptor;
use pingscope_core::{panic_message, RegistrationError};
use tracing::{error, info};

use crate::interceptor::PingReqInterceptor;

/// Identity this extension is loaded under unless the host says otherwise.
pub fn extension_information() -> ExtensionInformation {
    ExtensionInformation {
        id: env!("CARGO_PKG_NAME").to_string(),
        name: "PingScope Extension".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        author: None,
    }
}

/// Attaches the shared PINGREQ interceptor to every new connection.
pub struct PingReqInitializer {
    interceptor: Arc<dyn PingReqInboundInterceptor>,
}

impl PingReqInitializer {
    pub fn new(interceptor: Arc<dyn PingReqInboundInterceptor>) -> Self {
        Self { interceptor }
    }
}

impl ClientInitializer for PingReqInitializer {
    fn initialize(&self, _input: &InitializerInput, context: &mut dyn ClientContext) {
        context.add_ping_req_inbound_interceptor(Arc::clone(&self.interceptor));
    }
}

/// Lifecycle entry points. Start failures are logged and swallowed so the
/// host keeps running without the interceptor.
#[derive(Debug, Default)]
pub struct PingScopeExtension;

impl PingScopeExtension {
    pub fn new() -> Self {
        Self
    }

    fn register(input: &ExtensionStartInput) -> Result<(), RegistrationError> {
        let services = &input.services;
        let interceptor = Arc::new(PingReqInterceptor::new(
            Arc::clone(&services.client_service),
            services.runtime.clone(),
        ));
        services.initializer_registry.set_client_initializer(
            &input.extension_information.id,
            Arc::new(PingReqInitializer::new(interceptor)),
        )
    }
}

impl ExtensionMain for PingScopeExtension {
    fn extension_start(&self, input: &ExtensionStartInput, _output: &mut ExtensionStartOutput) {
        let information = &input.extension_information;
        let registered = catch_unwind(AssertUnwindSafe(|| Self::register(input)))
            .unwrap_or_else(|panic| Err(RegistrationError::Internal(panic_message(panic.as_ref()))));

        match registered {
            Ok(()) => info!(
                extension = %information.name,
                version = %information.version,
                "extension started"
            ),
            Err(err) => error!(
                extension = %information.name,
                error = %err,
                "extension start failed"
            ),
        }
    }

    fn extension_stop(&self, input: &ExtensionStopInput, _output: &mut ExtensionStopOutput) {
        let information = &input.extension_information;
        info!(
            extension = %information.name,
            version = %information.version,
            "extension stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pingscope_core::initializer::InitializerRegistry;
    use pingscope_core::ClientId;
    use pingscope_host::{ExtensionState, Host, HostConfig};
    use pingscope_telemetry::{capture_subscriber, LogQuery, MemoryLogSink};
    use tokio::runtime::Handle;

    use crate::interceptor::INTERCEPTOR_NAME;

    fn by_message(sink: &MemoryLogSink, message: &str) -> Vec<pingscope_telemetry::LogRecord> {
        sink.query(&LogQuery {
            message: Some(message.into()),
            ..Default::default()
        })
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn load(host: &Host) -> ExtensionState {
        host.load_extension(extension_information(), Arc::new(PingScopeExtension::new()))
            .unwrap()
    }

    #[test]
    fn information_comes_from_crate_metadata() {
        let information = extension_information();
        assert_eq!(information.id, "pingscope-extension");
        assert_eq!(information.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn start_registers_interceptor_for_new_connections() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        assert_eq!(load(&host), ExtensionState::Started);
        assert_eq!(host.initializers().owner().as_deref(), Some("pingscope-extension"));

        let connection = host.connect(ClientId::from_raw("client-1"), 60).unwrap();
        assert_eq!(connection.interceptor_count(), 1);

        let started = by_message(&sink, "extension started");
        assert_eq!(started.len(), 1);
        assert_eq!(
            started[0].field("version").and_then(|v| v.as_str()),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn n_pings_yield_n_hooks_and_n_continuations() {
        let (subscriber, sink) = capture_subscriber(256);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        load(&host);
        let client = ClientId::from_raw("client-42");
        let connection = host.connect(client.clone(), 3600).unwrap();

        for _ in 0..6 {
            connection.receive_pingreq().unwrap();
        }
        assert_eq!(by_message(&sink, "intercepted PINGREQ packet").len(), 6);

        wait_until(|| by_message(&sink, "session found").len() == 6).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(host.sessions().lookup_count(&client), 6);
        let found = by_message(&sink, "session found");
        assert_eq!(found.len(), 6);
        assert!(found.iter().all(|r| r.client_id.as_deref() == Some("client-42")
            && r.field("connected") == Some(&serde_json::json!(true))
            && r.field("session_expiry_interval") == Some(&serde_json::json!(3600))));
    }

    #[tokio::test]
    async fn ping_from_client_without_session_reports_absence() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        load(&host);
        let connection = host.connect(ClientId::from_raw("client-99"), 0).unwrap();
        // Session vanished between connect and ping.
        host.sessions().remove(&ClientId::from_raw("client-99"));

        connection.receive_pingreq().unwrap();
        wait_until(|| !by_message(&sink, "no session found").is_empty()).await;

        let missing = by_message(&sink, "no session found");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].client_id.as_deref(), Some("client-99"));
        assert!(by_message(&sink, "session found").is_empty());
    }

    #[tokio::test]
    async fn lookup_failures_never_reach_the_packet_path() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        load(&host);
        let client = ClientId::from_raw("flaky");
        let connection = host.connect(client.clone(), 0).unwrap();
        host.sessions().fail_lookups_for(
            client.clone(),
            pingscope_core::LookupError::Unavailable("store down".into()),
        );

        assert!(connection.receive_pingreq().is_ok());
        wait_until(|| !by_message(&sink, "session lookup failed").is_empty()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(connection.interceptor_faults(), 0);
        assert_eq!(host.sessions().lookup_count(&client), 1);
        assert_eq!(by_message(&sink, "session lookup failed")[0].level, "ERROR");
    }

    #[tokio::test]
    async fn registration_fault_is_logged_and_host_keeps_running() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        host.initializers().close();

        assert_eq!(load(&host), ExtensionState::Started);
        let failed = by_message(&sink, "extension start failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].level, "ERROR");
        assert_eq!(
            failed[0].field("error").and_then(|v| v.as_str()),
            Some("initializer registry is closed")
        );
        assert!(by_message(&sink, "extension started").is_empty());

        let connection = host.connect(ClientId::from_raw("c"), 0).unwrap();
        assert_eq!(connection.interceptor_count(), 0);
        assert!(connection.receive_pingreq().is_ok());
    }

    #[tokio::test]
    async fn initializer_owned_by_another_extension_is_a_registration_fault() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        host.initializers()
            .set_client_initializer(
                "other-extension",
                Arc::new(PingReqInitializer::new(Arc::new(PingReqInterceptor::new(
                    host.sessions().clone(),
                    Handle::current(),
                )))),
            )
            .unwrap();

        load(&host);
        let failed = by_message(&sink, "extension start failed");
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .field("error")
            .and_then(|v| v.as_str())
            .is_some_and(|e| e.contains("other-extension")));
    }

    #[tokio::test]
    async fn stop_logs_name_and_version() {
        let (subscriber, sink) = capture_subscriber(64);
        let _guard = tracing::subscriber::set_default(subscriber);

        let host = Host::new(HostConfig::default(), Handle::current());
        load(&host);
        host.stop_extension("pingscope-extension").unwrap();

        let stopped = by_message(&sink, "extension stopped");
        assert_eq!(stopped.len(), 1);
        assert_eq!(
            stopped[0].field("extension").and_then(|v| v.as_str()),
            Some("PingScope Extension")
        );
        assert!(host.initializers().client_initializer().is_none());
    }

    #[tokio::test]
    async fn initializer_attaches_the_same_interceptor_everywhere() {
        let host = Host::new(HostConfig::default(), Handle::current());
        load(&host);
        let a = host.connect(ClientId::from_raw("a"), 0).unwrap();
        let b = host.connect(ClientId::from_raw("b"), 0).unwrap();
        assert_eq!(a.interceptor_count(), 1);
        assert_eq!(b.interceptor_count(), 1);
        assert_eq!(INTERCEPTOR_NAME, "pingscope-pingreq");
    }
}
