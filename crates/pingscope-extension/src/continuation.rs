//! Completion side of a PINGREQ observation: await the session lookup and
//! log what it returned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use pingscope_core::services::ClientService;
use pingscope_core::{panic_message, ClientId, LookupError, LookupOutcome};
use tracing::{error, info};

/// Which branch a completed lookup took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupReport {
    SessionFound,
    NoSession,
    Failed,
}

/// Run one session lookup and report its outcome.
///
/// A panic inside the lookup is reported like any other lookup failure.
pub async fn lookup_and_report(service: Arc<dyn ClientService>, client_id: ClientId) -> LookupReport {
    let outcome = match AssertUnwindSafe(service.get_session(&client_id))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Err(LookupError::Panicked(panic_message(panic.as_ref()))),
    };
    report_lookup_outcome(&client_id, outcome)
}

/// Log a lookup outcome. Errors end here; nothing is retried or returned.
pub fn report_lookup_outcome(client_id: &ClientId, outcome: LookupOutcome) -> LookupReport {
    match outcome {
        Ok(Some(session)) => {
            info!(
                client_id = %session.client_id,
                connected = session.connected,
                session_expiry_interval = session.session_expiry_interval,
                "session found"
            );
            LookupReport::SessionFound
        }
        Ok(None) => {
            info!(client_id = %client_id, "no session found");
            LookupReport::NoSession
        }
        Err(err) => {
            error!(
                client_id = %client_id,
                error = %err,
                error_kind = err.error_kind(),
                "session lookup failed"
            );
            LookupReport::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pingscope_core::SessionSnapshot;
    use pingscope_telemetry::{capture_subscriber, LogQuery};

    fn id(s: &str) -> ClientId {
        ClientId::from_raw(s)
    }

    fn by_message(message: &str) -> LogQuery {
        LogQuery {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    #[test]
    fn existing_session_logs_identity_flag_and_expiry() {
        let (subscriber, sink) = capture_subscriber(16);
        let report = tracing::subscriber::with_default(subscriber, || {
            report_lookup_outcome(
                &id("client-42"),
                Ok(Some(SessionSnapshot::new(id("client-42"), true, 3600))),
            )
        });

        assert_eq!(report, LookupReport::SessionFound);
        let found = sink.query(&by_message("session found"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].level, "INFO");
        assert_eq!(found[0].client_id.as_deref(), Some("client-42"));
        assert_eq!(found[0].field("connected"), Some(&serde_json::json!(true)));
        assert_eq!(
            found[0].field("session_expiry_interval"),
            Some(&serde_json::json!(3600))
        );
    }

    #[test]
    fn disconnected_session_reports_false_flag() {
        let (subscriber, sink) = capture_subscriber(16);
        tracing::subscriber::with_default(subscriber, || {
            report_lookup_outcome(
                &id("offline"),
                Ok(Some(SessionSnapshot::new(id("offline"), false, 120))),
            )
        });
        let found = sink.query(&by_message("session found"));
        assert_eq!(found[0].field("connected"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn expiry_sentinel_is_logged_unchanged() {
        let (subscriber, sink) = capture_subscriber(16);
        tracing::subscriber::with_default(subscriber, || {
            report_lookup_outcome(
                &id("forever"),
                Ok(Some(SessionSnapshot::new(id("forever"), true, u64::from(u32::MAX)))),
            )
        });
        let found = sink.query(&by_message("session found"));
        assert_eq!(
            found[0].field("session_expiry_interval"),
            Some(&serde_json::json!(u32::MAX))
        );
    }

    #[test]
    fn missing_session_logs_one_record_naming_client() {
        let (subscriber, sink) = capture_subscriber(16);
        let report = tracing::subscriber::with_default(subscriber, || {
            report_lookup_outcome(&id("client-99"), Ok(None))
        });

        assert_eq!(report, LookupReport::NoSession);
        let missing = sink.query(&by_message("no session found"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].client_id.as_deref(), Some("client-99"));
        assert!(sink.query(&by_message("session found")).is_empty());
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn failure_logs_error_with_detail() {
        let (subscriber, sink) = capture_subscriber(16);
        let report = tracing::subscriber::with_default(subscriber, || {
            report_lookup_outcome(
                &id("client-7"),
                Err(LookupError::Unavailable("replica down".into())),
            )
        });

        assert_eq!(report, LookupReport::Failed);
        let errors = sink.query(&LogQuery {
            level: Some("ERROR".into()),
            ..Default::default()
        });
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "session lookup failed");
        assert_eq!(errors[0].client_id.as_deref(), Some("client-7"));
        assert_eq!(
            errors[0].field("error").and_then(|v| v.as_str()),
            Some("session store unavailable: replica down")
        );
        assert_eq!(
            errors[0].field("error_kind").and_then(|v| v.as_str()),
            Some("unavailable")
        );
    }

    struct FixedService(LookupOutcome);

    #[async_trait]
    impl ClientService for FixedService {
        async fn get_session(&self, _client_id: &ClientId) -> LookupOutcome {
            self.0.clone()
        }
    }

    struct PanickingService;

    #[async_trait]
    impl ClientService for PanickingService {
        async fn get_session(&self, _client_id: &ClientId) -> LookupOutcome {
            panic!("store corrupted")
        }
    }

    #[tokio::test]
    async fn lookup_and_report_follows_service_outcome() {
        let service: Arc<dyn ClientService> = Arc::new(FixedService(Ok(None)));
        assert_eq!(
            lookup_and_report(service, id("client-99")).await,
            LookupReport::NoSession
        );

        let service: Arc<dyn ClientService> = Arc::new(FixedService(Err(LookupError::Cancelled)));
        assert_eq!(
            lookup_and_report(service, id("client-1")).await,
            LookupReport::Failed
        );
    }

    #[tokio::test]
    async fn panicking_lookup_is_reported_as_failure() {
        let (subscriber, sink) = capture_subscriber(16);
        let _guard = tracing::subscriber::set_default(subscriber);

        let report = lookup_and_report(Arc::new(PanickingService), id("client-3")).await;
        assert_eq!(report, LookupReport::Failed);

        let errors = sink.query(&by_message("session lookup failed"));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].field("error_kind").and_then(|v| v.as_str()),
            Some("panicked")
        );
        assert!(errors[0]
            .field("error")
            .and_then(|v| v.as_str())
            .is_some_and(|e| e.contains("store corrupted")));
    }
}
