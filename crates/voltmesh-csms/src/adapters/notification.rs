//! Status, diagnostics, and security notification facade.
//!
//! Five independent entry points that share one shape (a status update with
//! no transactional invariants) and one failure policy: log and acknowledge,
//! never block the connection.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use voltmesh_core::Result;

use crate::handlers::NotificationHandler;

/// Which notification surface a Call arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PublishFirmwareStatus,
    DiagnosticsStatus,
    LogStatus,
    FirmwareStatus,
    SecurityEvent,
}

pub struct NotificationAdapter {
    charger_id: Arc<str>,
    inner: Arc<dyn NotificationHandler>,
}

impl NotificationAdapter {
    pub fn new(charger_id: Arc<str>, inner: Arc<dyn NotificationHandler>) -> Self {
        Self { charger_id, inner }
    }

    pub async fn on_publish_firmware_status(&self, payload: Value, correlation_id: &str) -> Value {
        self.acknowledge(NotificationKind::PublishFirmwareStatus, payload, correlation_id)
            .await
    }

    pub async fn on_diagnostics_status(&self, payload: Value, correlation_id: &str) -> Value {
        self.acknowledge(NotificationKind::DiagnosticsStatus, payload, correlation_id)
            .await
    }

    pub async fn on_log_status(&self, payload: Value, correlation_id: &str) -> Value {
        self.acknowledge(NotificationKind::LogStatus, payload, correlation_id)
            .await
    }

    pub async fn on_firmware_status(&self, payload: Value, correlation_id: &str) -> Value {
        self.acknowledge(NotificationKind::FirmwareStatus, payload, correlation_id)
            .await
    }

    pub async fn on_security_event(&self, payload: Value, correlation_id: &str) -> Value {
        self.acknowledge(NotificationKind::SecurityEvent, payload, correlation_id)
            .await
    }

    async fn acknowledge(
        &self,
        kind: NotificationKind,
        payload: Value,
        correlation_id: &str,
    ) -> Value {
        let result = self.dispatch(kind, payload, correlation_id).await;
        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    charger = %self.charger_id,
                    ?kind,
                    error = %e,
                    "status handler failed; acknowledging anyway"
                );
                json!({})
            }
        }
    }

    async fn dispatch(
        &self,
        kind: NotificationKind,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value> {
        let charger_id = &self.charger_id;
        match kind {
            NotificationKind::PublishFirmwareStatus => {
                self.inner
                    .publish_firmware_status(charger_id, payload, correlation_id)
                    .await
            }
            NotificationKind::DiagnosticsStatus => {
                self.inner
                    .diagnostics_status(charger_id, payload, correlation_id)
                    .await
            }
            NotificationKind::LogStatus => {
                self.inner
                    .log_status(charger_id, payload, correlation_id)
                    .await
            }
            NotificationKind::FirmwareStatus => {
                self.inner
                    .firmware_status(charger_id, payload, correlation_id)
                    .await
            }
            NotificationKind::SecurityEvent => {
                self.inner
                    .security_event(charger_id, payload, correlation_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use voltmesh_core::CsmsError;

    #[derive(Default)]
    struct FlakyNotifications {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl NotificationHandler for FlakyNotifications {
        async fn publish_firmware_status(
            &self,
            _charger_id: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            self.seen.lock().unwrap().push("publish-firmware");
            Ok(json!({ "seen": true }))
        }

        async fn diagnostics_status(
            &self,
            _charger_id: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            Err(CsmsError::HandlerFailure("diagnostics store down".into()))
        }

        async fn log_status(
            &self,
            _charger_id: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            self.seen.lock().unwrap().push("log");
            Ok(json!({}))
        }

        async fn firmware_status(
            &self,
            _charger_id: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            self.seen.lock().unwrap().push("firmware");
            Ok(json!({}))
        }

        async fn security_event(
            &self,
            _charger_id: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            self.seen.lock().unwrap().push("security");
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn successful_handler_reply_is_returned() {
        let inner = Arc::new(FlakyNotifications::default());
        let adapter = NotificationAdapter::new(Arc::from("cp-1"), inner.clone());

        let reply = adapter
            .on_publish_firmware_status(json!({ "status": "Published" }), "c-1")
            .await;
        assert_eq!(reply["seen"], true);
        assert_eq!(*inner.seen.lock().unwrap(), vec!["publish-firmware"]);
    }

    #[tokio::test]
    async fn failing_handler_still_acknowledges() {
        let adapter =
            NotificationAdapter::new(Arc::from("cp-1"), Arc::new(FlakyNotifications::default()));

        let reply = adapter
            .on_diagnostics_status(json!({ "status": "Uploading" }), "c-2")
            .await;
        assert_eq!(reply, json!({}));
    }
}
