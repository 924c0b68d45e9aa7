//! Version-agnostic action routing.
//!
//! One registry serves OCPP 1.6 and 2.x: action names rarely collide between
//! generations, and payload-shape differences are resolved inside the
//! handlers, not here. The table is built once from static routing tables and
//! never mutated afterwards, which keeps dispatch deterministic. Unknown
//! actions resolve to `None`; callers must answer those with a
//! `NotImplemented` CallError, never ignore them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use voltmesh_core::protocol::actions;
use voltmesh_core::Result;

use crate::adapters::{MeteringAdapter, NotificationAdapter, NotificationKind, TransactionAdapter};
use crate::handlers::OperationHandler;

/// A bound handler capability for one action.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value>;
}

/// Immutable action-name → handler table.
pub struct ActionRegistry {
    routes: HashMap<&'static str, Arc<dyn CallHandler>>,
}

const NOTIFICATION_ROUTES: &[(&str, NotificationKind)] = &[
    (
        actions::PUBLISH_FIRMWARE_STATUS_NOTIFICATION,
        NotificationKind::PublishFirmwareStatus,
    ),
    (
        actions::DIAGNOSTICS_STATUS_NOTIFICATION,
        NotificationKind::DiagnosticsStatus,
    ),
    (actions::LOG_STATUS_NOTIFICATION, NotificationKind::LogStatus),
    (
        actions::FIRMWARE_STATUS_NOTIFICATION,
        NotificationKind::FirmwareStatus,
    ),
    (
        actions::SECURITY_EVENT_NOTIFICATION,
        NotificationKind::SecurityEvent,
    ),
];

/// Catalog actions routed straight to the injected business handler.
const GENERAL_ACTIONS: &[&str] = &[
    actions::AUTHORIZE,
    actions::BOOT_NOTIFICATION,
    actions::CLEARED_CHARGING_LIMIT,
    actions::COST_UPDATED,
    actions::DATA_TRANSFER,
    actions::GET_15118_EV_CERTIFICATE,
    actions::GET_CERTIFICATE_STATUS,
    actions::HEARTBEAT,
    actions::NOTIFY_CHARGING_LIMIT,
    actions::NOTIFY_CUSTOMER_INFORMATION,
    actions::NOTIFY_DISPLAY_MESSAGES,
    actions::NOTIFY_EV_CHARGING_NEEDS,
    actions::NOTIFY_EV_CHARGING_SCHEDULE,
    actions::NOTIFY_EVENT,
    actions::NOTIFY_MONITORING_REPORT,
    actions::NOTIFY_REPORT,
    actions::REPORT_CHARGING_PROFILES,
    actions::RESERVATION_STATUS_UPDATE,
    actions::SIGN_CERTIFICATE,
    actions::STATUS_NOTIFICATION,
];

impl ActionRegistry {
    pub fn new(
        charger_id: Arc<str>,
        transactions: Arc<TransactionAdapter>,
        metering: Arc<MeteringAdapter>,
        notifications: Arc<NotificationAdapter>,
        operations: Arc<dyn OperationHandler>,
    ) -> Self {
        let mut routes: HashMap<&'static str, Arc<dyn CallHandler>> = HashMap::new();

        routes.insert(
            actions::TRANSACTION_EVENT,
            Arc::new(TransactionEventRoute(transactions.clone())),
        );
        routes.insert(
            actions::START_TRANSACTION,
            Arc::new(StartTransactionRoute(transactions.clone())),
        );
        routes.insert(
            actions::STOP_TRANSACTION,
            Arc::new(StopTransactionRoute(transactions)),
        );

        routes.insert(actions::METER_VALUES, Arc::new(MeterValuesRoute(metering)));

        for (name, kind) in NOTIFICATION_ROUTES.iter().copied() {
            routes.insert(
                name,
                Arc::new(NotificationRoute {
                    adapter: notifications.clone(),
                    kind,
                }),
            );
        }

        for name in GENERAL_ACTIONS.iter().copied() {
            routes.insert(
                name,
                Arc::new(OperationRoute {
                    charger_id: charger_id.clone(),
                    action: name,
                    inner: operations.clone(),
                }),
            );
        }

        Self { routes }
    }

    /// Exact, case-sensitive lookup. `None` means NotImplemented.
    pub fn resolve(&self, action: &str) -> Option<Arc<dyn CallHandler>> {
        self.routes.get(action).cloned()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.routes.keys().copied().collect()
    }
}

struct TransactionEventRoute(Arc<TransactionAdapter>);

#[async_trait]
impl CallHandler for TransactionEventRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.0.on_transaction_event(payload, correlation_id).await
    }
}

struct StartTransactionRoute(Arc<TransactionAdapter>);

#[async_trait]
impl CallHandler for StartTransactionRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.0.on_start_transaction(payload, correlation_id).await
    }
}

struct StopTransactionRoute(Arc<TransactionAdapter>);

#[async_trait]
impl CallHandler for StopTransactionRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.0.on_stop_transaction(payload, correlation_id).await
    }
}

struct MeterValuesRoute(Arc<MeteringAdapter>);

#[async_trait]
impl CallHandler for MeterValuesRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.0.on_meter_values(payload, correlation_id).await
    }
}

struct NotificationRoute {
    adapter: Arc<NotificationAdapter>,
    kind: NotificationKind,
}

#[async_trait]
impl CallHandler for NotificationRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        let reply = match self.kind {
            NotificationKind::PublishFirmwareStatus => {
                self.adapter
                    .on_publish_firmware_status(payload, correlation_id)
                    .await
            }
            NotificationKind::DiagnosticsStatus => {
                self.adapter
                    .on_diagnostics_status(payload, correlation_id)
                    .await
            }
            NotificationKind::LogStatus => {
                self.adapter.on_log_status(payload, correlation_id).await
            }
            NotificationKind::FirmwareStatus => {
                self.adapter
                    .on_firmware_status(payload, correlation_id)
                    .await
            }
            NotificationKind::SecurityEvent => {
                self.adapter
                    .on_security_event(payload, correlation_id)
                    .await
            }
        };
        Ok(reply)
    }
}

struct OperationRoute {
    charger_id: Arc<str>,
    action: &'static str,
    inner: Arc<dyn OperationHandler>,
}

#[async_trait]
impl CallHandler for OperationRoute {
    async fn call(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.inner
            .handle(&self.charger_id, self.action, payload, correlation_id)
            .await
    }
}
