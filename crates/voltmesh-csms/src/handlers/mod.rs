//! Collaborator interfaces consumed by the protocol core.
//!
//! The session core never touches persistence directly: every Charger,
//! Transaction, or MeterValue mutation goes through one of these traits, and
//! the business side injects implementations at startup. `handlers::memory`
//! provides the in-process defaults used by the binary and the tests.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use voltmesh_core::Result;

use crate::adapters::metering::MeterSample;

/// Local node identity.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
}

/// A charge point known to this node. Referenced, not owned, by the protocol
/// core; only adapters mutate the backing records.
#[derive(Debug, Clone)]
pub struct Charger {
    pub charger_id: String,
    pub connector_id: Option<u32>,
}

/// Node identity and feature-flag lookups.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// The node this process runs as, if one is configured.
    async fn local_node(&self) -> Result<Option<Node>>;

    /// Feature flag lookup by slug. `None` means the flag is not configured
    /// at all, which callers may treat differently from an explicit `false`.
    async fn feature_enabled(&self, slug: &str) -> Result<Option<bool>>;
}

/// Charger lookup and forwarding-liveness bookkeeping.
#[async_trait]
pub trait ChargerRepository: Send + Sync {
    async fn find(&self, charger_id: &str) -> Result<Option<Charger>>;

    /// Refresh the forwarding watermark for a relayed charger so liveness can
    /// be monitored. Called after each successful relay.
    async fn refresh_forward_watermark(&self, charger_id: &str) -> Result<()>;
}

/// Transaction lifecycle business logic (external collaborator).
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// OCPP 2.x TransactionEvent (Started/Updated/Ended).
    async fn transaction_event(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    /// OCPP 1.6 StartTransaction.
    async fn start_transaction(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    /// OCPP 1.6 StopTransaction.
    async fn stop_transaction(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;
}

/// Meter-sample persistence (external collaborator).
///
/// Implementations must upsert by [`MeterSample::key`] so resubmitting an
/// identical payload never creates duplicate persisted samples.
#[async_trait]
pub trait MeteringHandler: Send + Sync {
    /// OCPP 1.6 MeterValues surface; returns the business-level reply.
    async fn meter_values(
        &self,
        charger_id: &str,
        samples: Vec<MeterSample>,
        correlation_id: &str,
    ) -> Result<Value>;

    /// Samples extracted from a 2.x TransactionEvent; no reply of their own.
    async fn ingest(&self, charger_id: &str, samples: Vec<MeterSample>) -> Result<()>;
}

/// Status / diagnostics / security notification business logic.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn publish_firmware_status(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    async fn diagnostics_status(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    async fn log_status(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    async fn firmware_status(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;

    async fn security_event(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;
}

/// Catch-all business handler for catalog actions without a dedicated
/// adapter (Authorize, BootNotification, Heartbeat, StatusNotification, the
/// certificate and notify/report families, ...).
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(
        &self,
        charger_id: &str,
        action: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value>;
}

/// Transport toward the charger's primary CSMS when this node relays.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Send an already-encoded frame upstream, verbatim.
    async fn send_raw(&self, charger_id: &str, raw: &str) -> Result<()>;
}

/// Bundle of collaborator implementations wired in at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub nodes: Arc<dyn NodeDirectory>,
    pub chargers: Arc<dyn ChargerRepository>,
    pub transactions: Arc<dyn TransactionHandler>,
    pub metering: Arc<dyn MeteringHandler>,
    pub notifications: Arc<dyn NotificationHandler>,
    pub operations: Arc<dyn OperationHandler>,
}
