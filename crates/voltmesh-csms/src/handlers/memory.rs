//! In-process collaborator implementations.
//!
//! Reference backend used by the binary and the tests: a charger directory,
//! a transaction ledger, a meter-sample store that upserts by sample key, a
//! notification log, and sensible default replies for the general catalog
//! actions. A deployment swaps these for database-backed implementations
//! without the protocol core noticing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::debug;

use voltmesh_core::protocol::actions;
use voltmesh_core::Result;

use crate::adapters::metering::{MeterSample, SampleKey};
use crate::handlers::{
    Charger, ChargerRepository, Collaborators, MeteringHandler, Node, NodeDirectory,
    NotificationHandler, OperationHandler, TransactionHandler,
};

/// Heartbeat interval handed out in BootNotification replies, seconds.
const BOOT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub charger_id: String,
    pub started_at: DateTime<Utc>,
    pub events: u32,
    pub stopped: bool,
}

/// All collaborator traits over in-process maps.
pub struct MemoryBackend {
    node: Option<Node>,
    features: DashMap<String, bool>,
    chargers: DashMap<String, Charger>,
    watermarks: DashMap<String, DateTime<Utc>>,
    transactions: DashMap<String, TransactionRecord>,
    samples: DashMap<SampleKey, MeterSample>,
    notifications: DashMap<&'static str, u64>,
    next_transaction_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new(
        node_id: Option<String>,
        charge_points: bool,
        charger_creation: Option<bool>,
    ) -> Self {
        let features = DashMap::new();
        features.insert(crate::admission::FEATURE_CHARGE_POINTS.to_owned(), charge_points);
        if let Some(enabled) = charger_creation {
            features.insert(crate::admission::FEATURE_CHARGER_CREATION.to_owned(), enabled);
        }
        Self {
            node: node_id.map(|id| Node { id }),
            features,
            chargers: DashMap::new(),
            watermarks: DashMap::new(),
            transactions: DashMap::new(),
            samples: DashMap::new(),
            notifications: DashMap::new(),
            next_transaction_id: AtomicU64::new(1),
        }
    }

    /// Provision a charger record (what an operator UI would do).
    pub fn insert_charger(&self, charger_id: &str) {
        self.chargers.insert(
            charger_id.to_owned(),
            Charger {
                charger_id: charger_id.to_owned(),
                connector_id: None,
            },
        );
    }

    pub fn forward_watermark(&self, charger_id: &str) -> Option<DateTime<Utc>> {
        self.watermarks.get(charger_id).map(|t| *t)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<TransactionRecord> {
        self.transactions.get(transaction_id).map(|r| r.clone())
    }

    pub fn notification_count(&self, kind: &str) -> u64 {
        self.notifications
            .iter()
            .find(|e| *e.key() == kind)
            .map(|e| *e.value())
            .unwrap_or(0)
    }

    fn note(&self, kind: &'static str) {
        *self.notifications.entry(kind).or_insert(0) += 1;
    }

    fn upsert_samples(&self, samples: Vec<MeterSample>) {
        for sample in samples {
            self.samples.insert(sample.key(), sample);
        }
    }
}

impl Collaborators {
    /// Wire every collaborator interface to one shared in-memory backend.
    pub fn from_backend(backend: Arc<MemoryBackend>) -> Self {
        Self {
            nodes: backend.clone(),
            chargers: backend.clone(),
            transactions: backend.clone(),
            metering: backend.clone(),
            notifications: backend.clone(),
            operations: backend,
        }
    }
}

#[async_trait]
impl NodeDirectory for MemoryBackend {
    async fn local_node(&self) -> Result<Option<Node>> {
        Ok(self.node.clone())
    }

    async fn feature_enabled(&self, slug: &str) -> Result<Option<bool>> {
        Ok(self.features.get(slug).map(|v| *v))
    }
}

#[async_trait]
impl ChargerRepository for MemoryBackend {
    async fn find(&self, charger_id: &str) -> Result<Option<Charger>> {
        Ok(self.chargers.get(charger_id).map(|c| c.clone()))
    }

    async fn refresh_forward_watermark(&self, charger_id: &str) -> Result<()> {
        self.watermarks.insert(charger_id.to_owned(), Utc::now());
        Ok(())
    }
}

#[async_trait]
impl TransactionHandler for MemoryBackend {
    async fn transaction_event(
        &self,
        charger_id: &str,
        payload: Value,
        correlation_id: &str,
    ) -> Result<Value> {
        let event_type = payload
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or("Updated");
        let transaction_id = payload
            .pointer("/transactionInfo/transactionId")
            .and_then(Value::as_str)
            .unwrap_or(correlation_id)
            .to_owned();

        match event_type {
            "Started" => {
                self.transactions.insert(
                    transaction_id,
                    TransactionRecord {
                        charger_id: charger_id.to_owned(),
                        started_at: Utc::now(),
                        events: 1,
                        stopped: false,
                    },
                );
            }
            "Ended" => {
                if let Some(mut record) = self.transactions.get_mut(&transaction_id) {
                    record.events += 1;
                    record.stopped = true;
                }
            }
            _ => {
                if let Some(mut record) = self.transactions.get_mut(&transaction_id) {
                    record.events += 1;
                }
            }
        }

        Ok(json!({}))
    }

    async fn start_transaction(
        &self,
        charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        self.transactions.insert(
            id.to_string(),
            TransactionRecord {
                charger_id: charger_id.to_owned(),
                started_at: Utc::now(),
                events: 1,
                stopped: false,
            },
        );
        Ok(json!({
            "transactionId": id,
            "idTagInfo": { "status": "Accepted" }
        }))
    }

    async fn stop_transaction(
        &self,
        _charger_id: &str,
        payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        let id = match payload.get("transactionId") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let Some(id) = id {
            if let Some(mut record) = self.transactions.get_mut(&id) {
                record.stopped = true;
            }
        }
        Ok(json!({ "idTagInfo": { "status": "Accepted" } }))
    }
}

#[async_trait]
impl MeteringHandler for MemoryBackend {
    async fn meter_values(
        &self,
        charger_id: &str,
        samples: Vec<MeterSample>,
        _correlation_id: &str,
    ) -> Result<Value> {
        debug!(charger = charger_id, count = samples.len(), "storing meter samples");
        self.upsert_samples(samples);
        Ok(json!({}))
    }

    async fn ingest(&self, _charger_id: &str, samples: Vec<MeterSample>) -> Result<()> {
        self.upsert_samples(samples);
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler for MemoryBackend {
    async fn publish_firmware_status(
        &self,
        _charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        self.note("publish-firmware-status");
        Ok(json!({}))
    }

    async fn diagnostics_status(
        &self,
        _charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        self.note("diagnostics-status");
        Ok(json!({}))
    }

    async fn log_status(
        &self,
        _charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        self.note("log-status");
        Ok(json!({}))
    }

    async fn firmware_status(
        &self,
        _charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        self.note("firmware-status");
        Ok(json!({}))
    }

    async fn security_event(
        &self,
        _charger_id: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        self.note("security-event");
        Ok(json!({}))
    }
}

#[async_trait]
impl OperationHandler for MemoryBackend {
    async fn handle(
        &self,
        charger_id: &str,
        action: &str,
        _payload: Value,
        _correlation_id: &str,
    ) -> Result<Value> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let reply = match action {
            actions::BOOT_NOTIFICATION => {
                if !self.chargers.contains_key(charger_id) {
                    self.insert_charger(charger_id);
                }
                json!({
                    "currentTime": now,
                    "interval": BOOT_INTERVAL_SECS,
                    "status": "Accepted"
                })
            }
            actions::HEARTBEAT => json!({ "currentTime": now }),
            actions::AUTHORIZE => json!({ "idTagInfo": { "status": "Accepted" } }),
            actions::DATA_TRANSFER => json!({ "status": "Accepted" }),
            _ => json!({}),
        };
        Ok(reply)
    }
}
