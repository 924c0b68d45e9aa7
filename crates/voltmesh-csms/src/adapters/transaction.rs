//! Transaction lifecycle facade.
//!
//! Three entry points, one per OCPP surface: `TransactionEvent` (2.x) and
//! `StartTransaction` / `StopTransaction` (1.6). Each is a pure pass-through
//! that preserves the correlation id and returns the handler's reply
//! untouched. Handler errors propagate: the session converts them into a
//! CallError while keeping the connection alive.

use std::sync::Arc;

use serde_json::Value;

use voltmesh_core::Result;

use crate::adapters::metering::normalize_meter_values;
use crate::handlers::{MeteringHandler, TransactionHandler};

pub struct TransactionAdapter {
    charger_id: Arc<str>,
    inner: Arc<dyn TransactionHandler>,
    metering: Arc<dyn MeteringHandler>,
}

impl TransactionAdapter {
    pub fn new(
        charger_id: Arc<str>,
        inner: Arc<dyn TransactionHandler>,
        metering: Arc<dyn MeteringHandler>,
    ) -> Self {
        Self {
            charger_id,
            inner,
            metering,
        }
    }

    /// OCPP 2.x TransactionEvent. Meter samples embedded in the event go
    /// through the same normalization routine as 1.6 MeterValues.
    pub async fn on_transaction_event(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        let reply = self
            .inner
            .transaction_event(&self.charger_id, payload.clone(), correlation_id)
            .await?;

        let samples = normalize_meter_values(&self.charger_id, &payload);
        if !samples.is_empty() {
            self.metering.ingest(&self.charger_id, samples).await?;
        }

        Ok(reply)
    }

    /// OCPP 1.6 StartTransaction.
    pub async fn on_start_transaction(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.inner
            .start_transaction(&self.charger_id, payload, correlation_id)
            .await
    }

    /// OCPP 1.6 StopTransaction.
    pub async fn on_stop_transaction(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        self.inner
            .stop_transaction(&self.charger_id, payload, correlation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use voltmesh_core::CsmsError;

    use crate::adapters::metering::MeterSample;

    #[derive(Default)]
    struct RecordingTx {
        calls: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl TransactionHandler for RecordingTx {
        async fn transaction_event(
            &self,
            _charger_id: &str,
            _payload: Value,
            correlation_id: &str,
        ) -> Result<Value> {
            if self.fail {
                return Err(CsmsError::HandlerFailure("ledger unavailable".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push(("event".into(), correlation_id.into()));
            Ok(json!({}))
        }

        async fn start_transaction(
            &self,
            _charger_id: &str,
            _payload: Value,
            correlation_id: &str,
        ) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(("start".into(), correlation_id.into()));
            Ok(json!({ "transactionId": 7, "idTagInfo": { "status": "Accepted" } }))
        }

        async fn stop_transaction(
            &self,
            _charger_id: &str,
            _payload: Value,
            correlation_id: &str,
        ) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(("stop".into(), correlation_id.into()));
            Ok(json!({ "idTagInfo": { "status": "Accepted" } }))
        }
    }

    #[derive(Default)]
    struct RecordingMeter {
        ingested: Mutex<Vec<MeterSample>>,
    }

    #[async_trait]
    impl MeteringHandler for RecordingMeter {
        async fn meter_values(
            &self,
            _charger_id: &str,
            samples: Vec<MeterSample>,
            _correlation_id: &str,
        ) -> Result<Value> {
            self.ingested.lock().unwrap().extend(samples);
            Ok(json!({}))
        }

        async fn ingest(&self, _charger_id: &str, samples: Vec<MeterSample>) -> Result<()> {
            self.ingested.lock().unwrap().extend(samples);
            Ok(())
        }
    }

    fn adapter(tx: Arc<RecordingTx>, meter: Arc<RecordingMeter>) -> TransactionAdapter {
        TransactionAdapter::new(Arc::from("cp-1"), tx, meter)
    }

    #[tokio::test]
    async fn start_and_stop_pass_through_with_correlation_id() {
        let tx = Arc::new(RecordingTx::default());
        let adapter = adapter(tx.clone(), Arc::new(RecordingMeter::default()));

        let reply = adapter
            .on_start_transaction(json!({ "idTag": "ABC123" }), "corr-1")
            .await
            .unwrap();
        assert_eq!(reply["transactionId"], 7);

        adapter
            .on_stop_transaction(json!({ "transactionId": 7 }), "corr-2")
            .await
            .unwrap();

        let calls = tx.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("start".to_string(), "corr-1".to_string()),
                ("stop".to_string(), "corr-2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn transaction_event_ingests_embedded_samples() {
        let meter = Arc::new(RecordingMeter::default());
        let adapter = adapter(Arc::new(RecordingTx::default()), meter.clone());

        adapter
            .on_transaction_event(
                json!({
                    "eventType": "Updated",
                    "transactionInfo": { "transactionId": "tx-1" },
                    "meterValue": [{
                        "timestamp": "2026-03-01T12:00:00Z",
                        "sampledValue": [{ "value": 500.0 }]
                    }]
                }),
                "corr-3",
            )
            .await
            .unwrap();

        let ingested = meter.ingested.lock().unwrap();
        assert_eq!(ingested.len(), 1);
        assert_eq!(ingested[0].transaction_id.as_deref(), Some("tx-1"));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let tx = Arc::new(RecordingTx {
            fail: true,
            ..Default::default()
        });
        let adapter = adapter(tx, Arc::new(RecordingMeter::default()));

        let err = adapter
            .on_transaction_event(json!({ "eventType": "Started" }), "corr-4")
            .await
            .expect_err("must propagate");
        assert!(matches!(err, CsmsError::HandlerFailure(_)));
    }
}
