//! Meter-sample normalization and the 1.6 MeterValues facade.
//!
//! OCPP 1.6 `MeterValues` payloads and the sampling embedded in 2.x
//! `TransactionEvent` payloads share one `meterValue[].sampledValue[]` shape;
//! both normalize through [`normalize_meter_values`] into the same canonical
//! sample. The key `(charger_id, timestamp, measurand)` is what makes
//! resubmission idempotent: batches are deduplicated by key here, and the
//! metering sink upserts by key.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use voltmesh_core::Result;

use crate::handlers::MeteringHandler;

/// Default measurand when a sampled value omits one (OCPP default).
const DEFAULT_MEASURAND: &str = "Energy.Active.Import.Register";

/// Canonical normalized meter sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub charger_id: String,
    pub connector_id: Option<u64>,
    pub transaction_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub measurand: String,
    pub value: f64,
    pub unit: Option<String>,
    pub context: Option<String>,
}

/// Idempotence key for a persisted sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub charger_id: String,
    pub timestamp: DateTime<Utc>,
    pub measurand: String,
}

impl MeterSample {
    pub fn key(&self) -> SampleKey {
        SampleKey {
            charger_id: self.charger_id.clone(),
            timestamp: self.timestamp,
            measurand: self.measurand.clone(),
        }
    }
}

/// Flatten a payload's `meterValue` entries into canonical samples.
///
/// Tolerant by design: entries missing a parseable timestamp or value are
/// skipped with a warning rather than failing the whole Call, matching how
/// loosely charge-point firmware follows the sampling schema. Duplicate keys
/// within one batch collapse to the first occurrence.
pub fn normalize_meter_values(charger_id: &str, payload: &Value) -> Vec<MeterSample> {
    let connector_id = payload
        .get("connectorId")
        .and_then(Value::as_u64)
        .or_else(|| payload.pointer("/evse/id").and_then(Value::as_u64));

    // 1.6 carries a numeric transactionId at the top level; 2.x nests a
    // string id under transactionInfo.
    let transaction_id = match payload.get("transactionId") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => payload
            .pointer("/transactionInfo/transactionId")
            .and_then(Value::as_str)
            .map(str::to_owned),
    };

    let Some(entries) = payload.get("meterValue").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen: HashSet<SampleKey> = HashSet::new();
    let mut samples = Vec::new();

    for entry in entries {
        let Some(timestamp) = entry
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
        else {
            warn!(charger = charger_id, "meter value entry without a parseable timestamp; skipped");
            continue;
        };

        let Some(sampled) = entry.get("sampledValue").and_then(Value::as_array) else {
            continue;
        };

        for sv in sampled {
            let Some(value) = numeric_value(sv.get("value")) else {
                warn!(charger = charger_id, "sampled value without a numeric value; skipped");
                continue;
            };

            let sample = MeterSample {
                charger_id: charger_id.to_owned(),
                connector_id,
                transaction_id: transaction_id.clone(),
                timestamp,
                measurand: sv
                    .get("measurand")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_MEASURAND)
                    .to_owned(),
                value,
                unit: unit_of(sv),
                context: sv
                    .get("context")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            };

            if seen.insert(sample.key()) {
                samples.push(sample);
            }
        }
    }

    samples
}

// 1.6 serializes values as strings, 2.x as numbers.
fn numeric_value(v: Option<&Value>) -> Option<f64> {
    match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

// 1.6 uses a bare "unit" string, 2.x wraps it in unitOfMeasure.
fn unit_of(sv: &Value) -> Option<String> {
    sv.get("unit")
        .and_then(Value::as_str)
        .or_else(|| sv.pointer("/unitOfMeasure/unit").and_then(Value::as_str))
        .map(str::to_owned)
}

/// Facade for the 1.6 MeterValues surface.
pub struct MeteringAdapter {
    charger_id: Arc<str>,
    inner: Arc<dyn MeteringHandler>,
}

impl MeteringAdapter {
    pub fn new(charger_id: Arc<str>, inner: Arc<dyn MeteringHandler>) -> Self {
        Self { charger_id, inner }
    }

    /// Normalize and hand off; the reply is whatever the handler produces.
    pub async fn on_meter_values(&self, payload: Value, correlation_id: &str) -> Result<Value> {
        let samples = normalize_meter_values(&self.charger_id, &payload);
        self.inner
            .meter_values(&self.charger_id, samples, correlation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meter_values_payload() -> Value {
        json!({
            "connectorId": 1,
            "transactionId": 42,
            "meterValue": [{
                "timestamp": "2026-03-01T12:00:00Z",
                "sampledValue": [
                    { "value": "1377", "measurand": "Energy.Active.Import.Register", "unit": "Wh" },
                    { "value": "16.2", "measurand": "Current.Import", "unit": "A" }
                ]
            }]
        })
    }

    #[test]
    fn normalizes_ocpp16_shape() {
        let samples = normalize_meter_values("cp-1", &meter_values_payload());
        assert_eq!(samples.len(), 2);

        let energy = &samples[0];
        assert_eq!(energy.charger_id, "cp-1");
        assert_eq!(energy.connector_id, Some(1));
        assert_eq!(energy.transaction_id.as_deref(), Some("42"));
        assert_eq!(energy.measurand, "Energy.Active.Import.Register");
        assert_eq!(energy.value, 1377.0);
        assert_eq!(energy.unit.as_deref(), Some("Wh"));
    }

    #[test]
    fn normalizes_ocpp2_transaction_event_shape() {
        let payload = json!({
            "eventType": "Updated",
            "transactionInfo": { "transactionId": "tx-9" },
            "evse": { "id": 2 },
            "meterValue": [{
                "timestamp": "2026-03-01T12:05:00+00:00",
                "sampledValue": [
                    { "value": 2210.5, "unitOfMeasure": { "unit": "Wh" } }
                ]
            }]
        });

        let samples = normalize_meter_values("cp-2", &payload);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].connector_id, Some(2));
        assert_eq!(samples[0].transaction_id.as_deref(), Some("tx-9"));
        // default measurand applies when omitted
        assert_eq!(samples[0].measurand, DEFAULT_MEASURAND);
        assert_eq!(samples[0].unit.as_deref(), Some("Wh"));
    }

    #[test]
    fn equivalent_timestamps_share_a_key() {
        let a = normalize_meter_values("cp-1", &meter_values_payload());
        let mut payload = meter_values_payload();
        payload["meterValue"][0]["timestamp"] = json!("2026-03-01T13:00:00+01:00");
        let b = normalize_meter_values("cp-1", &payload);
        assert_eq!(a[0].key(), b[0].key());
    }

    #[test]
    fn duplicate_keys_within_a_batch_collapse() {
        let payload = json!({
            "meterValue": [
                {
                    "timestamp": "2026-03-01T12:00:00Z",
                    "sampledValue": [{ "value": "100" }]
                },
                {
                    "timestamp": "2026-03-01T12:00:00Z",
                    "sampledValue": [{ "value": "100" }]
                }
            ]
        });
        let samples = normalize_meter_values("cp-1", &payload);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn unparseable_entries_are_skipped_not_fatal() {
        let payload = json!({
            "meterValue": [
                { "timestamp": "not-a-time", "sampledValue": [{ "value": "1" }] },
                { "timestamp": "2026-03-01T12:00:00Z", "sampledValue": [{ "value": "nope" }] },
                { "timestamp": "2026-03-01T12:00:00Z", "sampledValue": [{ "value": "7" }] }
            ]
        });
        let samples = normalize_meter_values("cp-1", &payload);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 7.0);
    }

    #[test]
    fn missing_meter_value_array_yields_empty() {
        assert!(normalize_meter_values("cp-1", &json!({})).is_empty());
    }
}
