//! Frame relay toward the charge point's primary CSMS.
//!
//! Frames are forwarded verbatim, with no decode/encode round-trip, and each
//! successful relay refreshes the charger's forwarding watermark so liveness
//! can be monitored. Relay failures are an operational concern of this node:
//! they are logged, the watermark is left stale, and nothing is retried or
//! reported to the charge point.

use std::sync::Arc;

use tracing::{debug, warn};

use voltmesh_core::protocol::wire::{encode_forwarded, ForwardingMeta};

use crate::handlers::{ChargerRepository, RelayTransport};

pub struct ForwardingAdapter {
    charger_id: Arc<str>,
    relay: Arc<dyn RelayTransport>,
    chargers: Arc<dyn ChargerRepository>,
    /// Routing context to wrap outbound frames with; `None` sends them bare.
    origin_meta: Option<ForwardingMeta>,
}

impl ForwardingAdapter {
    pub fn new(
        charger_id: Arc<str>,
        relay: Arc<dyn RelayTransport>,
        chargers: Arc<dyn ChargerRepository>,
        origin_meta: Option<ForwardingMeta>,
    ) -> Self {
        Self {
            charger_id,
            relay,
            chargers,
            origin_meta,
        }
    }

    /// Relay an inbound Call frame.
    pub async fn forward_call(&self, action: &str, raw: &str) {
        debug!(charger = %self.charger_id, action, "forwarding call upstream");
        self.forward(raw).await;
    }

    /// Relay an inbound CallResult/CallError frame.
    pub async fn forward_reply(&self, correlation_id: &str, raw: &str) {
        debug!(charger = %self.charger_id, correlation_id, "forwarding reply upstream");
        self.forward(raw).await;
    }

    async fn forward(&self, raw: &str) {
        // The envelope wrap embeds the frame text verbatim; only the wrapper
        // itself is constructed here.
        let outbound = match &self.origin_meta {
            Some(meta) => match encode_forwarded(raw, meta) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    warn!(charger = %self.charger_id, error = %e, "envelope wrap failed; frame dropped");
                    return;
                }
            },
            None => raw.to_owned(),
        };

        if let Err(e) = self.relay.send_raw(&self.charger_id, &outbound).await {
            warn!(charger = %self.charger_id, error = %e, "relay unreachable; frame dropped");
            return;
        }

        if let Err(e) = self
            .chargers
            .refresh_forward_watermark(&self.charger_id)
            .await
        {
            warn!(charger = %self.charger_id, error = %e, "forwarding watermark refresh failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use voltmesh_core::{CsmsError, Result};

    use crate::handlers::Charger;

    #[derive(Default)]
    struct RecordingRelay {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl RelayTransport for RecordingRelay {
        async fn send_raw(&self, _charger_id: &str, raw: &str) -> Result<()> {
            if self.fail {
                return Err(CsmsError::ForwardingFailure("peer unreachable".into()));
            }
            self.sent.lock().unwrap().push(raw.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct WatermarkSpy {
        refreshed: Mutex<u32>,
    }

    #[async_trait]
    impl ChargerRepository for WatermarkSpy {
        async fn find(&self, _charger_id: &str) -> Result<Option<Charger>> {
            Ok(None)
        }

        async fn refresh_forward_watermark(&self, _charger_id: &str) -> Result<()> {
            *self.refreshed.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwards_verbatim_and_refreshes_watermark() {
        let relay = Arc::new(RecordingRelay::default());
        let chargers = Arc::new(WatermarkSpy::default());
        let adapter =
            ForwardingAdapter::new(Arc::from("cp-1"), relay.clone(), chargers.clone(), None);

        let raw = r#"[2,"abc","Heartbeat",{}]"#;
        adapter.forward_call("Heartbeat", raw).await;

        assert_eq!(*relay.sent.lock().unwrap(), vec![raw.to_owned()]);
        assert_eq!(*chargers.refreshed.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn origin_meta_wraps_without_reparsing() {
        let relay = Arc::new(RecordingRelay::default());
        let mut meta = ForwardingMeta::new();
        meta.insert("origin".into(), json!("node-1"));
        let adapter = ForwardingAdapter::new(
            Arc::from("cp-1"),
            relay.clone(),
            Arc::new(WatermarkSpy::default()),
            Some(meta),
        );

        let raw = r#"[3,"abc",{"ok":true}]"#;
        adapter.forward_reply("abc", raw).await;

        let sent = relay.sent.lock().unwrap();
        assert!(sent[0].contains(raw), "frame must be embedded verbatim");
        assert!(sent[0].contains(r#""origin":"node-1""#));
    }

    #[tokio::test]
    async fn relay_failure_leaves_watermark_stale() {
        let chargers = Arc::new(WatermarkSpy::default());
        let adapter = ForwardingAdapter::new(
            Arc::from("cp-1"),
            Arc::new(RecordingRelay {
                fail: true,
                ..Default::default()
            }),
            chargers.clone(),
            None,
        );

        adapter.forward_call("Heartbeat", r#"[2,"abc","Heartbeat",{}]"#).await;
        assert_eq!(*chargers.refreshed.lock().unwrap(), 0);
    }
}
