//! Per-connection protocol state machine.
//!
//! One `SessionCore` exclusively owns the parser and dispatch state of a
//! single charge-point connection for its lifetime. Socket plumbing lives in
//! `transport::ws`; everything here is socket-free so the frame-routing rules
//! stay unit-testable.
//!
//! Lifecycle: `Connecting -> Admitted -> Active -> Closing -> Closed`. A
//! frame that fails to parse is dropped and the session stays open: charge
//! points vary wildly in protocol compliance, and one bad frame must never
//! cost an otherwise healthy connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use voltmesh_core::error::OcppErrorCode;
use voltmesh_core::protocol::wire::{self, OcppFrame, RawFrame};
use voltmesh_core::{CsmsError, Result};

use crate::adapters::ForwardingAdapter;
use crate::dispatch::ActionRegistry;
use crate::obs::CsmsMetrics;

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket open, admission not yet decided.
    Connecting,
    /// Admission passed, no frame parsed yet.
    Admitted,
    /// At least one frame parsed successfully.
    Active,
    /// Close initiated by either side.
    Closing,
    /// Terminal; no further frames are processed.
    Closed,
}

/// What the transport should do after a frame was handled.
#[derive(Debug, PartialEq)]
pub enum FrameOutcome {
    /// Nothing to send (frame dropped, forwarded, or consumed).
    None,
    /// Already-encoded reply to write back to the charge point.
    Reply(String),
}

pub struct SessionCore {
    charger_id: Arc<str>,
    phase: SessionPhase,
    registry: ActionRegistry,
    /// Present when this node relays the charger to its primary CSMS.
    forwarding: Option<ForwardingAdapter>,
    /// Correlation ids of Calls this node sent, awaiting their replies.
    pending: HashMap<String, oneshot::Sender<Result<Value>>>,
    metrics: Arc<CsmsMetrics>,
}

impl SessionCore {
    pub fn new(
        charger_id: Arc<str>,
        registry: ActionRegistry,
        forwarding: Option<ForwardingAdapter>,
        metrics: Arc<CsmsMetrics>,
    ) -> Self {
        Self {
            charger_id,
            phase: SessionPhase::Connecting,
            registry,
            forwarding,
            pending: HashMap::new(),
            metrics,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn charger_id(&self) -> &str {
        &self.charger_id
    }

    /// Admission passed; frames may now be processed.
    pub fn admit(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::Admitted;
        }
    }

    pub fn begin_close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closing;
        }
    }

    /// Release all owned state. Pending callers are woken by their senders
    /// being dropped.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
        self.pending.clear();
    }

    /// Register an outbound Call so its reply can be correlated back.
    pub fn track_outbound(&mut self, unique_id: String, reply: oneshot::Sender<Result<Value>>) {
        self.pending.insert(unique_id, reply);
    }

    /// Handle one inbound websocket payload.
    ///
    /// Never closes the connection: parse failures and unroutable frames are
    /// dropped, Calls are always answered with a CallResult or CallError
    /// correlated by the same UniqueId.
    pub async fn handle_frame(&mut self, raw: &RawFrame) -> FrameOutcome {
        match self.phase {
            SessionPhase::Connecting => {
                warn!(charger = %self.charger_id, "frame before admission; dropped");
                return FrameOutcome::None;
            }
            SessionPhase::Closing | SessionPhase::Closed => return FrameOutcome::None,
            SessionPhase::Admitted | SessionPhase::Active => {}
        }

        let parsed = match wire::decode(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(charger = %self.charger_id, error = %e, "dropping unparseable frame");
                self.metrics
                    .frames_dropped
                    .inc(&[("reason", "parse-failure")]);
                return FrameOutcome::None;
            }
        };

        // First successfully parsed frame activates the session.
        if self.phase == SessionPhase::Admitted {
            self.phase = SessionPhase::Active;
        }

        if let Some(meta) = parsed.forwarding_meta() {
            debug!(
                charger = %self.charger_id,
                origin = meta.get("origin").and_then(|v| v.as_str()).unwrap_or("?"),
                "frame arrived via forwarding envelope"
            );
        }

        match parsed.into_frame() {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                if let Some(forwarding) = &self.forwarding {
                    forwarding.forward_call(&action, &wire::raw_text(raw)).await;
                    self.metrics.frames_forwarded.inc(&[("kind", "call")]);
                    return FrameOutcome::None;
                }
                self.dispatch_call(unique_id, action, payload).await
            }
            OcppFrame::CallResult { unique_id, payload } => {
                self.route_reply(unique_id, Ok(payload), raw).await
            }
            OcppFrame::CallError {
                unique_id,
                code,
                description,
                ..
            } => {
                self.route_reply(unique_id, Err(CsmsError::Remote { code, description }), raw)
                    .await
            }
            OcppFrame::Other(items) => {
                debug!(
                    charger = %self.charger_id,
                    len = items.len(),
                    "unroutable message type; dropped"
                );
                self.metrics
                    .frames_dropped
                    .inc(&[("reason", "unroutable")]);
                FrameOutcome::None
            }
        }
    }

    async fn dispatch_call(
        &mut self,
        unique_id: String,
        action: String,
        payload: Value,
    ) -> FrameOutcome {
        let Some(handler) = self.registry.resolve(&action) else {
            warn!(charger = %self.charger_id, action, "unknown action");
            self.metrics
                .unknown_actions
                .inc(&[("action", action.as_str())]);
            return FrameOutcome::Reply(wire::encode_call_error(
                &unique_id,
                OcppErrorCode::NotImplemented,
                &format!("action {action} is not implemented"),
                &json!({}),
            ));
        };

        let started = Instant::now();
        let result = handler.call(payload, &unique_id).await;
        self.metrics
            .dispatch_duration
            .observe(&[("action", action.as_str())], started.elapsed());

        match result {
            Ok(reply) => {
                self.metrics
                    .calls_dispatched
                    .inc(&[("action", action.as_str())]);
                FrameOutcome::Reply(wire::encode_call_result(&unique_id, &reply))
            }
            Err(e) => {
                // One bad handler call must never terminate the session; the
                // charge point gets a CallError and the loop continues.
                warn!(charger = %self.charger_id, action, error = %e, "handler failed");
                self.metrics
                    .handler_failures
                    .inc(&[("action", action.as_str())]);
                FrameOutcome::Reply(wire::encode_call_error(
                    &unique_id,
                    e.error_code(),
                    &e.to_string(),
                    &json!({}),
                ))
            }
        }
    }

    async fn route_reply(
        &mut self,
        unique_id: String,
        outcome: Result<Value>,
        raw: &RawFrame,
    ) -> FrameOutcome {
        if let Some(forwarding) = &self.forwarding {
            forwarding
                .forward_reply(&unique_id, &wire::raw_text(raw))
                .await;
            self.metrics.frames_forwarded.inc(&[("kind", "reply")]);
            return FrameOutcome::None;
        }

        match self.pending.remove(&unique_id) {
            Some(reply) => {
                let _ = reply.send(outcome);
            }
            None => {
                debug!(charger = %self.charger_id, unique_id, "reply without a waiting caller; dropped");
                self.metrics
                    .frames_dropped
                    .inc(&[("reason", "unmatched-reply")]);
            }
        }
        FrameOutcome::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::adapters::{MeteringAdapter, NotificationAdapter, TransactionAdapter};
    use crate::handlers::memory::MemoryBackend;
    use crate::handlers::{Collaborators, OperationHandler, RelayTransport};

    use std::sync::Mutex;

    struct FailingOps;

    #[async_trait]
    impl OperationHandler for FailingOps {
        async fn handle(
            &self,
            _charger_id: &str,
            _action: &str,
            _payload: Value,
            _correlation_id: &str,
        ) -> Result<Value> {
            Err(CsmsError::HandlerFailure("backend offline".into()))
        }
    }

    #[derive(Default)]
    struct RecordingRelay {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RelayTransport for RecordingRelay {
        async fn send_raw(&self, _charger_id: &str, raw: &str) -> Result<()> {
            self.sent.lock().unwrap().push(raw.to_owned());
            Ok(())
        }
    }

    struct Fixture {
        session: SessionCore,
        backend: Arc<MemoryBackend>,
        relay: Arc<RecordingRelay>,
    }

    fn fixture(relaying: bool, failing_ops: bool) -> Fixture {
        let backend = Arc::new(MemoryBackend::new(Some("node-1".into()), true, None));
        let collab = Collaborators::from_backend(backend.clone());
        let charger: Arc<str> = Arc::from("cp-1");

        let transactions = Arc::new(TransactionAdapter::new(
            charger.clone(),
            collab.transactions.clone(),
            collab.metering.clone(),
        ));
        let metering = Arc::new(MeteringAdapter::new(charger.clone(), collab.metering.clone()));
        let notifications = Arc::new(NotificationAdapter::new(
            charger.clone(),
            collab.notifications.clone(),
        ));
        let operations: Arc<dyn OperationHandler> = if failing_ops {
            Arc::new(FailingOps)
        } else {
            collab.operations.clone()
        };

        let registry = ActionRegistry::new(
            charger.clone(),
            transactions,
            metering,
            notifications,
            operations,
        );

        let relay = Arc::new(RecordingRelay::default());
        let forwarding = relaying.then(|| {
            ForwardingAdapter::new(
                charger.clone(),
                relay.clone() as Arc<dyn RelayTransport>,
                collab.chargers.clone(),
                None,
            )
        });

        Fixture {
            session: SessionCore::new(
                charger,
                registry,
                forwarding,
                Arc::new(CsmsMetrics::default()),
            ),
            backend,
            relay,
        }
    }

    fn text(s: &str) -> RawFrame {
        RawFrame::Text(s.to_owned())
    }

    #[tokio::test]
    async fn phases_advance_through_the_lifecycle() {
        let mut f = fixture(false, false);
        assert_eq!(f.session.phase(), SessionPhase::Connecting);

        f.session.admit();
        assert_eq!(f.session.phase(), SessionPhase::Admitted);

        let outcome = f
            .session
            .handle_frame(&text(r#"[2,"1","Heartbeat",{}]"#))
            .await;
        assert!(matches!(outcome, FrameOutcome::Reply(_)));
        assert_eq!(f.session.phase(), SessionPhase::Active);

        f.session.begin_close();
        assert_eq!(f.session.phase(), SessionPhase::Closing);
        // no frames processed past Closing
        let outcome = f
            .session
            .handle_frame(&text(r#"[2,"2","Heartbeat",{}]"#))
            .await;
        assert_eq!(outcome, FrameOutcome::None);

        f.session.close();
        assert_eq!(f.session.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_without_closing() {
        let mut f = fixture(false, false);
        f.session.admit();

        for bad in ["not json", r#"[2,"msg-only"]"#, r#"{"foo":1}"#] {
            let outcome = f.session.handle_frame(&text(bad)).await;
            assert_eq!(outcome, FrameOutcome::None, "{bad}");
        }
        // unparsed frames never activate the session
        assert_eq!(f.session.phase(), SessionPhase::Admitted);

        // and a valid frame still goes through afterwards
        let outcome = f
            .session
            .handle_frame(&text(r#"[2,"1","Heartbeat",{}]"#))
            .await;
        match outcome {
            FrameOutcome::Reply(reply) => assert!(reply.starts_with(r#"[3,"1""#)),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_action_gets_not_implemented() {
        let mut f = fixture(false, false);
        f.session.admit();

        let outcome = f
            .session
            .handle_frame(&text(r#"[2,"77","NoSuchAction",{}]"#))
            .await;
        match outcome {
            FrameOutcome::Reply(reply) => {
                assert!(reply.starts_with(r#"[4,"77","NotImplemented""#), "{reply}");
            }
            other => panic!("expected CallError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn handler_failure_replies_internal_error_and_session_survives() {
        let mut f = fixture(false, true);
        f.session.admit();

        let outcome = f
            .session
            .handle_frame(&text(r#"[2,"5","Authorize",{"idTag":"ABC"}]"#))
            .await;
        match outcome {
            FrameOutcome::Reply(reply) => {
                assert!(reply.starts_with(r#"[4,"5","InternalError""#), "{reply}");
            }
            other => panic!("expected CallError, got {other:?}"),
        }

        assert_eq!(f.session.phase(), SessionPhase::Active);
        // the connection keeps serving; MeterValues does not use the failing handler
        let outcome = f
            .session
            .handle_frame(&text(
                r#"[2,"6","MeterValues",{"meterValue":[{"timestamp":"2026-03-01T12:00:00Z","sampledValue":[{"value":"9"}]}]}]"#,
            ))
            .await;
        assert!(matches!(outcome, FrameOutcome::Reply(r) if r.starts_with(r#"[3,"6""#)));
        assert_eq!(f.backend.sample_count(), 1);
    }

    #[tokio::test]
    async fn call_results_resolve_pending_outbound_calls() {
        let mut f = fixture(false, false);
        f.session.admit();

        let (tx, rx) = oneshot::channel();
        f.session.track_outbound("cmd-1".into(), tx);

        let outcome = f
            .session
            .handle_frame(&text(r#"[3,"cmd-1",{"status":"Accepted"}]"#))
            .await;
        assert_eq!(outcome, FrameOutcome::None);

        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply["status"], "Accepted");
    }

    #[tokio::test]
    async fn call_errors_resolve_pending_calls_as_remote_errors() {
        let mut f = fixture(false, false);
        f.session.admit();

        let (tx, rx) = oneshot::channel();
        f.session.track_outbound("cmd-2".into(), tx);

        f.session
            .handle_frame(&text(r#"[4,"cmd-2","NotSupported","no can do",{}]"#))
            .await;

        let err = rx.await.unwrap().expect_err("must be an error");
        assert!(matches!(err, CsmsError::Remote { code, .. } if code == "NotSupported"));
    }

    #[tokio::test]
    async fn unmatched_replies_are_dropped() {
        let mut f = fixture(false, false);
        f.session.admit();

        let outcome = f
            .session
            .handle_frame(&text(r#"[3,"nobody-waits",{"ok":true}]"#))
            .await;
        assert_eq!(outcome, FrameOutcome::None);
    }

    #[tokio::test]
    async fn relay_mode_forwards_calls_verbatim() {
        let mut f = fixture(true, false);
        f.session.admit();

        let raw = r#"[2,"9","BootNotification",{"chargePointVendor":"X"}]"#;
        let outcome = f.session.handle_frame(&text(raw)).await;
        // relayed, not answered locally
        assert_eq!(outcome, FrameOutcome::None);
        assert_eq!(*f.relay.sent.lock().unwrap(), vec![raw.to_owned()]);
        // relay refreshed the charger's forwarding watermark
        assert!(f.backend.forward_watermark("cp-1").is_some());
    }

    #[tokio::test]
    async fn relay_mode_forwards_replies_verbatim() {
        let mut f = fixture(true, false);
        f.session.admit();

        let raw = r#"[3,"abc",{"status":"Accepted"}]"#;
        f.session.handle_frame(&text(raw)).await;
        assert_eq!(*f.relay.sent.lock().unwrap(), vec![raw.to_owned()]);
    }
}
