//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on `/v1/ocpp/:charger_id` (OCPP subprotocol echoed
//!   when offered; negotiation beyond that is a deployment concern)
//! - Run admission before any frame is processed; denial closes with 1008
//! - Own the socket: outbound writer channel, ping interval, idle timeout
//! - Feed inbound frames to the `SessionCore`, write its replies back
//! - Accept node-originated Calls through the command channel

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use voltmesh_core::protocol::wire;
use voltmesh_core::Result;

use crate::admission;
use crate::app_state::AppState;
use crate::session::FrameOutcome;
use crate::session_registry::{Command, Connection};
use crate::transport::codec::{self, frame_len, Inbound};

/// Subprotocols this node accepts, newest first.
const SUBPROTOCOLS: [&str; 3] = ["ocpp2.1", "ocpp2.0.1", "ocpp1.6"];

pub async fn ws_upgrade(
    State(app): State<AppState>,
    Path(charger_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.protocols(SUBPROTOCOLS)
        .on_upgrade(move |socket| async move {
            if let Err(e) = run_session(app, charger_id, socket).await {
                warn!(error = %e, "session ended with error");
            }
        })
}

async fn run_session(app: AppState, charger_id: String, mut socket: WebSocket) -> Result<()> {
    // ---- admission, before any frame is processed
    let collab = app.collaborators();
    let decision =
        admission::resolve_and_decide(&*collab.nodes, &*collab.chargers, &charger_id).await?;

    app.metrics().admission_decisions.inc(&[
        ("decision", if decision.allowed { "allowed" } else { "denied" }),
        ("reason", decision.reason.unwrap_or("-")),
    ]);

    if !decision.allowed {
        // The denial reason is logged, never transmitted.
        warn!(charger = %charger_id, reason = ?decision.reason, "admission denied");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "policy violation".into(),
            })))
            .await;
        return Ok(());
    }
    info!(charger = %charger_id, reason = ?decision.reason, "session admitted");

    // ---- channels
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(32);
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    // ---- registry entry; a reconnect evicts the older session
    let created_seq = app.sessions().next_seq();
    if let Some(older) = app.sessions().insert(
        &charger_id,
        Connection {
            outbound: out_tx.clone(),
            commands: cmd_tx,
            shutdown: shutdown_tx,
            created_seq,
        },
    ) {
        debug!(charger = %charger_id, "evicting older session");
        let _ = older.shutdown.try_send(());
    }
    app.metrics().sessions_active.inc(&[]);

    let mut session = app.build_session(&charger_id);
    session.admit();

    // ---- split socket
    let (mut ws_tx, mut ws_rx) = socket.split();

    // ---- timers
    let csms = &app.cfg().csms;
    let max_frame_bytes = csms.max_frame_bytes;
    let idle_timeout = Duration::from_millis(csms.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(Duration::from_millis(csms.ping_interval_ms));
    ping_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_activity = Instant::now();
    let mut cmd_seq: u64 = 0;

    loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(m) => {
                        if ws_tx.send(m).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break; };
                let Ok(msg) = incoming else { break; };

                last_activity = Instant::now();

                // cheap length check before any decode work
                if frame_len(&msg) > max_frame_bytes {
                    warn!(charger = %charger_id, len = frame_len(&msg), "oversized frame dropped");
                    app.metrics().frames_dropped.inc(&[("reason", "oversized")]);
                    continue;
                }

                match codec::classify(msg) {
                    Inbound::Frame(raw) => {
                        match session.handle_frame(&raw).await {
                            FrameOutcome::Reply(text) => {
                                if out_tx.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            FrameOutcome::None => {}
                        }
                    }
                    Inbound::Ping(payload) => {
                        let _ = out_tx.send(Message::Pong(payload)).await;
                    }
                    Inbound::Pong => {}
                    Inbound::Close => break,
                }
            }

            // node-originated Calls
            maybe_cmd = cmd_rx.recv() => {
                let Some(cmd) = maybe_cmd else { break; };
                cmd_seq += 1;
                let unique_id = format!("{charger_id}-cmd-{cmd_seq}");
                let text = wire::encode_call(&unique_id, &cmd.action, &cmd.payload);
                session.track_outbound(unique_id, cmd.reply);
                if out_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            // evicted by a newer connection for the same charger
            _ = shutdown_rx.recv() => {
                info!(charger = %charger_id, "session replaced by a newer connection");
                break;
            }

            // keepalive ping
            _ = ping_tick.tick() => {
                let _ = out_tx.send(Message::Ping(Vec::new())).await;
            }

            // idle timeout
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                if last_activity.elapsed() >= idle_timeout {
                    warn!(charger = %charger_id, "idle timeout");
                    break;
                }
            }
        }
    }

    // ---- teardown: release registry entry and all per-connection state
    session.begin_close();
    app.sessions().remove_if_seq(&charger_id, created_seq);
    session.close();
    app.metrics().sessions_active.dec(&[]);
    info!(charger = %charger_id, "session closed");

    Ok(())
}
