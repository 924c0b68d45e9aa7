//! Live charger sessions.
//!
//! One connection per charger id: a reconnect evicts the older session so a
//! flapping charger never ends up with two live sockets. The registry is also
//! how the rest of the node reaches a connected charger: pushing raw frames
//! to its outbound queue (relay downstream path) or originating Calls and
//! awaiting their replies.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use voltmesh_core::{CsmsError, Result};

/// A Call originated by this node toward the charge point.
pub struct Command {
    pub action: String,
    pub payload: Value,
    pub reply: oneshot::Sender<Result<Value>>,
}

/// Handles for one live connection, owned by its session task.
#[derive(Clone)]
pub struct Connection {
    /// Outbound websocket writer queue.
    pub outbound: mpsc::Sender<Message>,
    /// Node-originated Calls enter the session loop here.
    pub commands: mpsc::Sender<Command>,
    /// Signalled when a newer connection evicts this one.
    pub shutdown: mpsc::Sender<()>,
    pub created_seq: u64,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Connection>,
    seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert, returning the evicted older connection when the charger
    /// reconnected while a session was still live.
    pub fn insert(&self, charger_id: &str, conn: Connection) -> Option<Connection> {
        self.sessions.insert(charger_id.to_owned(), conn)
    }

    /// Remove the charger's entry, but only if it still belongs to the caller
    /// (an evicted session must not tear down its replacement).
    pub fn remove_if_seq(&self, charger_id: &str, created_seq: u64) {
        self.sessions
            .remove_if(charger_id, |_, conn| conn.created_seq == created_seq);
    }

    pub fn get(&self, charger_id: &str) -> Option<Connection> {
        self.sessions.get(charger_id).map(|c| c.clone())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Push an already-encoded frame to the charger's outbound queue.
    /// Returns false when the charger is not connected or its queue is full.
    pub fn send_raw(&self, charger_id: &str, text: String) -> bool {
        match self.get(charger_id) {
            Some(conn) => conn.outbound.try_send(Message::Text(text)).is_ok(),
            None => false,
        }
    }

    /// Send a Call to a connected charger and await its reply.
    pub async fn call(&self, charger_id: &str, action: &str, payload: Value) -> Result<Value> {
        let conn = self
            .get(charger_id)
            .ok_or_else(|| CsmsError::BadRequest(format!("charger not connected: {charger_id}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        conn.commands
            .send(Command {
                action: action.to_owned(),
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CsmsError::Internal("session command channel closed".into()))?;

        reply_rx
            .await
            .map_err(|_| CsmsError::Internal("session closed before reply".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(seq: u64) -> (Connection, mpsc::Receiver<()>) {
        let (outbound, _out_rx) = mpsc::channel(8);
        let (commands, _cmd_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        (
            Connection {
                outbound,
                commands,
                shutdown,
                created_seq: seq,
            },
            shutdown_rx,
        )
    }

    #[tokio::test]
    async fn reconnect_evicts_the_older_session() {
        let registry = SessionRegistry::new();
        let (old, _old_shutdown) = connection(registry.next_seq());
        let old_seq = old.created_seq;
        assert!(registry.insert("cp-1", old).is_none());

        let (newer, _new_shutdown) = connection(registry.next_seq());
        let evicted = registry.insert("cp-1", newer).expect("older must pop out");
        assert_eq!(evicted.created_seq, old_seq);

        // the evicted session's cleanup must not remove the replacement
        registry.remove_if_seq("cp-1", old_seq);
        assert!(registry.get("cp-1").is_some());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn call_round_trips_through_the_command_channel() {
        let registry = SessionRegistry::new();
        let (outbound, _out_rx) = mpsc::channel(8);
        let (commands, mut cmd_rx) = mpsc::channel::<Command>(8);
        let (shutdown, _shutdown_rx) = mpsc::channel(1);
        registry.insert(
            "cp-1",
            Connection {
                outbound,
                commands,
                shutdown,
                created_seq: registry.next_seq(),
            },
        );

        // stand-in for the session loop: answer the first command
        tokio::spawn(async move {
            let cmd = cmd_rx.recv().await.unwrap();
            assert_eq!(cmd.action, "Reset");
            let _ = cmd.reply.send(Ok(serde_json::json!({ "status": "Accepted" })));
        });

        let reply = registry
            .call("cp-1", "Reset", serde_json::json!({ "type": "Soft" }))
            .await
            .unwrap();
        assert_eq!(reply["status"], "Accepted");

        let err = registry
            .call("cp-gone", "Reset", serde_json::json!({}))
            .await
            .expect_err("disconnected charger must fail");
        assert!(matches!(err, CsmsError::BadRequest(_)));
    }

    #[tokio::test]
    async fn send_raw_reaches_the_outbound_queue() {
        let registry = SessionRegistry::new();
        let (outbound, mut out_rx) = mpsc::channel(8);
        let (commands, _cmd_rx) = mpsc::channel(8);
        let (shutdown, _shutdown_rx) = mpsc::channel(1);
        registry.insert(
            "cp-1",
            Connection {
                outbound,
                commands,
                shutdown,
                created_seq: registry.next_seq(),
            },
        );

        assert!(registry.send_raw("cp-1", "[3,\"x\",{}]".into()));
        assert!(matches!(out_rx.recv().await, Some(Message::Text(t)) if t.starts_with("[3,")));

        assert!(!registry.send_raw("cp-absent", "[]".into()));
    }
}
