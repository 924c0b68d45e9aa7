//! Upstream relay connections.
//!
//! One websocket per relayed charger toward its primary CSMS, opened on
//! demand by the first forwarded frame and dropped when the peer goes away.
//! There is deliberately no retry queue here: a failed send surfaces as a
//! `ForwardingFailure` and the next forwarded frame attempts a fresh
//! connection.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, Uri};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use voltmesh_core::{CsmsError, Result};

use crate::handlers::RelayTransport;
use crate::session_registry::SessionRegistry;

/// Subprotocol requested on upstream connections.
const UPSTREAM_SUBPROTOCOL: &str = "ocpp2.0.1";

pub struct RelayPool {
    upstream_url: String,
    sessions: Arc<SessionRegistry>,
    conns: Arc<DashMap<String, mpsc::Sender<String>>>,
}

impl RelayPool {
    pub fn new(upstream_url: String, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            upstream_url,
            sessions,
            conns: Arc::new(DashMap::new()),
        }
    }

    /// Open the upstream socket for one charger and spawn its pump tasks.
    async fn connect(&self, charger_id: &str) -> Result<mpsc::Sender<String>> {
        let url = format!(
            "{}/{}",
            self.upstream_url.trim_end_matches('/'),
            charger_id
        );
        let uri: Uri = url
            .parse()
            .map_err(|e| CsmsError::ForwardingFailure(format!("bad upstream url: {e}")))?;
        let request = Request::builder()
            .uri(&url)
            .header(header::SEC_WEBSOCKET_PROTOCOL, UPSTREAM_SUBPROTOCOL)
            .header(header::HOST, uri.host().unwrap_or("localhost"))
            .body(())
            .map_err(|e| CsmsError::ForwardingFailure(format!("bad upstream request: {e}")))?;

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| CsmsError::ForwardingFailure(format!("upstream connect failed: {e}")))?;
        debug!(charger = charger_id, url = %url, "upstream relay connected");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let (tx, mut rx) = mpsc::channel::<String>(64);

        // writer: forwarded frames out to the peer CSMS
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // reader: downstream frames back to the charger's live session
        let sessions = self.sessions.clone();
        let conns = self.conns.clone();
        let cid = charger_id.to_owned();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_rx.next().await {
                if let Message::Text(text) = msg {
                    if !sessions.send_raw(&cid, text) {
                        debug!(charger = %cid, "downstream frame for a disconnected charger; dropped");
                    }
                }
            }
            // peer went away; the next forward reconnects
            conns.remove(&cid);
            warn!(charger = %cid, "upstream relay closed");
        });

        self.conns.insert(charger_id.to_owned(), tx.clone());
        Ok(tx)
    }
}

#[async_trait]
impl RelayTransport for RelayPool {
    async fn send_raw(&self, charger_id: &str, raw: &str) -> Result<()> {
        let tx = match self.conns.get(charger_id) {
            Some(tx) => tx.clone(),
            None => self.connect(charger_id).await?,
        };

        if tx.send(raw.to_owned()).await.is_err() {
            self.conns.remove(charger_id);
            return Err(CsmsError::ForwardingFailure(
                "upstream writer gone".into(),
            ));
        }
        Ok(())
    }
}
