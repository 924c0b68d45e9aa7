//! Shared application state for the voltmesh CSMS node.
//!
//! Wires config, collaborators, the session registry, the relay pool, and
//! metrics into one clone-cheap handle. Startup errors are explicit
//! (`Result` instead of panics).

use std::sync::Arc;

use serde_json::json;

use voltmesh_core::protocol::wire::ForwardingMeta;
use voltmesh_core::{CsmsError, Result};

use crate::adapters::{
    ForwardingAdapter, MeteringAdapter, NotificationAdapter, TransactionAdapter,
};
use crate::config::CsmsConfig;
use crate::dispatch::ActionRegistry;
use crate::handlers::memory::MemoryBackend;
use crate::handlers::{Collaborators, RelayTransport};
use crate::obs::CsmsMetrics;
use crate::relay::RelayPool;
use crate::session::SessionCore;
use crate::session_registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: CsmsConfig,
    collaborators: Collaborators,
    relay: Option<Arc<dyn RelayTransport>>,
    sessions: Arc<SessionRegistry>,
    metrics: Arc<CsmsMetrics>,
    /// Routing context stamped onto forwarded frames; `None` sends them bare.
    origin_meta: Option<ForwardingMeta>,
}

impl AppState {
    /// Build with the in-memory collaborator backend.
    pub fn new(cfg: CsmsConfig) -> Result<Self> {
        let backend = Arc::new(MemoryBackend::new(
            cfg.node.id.clone(),
            cfg.node.features.charge_points,
            cfg.node.features.charger_creation,
        ));
        let collaborators = Collaborators::from_backend(backend);
        Self::with_collaborators(cfg, collaborators, None)
    }

    /// Build with injected collaborators (database-backed deployments,
    /// integration tests). `relay_override` replaces the default upstream
    /// relay pool when forwarding is enabled.
    pub fn with_collaborators(
        cfg: CsmsConfig,
        collaborators: Collaborators,
        relay_override: Option<Arc<dyn RelayTransport>>,
    ) -> Result<Self> {
        let sessions = Arc::new(SessionRegistry::new());

        let relay: Option<Arc<dyn RelayTransport>> = if cfg.forwarding.enabled {
            match relay_override {
                Some(relay) => Some(relay),
                None => {
                    let url = cfg.forwarding.upstream_url.clone().ok_or_else(|| {
                        CsmsError::BadRequest(
                            "forwarding.enabled requires forwarding.upstream_url".into(),
                        )
                    })?;
                    Some(Arc::new(RelayPool::new(url, sessions.clone())))
                }
            }
        } else {
            None
        };

        let origin_meta = cfg.node.id.as_ref().map(|id| {
            let mut meta = ForwardingMeta::new();
            meta.insert("origin".into(), json!(id));
            meta.insert("hops".into(), json!(1));
            meta
        });

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                collaborators,
                relay,
                sessions,
                metrics: Arc::new(CsmsMetrics::default()),
                origin_meta,
            }),
        })
    }

    pub fn cfg(&self) -> &CsmsConfig {
        &self.inner.cfg
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.inner.collaborators
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.inner.sessions
    }

    pub fn metrics(&self) -> &Arc<CsmsMetrics> {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    /// Extra gauge lines appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("voltmesh_sessions_registered", self.inner.sessions.count() as u64)]
    }

    /// Assemble the per-connection adapter set, dispatch registry, and state
    /// machine for one charger.
    pub fn build_session(&self, charger_id: &str) -> SessionCore {
        let collab = &self.inner.collaborators;
        let charger: Arc<str> = Arc::from(charger_id);

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

        let registry = ActionRegistry::new(
            charger.clone(),
            transactions,
            metering,
            notifications,
            collab.operations.clone(),
        );

        let forwarding = self.inner.relay.as_ref().map(|relay| {
            ForwardingAdapter::new(
                charger.clone(),
                relay.clone(),
                collab.chargers.clone(),
                self.inner.origin_meta.clone(),
            )
        });

        SessionCore::new(charger, registry, forwarding, self.inner.metrics.clone())
    }
}
