//! voltmesh CSMS node.
//!
//! - WebSocket endpoint: /v1/ocpp/:charger_id
//! - Per-connection session task: admission -> decode-once -> dispatch
//! - Ops endpoints: /healthz /readyz /metrics

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use voltmesh_csms::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::load_from_file("voltmesh.yaml").expect("config load failed");
    let listen: SocketAddr = cfg
        .csms
        .listen
        .parse()
        .expect("csms.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg).expect("app state init failed");
    let app = router::build_router(state);

    tracing::info!(%listen, "voltmesh-csms starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .expect("failed to bind");

    axum::serve(listener, app).await.expect("server failed");
}
